mod app;
mod camera;
mod input;
mod renderer;
mod scene;

fn main() {
    app::run();
}
