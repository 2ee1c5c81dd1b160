use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Quat, Vec2, Vec3};
use image::RgbaImage;
use riftgate_shared::heightfield::Heightfield;
use riftgate_shared::portal::PortalSet;
use riftgate_shared::projection::Projection;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

use crate::camera::Camera;
use crate::input::InputState;
use crate::renderer::texture;
use crate::renderer::Renderer;
use crate::scene::SceneContext;

const WINDOW_TITLE: &str = "Riftgate";
const SETTINGS_PATH: &str = "riftgate.toml";

const HEIGHTMAP_PATH: &str = "assets/heightmap.png";
const PROP_TEXTURE_PATH: &str = "assets/crate.png";
const PORTAL_FALLBACK_PATH: &str = "assets/portal.png";

const HEIGHT_SCALE: f32 = 250.0;
const XZ_SCALE: f32 = 5.0;
const FALLBACK_GRID_SIZE: usize = 256;

const PORTAL_DIAMETER: f32 = 100.0;
// Terrain-relative placement of the two gates, as fractions of the extent.
const PORTAL_A_SPOT: (f32, f32) = (0.3, 0.5);
const PORTAL_B_SPOT: (f32, f32) = (0.75, 0.35);

const PROP_SCALE: f32 = 12.0;
const PROP_SPOTS: [(f32, f32); 5] = [
    (0.22, 0.4),
    (0.38, 0.62),
    (0.55, 0.3),
    (0.68, 0.5),
    (0.82, 0.28),
];

const EYE_HEIGHT: f32 = 10.0;
const LIGHT_DIRECTION: Vec3 = Vec3::new(-0.5, -0.5, -0.5);

const MIN_WINDOW_DIMENSION: u32 = 320;
const MAX_WINDOW_DIMENSION: u32 = 7680;
const MIN_MOUSE_SENSITIVITY: f32 = 0.01;
const MAX_MOUSE_SENSITIVITY: f32 = 5.0;
const MIN_MOVE_SPEED: f32 = 1.0;
const MAX_MOVE_SPEED: f32 = 1000.0;
const MAX_FRAME_DT: f32 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClientSettings {
    #[serde(default = "default_window_width")]
    window_width: u32,
    #[serde(default = "default_window_height")]
    window_height: u32,
    #[serde(default = "default_mouse_sensitivity")]
    mouse_sensitivity: f32,
    #[serde(default = "default_move_speed")]
    move_speed: f32,
    #[serde(default = "default_world_seed")]
    world_seed: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            mouse_sensitivity: default_mouse_sensitivity(),
            move_speed: default_move_speed(),
            world_seed: default_world_seed(),
        }
    }
}

impl ClientSettings {
    fn sanitize(mut self) -> Self {
        self.window_width = self
            .window_width
            .clamp(MIN_WINDOW_DIMENSION, MAX_WINDOW_DIMENSION);
        self.window_height = self
            .window_height
            .clamp(MIN_WINDOW_DIMENSION, MAX_WINDOW_DIMENSION);
        self.mouse_sensitivity = self
            .mouse_sensitivity
            .clamp(MIN_MOUSE_SENSITIVITY, MAX_MOUSE_SENSITIVITY);
        self.move_speed = self.move_speed.clamp(MIN_MOVE_SPEED, MAX_MOVE_SPEED);
        self
    }

    fn load(path: &Path) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let parsed = toml::from_str::<Self>(&contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to deserialize settings: {e}"),
            )
        })?;
        Ok(parsed.sanitize())
    }

    fn save(&self, path: &Path) -> io::Result<()> {
        let serialized = toml::to_string_pretty(self).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to serialize settings: {e}"),
            )
        })?;
        fs::write(path, serialized)
    }
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    720
}

fn default_mouse_sensitivity() -> f32 {
    0.5
}

fn default_move_speed() -> f32 {
    150.0
}

fn default_world_seed() -> u32 {
    0xC0FFEE
}

fn load_settings() -> ClientSettings {
    match ClientSettings::load(Path::new(SETTINGS_PATH)) {
        Ok(settings) => settings,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let settings = ClientSettings::default();
            if let Err(err) = settings.save(Path::new(SETTINGS_PATH)) {
                warn!("could not write default settings: {err}");
            }
            settings
        }
        Err(err) => {
            warn!("settings unreadable, using defaults: {err}");
            ClientSettings::default()
        }
    }
}

fn build_heightfield(settings: &ClientSettings) -> Heightfield {
    match texture::load_luma(Path::new(HEIGHTMAP_PATH)) {
        Ok(image) => {
            match Heightfield::from_luma(
                image.width() as usize,
                image.height() as usize,
                image.as_raw(),
                XZ_SCALE,
                HEIGHT_SCALE,
            ) {
                Ok(field) => {
                    info!(
                        "loaded heightmap {} ({}x{})",
                        HEIGHTMAP_PATH,
                        field.width(),
                        field.depth()
                    );
                    return field;
                }
                Err(err) => warn!("heightmap {HEIGHTMAP_PATH} rejected: {err}"),
            }
        }
        Err(err) => warn!("heightmap unavailable: {err}"),
    }

    info!(
        "generating {}x{} terrain from seed {}",
        FALLBACK_GRID_SIZE, FALLBACK_GRID_SIZE, settings.world_seed
    );
    Heightfield::from_noise(
        settings.world_seed,
        FALLBACK_GRID_SIZE,
        FALLBACK_GRID_SIZE,
        XZ_SCALE,
        HEIGHT_SCALE,
    )
}

fn load_texture_or_checker(path: &str, light: [u8; 4], dark: [u8; 4]) -> RgbaImage {
    match texture::load_rgba(Path::new(path)) {
        Ok(image) => image,
        Err(err) => {
            warn!("texture unavailable, using generated fallback: {err}");
            texture::checkerboard(64, 8, light, dark)
        }
    }
}

fn spot_on_terrain(field: &Heightfield, spot: (f32, f32)) -> Vec3 {
    let (extent_x, extent_z) = field.world_extent();
    let x = extent_x * spot.0;
    let z = extent_z * spot.1;
    Vec3::new(x, field.height_at(x, z), z)
}

fn portal_positions(field: &Heightfield) -> [Vec3; 2] {
    [PORTAL_A_SPOT, PORTAL_B_SPOT].map(|spot| {
        let ground = spot_on_terrain(field, spot);
        ground + Vec3::new(0.0, PORTAL_DIAMETER * 0.5, 0.0)
    })
}

fn prop_transforms(field: &Heightfield) -> Vec<Mat4> {
    PROP_SPOTS
        .iter()
        .enumerate()
        .map(|(index, &spot)| {
            let ground = spot_on_terrain(field, spot);
            let translation = ground + Vec3::new(0.0, PROP_SCALE * 0.5, 0.0);
            let rotation = Quat::from_rotation_y(index as f32 * 0.7);
            Mat4::from_scale_rotation_translation(Vec3::splat(PROP_SCALE), rotation, translation)
        })
        .collect()
}

fn build_scene(settings: &ClientSettings, field: &Heightfield, width: u32, height: u32) -> SceneContext {
    let mut portals = PortalSet::new();
    let [position_a, position_b] = portal_positions(field);
    let a = portals.insert(position_a, PORTAL_DIAMETER, width, height);
    let b = portals.insert(position_b, PORTAL_DIAMETER, width, height);
    portals.link(a, b);

    let start = {
        let center = field.center();
        let ground = field.height_at(center.x, center.z);
        Vec3::new(center.x, ground + EYE_HEIGHT, center.z)
    };
    let camera = Camera::new(
        Projection::with_pose(width, height, start, 0.0, 0.0),
        settings.move_speed,
        settings.mouse_sensitivity,
    );

    SceneContext {
        camera,
        portals,
        light_direction: LIGHT_DIRECTION.normalize(),
    }
}

#[derive(Default)]
struct ClientApp {
    settings: ClientSettings,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    scene: Option<SceneContext>,
    input: InputState,
    last_frame: Option<Instant>,
    cursor_grabbed: bool,
}

impl ClientApp {
    fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    fn grab_cursor(&mut self, window: &Window) {
        let grabbed = window
            .set_cursor_grab(CursorGrabMode::Confined)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked));
        match grabbed {
            Ok(()) => {
                window.set_cursor_visible(false);
                self.cursor_grabbed = true;
            }
            Err(err) => warn!("could not grab cursor: {err}"),
        }
    }

    fn update_and_render(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = self
            .last_frame
            .map(|last| (now - last).as_secs_f32().min(MAX_FRAME_DT))
            .unwrap_or(0.0);
        self.last_frame = Some(now);

        let (Some(scene), Some(renderer), Some(window)) = (
            self.scene.as_mut(),
            self.renderer.as_mut(),
            self.window.as_ref(),
        ) else {
            return;
        };

        scene.camera.update(&self.input, dt);
        scene.portals.tick(&mut scene.camera.projection);
        scene.portals.update_views(&scene.camera.projection);

        match renderer.render_frame(scene) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = window.inner_size();
                renderer.resize(size.width, size.height);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("surface out of memory; shutting down");
                event_loop.exit();
            }
            Err(err) => warn!("frame skipped: {err}"),
        }

        self.input.clear_frame();
    }
}

impl ApplicationHandler for ClientApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.settings.window_width,
                self.settings.window_height,
            ));
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                error!("failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        let field = build_heightfield(&self.settings);
        let terrain_mesh = field.build_mesh();
        let scene = build_scene(&self.settings, &field, size.width.max(1), size.height.max(1));

        let prop_image = load_texture_or_checker(
            PROP_TEXTURE_PATH,
            [170, 120, 70, 255],
            [110, 75, 40, 255],
        );
        let portal_fallback_image = load_texture_or_checker(
            PORTAL_FALLBACK_PATH,
            [60, 20, 90, 255],
            [20, 5, 40, 255],
        );

        let renderer = match Renderer::new(
            window.clone(),
            &terrain_mesh,
            field.height_scale(),
            &prop_image,
            &prop_transforms(&field),
            &portal_fallback_image,
            scene.portals.len(),
        ) {
            Ok(renderer) => renderer,
            Err(err) => {
                error!("failed to initialize renderer: {err}");
                event_loop.exit();
                return;
            }
        };

        info!("window and renderer initialized");
        self.grab_cursor(&window);
        self.window = Some(window);
        self.renderer = Some(renderer);
        self.scene = Some(scene);
        self.last_frame = Some(Instant::now());
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("close requested; shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
                if let Some(scene) = self.scene.as_mut() {
                    let projection = &mut scene.camera.projection;
                    projection.width = size.width.max(1);
                    projection.height = size.height.max(1);
                    projection.recalculate();
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                match event.state {
                    ElementState::Pressed => {
                        if code == KeyCode::Escape {
                            event_loop.exit();
                            return;
                        }
                        self.input.press_key(code);
                    }
                    ElementState::Released => self.input.release_key(code),
                }
            }
            WindowEvent::Focused(focused) => {
                if focused && !self.cursor_grabbed {
                    if let Some(window) = self.window.clone() {
                        self.grab_cursor(&window);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                self.update_and_render(event_loop);
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if !self.cursor_grabbed {
            return;
        }

        if let DeviceEvent::MouseMotion { delta } = event {
            self.input
                .add_mouse_delta(Vec2::new(delta.0 as f32, delta.1 as f32));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

pub fn run() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
    info!("Riftgate starting...");

    let event_loop = match EventLoop::new() {
        Ok(loop_handle) => loop_handle,
        Err(err) => {
            eprintln!("Failed to create event loop: {err}");
            return;
        }
    };

    let mut app = ClientApp::new(load_settings());
    if let Err(err) = event_loop.run_app(&mut app) {
        eprintln!("Event loop exited with error: {err}");
    }
}

#[cfg(test)]
mod tests {
    use riftgate_shared::heightfield::Heightfield;

    use super::{
        portal_positions, prop_transforms, ClientSettings, HEIGHT_SCALE, PORTAL_DIAMETER,
        PROP_SPOTS, XZ_SCALE,
    };

    #[test]
    fn settings_sanitize_clamps_out_of_range_values() {
        let settings = ClientSettings {
            window_width: 10,
            window_height: 100_000,
            mouse_sensitivity: 99.0,
            move_speed: 0.0,
            world_seed: 7,
        }
        .sanitize();

        assert_eq!(settings.window_width, 320);
        assert_eq!(settings.window_height, 7680);
        assert_eq!(settings.mouse_sensitivity, 5.0);
        assert_eq!(settings.move_speed, 1.0);
        assert_eq!(settings.world_seed, 7);
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let settings = ClientSettings::default();
        let serialized = toml::to_string_pretty(&settings).unwrap();
        let parsed: ClientSettings = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.window_width, settings.window_width);
        assert_eq!(parsed.move_speed, settings.move_speed);
    }

    #[test]
    fn settings_tolerate_missing_fields() {
        let parsed: ClientSettings = toml::from_str("window_width = 800\n").unwrap();
        assert_eq!(parsed.window_width, 800);
        assert_eq!(parsed.window_height, 720);
    }

    #[test]
    fn portals_hover_half_a_diameter_above_ground() {
        let field = Heightfield::from_noise(11, 64, 64, XZ_SCALE, HEIGHT_SCALE);
        let [a, b] = portal_positions(&field);

        for position in [a, b] {
            let ground = field.height_at(position.x, position.z);
            assert!((position.y - ground - PORTAL_DIAMETER * 0.5).abs() < 1.0e-3);
        }
        assert!(a.distance(b) > PORTAL_DIAMETER);
    }

    #[test]
    fn every_prop_spot_gets_a_transform() {
        let field = Heightfield::from_noise(11, 64, 64, XZ_SCALE, HEIGHT_SCALE);
        assert_eq!(prop_transforms(&field).len(), PROP_SPOTS.len());
    }
}
