use glam::{Vec2, Vec3};
use riftgate_shared::projection::Projection;
use winit::keyboard::KeyCode;

use crate::input::InputState;

/// Free-look camera: WASD moves along the orientation's local axes, mouse
/// deltas turn the head. The projection is recalculated once per update when
/// the pose actually changed.
#[derive(Debug, Clone)]
pub struct Camera {
    pub projection: Projection,
    pub move_speed: f32,
    pub look_sensitivity: f32,
}

impl Camera {
    pub fn new(projection: Projection, move_speed: f32, look_sensitivity: f32) -> Self {
        Self {
            projection,
            move_speed,
            look_sensitivity,
        }
    }

    pub fn update(&mut self, input: &InputState, dt: f32) {
        let mut changed = false;

        if input.mouse_delta != Vec2::ZERO {
            self.projection
                .add_yaw(-input.mouse_delta.x * self.look_sensitivity);
            self.projection
                .add_pitch(input.mouse_delta.y * self.look_sensitivity);
            changed = true;
        }

        let orientation = self.projection.orientation();
        let mut step = Vec3::ZERO;
        if input.is_pressed(KeyCode::KeyW) {
            step += orientation * Vec3::Z;
        }
        if input.is_pressed(KeyCode::KeyS) {
            step -= orientation * Vec3::Z;
        }
        // Local -X is the camera's right-hand side here (forward is +Z, up +Y).
        if input.is_pressed(KeyCode::KeyA) {
            step += orientation * Vec3::X;
        }
        if input.is_pressed(KeyCode::KeyD) {
            step -= orientation * Vec3::X;
        }

        if step != Vec3::ZERO {
            self.projection.position += step.normalize() * self.move_speed * dt;
            changed = true;
        }

        if changed {
            self.projection.recalculate();
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};
    use riftgate_shared::projection::Projection;
    use winit::keyboard::KeyCode;

    use super::Camera;
    use crate::input::InputState;

    fn camera() -> Camera {
        Camera::new(
            Projection::with_pose(1280, 720, Vec3::ZERO, 0.0, 0.0),
            10.0,
            0.5,
        )
    }

    #[test]
    fn forward_key_moves_along_look_direction() {
        let mut camera = camera();
        let mut input = InputState::default();
        input.press_key(KeyCode::KeyW);

        camera.update(&input, 1.0);
        assert!(camera
            .projection
            .position
            .abs_diff_eq(Vec3::new(0.0, 0.0, 10.0), 1.0e-5));
    }

    #[test]
    fn strafe_keys_cancel_each_other() {
        let mut camera = camera();
        let mut input = InputState::default();
        input.press_key(KeyCode::KeyA);
        input.press_key(KeyCode::KeyD);

        camera.update(&input, 1.0);
        assert_eq!(camera.projection.position, Vec3::ZERO);
    }

    #[test]
    fn mouse_delta_turns_and_recalculates() {
        let mut camera = camera();
        let mut input = InputState::default();
        input.add_mouse_delta(Vec2::new(40.0, -20.0));

        let before = camera.projection.view;
        camera.update(&input, 1.0);

        assert_eq!(camera.projection.yaw(), -20.0);
        assert_eq!(camera.projection.pitch(), -10.0);
        assert_ne!(camera.projection.view, before);
    }

    #[test]
    fn diagonal_movement_is_not_faster() {
        let mut camera = camera();
        let mut input = InputState::default();
        input.press_key(KeyCode::KeyW);
        input.press_key(KeyCode::KeyA);

        camera.update(&input, 1.0);
        assert!((camera.projection.position.length() - 10.0).abs() < 1.0e-4);
    }
}
