use glam::{Mat4, Quat, Vec3};

pub const FOV_Y_DEGREES: f32 = 75.0;
pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 5000.0;

const MAX_PITCH_DEGREES: f32 = 90.0;

/// Camera pose plus the view/projection matrices derived from it.
///
/// Matrices are recomputed only by `recalculate()`; callers mutate the pose
/// and recalculate before reading `view`/`projection`.
#[derive(Debug, Clone)]
pub struct Projection {
    pub position: Vec3,
    pitch: f32,
    yaw: f32,
    pub width: u32,
    pub height: u32,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Projection {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_pose(width, height, Vec3::new(0.0, 100.0, 0.0), 0.0, 0.0)
    }

    pub fn with_pose(width: u32, height: u32, position: Vec3, pitch: f32, yaw: f32) -> Self {
        let mut projection = Self {
            position,
            pitch: pitch.clamp(-MAX_PITCH_DEGREES, MAX_PITCH_DEGREES),
            yaw: wrap_yaw(yaw),
            width,
            height,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        };
        projection.recalculate();
        projection
    }

    /// Pitch in degrees, clamped to [-90, 90].
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Yaw in degrees, wrapped to (-180, 180].
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.clamp(-MAX_PITCH_DEGREES, MAX_PITCH_DEGREES);
    }

    pub fn add_pitch(&mut self, delta: f32) {
        self.set_pitch(self.pitch + delta);
    }

    pub fn set_yaw(&mut self, yaw: f32) {
        self.yaw = wrap_yaw(yaw);
    }

    pub fn add_yaw(&mut self, delta: f32) {
        self.set_yaw(self.yaw + delta);
    }

    /// Orientation quaternion: pitch about X, then yaw about Y, roll fixed at 0.
    pub fn orientation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw.to_radians()) * Quat::from_rotation_x(self.pitch.to_radians())
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::Z
    }

    pub fn up(&self) -> Vec3 {
        self.orientation() * Vec3::Y
    }

    /// Rebuilds `view` and `projection` from the current pose.
    pub fn recalculate(&mut self) {
        let forward = self.forward();
        let up = self.up();
        self.view = Mat4::look_at_rh(self.position, self.position + forward, up);
        self.projection = Mat4::perspective_rh(
            FOV_Y_DEGREES.to_radians(),
            self.aspect(),
            NEAR_PLANE,
            FAR_PLANE,
        );
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

fn wrap_yaw(yaw: f32) -> f32 {
    let wrapped = yaw.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3};

    use super::{wrap_yaw, Projection, FAR_PLANE, FOV_Y_DEGREES, NEAR_PLANE};

    #[test]
    fn pitch_is_clamped_to_straight_up_and_down() {
        let mut projection = Projection::new(1280, 720);

        projection.set_pitch(270.0);
        assert_eq!(projection.pitch(), 90.0);

        projection.set_pitch(-1000.0);
        assert_eq!(projection.pitch(), -90.0);

        projection.set_pitch(45.0);
        projection.add_pitch(60.0);
        assert_eq!(projection.pitch(), 90.0);
    }

    #[test]
    fn yaw_wraps_into_half_open_range() {
        assert_eq!(wrap_yaw(180.0), 180.0);
        assert_eq!(wrap_yaw(-180.0), 180.0);
        assert_eq!(wrap_yaw(190.0), -170.0);
        assert_eq!(wrap_yaw(-190.0), 170.0);
        assert_eq!(wrap_yaw(540.0), 180.0);
        assert_eq!(wrap_yaw(0.0), 0.0);

        let mut projection = Projection::new(1280, 720);
        projection.set_yaw(170.0);
        projection.add_yaw(25.0);
        assert!((projection.yaw() - -165.0).abs() < 1.0e-4);
    }

    #[test]
    fn recalculate_matches_freshly_derived_matrices() {
        let mut projection = Projection::new(1920, 1080);
        projection.position = Vec3::new(12.0, 34.0, -56.0);
        projection.set_pitch(-20.0);
        projection.set_yaw(135.0);
        projection.recalculate();

        let expected_view = Mat4::look_at_rh(
            projection.position,
            projection.position + projection.forward(),
            projection.up(),
        );
        let expected_projection = Mat4::perspective_rh(
            FOV_Y_DEGREES.to_radians(),
            1920.0 / 1080.0,
            NEAR_PLANE,
            FAR_PLANE,
        );

        assert!(projection.view.abs_diff_eq(expected_view, 1.0e-6));
        assert!(projection
            .projection
            .abs_diff_eq(expected_projection, 1.0e-6));
    }

    #[test]
    fn zero_pose_looks_down_positive_z() {
        let projection = Projection::with_pose(800, 600, Vec3::ZERO, 0.0, 0.0);
        assert!(projection.forward().abs_diff_eq(Vec3::Z, 1.0e-6));
        assert!(projection.up().abs_diff_eq(Vec3::Y, 1.0e-6));
    }

    #[test]
    fn yaw_rotates_forward_about_y() {
        let projection = Projection::with_pose(800, 600, Vec3::ZERO, 0.0, 90.0);
        // +90 degrees of yaw swings +Z toward +X.
        assert!(projection.forward().abs_diff_eq(Vec3::X, 1.0e-6));
    }
}
