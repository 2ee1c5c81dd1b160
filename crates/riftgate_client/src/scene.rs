use glam::Vec3;
use riftgate_shared::portal::PortalSet;

use crate::camera::Camera;

/// Everything the per-frame update and draw calls operate on, passed
/// explicitly instead of living in globals.
pub struct SceneContext {
    pub camera: Camera,
    pub portals: PortalSet,
    pub light_direction: Vec3,
}
