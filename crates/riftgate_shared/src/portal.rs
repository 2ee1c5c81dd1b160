use glam::Vec3;

use crate::projection::Projection;

/// Handle into a [`PortalSet`]. Portals reference their pair through this
/// instead of holding a back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalId(pub usize);

#[derive(Debug, Clone)]
pub struct Portal {
    pub position: Vec3,
    pub diameter: f32,
    /// When false the portal's surface is skipped by scene passes. Toggled
    /// around offscreen passes so a portal never appears in its pair's view.
    pub enabled: bool,
    pub linked: Option<PortalId>,
    /// The scene as seen "through" this portal from the linked side.
    pub view: Projection,
    in_portal: bool,
    teleported: bool,
}

impl Portal {
    fn new(position: Vec3, diameter: f32, width: u32, height: u32) -> Self {
        Self {
            position,
            diameter,
            enabled: true,
            linked: None,
            view: Projection::with_pose(width, height, position, 0.0, 0.0),
            in_portal: false,
            teleported: false,
        }
    }

    pub fn radius(&self) -> f32 {
        self.diameter * 0.5
    }

    /// Camera is currently inside this portal's trigger radius.
    pub fn in_portal(&self) -> bool {
        self.in_portal
    }

    /// One-shot debounce: this portal just pushed the camera to its pair and
    /// the pair has not yet acknowledged the arrival.
    pub fn teleported(&self) -> bool {
        self.teleported
    }
}

/// Registry owning every portal in registration order.
#[derive(Debug, Default)]
pub struct PortalSet {
    portals: Vec<Portal>,
}

impl PortalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, position: Vec3, diameter: f32, width: u32, height: u32) -> PortalId {
        self.portals.push(Portal::new(position, diameter, width, height));
        PortalId(self.portals.len() - 1)
    }

    /// Establishes the symmetric pairing between two portals.
    pub fn link(&mut self, a: PortalId, b: PortalId) {
        debug_assert_ne!(a, b, "a portal cannot link to itself");
        self.portals[a.0].linked = Some(b);
        self.portals[b.0].linked = Some(a);
    }

    pub fn len(&self) -> usize {
        self.portals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portals.is_empty()
    }

    pub fn get(&self, id: PortalId) -> &Portal {
        &self.portals[id.0]
    }

    pub fn get_mut(&mut self, id: PortalId) -> &mut Portal {
        &mut self.portals[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (PortalId, &Portal)> {
        self.portals.iter().enumerate().map(|(i, p)| (PortalId(i), p))
    }

    pub fn set_enabled(&mut self, id: PortalId, enabled: bool) {
        self.portals[id.0].enabled = enabled;
    }

    /// Runs the trigger state machine for every portal, in registration order.
    pub fn tick(&mut self, camera: &mut Projection) {
        for index in 0..self.portals.len() {
            self.tick_portal(PortalId(index), camera);
        }
    }

    /// One portal's per-frame transition:
    /// - outside the radius: clear `in_portal`;
    /// - inside and already `in_portal`: nothing;
    /// - inside, pair's `teleported` flag set: this is the arrival side of a
    ///   teleport that just happened — acknowledge it without moving the
    ///   camera again;
    /// - inside, no flag: voluntary entry — relocate the camera to the pair,
    ///   preserving the offset from the portal center, and raise the flag so
    ///   the pair does not bounce the camera straight back.
    pub fn tick_portal(&mut self, id: PortalId, camera: &mut Projection) {
        let (position, radius, linked) = {
            let portal = &self.portals[id.0];
            (portal.position, portal.radius(), portal.linked)
        };

        let offset = camera.position - position;
        let distance = offset.length();

        if distance >= radius {
            self.portals[id.0].in_portal = false;
            return;
        }
        if self.portals[id.0].in_portal {
            return;
        }

        let Some(linked) = linked else {
            // Unlinked portals only track presence.
            self.portals[id.0].in_portal = true;
            return;
        };

        if self.portals[linked.0].teleported {
            self.portals[id.0].in_portal = true;
            self.portals[linked.0].teleported = false;
            return;
        }

        camera.position = self.portals[linked.0].position + offset;
        camera.recalculate();
        self.portals[id.0].teleported = true;
    }

    /// Recomputes every linked portal's secondary projection: the primary
    /// camera's pose translated to the linked side. Orientation is copied
    /// unchanged (portals do not re-orient the view in this design).
    pub fn update_views(&mut self, primary: &Projection) {
        for index in 0..self.portals.len() {
            let Some(linked) = self.portals[index].linked else {
                continue;
            };
            let exit_position = self.portals[linked.0].position;
            let entry_position = self.portals[index].position;

            let view = &mut self.portals[index].view;
            view.position = exit_position + (primary.position - entry_position);
            view.set_pitch(primary.pitch());
            view.set_yaw(primary.yaw());
            view.width = primary.width;
            view.height = primary.height;
            view.recalculate();
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::{PortalId, PortalSet};
    use crate::projection::Projection;

    const WIDTH: u32 = 1280;
    const HEIGHT: u32 = 720;

    fn linked_pair() -> (PortalSet, PortalId, PortalId) {
        let mut portals = PortalSet::new();
        let a = portals.insert(Vec3::ZERO, 100.0, WIDTH, HEIGHT);
        let b = portals.insert(Vec3::new(1000.0, 0.0, 0.0), 100.0, WIDTH, HEIGHT);
        portals.link(a, b);
        (portals, a, b)
    }

    fn camera_at(position: Vec3) -> Projection {
        Projection::with_pose(WIDTH, HEIGHT, position, 0.0, 0.0)
    }

    #[test]
    fn entering_a_portal_relocates_camera_and_raises_one_flag() {
        let (mut portals, a, b) = linked_pair();
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 200.0));

        // Approach: still outside radius 50, nothing happens.
        camera.position = Vec3::new(0.0, 0.0, 60.0);
        portals.tick_portal(a, &mut camera);
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 60.0));
        assert!(!portals.get(a).teleported());

        // Cross the trigger radius.
        camera.position = Vec3::new(0.0, 0.0, 30.0);
        portals.tick_portal(a, &mut camera);

        assert_eq!(camera.position, Vec3::new(1000.0, 0.0, 30.0));
        assert!(portals.get(a).teleported());
        assert!(!portals.get(b).teleported());
        assert!(!portals.get(b).in_portal());
    }

    #[test]
    fn arrival_side_clears_flag_without_moving_camera() {
        let (mut portals, a, b) = linked_pair();
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 30.0));

        portals.tick_portal(a, &mut camera);
        let arrived_at = camera.position;

        portals.tick_portal(b, &mut camera);
        assert_eq!(camera.position, arrived_at);
        assert!(!portals.get(a).teleported());
        assert!(portals.get(b).in_portal());

        // Lingering inside the pair's radius must not re-trigger.
        portals.tick_portal(b, &mut camera);
        assert_eq!(camera.position, arrived_at);
        assert!(!portals.get(b).teleported());
    }

    #[test]
    fn round_trip_returns_to_start_plus_movement() {
        let (mut portals, a, b) = linked_pair();
        let start = Vec3::new(10.0, 0.0, 20.0);
        let mut camera = camera_at(start);

        portals.tick(&mut camera);
        assert_eq!(camera.position, Vec3::new(1010.0, 0.0, 20.0));

        // Walk out of B's radius, then step back in.
        let wander = Vec3::new(60.0, 0.0, 0.0);
        camera.position += wander;
        portals.tick(&mut camera);
        assert!(!portals.get(b).in_portal());

        camera.position -= wander;
        portals.tick(&mut camera);

        let error = (camera.position - start).length();
        assert!(error < 1.0e-4, "round trip drifted by {error}");
    }

    #[test]
    fn leaving_the_radius_clears_in_portal() {
        let (mut portals, a, b) = linked_pair();
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 30.0));

        portals.tick_portal(a, &mut camera);
        portals.tick_portal(b, &mut camera);
        assert!(portals.get(b).in_portal());

        camera.position = Vec3::new(1000.0, 0.0, 200.0);
        portals.tick(&mut camera);
        assert!(!portals.get(a).in_portal());
        assert!(!portals.get(b).in_portal());
    }

    #[test]
    fn unlinked_portal_never_relocates() {
        let mut portals = PortalSet::new();
        let lone = portals.insert(Vec3::ZERO, 100.0, WIDTH, HEIGHT);
        let inside = Vec3::new(0.0, 0.0, 10.0);
        let mut camera = camera_at(inside);

        portals.tick(&mut camera);
        assert_eq!(camera.position, inside);
        assert!(portals.get(lone).in_portal());
        assert!(!portals.get(lone).teleported());
    }

    #[test]
    fn view_follows_primary_camera_across_the_link() {
        let (mut portals, a, b) = linked_pair();
        let mut primary = camera_at(Vec3::new(5.0, 2.0, 80.0));
        primary.set_pitch(-15.0);
        primary.set_yaw(40.0);
        primary.recalculate();

        portals.update_views(&primary);

        let view_a = &portals.get(a).view;
        assert_eq!(view_a.position, Vec3::new(1005.0, 2.0, 80.0));
        assert_eq!(view_a.pitch(), primary.pitch());
        assert_eq!(view_a.yaw(), primary.yaw());

        let view_b = &portals.get(b).view;
        assert_eq!(view_b.position, Vec3::new(5.0 - 1000.0, 2.0, 80.0));

        // Matrices were recalculated for the relocated pose.
        let expected = glam::Mat4::look_at_rh(
            view_a.position,
            view_a.position + view_a.forward(),
            view_a.up(),
        );
        assert!(view_a.view.abs_diff_eq(expected, 1.0e-5));
    }
}
