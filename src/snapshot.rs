// src/snapshot.rs
//! Read side of the physics world.
//!
//! [`BodyQuery`] is what culling and model rendering need from a body. The
//! live [`PhysicsWorld`](crate::physics::PhysicsWorld) implements it, and so does
//! [`FrameSnapshot`], the copy the physics thread publishes after each step so
//! the render thread can draw the previous frame while the next one simulates.

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

use crate::culling::Aabb;
use crate::physics::BodyHandle;

/// Transform and bounds lookup by handle. Every method returns `None` for a
/// handle that does not resolve.
pub trait BodyQuery {
    fn position(&self, body: BodyHandle) -> Option<Vec3>;
    fn rotation(&self, body: BodyHandle) -> Option<Quat>;
    fn world_bounds(&self, body: BodyHandle) -> Option<Aabb>;

    fn transform(&self, body: BodyHandle) -> Option<Mat4> {
        Some(Mat4::from_rotation_translation(
            self.rotation(body)?,
            self.position(body)?,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub rotation: Quat,
    pub bounds: Aabb,
}

/// Body states as of the end of one physics step.
#[derive(Debug, Clone, Default)]
pub struct FrameSnapshot {
    bodies: HashMap<BodyHandle, BodyState>,
    character_position: Vec3,
    step_index: u64,
}

impl FrameSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents, reusing the allocation.
    pub fn record<I>(&mut self, states: I, character_position: Vec3, step_index: u64)
    where
        I: IntoIterator<Item = (BodyHandle, BodyState)>,
    {
        self.bodies.clear();
        self.bodies.extend(states);
        self.character_position = character_position;
        self.step_index = step_index;
    }

    #[inline]
    pub fn get(&self, body: BodyHandle) -> Option<&BodyState> {
        self.bodies.get(&body)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    #[inline]
    pub fn character_position(&self) -> Vec3 {
        self.character_position
    }

    /// Number of `update` calls the world had completed when this was taken.
    #[inline]
    pub fn step_index(&self) -> u64 {
        self.step_index
    }
}

impl BodyQuery for FrameSnapshot {
    fn position(&self, body: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&body).map(|s| s.position)
    }

    fn rotation(&self, body: BodyHandle) -> Option<Quat> {
        self.bodies.get(&body).map(|s| s.rotation)
    }

    fn world_bounds(&self, body: BodyHandle) -> Option<Aabb> {
        self.bodies.get(&body).map(|s| s.bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::RigidBodyHandle;

    fn handle(i: u32) -> BodyHandle {
        BodyHandle(RigidBodyHandle::from_raw_parts(i, 0))
    }

    fn state(x: f32) -> BodyState {
        let position = Vec3::new(x, 0.0, 0.0);
        BodyState {
            position,
            rotation: Quat::IDENTITY,
            bounds: Aabb::from_center_half_extents(position, Vec3::ONE),
        }
    }

    #[test]
    fn test_record_replaces_previous_contents() {
        let mut snapshot = FrameSnapshot::new();
        snapshot.record([(handle(1), state(1.0)), (handle(2), state(2.0))], Vec3::ZERO, 1);
        snapshot.record([(handle(3), state(3.0))], Vec3::Y, 2);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.position(handle(1)).is_none());
        assert_eq!(snapshot.position(handle(3)), Some(Vec3::new(3.0, 0.0, 0.0)));
        assert_eq!(snapshot.step_index(), 2);
        assert_eq!(snapshot.character_position(), Vec3::Y);
    }

    #[test]
    fn test_transform_combines_rotation_and_translation() {
        let mut snapshot = FrameSnapshot::new();
        let mut s = state(5.0);
        s.rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        snapshot.record([(handle(1), s)], Vec3::ZERO, 1);
        let m = snapshot.transform(handle(1)).unwrap();
        let p = m.transform_point3(Vec3::X);
        assert!((p - Vec3::new(5.0, 0.0, -1.0)).length() < 1e-5);
        assert!(snapshot.transform(handle(9)).is_none());
    }
}
