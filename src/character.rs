// src/character.rs
//! First-person character: a dynamic capsule with locked rotations living on
//! the MOVING layer. Velocity is clamped after every update and the ground
//! state is refreshed with a short downward probe.

use glam::Vec3;
use rapier3d::prelude::*;

use crate::config::CharacterConfig;
use crate::convert::{from_vector, to_point, to_vector};
use crate::layers::{interaction_groups, ObjectLayer};
use crate::physics::BodyHandle;

/// Clamp horizontal speed by rescaling the XZ component only, then clamp the
/// vertical component on its own.
pub fn clamp_velocity(velocity: Vec3, max_horizontal: f32, max_vertical: f32) -> Vec3 {
    let horizontal = Vec3::new(velocity.x, 0.0, velocity.z);
    let mut clamped = velocity;
    if horizontal.length() > max_horizontal {
        let scaled = horizontal.normalize() * max_horizontal;
        clamped.x = scaled.x;
        clamped.z = scaled.z;
    }
    clamped.y = velocity.y.clamp(-max_vertical, max_vertical);
    clamped
}

#[derive(Debug)]
pub struct CharacterController {
    body: RigidBodyHandle,
    config: CharacterConfig,
    is_grounded: bool,
    ground_normal: Vec3,
}

impl CharacterController {
    /// Insert the capsule into the sets. Called once by the world constructor.
    pub(crate) fn spawn(
        bodies: &mut RigidBodySet,
        colliders: &mut ColliderSet,
        config: CharacterConfig,
    ) -> Self {
        let shape = SharedShape::capsule_y(config.half_height, config.radius);
        let volume = shape.mass_properties(1.0).mass();
        let density = if volume > f32::EPSILON { config.mass / volume } else { 1.0 };

        let body = RigidBodyBuilder::dynamic()
            .translation(to_vector(config.spawn))
            .lock_rotations()
            .user_data(ObjectLayer::Moving.raw())
            .build();
        let handle = bodies.insert(body);

        let collider = ColliderBuilder::new(shape)
            .friction(config.friction)
            .density(density)
            .collision_groups(interaction_groups(ObjectLayer::Moving))
            .user_data(ObjectLayer::Moving.raw())
            .build();
        colliders.insert_with_parent(collider, handle, bodies);

        log::debug!("character spawned at {:?}", config.spawn);
        Self {
            body: handle,
            config,
            is_grounded: false,
            ground_normal: Vec3::Y,
        }
    }

    #[inline]
    pub fn handle(&self) -> BodyHandle {
        BodyHandle(self.body)
    }

    #[inline]
    pub fn is_grounded(&self) -> bool {
        self.is_grounded
    }

    #[inline]
    pub fn ground_normal(&self) -> Vec3 {
        self.ground_normal
    }

    #[inline]
    pub fn config(&self) -> &CharacterConfig {
        &self.config
    }

    pub(crate) fn add_velocity(&self, bodies: &mut RigidBodySet, delta: Vec3) {
        if let Some(body) = bodies.get_mut(self.body) {
            let velocity = *body.linvel() + to_vector(delta);
            body.set_linvel(velocity, true);
        }
    }

    pub(crate) fn position(&self, bodies: &RigidBodySet) -> Vec3 {
        bodies
            .get(self.body)
            .map(|body| from_vector(body.translation()))
            .unwrap_or(self.config.spawn)
    }

    pub(crate) fn velocity(&self, bodies: &RigidBodySet) -> Vec3 {
        bodies
            .get(self.body)
            .map(|body| from_vector(body.linvel()))
            .unwrap_or(Vec3::ZERO)
    }

    /// Clamp the velocity, then refresh the ground state. Runs after every step.
    pub(crate) fn update(
        &mut self,
        bodies: &mut RigidBodySet,
        colliders: &ColliderSet,
        queries: &QueryPipeline,
    ) {
        let Some(body) = bodies.get_mut(self.body) else {
            return;
        };
        let velocity = from_vector(body.linvel());
        let clamped = clamp_velocity(
            velocity,
            self.config.max_horizontal_speed,
            self.config.max_vertical_speed,
        );
        if clamped != velocity {
            body.set_linvel(to_vector(clamped), true);
        }

        let center = from_vector(body.translation());
        let foot = self.config.half_height + self.config.radius;
        let ray = Ray::new(to_point(center), -Vector::y());
        let filter = QueryFilter::default().exclude_rigid_body(self.body);
        let hit = queries.cast_ray_and_get_normal(
            bodies,
            colliders,
            &ray,
            foot + self.config.ground_tolerance,
            true,
            filter,
        );

        self.is_grounded = false;
        self.ground_normal = Vec3::Y;
        let Some((_, hit)) = hit else {
            return;
        };
        let gap = hit.toi - foot;
        if gap > self.config.ground_tolerance {
            return;
        }
        self.is_grounded = true;
        self.ground_normal = from_vector(&hit.normal);

        // Snap down onto the ground unless moving upward.
        if gap > 0.0 && clamped.y <= 0.0 {
            if let Some(body) = bodies.get_mut(self.body) {
                let snapped = center - Vec3::Y * gap;
                body.set_translation(to_vector(snapped), true);
            }
        }
    }
}
