// src/boss.rs
//! Shootable boss wrapping a [`DynamicModel`].

use glam::Vec3;

use crate::model::DynamicModel;
use crate::physics::PhysicsWorld;

/// Health below this is dead; the health bar collapses to zero width.
pub const DEATH_THRESHOLD: f32 = 0.005;
/// At or below this the scene stops drawing the boss and drops its bodies.
pub const DESPAWN_THRESHOLD: f32 = 0.05;

#[derive(Debug)]
pub struct Boss {
    name: String,
    model: DynamicModel,
    health: f32,
    max_health: f32,
}

impl Boss {
    /// Full health of 1.0.
    pub fn new(name: impl Into<String>, model: DynamicModel) -> Self {
        Self::with_health(name, model, 1.0)
    }

    pub fn with_health(name: impl Into<String>, model: DynamicModel, health: f32) -> Self {
        Self {
            name: name.into(),
            model,
            health,
            max_health: health,
        }
    }

    /// Test the aim ray and apply `damage_rate * delta_ms` on a hit.
    pub fn check_for_hit(
        &mut self,
        world: &PhysicsWorld,
        origin: Vec3,
        aim: Vec3,
        damage_rate: f32,
        delta_ms: f32,
    ) -> bool {
        if self.health < DEATH_THRESHOLD {
            self.health = -1.0;
            return false;
        }
        let hit = self.model.cast_ray_against_all_meshes(world, origin, aim);
        if hit {
            self.health -= damage_rate * delta_ms;
            log::trace!("{} hit, health {:.3}", self.name, self.health);
        }
        hit
    }

    /// Remove the bodies once health has dropped to the despawn threshold.
    /// Returns `true` only on the call that removed them.
    pub fn despawn_if_defeated(&mut self, world: &mut PhysicsWorld) -> bool {
        if !self.should_despawn() || !self.model.remove_from_physics(world) {
            return false;
        }
        log::info!("{} defeated", self.name);
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    pub fn is_dead(&self) -> bool {
        self.health < DEATH_THRESHOLD
    }

    pub fn should_despawn(&self) -> bool {
        self.health <= DESPAWN_THRESHOLD
    }

    /// Horizontal scale of the health bar in `[0, 1]`.
    pub fn health_bar_scale(&self) -> f32 {
        let portion = self.health / self.max_health;
        if portion < DEATH_THRESHOLD {
            0.0
        } else {
            portion.min(1.0)
        }
    }

    pub fn model(&self) -> &DynamicModel {
        &self.model
    }
}
