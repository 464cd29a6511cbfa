// src/config.rs
//! Init-time configuration. Every value here is fixed once the world or scene
//! is built; nothing is reconfigurable at runtime.

use std::time::Duration;

use glam::Vec3;

/// Length of one 60Hz frame in milliseconds, the unit of a physics sub-step.
pub const FRAME_MS: f32 = 1000.0 / 60.0;
/// Upper bound on sub-steps taken by a single `PhysicsWorld::update`.
pub const MAX_SUBSTEPS: u32 = 100;
/// A delta larger than this fraction of a frame is split into several sub-steps.
pub const SUBSTEP_THRESHOLD: f32 = 1.05;

/// Physics world capacities and stepping parameters.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Hard cap on live bodies, the character included.
    pub max_bodies: usize,
    /// Hard cap on broad-phase pairs tracked by the narrow phase.
    pub max_body_pairs: usize,
    /// Hard cap on active contact pairs.
    pub max_contact_constraints: usize,
    /// Intra-step workers (1 = step on the calling thread).
    pub worker_threads: usize,
    pub gravity: Vec3,
    /// An `update` slower than this is logged as over budget.
    pub step_budget_ms: f32,
    /// Rebuild the query structure after this many insertions. `None` leaves
    /// it to explicit `optimize_broad_phase` calls.
    pub optimize_after_inserts: Option<usize>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_bodies: 2048,
            max_body_pairs: 4096,
            max_contact_constraints: 8192,
            worker_threads: hardware_threads().saturating_sub(1).max(1),
            gravity: Vec3::new(0.0, -9.81, 0.0),
            step_budget_ms: 32.0,
            optimize_after_inserts: None,
        }
    }
}

impl WorldConfig {
    /// Worker count actually used: the configured value capped by hardware concurrency.
    pub fn worker_count(&self) -> usize {
        self.worker_threads.clamp(1, hardware_threads())
    }
}

fn hardware_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// First-person character capsule and velocity policy.
#[derive(Debug, Clone)]
pub struct CharacterConfig {
    pub half_height: f32,
    pub radius: f32,
    pub spawn: Vec3,
    pub mass: f32,
    pub friction: f32,
    pub max_horizontal_speed: f32,
    pub max_vertical_speed: f32,
    /// Distance below the capsule within which the character counts as grounded.
    pub ground_tolerance: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            half_height: 0.32,
            radius: 0.3,
            spawn: Vec3::new(-35.0, 2.0, 0.0),
            mass: 100.0,
            friction: 0.7,
            max_horizontal_speed: 16.0,
            max_vertical_speed: 16.0,
            ground_tolerance: 0.1,
        }
    }
}

/// Player movement, aim and weapon tuning.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Velocity added per millisecond of held movement.
    pub speed: f32,
    pub sprint_multiplier: f32,
    pub vertical_multiplier: f32,
    pub mouse_sensitivity: f32,
    pub pitch_limit_deg: f32,
    /// Recoil kick range in degrees per millisecond of firing.
    pub recoil_pitch: (f32, f32),
    pub recoil_yaw: (f32, f32),
    /// Mouse delta components smaller than this are dropped.
    pub mouse_deadzone: f32,
    /// Boss health removed per millisecond of sustained hits.
    pub damage_rate: f32,
    pub fov_y_deg: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            speed: 0.01,
            sprint_multiplier: 5.0,
            vertical_multiplier: 4.0,
            mouse_sensitivity: 300.0,
            pitch_limit_deg: 89.0,
            recoil_pitch: (0.001, 0.01),
            recoil_yaw: (-0.03, 0.03),
            mouse_deadzone: 0.0002,
            damage_rate: 0.1,
            fov_y_deg: 45.0,
            z_near: 0.1,
            z_far: 1000.0,
        }
    }
}

/// Physics thread settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep after every completed step so the physics thread does not own a core.
    pub post_step_sleep: Duration,
    pub thread_name: String,
    /// Raise the physics thread priority (needs the `high_priority` feature).
    pub high_priority: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            post_step_sleep: Duration::from_micros(500),
            thread_name: "physics".to_string(),
            high_priority: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_is_capped() {
        let config = WorldConfig {
            worker_threads: 100_000,
            ..WorldConfig::default()
        };
        assert!(config.worker_count() <= hardware_threads());
        assert!(config.worker_count() >= 1);

        let zero = WorldConfig {
            worker_threads: 0,
            ..WorldConfig::default()
        };
        assert_eq!(zero.worker_count(), 1);
    }

    #[test]
    fn test_default_caps() {
        let config = WorldConfig::default();
        assert_eq!(config.max_bodies, 2048);
        assert_eq!(config.max_contact_constraints, 8192);
        assert!(config.optimize_after_inserts.is_none());
    }
}
