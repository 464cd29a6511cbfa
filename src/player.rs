// src/player.rs
//! First-person player: mouse look, movement through the character
//! controller, and hitscan firing with recoil.

use glam::{Mat4, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::boss::Boss;
use crate::config::PlayerConfig;
use crate::physics::PhysicsWorld;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    MoveForward,
    MoveBack,
    StrafeLeft,
    StrafeRight,
    Jump,
    Crouch,
    Sprint,
    Fire,
}

/// Logical input state for the current frame.
pub trait InputSource {
    fn is_active(&self, action: Action) -> bool;

    /// Mouse movement since the previous frame. Positive y looks up.
    fn mouse_delta(&self) -> Vec2;

    /// `false` while the cursor is released to the OS; look and movement are
    /// ignored then.
    fn is_mouse_captured(&self) -> bool {
        true
    }
}

/// Result of one [`Player::update`], used to drive audio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireOutcome {
    pub firing: bool,
    pub hit: bool,
}

#[derive(Debug)]
pub struct Player {
    config: PlayerConfig,
    position: Vec3,
    /// Degrees.
    yaw: f32,
    /// Degrees.
    pitch: f32,
    front: Vec3,
    right: Vec3,
    up: Vec3,
    world_up: Vec3,
    rng: StdRng,
}

impl Player {
    pub fn new(config: PlayerConfig, position: Vec3) -> Self {
        Self::with_rng(config, position, StdRng::from_entropy())
    }

    /// Deterministic recoil.
    pub fn with_seed(config: PlayerConfig, position: Vec3, seed: u64) -> Self {
        Self::with_rng(config, position, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: PlayerConfig, position: Vec3, rng: StdRng) -> Self {
        let mut player = Self {
            config,
            position,
            yaw: 0.0,
            pitch: 0.0,
            front: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
            world_up: Vec3::Y,
            rng,
        };
        player.update_camera_vectors();
        player
    }

    /// One frame of player logic. Runs on the render thread between physics
    /// steps, so the world is not being stepped.
    pub fn update<I: InputSource + ?Sized>(
        &mut self,
        input: &I,
        world: &mut PhysicsWorld,
        bosses: &mut [Boss],
        delta_ms: f32,
    ) -> FireOutcome {
        if input.is_mouse_captured() {
            self.process_keyboard(input, world, delta_ms);
            self.process_mouse(input.mouse_delta(), delta_ms);
        }

        if !input.is_active(Action::Fire) {
            self.update_camera_vectors();
            return FireOutcome::default();
        }

        let (lo, hi) = self.config.recoil_pitch;
        self.pitch += self.rng.gen_range(lo..=hi) * delta_ms;
        let (lo, hi) = self.config.recoil_yaw;
        self.yaw += self.rng.gen_range(lo..=hi) * delta_ms;
        self.clamp_pitch();

        let origin = self.position;
        let aim = self.front;
        let damage = self.config.damage_rate;
        let hit = bosses
            .iter_mut()
            .any(|boss| boss.check_for_hit(world, origin, aim, damage, delta_ms));

        self.update_camera_vectors();
        FireOutcome { firing: true, hit }
    }

    fn process_keyboard<I: InputSource + ?Sized>(&mut self, input: &I, world: &mut PhysicsWorld, delta_ms: f32) {
        let speed = if input.is_active(Action::Sprint) {
            self.config.speed * self.config.sprint_multiplier
        } else {
            self.config.speed
        };
        let step = speed * delta_ms;
        let flat_front = Vec3::new(self.front.x, 0.0, self.front.z).normalize_or_zero();

        let mut velocity = Vec3::ZERO;
        if input.is_active(Action::MoveForward) {
            velocity += flat_front * step;
        }
        if input.is_active(Action::MoveBack) {
            velocity -= flat_front * step;
        }
        if input.is_active(Action::StrafeLeft) {
            velocity -= self.right * step;
        }
        if input.is_active(Action::StrafeRight) {
            velocity += self.right * step;
        }
        // Vertical movement follows world up, not the camera.
        if input.is_active(Action::Jump) {
            velocity += self.world_up * step * self.config.vertical_multiplier;
        }
        if input.is_active(Action::Crouch) {
            velocity -= self.world_up * step * self.config.vertical_multiplier;
        }

        if velocity != Vec3::ZERO {
            world.character_add_velocity(velocity);
        }
        self.position = world.character_position();
    }

    fn process_mouse(&mut self, delta: Vec2, delta_ms: f32) {
        let deadzone = self.config.mouse_deadzone;
        let filter = |d: f32| if d.abs() < deadzone { 0.0 } else { d };
        let scale = delta_ms / 10.0 * self.config.mouse_sensitivity;
        self.yaw += filter(delta.x) * scale;
        self.pitch += filter(delta.y) * scale;
        self.clamp_pitch();
    }

    fn clamp_pitch(&mut self) {
        let limit = self.config.pitch_limit_deg;
        self.pitch = self.pitch.clamp(-limit, limit);
    }

    fn update_camera_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(
            self.config.fov_y_deg.to_radians(),
            aspect,
            self.config.z_near,
            self.config.z_far,
        )
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn aim_vector(&self) -> Vec3 {
        self.front
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }
}
