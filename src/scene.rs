// src/scene.rs
//! # Scene orchestration
//!
//! Owns the world, the level, the bosses and the player, and drives one frame
//! at a time:
//!
//! 1. player update against the idle world
//! 2. physics request for this frame's delta
//! 3. draw submission from the snapshot of the *previous* step
//! 4. wait for the physics step, then take its snapshot
//! 5. deferred boss removal, present, frame timing
//!
//! The world sits behind a mutex that is never contended: the physics thread
//! holds it only between a request and its `done`, the render thread only
//! outside that window.

use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};
use parking_lot::Mutex;

use crate::boss::Boss;
use crate::config::{CharacterConfig, PlayerConfig, SchedulerConfig, WorldConfig, FRAME_MS};
use crate::culling::FrustumCuller;
use crate::error::{Error, Result};
use crate::factory::DEFAULT_MESH_MASS;
use crate::flight::FlightScript;
use crate::model::{DynamicModel, LoadOptions, SceneNode, StaticModel};
use crate::physics::PhysicsWorld;
use crate::player::{InputSource, Player};
use crate::scheduler::PhysicsThread;
use crate::snapshot::FrameSnapshot;
use crate::stats::{FrameClock, FrameStats};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Identifies one mesh for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshRef {
    Level { mesh: usize },
    Boss { boss: usize, mesh: usize },
}

pub trait RenderSink {
    fn draw_mesh(&mut self, mesh: MeshRef, model: &Mat4, view: &Mat4, projection: &Mat4);
    /// `scale` is the horizontal scale of the bar in `[0, 1]`.
    fn draw_health_bar(&mut self, scale: f32);
    fn present(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundCue {
    Shoot,
    Hit,
}

pub trait AudioSink {
    fn set_playing(&mut self, cue: SoundCue, playing: bool);
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub world: WorldConfig,
    pub character: CharacterConfig,
    pub player: PlayerConfig,
    pub scheduler: SchedulerConfig,
    pub aspect_ratio: f32,
    /// Step every frame by this instead of the measured frame time.
    pub fixed_delta_ms: Option<f32>,
    /// Seed for recoil; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            character: CharacterConfig::default(),
            player: PlayerConfig::default(),
            scheduler: SchedulerConfig::default(),
            aspect_ratio: 16.0 / 9.0,
            fixed_delta_ms: None,
            seed: None,
        }
    }
}

#[derive(Debug)]
pub struct BossAsset {
    pub name: String,
    pub root: SceneNode,
    /// Baked into the colliders. Keep rotation out of it; use `rotation`.
    pub options: LoadOptions,
    /// Euler angles in radians applied to the bodies after loading.
    pub rotation: Vec3,
    pub altitude: f32,
    pub health: f32,
}

#[derive(Debug)]
pub struct SceneAssets {
    pub level: SceneNode,
    pub level_options: LoadOptions,
    pub bosses: Vec<BossAsset>,
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

pub struct Scene {
    world: Arc<Mutex<PhysicsWorld>>,
    published: Arc<Mutex<FrameSnapshot>>,
    /// What this frame draws: the state after the previous step.
    draw_state: FrameSnapshot,
    physics: Option<PhysicsThread>,
    level: StaticModel,
    bosses: Vec<Boss>,
    player: Player,
    culler: FrustumCuller,
    stats: FrameStats,
    clock: FrameClock,
    delta_ms: f32,
    fixed_delta_ms: Option<f32>,
    aspect_ratio: f32,
}

impl Scene {
    pub fn load(config: SceneConfig, assets: SceneAssets) -> Result<Self> {
        let start = Instant::now();
        let mut world = PhysicsWorld::new(config.world, config.character)?;

        let level = StaticModel::load(&mut world, &assets.level, DEFAULT_MESH_MASS, &assets.level_options)
            .map_err(|e| e.context("loading level"))?;

        let mut flight = FlightScript::new();
        let mut bosses = Vec::with_capacity(assets.bosses.len());
        for asset in assets.bosses {
            let model = DynamicModel::load(&mut world, &asset.root, DEFAULT_MESH_MASS, &asset.options)
                .map_err(|e| e.context(format!("loading boss '{}'", asset.name)))?;
            model.set_rotation(&mut world, asset.rotation);
            flight.add_ship(model.bodies().clone(), asset.altitude);
            bosses.push(Boss::with_health(asset.name, model, asset.health));
        }

        world.optimize_broad_phase();

        let player = match config.seed {
            Some(seed) => Player::with_seed(config.player, world.character_position(), seed),
            None => Player::new(config.player, world.character_position()),
        };

        let mut draw_state = FrameSnapshot::new();
        world.snapshot_into(&mut draw_state);
        let published = Arc::new(Mutex::new(draw_state.clone()));
        let world = Arc::new(Mutex::new(world));

        let physics = {
            let world = Arc::clone(&world);
            let published = Arc::clone(&published);
            PhysicsThread::spawn(config.scheduler, move |delta_ms| {
                let mut world = world.lock();
                flight.apply(&mut world, delta_ms);
                world.update(delta_ms)?;
                world.snapshot_into(&mut published.lock());
                Ok(())
            })?
        };

        log::info!(
            "scene loaded in {:.1} ms: {} level meshes, {} bosses, {} bodies",
            start.elapsed().as_secs_f32() * 1000.0,
            level.meshes().len(),
            bosses.len(),
            draw_state.len()
        );

        Ok(Self {
            world,
            published,
            draw_state,
            physics: Some(physics),
            level,
            bosses,
            player,
            culler: FrustumCuller::new(),
            stats: FrameStats::new(),
            clock: FrameClock::new(),
            delta_ms: config.fixed_delta_ms.unwrap_or(FRAME_MS),
            fixed_delta_ms: config.fixed_delta_ms,
            aspect_ratio: config.aspect_ratio,
        })
    }

    /// Run one frame. A physics error ends the frame with that error; the
    /// scene cannot continue afterwards.
    pub fn run_frame<I, R, A>(&mut self, input: &I, renderer: &mut R, audio: &mut A) -> Result<()>
    where
        I: InputSource + ?Sized,
        R: RenderSink + ?Sized,
        A: AudioSink + ?Sized,
    {
        let frame_start = Instant::now();
        let delta_ms = self.delta_ms;

        let outcome = {
            let mut world = self.world.lock();
            self.player.update(input, &mut world, &mut self.bosses, delta_ms)
        };
        audio.set_playing(SoundCue::Shoot, outcome.firing);
        audio.set_playing(SoundCue::Hit, outcome.hit);

        self.physics_thread()?.request_update(delta_ms);

        self.draw(renderer);

        self.physics_thread()?.wait_for_done()?;
        self.draw_state.clone_from(&self.published.lock());

        {
            let mut world = self.world.lock();
            for boss in &mut self.bosses {
                boss.despawn_if_defeated(&mut world);
            }
        }
        self.stats.render_and_physics.record_duration(frame_start.elapsed());

        let swap_start = Instant::now();
        renderer.present();
        self.stats.events_and_swap.record_duration(swap_start.elapsed());

        let measured = self.clock.tick();
        self.stats.frame.record(measured);
        self.delta_ms = self.fixed_delta_ms.unwrap_or(measured);
        Ok(())
    }

    fn physics_thread(&mut self) -> Result<&mut PhysicsThread> {
        self.physics
            .as_mut()
            .ok_or_else(|| Error::custom("scene already shut down"))
    }

    fn draw<R: RenderSink + ?Sized>(&mut self, renderer: &mut R) {
        let view = self.player.view_matrix();
        let projection = self.player.projection_matrix(self.aspect_ratio);

        for mesh in self
            .level
            .visible_meshes(&mut self.culler, &self.draw_state, &view, &projection)
        {
            renderer.draw_mesh(MeshRef::Level { mesh: mesh.index }, &mesh.transform, &view, &projection);
        }

        for (index, boss) in self.bosses.iter().enumerate() {
            if boss.should_despawn() {
                continue;
            }
            let Some(model) = boss.model().get_model_matrix(&self.draw_state) else {
                continue;
            };
            for mesh in boss.model().meshes() {
                let transform = model * mesh.transform;
                let mesh_ref = MeshRef::Boss {
                    boss: index,
                    mesh: mesh.index,
                };
                renderer.draw_mesh(mesh_ref, &transform, &view, &projection);
            }
        }

        for boss in &self.bosses {
            renderer.draw_health_bar(boss.health_bar_scale());
        }
    }

    /// Dump statistics, stop the physics thread and join it.
    pub fn shutdown(mut self) -> Result<()> {
        self.stats.dump();
        match self.physics.take() {
            Some(physics) => physics.shutdown(),
            None => Ok(()),
        }
    }

    /// Read the world between frames.
    pub fn with_world<T>(&self, f: impl FnOnce(&PhysicsWorld) -> T) -> T {
        f(&self.world.lock())
    }

    pub fn draw_state(&self) -> &FrameSnapshot {
        &self.draw_state
    }

    pub fn bosses(&self) -> &[Boss] {
        &self.bosses
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn level(&self) -> &StaticModel {
        &self.level
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn culler(&self) -> &FrustumCuller {
        &self.culler
    }

    /// Delta the next frame will step by.
    pub fn delta_ms(&self) -> f32 {
        self.delta_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::{demo_assets, HeadlessAudio, HeadlessRenderer, ScriptedInput};
    use crate::player::Action;

    fn config() -> SceneConfig {
        SceneConfig {
            world: WorldConfig {
                worker_threads: 1,
                ..WorldConfig::default()
            },
            fixed_delta_ms: Some(FRAME_MS),
            seed: Some(1),
            ..SceneConfig::default()
        }
    }

    fn boss_translation(renderer: &HeadlessRenderer, boss: usize) -> Option<Vec3> {
        renderer
            .draws()
            .iter()
            .find(|(mesh, _)| matches!(mesh, MeshRef::Boss { boss: b, .. } if *b == boss))
            .map(|(_, m)| m.w_axis.truncate())
    }

    #[test]
    fn test_frames_step_and_present() {
        let mut scene = Scene::load(config(), demo_assets()).unwrap();
        let mut renderer = HeadlessRenderer::new();
        let mut audio = HeadlessAudio::new();
        for _ in 0..5 {
            scene.run_frame(&ScriptedInput::new(), &mut renderer, &mut audio).unwrap();
        }
        assert_eq!(renderer.presents(), 5);
        assert_eq!(scene.stats().frames(), 5);
        assert_eq!(scene.draw_state().step_index(), 5);
        assert_eq!(scene.with_world(|w| w.metrics().update_count()), 5);
        assert!(!audio.is_playing(SoundCue::Shoot));
        scene.shutdown().unwrap();
    }

    #[test]
    fn test_draws_lag_physics_by_one_frame() {
        let mut scene = Scene::load(config(), demo_assets()).unwrap();
        let mut renderer = HeadlessRenderer::new();
        let mut audio = HeadlessAudio::new();

        // Before the first step the ships still sit where they were loaded.
        scene.run_frame(&ScriptedInput::new(), &mut renderer, &mut audio).unwrap();
        let first = boss_translation(&renderer, 0).unwrap();
        assert!(first.length() < 1e-3);
        let stepped = scene.with_world(|w| scene.bosses()[0].model().get_position(w)).unwrap();
        assert!((stepped.x - 300.0).abs() < 1.0);

        scene.run_frame(&ScriptedInput::new(), &mut renderer, &mut audio).unwrap();
        let second = boss_translation(&renderer, 0).unwrap();
        assert!((second.x - stepped.x).abs() < 1e-3);
        scene.shutdown().unwrap();
    }

    #[test]
    fn test_defeated_boss_is_removed_after_the_wait() {
        let mut config = config();
        config.world.gravity = Vec3::ZERO;
        let mut assets = demo_assets();
        for boss in &mut assets.bosses {
            boss.health = 1.0;
            boss.altitude = config.character.spawn.y;
        }
        let mut scene = Scene::load(config, assets).unwrap();
        let bodies_before = scene.with_world(|w| w.body_count());
        let mut renderer = HeadlessRenderer::new();
        let mut audio = HeadlessAudio::new();

        let fire = ScriptedInput::new().with(Action::Fire);
        scene.run_frame(&fire, &mut renderer, &mut audio).unwrap();
        assert!(audio.is_playing(SoundCue::Shoot));
        assert!(audio.is_playing(SoundCue::Hit));
        let defeated = scene.bosses().iter().filter(|b| b.model().is_removed()).count();
        assert_eq!(defeated, 1);
        let removed = scene.bosses().iter().find(|b| b.model().is_removed()).unwrap();
        let parts = removed.model().body_handles().len();
        assert_eq!(scene.with_world(|w| w.body_count()), bodies_before - parts);

        scene.run_frame(&ScriptedInput::new(), &mut renderer, &mut audio).unwrap();
        assert!(!audio.is_playing(SoundCue::Hit));
        let index = scene.bosses().iter().position(|b| b.model().is_removed()).unwrap();
        assert!(boss_translation(&renderer, index).is_none());
        assert!(renderer.health_bars().contains(&0.0));
        scene.shutdown().unwrap();
    }

    #[test]
    fn test_physics_error_ends_frame() {
        let mut config = config();
        config.fixed_delta_ms = Some(-1.0);
        let mut scene = Scene::load(config, demo_assets()).unwrap();
        let mut renderer = HeadlessRenderer::new();
        let mut audio = HeadlessAudio::new();
        let err = scene
            .run_frame(&ScriptedInput::new(), &mut renderer, &mut audio)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDelta(_)));
        assert!(scene.run_frame(&ScriptedInput::new(), &mut renderer, &mut audio).is_err());
    }
}
