// src/physics.rs
//!
//! Rapier 3D physics world.
//!
//! ## Features
//! - Generational body handles: a removed handle never resolves again
//! - Hard capacity caps fixed at construction (bodies, body pairs, contacts)
//! - Sub-stepped `update` sized to 60Hz frames, capped at `MAX_SUBSTEPS`
//! - Intra-step parallelism on a world-owned `rayon` pool
//! - Numerical fault detection after every update
//! - First-person character controller owned by the world
//! - Step metrics, over-budget and over-contact-cap logging
//!
//! All mutation helpers validate the handle and return `false` / `None`
//! instead of failing when it is stale.

use std::time::{Duration, Instant};

use glam::{Quat, Vec3};
use rapier3d::prelude::*;

use crate::character::CharacterController;
use crate::config::{CharacterConfig, WorldConfig, FRAME_MS, MAX_SUBSTEPS, SUBSTEP_THRESHOLD};
use crate::convert::{from_point, from_rotation, from_vector, to_isometry, to_point, to_rotation, to_vector};
use crate::culling::Aabb;
use crate::error::{Error, Result};
use crate::layers::{interaction_groups, ObjectLayer};
use crate::snapshot::{BodyQuery, BodyState, FrameSnapshot};

/// Opaque body identifier. Wraps Rapier's generational index, so a handle
/// whose body was removed stays invalid even after its slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub(crate) RigidBodyHandle);

impl BodyHandle {
    #[inline]
    pub fn index(&self) -> u32 {
        self.0.into_raw_parts().0
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.0.into_raw_parts().1
    }
}

/// How a body moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionType {
    Static,
    /// Driven by position/velocity commands only.
    Kinematic,
    /// Force-integrated (the character).
    Dynamic,
}

impl MotionType {
    fn builder(self) -> RigidBodyBuilder {
        match self {
            MotionType::Static => RigidBodyBuilder::fixed(),
            MotionType::Kinematic => RigidBodyBuilder::kinematic_velocity_based(),
            MotionType::Dynamic => RigidBodyBuilder::dynamic(),
        }
    }

    fn of(body_type: RigidBodyType) -> Self {
        match body_type {
            RigidBodyType::Fixed => MotionType::Static,
            RigidBodyType::Dynamic => MotionType::Dynamic,
            _ => MotionType::Kinematic,
        }
    }
}

/// Everything `add_body` needs to create one body with one collider.
#[derive(Clone)]
pub struct BodyDesc {
    pub shape: SharedShape,
    pub position: Vec3,
    pub rotation: Quat,
    pub motion: MotionType,
    pub layer: ObjectLayer,
    /// Mass override. Applied through collider density when the shape has volume.
    pub mass: Option<f32>,
    pub friction: Option<f32>,
}

impl BodyDesc {
    pub fn new(shape: SharedShape, motion: MotionType, layer: ObjectLayer) -> Self {
        Self {
            shape,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            motion,
            layer,
            mass: None,
            friction: None,
        }
    }

    pub fn with_transform(mut self, position: Vec3, rotation: Quat) -> Self {
        self.position = position;
        self.rotation = rotation;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = Some(friction);
        self
    }
}

/// Number of sub-steps `update` takes for a delta in milliseconds: one per
/// 60Hz frame once the delta exceeds 105% of a frame, capped at `MAX_SUBSTEPS`.
pub fn substep_count(delta_ms: f32) -> u32 {
    let ratio = delta_ms / FRAME_MS;
    if ratio >= SUBSTEP_THRESHOLD {
        (ratio.ceil() as u32).min(MAX_SUBSTEPS)
    } else {
        1
    }
}

/// Outcome of one `update`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub substeps: u32,
    pub elapsed: Duration,
    pub over_budget: bool,
    /// Active contacts exceeded `WorldConfig::max_contact_constraints` after the step.
    pub over_contact_cap: bool,
}

/* -------------------------------------------------------------------------- */
/*                              Metrics                                       */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Default)]
pub struct PhysicsMetrics {
    /// Last update time in milliseconds
    pub last_step_time_ms: f32,
    pub last_substeps: u32,
    pub total_substeps: u64,
    pub over_budget_updates: u64,
    pub over_contact_cap_updates: u64,
    pub broad_phase_optimizations: u64,
    pub body_count: usize,
    pub contact_pair_count: usize,
    accumulated_step_time_ms: f32,
    update_count: u64,
}

impl PhysicsMetrics {
    fn record(&mut self, report: &StepReport, body_count: usize, contact_pair_count: usize) {
        let ms = report.elapsed.as_secs_f32() * 1000.0;
        self.last_step_time_ms = ms;
        self.last_substeps = report.substeps;
        self.total_substeps += u64::from(report.substeps);
        self.over_budget_updates += u64::from(report.over_budget);
        self.over_contact_cap_updates += u64::from(report.over_contact_cap);
        self.body_count = body_count;
        self.contact_pair_count = contact_pair_count;
        self.accumulated_step_time_ms += ms;
        self.update_count += 1;
    }

    /// Number of completed `update` calls.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Get average update time
    pub fn average_step_time_ms(&self) -> f32 {
        if self.update_count > 0 {
            self.accumulated_step_time_ms / self.update_count as f32
        } else {
            0.0
        }
    }
}

/* -------------------------------------------------------------------------- */
/*                              Physics World                                 */
/* -------------------------------------------------------------------------- */

/// Owns every Rapier set plus the character. Constructed once, torn down on drop.
pub struct PhysicsWorld {
    config: WorldConfig,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    workers: Option<rayon::ThreadPool>,
    character: CharacterController,
    inserts_since_optimize: usize,
    metrics: PhysicsMetrics,
}

impl PhysicsWorld {
    pub fn new(config: WorldConfig, character: CharacterConfig) -> Result<Self> {
        let worker_count = config.worker_count();
        let workers = if worker_count > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(worker_count)
                .thread_name(|i| format!("physics-worker-{i}"))
                .build()?;
            Some(pool)
        } else {
            None
        };

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();
        let character = CharacterController::spawn(&mut bodies, &mut colliders, character);

        log::debug!(
            "physics world created: {} workers, max {} bodies, max {} contacts",
            worker_count,
            config.max_bodies,
            config.max_contact_constraints
        );

        Ok(Self {
            gravity: to_vector(config.gravity),
            config,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            workers,
            character,
            inserts_since_optimize: 0,
            metrics: PhysicsMetrics::default(),
        })
    }

    #[inline]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    #[inline]
    pub fn metrics(&self) -> &PhysicsMetrics {
        &self.metrics
    }

    // ------------------------------------------------------------------
    // Body lifecycle
    // ------------------------------------------------------------------

    /// Create, insert and activate a body. Fails when a hard cap is reached.
    pub fn add_body(&mut self, desc: BodyDesc) -> Result<BodyHandle> {
        self.check_capacity()?;
        if !desc.position.is_finite() || !desc.rotation.is_finite() {
            return Err(Error::shape(
                "add_body",
                format!("non-finite transform {:?} / {:?}", desc.position, desc.rotation),
            ));
        }

        let body = desc
            .motion
            .builder()
            .position(to_isometry(desc.position, desc.rotation))
            .user_data(desc.layer.raw())
            .build();

        let mut collider = ColliderBuilder::new(desc.shape.clone())
            .collision_groups(interaction_groups(desc.layer))
            .user_data(desc.layer.raw());
        if let Some(friction) = desc.friction {
            collider = collider.friction(friction);
        }
        if let Some(mass) = desc.mass {
            let volume = desc.shape.mass_properties(1.0).mass();
            if volume > f32::EPSILON {
                collider = collider.density(mass / volume);
            } else {
                log::trace!("mass override {mass} ignored for a zero-volume shape");
            }
        }

        let handle = self.bodies.insert(body);
        self.colliders
            .insert_with_parent(collider.build(), handle, &mut self.bodies);

        self.inserts_since_optimize += 1;
        if let Some(every) = self.config.optimize_after_inserts {
            if self.inserts_since_optimize >= every {
                self.optimize_broad_phase();
            }
        }

        Ok(BodyHandle(handle))
    }

    fn check_capacity(&self) -> Result<()> {
        if self.bodies.len() >= self.config.max_bodies {
            return Err(Error::CapacityExceeded {
                resource: "body",
                limit: self.config.max_bodies,
            });
        }
        let (pairs, active) = self.contact_counts();
        if pairs >= self.config.max_body_pairs {
            return Err(Error::CapacityExceeded {
                resource: "body pair",
                limit: self.config.max_body_pairs,
            });
        }
        if active >= self.config.max_contact_constraints {
            return Err(Error::CapacityExceeded {
                resource: "contact constraint",
                limit: self.config.max_contact_constraints,
            });
        }
        Ok(())
    }

    /// Narrow-phase pairs and the active-contact subset, in one pass.
    fn contact_counts(&self) -> (usize, usize) {
        self.narrow_phase
            .contact_pairs()
            .fold((0, 0), |(pairs, active), pair| {
                (pairs + 1, active + usize::from(pair.has_any_active_contact))
            })
    }

    /// Pairs currently in touch.
    pub fn active_contact_count(&self) -> usize {
        self.contact_counts().1
    }

    /// Inserts since the query structure was last rebuilt.
    #[inline]
    pub fn inserts_since_optimize(&self) -> usize {
        self.inserts_since_optimize
    }

    /// Remove a body and its colliders. Returns `false` for a stale handle or
    /// the character, which lives as long as the world.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        if handle == self.character.handle() {
            log::warn!("refusing to remove the character body");
            return false;
        }
        let removed = self
            .bodies
            .remove(
                handle.0,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some();
        if removed {
            log::trace!("removed body {}:{}", handle.index(), handle.generation());
        }
        removed
    }

    #[inline]
    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains(handle.0)
    }

    /// Live bodies, the character included.
    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Handles of every live body except the character.
    pub fn body_handles(&self) -> Vec<BodyHandle> {
        let character = self.character.handle().0;
        self.bodies
            .iter()
            .filter(|(h, _)| *h != character)
            .map(|(h, _)| BodyHandle(h))
            .collect()
    }

    // ------------------------------------------------------------------
    // Mutation (activation-triggering, stale-safe)
    // ------------------------------------------------------------------

    pub fn set_position(&mut self, handle: BodyHandle, position: Vec3) -> bool {
        match self.bodies.get_mut(handle.0) {
            Some(body) => {
                body.set_translation(to_vector(position), true);
                true
            }
            None => false,
        }
    }

    pub fn set_rotation(&mut self, handle: BodyHandle, rotation: Quat) -> bool {
        match self.bodies.get_mut(handle.0) {
            Some(body) => {
                let mut pose = *body.position();
                pose.rotation = to_rotation(rotation);
                body.set_position(pose, true);
                true
            }
            None => false,
        }
    }

    /// Euler angles in radians, applied as `Rz * Ry * Rx`.
    pub fn set_rotation_euler(&mut self, handle: BodyHandle, euler: Vec3) -> bool {
        self.set_rotation(handle, euler_to_quat(euler))
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec3) -> bool {
        match self.bodies.get_mut(handle.0) {
            Some(body) => {
                body.set_linvel(to_vector(velocity), true);
                true
            }
            None => false,
        }
    }

    pub fn add_velocity(&mut self, handle: BodyHandle, delta: Vec3) -> bool {
        match self.bodies.get_mut(handle.0) {
            Some(body) => {
                let velocity = *body.linvel() + to_vector(delta);
                body.set_linvel(velocity, true);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_position(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(handle.0).map(|b| from_vector(b.translation()))
    }

    pub fn get_rotation(&self, handle: BodyHandle) -> Option<Quat> {
        self.bodies.get(handle.0).map(|b| from_rotation(b.rotation()))
    }

    pub fn get_velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(handle.0).map(|b| from_vector(b.linvel()))
    }

    pub fn motion_type(&self, handle: BodyHandle) -> Option<MotionType> {
        self.bodies.get(handle.0).map(|b| MotionType::of(b.body_type()))
    }

    pub fn layer(&self, handle: BodyHandle) -> Option<ObjectLayer> {
        self.bodies
            .get(handle.0)
            .map(|b| ObjectLayer::from_raw(b.user_data))
    }

    /// Union of the world AABBs of the body's colliders.
    pub fn world_bounds(&self, handle: BodyHandle) -> Option<Aabb> {
        let body = self.bodies.get(handle.0)?;
        body.colliders()
            .iter()
            .filter_map(|c| self.colliders.get(*c))
            .map(|collider| {
                let aabb = collider.shape().compute_aabb(&collider_pose(body, collider));
                Aabb::new(from_point(&aabb.mins), from_point(&aabb.maxs))
            })
            .reduce(|a, b| a.union(&b))
    }

    /// World-space vertices of the body's triangle-mesh colliders.
    pub fn mesh_vertices(&self, handle: BodyHandle) -> Option<Vec<Vec3>> {
        let body = self.bodies.get(handle.0)?;
        let mut out = Vec::new();
        for collider in body.colliders().iter().filter_map(|c| self.colliders.get(*c)) {
            if let Some(mesh) = collider.shape().as_trimesh() {
                let pose = collider_pose(body, collider);
                out.extend(mesh.vertices().iter().map(|v| from_point(&(pose * v))));
            }
        }
        Some(out)
    }

    /// Test a world-space ray against this body's shapes only. The ray is moved
    /// into each collider's local frame; `max_toi` is in units of `direction`.
    pub fn cast_ray_local(
        &self,
        handle: BodyHandle,
        origin: Vec3,
        direction: Vec3,
        max_toi: f32,
    ) -> Option<f32> {
        let body = self.bodies.get(handle.0)?;
        body.colliders()
            .iter()
            .filter_map(|c| self.colliders.get(*c))
            .find_map(|collider| {
                let pose = collider_pose(body, collider);
                let ray = Ray::new(
                    pose.inverse_transform_point(&to_point(origin)),
                    pose.inverse_transform_vector(&to_vector(direction)),
                );
                collider.shape().cast_local_ray(&ray, max_toi, true)
            })
    }

    // ------------------------------------------------------------------
    // Character
    // ------------------------------------------------------------------

    #[inline]
    pub fn character(&self) -> &CharacterController {
        &self.character
    }

    pub fn character_add_velocity(&mut self, delta: Vec3) {
        self.character.add_velocity(&mut self.bodies, delta);
    }

    pub fn character_position(&self) -> Vec3 {
        self.character.position(&self.bodies)
    }

    pub fn character_velocity(&self) -> Vec3 {
        self.character.velocity(&self.bodies)
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance the simulation by `delta_ms` milliseconds.
    ///
    /// A non-finite body afterwards is a fatal [`Error::Simulation`]; the state
    /// cannot be trusted past that point.
    pub fn update(&mut self, delta_ms: f32) -> Result<StepReport> {
        if !delta_ms.is_finite() || delta_ms < 0.0 {
            return Err(Error::InvalidDelta(delta_ms));
        }
        if delta_ms == 0.0 {
            return Ok(StepReport {
                substeps: 0,
                elapsed: Duration::ZERO,
                over_budget: false,
                over_contact_cap: false,
            });
        }

        let substeps = substep_count(delta_ms);
        let dt = delta_ms / 1000.0 / substeps as f32;
        let start = Instant::now();

        for _ in 0..substeps {
            self.step_once(dt);
        }

        if let Some(reason) = self.find_numerical_fault() {
            log::error!(
                "physics update failed: {reason} (delta {delta_ms} ms, {substeps} sub-steps)"
            );
            return Err(Error::Simulation {
                reason,
                delta_ms,
                substeps,
            });
        }

        self.character
            .update(&mut self.bodies, &self.colliders, &self.query_pipeline);

        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_secs_f32() * 1000.0;
        let over_budget = elapsed_ms > self.config.step_budget_ms;
        if over_budget {
            log::warn!(
                "physics update took {:.1} ms (delta {:.2} ms, ratio {:.2}, {} sub-steps)",
                elapsed_ms,
                delta_ms,
                delta_ms / FRAME_MS,
                substeps
            );
        }

        let contacts = self.active_contact_count();
        let over_contact_cap = contacts > self.config.max_contact_constraints;
        if over_contact_cap {
            log::warn!(
                "{} active contacts after update, limit is {}",
                contacts,
                self.config.max_contact_constraints
            );
        }

        let report = StepReport {
            substeps,
            elapsed,
            over_budget,
            over_contact_cap,
        };
        self.metrics.record(&report, self.bodies.len(), contacts);
        Ok(report)
    }

    fn step_once(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        let Self {
            gravity,
            integration_parameters,
            pipeline,
            islands,
            broad_phase,
            narrow_phase,
            bodies,
            colliders,
            impulse_joints,
            multibody_joints,
            ccd_solver,
            query_pipeline,
            workers,
            ..
        } = self;

        let mut run = || {
            pipeline.step(
                gravity,
                integration_parameters,
                islands,
                broad_phase,
                narrow_phase,
                bodies,
                colliders,
                impulse_joints,
                multibody_joints,
                ccd_solver,
                Some(&mut *query_pipeline),
                &(),
                &(),
            )
        };

        match workers {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn find_numerical_fault(&self) -> Option<String> {
        self.bodies
            .iter()
            .filter(|(_, body)| !body.is_fixed())
            .find_map(|(handle, body)| {
                let position = body.translation();
                let velocity = body.linvel();
                let finite = position.iter().chain(velocity.iter()).all(|c| c.is_finite());
                (!finite).then(|| {
                    let (index, generation) = handle.into_raw_parts();
                    format!(
                        "body {index}:{generation} diverged (position {:?}, velocity {:?})",
                        from_vector(position),
                        from_vector(velocity)
                    )
                })
            })
    }

    /// Rebuild the spatial query structure. Call once after bulk static loading;
    /// `WorldConfig::optimize_after_inserts` repeats it automatically.
    pub fn optimize_broad_phase(&mut self) {
        self.query_pipeline.update(&self.bodies, &self.colliders);
        log::debug!(
            "broad phase optimized: {} bodies, {} colliders",
            self.bodies.len(),
            self.colliders.len()
        );
        self.inserts_since_optimize = 0;
        self.metrics.broad_phase_optimizations += 1;
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    pub fn body_state(&self, handle: BodyHandle) -> Option<BodyState> {
        let body = self.bodies.get(handle.0)?;
        Some(BodyState {
            position: from_vector(body.translation()),
            rotation: from_rotation(body.rotation()),
            bounds: self.world_bounds(handle)?,
        })
    }

    /// Overwrite `snapshot` with the current state of every body.
    pub fn snapshot_into(&self, snapshot: &mut FrameSnapshot) {
        let states = self.bodies.iter().filter_map(|(handle, _)| {
            let handle = BodyHandle(handle);
            self.body_state(handle).map(|state| (handle, state))
        });
        snapshot.record(states, self.character_position(), self.metrics.update_count());
    }
}

impl Drop for PhysicsWorld {
    fn drop(&mut self) {
        log::debug!("physics world torn down with {} bodies", self.bodies.len());
    }
}

impl BodyQuery for PhysicsWorld {
    fn position(&self, body: BodyHandle) -> Option<Vec3> {
        self.get_position(body)
    }

    fn rotation(&self, body: BodyHandle) -> Option<Quat> {
        self.get_rotation(body)
    }

    fn world_bounds(&self, body: BodyHandle) -> Option<Aabb> {
        PhysicsWorld::world_bounds(self, body)
    }
}

/// World pose of an attached collider, derived from the body so it is
/// current even before the next step syncs collider positions.
fn collider_pose(body: &RigidBody, collider: &Collider) -> Isometry<Real> {
    match collider.position_wrt_parent() {
        Some(local) => body.position() * local,
        None => *collider.position(),
    }
}

/// Rotation from Euler angles in radians: X first, then Y, then Z.
#[inline]
pub fn euler_to_quat(euler: Vec3) -> Quat {
    Quat::from_rotation_z(euler.z) * Quat::from_rotation_y(euler.y) * Quat::from_rotation_x(euler.x)
}
