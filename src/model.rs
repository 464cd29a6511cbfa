// src/model.rs
//! Model loading and the two physics-backed model kinds.
//!
//! The loader walks a [`SceneNode`] tree, accumulating transforms, and hands
//! every mesh to a registration strategy that decides whether the mesh gets a
//! collider and of which kind. File parsing is out of scope; callers build
//! the node tree from whatever asset source they have.

use std::collections::{HashMap, HashSet};
use std::fmt;

use glam::{Mat4, Vec3};

use crate::culling::FrustumCuller;
use crate::error::Result;
use crate::factory::{construct_dynamic_mesh, construct_static_mesh, PhysicsObject};
use crate::physics::{BodyHandle, PhysicsWorld};
use crate::snapshot::BodyQuery;

// ---------------------------------------------------------------------------
// Source data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Diffuse,
    Specular,
    Normal,
    Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureRef {
    pub path: String,
    pub kind: TextureKind,
}

impl TextureRef {
    pub fn new(path: impl Into<String>, kind: TextureKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Geometry of one mesh in the local space of its node.
#[derive(Debug, Clone, Default)]
pub struct MeshGeometry {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub textures: Vec<TextureRef>,
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    /// Relative to the parent node.
    pub transform: Mat4,
    pub meshes: Vec<MeshGeometry>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_mesh(mut self, mesh: MeshGeometry) -> Self {
        self.meshes.push(mesh);
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }
}

// ---------------------------------------------------------------------------
// Textures
// ---------------------------------------------------------------------------

/// Stable index into a [`TextureArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u32);

impl TextureId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Textures of one model, deduplicated by path. Ids stay valid as the arena
/// grows.
#[derive(Debug, Default, Clone)]
pub struct TextureArena {
    textures: Vec<TextureRef>,
    by_path: HashMap<String, TextureId>,
}

impl TextureArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, texture: &TextureRef) -> TextureId {
        if let Some(id) = self.by_path.get(&texture.path) {
            return *id;
        }
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(texture.clone());
        self.by_path.insert(texture.path.clone(), id);
        id
    }

    pub fn get(&self, id: TextureId) -> Option<&TextureRef> {
        self.textures.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TextureId, &TextureRef)> {
        self.textures
            .iter()
            .enumerate()
            .map(|(i, t)| (TextureId(i as u32), t))
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedMesh {
    /// Position in load order.
    pub index: usize,
    pub name: String,
    /// Accumulated world transform of the owning node.
    pub transform: Mat4,
    pub index_count: usize,
    pub textures: Vec<TextureId>,
    pub object: Option<PhysicsObject>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedModel {
    pub meshes: Vec<LoadedMesh>,
    pub textures: TextureArena,
}

impl LoadedModel {
    /// Bodies of every registered mesh, in load order.
    pub fn body_handles(&self) -> Vec<BodyHandle> {
        self.meshes
            .iter()
            .filter_map(|m| m.object.map(|o| o.body))
            .collect()
    }
}

/// What the loader does with each mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Registration {
    /// Render-only.
    None,
    Static { mass: f32 },
    Kinematic { mass: f32 },
}

impl Registration {
    pub fn register(
        &self,
        world: &mut PhysicsWorld,
        mesh: &MeshGeometry,
        transform: &Mat4,
    ) -> Result<Option<PhysicsObject>> {
        match *self {
            Registration::None => Ok(None),
            Registration::Static { mass } => {
                construct_static_mesh(world, mass, &mesh.positions, &mesh.indices, transform).map(Some)
            }
            Registration::Kinematic { mass } => {
                construct_dynamic_mesh(world, mass, &mesh.positions, &mesh.indices, transform).map(Some)
            }
        }
    }
}

pub type MeshFilter = Box<dyn Fn(&MeshGeometry) -> bool + Send + Sync>;

pub struct LoadOptions {
    /// Applied above the root node.
    pub transform: Mat4,
    /// Meshes for which this returns `true` are dropped before registration.
    pub skip: Option<MeshFilter>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            skip: None,
        }
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("transform", &self.transform)
            .field("skip", &self.skip.is_some())
            .finish()
    }
}

impl LoadOptions {
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_skip<F>(mut self, skip: F) -> Self
    where
        F: Fn(&MeshGeometry) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Box::new(skip));
        self
    }
}

/// Load with one of the built-in registration strategies.
pub fn load_model(
    world: &mut PhysicsWorld,
    root: &SceneNode,
    registration: Registration,
    options: &LoadOptions,
) -> Result<LoadedModel> {
    load_with(world, root, options, |world, mesh, transform| {
        registration.register(world, mesh, transform)
    })
}

/// Load with a caller-supplied registration strategy.
pub fn load_with<F>(
    world: &mut PhysicsWorld,
    root: &SceneNode,
    options: &LoadOptions,
    mut register: F,
) -> Result<LoadedModel>
where
    F: FnMut(&mut PhysicsWorld, &MeshGeometry, &Mat4) -> Result<Option<PhysicsObject>>,
{
    let mut model = LoadedModel::default();
    let mut skipped = 0usize;
    let mut stack: Vec<(&SceneNode, Mat4)> = vec![(root, options.transform * root.transform)];

    while let Some((node, transform)) = stack.pop() {
        for mesh in &node.meshes {
            if options.skip.as_ref().is_some_and(|skip| skip(mesh)) {
                skipped += 1;
                continue;
            }
            let object = register(world, mesh, &transform)
                .map_err(|e| e.context(format!("mesh '{}' of node '{}'", mesh.name, node.name)))?;
            let textures = mesh.textures.iter().map(|t| model.textures.intern(t)).collect();
            model.meshes.push(LoadedMesh {
                index: model.meshes.len(),
                name: mesh.name.clone(),
                transform,
                index_count: mesh.indices.len(),
                textures,
                object,
            });
        }
        // Reverse so children are visited in declaration order.
        for child in node.children.iter().rev() {
            stack.push((child, transform * child.transform));
        }
    }

    log::info!(
        "loaded '{}': {} meshes, {} skipped, {} textures",
        root.name,
        model.meshes.len(),
        skipped,
        model.textures.len()
    );
    Ok(model)
}

// ---------------------------------------------------------------------------
// Static model
// ---------------------------------------------------------------------------

/// Level geometry. Every mesh is an immovable collider.
#[derive(Debug, Clone)]
pub struct StaticModel {
    model: LoadedModel,
    bodies: Vec<BodyHandle>,
}

impl StaticModel {
    pub fn load(
        world: &mut PhysicsWorld,
        root: &SceneNode,
        mass: f32,
        options: &LoadOptions,
    ) -> Result<Self> {
        let model = load_model(world, root, Registration::Static { mass }, options)?;
        Ok(Self::from_loaded(model))
    }

    pub fn from_loaded(model: LoadedModel) -> Self {
        let bodies = model.body_handles();
        Self { model, bodies }
    }

    pub fn meshes(&self) -> &[LoadedMesh] {
        &self.model.meshes
    }

    pub fn textures(&self) -> &TextureArena {
        &self.model.textures
    }

    pub fn body_handles(&self) -> &[BodyHandle] {
        &self.bodies
    }

    /// Meshes to draw this frame. Meshes without a body are always kept.
    pub fn visible_meshes<'a, Q>(
        &'a self,
        culler: &mut FrustumCuller,
        query: &Q,
        view: &Mat4,
        projection: &Mat4,
    ) -> Vec<&'a LoadedMesh>
    where
        Q: BodyQuery + Sync + ?Sized,
    {
        let visible: HashSet<BodyHandle> = culler
            .get_visible_bodies(query, &self.bodies, view, projection)
            .into_iter()
            .collect();
        self.model
            .meshes
            .iter()
            .filter(|m| m.object.map_or(true, |o| visible.contains(&o.body)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Dynamic model
// ---------------------------------------------------------------------------

/// Bodies of a multi-part model, commanded as one rigid unit. Cheap to clone,
/// so a copy can travel to the physics thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyGroup {
    bodies: Vec<BodyHandle>,
}

impl BodyGroup {
    pub fn new(bodies: Vec<BodyHandle>) -> Self {
        Self { bodies }
    }

    pub fn handles(&self) -> &[BodyHandle] {
        &self.bodies
    }

    pub fn first(&self) -> Option<BodyHandle> {
        self.bodies.first().copied()
    }

    pub fn set_position(&self, world: &mut PhysicsWorld, position: Vec3) {
        for body in &self.bodies {
            world.set_position(*body, position);
        }
    }

    pub fn set_velocity(&self, world: &mut PhysicsWorld, velocity: Vec3) {
        for body in &self.bodies {
            world.set_velocity(*body, velocity);
        }
    }

    pub fn add_velocity(&self, world: &mut PhysicsWorld, delta: Vec3) {
        for body in &self.bodies {
            world.add_velocity(*body, delta);
        }
    }

    /// Euler angles in radians.
    pub fn set_rotation(&self, world: &mut PhysicsWorld, euler: Vec3) {
        for body in &self.bodies {
            world.set_rotation_euler(*body, euler);
        }
    }

    pub fn get_position<Q: BodyQuery + ?Sized>(&self, query: &Q) -> Option<Vec3> {
        query.position(self.first()?)
    }

    /// Render transform from the first body only; the other parts are
    /// rigidly attached.
    pub fn get_model_matrix<Q: BodyQuery + ?Sized>(&self, query: &Q) -> Option<Mat4> {
        query.transform(self.first()?)
    }

    /// First body whose shape the ray hits within 1000 units of `origin`.
    pub fn cast_ray(&self, world: &PhysicsWorld, origin: Vec3, direction: Vec3) -> Option<BodyHandle> {
        let end = direction * 1000.0;
        self.bodies
            .iter()
            .copied()
            .find(|body| world.cast_ray_local(*body, origin, end, 1.0).is_some())
    }
}

/// Moving model whose meshes are kinematic colliders on the MOVING layer.
#[derive(Debug, Clone)]
pub struct DynamicModel {
    model: LoadedModel,
    group: BodyGroup,
    removed: bool,
}

impl DynamicModel {
    pub fn load(
        world: &mut PhysicsWorld,
        root: &SceneNode,
        mass: f32,
        options: &LoadOptions,
    ) -> Result<Self> {
        let model = load_model(world, root, Registration::Kinematic { mass }, options)?;
        Ok(Self::from_loaded(model))
    }

    pub fn from_loaded(model: LoadedModel) -> Self {
        let group = BodyGroup::new(model.body_handles());
        Self {
            model,
            group,
            removed: false,
        }
    }

    pub fn meshes(&self) -> &[LoadedMesh] {
        &self.model.meshes
    }

    pub fn textures(&self) -> &TextureArena {
        &self.model.textures
    }

    pub fn bodies(&self) -> &BodyGroup {
        &self.group
    }

    pub fn body_handles(&self) -> &[BodyHandle] {
        self.group.handles()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn set_position(&self, world: &mut PhysicsWorld, position: Vec3) {
        self.group.set_position(world, position);
    }

    pub fn set_velocity(&self, world: &mut PhysicsWorld, velocity: Vec3) {
        self.group.set_velocity(world, velocity);
    }

    pub fn add_velocity(&self, world: &mut PhysicsWorld, delta: Vec3) {
        self.group.add_velocity(world, delta);
    }

    pub fn set_rotation(&self, world: &mut PhysicsWorld, euler: Vec3) {
        self.group.set_rotation(world, euler);
    }

    pub fn get_position<Q: BodyQuery + ?Sized>(&self, query: &Q) -> Option<Vec3> {
        self.group.get_position(query)
    }

    pub fn get_model_matrix<Q: BodyQuery + ?Sized>(&self, query: &Q) -> Option<Mat4> {
        self.group.get_model_matrix(query)
    }

    /// Whether a ray from `origin` along `direction` hits any part. Order of
    /// testing is load order; the first hit wins.
    pub fn cast_ray_against_all_meshes(&self, world: &PhysicsWorld, origin: Vec3, direction: Vec3) -> bool {
        !self.removed && self.group.cast_ray(world, origin, direction).is_some()
    }

    /// Remove every body. Returns `false` if already removed.
    pub fn remove_from_physics(&mut self, world: &mut PhysicsWorld) -> bool {
        if self.removed {
            return false;
        }
        let removed = self
            .group
            .handles()
            .iter()
            .filter(|body| world.remove_body(**body))
            .count();
        self.removed = true;
        log::debug!("dynamic model removed {removed} bodies from physics");
        true
    }
}
