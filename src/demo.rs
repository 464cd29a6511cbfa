// src/demo.rs
//! Procedural demo content and headless collaborators.
//!
//! Stands in for the asset loader, window, GPU and audio device so the scene
//! can run anywhere: a grid of city blocks, two boss ships, scripted input
//! and sinks that only record what they were asked to do.

use std::collections::{HashMap, HashSet};
use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec2, Vec3};

use crate::model::{LoadOptions, MeshGeometry, SceneNode, TextureKind, TextureRef};
use crate::player::{Action, InputSource};
use crate::scene::{AudioSink, BossAsset, MeshRef, RenderSink, SceneAssets, SoundCue};

pub const BOSS_HEALTH: f32 = 500.0;

/// Index count of the ship's loose debris sub-mesh, which never gets drawn
/// or a collider.
pub const DEBRIS_INDEX_COUNT: usize = 216;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Closed box centred on the origin, 8 vertices and 12 outward-wound
/// triangles.
pub fn box_mesh(name: &str, half: Vec3) -> MeshGeometry {
    let positions = (0..8)
        .map(|i| {
            Vec3::new(
                if i & 1 == 0 { -half.x } else { half.x },
                if i & 2 == 0 { -half.y } else { half.y },
                if i & 4 == 0 { -half.z } else { half.z },
            )
        })
        .collect();
    #[rustfmt::skip]
    let indices = vec![
        0, 4, 6,  0, 6, 2, // -x
        1, 3, 7,  1, 7, 5, // +x
        0, 1, 5,  0, 5, 4, // -y
        2, 6, 7,  2, 7, 3, // +y
        0, 2, 3,  0, 3, 1, // -z
        4, 5, 7,  4, 7, 6, // +z
    ];
    MeshGeometry {
        name: name.to_owned(),
        positions,
        indices,
        textures: Vec::new(),
    }
}

/// Upward-facing quad in the XZ plane.
pub fn quad_mesh(name: &str, half_x: f32, half_z: f32) -> MeshGeometry {
    MeshGeometry {
        name: name.to_owned(),
        positions: vec![
            Vec3::new(-half_x, 0.0, -half_z),
            Vec3::new(half_x, 0.0, -half_z),
            Vec3::new(half_x, 0.0, half_z),
            Vec3::new(-half_x, 0.0, half_z),
        ],
        indices: vec![0, 2, 1, 0, 3, 2],
        textures: Vec::new(),
    }
}

/// Concatenate meshes into one, each shifted by its offset.
pub fn merge_meshes(name: &str, parts: &[(MeshGeometry, Vec3)]) -> MeshGeometry {
    let mut merged = MeshGeometry {
        name: name.to_owned(),
        ..MeshGeometry::default()
    };
    for (part, offset) in parts {
        let base = merged.positions.len() as u32;
        merged.positions.extend(part.positions.iter().map(|p| *p + *offset));
        merged.indices.extend(part.indices.iter().map(|i| i + base));
    }
    merged
}

/// Floor plus an `n × n` grid of buildings, streets running along the axes
/// through the origin.
pub fn city(blocks_per_side: usize, spacing: f32) -> SceneNode {
    let concrete = TextureRef::new("textures/concrete.png", TextureKind::Diffuse);
    let windows = TextureRef::new("textures/windows.png", TextureKind::Specular);

    let extent = blocks_per_side as f32 * spacing * 0.5 + 50.0;
    let mut floor = quad_mesh("floor", extent, extent);
    floor.textures.push(TextureRef::new("textures/asphalt.png", TextureKind::Diffuse));
    let mut root = SceneNode::new("city").with_mesh(floor);

    let center = (blocks_per_side as f32 - 1.0) * 0.5;
    for i in 0..blocks_per_side {
        for j in 0..blocks_per_side {
            let height = 5.0 + ((i * 7 + j * 13) % 5) as f32 * 3.0;
            let position = Vec3::new(
                (i as f32 - center) * spacing,
                height,
                (j as f32 - center) * spacing,
            );
            let mut building = box_mesh(&format!("building_{i}_{j}"), Vec3::new(4.0, height, 4.0));
            building.textures = vec![concrete.clone(), windows.clone()];
            root = root.with_child(
                SceneNode::new(format!("block_{i}_{j}"))
                    .with_transform(Mat4::from_translation(position))
                    .with_mesh(building),
            );
        }
    }
    root
}

pub fn spaceship(name: &str) -> SceneNode {
    let plating = TextureRef::new("textures/ship_plating.png", TextureKind::Diffuse);
    let mut hull = box_mesh("hull", Vec3::new(4.0, 1.5, 4.0));
    hull.textures = vec![plating.clone(), TextureRef::new("textures/ship_normal.png", TextureKind::Normal)];

    let wing = |side: f32| {
        let mut mesh = box_mesh(if side < 0.0 { "wing_left" } else { "wing_right" }, Vec3::new(2.0, 0.3, 2.0));
        mesh.textures = vec![plating.clone()];
        SceneNode::new(mesh.name.clone())
            .with_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, 6.0 * side)))
            .with_mesh(mesh)
    };

    let debris_parts: Vec<_> = (0..6)
        .map(|k| (box_mesh("chunk", Vec3::splat(0.2)), Vec3::new(k as f32 - 2.5, -2.0, 0.0)))
        .collect();
    let debris = merge_meshes("debris", &debris_parts);

    SceneNode::new(name)
        .with_mesh(hull)
        .with_mesh(debris)
        .with_child(wing(-1.0))
        .with_child(wing(1.0))
}

pub fn skip_debris(mesh: &MeshGeometry) -> bool {
    mesh.indices.len() == DEBRIS_INDEX_COUNT
}

/// City level and two boss ships.
pub fn demo_assets() -> SceneAssets {
    SceneAssets {
        level: city(6, 20.0),
        level_options: LoadOptions::default(),
        bosses: vec![
            BossAsset {
                name: "spaceship1".into(),
                root: spaceship("spaceship1"),
                options: LoadOptions::default().with_skip(skip_debris),
                rotation: Vec3::new(0.0, 0.0, FRAC_PI_2),
                altitude: 20.0,
                health: BOSS_HEALTH,
            },
            BossAsset {
                name: "spaceship2".into(),
                root: spaceship("spaceship2"),
                options: LoadOptions::default()
                    .with_transform(Mat4::from_scale(Vec3::splat(2.5)))
                    .with_skip(skip_debris),
                rotation: Vec3::new(0.0, FRAC_PI_2, 0.0),
                altitude: 10.0,
                health: BOSS_HEALTH,
            },
        ],
    }
}

// ---------------------------------------------------------------------------
// Headless collaborators
// ---------------------------------------------------------------------------

/// Fixed input state.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    active: HashSet<Action>,
    mouse: Vec2,
    captured: bool,
}

impl Default for ScriptedInput {
    fn default() -> Self {
        Self {
            active: HashSet::new(),
            mouse: Vec2::ZERO,
            captured: true,
        }
    }
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, action: Action) -> Self {
        self.active.insert(action);
        self
    }

    pub fn with_mouse(mut self, delta: Vec2) -> Self {
        self.mouse = delta;
        self
    }

    pub fn released(mut self) -> Self {
        self.captured = false;
        self
    }

    /// Benchmark pattern: walk, strafe while turning, then hold fire, on a
    /// four second loop at 60 frames per second.
    pub fn benchmark(frame: u64) -> Self {
        match frame % 240 {
            0..=59 => Self::new().with(Action::MoveForward),
            60..=119 => Self::new()
                .with(Action::StrafeRight)
                .with(Action::Sprint)
                .with_mouse(Vec2::new(0.01, 0.0)),
            120..=139 => Self::new().with(Action::Jump),
            _ => Self::new().with(Action::Fire),
        }
    }
}

impl InputSource for ScriptedInput {
    fn is_active(&self, action: Action) -> bool {
        self.active.contains(&action)
    }

    fn mouse_delta(&self) -> Vec2 {
        self.mouse
    }

    fn is_mouse_captured(&self) -> bool {
        self.captured
    }
}

/// Records draw calls. Accessors report the last presented frame.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    pending_draws: Vec<(MeshRef, Mat4)>,
    pending_bars: Vec<f32>,
    draws: Vec<(MeshRef, Mat4)>,
    health_bars: Vec<f32>,
    presents: usize,
    total_draws: usize,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draws(&self) -> &[(MeshRef, Mat4)] {
        &self.draws
    }

    pub fn health_bars(&self) -> &[f32] {
        &self.health_bars
    }

    pub fn presents(&self) -> usize {
        self.presents
    }

    pub fn total_draws(&self) -> usize {
        self.total_draws
    }
}

impl RenderSink for HeadlessRenderer {
    fn draw_mesh(&mut self, mesh: MeshRef, model: &Mat4, _view: &Mat4, _projection: &Mat4) {
        self.pending_draws.push((mesh, *model));
    }

    fn draw_health_bar(&mut self, scale: f32) {
        self.pending_bars.push(scale);
    }

    fn present(&mut self) {
        self.total_draws += self.pending_draws.len();
        std::mem::swap(&mut self.draws, &mut self.pending_draws);
        std::mem::swap(&mut self.health_bars, &mut self.pending_bars);
        self.pending_draws.clear();
        self.pending_bars.clear();
        self.presents += 1;
    }
}

/// Tracks which cues are playing.
#[derive(Debug, Default)]
pub struct HeadlessAudio {
    playing: HashMap<SoundCue, bool>,
}

impl HeadlessAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self, cue: SoundCue) -> bool {
        self.playing.get(&cue).copied().unwrap_or(false)
    }
}

impl AudioSink for HeadlessAudio {
    fn set_playing(&mut self, cue: SoundCue, playing: bool) {
        let was = self.playing.insert(cue, playing).unwrap_or(false);
        if was != playing {
            log::trace!("{cue:?} {}", if playing { "started" } else { "stopped" });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_is_closed_and_outward() {
        let mesh = box_mesh("b", Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.positions.len(), 8);
        assert_eq!(mesh.indices.len(), 36);
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| mesh.positions[tri[k] as usize]);
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) > 0.0, "inward triangle {tri:?}");
        }
    }

    #[test]
    fn test_debris_matches_skip_rule() {
        let ship = spaceship("s");
        let debris = ship.meshes.iter().find(|m| m.name == "debris").unwrap();
        assert!(skip_debris(debris));
        let hull = ship.meshes.iter().find(|m| m.name == "hull").unwrap();
        assert!(!skip_debris(hull));
    }

    #[test]
    fn test_city_keeps_streets_clear() {
        let level = city(6, 20.0);
        assert_eq!(level.children.len(), 36);
        for block in &level.children {
            let center = block.transform.transform_point3(Vec3::ZERO);
            assert!(center.z.abs() >= 10.0 - 1e-4);
            assert!(center.x.abs() >= 10.0 - 1e-4);
        }
    }

    #[test]
    fn test_renderer_reports_last_frame() {
        let mut renderer = HeadlessRenderer::new();
        renderer.draw_mesh(MeshRef::Level { mesh: 0 }, &Mat4::IDENTITY, &Mat4::IDENTITY, &Mat4::IDENTITY);
        renderer.draw_health_bar(0.5);
        renderer.present();
        renderer.present();
        assert!(renderer.draws().is_empty());
        assert!(renderer.health_bars().is_empty());
        assert_eq!(renderer.presents(), 2);
        assert_eq!(renderer.total_draws(), 1);
    }

    #[test]
    fn test_benchmark_script_cycles() {
        assert!(ScriptedInput::benchmark(0).is_active(Action::MoveForward));
        assert!(ScriptedInput::benchmark(200).is_active(Action::Fire));
        assert!(ScriptedInput::benchmark(240).is_active(Action::MoveForward));
    }
}
