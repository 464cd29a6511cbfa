// src/culling.rs
//! # Frustum culling for physics-tracked bodies
//!
//! * **Frustum** – six outward-facing planes plus eight world-space corners,
//!   rebuilt from `projection × view` every frame.
//! * **AABB test** – two-direction separating-axis test: box corners against
//!   every plane, then frustum corners against the box extent on each world axis.
//!   The test is conservative; it may keep a box that misses the frustum but
//!   never drops one that overlaps it.
//! * **Body culling** – bounds are looked up through [`BodyQuery`] and tested
//!   in parallel via `rayon`. Handles that no longer resolve are skipped.

use std::time::{Duration, Instant};

use glam::{Mat4, Vec3, Vec4};
use rayon::prelude::*;

use crate::physics::BodyHandle;
use crate::snapshot::BodyQuery;

/// Below this many bodies culling stays on the calling thread.
const PARALLEL_THRESHOLD: usize = 256;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Axis-aligned box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_center_half_extents(center: Vec3, half: Vec3) -> Self {
        Self::new(center - half, center + half)
    }

    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }
}

/// Plane `normal · p + distance = 0`, normal pointing into the frustum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// Build from a clip-space row combination, normalized by the normal length.
    fn from_row(row: Vec4) -> Self {
        let normal = row.truncate();
        let length = normal.length();
        if length > f32::EPSILON {
            Self {
                normal: normal / length,
                distance: row.w / length,
            }
        } else {
            Self {
                normal,
                distance: row.w,
            }
        }
    }

    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Index of each plane in [`Frustum::planes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneSide {
    Left = 0,
    Right = 1,
    Bottom = 2,
    Top = 3,
    Near = 4,
    Far = 5,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
    pub corners: [Vec3; 8],
}

impl Default for Frustum {
    fn default() -> Self {
        Self::from_matrices(&Mat4::IDENTITY, &Mat4::IDENTITY)
    }
}

impl Frustum {
    /// Planes from the rows of `projection × view`; corners from the inverse of
    /// the same matrix applied to the NDC cube (z in [-1, 1]).
    ///
    /// The z range covers both depth conventions: with a [0, 1] projection the
    /// near plane and corners sit slightly behind the true near plane, which
    /// only makes the volume larger.
    pub fn from_matrices(view: &Mat4, projection: &Mat4) -> Self {
        let m = *projection * *view;
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));

        let planes = [
            Plane::from_row(r3 + r0),
            Plane::from_row(r3 - r0),
            Plane::from_row(r3 + r1),
            Plane::from_row(r3 - r1),
            Plane::from_row(r3 + r2),
            Plane::from_row(r3 - r2),
        ];

        let inverse = m.inverse();
        let mut corners = [Vec3::ZERO; 8];
        let mut i = 0;
        for z in [-1.0f32, 1.0] {
            for y in [-1.0f32, 1.0] {
                for x in [-1.0f32, 1.0] {
                    let p = inverse * Vec4::new(x, y, z, 1.0);
                    corners[i] = if p.w.abs() > f32::EPSILON {
                        p.truncate() / p.w
                    } else {
                        p.truncate()
                    };
                    i += 1;
                }
            }
        }

        Self { planes, corners }
    }

    #[inline]
    pub fn plane(&self, side: PlaneSide) -> &Plane {
        &self.planes[side as usize]
    }

    /// `false` only when the box is provably outside the view volume.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let box_corners = aabb.corners();
        for plane in &self.planes {
            if box_corners.iter().all(|c| plane.signed_distance(*c) < 0.0) {
                return false;
            }
        }

        for axis in 0..3 {
            let (lo, hi) = (aabb.min[axis], aabb.max[axis]);
            if self.corners.iter().all(|c| c[axis] > hi) {
                return false;
            }
            if self.corners.iter().all(|c| c[axis] < lo) {
                return false;
            }
        }

        true
    }
}

// ---------------------------------------------------------------------------
// Profiling information
// ---------------------------------------------------------------------------

#[derive(Default, Debug, Clone)]
pub struct CullerStats {
    pub cull_time: Duration,
    /// Bodies that were tested and dropped.
    pub culled_count: usize,
    pub visible_count: usize,
    /// Handles that no longer resolved to a body.
    pub stale_count: usize,
}

// ---------------------------------------------------------------------------
// Culler
// ---------------------------------------------------------------------------

/// Per-frame visibility filter. Holds the frustum of the last update and
/// statistics of the last cull.
#[derive(Default, Debug)]
pub struct FrustumCuller {
    frustum: Frustum,
    stats: CullerStats,
}

impl FrustumCuller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild planes and corners. The previous frustum is fully overwritten.
    pub fn update_frustum(&mut self, view: &Mat4, projection: &Mat4) {
        self.frustum = Frustum::from_matrices(view, projection);
    }

    #[inline]
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    #[inline]
    pub fn is_aabb_visible(&self, aabb: &Aabb) -> bool {
        self.frustum.intersects_aabb(aabb)
    }

    /// Subset of `bodies` whose world bounds may be in view, in input order.
    pub fn get_visible_bodies<Q>(
        &mut self,
        query: &Q,
        bodies: &[BodyHandle],
        view: &Mat4,
        projection: &Mat4,
    ) -> Vec<BodyHandle>
    where
        Q: BodyQuery + Sync + ?Sized,
    {
        let start = Instant::now();
        self.update_frustum(view, projection);
        let frustum = &self.frustum;

        let classify = |handle: &BodyHandle| -> Option<Option<BodyHandle>> {
            let bounds = query.world_bounds(*handle)?;
            Some(frustum.intersects_aabb(&bounds).then_some(*handle))
        };

        let results: Vec<Option<Option<BodyHandle>>> = if bodies.len() >= PARALLEL_THRESHOLD {
            bodies.par_iter().map(classify).collect()
        } else {
            bodies.iter().map(classify).collect()
        };

        let stale_count = results.iter().filter(|r| r.is_none()).count();
        let visible: Vec<BodyHandle> = results.into_iter().flatten().flatten().collect();

        self.stats = CullerStats {
            cull_time: start.elapsed(),
            culled_count: bodies.len() - stale_count - visible.len(),
            visible_count: visible.len(),
            stale_count,
        };
        visible
    }

    /// Return a snapshot of the last cull statistics.
    pub fn stats(&self) -> CullerStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::physics::BodyHandle;
    use glam::Quat;
    use rapier3d::prelude::RigidBodyHandle;

    struct Bounds(HashMap<BodyHandle, Aabb>);

    impl BodyQuery for Bounds {
        fn position(&self, body: BodyHandle) -> Option<Vec3> {
            self.0.get(&body).map(|b| b.center())
        }
        fn rotation(&self, body: BodyHandle) -> Option<Quat> {
            self.0.get(&body).map(|_| Quat::IDENTITY)
        }
        fn world_bounds(&self, body: BodyHandle) -> Option<Aabb> {
            self.0.get(&body).copied()
        }
    }

    fn handle(i: u32) -> BodyHandle {
        BodyHandle(RigidBodyHandle::from_raw_parts(i, 0))
    }

    /// Camera at the origin looking down -Z.
    fn camera() -> (Mat4, Mat4) {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let projection = Mat4::perspective_rh_gl(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        (view, projection)
    }

    #[test]
    fn test_update_frustum_is_idempotent() {
        let (view, projection) = camera();
        let mut culler = FrustumCuller::new();
        culler.update_frustum(&view, &projection);
        let first = *culler.frustum();
        culler.update_frustum(&view, &projection);
        assert_eq!(first, *culler.frustum());
    }

    #[test]
    fn test_planes_are_normalized() {
        let (view, projection) = camera();
        let frustum = Frustum::from_matrices(&view, &projection);
        for plane in &frustum.planes {
            assert!((plane.normal.length() - 1.0).abs() < 1e-5);
        }
        // Normals point inward.
        let inside = Vec3::new(0.0, 0.0, -10.0);
        for plane in &frustum.planes {
            assert!(plane.signed_distance(inside) > 0.0);
        }
        assert!(frustum.plane(PlaneSide::Far).signed_distance(Vec3::new(0.0, 0.0, -150.0)) < 0.0);
    }

    #[test]
    fn test_corners_lie_on_near_and_far() {
        let (view, projection) = camera();
        let frustum = Frustum::from_matrices(&view, &projection);
        for c in &frustum.corners[..4] {
            assert!((c.z + 0.1).abs() < 1e-3, "near corner {c:?}");
        }
        for c in &frustum.corners[4..] {
            assert!((c.z + 100.0).abs() < 0.5, "far corner {c:?}");
        }
    }

    #[test]
    fn test_contained_box_is_visible() {
        let (view, projection) = camera();
        let inside = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -20.0), Vec3::splat(1.0));
        let mut culler = FrustumCuller::new();
        let query = Bounds(HashMap::from([(handle(1), inside)]));
        let visible = culler.get_visible_bodies(&query, &[handle(1)], &view, &projection);
        assert_eq!(visible, vec![handle(1)]);
    }

    #[test]
    fn test_box_beyond_far_plane_is_culled() {
        let (view, projection) = camera();
        let far_away = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -500.0), Vec3::splat(1.0));
        let behind = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, 30.0), Vec3::splat(1.0));
        let mut culler = FrustumCuller::new();
        let query = Bounds(HashMap::from([(handle(1), far_away), (handle(2), behind)]));
        let visible = culler.get_visible_bodies(&query, &[handle(1), handle(2)], &view, &projection);
        assert!(visible.is_empty());
        assert_eq!(culler.stats().culled_count, 2);
    }

    #[test]
    fn test_box_straddling_plane_is_kept() {
        let (view, projection) = camera();
        let frustum = Frustum::from_matrices(&view, &projection);
        // Big box crossing the left plane and the camera position.
        let straddle = Aabb::new(Vec3::new(-200.0, -1.0, -30.0), Vec3::new(-1.0, 1.0, 5.0));
        assert!(frustum.intersects_aabb(&straddle));
        // Box enclosing the whole frustum.
        let huge = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(500.0));
        assert!(frustum.intersects_aabb(&huge));
    }

    #[test]
    fn test_stale_handles_are_skipped() {
        let (view, projection) = camera();
        let inside = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -5.0), Vec3::splat(0.5));
        let mut culler = FrustumCuller::new();
        let query = Bounds(HashMap::from([(handle(1), inside)]));
        let visible = culler.get_visible_bodies(&query, &[handle(7), handle(1)], &view, &projection);
        assert_eq!(visible, vec![handle(1)]);
        assert_eq!(culler.stats().stale_count, 1);
    }

    #[test]
    fn test_parallel_path_keeps_order() {
        let (view, projection) = camera();
        let mut map = HashMap::new();
        let mut handles = Vec::new();
        for i in 0..600u32 {
            let z = if i % 2 == 0 { -10.0 } else { 50.0 };
            map.insert(handle(i), Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, z), Vec3::splat(0.5)));
            handles.push(handle(i));
        }
        let mut culler = FrustumCuller::new();
        let visible = culler.get_visible_bodies(&Bounds(map), &handles, &view, &projection);
        let expected: Vec<BodyHandle> = (0..600u32).filter(|i| i % 2 == 0).map(handle).collect();
        assert_eq!(visible, expected);
    }
}
