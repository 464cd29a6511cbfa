// src/factory.rs
//! Physics object factory: turns mesh geometry into collision shapes and
//! registers them with the world.
//!
//! Triangle meshes are de-indexed and baked into world space before the shape
//! is built, so the collider does not depend on any later render transform.

use glam::{Mat4, Quat, Vec3};
use rapier3d::prelude::{Point, Real, SharedShape};

use crate::convert::to_point;
use crate::error::{Error, Result};
use crate::layers::ObjectLayer;
use crate::physics::{BodyDesc, BodyHandle, MotionType, PhysicsWorld};

/// Mass given to model meshes when the asset does not say otherwise.
pub const DEFAULT_MESH_MASS: f32 = 1000.0;

/// A registered body plus whether it can be moved by commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicsObject {
    pub body: BodyHandle,
    pub dynamic: bool,
}

/// Static sphere with an explicit mass override.
pub fn construct_sphere(
    world: &mut PhysicsWorld,
    position: Vec3,
    rotation: Quat,
    mass: f32,
    radius: f32,
) -> Result<PhysicsObject> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(Error::shape("construct_sphere", format!("radius {radius}")));
    }
    let desc = BodyDesc::new(SharedShape::ball(radius), MotionType::Static, ObjectLayer::NonMoving)
        .with_transform(position, rotation)
        .with_mass(mass);
    let body = world.add_body(desc)?;
    Ok(PhysicsObject { body, dynamic: false })
}

/// Immovable triangle mesh on the NON_MOVING layer.
pub fn construct_static_mesh(
    world: &mut PhysicsWorld,
    mass: f32,
    positions: &[Vec3],
    indices: &[u32],
    transform: &Mat4,
) -> Result<PhysicsObject> {
    let shape = baked_trimesh("construct_static_mesh", positions, indices, transform)?;
    let desc = BodyDesc::new(shape, MotionType::Static, ObjectLayer::NonMoving).with_mass(mass);
    let body = world.add_body(desc)?;
    Ok(PhysicsObject { body, dynamic: false })
}

/// Same geometry processing as [`construct_static_mesh`], registered as a
/// kinematic body on the MOVING layer.
pub fn construct_dynamic_mesh(
    world: &mut PhysicsWorld,
    mass: f32,
    positions: &[Vec3],
    indices: &[u32],
    transform: &Mat4,
) -> Result<PhysicsObject> {
    let shape = baked_trimesh("construct_dynamic_mesh", positions, indices, transform)?;
    let desc = BodyDesc::new(shape, MotionType::Kinematic, ObjectLayer::Moving).with_mass(mass);
    let body = world.add_body(desc)?;
    Ok(PhysicsObject { body, dynamic: true })
}

/// Expand `indices` into world-space triangles, three vertices per triangle in
/// index order.
pub fn bake_triangles(
    operation: &'static str,
    positions: &[Vec3],
    indices: &[u32],
    transform: &Mat4,
) -> Result<Vec<[Vec3; 3]>> {
    if indices.is_empty() {
        return Err(Error::malformed(operation, "no indices"));
    }
    if indices.len() % 3 != 0 {
        return Err(Error::malformed(
            operation,
            format!("{} indices is not a multiple of 3", indices.len()),
        ));
    }

    let mut triangles = Vec::with_capacity(indices.len() / 3);
    for (t, tri) in indices.chunks_exact(3).enumerate() {
        let mut out = [Vec3::ZERO; 3];
        for (slot, &index) in out.iter_mut().zip(tri) {
            let local = positions.get(index as usize).ok_or_else(|| {
                Error::malformed(
                    operation,
                    format!("triangle {t} references vertex {index} of {}", positions.len()),
                )
            })?;
            let world = transform.transform_point3(*local);
            if !world.is_finite() {
                return Err(Error::malformed(
                    operation,
                    format!("triangle {t} has a non-finite vertex {world:?}"),
                ));
            }
            *slot = world;
        }
        triangles.push(out);
    }
    Ok(triangles)
}

fn baked_trimesh(
    operation: &'static str,
    positions: &[Vec3],
    indices: &[u32],
    transform: &Mat4,
) -> Result<SharedShape> {
    let triangles = bake_triangles(operation, positions, indices, transform)?;

    let has_area = triangles
        .iter()
        .any(|[a, b, c]| (*b - *a).cross(*c - *a).length_squared() > f32::EPSILON * f32::EPSILON);
    if !has_area {
        return Err(Error::shape(
            operation,
            format!("all {} triangles are degenerate", triangles.len()),
        ));
    }

    let vertices: Vec<Point<Real>> = triangles.iter().flatten().map(|v| to_point(*v)).collect();
    let faces: Vec<[u32; 3]> = (0..triangles.len() as u32)
        .map(|t| [3 * t, 3 * t + 1, 3 * t + 2])
        .collect();
    Ok(SharedShape::trimesh(vertices, faces))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CharacterConfig, WorldConfig};

    fn world() -> PhysicsWorld {
        let config = WorldConfig {
            worker_threads: 1,
            ..WorldConfig::default()
        };
        PhysicsWorld::new(config, CharacterConfig::default()).unwrap()
    }

    /// Unit square in the XZ plane.
    fn unit_square() -> (Vec<Vec3>, Vec<u32>) {
        (
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(0.0, 0.0, 1.0),
            ],
            vec![0, 1, 2, 2, 3, 0],
        )
    }

    #[test]
    fn test_bake_expands_indices_in_order() {
        let (positions, indices) = unit_square();
        let tris = bake_triangles("test", &positions, &indices, &Mat4::IDENTITY).unwrap();
        assert_eq!(tris.len(), 2);
        assert_eq!(tris[0], [positions[0], positions[1], positions[2]]);
        assert_eq!(tris[1], [positions[2], positions[3], positions[0]]);
    }

    #[test]
    fn test_index_count_must_be_multiple_of_three() {
        let (positions, _) = unit_square();
        let err = bake_triangles("test", &positions, &[0, 1, 2, 3], &Mat4::IDENTITY).unwrap_err();
        assert!(err.is_geometry());
        let err = bake_triangles("test", &positions, &[], &Mat4::IDENTITY).unwrap_err();
        assert!(err.is_geometry());
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let (positions, _) = unit_square();
        let err = bake_triangles("test", &positions, &[0, 1, 9], &Mat4::IDENTITY).unwrap_err();
        assert!(err.to_string().contains("vertex 9"));
    }

    #[test]
    fn test_collider_vertices_are_baked_in_world_space() {
        let mut world = world();
        let (positions, indices) = unit_square();
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 1.0, 3.0),
            Quat::from_rotation_y(0.6),
            Vec3::new(10.0, -4.0, 7.0),
        );

        for dynamic in [false, true] {
            let object = if dynamic {
                construct_dynamic_mesh(&mut world, DEFAULT_MESH_MASS, &positions, &indices, &transform)
            } else {
                construct_static_mesh(&mut world, DEFAULT_MESH_MASS, &positions, &indices, &transform)
            }
            .unwrap();
            assert_eq!(object.dynamic, dynamic);

            let vertices = world.mesh_vertices(object.body).unwrap();
            assert_eq!(vertices.len(), indices.len());
            for (v, &i) in vertices.iter().zip(&indices) {
                let expected = transform.transform_point3(positions[i as usize]);
                assert!((*v - expected).length() < 1e-4, "{v:?} != {expected:?}");
            }
        }
    }

    #[test]
    fn test_winding_does_not_change_vertices() {
        let (positions, _) = unit_square();
        let ccw = bake_triangles("test", &positions, &[0, 1, 2], &Mat4::IDENTITY).unwrap();
        let cw = bake_triangles("test", &positions, &[0, 2, 1], &Mat4::IDENTITY).unwrap();
        let mut a: Vec<[f32; 3]> = ccw[0].iter().map(|v| v.to_array()).collect();
        let mut b: Vec<[f32; 3]> = cw[0].iter().map(|v| v.to_array()).collect();
        a.sort_by(|x, y| x.partial_cmp(y).unwrap());
        b.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_layers_and_motion() {
        let mut world = world();
        let (positions, indices) = unit_square();
        let fixed = construct_static_mesh(&mut world, 1.0, &positions, &indices, &Mat4::IDENTITY).unwrap();
        let moving = construct_dynamic_mesh(&mut world, 1.0, &positions, &indices, &Mat4::IDENTITY).unwrap();
        assert_eq!(world.motion_type(fixed.body), Some(MotionType::Static));
        assert_eq!(world.layer(fixed.body), Some(ObjectLayer::NonMoving));
        assert_eq!(world.motion_type(moving.body), Some(MotionType::Kinematic));
        assert_eq!(world.layer(moving.body), Some(ObjectLayer::Moving));
    }

    #[test]
    fn test_degenerate_mesh_fails() {
        let mut world = world();
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::X * 2.0];
        let err = construct_static_mesh(&mut world, 1.0, &positions, &[0, 1, 2], &Mat4::IDENTITY)
            .unwrap_err();
        assert!(err.is_geometry());
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn test_unit_square_ray_hit_and_miss() {
        let mut world = world();
        let (positions, indices) = unit_square();
        let square = construct_static_mesh(&mut world, 1.0, &positions, &indices, &Mat4::IDENTITY).unwrap();

        let down = Vec3::NEG_Y;
        let hit = world.cast_ray_local(square.body, Vec3::new(0.5, 1.0, 0.5), down, 10.0);
        assert!((hit.unwrap() - 1.0).abs() < 1e-4);

        let miss = world.cast_ray_local(square.body, Vec3::new(2.5, 1.0, 0.5), down, 10.0);
        assert!(miss.is_none());
    }

    #[test]
    fn test_sphere_is_static_with_mass() {
        let mut world = world();
        let sphere = construct_sphere(&mut world, Vec3::new(0.0, 5.0, 0.0), Quat::IDENTITY, 1000.0, 2.0).unwrap();
        assert!(!sphere.dynamic);
        assert_eq!(world.motion_type(sphere.body), Some(MotionType::Static));
        let bounds = world.world_bounds(sphere.body).unwrap();
        assert!((bounds.max.y - 7.0).abs() < 1e-3);
        assert!(construct_sphere(&mut world, Vec3::ZERO, Quat::IDENTITY, 1.0, 0.0).is_err());
    }
}
