// src/layers.rs
//! Collision layer registry.
//!
//! Object layers and the two broad-phase partitions they map onto, with the
//! pairwise "should collide" table. Rapier has no broad-phase partitions of
//! its own, so both rules are folded into the `InteractionGroups` each
//! collider is built with.

use rapier3d::prelude::{Group, InteractionGroups};

/// Layer a body is registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectLayer {
    /// Static level geometry.
    NonMoving = 0,
    /// Character and kinematic models.
    Moving = 1,
    Floor = 2,
}

/// Broad-phase partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BroadPhaseLayer {
    NonMoving = 0,
    Moving = 1,
}

impl ObjectLayer {
    pub const ALL: [ObjectLayer; 3] = [ObjectLayer::NonMoving, ObjectLayer::Moving, ObjectLayer::Floor];

    /// Membership bit of this layer.
    #[inline]
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Broad-phase partition of this layer. Floors never move, so they share
    /// the static partition.
    #[inline]
    pub const fn broad_phase(self) -> BroadPhaseLayer {
        match self {
            ObjectLayer::NonMoving | ObjectLayer::Floor => BroadPhaseLayer::NonMoving,
            ObjectLayer::Moving => BroadPhaseLayer::Moving,
        }
    }

    /// Decode from body user data; unknown values fall back to `NonMoving`.
    pub fn from_raw(raw: u128) -> Self {
        match raw {
            1 => ObjectLayer::Moving,
            2 => ObjectLayer::Floor,
            _ => ObjectLayer::NonMoving,
        }
    }

    #[inline]
    pub fn raw(self) -> u128 {
        self as u128
    }
}

/// Rule table keyed by the first layer.
#[inline]
pub fn should_collide(a: ObjectLayer, b: ObjectLayer) -> bool {
    match a {
        ObjectLayer::NonMoving => b == ObjectLayer::Moving,
        ObjectLayer::Moving => true,
        ObjectLayer::Floor => b == ObjectLayer::Moving,
    }
}

/// Whether an object on `layer` needs to be tested against the `broad` partition.
#[inline]
pub fn object_vs_broad_phase(layer: ObjectLayer, broad: BroadPhaseLayer) -> bool {
    match layer {
        ObjectLayer::NonMoving | ObjectLayer::Floor => broad == BroadPhaseLayer::Moving,
        ObjectLayer::Moving => true,
    }
}

/// Symmetric closure of the rule table: the pair is evaluated if either
/// ordering asks for it.
#[inline]
pub fn pair_collides(a: ObjectLayer, b: ObjectLayer) -> bool {
    let forward = should_collide(a, b) && object_vs_broad_phase(a, b.broad_phase());
    let backward = should_collide(b, a) && object_vs_broad_phase(b, a.broad_phase());
    forward || backward
}

/// Filter mask of every layer `layer` collides with.
pub fn filter_bits(layer: ObjectLayer) -> u32 {
    ObjectLayer::ALL
        .iter()
        .filter(|other| pair_collides(layer, **other))
        .fold(0, |mask, other| mask | other.bit())
}

/// Interaction groups for a collider registered on `layer`.
pub fn interaction_groups(layer: ObjectLayer) -> InteractionGroups {
    InteractionGroups::new(
        Group::from_bits_truncate(layer.bit()),
        Group::from_bits_truncate(filter_bits(layer)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_table() {
        use ObjectLayer::*;
        assert!(!should_collide(NonMoving, NonMoving));
        assert!(should_collide(NonMoving, Moving));
        assert!(!should_collide(NonMoving, Floor));
        assert!(should_collide(Moving, NonMoving));
        assert!(should_collide(Moving, Moving));
        assert!(should_collide(Moving, Floor));
        assert!(!should_collide(Floor, Floor));
        assert!(should_collide(Floor, Moving));
    }

    #[test]
    fn test_pairs_are_symmetric() {
        for a in ObjectLayer::ALL {
            for b in ObjectLayer::ALL {
                assert_eq!(pair_collides(a, b), pair_collides(b, a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn test_floor_maps_to_static_partition() {
        assert_eq!(ObjectLayer::Floor.broad_phase(), BroadPhaseLayer::NonMoving);
        assert!(object_vs_broad_phase(ObjectLayer::Floor, BroadPhaseLayer::Moving));
        assert!(!object_vs_broad_phase(ObjectLayer::Floor, BroadPhaseLayer::NonMoving));
    }

    #[test]
    fn test_groups_match_table() {
        for a in ObjectLayer::ALL {
            for b in ObjectLayer::ALL {
                let ga = interaction_groups(a);
                let gb = interaction_groups(b);
                assert_eq!(ga.test(gb), pair_collides(a, b), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn test_raw_round_trip() {
        for layer in ObjectLayer::ALL {
            assert_eq!(ObjectLayer::from_raw(layer.raw()), layer);
        }
    }
}
