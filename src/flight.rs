// src/flight.rs
//! Scripted boss flight, run on the physics thread before each step.
//!
//! One cycle lasts `9π` seconds: the ship glides in from x = 300 to the
//! origin, hovers there, then drifts away along -x until the cycle restarts.

use std::f32::consts::PI;

use glam::Vec3;

use crate::model::BodyGroup;
use crate::physics::PhysicsWorld;

pub const FLIGHT_PERIOD_S: f32 = 9.0 * PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlightCommand {
    /// Zero the velocity and teleport.
    Place(Vec3),
    /// Add to the current velocity.
    Push(Vec3),
}

/// Command for a ship at `altitude`, `elapsed_s` seconds into the script.
pub fn flight_command(elapsed_s: f32, altitude: f32, delta_ms: f32) -> FlightCommand {
    let t = elapsed_s.rem_euclid(FLIGHT_PERIOD_S);
    let phase = t / FLIGHT_PERIOD_S;
    if phase <= 0.25 {
        let x = (3.0 - 3.0 * (t / 4.5).sin()) * 100.0;
        FlightCommand::Place(Vec3::new(x, altitude, 0.0))
    } else if phase <= 0.75 {
        FlightCommand::Place(Vec3::new(0.0, altitude, 0.0))
    } else {
        FlightCommand::Push(Vec3::new(-0.1 * delta_ms, 0.0, 0.0))
    }
}

#[derive(Debug, Clone)]
struct Ship {
    bodies: BodyGroup,
    altitude: f32,
}

/// Drives every registered ship. Ships whose bodies were removed keep
/// receiving commands; they resolve to nothing.
#[derive(Debug, Clone, Default)]
pub struct FlightScript {
    ships: Vec<Ship>,
    elapsed_s: f32,
}

impl FlightScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ship(&mut self, bodies: BodyGroup, altitude: f32) {
        self.ships.push(Ship { bodies, altitude });
    }

    pub fn elapsed_s(&self) -> f32 {
        self.elapsed_s
    }

    /// Apply this frame's commands, then advance the script clock.
    pub fn apply(&mut self, world: &mut PhysicsWorld, delta_ms: f32) {
        for ship in &self.ships {
            match flight_command(self.elapsed_s, ship.altitude, delta_ms) {
                FlightCommand::Place(position) => {
                    ship.bodies.set_velocity(world, Vec3::ZERO);
                    ship.bodies.set_position(world, position);
                }
                FlightCommand::Push(delta) => ship.bodies.add_velocity(world, delta),
            }
        }
        self.elapsed_s += delta_ms / 1000.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CharacterConfig, WorldConfig};
    use crate::demo::box_mesh;
    use crate::model::{DynamicModel, LoadOptions, SceneNode};

    fn placed(command: FlightCommand) -> Vec3 {
        match command {
            FlightCommand::Place(p) => p,
            other => panic!("expected Place, got {other:?}"),
        }
    }

    #[test]
    fn test_glide_starts_far_and_ends_at_origin() {
        let start = placed(flight_command(0.0, 20.0, 16.0));
        assert!((start - Vec3::new(300.0, 20.0, 0.0)).length() < 1e-3);

        let end = placed(flight_command(FLIGHT_PERIOD_S * 0.25, 20.0, 16.0));
        assert!(end.x.abs() < 1e-2);

        let mid = placed(flight_command(FLIGHT_PERIOD_S * 0.125, 10.0, 16.0));
        assert!(mid.x > 0.0 && mid.x < 300.0);
        assert_eq!(mid.y, 10.0);
    }

    #[test]
    fn test_hover_then_drift() {
        let hover = placed(flight_command(FLIGHT_PERIOD_S * 0.5, 10.0, 16.0));
        assert_eq!(hover, Vec3::new(0.0, 10.0, 0.0));

        assert_eq!(
            flight_command(FLIGHT_PERIOD_S * 0.9, 10.0, 20.0),
            FlightCommand::Push(Vec3::new(-2.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_script_wraps_each_period() {
        let a = flight_command(3.0, 20.0, 16.0);
        let b = flight_command(3.0 + FLIGHT_PERIOD_S, 20.0, 16.0);
        match (a, b) {
            (FlightCommand::Place(a), FlightCommand::Place(b)) => assert!((a - b).length() < 1e-2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_apply_moves_ships_and_ignores_removed() {
        let config = WorldConfig {
            worker_threads: 1,
            ..WorldConfig::default()
        };
        let mut world = PhysicsWorld::new(config, CharacterConfig::default()).unwrap();
        let root = SceneNode::new("ship").with_mesh(box_mesh("hull", Vec3::ONE));
        let mut first = DynamicModel::load(&mut world, &root, 1000.0, &LoadOptions::default()).unwrap();
        let second = DynamicModel::load(&mut world, &root, 1000.0, &LoadOptions::default()).unwrap();

        let mut script = FlightScript::new();
        script.add_ship(first.bodies().clone(), 20.0);
        script.add_ship(second.bodies().clone(), 10.0);

        script.apply(&mut world, 16.0);
        assert!((second.get_position(&world).unwrap() - Vec3::new(300.0, 10.0, 0.0)).length() < 1e-3);
        assert!((script.elapsed_s() - 0.016).abs() < 1e-6);

        first.remove_from_physics(&mut world);
        script.apply(&mut world, 16.0);
        assert!(first.get_position(&world).is_none());
        assert_eq!(second.get_position(&world).unwrap().y, 10.0);
    }
}
