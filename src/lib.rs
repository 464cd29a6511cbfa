// src/lib.rs
//! Physics and render coordination core for a first-person shooter.
//!
//! A Rapier world stepped on its own thread, a frustum culler over physics
//! bounds, mesh-to-collider construction, and the scene loop that keeps
//! drawing one frame behind the simulation.

pub mod boss;
pub mod character;
pub mod config;
pub mod convert;
pub mod culling;
pub mod demo;
pub mod error;
pub mod factory;
pub mod flight;
pub mod layers;
pub mod model;
pub mod physics;
pub mod player;
pub mod scene;
pub mod scheduler;
pub mod snapshot;
pub mod stats;

pub use error::{Error, Result};
pub use physics::{BodyHandle, PhysicsWorld};
pub use scene::{Scene, SceneConfig};
