//! Game Server Module
//!
//! Race simulation for up to three players per session, plus the registry
//! that binds sessions to chat locations.

pub mod error;
pub mod obstacle;
pub mod race;
pub mod runner;
pub mod simulation;

pub use error::RaceError;
pub use obstacle::{Obstacle, ObstacleGenerator};
pub use race::{Actor, Race, RaceConfig, RaceOutcome, RaceSnapshot, RaceStatus, Role};
pub use runner::{PlayerId, PlayerSnapshot, PlayerState, Runner};
pub use simulation::{
    lock_race, EndedSession, LocationId, ServerStats, SessionId, SessionRegistry, SharedRace,
};
