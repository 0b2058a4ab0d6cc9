//! DinoRace - multiplayer endless-runner races for chat bots
//!
//! Up to three players race along a track, jumping over generated
//! obstacles, while a background tick driver advances each session and
//! streams rendered frames back to the chat.

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod game_server;
pub mod render;
pub mod store;
pub mod transport;

pub use config::BotConfig;
pub use dispatch::{Dispatcher, Reply};
pub use driver::DriverContext;
pub use game_server::{
    Actor, LocationId, PlayerId, Race, RaceConfig, RaceError, RaceOutcome, RaceSnapshot,
    RaceStatus, SessionId, SessionRegistry,
};
pub use render::{FrameRenderer, TextRenderer};
pub use store::{JsonStore, ScoreStore, StoreError};
pub use transport::{Command, Frame, Inbound, Outbound};
