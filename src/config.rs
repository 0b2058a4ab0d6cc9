//! Config - Bot-level settings wrapped around the race tunables

use std::path::PathBuf;
use std::time::Duration;

use crate::game_server::{PlayerId, RaceConfig};

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Pause between two steps of a running race
    pub tick_interval: Duration,
    /// Identity allowed to override creators and use owner commands
    pub owner_id: Option<PlayerId>,
    pub leaderboard_size: usize,
    /// JSON store location, in-memory when unset
    pub store_path: Option<PathBuf>,
    pub race: RaceConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(700),
            owner_id: None,
            leaderboard_size: 10,
            store_path: None,
            race: RaceConfig::default(),
        }
    }
}
