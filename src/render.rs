//! Frame rendering
//!
//! A renderer is a pure function of one snapshot. `TextRenderer` draws a
//! character raster: one lane per player, the visible stretch of track around
//! the leader, obstacles and the finish line.

use crate::game_server::RaceSnapshot;

pub trait FrameRenderer: Send + Sync {
    fn render(&self, snapshot: &RaceSnapshot, finish_distance: f32) -> Vec<u8>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextRenderer {
    /// Columns in a lane
    pub columns: usize,
    /// World units per column
    pub scale: f32,
    /// Columns shown behind the leading player
    pub lead_in: usize,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self {
            columns: 64,
            scale: 8.0,
            lead_in: 12,
        }
    }
}

impl TextRenderer {
    const GROUND: char = '_';
    const OBSTACLE: char = '#';
    const FINISH: char = '|';
    const RUNNER: char = 'D';
    const JUMPER: char = '^';
    const FALLEN: char = 'x';

    fn column(&self, position: f32, origin: f32) -> Option<usize> {
        let column = ((position - origin) / self.scale).floor();
        (column >= 0.0 && (column as usize) < self.columns).then_some(column as usize)
    }

    fn lane(&self, snapshot: &RaceSnapshot, finish_distance: f32, origin: f32) -> Vec<char> {
        let mut lane = vec![Self::GROUND; self.columns];
        for obstacle in &snapshot.obstacles {
            let first = self.column(obstacle.position, origin);
            let last = self.column(obstacle.trailing_edge(), origin);
            match (first, last) {
                (Some(a), Some(b)) => lane[a..=b].fill(Self::OBSTACLE),
                (Some(a), None) => lane[a..].fill(Self::OBSTACLE),
                (None, Some(b)) => lane[..=b].fill(Self::OBSTACLE),
                (None, None) => {}
            }
        }
        if let Some(column) = self.column(finish_distance, origin) {
            lane[column] = Self::FINISH;
        }
        lane
    }
}

impl FrameRenderer for TextRenderer {
    fn render(&self, snapshot: &RaceSnapshot, finish_distance: f32) -> Vec<u8> {
        let leader = snapshot
            .players
            .iter()
            .map(|p| p.position)
            .reduce(f32::max)
            .unwrap_or(0.0);
        let origin = leader - self.lead_in as f32 * self.scale;
        let track = self.lane(snapshot, finish_distance, origin);

        let mut out = format!("tick {:>5}  speed {:.2}\n", snapshot.tick, snapshot.speed);
        for (slot, player) in snapshot.players.iter().enumerate() {
            let mut lane = track.clone();
            if let Some(column) = self.column(player.position, origin) {
                lane[column] = match (player.alive, player.vertical_offset < 0.0) {
                    (false, _) => Self::FALLEN,
                    (true, true) => Self::JUMPER,
                    (true, false) => Self::RUNNER,
                };
            }
            let lane: String = lane.into_iter().collect();
            out.push_str(&format!(
                "P{} {lane} {:>5} {}\n",
                slot + 1,
                player.score,
                player.name
            ));
        }
        if let Some(winner) = &snapshot.winner {
            out.push_str(&format!("winner: {winner}\n"));
        }
        out.into_bytes()
    }
}
