//! Obstacle - Track hazards and their spawn policy

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Leading edge along the track (world units)
    pub position: f32,
    pub width: f32,
    pub height: f32,
}

impl Obstacle {
    pub fn new(position: f32, width: f32, height: f32) -> Self {
        Self {
            position,
            width,
            height,
        }
    }

    pub fn trailing_edge(&self) -> f32 {
        self.position + self.width
    }
}

/// Obstacle placement and sizing tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleGenerator {
    /// Minimum distance ahead of the leading player
    pub min_gap: u32,
    pub max_gap: u32,
    pub widths: Vec<f32>,
    pub heights: Vec<f32>,
}

impl Default for ObstacleGenerator {
    fn default() -> Self {
        Self {
            min_gap: 120,
            max_gap: 260,
            widths: vec![12.0, 16.0, 20.0],
            heights: vec![20.0, 26.0, 34.0],
        }
    }
}

impl ObstacleGenerator {
    const FALLBACK_WIDTH: f32 = 16.0;
    const FALLBACK_HEIGHT: f32 = 28.0;

    /// Place a new obstacle ahead of the leading player.
    ///
    /// The obstacle also lands at least `min_gap` past the trailing edge of
    /// `last`, so the track stays sorted and every pair stays jumpable.
    pub fn generate<R: Rng>(
        &self,
        leading_position: f32,
        last: Option<&Obstacle>,
        rng: &mut R,
    ) -> Obstacle {
        let max_gap = self.max_gap.max(self.min_gap);
        let gap = rng.gen_range(self.min_gap..=max_gap);

        let mut position = leading_position + gap as f32;
        if let Some(last) = last {
            position = position.max(last.trailing_edge() + self.min_gap as f32);
        }

        let width = self
            .widths
            .choose(rng)
            .copied()
            .unwrap_or(Self::FALLBACK_WIDTH);
        let height = self
            .heights
            .choose(rng)
            .copied()
            .unwrap_or(Self::FALLBACK_HEIGHT);

        Obstacle::new(position, width, height)
    }
}
