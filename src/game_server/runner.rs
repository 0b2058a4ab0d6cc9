//! Runner - Individual player state and kinematics
//!
//! Each player has a horizontal position, a vertical offset used for jumps,
//! and a jump cooldown. The race updates all living players each tick.

use serde::{Deserialize, Serialize};

use crate::game_server::error::RaceError;
use crate::game_server::obstacle::Obstacle;
use crate::game_server::race::RaceConfig;

/// Stable external identity of a participant (chat user id).
pub type PlayerId = i64;

/// Complete state for a single player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    /// External identity
    pub id: PlayerId,
    /// Display name
    pub name: String,
    /// Progress along the track (world units)
    pub position: f32,
    /// Vertical offset, 0 on the ground and negative while airborne
    pub vertical_offset: f32,
    /// Vertical velocity (negative is upwards)
    pub vertical_velocity: f32,
    pub alive: bool,
    /// Integer part of the position at the last step
    pub score: u32,
    /// Ticks left before another jump is accepted
    pub jump_cooldown: u32,
}

impl PlayerState {
    /// Create a new player standing at the origin
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: 0.0,
            vertical_offset: 0.0,
            vertical_velocity: 0.0,
            alive: true,
            score: 0,
            jump_cooldown: 0,
        }
    }

    /// Reset player to the starting line
    pub fn reset(&mut self, start_position: f32) {
        self.position = start_position;
        self.vertical_offset = 0.0;
        self.vertical_velocity = 0.0;
        self.alive = true;
        self.score = 0;
        self.jump_cooldown = 0;
    }

    pub fn is_airborne(&self) -> bool {
        self.vertical_offset < 0.0
    }
}

/// Player kinematics
pub struct Runner;

impl Runner {
    /// Jumps are gated on being alive and off cooldown, not on being grounded
    pub fn check_jump(state: &PlayerState) -> Result<(), RaceError> {
        if !state.alive {
            return Err(RaceError::Dead);
        }
        if state.jump_cooldown > 0 {
            return Err(RaceError::OnCooldown);
        }
        Ok(())
    }

    /// Apply the jump impulse and start the cooldown
    pub fn jump(state: &mut PlayerState, config: &RaceConfig) {
        state.vertical_velocity = config.jump_impulse;
        state.jump_cooldown = config.jump_cooldown;
    }

    /// Advance a living player by one tick at the given speed
    pub fn advance(state: &mut PlayerState, speed: f32, config: &RaceConfig) {
        if !state.alive {
            return;
        }

        state.position += speed * config.forward_factor;

        // Gravity pulls the offset back towards the ground plane
        state.vertical_velocity += config.gravity;
        state.vertical_offset += state.vertical_velocity;
        if state.vertical_offset > 0.0 {
            state.vertical_offset = 0.0;
            state.vertical_velocity = 0.0;
        }

        state.jump_cooldown = state.jump_cooldown.saturating_sub(1);
    }

    /// Whether the player's ground-level hitbox overlaps the obstacle.
    ///
    /// Airborne players clear every obstacle regardless of its height.
    pub fn collides(state: &PlayerState, obstacle: &Obstacle, half_width: f32) -> bool {
        if state.is_airborne() {
            return false;
        }
        state.position + half_width >= obstacle.position
            && state.position - half_width <= obstacle.trailing_edge()
    }

    pub fn update_score(state: &mut PlayerState) {
        state.score = state.position.max(0.0).floor() as u32;
    }
}

/// Compact player state for rendering and transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub position: f32,
    pub vertical_offset: f32,
    pub alive: bool,
    pub score: u32,
}

impl From<&PlayerState> for PlayerSnapshot {
    fn from(state: &PlayerState) -> Self {
        Self {
            id: state.id,
            name: state.name.clone(),
            position: state.position,
            vertical_offset: state.vertical_offset,
            alive: state.alive,
            score: state.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grounded(position: f32) -> PlayerState {
        let mut state = PlayerState::new(1, "dino");
        state.reset(position);
        state
    }

    #[test]
    fn advance_moves_by_speed_times_forward_factor() {
        let config = RaceConfig::default();
        let mut state = grounded(20.0);

        Runner::advance(&mut state, 5.0, &config);

        assert_eq!(state.position, 20.0 + 5.0 * config.forward_factor);
        assert_eq!(state.vertical_offset, 0.0);
        assert_eq!(state.vertical_velocity, 0.0);
    }

    #[test]
    fn jump_arc_returns_to_ground() {
        let config = RaceConfig::default();
        let mut state = grounded(0.0);
        Runner::jump(&mut state, &config);

        let mut airborne_ticks = 0;
        for _ in 0..100 {
            Runner::advance(&mut state, 5.0, &config);
            if !state.is_airborne() {
                break;
            }
            airborne_ticks += 1;
        }

        assert!(airborne_ticks > 20, "arc too short: {airborne_ticks}");
        assert_eq!(state.vertical_offset, 0.0);
        assert_eq!(state.vertical_velocity, 0.0);
    }

    #[test]
    fn cooldown_counts_down_to_zero() {
        let config = RaceConfig::default();
        let mut state = grounded(0.0);
        Runner::jump(&mut state, &config);
        assert_eq!(Runner::check_jump(&state), Err(RaceError::OnCooldown));

        let mut previous = state.jump_cooldown;
        for _ in 0..config.jump_cooldown {
            Runner::advance(&mut state, 5.0, &config);
            assert!(state.jump_cooldown < previous);
            previous = state.jump_cooldown;
        }
        assert_eq!(state.jump_cooldown, 0);
        assert_eq!(Runner::check_jump(&state), Ok(()));
    }

    #[test]
    fn dead_players_do_not_move() {
        let config = RaceConfig::default();
        let mut state = grounded(50.0);
        state.alive = false;

        Runner::advance(&mut state, 5.0, &config);

        assert_eq!(state.position, 50.0);
        assert_eq!(Runner::check_jump(&state), Err(RaceError::Dead));
    }

    #[test]
    fn ground_overlap_collides_but_airborne_does_not() {
        let obstacle = Obstacle::new(100.0, 16.0, 26.0);
        let mut state = grounded(96.0);
        assert!(Runner::collides(&state, &obstacle, 6.0));

        state.vertical_offset = -3.0;
        assert!(!Runner::collides(&state, &obstacle, 6.0));

        let clear = grounded(80.0);
        assert!(!Runner::collides(&clear, &obstacle, 6.0));
        let past = grounded(123.0);
        assert!(!Runner::collides(&past, &obstacle, 6.0));
    }

    #[test]
    fn score_is_integer_part_of_position() {
        let mut state = grounded(41.9);
        Runner::update_score(&mut state);
        assert_eq!(state.score, 41);
    }
}
