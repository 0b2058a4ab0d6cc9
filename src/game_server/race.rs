//! Race - Race configuration and session state machine
//!
//! Handles the lobby roster, the per-tick world update, and finish detection.

use std::collections::VecDeque;
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::game_server::error::RaceError;
use crate::game_server::obstacle::{Obstacle, ObstacleGenerator};
use crate::game_server::runner::{PlayerId, PlayerSnapshot, PlayerState, Runner};

/// Race configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceConfig {
    pub max_players: usize,
    /// Position at which a player completes the race
    pub finish_distance: f32,
    /// Player-forward speed at the start of the race (world units per tick)
    pub base_speed: f32,
    pub max_speed: f32,
    /// Speed gained every tick
    pub speed_ramp: f32,
    /// Fraction of the speed converted into forward progress
    pub forward_factor: f32,
    pub start_position: f32,
    /// Added to the vertical velocity every tick
    pub gravity: f32,
    /// Vertical velocity set by a jump (negative is upwards)
    pub jump_impulse: f32,
    /// Ticks between accepted jumps
    pub jump_cooldown: u32,
    /// Half the width of a player's hitbox
    pub player_half_width: f32,
    /// Distance behind the trailing player before obstacles are dropped
    pub eviction_margin: f32,
    /// Ticks before the first obstacle
    pub initial_spawn_delay: u32,
    /// Inclusive range of ticks between obstacles
    pub spawn_interval: (u32, u32),
    pub obstacles: ObstacleGenerator,
    /// Seed for obstacle generation, random when unset
    pub seed: Option<u64>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            max_players: 3,
            finish_distance: 1600.0,
            base_speed: 5.0,
            max_speed: 12.0,
            speed_ramp: 0.003,
            forward_factor: 1.0,
            start_position: 20.0,
            gravity: 0.9,
            jump_impulse: -11.5,
            jump_cooldown: 6,
            player_half_width: 6.0,
            eviction_margin: 40.0,
            initial_spawn_delay: 20,
            spawn_interval: (20, 50),
            obstacles: ObstacleGenerator::default(),
            seed: None,
        }
    }
}

/// Race status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceStatus {
    Lobby,
    Running,
    Finished,
}

/// Privilege required by a session control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Session creator, or the bot owner
    Creator,
    /// Bot owner only
    Owner,
}

impl Role {
    pub fn permits(&self, actor: &Actor, creator: Option<PlayerId>) -> bool {
        match self {
            Role::Creator => actor.is_owner || creator == Some(actor.id),
            Role::Owner => actor.is_owner,
        }
    }
}

/// Identity of whoever issued a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: PlayerId,
    pub is_owner: bool,
}

impl Actor {
    pub fn player(id: PlayerId) -> Self {
        Self {
            id,
            is_owner: false,
        }
    }

    pub fn owner(id: PlayerId) -> Self {
        Self { id, is_owner: true }
    }
}

/// How a finished race is summarised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceOutcome {
    Winner(String),
    TopScorer { name: String, score: u32 },
    NoWinner,
}

impl fmt::Display for RaceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceOutcome::Winner(name) => write!(f, "🏁 Winner: {name}!"),
            RaceOutcome::TopScorer { name, score } => {
                write!(f, "Game over. Top: {name} — {score}")
            }
            RaceOutcome::NoWinner => write!(f, "Game over. No winners."),
        }
    }
}

/// Complete race state
#[derive(Debug)]
pub struct Race {
    config: RaceConfig,
    status: RaceStatus,
    /// Join order; also the finish tie-break order
    players: Vec<PlayerState>,
    creator: PlayerId,
    /// Sorted ascending by position
    obstacles: VecDeque<Obstacle>,
    tick: u64,
    speed: f32,
    winner: Option<PlayerId>,
    spawn_countdown: u32,
    rng: Pcg32,
}

impl Race {
    /// Create a lobby with the creator as its first player
    pub fn new(config: RaceConfig, creator: PlayerId, creator_name: impl Into<String>) -> Self {
        let rng = match config.seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_entropy(),
        };
        let mut players = Vec::with_capacity(config.max_players);
        players.push(PlayerState::new(creator, creator_name));

        Self {
            status: RaceStatus::Lobby,
            players,
            creator,
            obstacles: VecDeque::new(),
            tick: 0,
            speed: config.base_speed,
            winner: None,
            spawn_countdown: config.initial_spawn_delay,
            rng,
            config,
        }
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn status(&self) -> RaceStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == RaceStatus::Running
    }

    pub fn is_finished(&self) -> bool {
        self.status == RaceStatus::Finished
    }

    pub fn creator(&self) -> PlayerId {
        self.creator
    }

    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    pub fn obstacles(&self) -> &VecDeque<Obstacle> {
        &self.obstacles
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Get player by ID
    pub fn get_player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn winner(&self) -> Option<&PlayerState> {
        self.winner.and_then(|id| self.get_player(id))
    }

    /// Check that `actor` holds `role` for this session
    pub fn authorize(&self, actor: &Actor, role: Role) -> Result<(), RaceError> {
        if role.permits(actor, Some(self.creator)) {
            Ok(())
        } else {
            Err(RaceError::Unauthorized)
        }
    }

    pub fn join(&mut self, id: PlayerId, name: impl Into<String>) -> Result<(), RaceError> {
        match self.status {
            RaceStatus::Lobby => {}
            RaceStatus::Running => return Err(RaceError::GameInProgress),
            RaceStatus::Finished => return Err(RaceError::SessionFinished),
        }
        if self.get_player(id).is_some() {
            return Err(RaceError::AlreadyJoined);
        }
        if self.players.len() >= self.config.max_players {
            return Err(RaceError::SessionFull);
        }

        self.players.push(PlayerState::new(id, name));
        Ok(())
    }

    /// Drop a player from the roster.
    ///
    /// Mid-race the finish and elimination checks only see the smaller
    /// roster on the next step.
    pub fn leave(&mut self, id: PlayerId) -> bool {
        if self.is_finished() {
            return false;
        }
        let Some(index) = self.players.iter().position(|p| p.id == id) else {
            return false;
        };

        self.players.remove(index);
        if self.creator == id {
            if let Some(next) = self.players.first() {
                self.creator = next.id;
            }
        }
        true
    }

    /// Leave the lobby and reset the world to the starting line
    pub fn start(&mut self, actor: &Actor) -> Result<(), RaceError> {
        self.authorize(actor, Role::Creator)?;
        match self.status {
            RaceStatus::Lobby => {}
            RaceStatus::Running => return Err(RaceError::AlreadyRunning),
            RaceStatus::Finished => return Err(RaceError::SessionFinished),
        }

        self.tick = 0;
        self.obstacles.clear();
        self.spawn_countdown = self.config.initial_spawn_delay;
        for player in &mut self.players {
            player.reset(self.config.start_position);
        }
        self.winner = None;
        self.speed = self.config.base_speed;
        self.status = RaceStatus::Running;
        Ok(())
    }

    pub fn request_jump(&mut self, id: PlayerId) -> Result<(), RaceError> {
        match self.status {
            RaceStatus::Running => {}
            RaceStatus::Lobby => return Err(RaceError::NotRunning),
            RaceStatus::Finished => return Err(RaceError::SessionFinished),
        }
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(RaceError::NotInGame)?;
        Runner::check_jump(player)?;
        Runner::jump(player, &self.config);
        Ok(())
    }

    /// End the session early with no winner
    pub fn force_end(&mut self, actor: &Actor) -> Result<(), RaceError> {
        self.authorize(actor, Role::Creator)?;
        if self.is_finished() {
            return Err(RaceError::SessionFinished);
        }
        self.finish(None);
        Ok(())
    }

    /// End the session on a system path (driver cancellation, shutdown)
    pub fn abort(&mut self) {
        self.finish(None);
    }

    /// Advance the world by one tick.
    ///
    /// Outside of `Running` this only reports the current state.
    pub fn step(&mut self) -> RaceSnapshot {
        if !self.is_running() {
            return self.snapshot();
        }

        self.tick += 1;
        self.spawn_obstacle();

        for player in &mut self.players {
            Runner::advance(player, self.speed, &self.config);
        }

        self.resolve_collisions();

        for player in &mut self.players {
            Runner::update_score(player);
        }

        if self.winner.is_none() {
            let finish = self.config.finish_distance;
            // Players eliminated on an earlier tick stopped short of the line
            if let Some(leader) = self.players.iter().find(|p| p.position >= finish) {
                let id = leader.id;
                self.finish(Some(id));
            }
        }

        self.evict_obstacles();
        self.speed = (self.speed + self.config.speed_ramp).min(self.config.max_speed);

        if self.players.iter().all(|p| !p.alive) {
            self.finish(None);
        }

        debug_assert!(
            self.obstacles
                .iter()
                .zip(self.obstacles.iter().skip(1))
                .all(|(a, b)| a.position <= b.position),
            "obstacles out of order"
        );

        self.snapshot()
    }

    fn spawn_obstacle(&mut self) {
        self.spawn_countdown = self.spawn_countdown.saturating_sub(1);
        if self.spawn_countdown > 0 {
            return;
        }

        let leading = self
            .players
            .iter()
            .map(|p| p.position)
            .reduce(f32::max)
            .unwrap_or(0.0);
        let obstacle = self
            .config
            .obstacles
            .generate(leading, self.obstacles.back(), &mut self.rng);
        self.obstacles.push_back(obstacle);

        let (min, max) = self.config.spawn_interval;
        self.spawn_countdown = self.rng.gen_range(min..=max.max(min)).max(1);
    }

    fn resolve_collisions(&mut self) {
        let half_width = self.config.player_half_width;
        for player in self.players.iter_mut().filter(|p| p.alive) {
            if self
                .obstacles
                .iter()
                .any(|o| Runner::collides(player, o, half_width))
            {
                player.alive = false;
                log::debug!("{} hit an obstacle at {:.1}", player.name, player.position);
            }
        }
    }

    fn evict_obstacles(&mut self) {
        let trailing = self.players.iter().map(|p| p.position).reduce(f32::min);
        let Some(trailing) = trailing else {
            return;
        };

        let margin = self.config.eviction_margin;
        while self
            .obstacles
            .front()
            .is_some_and(|o| o.position + margin < trailing - margin)
        {
            self.obstacles.pop_front();
        }
    }

    fn finish(&mut self, winner: Option<PlayerId>) {
        if self.is_finished() {
            return;
        }
        self.status = RaceStatus::Finished;
        self.winner = winner;
    }

    /// Summary of a finished race: winner, else the best positive score
    pub fn outcome(&self) -> RaceOutcome {
        if let Some(winner) = self.winner() {
            return RaceOutcome::Winner(winner.name.clone());
        }

        let mut best: Option<&PlayerState> = None;
        for player in &self.players {
            if best.map_or(true, |b| player.score > b.score) {
                best = Some(player);
            }
        }
        match best {
            Some(player) if player.score > 0 => RaceOutcome::TopScorer {
                name: player.name.clone(),
                score: player.score,
            },
            _ => RaceOutcome::NoWinner,
        }
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        RaceSnapshot {
            tick: self.tick,
            status: self.status,
            speed: self.speed,
            players: self.players.iter().map(PlayerSnapshot::from).collect(),
            obstacles: self.obstacles.iter().copied().collect(),
            winner: self.winner().map(|p| p.name.clone()),
        }
    }
}

/// Immutable view of the race after a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub tick: u64,
    pub status: RaceStatus,
    pub speed: f32,
    pub players: Vec<PlayerSnapshot>,
    pub obstacles: Vec<Obstacle>,
    pub winner: Option<String>,
}

impl RaceSnapshot {
    pub fn is_finished(&self) -> bool {
        self.status == RaceStatus::Finished
    }
}
