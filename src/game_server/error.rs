//! Error - Rejections reported back to the acting player
//!
//! Every variant is recoverable: the operation that produced it left the
//! session untouched.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RaceError {
    #[error("already joined this race")]
    AlreadyJoined,
    #[error("session is full")]
    SessionFull,
    #[error("not in this race")]
    NotInGame,
    #[error("player is out of the race")]
    Dead,
    #[error("jump is on cooldown")]
    OnCooldown,
    #[error("a session is already active here")]
    AlreadyActive,
    #[error("session not found")]
    SessionNotFound,
    #[error("only the session creator can do that")]
    Unauthorized,
    #[error("race already in progress")]
    GameInProgress,
    #[error("race is already running")]
    AlreadyRunning,
    #[error("race is not running")]
    NotRunning,
    #[error("session has finished")]
    SessionFinished,
    #[error("invalid player slot")]
    InvalidSlot,
    #[error("this control belongs to another player")]
    WrongPlayer,
}

impl RaceError {
    /// Short machine-readable reason, as shown on button rejections.
    pub fn reason(&self) -> &'static str {
        match self {
            RaceError::AlreadyJoined => "already",
            RaceError::SessionFull => "full",
            RaceError::NotInGame => "not_in_game",
            RaceError::Dead => "dead",
            RaceError::OnCooldown => "cooldown",
            RaceError::AlreadyActive => "active",
            RaceError::SessionNotFound => "not_found",
            RaceError::Unauthorized => "unauthorized",
            RaceError::GameInProgress => "in_progress",
            RaceError::AlreadyRunning => "running",
            RaceError::NotRunning => "not_running",
            RaceError::SessionFinished => "finished",
            RaceError::InvalidSlot => "invalid_slot",
            RaceError::WrongPlayer => "wrong_player",
        }
    }
}
