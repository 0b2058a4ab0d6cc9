//! Simulation - Session registry shared by the dispatcher and tick drivers
//!
//! Maps each location to at most one session and each session id to its
//! race. Every operation takes the registry lock once, so lookups never
//! observe a half-registered or half-removed session.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::game_server::error::RaceError;
use crate::game_server::race::{Race, RaceConfig};
use crate::game_server::runner::PlayerId;

/// Chat or channel a session is bound to.
pub type LocationId = i64;

/// A race behind its exclusive-access lock
pub type SharedRace = Arc<Mutex<Race>>;

/// Lock a race, recovering the guard if a previous holder panicked.
///
/// Every race operation leaves the state consistent before returning, so a
/// poisoned lock still guards a valid race.
pub fn lock_race(race: &SharedRace) -> MutexGuard<'_, Race> {
    race.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Short public session identifier, embedded in control callbacks
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    fn generate<R: Rng>(rng: &mut R) -> Self {
        Self(format!("{:08x}", rng.gen::<u32>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    pub active_sessions: usize,
    pub running_sessions: usize,
    pub driven_sessions: usize,
}

/// A session removed from the registry, handed to whoever tears it down
#[derive(Debug)]
pub struct EndedSession {
    pub id: SessionId,
    pub location: LocationId,
    pub race: SharedRace,
}

#[derive(Debug)]
struct SessionEntry {
    location: LocationId,
    race: SharedRace,
    /// Stop signal for the tick driver, once one is running
    shutdown: Option<watch::Sender<bool>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    by_location: HashMap<LocationId, SessionId>,
    sessions: HashMap<SessionId, SessionEntry>,
}

/// Owner of all active sessions
#[derive(Debug)]
pub struct SessionRegistry {
    config: RaceConfig,
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new(config: RaceConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a lobby at `location` with the creator as first player
    pub fn create_session(
        &self,
        location: LocationId,
        creator: PlayerId,
        creator_name: &str,
    ) -> Result<SessionId, RaceError> {
        let mut state = self.state();
        if state.by_location.contains_key(&location) {
            return Err(RaceError::AlreadyActive);
        }

        let mut rng = rand::thread_rng();
        let mut id = SessionId::generate(&mut rng);
        while state.sessions.contains_key(&id) {
            id = SessionId::generate(&mut rng);
        }

        let race = Race::new(self.config.clone(), creator, creator_name);
        state.sessions.insert(
            id.clone(),
            SessionEntry {
                location,
                race: Arc::new(Mutex::new(race)),
                shutdown: None,
            },
        );
        state.by_location.insert(location, id.clone());

        log::info!("Session {id} created at {location} by {creator_name}");
        Ok(id)
    }

    pub fn session_for_location(&self, location: LocationId) -> Option<SessionId> {
        self.state().by_location.get(&location).cloned()
    }

    pub fn get(&self, id: &SessionId) -> Option<SharedRace> {
        self.state().sessions.get(id).map(|entry| Arc::clone(&entry.race))
    }

    /// Session bound to `location`, resolved under a single lock
    pub fn get_by_location(&self, location: LocationId) -> Option<(SessionId, SharedRace)> {
        let state = self.state();
        let id = state.by_location.get(&location)?;
        let entry = state.sessions.get(id)?;
        Some((id.clone(), Arc::clone(&entry.race)))
    }

    pub fn location_of(&self, id: &SessionId) -> Option<LocationId> {
        self.state().sessions.get(id).map(|entry| entry.location)
    }

    /// Register the stop signal of a session's tick driver.
    ///
    /// Returns false if the session is gone or already driven.
    pub fn attach_driver(&self, id: &SessionId, shutdown: watch::Sender<bool>) -> bool {
        let mut state = self.state();
        match state.sessions.get_mut(id) {
            Some(entry) if entry.shutdown.is_none() => {
                entry.shutdown = Some(shutdown);
                true
            }
            _ => false,
        }
    }

    pub fn has_driver(&self, id: &SessionId) -> bool {
        self.state()
            .sessions
            .get(id)
            .is_some_and(|entry| entry.shutdown.is_some())
    }

    /// Remove both mappings of a session.
    ///
    /// Only the first caller for a given session gets it back; its driver,
    /// if any, is told to stop.
    pub fn end_session(&self, id: &SessionId) -> Option<EndedSession> {
        let mut state = self.state();
        let entry = state.sessions.remove(id)?;
        if state.by_location.get(&entry.location) == Some(id) {
            state.by_location.remove(&entry.location);
        }
        drop(state);

        if let Some(shutdown) = entry.shutdown {
            let _ = shutdown.send(true);
        }
        log::info!("Session {id} removed from {}", entry.location);

        Some(EndedSession {
            id: id.clone(),
            location: entry.location,
            race: entry.race,
        })
    }

    /// Signal every tick driver to stop; returns how many were signalled
    pub fn shutdown_all(&self) -> usize {
        let state = self.state();
        state
            .sessions
            .values()
            .filter_map(|entry| entry.shutdown.as_ref())
            .filter(|shutdown| shutdown.send(true).is_ok())
            .count()
    }

    pub fn stats(&self) -> ServerStats {
        let state = self.state();
        let running_sessions = state
            .sessions
            .values()
            .filter(|entry| lock_race(&entry.race).is_running())
            .count();
        let driven_sessions = state
            .sessions
            .values()
            .filter(|entry| entry.shutdown.is_some())
            .count();

        ServerStats {
            active_sessions: state.sessions.len(),
            running_sessions,
            driven_sessions,
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RaceConfig::default())
    }
}
