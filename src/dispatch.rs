//! Dispatcher - turns chat events into session operations
//!
//! Rejections come back as replies for the acting user; nothing here fails
//! the transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::BotConfig;
use crate::driver::DriverContext;
use crate::game_server::{
    lock_race, Actor, LocationId, PlayerId, RaceError, Role, SessionId, SessionRegistry,
};
use crate::render::FrameRenderer;
use crate::store::ScoreStore;
use crate::transport::{Command, Inbound, Outbound, OutboundSender};

pub const HELP_TEXT: &str = "Hey! I'm DinoRace Bot.\n\
Commands:\n\
/newrace - create a race\n\
/join - join created race\n\
/startgame - start the race (creator)\n\
/leaderboard - top scores\n\
/leave - leave the race\n\
/status - show session status\n\
\n\
Owner-only: /broadcast <text>, /podcast (send audio next), /shutdown";

/// Answer for the user who sent a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Chat message in the originating location
    Text(String),
    /// Short acknowledgement of a pressed control
    Notice(String),
    /// Acknowledgement shown as a blocking popup
    Alert(String),
    /// Nothing to say
    Silent,
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(text) | Reply::Notice(text) | Reply::Alert(text) => text,
            Reply::Silent => "",
        }
    }
}

pub struct Dispatcher {
    ctx: DriverContext,
    owner_id: Option<PlayerId>,
    leaderboard_size: usize,
    stopping: AtomicBool,
    /// Podcast captions waiting for the owner's next media message
    pending_podcasts: Mutex<HashMap<PlayerId, String>>,
}

impl Dispatcher {
    pub fn new(
        config: &BotConfig,
        store: Arc<dyn ScoreStore>,
        renderer: Arc<dyn FrameRenderer>,
        outbound: OutboundSender,
    ) -> Self {
        let ctx = DriverContext {
            registry: Arc::new(SessionRegistry::new(config.race.clone())),
            store,
            renderer,
            outbound,
            tick_interval: config.tick_interval,
        };
        Self {
            ctx,
            owner_id: config.owner_id,
            leaderboard_size: config.leaderboard_size,
            stopping: AtomicBool::new(false),
            pending_podcasts: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.ctx.registry
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn actor(&self, id: PlayerId) -> Actor {
        Actor {
            id,
            is_owner: self.owner_id == Some(id),
        }
    }

    /// Remember a location the bot has seen traffic in
    pub fn observe(&self, location: LocationId, title: &str) {
        if let Err(e) = self.ctx.store.remember_location(location, title) {
            log::warn!("Failed to remember location {location}: {e}");
        }
    }

    /// Apply one inbound event. Must run inside a tokio runtime, since
    /// starting a race spawns its tick driver.
    pub fn handle(&self, inbound: Inbound) -> Reply {
        let actor = self.actor(inbound.actor);
        let location = inbound.location;
        let name = inbound.actor_name.as_str();

        match inbound.command {
            Command::Help => {
                self.observe(location, &inbound.location_title);
                Reply::Text(HELP_TEXT.to_string())
            }
            Command::NewRace => {
                self.observe(location, &inbound.location_title);
                self.new_race(location, &actor, name)
            }
            Command::Join => {
                self.observe(location, &inbound.location_title);
                self.join(location, &actor, name)
            }
            Command::Leave => self.leave(location, &actor),
            Command::Start => self.start(location, &actor),
            Command::Status => self.status(location),
            Command::Leaderboard => self.leaderboard(),
            Command::Jump { session, slot } => self.jump(&session, slot, &actor),
            Command::EndEarly { session } => self.end_early(&session, &actor),
            Command::Broadcast(text) => self.broadcast(&actor, &text),
            Command::Podcast(caption) => self.podcast(&actor, caption),
            Command::Media { message_id } => {
                self.media(&actor, location, &inbound.location_title, message_id)
            }
            Command::Shutdown => self.shutdown(&actor),
        }
    }

    fn new_race(&self, location: LocationId, actor: &Actor, name: &str) -> Reply {
        if self.is_stopping() {
            return Reply::Text("Bot is shutting down.".to_string());
        }
        match self.ctx.registry.create_session(location, actor.id, name) {
            Ok(session) => Reply::Text(format!(
                "New race `{session}` created by {name}. Others use /join to join. \
                 Creator use /startgame when ready."
            )),
            Err(_) => Reply::Text(
                "A session is already active in this chat. Use /status or wait for it to end."
                    .to_string(),
            ),
        }
    }

    fn join(&self, location: LocationId, actor: &Actor, name: &str) -> Reply {
        let Some((_, race)) = self.ctx.registry.get_by_location(location) else {
            return Reply::Text("No active session here. Use /newrace first.".to_string());
        };
        let mut race = lock_race(&race);
        match race.join(actor.id, name) {
            Ok(()) => Reply::Text(format!(
                "{name} joined the race. ({}/{})",
                race.players().len(),
                race.config().max_players
            )),
            Err(RaceError::AlreadyJoined) => Reply::Text("You already joined.".to_string()),
            Err(RaceError::SessionFull) => Reply::Text(format!(
                "Session full ({} players).",
                race.config().max_players
            )),
            Err(e) => Reply::Text(format!("Cannot join: {e}")),
        }
    }

    fn leave(&self, location: LocationId, actor: &Actor) -> Reply {
        let Some((_, race)) = self.ctx.registry.get_by_location(location) else {
            return Reply::Text("No active session here.".to_string());
        };
        if lock_race(&race).leave(actor.id) {
            Reply::Text("You left the race.".to_string())
        } else {
            Reply::Text("You were not in the race.".to_string())
        }
    }

    fn status(&self, location: LocationId) -> Reply {
        let Some((session, race)) = self.ctx.registry.get_by_location(location) else {
            return Reply::Text("No active session here.".to_string());
        };
        let race = lock_race(&race);
        let mut text = format!("Session `{session}`\nPlayers:\n");
        for (i, player) in race.players().iter().enumerate() {
            let state = if player.alive { "Alive" } else { "Dead" };
            text.push_str(&format!(
                "{}. {} — {state} — score {}\n",
                i + 1,
                player.name,
                player.score
            ));
        }
        Reply::Text(text)
    }

    fn start(&self, location: LocationId, actor: &Actor) -> Reply {
        if self.is_stopping() {
            return Reply::Text("Bot is shutting down.".to_string());
        }
        let Some((session, race)) = self.ctx.registry.get_by_location(location) else {
            return Reply::Text("No active session. Use /newrace.".to_string());
        };
        let started = lock_race(&race).start(actor);
        match started {
            Ok(()) => {
                if self.ctx.spawn_driver(&session).is_none() {
                    log::warn!("Session {session} started without a driver");
                }
                Reply::Text(
                    "Game starting! Buttons will appear under frames. \
                     Jump button only works for assigned player."
                        .to_string(),
                )
            }
            Err(RaceError::Unauthorized) => {
                Reply::Text("Only the session creator can start.".to_string())
            }
            Err(RaceError::AlreadyRunning) => Reply::Text("Game already running.".to_string()),
            Err(e) => Reply::Text(format!("Cannot start: {e}")),
        }
    }

    fn jump(&self, session: &SessionId, slot: usize, actor: &Actor) -> Reply {
        let Some(race) = self.ctx.registry.get(session) else {
            return Reply::Alert("Session expired or not found.".to_string());
        };
        let mut race = lock_race(&race);
        let assigned = race.players().get(slot).map(|p| p.id);
        let result = match assigned {
            None => Err(RaceError::InvalidSlot),
            Some(id) if id != actor.id => Err(RaceError::WrongPlayer),
            Some(_) => race.request_jump(actor.id),
        };
        match result {
            Ok(()) => Reply::Notice("Jumped!".to_string()),
            Err(RaceError::InvalidSlot) => Reply::Alert("Invalid player".to_string()),
            Err(RaceError::WrongPlayer) => Reply::Alert("This button is not for you.".to_string()),
            Err(e) => Reply::Notice(format!("Cannot jump: {}", e.reason())),
        }
    }

    fn end_early(&self, session: &SessionId, actor: &Actor) -> Reply {
        let Some(race) = self.ctx.registry.get(session) else {
            return Reply::Notice("Session not found.".to_string());
        };
        let ended = lock_race(&race).force_end(actor);
        match ended {
            Ok(()) => {
                // Lobbies have no driver to notice the end
                if !self.ctx.registry.has_driver(session) {
                    self.ctx.teardown(session);
                }
                Reply::Notice("Ending session...".to_string())
            }
            Err(RaceError::Unauthorized) => {
                Reply::Alert("Only creator/owner can end.".to_string())
            }
            Err(e) => Reply::Notice(format!("Cannot end: {e}")),
        }
    }

    fn leaderboard(&self) -> Reply {
        match self.ctx.store.top_scores(self.leaderboard_size) {
            Ok(rows) if rows.is_empty() => Reply::Text("No scores yet.".to_string()),
            Ok(rows) => {
                let mut text = "🏆 Leaderboard:\n".to_string();
                for (i, (name, score)) in rows.iter().enumerate() {
                    text.push_str(&format!("{}. {name} — {score}\n", i + 1));
                }
                Reply::Text(text)
            }
            Err(e) => {
                log::error!("Failed to read leaderboard: {e}");
                Reply::Text("Leaderboard unavailable.".to_string())
            }
        }
    }

    fn broadcast(&self, actor: &Actor, text: &str) -> Reply {
        if !Role::Owner.permits(actor, None) {
            return Reply::Text("❌ Owner-only command.".to_string());
        }
        if text.is_empty() {
            return Reply::Text("Usage: /broadcast <message>".to_string());
        }
        let text = format!("📣 Broadcast:\n\n{text}");
        match self.fan_out(|location| Outbound::Text {
            location,
            text: text.clone(),
        }) {
            Some((sent, total)) => Reply::Text(format!("Broadcast sent to {sent}/{total} chats.")),
            None => Reply::Text("Broadcast failed.".to_string()),
        }
    }

    fn podcast(&self, actor: &Actor, caption: String) -> Reply {
        if !Role::Owner.permits(actor, None) {
            return Reply::Text("❌ Owner-only command.".to_string());
        }
        self.pending_podcasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(actor.id, caption);
        Reply::Text(
            "Send the audio/voice/document now. I will broadcast it to all saved chats."
                .to_string(),
        )
    }

    /// Relay media to every known location if the sender has a podcast pending
    fn media(&self, actor: &Actor, location: LocationId, title: &str, message_id: i64) -> Reply {
        let pending = self
            .pending_podcasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&actor.id);
        let Some(caption) = pending else {
            self.observe(location, title);
            return Reply::Silent;
        };

        let caption = Some(caption).filter(|c| !c.is_empty());
        match self.fan_out(|target| Outbound::Relay {
            location: target,
            source_location: location,
            message_id,
            caption: caption.clone(),
        }) {
            Some((sent, total)) => {
                Reply::Text(format!("Podcast broadcasted to {sent}/{total} chats."))
            }
            None => Reply::Text("Podcast failed.".to_string()),
        }
    }

    /// Queue one message per known location; `None` if the locations are unreadable
    fn fan_out(&self, message: impl Fn(LocationId) -> Outbound) -> Option<(usize, usize)> {
        let locations = match self.ctx.store.all_locations() {
            Ok(locations) => locations,
            Err(e) => {
                log::error!("Failed to list locations: {e}");
                return None;
            }
        };

        let mut sent = 0;
        for &location in &locations {
            match self.ctx.outbound.send(message(location)) {
                Ok(()) => sent += 1,
                Err(_) => log::warn!("Failed to queue message for {location}"),
            }
        }
        Some((sent, locations.len()))
    }

    fn shutdown(&self, actor: &Actor) -> Reply {
        if !Role::Owner.permits(actor, None) {
            return Reply::Text("❌ Owner-only command.".to_string());
        }
        self.stopping.store(true, Ordering::SeqCst);
        let stopped = self.ctx.registry.shutdown_all();
        log::info!("Shutdown requested, stopping {stopped} games");
        Reply::Text("Shutting down bot and stopping all games...".to_string())
    }
}
