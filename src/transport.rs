//! Transport - Messages exchanged with the chat platform
//!
//! Inbound commands and button callbacks are parsed here; outbound frames and
//! texts are queued on an unbounded channel drained by the platform client.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::game_server::{LocationId, PlayerId, RaceSnapshot, SessionId};

/// Queue of messages waiting to be delivered
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// `/start`: usage text
    Help,
    NewRace,
    Join,
    Leave,
    /// `/startgame`
    Start,
    Status,
    Leaderboard,
    /// Jump control pressed for a player slot
    Jump { session: SessionId, slot: usize },
    EndEarly { session: SessionId },
    Broadcast(String),
    /// `/podcast [caption]`: relay the owner's next media message everywhere
    Podcast(String),
    /// Audio, voice or document message posted in a location
    Media { message_id: i64 },
    Shutdown,
}

impl Command {
    /// Parse a slash command, ignoring a trailing `@botname`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (head, args) = match text.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (text, ""),
        };
        let name = head.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);

        let command = match name {
            "start" => Command::Help,
            "newrace" => Command::NewRace,
            "join" => Command::Join,
            "leave" => Command::Leave,
            "startgame" => Command::Start,
            "status" => Command::Status,
            "leaderboard" => Command::Leaderboard,
            "broadcast" => Command::Broadcast(args.to_string()),
            "podcast" => Command::Podcast(args.to_string()),
            "shutdown" => Command::Shutdown,
            _ => return None,
        };
        Some(command)
    }

    /// Parse control callback data (`jump|<session>|<slot>`, `end|<session>`)
    pub fn parse_callback(data: &str) -> Option<Self> {
        let mut parts = data.split('|');
        let command = match (parts.next()?, parts.next(), parts.next()) {
            ("jump", Some(session), Some(slot)) => Command::Jump {
                session: SessionId::new(session),
                slot: slot.parse().ok()?,
            },
            ("end", Some(session), None) => Command::EndEarly {
                session: SessionId::new(session),
            },
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(command)
    }
}

/// One event from the chat platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    pub actor: PlayerId,
    pub actor_name: String,
    pub location: LocationId,
    pub location_title: String,
    pub command: Command,
}

/// What pressing a control asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlAction {
    Jump { session: SessionId, slot: usize },
    EndEarly { session: SessionId },
}

impl From<ControlAction> for Command {
    fn from(action: ControlAction) -> Self {
        match action {
            ControlAction::Jump { session, slot } => Command::Jump { session, slot },
            ControlAction::EndEarly { session } => Command::EndEarly { session },
        }
    }
}

/// Interactive button attached to a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub label: String,
    pub action: ControlAction,
}

impl Control {
    /// Callback payload understood by [`Command::parse_callback`]
    pub fn callback_data(&self) -> String {
        match &self.action {
            ControlAction::Jump { session, slot } => format!("jump|{session}|{slot}"),
            ControlAction::EndEarly { session } => format!("end|{session}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub image: Vec<u8>,
    pub caption: String,
    pub controls: Vec<Control>,
}

impl Frame {
    /// Frame for one tick: a jump control per player plus an end control
    pub fn for_snapshot(session: &SessionId, snapshot: &RaceSnapshot, image: Vec<u8>) -> Self {
        let mut controls: Vec<Control> = snapshot
            .players
            .iter()
            .enumerate()
            .map(|(slot, player)| Control {
                label: format!("Jump — P{} ({})", slot + 1, player.name),
                action: ControlAction::Jump {
                    session: session.clone(),
                    slot,
                },
            })
            .collect();
        controls.push(Control {
            label: "End Early".to_string(),
            action: ControlAction::EndEarly {
                session: session.clone(),
            },
        });

        Self {
            image,
            caption: format!("Tick {}", snapshot.tick),
            controls,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outbound {
    Frame { location: LocationId, frame: Frame },
    Text { location: LocationId, text: String },
    /// Copy of a message already posted in `source_location`
    Relay {
        location: LocationId,
        source_location: LocationId,
        message_id: i64,
        caption: Option<String>,
    },
}
