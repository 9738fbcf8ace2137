//! Core protocol types for Tessera's wire format.
//!
//! Every message on the wire is a JSON object `{"op": <int>, "d": {...}}`.
//! The opcode selects the payload shape; the payload structs below define
//! those shapes field for field.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a registered user.
    UserId
);
string_id!(
    /// Identifier of a persisted match.
    GameId
);
string_id!(
    /// Identifier of a chat lobby (e.g. `@main`).
    LobbyId
);

// ---------------------------------------------------------------------------
// Opcodes and close codes
// ---------------------------------------------------------------------------

/// Message opcodes. The numeric values are fixed for client compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Heartbeat = 0,
    Error = 1,
    Identify = 2,
    ServerReady = 3,
    Notification = 4,
    Subscribe = 5,
    Subscribed = 6,
    Kick = 7,
    SendMessage = 8,
    GameState = 9,
    GameStateDiff = 10,
    Move = 11,
    ActionResult = 12,
    ApplyPower = 13,
}

impl Opcode {
    /// Returns the numeric value sent in the `op` field.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<i64> for Opcode {
    type Error = i64;

    fn try_from(op: i64) -> Result<Self, i64> {
        Ok(match op {
            0 => Self::Heartbeat,
            1 => Self::Error,
            2 => Self::Identify,
            3 => Self::ServerReady,
            4 => Self::Notification,
            5 => Self::Subscribe,
            6 => Self::Subscribed,
            7 => Self::Kick,
            8 => Self::SendMessage,
            9 => Self::GameState,
            10 => Self::GameStateDiff,
            11 => Self::Move,
            12 => Self::ActionResult,
            13 => Self::ApplyPower,
            other => return Err(other),
        })
    }
}

/// Close codes used when the server terminates a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// Regular shutdown.
    Normal,
    /// The peer sent something that could not be understood.
    MalformedMessage,
    /// Missing or invalid credentials.
    Unauthorized,
    /// The same user connected again elsewhere; this side lost.
    Conflict,
}

impl CloseCode {
    /// Returns the numeric close code put on the wire.
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::MalformedMessage => 4000,
            Self::Unauthorized => 4001,
            Self::Conflict => 4002,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// `d` of an [`Opcode::Error`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
    pub fatal: bool,
}

/// `d` of an [`Opcode::Identify`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyData {
    pub token: String,
}

/// `d` of an [`Opcode::Notification`] message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    pub topic: String,
    pub data: serde_json::Value,
}

/// `d` of an [`Opcode::Subscribe`] message. `topic` may be a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeData {
    pub topic: String,
}

/// `d` of an [`Opcode::Kick`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickData {
    pub reason: String,
}

/// `d` of an [`Opcode::SendMessage`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageData {
    pub content: String,
}

/// `d` of an [`Opcode::GameState`] message: a full per-viewer snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateData {
    pub recipient_id: UserId,
    pub game_state: serde_json::Value,
    pub etag: String,
}

/// `d` of an [`Opcode::GameStateDiff`] message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateDiffData {
    pub recipient_id: UserId,
    pub game_state_diff: serde_json::Value,
    pub etag_from: String,
    pub etag_to: String,
}

/// `d` of an [`Opcode::Move`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveData {
    pub piece_id: String,
    pub tile_id: String,
}

/// `d` of an [`Opcode::ActionResult`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResultData {
    pub is_legal: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `d` of an [`Opcode::ApplyPower`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPowerData {
    pub power_id: String,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A decoded protocol message: one variant per opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Heartbeat,
    Error(ErrorData),
    Identify(IdentifyData),
    ServerReady,
    Notification(NotificationData),
    Subscribe(SubscribeData),
    Subscribed,
    Kick(KickData),
    SendMessage(SendMessageData),
    GameState(GameStateData),
    GameStateDiff(GameStateDiffData),
    Move(MoveData),
    ActionResult(ActionResultData),
    ApplyPower(ApplyPowerData),
}

impl Message {
    /// Returns the opcode of this message.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Heartbeat => Opcode::Heartbeat,
            Self::Error(_) => Opcode::Error,
            Self::Identify(_) => Opcode::Identify,
            Self::ServerReady => Opcode::ServerReady,
            Self::Notification(_) => Opcode::Notification,
            Self::Subscribe(_) => Opcode::Subscribe,
            Self::Subscribed => Opcode::Subscribed,
            Self::Kick(_) => Opcode::Kick,
            Self::SendMessage(_) => Opcode::SendMessage,
            Self::GameState(_) => Opcode::GameState,
            Self::GameStateDiff(_) => Opcode::GameStateDiff,
            Self::Move(_) => Opcode::Move,
            Self::ActionResult(_) => Opcode::ActionResult,
            Self::ApplyPower(_) => Opcode::ApplyPower,
        }
    }

    /// Builds an [`Message::Error`].
    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error(ErrorData {
            message: message.into(),
            fatal,
        })
    }

    /// Builds a [`Message::Kick`].
    pub fn kick(reason: impl Into<String>) -> Self {
        Self::Kick(KickData {
            reason: reason.into(),
        })
    }

    /// Builds an [`Message::ActionResult`].
    pub fn action_result(is_legal: bool, reason: Option<String>) -> Self {
        Self::ActionResult(ActionResultData { is_legal, reason })
    }
}
