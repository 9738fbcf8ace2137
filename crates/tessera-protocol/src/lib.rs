//! Wire protocol for Tessera.
//!
//! This crate defines the "language" that clients and servers speak:
//!
//! - **Types** ([`Message`], [`Opcode`], [`CloseCode`], payload structs,
//!   identity newtypes): the structures that travel on the wire.
//! - **Codec** ([`Envelope`], [`Message::encode`], [`Message::decode`]):
//!   how those messages are converted to and from JSON text.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! The protocol layer is a pure codec: no I/O, no knowledge of users,
//! lobbies or games.
//!
//! ```text
//! Transport (frames) → Protocol (Message) → Session (user context)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Envelope;
pub use error::ProtocolError;
pub use types::{
    ActionResultData, ApplyPowerData, CloseCode, ErrorData, GameId,
    GameStateData, GameStateDiffData, IdentifyData, KickData, LobbyId,
    Message, MoveData, NotificationData, Opcode, SendMessageData,
    SubscribeData, UserId,
};
