//! Envelope framing: converting [`Message`]s to and from JSON text.
//!
//! Decoding happens in two steps. The text is first parsed into an
//! [`Envelope`] (a JSON object with `op` and `d`), then [`Message::decode`]
//! turns `(op, d)` into a typed message. Each step has its own error so the
//! sender can be told exactly what was wrong.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Message, Opcode, ProtocolError};

/// The top-level wire object: `{"op": <int>, "d": <object>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub op: i64,
    pub d: Value,
}

impl Envelope {
    /// Parses JSON text into an envelope.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] if the text is not a JSON object, and
    /// [`ProtocolError::MissingField`] if `op` or `d` is absent or `op` is
    /// not an integer.
    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        let value: Map<String, Value> =
            serde_json::from_str(text).map_err(ProtocolError::Decode)?;
        let op = value
            .get("op")
            .and_then(Value::as_i64)
            .ok_or(ProtocolError::MissingField("operation"))?;
        let d = value
            .get("d")
            .cloned()
            .ok_or(ProtocolError::MissingField("data"))?;
        Ok(Self { op, d })
    }

    /// Serializes the envelope to JSON text.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

impl Message {
    /// Converts a message into its envelope.
    pub fn encode(&self) -> Result<Envelope, ProtocolError> {
        let d = match self {
            Self::Heartbeat | Self::ServerReady | Self::Subscribed => {
                Value::Object(Map::new())
            }
            Self::Error(d) => to_value(d)?,
            Self::Identify(d) => to_value(d)?,
            Self::Notification(d) => to_value(d)?,
            Self::Subscribe(d) => to_value(d)?,
            Self::Kick(d) => to_value(d)?,
            Self::SendMessage(d) => to_value(d)?,
            Self::GameState(d) => to_value(d)?,
            Self::GameStateDiff(d) => to_value(d)?,
            Self::Move(d) => to_value(d)?,
            Self::ActionResult(d) => to_value(d)?,
            Self::ApplyPower(d) => to_value(d)?,
        };
        Ok(Envelope {
            op: i64::from(self.opcode().code()),
            d,
        })
    }

    /// Builds a message from an opcode and its payload.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownOpcode`] when `op` is not recognised and
    /// [`ProtocolError::MalformedPayload`] when required fields of `d` are
    /// missing or have the wrong type.
    pub fn decode(op: i64, d: Value) -> Result<Self, ProtocolError> {
        let opcode =
            Opcode::try_from(op).map_err(ProtocolError::UnknownOpcode)?;
        let msg = match opcode {
            Opcode::Heartbeat => {
                expect_object(op, &d)?;
                Self::Heartbeat
            }
            Opcode::ServerReady => {
                expect_object(op, &d)?;
                Self::ServerReady
            }
            Opcode::Subscribed => {
                expect_object(op, &d)?;
                Self::Subscribed
            }
            Opcode::Error => Self::Error(from_value(op, d)?),
            Opcode::Identify => Self::Identify(from_value(op, d)?),
            Opcode::Notification => Self::Notification(from_value(op, d)?),
            Opcode::Subscribe => Self::Subscribe(from_value(op, d)?),
            Opcode::Kick => Self::Kick(from_value(op, d)?),
            Opcode::SendMessage => Self::SendMessage(from_value(op, d)?),
            Opcode::GameState => Self::GameState(from_value(op, d)?),
            Opcode::GameStateDiff => Self::GameStateDiff(from_value(op, d)?),
            Opcode::Move => Self::Move(from_value(op, d)?),
            Opcode::ActionResult => Self::ActionResult(from_value(op, d)?),
            Opcode::ApplyPower => Self::ApplyPower(from_value(op, d)?),
        };
        Ok(msg)
    }

    /// Encodes the message straight to JSON text.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        self.encode()?.to_text()
    }

    /// Decodes JSON text straight into a message.
    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        let envelope = Envelope::from_text(text)?;
        Self::decode(envelope.op, envelope.d)
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(ProtocolError::Encode)
}

fn from_value<T: DeserializeOwned>(
    op: i64,
    d: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(d)
        .map_err(|source| ProtocolError::MalformedPayload { op, source })
}

fn expect_object(op: i64, d: &Value) -> Result<(), ProtocolError> {
    if d.is_object() {
        return Ok(());
    }
    Err(ProtocolError::MalformedPayload {
        op,
        source: serde::de::Error::custom("payload must be an object"),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        ActionResultData, GameStateDiffData, IdentifyData, MoveData,
        NotificationData, UserId,
    };

    #[test]
    fn test_identify_decodes_from_wire_text() {
        let msg =
            Message::from_text(r#"{"op": 2, "d": {"token": "abc"}}"#).unwrap();
        assert_eq!(
            msg,
            Message::Identify(IdentifyData {
                token: "abc".into()
            })
        );
    }

    #[test]
    fn test_empty_payload_messages_encode_as_empty_object() {
        let text = Message::ServerReady.to_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"op": 3, "d": {}}));
    }

    #[test]
    fn test_error_message_json_shape() {
        let env = Message::error("Auth failed", true).encode().unwrap();
        assert_eq!(env.op, 1);
        assert_eq!(env.d, json!({"message": "Auth failed", "fatal": true}));
    }

    #[test]
    fn test_notification_carries_opaque_data() {
        let msg = Message::Notification(NotificationData {
            topic: "lobby.joined".into(),
            data: json!({"lobby_id": "@main"}),
        });
        let env = msg.encode().unwrap();
        assert_eq!(env.op, 4);
        assert_eq!(env.d["data"]["lobby_id"], "@main");
    }

    #[test]
    fn test_game_state_diff_json_shape() {
        let msg = Message::GameStateDiff(GameStateDiffData {
            recipient_id: UserId::from("a"),
            game_state_diff: json!({"moves_played": 1}),
            etag_from: "x".into(),
            etag_to: "y".into(),
        });
        let env = msg.encode().unwrap();
        assert_eq!(env.op, 10);
        assert_eq!(env.d["recipient_id"], "a");
        assert_eq!(env.d["etag_from"], "x");
        assert_eq!(env.d["etag_to"], "y");
    }

    #[test]
    fn test_move_and_action_result_survive_text_round_trip() {
        let mv = Message::Move(MoveData {
            piece_id: "p".into(),
            tile_id: "t".into(),
        });
        assert_eq!(Message::from_text(&mv.to_text().unwrap()).unwrap(), mv);

        let result = Message::ActionResult(ActionResultData {
            is_legal: false,
            reason: Some("Not your turn".into()),
        });
        assert_eq!(
            Message::from_text(&result.to_text().unwrap()).unwrap(),
            result
        );
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let err = Message::from_text("not json at all").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
        assert!(err.is_malformed());
    }

    #[test]
    fn test_json_array_is_a_decode_error() {
        let err = Message::from_text("[1, 2]").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_missing_op_and_d_are_reported() {
        let err = Message::from_text(r#"{"d": {}}"#).unwrap_err();
        assert_eq!(err.to_string(), "Missing operation");

        let err = Message::from_text(r#"{"op": 0}"#).unwrap_err();
        assert_eq!(err.to_string(), "Missing data");
    }

    #[test]
    fn test_unknown_opcode_is_rejected() {
        let err = Message::from_text(r#"{"op": 99, "d": {}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownOpcode(99)));
    }

    #[test]
    fn test_missing_payload_field_is_rejected() {
        let err = Message::from_text(r#"{"op": 5, "d": {}}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedPayload { op: 5, .. }
        ));
    }

    #[test]
    fn test_mistyped_payload_field_is_rejected() {
        let err = Message::from_text(
            r#"{"op": 11, "d": {"piece_id": 3, "tile_id": "t"}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedPayload { op: 11, .. }
        ));
    }

    #[test]
    fn test_empty_payload_must_still_be_an_object() {
        let err = Message::from_text(r#"{"op": 0, "d": 7}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload { op: 0, .. }));
    }
}
