//! Push-channel frame definitions.
//!
//! Every frame is a JSON text frame carrying a camelCase `type` discriminator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{Comment, Participant};

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Attaches the connection to a session scope; sent right after open
    JoinSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Liveness probe answered by `pong`
    Ping,
    /// Best-effort hint sent after the REST write succeeded
    SummarySubmitted {
        #[serde(rename = "sessionId")]
        session_id: String,
        summary: String,
    },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Connected,
    ParticipantsList(Vec<Participant>),
    /// `None` means nobody currently holds the floor
    NextParticipant(Option<Participant>),
    SummarySubmitted { session_id: Option<String> },
    MeetingEnded,
    CommentAdded(Comment),
    Pong,
    /// A discriminator this client does not know about
    Unknown(String),
}

/// Why an inbound frame was discarded.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string 'type' field")]
    MissingType,

    #[error("malformed '{kind}' payload: {reason}")]
    MalformedPayload { kind: &'static str, reason: String },
}

fn malformed(kind: &'static str, reason: impl ToString) -> FrameError {
    FrameError::MalformedPayload {
        kind,
        reason: reason.to_string(),
    }
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

impl ServerMessage {
    /// Decode a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(raw)?;
        let mut object = match value {
            Value::Object(object) => object,
            _ => return Err(FrameError::NotAnObject),
        };
        let kind = match object.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(FrameError::MissingType),
        };

        let message = match kind.as_str() {
            "connected" => ServerMessage::Connected,
            // `updateParticipants` is the older name of the same frame.
            "participantsList" | "updateParticipants" => {
                // Older servers put the roster under `data`.
                let payload = object
                    .remove("participants")
                    .or_else(|| object.remove("data"))
                    .ok_or_else(|| malformed("participantsList", "missing participants"))?;
                if !payload.is_array() {
                    return Err(malformed("participantsList", "participants is not a sequence"));
                }
                let participants = serde_json::from_value(payload)
                    .map_err(|e| malformed("participantsList", e))?;
                ServerMessage::ParticipantsList(participants)
            }
            "nextParticipant" => match object.remove("participant") {
                None | Some(Value::Null) => ServerMessage::NextParticipant(None),
                Some(payload) => {
                    let participant = serde_json::from_value(payload)
                        .map_err(|e| malformed("nextParticipant", e))?;
                    ServerMessage::NextParticipant(Some(participant))
                }
            },
            "summarySubmitted" => ServerMessage::SummarySubmitted {
                session_id: object.get("sessionId").and_then(id_to_string),
            },
            "meetingEnded" => ServerMessage::MeetingEnded,
            "commentAdded" => {
                let payload = object
                    .remove("comment")
                    .ok_or_else(|| malformed("commentAdded", "missing comment"))?;
                let comment =
                    serde_json::from_value(payload).map_err(|e| malformed("commentAdded", e))?;
                ServerMessage::CommentAdded(comment)
            }
            "pong" => ServerMessage::Pong,
            _ => ServerMessage::Unknown(kind),
        };

        Ok(message)
    }
}
