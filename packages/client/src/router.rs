//! Inbound frame dispatch.

use std::sync::Arc;

use crate::{protocol::ServerMessage, store::SessionStore};

/// What the router did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Heartbeat answer; belongs to the heartbeat monitor
    Pong,
    /// Recognized session frame (state may or may not have changed)
    Handled,
    /// Valid frame of a kind this client does not know
    Unhandled,
    /// Garbage: not JSON, no discriminator, or a malformed payload
    Discarded,
}

impl Routed {
    /// Whether the frame proves the server is speaking the session protocol.
    pub fn confirms_session(self) -> bool {
        matches!(self, Routed::Pong | Routed::Handled)
    }
}

/// Decodes frames and applies them to the session state store.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    store: Arc<SessionStore>,
    session_id: String,
}

impl MessageRouter {
    pub fn new(store: Arc<SessionStore>) -> Self {
        let session_id = store.session_id();
        Self { store, session_id }
    }

    /// Handle one inbound text frame. Never fails; bad frames are logged and dropped.
    pub fn handle(&self, raw: &str) -> Routed {
        let message = match ServerMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Discarding inbound frame: {}", e);
                tracing::debug!("Discarded frame: {}", raw);
                return Routed::Discarded;
            }
        };

        if message == ServerMessage::Pong {
            return Routed::Pong;
        }

        self.dispatch(message)
    }

    fn dispatch(&self, message: ServerMessage) -> Routed {
        match message {
            ServerMessage::Connected => {
                tracing::info!("Server acknowledged session '{}'", self.session_id);
            }
            ServerMessage::ParticipantsList(participants) => {
                tracing::debug!("Roster replaced ({} participants)", participants.len());
                self.store.replace_roster(participants);
            }
            ServerMessage::NextParticipant(participant) => {
                match &participant {
                    Some(p) => tracing::info!("Next speaker: {} ({})", p.name, p.id),
                    None => tracing::info!("No current speaker"),
                }
                self.store.set_current_participant(participant);
            }
            ServerMessage::SummarySubmitted { session_id } => {
                if !self.store.clear_current_for(session_id.as_deref()) {
                    tracing::warn!(
                        "Ignoring summarySubmitted for session {:?} (active: '{}')",
                        session_id,
                        self.session_id
                    );
                }
            }
            ServerMessage::MeetingEnded => {
                tracing::info!("Meeting '{}' ended", self.session_id);
                self.store.end_meeting();
            }
            ServerMessage::CommentAdded(comment) => {
                let id = comment.id.clone();
                if !self.store.append_comment(comment) {
                    tracing::debug!("Comment '{}' already present, skipping", id);
                }
            }
            ServerMessage::Pong => return Routed::Pong,
            ServerMessage::Unknown(kind) => {
                tracing::debug!("Unhandled message type '{}'", kind);
                return Routed::Unhandled;
            }
        }

        Routed::Handled
    }
}
