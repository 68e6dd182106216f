//! Session state store.
//!
//! Single writer of roster, turn state and comment stream. Readers get a
//! [`SessionSnapshot`] through a `watch` subscription and re-render whenever
//! it changes.

use std::collections::HashSet;

use tokio::sync::watch;

use crate::model::{Comment, Participant};

/// Connection state as seen by the UI layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected yet, or closed by the client itself
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Waiting to make the given reconnect attempt
    Reconnecting { attempt: u32 },
    /// Retries are exhausted; only a manual reconnect leaves this state
    Disconnected,
}

/// Why the comment list could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    /// The session cookie expired; retrying will not help until the user logs in
    LoginRequired,
    /// Any other REST failure; `/refresh` may succeed
    Failed(String),
}

/// Reconciled view of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub roster: Vec<Participant>,
    pub current_participant: Option<Participant>,
    pub comments: Vec<Comment>,
    /// Set when the last comment fetch failed, cleared by the next successful one
    pub comments_error: Option<LoadFailure>,
    pub connection: ConnectionStatus,
    /// Set once `meetingEnded` arrives; the view should navigate away
    pub meeting_ended: bool,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionStatus::Connected
    }

    pub fn is_reconnecting(&self) -> bool {
        matches!(self.connection, ConnectionStatus::Reconnecting { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        self.connection == ConnectionStatus::Disconnected
    }
}

/// Holder of the session state with change notification.
#[derive(Debug)]
pub struct SessionStore {
    state: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    pub fn new(session_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot {
            session_id: session_id.into(),
            ..SessionSnapshot::default()
        });
        Self { state }
    }

    pub fn session_id(&self) -> String {
        self.state.borrow().session_id.clone()
    }

    /// Current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Replace the roster wholesale. Duplicate ids keep their first entry.
    pub(crate) fn replace_roster(&self, participants: Vec<Participant>) {
        let mut seen = HashSet::new();
        let roster: Vec<_> = participants
            .into_iter()
            .filter(|p| seen.insert(p.id.clone()))
            .collect();

        self.state.send_if_modified(|state| {
            if state.roster == roster {
                return false;
            }
            state.roster = roster;
            true
        });
    }

    pub(crate) fn set_current_participant(&self, participant: Option<Participant>) {
        self.state.send_if_modified(|state| {
            if state.current_participant == participant {
                return false;
            }
            state.current_participant = participant;
            true
        });
    }

    /// Clear the speaker if `session_id` names this session.
    ///
    /// A missing id is accepted since the push channel is scoped to one
    /// session. Returns whether the event was accepted.
    pub(crate) fn clear_current_for(&self, session_id: Option<&str>) -> bool {
        let mut accepted = false;
        self.state.send_if_modified(|state| {
            if session_id.is_some_and(|id| id != state.session_id) {
                return false;
            }
            accepted = true;
            state.current_participant.take().is_some()
        });
        accepted
    }

    pub(crate) fn end_meeting(&self) {
        self.state.send_if_modified(|state| {
            if state.meeting_ended && state.current_participant.is_none() {
                return false;
            }
            state.current_participant = None;
            state.meeting_ended = true;
            true
        });
    }

    /// Merge the result of a bulk fetch.
    ///
    /// The fetched sequence is authoritative for ordering. Comments that were
    /// pushed while the fetch was running and are missing from it are kept
    /// after the fetched ones.
    pub(crate) fn merge_fetched_comments(&self, fetched: Vec<Comment>) {
        self.state.send_if_modified(|state| {
            let mut seen = HashSet::new();
            let mut merged: Vec<Comment> = fetched
                .into_iter()
                .filter(|c| seen.insert(c.id.clone()))
                .collect();
            merged.extend(
                state
                    .comments
                    .iter()
                    .filter(|c| !seen.contains(&c.id))
                    .cloned(),
            );

            if merged == state.comments {
                return false;
            }
            state.comments = merged;
            true
        });
    }

    /// Append a pushed comment unless one with the same id is already present.
    pub(crate) fn append_comment(&self, comment: Comment) -> bool {
        self.state.send_if_modified(|state| {
            if state.comments.iter().any(|c| c.id == comment.id) {
                return false;
            }
            state.comments.push(comment);
            true
        })
    }

    pub(crate) fn set_comments_error(&self, failure: Option<LoadFailure>) {
        self.state.send_if_modified(|state| {
            if state.comments_error == failure {
                return false;
            }
            state.comments_error = failure;
            true
        });
    }

    pub(crate) fn set_connection(&self, connection: ConnectionStatus) {
        self.state.send_if_modified(|state| {
            if state.connection == connection {
                return false;
            }
            state.connection = connection;
            true
        });
    }
}
