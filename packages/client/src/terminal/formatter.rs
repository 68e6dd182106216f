//! Snapshot formatting for terminal display.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use huddle_shared::time::{elapsed_label, format_local};

use crate::{
    model::{Comment, MAX_STARS, Minutes, Participant, Session, User},
    store::{ConnectionStatus, LoadFailure, SessionSnapshot},
};

const RULE: &str = "============================================================\n";

/// Formatter for session state shown in the terminal
pub struct SnapshotFormatter;

impl SnapshotFormatter {
    /// Format the roster, marking the current speaker
    pub fn format_roster(roster: &[Participant], current: Option<&Participant>) -> String {
        let mut output = String::new();
        output.push('\n');
        output.push_str(RULE);
        output.push_str("Participants:\n");

        if roster.is_empty() {
            output.push_str("(No participants)\n");
        } else {
            for participant in roster {
                let speaking = current.is_some_and(|c| c.id == participant.id);
                let suffix = if speaking { " (speaking)" } else { "" };
                match participant.joined_at {
                    Some(joined_at) => output.push_str(&format!(
                        "{}{} - joined at {}\n",
                        participant.name,
                        suffix,
                        format_local(joined_at)
                    )),
                    None => output.push_str(&format!("{}{}\n", participant.name, suffix)),
                }
            }
        }

        output.push_str(RULE);
        output
    }

    /// Format the turn state
    pub fn format_speaker(current: Option<&Participant>) -> String {
        match current {
            Some(participant) => format!("\n>>> Now speaking: {}\n", participant.name),
            None => "\n... Waiting for the next participant\n".to_string(),
        }
    }

    /// Render a rating as filled and empty stars
    pub fn format_stars(stars: u8) -> String {
        let filled = stars.min(MAX_STARS) as usize;
        format!(
            "{}{} {}/{}",
            "*".repeat(filled),
            ".".repeat(MAX_STARS as usize - filled),
            stars,
            MAX_STARS
        )
    }

    /// Format a single comment
    pub fn format_comment(comment: &Comment) -> String {
        let author = comment.author.as_deref().unwrap_or("anonymous");
        format!(
            "\n[{}] {} ({}, {})\n",
            Self::format_stars(comment.stars),
            comment.content,
            author,
            format_local(comment.created_at)
        )
    }

    /// Format the connection status line
    pub fn format_connection(status: ConnectionStatus) -> String {
        let label = match status {
            ConnectionStatus::Idle => "Not connected".to_string(),
            ConnectionStatus::Connecting => "Connecting...".to_string(),
            ConnectionStatus::Connected => "Connected".to_string(),
            ConnectionStatus::Reconnecting { attempt } => {
                format!("Connection lost, reconnecting (attempt {})...", attempt)
            }
            ConnectionStatus::Disconnected => {
                "Disconnected. Type /reconnect to try again.".to_string()
            }
        };
        format!("\n[connection] {}\n", label)
    }

    /// Format a failed comment fetch with what the user can do about it
    pub fn format_load_failure(failure: &LoadFailure, login_url: &str) -> String {
        match failure {
            LoadFailure::LoginRequired => {
                format!("\n[comments] Your login expired. Log in again at {}\n", login_url)
            }
            LoadFailure::Failed(message) => format!(
                "\n[comments] Failed to load comments: {}. Type /refresh to retry.\n",
                message
            ),
        }
    }

    /// Format the minutes document
    pub fn format_minutes(minutes: &Minutes) -> String {
        let mut output = String::new();
        output.push('\n');
        output.push_str(RULE);
        output.push_str("Minutes:\n");
        if minutes.content.trim().is_empty() {
            output.push_str("(No minutes yet)\n");
        } else {
            output.push_str(minutes.content.trim_end());
            output.push('\n');
        }
        output.push_str(RULE);
        output
    }

    /// Format the session list
    pub fn format_sessions(sessions: &[Session], now: DateTime<Utc>) -> String {
        if sessions.is_empty() {
            return "(No sessions)\n".to_string();
        }

        let mut output = String::new();
        for session in sessions {
            match session.created_at {
                Some(created_at) => output.push_str(&format!(
                    "{}\t{}\t(created {})\n",
                    session.id,
                    session.name,
                    elapsed_label(created_at, now)
                )),
                None => output.push_str(&format!("{}\t{}\n", session.id, session.name)),
            }
        }
        output
    }

    /// Format the logged-in identity
    pub fn format_user(user: Option<&User>) -> String {
        match user {
            Some(user) if user.is_admin => format!("Logged in as {} (admin)\n", user.name),
            Some(user) => format!("Logged in as {}\n", user.name),
            None => "Not logged in\n".to_string(),
        }
    }

    /// Render everything that differs between two snapshots
    pub fn render_changes(
        previous: &SessionSnapshot,
        next: &SessionSnapshot,
        login_url: &str,
    ) -> String {
        let mut output = String::new();

        if previous.connection != next.connection {
            output.push_str(&Self::format_connection(next.connection));
        }
        if previous.roster != next.roster {
            output.push_str(&Self::format_roster(
                &next.roster,
                next.current_participant.as_ref(),
            ));
        }
        if previous.current_participant != next.current_participant && !next.meeting_ended {
            output.push_str(&Self::format_speaker(next.current_participant.as_ref()));
        }

        let known: HashSet<&str> = previous.comments.iter().map(|c| c.id.as_str()).collect();
        for comment in next.comments.iter().filter(|c| !known.contains(c.id.as_str())) {
            output.push_str(&Self::format_comment(comment));
        }

        if previous.comments_error != next.comments_error
            && let Some(failure) = &next.comments_error
        {
            output.push_str(&Self::format_load_failure(failure, login_url));
        }

        if next.meeting_ended && !previous.meeting_ended {
            output.push_str("\n*** The meeting has ended ***\n");
        }

        output
    }
}
