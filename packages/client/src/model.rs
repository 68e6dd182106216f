//! Data model shared by the push channel, the REST collaborator and the state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lowest accepted star rating.
pub const MIN_STARS: u8 = 1;
/// Highest accepted star rating.
pub const MAX_STARS: u8 = 10;

/// Accept an identifier sent either as a JSON string or a JSON number.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

/// A person attending a session. Never mutated after it is received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "username")]
    pub name: String,
    #[serde(
        default,
        alias = "avatar_url",
        alias = "avatarUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar: Option<String>,
    #[serde(default, alias = "joinedAt", skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar: None,
            joined_at: None,
        }
    }
}

/// A star-rated remark posted during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Stable server-issued identifier, used to de-duplicate push and fetch
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub content: String,
    pub stars: u8,
    /// Injected by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A recurring status-update meeting, referenced by id only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// The authenticated identity behind the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "login")]
    pub name: String,
    #[serde(default, alias = "avatar_url", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Free-text minutes document of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minutes {
    #[serde(default)]
    pub content: String,
}
