/// Database row types — these map directly to SQLite rows.
/// Conversion into parlor-types models happens here so callers never see
/// raw column strings.
use anyhow::{Result, anyhow};
use tracing::warn;
use uuid::Uuid;

use parlor_types::models::{AuthorSnapshot, Message, User};

use crate::parse_timestamp;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: self.id.parse().map_err(|e| anyhow!("Corrupt user id '{}': {}", self.id, e))?,
            role: self.role.parse()?,
            created_at: parse_timestamp(&self.created_at)?,
            username: self.username,
            email: self.email,
            password_hash: self.password,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub text: String,
    pub author: Option<String>,
    pub created_at: String,
}

impl MessageRow {
    /// Corrupt columns degrade to defaults instead of failing the whole feed.
    pub fn into_message(self) -> Message {
        let author = self.author.as_deref().and_then(|raw| {
            serde_json::from_str::<AuthorSnapshot>(raw)
                .map_err(|e| warn!("Corrupt author on message '{}': {}", self.id, e))
                .ok()
        });

        Message {
            id: self.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt message id '{}': {}", self.id, e);
                Uuid::default()
            }),
            created_at: parse_timestamp(&self.created_at).unwrap_or_else(|e| {
                warn!("Corrupt created_at on message '{}': {}", self.id, e);
                chrono::DateTime::default()
            }),
            text: self.text,
            author,
        }
    }
}

pub struct SessionRow {
    pub id: String,
    pub user_id: Option<String>,
    pub trivia_question: Option<String>,
    pub trivia_answer: Option<String>,
    pub wrong_answer: bool,
    pub flash: Option<String>,
    pub created_at: String,
    pub expires_at: String,
}
