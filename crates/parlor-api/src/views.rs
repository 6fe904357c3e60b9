// Askama page definitions

use anyhow::anyhow;
use askama::Template;
use axum::{
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};

use parlor_types::models::{Message, User};

use crate::error::AppError;

pub fn render<T: Template>(page: T) -> Result<Html<String>, AppError> {
    let html = page
        .render()
        .map_err(|e| anyhow!("Template error: {}", e))?;
    Ok(Html(html))
}

/// `302 Found` to `location`.
pub fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// One message as shown in the feed.
pub struct FeedItem {
    pub id: String,
    pub text: String,
    /// Already HTML-escaped at sign-up, emitted verbatim.
    pub author: String,
    pub posted_at: String,
}

impl From<Message> for FeedItem {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.to_string(),
            text: message.text,
            author: message
                .author
                .map(|a| a.username)
                .unwrap_or_else(|| "Anonymous".to_string()),
            posted_at: message.created_at.format("%-d %b %Y, %H:%M").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexPage {
    pub user: Option<User>,
    pub is_member: bool,
    pub messages: Vec<FeedItem>,
}

#[derive(Template)]
#[template(path = "log_in.html")]
pub struct LogInPage {
    pub user: Option<User>,
    pub flash: Option<String>,
}

#[derive(Template)]
#[template(path = "sign_up.html")]
pub struct SignUpPage {
    pub user: Option<User>,
    pub username: String,
    pub email: String,
    pub errors: Vec<FieldError>,
}

#[derive(Template)]
#[template(path = "join.html")]
pub struct JoinPage {
    pub user: Option<User>,
    pub question: String,
    pub answers: Vec<String>,
    pub wrong_answer: bool,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage {
    pub user: Option<User>,
    pub status: u16,
    pub reason: String,
    pub detail: Option<String>,
}
