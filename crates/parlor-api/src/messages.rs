use axum::{
    Extension,
    extract::{Path, State},
    response::{Html, Response},
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use parlor_db::format_timestamp;
use parlor_types::forms::PostMessageForm;

use crate::error::{AppError, ParlorForm};
use crate::session::Session;
use crate::state::AppState;
use crate::views::{FeedItem, IndexPage, redirect, render};

pub async fn feed(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Html<String>, AppError> {
    let messages = state
        .db
        .get_messages()?
        .into_iter()
        .map(|row| FeedItem::from(row.into_message()))
        .collect();

    let is_member = session.user.as_ref().is_some_and(|u| u.role.is_member());
    render(IndexPage {
        user: session.user,
        is_member,
        messages,
    })
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    ParlorForm(form): ParlorForm<PostMessageForm>,
) -> Result<Response, AppError> {
    if form.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text must not be empty".into()));
    }

    // Snapshot, not a reference: later profile changes don't rewrite history.
    let author = session
        .user
        .as_ref()
        .map(|user| serde_json::to_string(&user.snapshot()))
        .transpose()
        .map_err(anyhow::Error::from)?;

    let message_id = Uuid::new_v4();
    state.db.insert_message(
        &message_id.to_string(),
        &form.text,
        author.as_deref(),
        &format_timestamp(Utc::now()),
    )?;

    Ok(redirect("/"))
}

/// Idempotent: a missing id still redirects home.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    if state.db.delete_message(&id)? {
        info!("Deleted message {}", id);
    }
    Ok(redirect("/"))
}
