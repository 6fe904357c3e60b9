use axum::{
    Extension,
    extract::State,
    response::{Html, Response},
};
use tracing::{debug, info};

use parlor_db::Database;
use parlor_types::forms::LogInForm;
use parlor_types::models::User;

use crate::error::{AppError, ParlorForm};
use crate::password::verify_password;
use crate::session::{Session, sign_in};
use crate::signup::sanitize_username;
use crate::state::AppState;
use crate::views::{LogInPage, redirect, render};

/// Why a log-in attempt was refused. Shown to the user as a flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    UnknownUsername,
    WrongPassword,
}

impl AuthFailure {
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownUsername => "Incorrect username",
            Self::WrongPassword => "Incorrect password",
        }
    }
}

/// Check a username/password pair against the credential store.
/// The outer error is a store or hashing failure; the inner one a refusal.
pub async fn authenticate(
    db: &Database,
    username: &str,
    password: &str,
) -> anyhow::Result<Result<User, AuthFailure>> {
    let Some(row) = db.get_user_by_username(username)? else {
        return Ok(Err(AuthFailure::UnknownUsername));
    };
    let user = row.into_user()?;

    if verify_password(password.to_string(), user.password_hash.clone()).await? {
        Ok(Ok(user))
    } else {
        Ok(Err(AuthFailure::WrongPassword))
    }
}

pub async fn log_in_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Html<String>, AppError> {
    let flash = state.db.take_session_flash(&session.id)?;
    render(LogInPage {
        user: session.user,
        flash,
    })
}

pub async fn log_in(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    ParlorForm(form): ParlorForm<LogInForm>,
) -> Result<Response, AppError> {
    // Stored usernames are escaped at sign-up, so look up the same form.
    let username = sanitize_username(&form.username);

    match authenticate(&state.db, &username, &form.password).await? {
        Ok(user) => {
            let response = sign_in(&state, &session, &user.id.to_string(), "/")?;
            info!("User {} logged in", user.id);
            Ok(response)
        }
        Err(failure) => {
            debug!("Log-in refused for '{}': {}", username, failure.message());
            state
                .db
                .set_session_flash(&session.id, Some(failure.message()))?;
            Ok(redirect("/log-in"))
        }
    }
}

pub async fn log_out(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    state.db.reset_session(&session.id)?;
    if let Some(user) = session.user {
        info!("User {} logged out", user.id);
    }
    Ok(redirect("/"))
}
