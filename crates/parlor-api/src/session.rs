//! Cookie-backed server-side sessions.
//!
//! The cookie only carries an opaque id; identity, the pending trivia
//! question and the flash message live in the `sessions` table.

use anyhow::Context;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::{debug, warn};

use parlor_db::models::SessionRow;
use parlor_db::{Database, format_timestamp};
use parlor_types::models::User;

use crate::error::{AppError, ErrorReport};
use crate::state::{AppState, Settings};
use crate::views::redirect;

pub const SESSION_COOKIE: &str = "parlor.sid";

/// Per-request view of the caller's session, inserted into request
/// extensions by [`load_session`].
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// Re-fetched from the store on every request.
    pub user: Option<User>,
    pub pending: Option<PendingQuestion>,
    pub wrong_answer: bool,
}

/// The question most recently issued to this session by `GET /join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestion {
    pub question: String,
    pub answer: String,
}

pub async fn load_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let now = Utc::now();

    let existing = match jar.get(SESSION_COOKIE) {
        Some(cookie) => state.db.get_session(cookie.value(), &format_timestamp(now))?,
        None => None,
    };

    let (row, minted) = match existing {
        Some(row) => (row, false),
        None => (create_session(&state.db, &state.settings, now)?, true),
    };

    let session = resolve(&state.db, row)?;
    let session_id = session.id.clone();
    let user = session.user.clone();
    req.extensions_mut().insert(session);

    let mut response = next.run(req).await;

    if let Some(report) = response.extensions_mut().get_mut::<ErrorReport>() {
        report.user = user;
    }

    // A handler that changed identity rotates the id and asks for a new cookie.
    if let Some(Rotated(new_id)) = response.extensions_mut().remove::<Rotated>() {
        let jar = jar.add(session_cookie(new_id, &state.settings));
        return Ok((jar, response).into_response());
    }
    if minted {
        let jar = jar.add(session_cookie(session_id, &state.settings));
        return Ok((jar, response).into_response());
    }
    Ok(response)
}

/// Response extension carrying the id a session was moved to.
#[derive(Debug, Clone)]
struct Rotated(String);

/// Bind `user_id` to the caller under a freshly minted session id. The old
/// row is dropped so an id handed out before log-in never carries an
/// identity. Returns a redirect that also sets the new cookie.
pub fn sign_in(
    state: &AppState,
    session: &Session,
    user_id: &str,
    location: &str,
) -> anyhow::Result<Response> {
    let now = Utc::now();
    let row = create_session(&state.db, &state.settings, now)?;
    state.db.set_session_user(&row.id, Some(user_id))?;
    state.db.delete_session(&session.id)?;
    debug!("Session rotated for user {}", user_id);

    let mut response = redirect(location);
    response.extensions_mut().insert(Rotated(row.id));
    Ok(response)
}

fn create_session(db: &Database, settings: &Settings, now: DateTime<Utc>) -> anyhow::Result<SessionRow> {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let id = B64.encode(bytes);

    let created_at = format_timestamp(now);
    let expires = now
        .checked_add_signed(settings.session_ttl)
        .context("session expiry is out of range")?;
    let expires_at = format_timestamp(expires);
    db.create_session(&id, &created_at, &expires_at)?;
    debug!("Minted session expiring at {}", expires_at);

    Ok(SessionRow {
        id,
        user_id: None,
        trivia_question: None,
        trivia_answer: None,
        wrong_answer: false,
        flash: None,
        created_at,
        expires_at,
    })
}

/// Turn the stored identity back into a user. A dangling user id is
/// cleared and the session treated as anonymous.
fn resolve(db: &Database, row: SessionRow) -> anyhow::Result<Session> {
    let user = match row.user_id.as_deref() {
        Some(user_id) => match db.get_user_by_id(user_id)? {
            Some(user_row) => Some(user_row.into_user()?),
            None => {
                warn!("Session refers to missing user '{}', signing out", user_id);
                db.set_session_user(&row.id, None)?;
                None
            }
        },
        None => None,
    };

    let pending = match (row.trivia_question, row.trivia_answer) {
        (Some(question), Some(answer)) => Some(PendingQuestion { question, answer }),
        _ => None,
    };

    Ok(Session {
        id: row.id,
        user,
        pending,
        wrong_answer: row.wrong_answer,
    })
}

fn session_cookie(id: String, settings: &Settings) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure_cookies)
        .build()
}

/// Delete sessions whose expiry has passed. Returns how many were removed.
pub fn prune_expired_sessions(db: &Database) -> anyhow::Result<usize> {
    db.delete_expired_sessions(&format_timestamp(Utc::now()))
}
