use axum::{
    Extension,
    extract::State,
    response::{Html, Response},
};
use tracing::{debug, info, warn};

use parlor_types::forms::JoinForm;
use parlor_types::models::Role;

use crate::error::{AppError, ParlorForm};
use crate::session::Session;
use crate::state::AppState;
use crate::trivia::TriviaQuestion;
use crate::views::{JoinPage, redirect, render};

/// Issue a fresh question to this session. Any earlier unanswered question
/// is replaced.
pub async fn join_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Html<String>, AppError> {
    let question = state.trivia.fetch_question().await?.decode_entities();
    let answers = question.presented_answers(&mut rand::rng());

    state.db.set_session_trivia(
        &session.id,
        Some((&question.question, &question.correct_answer)),
    )?;

    render(JoinPage {
        user: session.user,
        question: question.question,
        answers,
        wrong_answer: session.wrong_answer,
    })
}

/// One attempt per issued question: the pending question is consumed
/// whether or not the answer is right.
pub async fn join_submit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    ParlorForm(form): ParlorForm<JoinForm>,
) -> Result<Response, AppError> {
    let Some(user) = session.user else {
        return Ok(redirect("/log-in"));
    };

    let role: Role = form
        .role
        .parse()
        .map_err(|e| AppError::BadRequest(format!("{}", e)))?;

    let pending = session.pending.ok_or_else(|| {
        AppError::BadRequest("No trivia question has been issued to this session".into())
    })?;
    state.db.set_session_trivia(&session.id, None)?;

    if !TriviaQuestion::is_correct(&pending.answer, &form.riddle) {
        debug!("User {} answered the trivia gate wrong", user.id);
        state.db.set_session_wrong_answer(&session.id, true)?;
        return Ok(redirect("/join"));
    }

    if !state.db.update_user_role(&user.id.to_string(), role.as_str())? {
        warn!("User {} vanished before the role upgrade", user.id);
    }
    state.db.set_session_wrong_answer(&session.id, false)?;
    info!("User {} is now {}", user.id, role);

    Ok(redirect("/"))
}
