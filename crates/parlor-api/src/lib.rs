//! HTTP surface of the message board: route handlers, session middleware,
//! the trivia client and the HTML views.

pub mod auth;
pub mod error;
pub mod join;
pub mod messages;
pub mod password;
pub mod session;
pub mod signup;
pub mod state;
pub mod trivia;
pub mod views;

use axum::{Router, middleware, routing::get};

use crate::state::AppState;

/// Build the application router. Logging and other transport layers are
/// added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(messages::feed).post(messages::post_message))
        .route("/log-in", get(auth::log_in_page).post(auth::log_in))
        .route("/log-out", get(auth::log_out))
        .route("/sign-up", get(signup::sign_up_page).post(signup::sign_up))
        .route("/join", get(join::join_page).post(join::join_submit))
        .route("/{id}/delete", get(messages::delete_message))
        .fallback(error::not_found)
        .method_not_allowed_fallback(error::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), session::load_session))
        .layer(middleware::from_fn_with_state(state.clone(), error::render_error_pages))
        .with_state(state)
}
