use axum::{
    extract::{FromRequest, Request, State, rejection::FormRejection},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error, warn};

use parlor_types::models::User;

use crate::state::AppState;
use crate::trivia::TriviaError;
use crate::views::{self, ErrorPage};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Form(#[from] FormRejection),

    #[error(transparent)]
    Trivia(#[from] TriviaError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Form(rejection) => rejection.status(),
            Self::Trivia(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Attached to error responses so [`render_error_pages`] can turn them into
/// HTML with access to the configured mode.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub detail: String,
    /// Filled in by the session layer on the way out.
    pub user: Option<User>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            Self::Internal(e) => {
                error!("Request failed: {:#}", e);
                format!("{:#}", e)
            }
            Self::Trivia(e) => {
                warn!("Trivia supplier failed: {}", e);
                e.to_string()
            }
            other => {
                debug!("Request rejected: {}", other);
                other.to_string()
            }
        };

        let mut response = status.into_response();
        response.extensions_mut().insert(ErrorReport {
            status,
            detail,
            user: None,
        });
        response
    }
}

/// Terminal error handler: renders every [`ErrorReport`] as the error page.
/// The detail line is only shown in development mode.
pub async fn render_error_pages(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;

    let Some(report) = response.extensions_mut().remove::<ErrorReport>() else {
        return response;
    };

    let page = ErrorPage {
        user: report.user,
        status: report.status.as_u16(),
        reason: report
            .status
            .canonical_reason()
            .unwrap_or("Error")
            .to_string(),
        detail: state
            .settings
            .mode
            .is_development()
            .then_some(report.detail),
    };

    match views::render(page) {
        Ok(html) => (report.status, html).into_response(),
        Err(_) => (report.status, report.status.to_string()).into_response(),
    }
}

/// `axum::Form` whose rejections go through [`AppError`], so a malformed
/// body gets the error page instead of a plain-text reply.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Form), rejection(AppError))]
pub struct ParlorForm<T>(pub T);

pub async fn not_found() -> AppError {
    AppError::NotFound
}
