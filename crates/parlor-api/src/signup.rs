use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::ValidateEmail;

use parlor_db::{Database, NewUserOutcome, format_timestamp};
use parlor_types::forms::SignUpForm;
use parlor_types::models::Role;

use crate::error::{AppError, ParlorForm};
use crate::password::hash_password;
use crate::session::{Session, sign_in};
use crate::state::AppState;
use crate::views::{FieldError, SignUpPage, render};

const MIN_PASSWORD_CHARS: usize = 6;

/// Fields that passed validation, already sanitized for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSignUp {
    pub username: String,
    pub email: String,
}

/// Trim and HTML-escape a username. Both sign-up and log-in go through
/// this so lookups match what was stored.
pub fn sanitize_username(raw: &str) -> String {
    html_escape::encode_safe(raw.trim()).into_owned()
}

const OUTLOOK_DOMAINS: &[&str] = &[
    "hotmail.at", "hotmail.be", "hotmail.ca", "hotmail.cl", "hotmail.co.il", "hotmail.co.nz",
    "hotmail.co.th", "hotmail.co.uk", "hotmail.com", "hotmail.com.ar", "hotmail.com.mx",
    "hotmail.de", "hotmail.es", "hotmail.fr", "hotmail.it", "hotmail.se", "live.co.uk",
    "live.com", "live.com.ar", "live.com.mx", "live.de", "live.fr", "live.it", "live.nl",
    "msn.com", "outlook.at", "outlook.com", "outlook.de", "outlook.es", "outlook.fr",
    "outlook.ie", "outlook.it", "passport.com",
];

const YAHOO_DOMAINS: &[&str] = &[
    "rocketmail.com", "yahoo.ca", "yahoo.co.uk", "yahoo.com", "yahoo.de", "yahoo.fr",
    "yahoo.in", "yahoo.it", "ymail.com",
];

const ICLOUD_DOMAINS: &[&str] = &["icloud.com", "me.com"];

const YANDEX_DOMAINS: &[&str] = &["yandex.ru", "yandex.ua", "yandex.kz", "yandex.com", "yandex.by", "ya.ru"];

/// Lower-case an address and fold provider aliases so one mailbox maps to
/// one account. Gmail ignores dots and `+tags`; Outlook and iCloud drop
/// `+tags`; Yahoo drops the last `-tag`; Yandex domains fold to yandex.ru.
pub fn normalize_email(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let Some((local, domain)) = lowered.rsplit_once('@') else {
        return lowered;
    };

    let before_plus = || local.split('+').next().unwrap_or_default();

    let (local, domain) = match domain {
        "gmail.com" | "googlemail.com" => (before_plus().replace('.', ""), "gmail.com"),
        d if OUTLOOK_DOMAINS.contains(&d) || ICLOUD_DOMAINS.contains(&d) => (before_plus().to_string(), d),
        d if YAHOO_DOMAINS.contains(&d) => match local.rsplit_once('-') {
            Some((head, _)) => (head.to_string(), d),
            None => (local.to_string(), d),
        },
        d if YANDEX_DOMAINS.contains(&d) => (local.to_string(), "yandex.ru"),
        d => (local.to_string(), d),
    };
    format!("{}@{}", local, domain)
}

/// Run every rule and collect all failures rather than stopping at the
/// first. Uniqueness is checked here only for a friendly message; the
/// store's constraints are what actually guarantee it.
pub fn check_fields(form: &SignUpForm) -> (ValidSignUp, Vec<FieldError>) {
    let mut errors = Vec::new();

    let username = sanitize_username(&form.username);
    if username.is_empty() {
        errors.push(FieldError::new("username", "Empty name"));
    }

    let email = normalize_email(&form.email);
    if !email.as_str().validate_email() {
        errors.push(FieldError::new("email", "Invalid email"));
    }

    if form.password.chars().count() < MIN_PASSWORD_CHARS {
        errors.push(FieldError::new("password", "Minimum length 6 characters"));
    }

    if form.confirm_password != form.password {
        errors.push(FieldError::new(
            "confirm-password",
            "Password confirmation does not match password",
        ));
    }

    (ValidSignUp { username, email }, errors)
}

pub fn validate_sign_up(
    db: &Database,
    form: &SignUpForm,
) -> anyhow::Result<Result<ValidSignUp, Vec<FieldError>>> {
    let (candidate, mut errors) = check_fields(form);

    if !has_error(&errors, "username") && db.get_user_by_username(&candidate.username)?.is_some() {
        errors.push(FieldError::new("username", "Username already in use"));
    }
    if !has_error(&errors, "email") && db.get_user_by_email(&candidate.email)?.is_some() {
        errors.push(FieldError::new("email", "Email already in use"));
    }

    // keep errors in form order
    let order = ["username", "email", "password", "confirm-password"];
    errors.sort_by_key(|e| order.iter().position(|f| *f == e.field));

    if errors.is_empty() {
        Ok(Ok(candidate))
    } else {
        Ok(Err(errors))
    }
}

fn has_error(errors: &[FieldError], field: &str) -> bool {
    errors.iter().any(|e| e.field == field)
}

pub async fn sign_up_page(Extension(session): Extension<Session>) -> Result<Html<String>, AppError> {
    render(SignUpPage {
        user: session.user,
        username: String::new(),
        email: String::new(),
        errors: Vec::new(),
    })
}

pub async fn sign_up(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    ParlorForm(form): ParlorForm<SignUpForm>,
) -> Result<Response, AppError> {
    let valid = match validate_sign_up(&state.db, &form)? {
        Ok(valid) => valid,
        Err(errors) => return rejected(session, &form, errors),
    };

    let password_hash = hash_password(form.password.clone()).await?;
    let user_id = Uuid::new_v4();

    let outcome = state.db.create_user(
        &user_id.to_string(),
        &valid.username,
        &valid.email,
        &password_hash,
        Role::default().as_str(),
        &format_timestamp(Utc::now()),
    )?;

    match outcome {
        NewUserOutcome::Created => {
            let response = sign_in(&state, &session, &user_id.to_string(), "/")?;
            info!("User {} signed up as '{}'", user_id, valid.username);
            Ok(response)
        }
        // Lost a race with a concurrent sign-up for the same name or address.
        NewUserOutcome::UsernameTaken => rejected(
            session,
            &form,
            vec![FieldError::new("username", "Username already in use")],
        ),
        NewUserOutcome::EmailTaken => rejected(
            session,
            &form,
            vec![FieldError::new("email", "Email already in use")],
        ),
    }
}

/// Re-render the form with the entered username and email. The password
/// is never echoed back.
fn rejected(session: Session, form: &SignUpForm, errors: Vec<FieldError>) -> Result<Response, AppError> {
    let page = render(SignUpPage {
        user: session.user,
        username: form.username.trim().to_string(),
        email: form.email.trim().to_string(),
        errors,
    })?;
    Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response())
}
