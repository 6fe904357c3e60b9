use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parlor_db::Database;

use crate::trivia::TriviaSource;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub trivia: Arc<dyn TriviaSource>,
    pub settings: Settings,
}

/// Runtime knobs that handlers and middleware consult.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: Mode,
    pub session_ttl: chrono::Duration,
    pub secure_cookies: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Development,
            session_ttl: chrono::Duration::days(7),
            secure_cookies: false,
        }
    }
}

/// Development mode exposes error details on the error page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(anyhow::anyhow!("unknown mode '{}'", other)),
        }
    }
}
