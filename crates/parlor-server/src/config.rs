use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use chrono::TimeDelta;

use parlor_api::state::{Mode, Settings};
use parlor_api::trivia;

/// Ten years.
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;
const MAX_TRIVIA_TIMEOUT_SECS: u64 = 300;

/// Process configuration, read from `PARLOR_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub mode: Mode,
    pub trivia_url: String,
    pub trivia_timeout: Duration,
    pub session_ttl_hours: i64,
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let trivia_timeout_secs: u64 = parse(&lookup, "PARLOR_TRIVIA_TIMEOUT_SECS", 10)?;
        ensure!(
            (1..=MAX_TRIVIA_TIMEOUT_SECS).contains(&trivia_timeout_secs),
            "invalid PARLOR_TRIVIA_TIMEOUT_SECS='{}': must be between 1 and {}",
            trivia_timeout_secs,
            MAX_TRIVIA_TIMEOUT_SECS
        );

        let session_ttl_hours: i64 = parse(&lookup, "PARLOR_SESSION_TTL_HOURS", 168)?;
        ensure!(
            (1..=MAX_SESSION_TTL_HOURS).contains(&session_ttl_hours),
            "invalid PARLOR_SESSION_TTL_HOURS='{}': must be between 1 and {}",
            session_ttl_hours,
            MAX_SESSION_TTL_HOURS
        );

        Ok(Self {
            host: get("PARLOR_HOST", "0.0.0.0"),
            port: parse(&lookup, "PARLOR_PORT", 3000)?,
            db_path: get("PARLOR_DB_PATH", "parlor.db").into(),
            mode: parse(&lookup, "PARLOR_ENV", Mode::Development)?,
            trivia_url: get("PARLOR_TRIVIA_URL", trivia::DEFAULT_URL),
            trivia_timeout: Duration::from_secs(trivia_timeout_secs),
            session_ttl_hours,
            secure_cookies: parse(&lookup, "PARLOR_SECURE_COOKIES", false)?,
        })
    }

    pub fn settings(&self) -> Result<Settings> {
        let session_ttl = TimeDelta::try_hours(self.session_ttl_hours)
            .with_context(|| format!("session TTL of {} hours is out of range", self.session_ttl_hours))?;
        Ok(Settings {
            mode: self.mode,
            session_ttl,
            secure_cookies: self.secure_cookies,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid {}='{}'", key, raw)),
        None => Ok(default),
    }
}
