//! Form payloads posted by the HTML pages. Every field defaults to an empty
//! string so a missing field reaches validation instead of being rejected
//! by the extractor.

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PostMessageForm {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogInForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "confirm-password")]
    pub confirm_password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JoinForm {
    /// The chosen answer.
    pub riddle: String,
    /// Role to grant on a correct answer.
    pub role: String,
}
