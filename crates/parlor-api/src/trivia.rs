//! Client for the Open Trivia DB and the question model the join gate uses.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_URL: &str = "https://opentdb.com/api.php";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriviaQuestion {
    pub question: String,
    pub correct_answer: String,
    pub incorrect_answers: Vec<String>,
}

impl TriviaQuestion {
    /// The service HTML-encodes its strings (`&quot;`, `&#039;`, ...).
    pub fn decode_entities(self) -> Self {
        let decode = |s: &str| html_escape::decode_html_entities(s).into_owned();
        Self {
            question: decode(&self.question),
            correct_answer: decode(&self.correct_answer),
            incorrect_answers: self.incorrect_answers.iter().map(|a| decode(a)).collect(),
        }
    }

    /// Answers in display order: the correct answer takes a random slot
    /// among the incorrect ones and the answer it displaced moves to the end.
    pub fn presented_answers<R: Rng>(&self, rng: &mut R) -> Vec<String> {
        let mut answers = self.incorrect_answers.clone();
        if answers.is_empty() {
            return vec![self.correct_answer.clone()];
        }

        let slot = rng.random_range(0..answers.len());
        let displaced = std::mem::replace(&mut answers[slot], self.correct_answer.clone());
        answers.push(displaced);
        answers
    }

    /// Case-insensitive comparison against the correct answer. Whitespace
    /// is significant; the radio buttons submit the answer verbatim.
    pub fn is_correct(correct: &str, submitted: &str) -> bool {
        submitted.to_lowercase() == correct.to_lowercase()
    }
}

#[derive(Debug, Error)]
pub enum TriviaError {
    #[error("trivia request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("trivia service answered with response code {0}")]
    ResponseCode(u8),

    #[error("trivia service returned no questions")]
    Empty,
}

/// Anything that can hand out one hard multiple-choice question.
#[async_trait]
pub trait TriviaSource: Send + Sync {
    async fn fetch_question(&self) -> Result<TriviaQuestion, TriviaError>;
}

/// Open Trivia DB over HTTPS. Every request is bounded by the client timeout.
pub struct OpenTdb {
    client: reqwest::Client,
    url: String,
}

impl OpenTdb {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TriviaSource for OpenTdb {
    async fn fetch_question(&self) -> Result<TriviaQuestion, TriviaError> {
        let body = self
            .client
            .get(&self.url)
            .query(&[("amount", "1"), ("difficulty", "hard"), ("type", "multiple")])
            .send()
            .await?
            .error_for_status()?
            .json::<OpenTdbResponse>()
            .await?;

        body.into_question()
    }
}

#[derive(Debug, Deserialize)]
struct OpenTdbResponse {
    response_code: u8,
    #[serde(default)]
    results: Vec<OpenTdbQuestion>,
}

#[derive(Debug, Deserialize)]
struct OpenTdbQuestion {
    question: String,
    correct_answer: String,
    #[serde(default)]
    incorrect_answers: Vec<String>,
}

impl OpenTdbResponse {
    fn into_question(self) -> Result<TriviaQuestion, TriviaError> {
        if self.response_code != 0 {
            return Err(TriviaError::ResponseCode(self.response_code));
        }

        let first = self.results.into_iter().next().ok_or(TriviaError::Empty)?;
        Ok(TriviaQuestion {
            question: first.question,
            correct_answer: first.correct_answer,
            incorrect_answers: first.incorrect_answers,
        })
    }
}
