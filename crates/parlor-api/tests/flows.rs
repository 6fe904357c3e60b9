//! End-to-end request flows against the full router, an in-memory database
//! and a scripted trivia supplier.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use tower::ServiceExt;

use parlor_api::state::{AppState, AppStateInner, Mode, Settings};
use parlor_api::trivia::{TriviaError, TriviaQuestion, TriviaSource};
use parlor_db::Database;
use parlor_types::models::Role;

// -- Harness --

/// Hands out questions in order, repeating the last one forever.
struct ScriptedTrivia {
    questions: Mutex<VecDeque<TriviaQuestion>>,
}

impl ScriptedTrivia {
    fn new(questions: Vec<TriviaQuestion>) -> Self {
        Self {
            questions: Mutex::new(questions.into()),
        }
    }
}

#[async_trait]
impl TriviaSource for ScriptedTrivia {
    async fn fetch_question(&self) -> Result<TriviaQuestion, TriviaError> {
        let mut questions = self.questions.lock().unwrap();
        if questions.len() > 1 {
            Ok(questions.pop_front().unwrap())
        } else {
            questions.front().cloned().ok_or(TriviaError::Empty)
        }
    }
}

struct FailingTrivia;

#[async_trait]
impl TriviaSource for FailingTrivia {
    async fn fetch_question(&self) -> Result<TriviaQuestion, TriviaError> {
        Err(TriviaError::ResponseCode(1))
    }
}

fn planets() -> TriviaQuestion {
    TriviaQuestion {
        question: "Which planet is the largest?".into(),
        correct_answer: "Jupiter".into(),
        incorrect_answers: vec!["Mars".into(), "Venus".into(), "Mercury".into()],
    }
}

fn gold() -> TriviaQuestion {
    TriviaQuestion {
        question: "What is the chemical symbol for gold?".into(),
        correct_answer: "Au".into(),
        incorrect_answers: vec!["Ag".into(), "Gd".into(), "Go".into()],
    }
}

struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        Self::with(ScriptedTrivia::new(vec![planets()]), Mode::Development)
    }

    fn with(trivia: impl TriviaSource + 'static, mode: Mode) -> Self {
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            trivia: Arc::new(trivia),
            settings: Settings {
                mode,
                ..Settings::default()
            },
        });
        Self {
            router: parlor_api::router(state.clone()),
            state,
        }
    }

    fn browser(&self) -> Browser<'_> {
        Browser {
            app: self,
            cookie: None,
        }
    }

    fn user_count(&self) -> i64 {
        self.state
            .db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
            .unwrap()
    }

    fn role_of(&self, username: &str) -> Role {
        let row = self.state.db.get_user_by_username(username).unwrap().unwrap();
        row.role.parse().unwrap()
    }
}

/// Keeps the session cookie between requests like a real browser would.
struct Browser<'a> {
    app: &'a TestApp,
    cookie: Option<String>,
}

impl Browser<'_> {
    async fn get(&mut self, uri: &str) -> Response {
        let request = Request::builder().method("GET").uri(uri);
        self.send(request, Body::empty()).await
    }

    async fn post(&mut self, uri: &str, form: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(request, Body::from(form.to_string())).await
    }

    async fn get_text(&mut self, uri: &str) -> String {
        let response = self.get(uri).await;
        body_text(response).await
    }

    async fn send(&mut self, mut request: axum::http::request::Builder, body: Body) -> Response {
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie.as_str());
        }
        let response = self
            .app
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        if let Some(cookie) = session_cookie(&response) {
            self.cookie = Some(cookie);
        }
        response
    }

    async fn sign_up(&mut self, username: &str) -> Response {
        let form = format!(
            "username={0}&email={0}%40x.com&password=secret1&confirm-password=secret1",
            username
        );
        self.post("/sign-up", &form).await
    }
}

fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("parlor.sid="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn assert_redirect(response: &Response, to: &str) {
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(response), to);
}

// -- Sign-up --

#[tokio::test]
async fn sign_up_creates_basic_user_and_session() {
    let app = TestApp::new();
    let mut alice = app.browser();

    let response = alice
        .post(
            "/sign-up",
            "username=alice&email=alice%40x.com&password=secret1&confirm-password=secret1",
        )
        .await;
    assert_redirect(&response, "/");
    assert_eq!(app.user_count(), 1);

    let row = app.state.db.get_user_by_username("alice").unwrap().unwrap();
    assert_eq!(row.role, "basic");
    assert_eq!(row.email, "alice@x.com");
    assert_ne!(row.password, "secret1");

    let page = alice.get_text("/").await;
    assert!(page.contains("Signed in as alice"));
}

#[tokio::test]
async fn sign_up_rejects_taken_username_and_email() {
    let app = TestApp::new();
    app.browser().sign_up("alice").await;

    let mut imposter = app.browser();
    let response = imposter
        .post(
            "/sign-up",
            "username=alice&email=Alice%40X.com&password=secret1&confirm-password=secret1",
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let page = body_text(response).await;
    assert!(page.contains("Username already in use"));
    assert!(page.contains("Email already in use"));
    assert_eq!(app.user_count(), 1);
}

#[tokio::test]
async fn sign_up_reports_every_failure_and_keeps_input() {
    let app = TestApp::new();
    let response = app
        .browser()
        .post(
            "/sign-up",
            "username=+++&email=carol-at-nowhere&password=abc&confirm-password=abd",
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let page = body_text(response).await;
    assert!(page.contains("Empty name"));
    assert!(page.contains("Invalid email"));
    assert!(page.contains("Minimum length 6 characters"));
    assert!(page.contains("Password confirmation does not match password"));
    assert!(page.contains("value=\"carol-at-nowhere\""));
    assert!(!page.contains("abc"));
    assert_eq!(app.user_count(), 0);
}

// -- Log-in / log-out --

#[tokio::test]
async fn log_in_establishes_identity() {
    let app = TestApp::new();
    app.browser().sign_up("alice").await;

    let mut browser = app.browser();
    let response = browser.post("/log-in", "username=alice&password=secret1").await;
    assert_redirect(&response, "/");
    assert!(browser.get_text("/").await.contains("Signed in as alice"));

    let response = browser.get("/log-out").await;
    assert_redirect(&response, "/");
    assert!(!browser.get_text("/").await.contains("Signed in as"));
}

#[tokio::test]
async fn wrong_password_redirects_with_reason() {
    let app = TestApp::new();
    app.browser().sign_up("alice").await;

    let mut browser = app.browser();
    let response = browser.post("/log-in", "username=alice&password=wrong!").await;
    assert_redirect(&response, "/log-in");

    let page = browser.get_text("/log-in").await;
    assert!(page.contains("Incorrect password"));
    // shown once
    assert!(!browser.get_text("/log-in").await.contains("Incorrect password"));
    assert!(!browser.get_text("/").await.contains("Signed in as"));
}

#[tokio::test]
async fn unknown_username_redirects_with_reason() {
    let app = TestApp::new();
    let mut browser = app.browser();

    let response = browser.post("/log-in", "username=nobody&password=secret1").await;
    assert_redirect(&response, "/log-in");
    assert!(browser.get_text("/log-in").await.contains("Incorrect username"));
}

#[tokio::test]
async fn session_of_deleted_user_becomes_anonymous() {
    let app = TestApp::new();
    let mut alice = app.browser();
    alice.sign_up("alice").await;

    app.state
        .db
        .with_conn(|c| Ok(c.execute("DELETE FROM users", [])?))
        .unwrap();

    let response = alice.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!body_text(response).await.contains("Signed in as"));
}

// -- Messages --

#[tokio::test]
async fn post_keeps_author_snapshot_from_post_time() {
    let app = TestApp::new();
    let mut alice = app.browser();
    alice.sign_up("alice").await;

    let response = alice.post("/", "text=hello+world").await;
    assert_redirect(&response, "/");

    let user = app.state.db.get_user_by_username("alice").unwrap().unwrap();
    app.state.db.update_user_role(&user.id, "member").unwrap();

    let messages = app.state.db.get_messages().unwrap();
    assert_eq!(messages.len(), 1);
    let message = messages.into_iter().next().unwrap().into_message();
    assert_eq!(message.text, "hello world");

    let author = message.author.unwrap();
    assert_eq!(author.username, "alice");
    assert_eq!(author.id.to_string(), user.id);
    assert_eq!(author.role, Role::Basic);

    // now a member, alice sees authors on the feed
    let page = alice.get_text("/").await;
    assert!(page.contains("hello world"));
    assert!(page.contains("alice &middot;"));
}

#[tokio::test]
async fn anonymous_post_has_no_author() {
    let app = TestApp::new();
    let response = app.browser().post("/", "text=boo").await;
    assert_redirect(&response, "/");

    let message = app.state.db.get_messages().unwrap().remove(0).into_message();
    assert!(message.author.is_none());
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let app = TestApp::new();
    let response = app.browser().post("/", "text=+++").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let page = body_text(response).await;
    assert!(page.contains("400 Bad Request"));
    assert!(page.contains("Message text must not be empty"));
    assert_eq!(app.state.db.count_messages().unwrap(), 0);
}

#[tokio::test]
async fn feed_lists_newest_first() {
    let app = TestApp::new();
    let mut browser = app.browser();
    browser.post("/", "text=first").await;
    browser.post("/", "text=second").await;

    let page = browser.get_text("/").await;
    let first = page.find("first").unwrap();
    let second = page.find("second").unwrap();
    assert!(second < first);
}

#[tokio::test]
async fn empty_feed_is_not_an_error() {
    let app = TestApp::new();
    let response = app.browser().get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("No messages yet."));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let app = TestApp::new();
    let mut browser = app.browser();
    browser.post("/", "text=doomed").await;
    browser.post("/", "text=kept").await;

    let doomed = app
        .state
        .db
        .get_messages()
        .unwrap()
        .into_iter()
        .find(|m| m.text == "doomed")
        .unwrap()
        .id;

    let uri = format!("/{}/delete", doomed);
    assert_redirect(&browser.get(&uri).await, "/");
    assert_eq!(app.state.db.count_messages().unwrap(), 1);

    assert_redirect(&browser.get(&uri).await, "/");
    assert_eq!(app.state.db.count_messages().unwrap(), 1);
}

#[tokio::test]
async fn deleting_unknown_id_redirects_home() {
    let app = TestApp::new();
    let mut browser = app.browser();
    browser.post("/", "text=stays").await;

    let response = browser.get("/nonexistent/delete").await;
    assert_redirect(&response, "/");
    assert_eq!(app.state.db.count_messages().unwrap(), 1);
}

// -- Join --

#[tokio::test]
async fn correct_answer_upgrades_role() {
    let app = TestApp::new();
    let mut alice = app.browser();
    alice.sign_up("alice").await;

    let response = alice.get("/join").await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("Which planet is the largest?"));
    for answer in ["Jupiter", "Mars", "Venus", "Mercury"] {
        assert!(page.contains(answer));
    }

    let response = alice.post("/join", "riddle=jUPITER&role=member").await;
    assert_redirect(&response, "/");
    assert_eq!(app.role_of("alice"), Role::Member);
}

#[tokio::test]
async fn wrong_answer_sets_flag_and_keeps_role() {
    let app = TestApp::new();
    let mut alice = app.browser();
    alice.sign_up("alice").await;

    assert!(!alice.get_text("/join").await.contains("Wrong answer"));
    let response = alice.post("/join", "riddle=Mars&role=member").await;
    assert_redirect(&response, "/join");
    assert_eq!(app.role_of("alice"), Role::Basic);

    assert!(alice.get_text("/join").await.contains("Wrong answer"));

    // a right answer afterwards clears the flag
    alice.post("/join", "riddle=Jupiter&role=member").await;
    assert!(!alice.get_text("/join").await.contains("Wrong answer"));
}

#[tokio::test]
async fn question_is_consumed_by_one_attempt() {
    let app = TestApp::new();
    let mut alice = app.browser();
    alice.sign_up("alice").await;

    alice.get("/join").await;
    alice.post("/join", "riddle=Mars&role=member").await;

    let response = alice.post("/join", "riddle=Jupiter&role=member").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.role_of("alice"), Role::Basic);
}

#[tokio::test]
async fn answer_without_issued_question_is_rejected() {
    let app = TestApp::new();
    let mut alice = app.browser();
    alice.sign_up("alice").await;

    let response = alice.post("/join", "riddle=Jupiter&role=member").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("No trivia question"));
}

#[tokio::test]
async fn unknown_role_is_rejected() {
    let app = TestApp::new();
    let mut alice = app.browser();
    alice.sign_up("alice").await;

    alice.get("/join").await;
    let response = alice.post("/join", "riddle=Jupiter&role=admin").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.role_of("alice"), Role::Basic);
}

#[tokio::test]
async fn anonymous_answer_goes_to_log_in() {
    let app = TestApp::new();
    let mut browser = app.browser();
    browser.get("/join").await;

    let response = browser.post("/join", "riddle=Jupiter&role=member").await;
    assert_redirect(&response, "/log-in");
}

#[tokio::test]
async fn quiz_state_is_per_session() {
    let app = TestApp::with(ScriptedTrivia::new(vec![planets(), gold()]), Mode::Development);
    let mut alice = app.browser();
    let mut bob = app.browser();
    alice.sign_up("alice").await;
    bob.sign_up("bob").await;

    assert!(alice.get_text("/join").await.contains("largest"));
    assert!(bob.get_text("/join").await.contains("gold"));

    assert_redirect(&alice.post("/join", "riddle=Jupiter&role=member").await, "/");
    assert_redirect(&bob.post("/join", "riddle=au&role=member").await, "/");
    assert_eq!(app.role_of("alice"), Role::Member);
    assert_eq!(app.role_of("bob"), Role::Member);
}

#[tokio::test]
async fn trivia_outage_renders_bad_gateway() {
    let app = TestApp::with(FailingTrivia, Mode::Development);
    let response = app.browser().get("/join").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(body_text(response).await.contains("502 Bad Gateway"));
}

// -- Errors --

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::new();
    let response = app.browser().get("/no/such/page").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("404 Not Found"));
}

#[tokio::test]
async fn production_hides_error_detail() {
    let app = TestApp::with(ScriptedTrivia::new(vec![planets()]), Mode::Production);
    let response = app.browser().post("/", "text=").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let page = body_text(response).await;
    assert!(page.contains("400 Bad Request"));
    assert!(!page.contains("Message text must not be empty"));
}

#[tokio::test]
async fn wrong_method_renders_not_found_page() {
    let app = TestApp::new();
    let mut browser = app.browser();

    for (method, uri) in [("PUT", "/"), ("DELETE", "/log-in")] {
        let request = Request::builder().method(method).uri(uri);
        let response = browser.send(request, Body::empty()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("404 Not Found"));
    }
}

#[tokio::test]
async fn unreadable_form_renders_error_page() {
    let app = TestApp::new();
    let mut browser = app.browser();

    let request = Request::builder().method("POST").uri("/");
    let response = browser.send(request, Body::from("text=hi")).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let page = body_text(response).await;
    assert!(page.contains("415 Unsupported Media Type"));
    assert!(page.contains("<html"));
    assert_eq!(app.state.db.count_messages().unwrap(), 0);
}

#[tokio::test]
async fn error_page_keeps_signed_in_nav() {
    let app = TestApp::new();
    let mut alice = app.browser();
    alice.sign_up("alice").await;

    let page = alice.get_text("/no/such/page").await;
    assert!(page.contains("404 Not Found"));
    assert!(page.contains("Signed in as alice"));
    assert!(!page.contains("href=\"/sign-up\""));
}

// -- Session rotation --

#[tokio::test]
async fn log_in_issues_a_fresh_session_id() {
    let app = TestApp::new();
    app.browser().sign_up("alice").await;

    let mut browser = app.browser();
    browser.get("/log-in").await;
    let before = browser.cookie.clone().unwrap();

    let response = browser.post("/log-in", "username=alice&password=secret1").await;
    assert_redirect(&response, "/");
    let after = browser.cookie.clone().unwrap();
    assert_ne!(before, after);

    // the id handed out before log-in stays anonymous
    let mut fixated = app.browser();
    fixated.cookie = Some(before);
    let page = fixated.get_text("/").await;
    assert!(!page.contains("Signed in as"));
    assert!(browser.get_text("/").await.contains("Signed in as alice"));
}

#[tokio::test]
async fn sign_up_issues_a_fresh_session_id() {
    let app = TestApp::new();
    let mut alice = app.browser();
    alice.get("/sign-up").await;
    let before = alice.cookie.clone().unwrap();

    alice.sign_up("alice").await;
    assert_ne!(alice.cookie.clone().unwrap(), before);
    assert!(alice.get_text("/").await.contains("Signed in as alice"));
}
