use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceExt;

use callbook::config::AppConfig;
use callbook::db;
use callbook::handlers;
use callbook::services::ai::{LlmError, LlmProvider, Message};
use callbook::services::turn::TurnEngine;
use callbook::state::AppState;

// ── Mock providers ──

/// Always fails with an upstream rejection, forcing rule-based fallback.
struct FailingLlm;

#[async_trait]
impl LlmProvider for FailingLlm {
    async fn chat(&self, _system: &str, _messages: &[Message]) -> Result<String, LlmError> {
        Err(LlmError::Upstream {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: "down for maintenance".to_string(),
        })
    }
}

/// Returns one canned structured turn, like a model that extracted several
/// slots from a single utterance.
struct CannedLlm(&'static str);

#[async_trait]
impl LlmProvider for CannedLlm {
    async fn chat(&self, _system: &str, _messages: &[Message]) -> Result<String, LlmError> {
        Ok(self.0.to_string())
    }
}

// ── Helpers ──

fn test_config(export_dir: &str) -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        public_url: "http://localhost:3000".to_string(),
        admin_token: "test-token".to_string(),
        llm_provider: "openai".to_string(),
        llm_api_key: "".to_string(),
        llm_base_url: "https://api.openai.com/v1/chat/completions".to_string(),
        llm_model: "gpt-4o-mini".to_string(),
        ollama_url: "http://localhost:11434".to_string(),
        twilio_account_sid: "".to_string(),
        twilio_auth_token: "".to_string(), // empty = skip signature validation
        export_dir: export_dir.to_string(),
    }
}

fn test_app(export_dir: &str, llm: Option<Box<dyn LlmProvider>>) -> (Router, Arc<AppState>) {
    let conn = db::init_db(":memory:").unwrap();
    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: test_config(export_dir),
        turns: TurnEngine::new(llm),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/voice/incoming", post(handlers::webhook::incoming_call))
        .route("/voice/gather", post(handlers::webhook::handle_gather))
        .route(
            "/api/admin/appointments",
            get(handlers::admin::get_appointments),
        )
        .with_state(Arc::clone(&state));

    (app, state)
}

fn form_encode(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| {
            let encoded = v
                .replace('%', "%25")
                .replace('&', "%26")
                .replace('=', "%3D")
                .replace('+', "%2B")
                .replace('#', "%23")
                .replace(' ', "+");
            format!("{k}={encoded}")
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn form_post(uri: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from(form_encode(pairs)))
        .unwrap()
}

fn incoming_request(call_sid: &str) -> Request<Body> {
    form_post(
        "/voice/incoming",
        &[
            ("From", "+15550001111"),
            ("To", "+15551234567"),
            ("CallSid", call_sid),
        ],
    )
}

fn gather_request(call_sid: &str, speech: &str) -> Request<Body> {
    form_post(
        "/voice/gather",
        &[
            ("CallSid", call_sid),
            ("SpeechResult", speech),
            ("From", "+15550001111"),
            ("To", "+15551234567"),
        ],
    )
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ── Tests ──

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path().to_str().unwrap(), None);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("ok"));
}

#[tokio::test]
async fn test_incoming_call_greets_and_gathers() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = test_app(dir.path().to_str().unwrap(), None);

    let response = app.oneshot(incoming_request("CA100")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.contains("<Gather input=\"speech\""));
    assert!(body.contains("name"));

    let db = state.db.lock().unwrap();
    let session = callbook::db::queries::get_call_session(&db, "CA100")
        .unwrap()
        .unwrap();
    assert_eq!(session.stage, callbook::models::Stage::AskName);
    assert_eq!(session.state, callbook::models::SlotState::default());
}

#[tokio::test]
async fn test_full_conversation_books_appointment() {
    let dir = tempfile::tempdir().unwrap();
    let export_dir = dir.path().to_str().unwrap().to_string();
    let (app, state) = test_app(&export_dir, None);

    let response = app
        .clone()
        .oneshot(incoming_request("CA200"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for (speech, expect) in [
        ("My name is Alex", "service"),
        ("haircut", "date and time"),
        ("Friday at 3pm", "phone"),
    ] {
        let response = app
            .clone()
            .oneshot(gather_request("CA200", speech))
            .await
            .unwrap();
        let body = body_string(response).await;
        assert!(body.contains("<Gather"), "expected another question: {body}");
        assert!(body.contains(expect), "expected {expect:?} in {body}");
    }

    let response = app
        .clone()
        .oneshot(gather_request("CA200", "555-1234"))
        .await
        .unwrap();
    let body = body_string(response).await;
    assert!(body.contains("<Hangup/>"));
    assert!(body.contains("recorded"));
    for field in ["Alex", "haircut", "Friday at 3pm", "555-1234"] {
        assert!(body.contains(field), "confirmation missing {field}: {body}");
    }

    // Appointment row persisted
    {
        let db = state.db.lock().unwrap();
        let appointments = callbook::db::queries::list_appointments(&db).unwrap();
        assert_eq!(appointments.len(), 1);
        assert_eq!(appointments[0].customer_name, "Alex");
        assert_eq!(appointments[0].service_type, "haircut");
        assert_eq!(appointments[0].phone_number, "555-1234");
    }

    // Spreadsheet row appended
    let sheet = std::fs::read_to_string(dir.path().join("appointments.csv")).unwrap();
    assert!(sheet.contains("Alex"));
    assert!(sheet.contains("haircut"));
}

#[tokio::test]
async fn test_empty_speech_reprompts_without_advancing() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = test_app(dir.path().to_str().unwrap(), None);

    app.clone().oneshot(incoming_request("CA300")).await.unwrap();

    let response = app.oneshot(gather_request("CA300", "")).await.unwrap();
    let body = body_string(response).await;
    assert!(body.contains("<Gather"));
    assert!(body.contains("name"));

    let db = state.db.lock().unwrap();
    let session = callbook::db::queries::get_call_session(&db, "CA300")
        .unwrap()
        .unwrap();
    assert_eq!(session.stage, callbook::models::Stage::AskName);
    assert!(session.state.name.is_none());
}

#[tokio::test]
async fn test_gather_for_unknown_session_hangs_up() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path().to_str().unwrap(), None);

    let response = app
        .oneshot(gather_request("CA_unknown", "hello"))
        .await
        .unwrap();
    let body = body_string(response).await;
    assert!(body.contains("Sorry"));
    assert!(body.contains("<Hangup/>"));
    assert!(!body.contains("<Gather"));
}

#[tokio::test]
async fn test_llm_failure_falls_back_to_rule_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = test_app(dir.path().to_str().unwrap(), Some(Box::new(FailingLlm)));

    app.clone().oneshot(incoming_request("CA400")).await.unwrap();

    let response = app
        .oneshot(gather_request("CA400", "this is Priya"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("Priya"));
    assert!(body.contains("service"));

    let db = state.db.lock().unwrap();
    let session = callbook::db::queries::get_call_session(&db, "CA400")
        .unwrap()
        .unwrap();
    assert_eq!(session.state.name.as_deref(), Some("Priya"));
    assert_eq!(session.stage, callbook::models::Stage::AskService);
}

#[tokio::test]
async fn test_generative_multi_slot_extraction_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let canned = r#"{"stage":"ask_phone","state":{"name":"Alex","service_type":"haircut","date_time":"Friday 3pm","phone":null,"confirmed":false},"reply":"Great, Alex. What's your phone number?"}"#;
    let (app, state) = test_app(dir.path().to_str().unwrap(), Some(Box::new(CannedLlm(canned))));

    app.clone().oneshot(incoming_request("CA500")).await.unwrap();

    let response = app
        .oneshot(gather_request(
            "CA500",
            "Hi, Alex here, I need a haircut Friday at 3pm",
        ))
        .await
        .unwrap();
    let body = body_string(response).await;
    assert!(body.contains("phone number"));

    let db = state.db.lock().unwrap();
    let session = callbook::db::queries::get_call_session(&db, "CA500")
        .unwrap()
        .unwrap();
    assert_eq!(session.stage, callbook::models::Stage::AskPhone);
    assert_eq!(session.state.service_type.as_deref(), Some("haircut"));
    assert_eq!(session.state.date_time.as_deref(), Some("Friday 3pm"));
}

#[tokio::test]
async fn test_admin_appointments_requires_token() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path().to_str().unwrap(), None);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/appointments")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/appointments")
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "[]");
}

#[tokio::test]
async fn test_signature_required_when_token_configured() {
    let dir = tempfile::tempdir().unwrap();
    let conn = db::init_db(":memory:").unwrap();
    let mut config = test_config(dir.path().to_str().unwrap());
    config.twilio_auth_token = "secret".to_string();
    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
        turns: TurnEngine::rules_only(),
    });
    let app = Router::new()
        .route("/voice/incoming", post(handlers::webhook::incoming_call))
        .with_state(state);

    let response = app.oneshot(incoming_request("CA600")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
