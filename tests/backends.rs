//! Generation backends and embedding providers against local stub servers.

use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mindful_chat::config::{EmbeddingConfig, GenerationConfig};
use mindful_chat::embedding::{EmbeddingProvider, OllamaProvider};
use mindful_chat::error::GenerationError;
use mindful_chat::generation::{ChatCompletionsBackend, OllamaBackend, ResponseGenerator};
use mindful_chat::models::ModelRequest;

// ─── Stub server ────────────────────────────────────────────────────

/// Answers with scripted responses in order, repeating the last one.
#[derive(Clone, Default)]
struct Stub {
    replies: Arc<Mutex<VecDeque<(StatusCode, &'static str)>>>,
    calls: Arc<AtomicUsize>,
    last_auth: Arc<Mutex<Option<String>>>,
}

impl Stub {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn stub_handler(State(stub): State<Stub>, headers: HeaderMap) -> (StatusCode, String) {
    stub.calls.fetch_add(1, Ordering::SeqCst);
    *stub.last_auth.lock().unwrap() = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut replies = stub.replies.lock().unwrap();
    let (status, body) = if replies.len() > 1 {
        replies.pop_front().unwrap()
    } else {
        *replies.front().unwrap()
    };
    (status, body.to_string())
}

async fn spawn_stub(path: &str, replies: Vec<(StatusCode, &'static str)>) -> (String, Stub) {
    let stub = Stub {
        replies: Arc::new(Mutex::new(replies.into())),
        ..Stub::default()
    };
    let app = Router::new()
        .route(path, post(stub_handler))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), stub)
}

fn ollama_config(base: &str, max_retries: u32) -> GenerationConfig {
    GenerationConfig {
        provider: "ollama".to_string(),
        url: Some(base.to_string()),
        timeout_secs: 5,
        max_retries,
        ..GenerationConfig::default()
    }
}

async fn generate_with(config: &GenerationConfig) -> Result<String, GenerationError> {
    let backend = OllamaBackend::new(config).unwrap();
    let generator = ResponseGenerator::new(Arc::new(backend));
    generator
        .generate(&ModelRequest::single_turn("hello?"))
        .await
        .map(|reply| reply.text)
}

const OLLAMA_OK: &str = r#"{"message": {"role": "assistant", "content": "I'm here."}}"#;

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_error_is_retried() {
    let (base, stub) = spawn_stub(
        "/api/chat",
        vec![
            (StatusCode::SERVICE_UNAVAILABLE, "overloaded"),
            (StatusCode::OK, OLLAMA_OK),
        ],
    )
    .await;

    let text = generate_with(&ollama_config(&base, 1)).await.unwrap();
    assert_eq!(text, "I'm here.");
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn test_rate_limit_exhausts_retries() {
    let (base, stub) = spawn_stub(
        "/api/chat",
        vec![(StatusCode::TOO_MANY_REQUESTS, "slow down")],
    )
    .await;

    let err = generate_with(&ollama_config(&base, 1)).await.unwrap_err();
    match err {
        GenerationError::Status { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected a status error, got {:?}", other),
    }
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn test_client_error_fails_without_retry() {
    let (base, stub) = spawn_stub("/api/chat", vec![(StatusCode::BAD_REQUEST, "bad model")]).await;

    let err = generate_with(&ollama_config(&base, 3)).await.unwrap_err();
    assert!(matches!(err, GenerationError::Status { status: 400, .. }));
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn test_non_json_success_is_malformed() {
    let (base, stub) = spawn_stub("/api/chat", vec![(StatusCode::OK, "not json")]).await;

    let err = generate_with(&ollama_config(&base, 3)).await.unwrap_err();
    match err {
        GenerationError::Malformed(msg) => assert!(msg.contains("not json"), "{}", msg),
        other => panic!("expected a malformed reply, got {:?}", other),
    }
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = generate_with(&ollama_config(&base, 0)).await.unwrap_err();
    assert!(matches!(err, GenerationError::Transport(_)), "{:?}", err);
}

#[tokio::test]
async fn test_chat_completions_sends_bearer_key() {
    let (base, stub) = spawn_stub(
        "/chat/completions",
        vec![(
            StatusCode::OK,
            r#"{"model": "stub", "choices": [{"message": {"role": "assistant", "content": " Take a breath. "}, "finish_reason": "stop"}]}"#,
        )],
    )
    .await;
    std::env::set_var("MINDFUL_TEST_STUB_KEY", "sk-stub");
    let config = GenerationConfig {
        provider: "openai".to_string(),
        url: Some(base),
        api_key_env: Some("MINDFUL_TEST_STUB_KEY".to_string()),
        timeout_secs: 5,
        max_retries: 0,
        ..GenerationConfig::default()
    };

    let backend = ChatCompletionsBackend::new(&config).unwrap();
    let reply = ResponseGenerator::new(Arc::new(backend))
        .generate(&ModelRequest::single_turn("hi"))
        .await
        .unwrap();
    assert_eq!(reply.text, "Take a breath.");
    assert_eq!(stub.last_auth.lock().unwrap().as_deref(), Some("Bearer sk-stub"));
}

#[tokio::test]
async fn test_embedding_provider_shares_retry_policy() {
    let (base, stub) = spawn_stub(
        "/api/embed",
        vec![
            (StatusCode::INTERNAL_SERVER_ERROR, "warming up"),
            (StatusCode::OK, r#"{"embeddings": [[0.5, 0.25]]}"#),
        ],
    )
    .await;
    let config = EmbeddingConfig {
        provider: "ollama".to_string(),
        model: Some("nomic-embed-text".to_string()),
        dims: Some(2),
        url: Some(base),
        max_retries: 1,
        timeout_secs: 5,
        ..EmbeddingConfig::default()
    };

    let provider = OllamaProvider::new(&config).unwrap();
    let vectors = provider.embed(&["calm".to_string()]).await.unwrap();
    assert_eq!(vectors, vec![vec![0.5, 0.25]]);
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn test_embedding_client_error_is_not_retried() {
    let (base, stub) = spawn_stub("/api/embed", vec![(StatusCode::NOT_FOUND, "no such model")]).await;
    let config = EmbeddingConfig {
        provider: "ollama".to_string(),
        model: Some("missing".to_string()),
        dims: Some(2),
        url: Some(base),
        max_retries: 3,
        timeout_secs: 5,
        ..EmbeddingConfig::default()
    };

    let provider = OllamaProvider::new(&config).unwrap();
    let err = provider.embed(&["calm".to_string()]).await.unwrap_err();
    assert!(err.to_string().contains("no such model"), "{}", err);
    assert_eq!(stub.calls(), 1);
}
