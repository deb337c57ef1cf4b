//! Shared test helpers: in-memory app construction, deterministic AI
//! doubles, and JSON request plumbing.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt;

use vstream_common::events::EventBus;
use vstream_ingest::engine::CallEngine;
use vstream_ingest::services::{AiAnalysis, AiClient, AiError};
use vstream_ingest::AppState;

/// AI double that succeeds immediately with a fixed sentiment
pub struct InstantAi;

#[async_trait]
impl AiClient for InstantAi {
    async fn analyze(&self, payload: &str) -> Result<AiAnalysis, AiError> {
        Ok(AiAnalysis {
            transcription: format!("Transcription of {} characters of call audio", payload.len()),
            sentiment: "neutral".to_string(),
            confidence: 0.9,
        })
    }
}

/// AI double that always fails
pub struct FailingAi {
    pub attempts: AtomicU32,
}

impl FailingAi {
    pub fn new() -> Self {
        Self {
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AiClient for FailingAi {
    async fn analyze(&self, _payload: &str) -> Result<AiAnalysis, AiError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AiError::Unavailable("503 Service Unavailable".to_string()))
    }
}

/// AI double that fails a fixed number of times, then succeeds
pub struct FlakyAi {
    pub fail_first: u32,
    pub attempts: AtomicU32,
}

impl FlakyAi {
    pub fn new(fail_first: u32) -> Self {
        Self {
            fail_first,
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AiClient for FlakyAi {
    async fn analyze(&self, payload: &str) -> Result<AiAnalysis, AiError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            Err(AiError::Unavailable("503 Service Unavailable".to_string()))
        } else {
            Ok(AiAnalysis {
                transcription: format!(
                    "Transcription of {} characters of call audio",
                    payload.len()
                ),
                sentiment: "positive".to_string(),
                confidence: 0.85,
            })
        }
    }
}

/// AI double that parks until released, pinning the call in PROCESSING_AI
pub struct GatedAi {
    pub release: Arc<tokio::sync::Notify>,
}

impl GatedAi {
    pub fn new() -> (Self, Arc<tokio::sync::Notify>) {
        let release = Arc::new(tokio::sync::Notify::new());
        (
            Self {
                release: release.clone(),
            },
            release,
        )
    }
}

#[async_trait]
impl AiClient for GatedAi {
    async fn analyze(&self, payload: &str) -> Result<AiAnalysis, AiError> {
        self.release.notified().await;
        Ok(AiAnalysis {
            transcription: format!("Transcription of {} characters of call audio", payload.len()),
            sentiment: "neutral".to_string(),
            confidence: 0.9,
        })
    }
}

/// Build app state over an in-memory store with the given AI client
pub async fn test_state_with_ai(ai: Arc<dyn AiClient>) -> AppState {
    let db = vstream_common::db::connect("sqlite::memory:")
        .await
        .expect("in-memory store");
    let event_bus = EventBus::new(100);
    let engine = CallEngine::new(db.clone(), event_bus.clone(), ai);
    AppState::new(db, event_bus, engine)
}

/// Build app state with an instantly succeeding AI client
pub async fn test_state() -> AppState {
    test_state_with_ai(Arc::new(InstantAi)).await
}

/// POST a JSON body and return status plus parsed response body
pub async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// GET and return status plus parsed response body
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
