//! AI transcription/sentiment client
//!
//! The analyzer dependency is modeled as a trait so the engine and tests
//! can swap implementations. The shipped [`SimulatedAiClient`] reproduces
//! the dependency's observed behavior: roughly one failure in four and one
//! to three seconds of latency per attempt.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;

/// AI client errors
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI service unavailable: {0}")]
    Unavailable(String),
}

/// Result of one successful AI analysis
#[derive(Debug, Clone)]
pub struct AiAnalysis {
    pub transcription: String,
    pub sentiment: String,
    pub confidence: f64,
}

/// Analyzer of a call's concatenated packet payload
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn analyze(&self, payload: &str) -> Result<AiAnalysis, AiError>;
}

const SENTIMENTS: [&str; 3] = ["positive", "negative", "neutral"];

/// Simulated AI analyzer matching the dependency's failure/latency profile
pub struct SimulatedAiClient {
    /// Probability that one attempt fails with a 503-style error
    failure_rate: f64,
}

impl SimulatedAiClient {
    pub fn new(failure_rate: f64) -> Self {
        Self { failure_rate }
    }
}

impl Default for SimulatedAiClient {
    fn default() -> Self {
        Self { failure_rate: 0.25 }
    }
}

#[async_trait]
impl AiClient for SimulatedAiClient {
    async fn analyze(&self, payload: &str) -> Result<AiAnalysis, AiError> {
        // Draw everything up front; the RNG handle must not be held across
        // an await point
        let (failed, latency_ms, sentiment, confidence) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_bool(self.failure_rate),
                rng.gen_range(1000..=3000u64),
                SENTIMENTS[rng.gen_range(0..SENTIMENTS.len())],
                rng.gen_range(0.7..0.95),
            )
        };

        if failed {
            tracing::warn!("AI service: simulated 503 failure");
            return Err(AiError::Unavailable("503 Service Unavailable".to_string()));
        }

        tokio::time::sleep(Duration::from_millis(latency_ms)).await;

        tracing::info!(
            latency_ms,
            sentiment,
            "AI service: analysis succeeded"
        );

        Ok(AiAnalysis {
            transcription: format!(
                "Transcription of {} characters of call audio",
                payload.len()
            ),
            sentiment: sentiment.to_string(),
            confidence,
        })
    }
}
