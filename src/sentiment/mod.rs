//! Sentiment scoring seam and the per-text score cache.

pub mod cache;
pub mod lexicon;
pub mod store;

pub use cache::{SentimentCache, SentimentEntry, REPETITION_THRESHOLD};
pub use lexicon::LexiconScorer;
pub use store::{MemoryScoreStore, ScoreStore};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SentimentError {
    #[error("sentiment scoring unavailable: {0}")]
    ScoringUnavailable(String),
}

/// Maps message text to a polarity score in `[-1, 1]`.
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<f64, SentimentError>;
}
