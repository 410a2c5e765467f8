use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;

/// Durable text → score mapping backing the sentiment cache across restarts.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn get(&self, text: &str) -> Result<Option<f64>>;
    async fn put(&self, text: &str, score: f64) -> Result<()>;
}

/// Process-local store, mostly useful in tests.
#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    scores: Mutex<HashMap<String, f64>>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn get(&self, text: &str) -> Result<Option<f64>> {
        let scores = self.scores.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(scores.get(text).copied())
    }

    async fn put(&self, text: &str, score: f64) -> Result<()> {
        let mut scores = self.scores.lock().unwrap_or_else(PoisonError::into_inner);
        scores.insert(text.to_owned(), score);
        Ok(())
    }
}
