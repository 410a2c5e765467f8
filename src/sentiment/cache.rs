use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, warn};

use super::{ScoreStore, SentimentError, SentimentScorer};

/// Occurrences a text may reach before it counts as repetitive.
pub const REPETITION_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentEntry {
    pub score: f64,
    pub occurrences: u32,
}

/// Memoises scores per exact message text and counts repeats.
///
/// The external scorer is called at most once per distinct text for the
/// lifetime of the cache. Entries are never evicted.
pub struct SentimentCache {
    entries: HashMap<String, SentimentEntry>,
    scorer: Arc<dyn SentimentScorer>,
    store: Option<Arc<dyn ScoreStore>>,
    repetition_threshold: u32,
}

impl SentimentCache {
    pub fn new(scorer: Arc<dyn SentimentScorer>) -> Self {
        Self {
            entries: HashMap::new(),
            scorer,
            store: None,
            repetition_threshold: REPETITION_THRESHOLD,
        }
    }

    /// Backs the cache with durable storage consulted on a miss.
    pub fn with_store(mut self, store: Arc<dyn ScoreStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Returns the score for `text`, computing it on first sighting.
    ///
    /// A failed scorer call is propagated and nothing is cached, so the next
    /// sighting tries again. A scorer that panics counts as unavailable.
    pub async fn score(&mut self, text: &str) -> Result<f64, SentimentError> {
        if let Some(entry) = self.entries.get_mut(text) {
            entry.occurrences = entry.occurrences.saturating_add(1);
            return Ok(entry.score);
        }

        let score = match self.load_persisted(text).await {
            Some(score) => score,
            None => {
                let score = normalize(self.call_scorer(text).await?)?;
                self.persist(text, score).await;
                score
            }
        };

        self.entries.insert(
            text.to_owned(),
            SentimentEntry {
                score,
                occurrences: 1,
            },
        );
        Ok(score)
    }

    /// True once `text` has been seen more than the repetition threshold.
    pub fn is_repetitive(&self, text: &str) -> bool {
        self.occurrences(text) > self.repetition_threshold
    }

    pub fn occurrences(&self, text: &str) -> u32 {
        self.entries
            .get(text)
            .map(|entry| entry.occurrences)
            .unwrap_or(0)
    }

    pub fn entry(&self, text: &str) -> Option<SentimentEntry> {
        self.entries.get(text).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn call_scorer(&self, text: &str) -> Result<f64, SentimentError> {
        let scorer = Arc::clone(&self.scorer);
        let text = text.to_owned();
        let task = tokio::spawn(async move { scorer.score(&text).await });

        match task.await {
            Ok(result) => result,
            Err(err) => {
                error!("sentiment scorer task failed: {err}");
                Err(SentimentError::ScoringUnavailable(format!(
                    "scorer task failed: {err}"
                )))
            }
        }
    }

    async fn load_persisted(&self, text: &str) -> Option<f64> {
        let store = self.store.as_ref()?;
        match store.get(text).await {
            Ok(Some(score)) if score.is_finite() => {
                debug!("sentiment score restored from store");
                Some(score.clamp(-1.0, 1.0))
            }
            Ok(_) => None,
            Err(err) => {
                warn!("score store lookup failed: {err:#}");
                None
            }
        }
    }

    async fn persist(&self, text: &str, score: f64) {
        if let Some(store) = &self.store {
            if let Err(err) = store.put(text, score).await {
                warn!("score store write failed: {err:#}");
            }
        }
    }
}

fn normalize(score: f64) -> Result<f64, SentimentError> {
    if !score.is_finite() {
        return Err(SentimentError::ScoringUnavailable(format!(
            "scorer returned non-finite value {score}"
        )));
    }
    if !(-1.0..=1.0).contains(&score) {
        warn!("scorer returned {score} outside [-1, 1]; clamping");
    }
    Ok(score.clamp(-1.0, 1.0))
}
