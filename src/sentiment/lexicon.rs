//! Small built-in chat lexicon scorer.
//!
//! Good enough to drive the trigger without an external analyzer. Word
//! valences are summed, negations flip the next scored word, and the sum is
//! squashed into (-1, 1) with the VADER compound normalisation.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{SentimentError, SentimentScorer};

const NORMALIZATION_ALPHA: f64 = 15.0;
const NEGATION_SCALAR: f64 = -0.74;
const EXCLAMATION_BOOST: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;

const POSITIVE: &[(&str, f64)] = &[
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("best", 3.2),
    ("clean", 1.7),
    ("clip", 1.2),
    ("clutch", 2.5),
    ("cool", 1.3),
    ("epic", 2.6),
    ("excellent", 2.7),
    ("fun", 2.3),
    ("gg", 1.9),
    ("good", 1.9),
    ("great", 3.1),
    ("haha", 1.8),
    ("hype", 2.4),
    ("incredible", 2.8),
    ("insane", 2.2),
    ("love", 3.2),
    ("lol", 1.8),
    ("lul", 1.6),
    ("kekw", 1.6),
    ("nice", 1.8),
    ("omg", 1.5),
    ("pog", 2.6),
    ("poggers", 2.8),
    ("pogchamp", 2.8),
    ("wow", 2.2),
    ("yes", 1.7),
];

const NEGATIVE: &[(&str, f64)] = &[
    ("awful", -2.8),
    ("bad", -2.5),
    ("boring", -2.0),
    ("cringe", -2.1),
    ("hate", -2.7),
    ("lag", -1.5),
    ("lame", -1.8),
    ("notlikethis", -1.9),
    ("residentsleeper", -1.7),
    ("sad", -2.1),
    ("terrible", -2.9),
    ("throw", -1.4),
    ("trash", -2.4),
    ("ugh", -1.8),
    ("worst", -3.1),
];

const NEGATIONS: &[&str] = &["not", "no", "never", "dont", "don't", "isnt", "isn't", "aint", "ain't"];

pub struct LexiconScorer {
    valences: HashMap<&'static str, f64>,
}

impl LexiconScorer {
    pub fn new() -> Self {
        let valences = POSITIVE.iter().chain(NEGATIVE.iter()).copied().collect();
        Self { valences }
    }

    pub fn polarity(&self, text: &str) -> f64 {
        let mut total = 0.0;
        let mut negate = false;

        for raw in text.split_whitespace() {
            let token: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'')
                .flat_map(char::to_lowercase)
                .collect();
            if token.is_empty() {
                continue;
            }

            if NEGATIONS.contains(&token.as_str()) {
                negate = true;
                continue;
            }

            if let Some(&valence) = self.valences.get(token.as_str()) {
                total += if negate { valence * NEGATION_SCALAR } else { valence };
                negate = false;
            }
        }

        if total != 0.0 {
            let bangs = text.matches('!').count().min(MAX_EXCLAMATIONS) as f64;
            total += bangs * EXCLAMATION_BOOST * total.signum();
        }

        normalize(total)
    }
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SentimentScorer for LexiconScorer {
    async fn score(&self, text: &str) -> Result<f64, SentimentError> {
        Ok(self.polarity(text))
    }
}

fn normalize(total: f64) -> f64 {
    let score = total / (total * total + NORMALIZATION_ALPHA).sqrt();
    score.clamp(-1.0, 1.0)
}
