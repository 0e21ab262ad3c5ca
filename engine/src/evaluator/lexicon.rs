//! Hedging lexicon
//!
//! Estimates how confident a rationale sounds by matching two configurable
//! phrase lists: hedging markers ("maybe", "i think", ...) and confident
//! phrases ("definitely", "for sure", ...). Phrases are matched
//! case-insensitively on word boundaries, so "might" does not match
//! "mighty" and "i think" tolerates any whitespace between its words.

use regex::Regex;
use sdk::MonitorError;

/// Confidence of a rationale with no markers at all
const BASELINE_CONFIDENCE: f64 = 0.7;
const HEDGE_PENALTY: f64 = 0.15;
const MAX_HEDGE_PENALTY: f64 = 0.6;
const CONFIDENT_BONUS: f64 = 0.1;
const MAX_CONFIDENT_BONUS: f64 = 0.3;

#[derive(Debug, Clone)]
struct Marker {
    phrase: String,
    pattern: Regex,
}

impl Marker {
    fn compile(phrase: &str) -> Result<Self, MonitorError> {
        let body = phrase
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");

        let pattern = Regex::new(&format!(r"(?i)\b{}\b", body)).map_err(|e| {
            MonitorError::Config(format!("Invalid lexicon marker '{}': {}", phrase, e))
        })?;

        Ok(Self {
            phrase: phrase.to_lowercase(),
            pattern,
        })
    }
}

/// Result of scanning one rationale
#[derive(Debug, Clone, PartialEq)]
pub struct TextAnalysis {
    /// Distinct hedging markers present, in lexicon order
    pub hedging_markers: Vec<String>,
    /// Total hedging occurrences
    pub hedge_count: usize,
    /// Distinct confident phrases present
    pub confident_count: usize,
    pub word_count: usize,
    /// Hedging occurrences per word (0 for empty text)
    pub hedging_density: f64,
    /// Estimated confidence in [0, 1]
    pub text_confidence: f64,
}

/// Compiled hedging and confident-phrase lexicons
#[derive(Debug, Clone)]
pub struct HedgingLexicon {
    hedging: Vec<Marker>,
    confident: Vec<Marker>,
}

impl HedgingLexicon {
    /// Compile both phrase lists
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if a marker is empty or does not compile.
    pub fn new(hedging: &[String], confident: &[String]) -> Result<Self, MonitorError> {
        let compile = |phrases: &[String]| -> Result<Vec<Marker>, MonitorError> {
            phrases
                .iter()
                .map(|p| {
                    if p.trim().is_empty() {
                        return Err(MonitorError::Config(
                            "Lexicon markers must not be empty".to_string(),
                        ));
                    }
                    Marker::compile(p)
                })
                .collect()
        };

        Ok(Self {
            hedging: compile(hedging)?,
            confident: compile(confident)?,
        })
    }

    /// Scan a rationale
    pub fn analyze(&self, text: &str) -> TextAnalysis {
        let word_count = text.split_whitespace().count();

        let mut hedging_markers = Vec::new();
        let mut hedge_count = 0;
        for marker in &self.hedging {
            let hits = marker.pattern.find_iter(text).count();
            if hits > 0 {
                hedging_markers.push(marker.phrase.clone());
                hedge_count += hits;
            }
        }

        let confident_count = self
            .confident
            .iter()
            .filter(|m| m.pattern.is_match(text))
            .count();

        let hedging_density = if word_count == 0 {
            0.0
        } else {
            hedge_count as f64 / word_count as f64
        };

        TextAnalysis {
            text_confidence: estimate_confidence(hedging_markers.len(), confident_count),
            hedging_markers,
            hedge_count,
            confident_count,
            word_count,
            hedging_density,
        }
    }
}

/// Confidence implied by the number of distinct hedging and confident phrases
pub fn estimate_confidence(hedging: usize, confident: usize) -> f64 {
    let penalty = (hedging as f64 * HEDGE_PENALTY).min(MAX_HEDGE_PENALTY);
    let bonus = (confident as f64 * CONFIDENT_BONUS).min(MAX_CONFIDENT_BONUS);

    (BASELINE_CONFIDENCE - penalty + bonus).clamp(0.0, 1.0)
}
