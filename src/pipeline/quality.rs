//! Confidence scoring and the final accept/review partition.
//!
//! Scores start at 0.6 and move by fixed deltas per named signal. Hard
//! rejects pin the score near 0.05. Nothing downstream mutates the
//! accept/review split.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::PipelineConfig;
use crate::pipeline::types::{CandidateEntry, QualityDecision, QualityReport};
use crate::taxonomy;

const BASE_CONFIDENCE: f32 = 0.6;
const REJECT_CONFIDENCE: f32 = 0.05;
const MAX_CONFIDENCE: f32 = 0.99;

const MAX_TERM_CHARS: usize = 80;
const MAX_TERM_WORDS: usize = 10;
const MAX_MEANING_CHARS: usize = 300;
const LONG_MEANING_CHARS: usize = 200;

static HEADER_TERM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(page|chapter|unit|section|figure|table|contents|index|exercise)\b")
        .expect("valid regex")
});

/// Partition entries into accepted and review, stamping each with its score.
pub fn apply(
    cfg: &PipelineConfig,
    entries: Vec<CandidateEntry>,
) -> (Vec<CandidateEntry>, Vec<CandidateEntry>, QualityReport) {
    let mut report = QualityReport {
        threshold: cfg.min_entry_confidence,
        decisions: Vec::with_capacity(entries.len()),
    };
    let mut accepted = Vec::new();
    let mut review = Vec::new();

    for mut entry in entries {
        let (confidence, reject_reason) = score(&entry, cfg.ai_prompt.as_deref());
        entry.confidence = confidence;
        let accept = reject_reason.is_none() && confidence >= cfg.min_entry_confidence;
        let reason = match (&reject_reason, accept) {
            (Some(reason), _) => reason.clone(),
            (None, true) => "accepted".to_string(),
            (None, false) => format!(
                "confidence {confidence:.2} below threshold {:.2}",
                cfg.min_entry_confidence
            ),
        };

        report.decisions.push(QualityDecision {
            term: entry.term.clone(),
            meaning: entry.meaning.clone(),
            accepted: accept,
            confidence,
            reason,
        });
        if accept {
            accepted.push(entry);
        } else {
            review.push(entry);
        }
    }

    tracing::debug!(
        accepted = accepted.len(),
        review = review.len(),
        threshold = report.threshold,
        "quality gate applied"
    );
    (accepted, review, report)
}

/// Score one entry. A returned reason means an immediate reject.
fn score(entry: &CandidateEntry, instruction: Option<&str>) -> (f32, Option<String>) {
    let term = entry.term.trim();
    let meaning = entry.meaning.trim();
    let term_words = term.split_whitespace().count();

    if term.chars().count() < 2 || meaning.chars().count() < 3 {
        return (REJECT_CONFIDENCE, Some("term or meaning too short".into()));
    }
    if term.chars().count() > MAX_TERM_CHARS
        || term_words > MAX_TERM_WORDS
        || meaning.chars().count() > MAX_MEANING_CHARS
    {
        return (REJECT_CONFIDENCE, Some("term or meaning too long".into()));
    }
    if HEADER_TERM_RE.is_match(term) {
        return (REJECT_CONFIDENCE, Some("header-like term".into()));
    }
    if numeric_only(term) || numeric_only(meaning) {
        return (REJECT_CONFIDENCE, Some("numeric-only content".into()));
    }
    let lowered = format!("{} {}", term, meaning).to_lowercase();
    if taxonomy::BOILERPLATE_PHRASES.iter().any(|p| lowered.contains(p)) {
        return (REJECT_CONFIDENCE, Some("boilerplate phrase".into()));
    }

    let mut confidence = BASE_CONFIDENCE;
    if meaning.chars().count() > LONG_MEANING_CHARS {
        confidence -= 0.1;
    }
    if alphabetic_ratio(meaning) < 0.5 {
        confidence -= 0.15;
    }
    if symbol_ratio(meaning) > 0.3 {
        confidence -= 0.15;
    }
    if entry.example.is_some() {
        confidence += 0.05;
    }
    if let Some(instruction) = instruction {
        let keywords = taxonomy::content_words(instruction);
        if !keywords.is_empty() {
            let entry_words: std::collections::HashSet<String> =
                taxonomy::content_words(&lowered).into_iter().collect();
            if keywords.iter().any(|k| entry_words.contains(k)) {
                confidence += 0.1;
            } else {
                confidence -= 0.1;
            }
        }
    }

    (confidence.clamp(0.0, MAX_CONFIDENCE), None)
}

fn numeric_only(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_numeric() || c.is_whitespace() || c.is_ascii_punctuation())
}

fn alphabetic_ratio(s: &str) -> f32 {
    let total = s.chars().count();
    if total == 0 {
        return 0.0;
    }
    s.chars().filter(|c| c.is_alphabetic()).count() as f32 / total as f32
}

fn symbol_ratio(s: &str) -> f32 {
    let total = s.chars().count();
    if total == 0 {
        return 0.0;
    }
    let symbols = s
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    symbols as f32 / total as f32
}
