//! Core data model for the extraction pipeline.

use serde::{Deserialize, Serialize};

/// An uploaded document: immutable bytes plus caller-declared metadata.
/// The pipeline never mutates it.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: Option<String>,
}

impl RawDocument {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, content_type: Option<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            content_type,
        }
    }

    /// Lower-cased file extension, empty when absent.
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default()
    }
}

/// Normalized text recovered from a document, ready for pair extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub text: String,
    /// Human-readable label of the page selection actually applied ("3-7", "all").
    pub page_range_applied: Option<String>,
}

impl ExtractedText {
    /// Normalize raw recovered text: CRLF→LF, control chars stripped,
    /// horizontal whitespace runs collapsed, then truncated to `max_chars`.
    pub fn normalized(raw: &str, max_chars: usize) -> Self {
        let mut out = String::with_capacity(raw.len().min(max_chars));
        let mut last_was_space = false;
        for ch in raw.replace("\r\n", "\n").replace('\r', "\n").chars() {
            let ch = match ch {
                '\n' => '\n',
                '\t' => '\t',
                c if c.is_control() => ' ',
                c => c,
            };
            if ch == ' ' {
                if last_was_space {
                    continue;
                }
                last_was_space = true;
            } else {
                last_was_space = false;
            }
            out.push(ch);
        }
        if out.chars().count() > max_chars {
            out = out.chars().take(max_chars).collect();
        }
        Self {
            text: out,
            page_range_applied: None,
        }
    }

    pub fn with_page_range(mut self, label: Option<String>) -> Self {
        self.page_range_applied = label;
        self
    }
}

/// Which stage produced a candidate entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryProvenance {
    Heuristic,
    Ai,
}

/// A term/meaning pair considered for flashcard use.
///
/// Invariant: `term` and `meaning` are non-empty after trimming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEntry {
    pub term: String,
    pub meaning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    pub provenance: EntryProvenance,
}

impl CandidateEntry {
    /// Build an entry from trimmed parts. Returns None when term or meaning
    /// is empty after trimming — the invariant is enforced at construction.
    pub fn new(
        term: &str,
        meaning: &str,
        example: Option<&str>,
        provenance: EntryProvenance,
    ) -> Option<Self> {
        let term = term.trim();
        let meaning = meaning.trim();
        if term.is_empty() || meaning.is_empty() {
            return None;
        }
        let example = example
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        Some(Self {
            term: term.to_string(),
            meaning: meaning.to_string(),
            example,
            confidence: 0.0,
            subject: None,
            unit: None,
            chapter: None,
            provenance,
        })
    }

    /// Case-insensitive dedup key.
    pub fn dedup_key(&self) -> String {
        format!("{}:::{}", self.term.to_lowercase(), self.meaning.to_lowercase())
    }
}

/// Merge duplicates by case-insensitive `term:::meaning`, preserving
/// first-seen order and preferring the variant that carries an example.
pub fn dedupe_entries(entries: Vec<CandidateEntry>) -> Vec<CandidateEntry> {
    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut out: Vec<CandidateEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        let key = entry.dedup_key();
        match seen.get(&key) {
            None => {
                seen.insert(key, out.len());
                out.push(entry);
            }
            Some(&idx) => {
                let kept = &mut out[idx];
                if kept.example.is_none() && entry.example.is_some() {
                    kept.example = entry.example;
                }
                if kept.subject.is_none() {
                    kept.subject = entry.subject;
                }
                if kept.unit.is_none() {
                    kept.unit = entry.unit;
                }
                if kept.chapter.is_none() {
                    kept.chapter = entry.chapter;
                }
            }
        }
    }

    out
}

/// One kept/dropped decision with its human-readable reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDecision {
    pub term: String,
    pub meaning: String,
    pub kept: bool,
    pub reason: String,
}

/// Ordered record of every filter decision — nothing is dropped silently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterReport {
    pub instruction: String,
    pub mode: String,
    pub decisions: Vec<FilterDecision>,
}

/// One accept/review decision from the quality gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityDecision {
    pub term: String,
    pub meaning: String,
    pub accepted: bool,
    pub confidence: f32,
    pub reason: String,
}

/// Ordered record of every quality-gate decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub threshold: f32,
    pub decisions: Vec<QualityDecision>,
}

/// Report from the content profiler stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReport {
    pub profile: String,
    pub input_count: usize,
    pub kept_count: usize,
    pub dropped: Vec<FilterDecision>,
}

/// Final pipeline result as returned on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractOutcome {
    pub ok: bool,
    pub entries: Vec<CandidateEntry>,
    pub count: usize,
    #[serde(rename = "usedAI")]
    pub used_ai: bool,
    pub extraction_mode: String,
    pub providers_used: Vec<String>,
    pub provider_errors: Vec<String>,
    pub filter_report: Option<FilterReport>,
    pub profile_report: ProfileReport,
    pub quality_report: QualityReport,
    pub review_entries: Vec<CandidateEntry>,
    pub page_range_applied: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_no_match: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractOutcome {
    /// Empty failure outcome carrying only an error message.
    pub fn failed(mode: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            entries: Vec::new(),
            count: 0,
            used_ai: false,
            extraction_mode: mode.to_string(),
            providers_used: Vec::new(),
            provider_errors: Vec::new(),
            filter_report: None,
            profile_report: ProfileReport::default(),
            quality_report: QualityReport::default(),
            review_entries: Vec::new(),
            page_range_applied: None,
            strict_no_match: None,
            error: Some(message.into()),
        }
    }
}
