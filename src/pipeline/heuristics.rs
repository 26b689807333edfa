//! Deterministic line-oriented pair extraction.
//!
//! No external services, linear over input lines. Recognizes, in priority
//! order: delimiter splits, numbered/bulleted lines (with compound
//! semicolon/comma pairs), meaning/example continuation lines, column
//! layouts, compact `word - word` pairs, and a generic `term: meaning`
//! fallback. Noise lines are skipped before any pattern runs.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::pipeline::types::{dedupe_entries, CandidateEntry, EntryProvenance};

/// Delimiters tried against a whole line, in priority order.
const PAIR_DELIMITERS: [&str; 6] = [" => ", " -> ", " = ", ": ", " - ", "\t"];

const MAX_LINE_CHARS: usize = 280;
const MAX_TERM_CHARS: usize = 80;
const MAX_MEANING_CHARS: usize = 240;

static NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(page|chapter|unit|section|figure|fig\.?|table|contents|index|exercise)\b[\s\d.:()-]*$")
        .expect("valid regex")
});
static BARE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\s*[.)]?$").expect("valid regex"));
static BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{1,3}[.)]|[-*•‣▪○])\s+(.+)$").expect("valid regex"));
static COLUMN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").expect("valid regex"));
static COMPACT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-zÀ-ÿ']{2,30})\s?-\s?([A-Za-zÀ-ÿ'][A-Za-zÀ-ÿ' ]{1,60})$")
        .expect("valid regex")
});

/// Extract candidate pairs from normalized text. Output is deduplicated.
pub fn extract_pairs(text: &str) -> Vec<CandidateEntry> {
    let mut out: Vec<CandidateEntry> = Vec::new();
    let mut pending_term: Option<String> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if is_noise_line(line) {
            continue;
        }

        // Continuation lines bind to the surrounding context before any
        // pair pattern gets a chance.
        if let Some(rest) = strip_prefix_ci(line, "meaning:") {
            if let Some(term) = pending_term.take() {
                push_pair(&mut out, &term, rest);
            }
            continue;
        }
        if let Some(rest) = strip_prefix_ci(line, "example:") {
            if let Some(last) = out.last_mut() {
                if last.example.is_none() && !rest.trim().is_empty() {
                    last.example = Some(rest.trim().to_string());
                }
            }
            continue;
        }

        if let Some(caps) = BULLET_RE.captures(line) {
            let inner = caps.get(1).map_or("", |m| m.as_str()).trim();
            if extract_compound(&mut out, inner) || try_line(&mut out, inner) {
                pending_term = None;
            } else {
                set_pending(&mut pending_term, inner);
            }
            continue;
        }

        if try_line(&mut out, line) {
            pending_term = None;
            continue;
        }

        set_pending(&mut pending_term, line);
    }

    dedupe_entries(out)
}

/// Noise before pattern matching: headers, bare numbers, degenerate lengths.
fn is_noise_line(line: &str) -> bool {
    let len = line.chars().count();
    if len < 2 || len > MAX_LINE_CHARS {
        return true;
    }
    NOISE_RE.is_match(line) || BARE_NUMBER_RE.is_match(line)
}

// Byte-indexed split, so the head must be fetched with `get` — a multibyte
// character straddling the boundary yields None, not a panic.
fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

fn set_pending(pending: &mut Option<String>, line: &str) {
    // A short delimiter-free line may be a bare term awaiting its meaning.
    let words = line.split_whitespace().count();
    if (1..=5).contains(&words) && line.chars().count() <= MAX_TERM_CHARS {
        *pending = Some(line.to_string());
    } else {
        *pending = None;
    }
}

/// Split a numbered/bulleted line carrying several `;`/`,`-joined pairs.
/// Returns true when at least two pairs were produced.
fn extract_compound(out: &mut Vec<CandidateEntry>, inner: &str) -> bool {
    for separator in [';', ','] {
        if inner.matches(separator).count() == 0 {
            continue;
        }
        let segments: Vec<&str> = inner
            .split(separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 2 || !segments.iter().all(|s| split_delimited(s).is_some()) {
            continue;
        }
        let mut produced = 0;
        for segment in segments {
            if let Some((term, meaning)) = split_delimited(segment) {
                if push_pair(out, term, meaning) {
                    produced += 1;
                }
            }
        }
        if produced >= 2 {
            return true;
        }
    }
    false
}

/// Try every single-pair pattern against one line.
fn try_line(out: &mut Vec<CandidateEntry>, line: &str) -> bool {
    if let Some((term, meaning)) = split_delimited(line) {
        return push_pair(out, term, meaning);
    }

    // Column layout: exactly two cells split by a run of spaces.
    let columns: Vec<&str> = COLUMN_RE.split(line).map(str::trim).filter(|c| !c.is_empty()).collect();
    if columns.len() == 2 {
        return push_pair(out, columns[0], columns[1]);
    }

    // Compact `word - word`, bounded to short phrases.
    if let Some(caps) = COMPACT_RE.captures(line) {
        let term = caps.get(1).map_or("", |m| m.as_str());
        let meaning = caps.get(2).map_or("", |m| m.as_str());
        if meaning.split_whitespace().count() <= 4 {
            return push_pair(out, term, meaning);
        }
    }

    // Generic `term:meaning` fallback without the space the delimiter list
    // requires.
    if let Some((term, meaning)) = line.split_once(':') {
        if !term.trim().is_empty() && !meaning.trim().is_empty() && !meaning.contains(':') {
            return push_pair(out, term, meaning);
        }
    }

    false
}

/// First matching delimiter wins; the term side must stay short.
fn split_delimited(line: &str) -> Option<(&str, &str)> {
    for delimiter in PAIR_DELIMITERS {
        if let Some((left, right)) = line.split_once(delimiter) {
            let left = left.trim();
            let right = right.trim();
            if left.is_empty() || right.is_empty() {
                continue;
            }
            if left.chars().count() > MAX_TERM_CHARS || left.split_whitespace().count() > 8 {
                continue;
            }
            return Some((left, right));
        }
    }
    None
}

fn push_pair(out: &mut Vec<CandidateEntry>, term: &str, meaning: &str) -> bool {
    let term = term.trim().trim_matches(|c: char| c == '"' || c == '\'');
    let meaning = meaning.trim();
    if term.chars().count() > MAX_TERM_CHARS
        || meaning.chars().count() > MAX_MEANING_CHARS
        || term.chars().all(|c| c.is_numeric() || c.is_ascii_punctuation())
    {
        return false;
    }
    match CandidateEntry::new(term, meaning, None, EntryProvenance::Heuristic) {
        Some(entry) => {
            out.push(entry);
            true
        }
        None => false,
    }
}
