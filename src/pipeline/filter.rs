//! Natural-language prompt filtering of candidate entries.
//!
//! A named heuristic rule is chosen from the instruction's shape, falling
//! back to generic keyword overlap. Unless disabled, one AI pass judges the
//! full candidate set as well; heuristic and AI verdicts are unioned so an
//! over-aggressive model cannot silently drop valid matches. Every decision
//! lands in the report with a reason.

use std::collections::HashSet;

use serde_json::json;

use crate::config::PipelineConfig;
use crate::pipeline::lenient;
use crate::pipeline::providers::backend::CompletionBackend;
use crate::pipeline::providers::{complete_with_fallback, ProviderRegistry, ProviderSpec};
use crate::pipeline::types::{CandidateEntry, FilterDecision, FilterReport};
use crate::taxonomy;

/// What one filter pass produced, including provider diagnostics from the
/// optional AI judgment call.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub kept: Vec<CandidateEntry>,
    pub report: FilterReport,
    pub providers_used: Vec<String>,
    pub errors: Vec<String>,
    pub ai_pass_ran: bool,
}

/// The named heuristic rules, matched against the instruction's wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    OneWordSubstitution,
    IdiomPhrase,
    PhrasalVerb,
    NounGender,
    HistoryTopic,
    KeywordOverlap,
}

impl Rule {
    fn for_instruction(instruction: &str) -> Rule {
        let lowered = instruction.to_lowercase();
        if lowered.contains("one word") || lowered.contains("one-word") {
            Rule::OneWordSubstitution
        } else if lowered.contains("idiom") || lowered.contains("expression") {
            Rule::IdiomPhrase
        } else if lowered.contains("phrasal") {
            Rule::PhrasalVerb
        } else if lowered.contains("gender") || lowered.contains("article") {
            Rule::NounGender
        } else if lowered.contains("history") || lowered.contains("historical") {
            Rule::HistoryTopic
        } else {
            Rule::KeywordOverlap
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Rule::OneWordSubstitution => "one-word substitution",
            Rule::IdiomPhrase => "idiom/phrase",
            Rule::PhrasalVerb => "phrasal verb",
            Rule::NounGender => "noun gender",
            Rule::HistoryTopic => "history topic",
            Rule::KeywordOverlap => "keyword overlap",
        }
    }
}

/// Whether the answering provider is trusted to apply strict filtering.
pub fn provider_is_strict_capable(name: &str) -> bool {
    ProviderSpec::lookup(name).is_some_and(|p| p.strict_capable)
}

/// Apply the instruction to the candidate set. Callers must only invoke this
/// when an instruction is present.
pub async fn apply(
    registry: &ProviderRegistry,
    backend: &dyn CompletionBackend,
    cfg: &PipelineConfig,
    entries: Vec<CandidateEntry>,
) -> FilterOutcome {
    let instruction = cfg.ai_prompt.clone().unwrap_or_default();
    let rule = Rule::for_instruction(&instruction);
    tracing::debug!(rule = rule.name(), candidates = entries.len(), "filtering");

    let heuristic_kept: HashSet<String> = entries
        .iter()
        .filter(|e| rule_matches(rule, &instruction, e))
        .map(|e| e.dedup_key())
        .collect();

    let mut outcome = FilterOutcome::default();
    let mut ai_kept: Option<HashSet<String>> = None;
    if !cfg.disable_ai_filter && !entries.is_empty() {
        let chain = complete_with_fallback(
            registry,
            backend,
            cfg,
            &judgment_prompt(&instruction, &entries),
        )
        .await;
        outcome.errors = chain.errors.clone();
        if !chain.is_exhausted() {
            outcome.ai_pass_ran = true;
            outcome.providers_used.push(chain.provider.clone());
            let keys: HashSet<String> = lenient::parse_entries(&chain.text)
                .iter()
                .map(|e| e.dedup_key())
                .collect();
            ai_kept = Some(keys);
        }
    }

    let mode = if cfg.strict_extraction { "strict" } else { "lenient" };
    outcome.report.instruction = instruction.clone();
    outcome.report.mode = mode.to_string();

    for entry in entries {
        let key = entry.dedup_key();
        let heuristic_hit = heuristic_kept.contains(&key);
        let ai_hit = ai_kept.as_ref().is_some_and(|keys| keys.contains(&key));
        // Union in both modes: the AI verdict can add matches the rule
        // missed, the rule protects matches the model dropped.
        let kept = heuristic_hit || ai_hit;

        let reason = match (heuristic_hit, ai_hit, ai_kept.is_some()) {
            (true, true, _) => format!("matched {} rule and AI filter", rule.name()),
            (true, false, true) => format!("matched {} rule (AI disagreed)", rule.name()),
            (true, false, false) => format!("matched {} rule", rule.name()),
            (false, true, _) => "kept by AI filter".to_string(),
            (false, false, true) => format!("no match: {} rule and AI filter", rule.name()),
            (false, false, false) => format!("no match: {} rule", rule.name()),
        };
        outcome.report.decisions.push(FilterDecision {
            term: entry.term.clone(),
            meaning: entry.meaning.clone(),
            kept,
            reason,
        });
        if kept {
            outcome.kept.push(entry);
        }
    }

    tracing::debug!(kept = outcome.kept.len(), mode, "filter complete");
    outcome
}

fn rule_matches(rule: Rule, instruction: &str, entry: &CandidateEntry) -> bool {
    let term_words: Vec<&str> = entry.term.split_whitespace().collect();
    match rule {
        Rule::OneWordSubstitution => {
            let meaning_words = entry.meaning.split_whitespace().count();
            term_words.len() == 1 && (2..=40).contains(&meaning_words) && !is_heading_like(&entry.term)
        }
        Rule::IdiomPhrase => term_words.len() >= 3,
        Rule::PhrasalVerb => {
            (2..=3).contains(&term_words.len())
                && term_words
                    .last()
                    .is_some_and(|last| {
                        let last = last.to_lowercase();
                        taxonomy::PHRASAL_PARTICLES.contains(&last.as_str())
                    })
        }
        Rule::NounGender => term_words
            .first()
            .is_some_and(|first| {
                let first = first.to_lowercase();
                taxonomy::GENDER_ARTICLES.contains(&first.as_str())
            }),
        Rule::HistoryTopic => {
            let combined = format!("{} {}", entry.term, entry.meaning);
            taxonomy::keyword_hits(&combined, &taxonomy::HISTORY_KEYWORDS) > 0
                || contains_year(&combined)
        }
        Rule::KeywordOverlap => {
            let keywords = taxonomy::content_words(instruction);
            if keywords.is_empty() {
                return true;
            }
            let combined = format!("{} {}", entry.term, entry.meaning).to_lowercase();
            let entry_words: HashSet<String> = taxonomy::content_words(&combined).into_iter().collect();
            keywords.iter().any(|k| entry_words.contains(k))
        }
    }
}

fn is_heading_like(term: &str) -> bool {
    term.ends_with(':')
        || (term.len() > 3 && term.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase()))
}

fn contains_year(text: &str) -> bool {
    text.split(|c: char| !c.is_numeric())
        .any(|run| run.len() == 4 && run.starts_with(|c| c == '1' || c == '2'))
}

/// AI judgment prompt: full candidate JSON plus the instruction, asking for
/// the kept subset back as an array.
fn judgment_prompt(instruction: &str, entries: &[CandidateEntry]) -> String {
    let candidates: Vec<serde_json::Value> = entries
        .iter()
        .map(|e| json!({ "term": e.term, "meaning": e.meaning }))
        .collect();
    format!(
        "From the candidate flashcards below, keep ONLY the ones matching this instruction: {instruction}\n\
         Respond with ONLY a JSON array of the kept candidates, unchanged. Return [] if none match.\n\
         Candidates:\n{}",
        serde_json::Value::Array(candidates)
    )
}
