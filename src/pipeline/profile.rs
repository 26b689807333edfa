//! Optional shape transforms plus subject/unit/chapter tagging.
//!
//! Noun-likeness is judged permissively: clear verb/sentence markers reject,
//! everything ambiguous passes and is left to the quality gate.

use crate::config::{ContentProfile, PipelineConfig};
use crate::pipeline::types::{CandidateEntry, FilterDecision, ProfileReport};
use crate::taxonomy;

/// Meaning-side wording that corroborates a noun term.
const NOUN_MARKERS: [&str; 6] = ["noun", "object", "person", "place", "thing", "concept"];

pub fn apply(cfg: &PipelineConfig, entries: Vec<CandidateEntry>) -> (Vec<CandidateEntry>, ProfileReport) {
    let input_count = entries.len();
    let mut report = ProfileReport {
        profile: cfg.content_profile.as_str().to_string(),
        input_count,
        kept_count: 0,
        dropped: Vec::new(),
    };

    let mut kept = Vec::with_capacity(entries.len());
    for mut entry in entries {
        if cfg.content_profile == ContentProfile::NounsOnly && !looks_like_noun(&entry) {
            report.dropped.push(FilterDecision {
                term: entry.term.clone(),
                meaning: entry.meaning.clone(),
                kept: false,
                reason: "not noun-like".to_string(),
            });
            continue;
        }
        tag(cfg, &mut entry);
        kept.push(entry);
    }

    report.kept_count = kept.len();
    tracing::debug!(
        profile = report.profile,
        input = input_count,
        kept = report.kept_count,
        "profile applied"
    );
    (kept, report)
}

/// Stamp caller-supplied metadata onto the entry where it is still unset.
/// Chapter tagging additionally infers a subject from the entry text.
fn tag(cfg: &PipelineConfig, entry: &mut CandidateEntry) {
    if entry.subject.is_none() {
        entry.subject = cfg.subject.clone();
    }
    if entry.unit.is_none() {
        entry.unit = cfg.unit.clone();
    }
    if entry.chapter.is_none() {
        entry.chapter = cfg.chapter.clone();
    }
    if cfg.content_profile == ContentProfile::ChapterTagging && entry.subject.is_none() {
        let combined = format!("{} {}", entry.term, entry.meaning);
        entry.subject = taxonomy::infer_subject(&combined).map(str::to_string);
    }
}

fn looks_like_noun(entry: &CandidateEntry) -> bool {
    let term = entry.term.trim();
    let words = term.split_whitespace().count();
    if words > 5 {
        return false;
    }
    let lowered = term.to_lowercase();
    // Infinitive, sentence, or verb markers reject outright.
    if lowered.starts_with("to ") || term.ends_with('.') || term.ends_with('?') {
        return false;
    }
    if words == 1 && (lowered.ends_with("ing") || lowered.ends_with("ed")) {
        // Could still be a gerund used as a noun; check the meaning side.
        let meaning = entry.meaning.to_lowercase();
        let corroborated = meaning.starts_with("a ")
            || meaning.starts_with("an ")
            || meaning.starts_with("the ")
            || NOUN_MARKERS.iter().any(|m| meaning.contains(m));
        return corroborated;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::EntryProvenance;

    fn entry(term: &str, meaning: &str) -> CandidateEntry {
        CandidateEntry::new(term, meaning, None, EntryProvenance::Heuristic).unwrap()
    }

    fn cfg(profile: ContentProfile) -> PipelineConfig {
        PipelineConfig {
            content_profile: profile,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn pass_through_keeps_everything() {
        let entries = vec![entry("to run", "moving fast."), entry("dog", "an animal")];
        let (kept, report) = apply(&cfg(ContentProfile::PassThrough), entries);
        assert_eq!(kept.len(), 2);
        assert_eq!(report.kept_count, 2);
        assert!(report.dropped.is_empty());
    }

    #[test]
    fn nouns_only_drops_infinitives_and_sentences() {
        let entries = vec![
            entry("to procrastinate", "to delay doing something"),
            entry("This is a full sentence.", "something"),
            entry("membrane", "a thin layer around a cell"),
        ];
        let (kept, report) = apply(&cfg(ContentProfile::NounsOnly), entries);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].term, "membrane");
        assert_eq!(report.dropped.len(), 2);
        assert!(report.dropped.iter().all(|d| d.reason == "not noun-like"));
    }

    #[test]
    fn gerund_kept_when_meaning_corroborates() {
        let entries = vec![
            entry("painting", "a picture made with paint"),
            entry("running", "moves quickly on foot"),
        ];
        let (kept, _) = apply(&cfg(ContentProfile::NounsOnly), entries);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].term, "painting");
    }

    #[test]
    fn caller_metadata_is_tagged_without_overwriting() {
        let mut config = cfg(ContentProfile::PassThrough);
        config.subject = Some("biology".into());
        config.chapter = Some("3".into());

        let mut pre_tagged = entry("mitosis", "cell division");
        pre_tagged.subject = Some("cytology".into());
        let entries = vec![pre_tagged, entry("osmosis", "water diffusion")];

        let (kept, _) = apply(&config, entries);
        assert_eq!(kept[0].subject.as_deref(), Some("cytology"));
        assert_eq!(kept[1].subject.as_deref(), Some("biology"));
        assert_eq!(kept[1].chapter.as_deref(), Some("3"));
    }

    #[test]
    fn chapter_tagging_infers_subject_when_unset() {
        let entries = vec![entry(
            "cell membrane",
            "layer controlling what enters the cell",
        )];
        let (kept, _) = apply(&cfg(ContentProfile::ChapterTagging), entries);
        assert_eq!(kept[0].subject.as_deref(), Some("biology"));
    }
}
