//! AI-backed pair extraction.
//!
//! Splits the document into paragraph-aligned chunks, runs each chunk through
//! the provider fallback chain with a JSON-array prompt, and unions the
//! lenient-parsed results. Chain exhaustion on a chunk is recorded, not
//! fatal; the heuristic path still carries the pipeline.

use crate::config::PipelineConfig;
use crate::pipeline::lenient;
use crate::pipeline::providers::backend::CompletionBackend;
use crate::pipeline::providers::{complete_with_fallback, ProviderRegistry};
use crate::pipeline::types::{dedupe_entries, CandidateEntry};

/// Everything one AI pass produced, including its failure trail.
#[derive(Debug, Default)]
pub struct AiExtraction {
    pub entries: Vec<CandidateEntry>,
    pub providers_used: Vec<String>,
    pub errors: Vec<String>,
    /// True when at least one chunk got a real completion back.
    pub any_completion: bool,
}

/// Split text into chunks on paragraph boundaries.
///
/// Paragraphs longer than `max_chars` are hard-split; the chunk count is
/// capped and any overflow is dropped with a warning.
pub fn chunk_text(text: &str, max_chars: usize, max_chunks: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim_end();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = paragraph.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let candidate_len = current.chars().count() + paragraph.chars().count() + 2;
        if !current.is_empty() && candidate_len > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    if chunks.len() > max_chunks {
        tracing::warn!(
            total = chunks.len(),
            kept = max_chunks,
            "chunk cap exceeded, dropping tail"
        );
        chunks.truncate(max_chunks);
    }
    chunks
}

/// The extraction prompt sent per chunk. The optional user instruction is
/// inlined so strict-capable providers can apply it at extraction time.
pub fn build_prompt(chunk: &str, instruction: Option<&str>, strict: bool) -> String {
    let mut prompt = String::from(
        "Extract every term/definition pair useful as a flashcard from the study material below.\n\
         Respond with ONLY a JSON array, no prose. Each element: \
         {\"term\": string, \"meaning\": string, \"example\": string (optional)}.\n",
    );
    if let Some(instruction) = instruction {
        prompt.push_str("Focus instruction from the user: ");
        prompt.push_str(instruction.trim());
        prompt.push('\n');
        if strict {
            prompt.push_str(
                "Only include pairs that match the instruction. If nothing matches, return [].\n",
            );
        }
    }
    prompt.push_str("\nMaterial:\n");
    prompt.push_str(chunk);
    prompt
}

/// Run AI extraction over the whole text.
pub async fn extract(
    registry: &ProviderRegistry,
    backend: &dyn CompletionBackend,
    cfg: &PipelineConfig,
    text: &str,
) -> AiExtraction {
    let chunks = chunk_text(text, cfg.max_chunk_chars, cfg.max_ai_chunks);
    tracing::debug!(chunks = chunks.len(), "starting AI extraction");

    let mut result = AiExtraction::default();
    for (index, chunk) in chunks.iter().enumerate() {
        let prompt = build_prompt(chunk, cfg.ai_prompt.as_deref(), cfg.strict_extraction);
        let outcome = complete_with_fallback(registry, backend, cfg, &prompt).await;

        for error in &outcome.errors {
            if !result.errors.contains(error) {
                result.errors.push(error.clone());
            }
        }
        if outcome.is_exhausted() {
            tracing::debug!(chunk = index, "chain exhausted for chunk");
            continue;
        }

        result.any_completion = true;
        if !result.providers_used.contains(&outcome.provider) {
            result.providers_used.push(outcome.provider);
        }
        let parsed = lenient::parse_entries(&outcome.text);
        tracing::debug!(chunk = index, entries = parsed.len(), "chunk parsed");
        result.entries.extend(parsed);
    }

    result.entries = dedupe_entries(std::mem::take(&mut result.entries));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::providers::backend::{BackendError, MockBackend};

    fn keyed_cfg() -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.provider_chain = vec!["gemini".into()];
        cfg.provider_keys.insert("gemini".into(), "k".into());
        cfg
    }

    #[test]
    fn chunking_respects_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = chunk_text(&text, 100, 80);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with('a'));
        assert!(chunks[1].starts_with('b'));
    }

    #[test]
    fn small_paragraphs_share_a_chunk() {
        let chunks = chunk_text("one\n\ntwo\n\nthree", 100, 80);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("one") && chunks[0].contains("three"));
    }

    #[test]
    fn oversized_paragraph_hard_splits() {
        let text = "x".repeat(250);
        let chunks = chunk_text(&text, 100, 80);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 100);
        assert_eq!(chunks[2].chars().count(), 50);
    }

    #[test]
    fn chunk_count_is_capped() {
        let text = vec!["p".repeat(90); 20].join("\n\n");
        let chunks = chunk_text(&text, 100, 5);
        assert_eq!(chunks.len(), 5);
    }

    #[test]
    fn prompt_inlines_instruction_and_strict_clause() {
        let prompt = build_prompt("material", Some("idioms only"), true);
        assert!(prompt.contains("idioms only"));
        assert!(prompt.contains("return []"));
        assert!(prompt.contains("material"));

        let lenient_prompt = build_prompt("material", Some("idioms only"), false);
        assert!(!lenient_prompt.contains("return []"));
    }

    #[tokio::test]
    async fn entries_unioned_and_deduped_across_chunks() {
        let cfg = PipelineConfig {
            max_chunk_chars: 40,
            ..keyed_cfg()
        };
        let backend = MockBackend::new(vec![
            Ok(r#"[{"term":"a","meaning":"first"},{"term":"b","meaning":"second"}]"#.into()),
            Ok(r#"[{"term":"b","meaning":"second"},{"term":"c","meaning":"third"}]"#.into()),
        ]);
        let registry = ProviderRegistry::new();
        let text = format!("{}\n\n{}", "x".repeat(35), "y".repeat(35));

        let result = extract(&registry, &backend, &cfg, &text).await;
        assert_eq!(result.entries.len(), 3);
        assert_eq!(result.providers_used, vec!["gemini"]);
        assert!(result.any_completion);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn exhausted_chunks_record_errors_without_failing() {
        let cfg = keyed_cfg();
        let backend = MockBackend::new(vec![Err(BackendError::Status(500))]);
        let registry = ProviderRegistry::new();

        let result = extract(&registry, &backend, &cfg, "some study text").await;
        assert!(result.entries.is_empty());
        assert!(!result.any_completion);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("gemini"));
    }

    #[tokio::test]
    async fn exhausted_chunk_does_not_stop_later_chunks() {
        let cfg = PipelineConfig {
            max_chunk_chars: 40,
            ..keyed_cfg()
        };
        let backend = MockBackend::new(vec![
            Err(BackendError::Status(500)),
            Ok(r#"[{"term":"entropy","meaning":"measure of disorder"}]"#.into()),
        ]);
        let registry = ProviderRegistry::new();
        let text = format!("{}\n\n{}", "x".repeat(35), "y".repeat(35));

        let result = extract(&registry, &backend, &cfg, &text).await;
        // First chunk's failure is recorded, second chunk still lands.
        assert_eq!(result.entries.len(), 1);
        assert!(result.any_completion);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.providers_used, vec!["gemini"]);
    }

    #[tokio::test]
    async fn duplicate_errors_are_unioned() {
        let mut cfg = keyed_cfg();
        cfg.max_chunk_chars = 20;
        cfg.provider_keys.remove("gemini");
        let backend = MockBackend::new(vec![]);
        let registry = ProviderRegistry::new();
        let text = format!("{}\n\n{}", "x".repeat(18), "y".repeat(18));

        let result = extract(&registry, &backend, &cfg, &text).await;
        // Same skip reason from both chunks collapses to one line.
        assert_eq!(result.errors.len(), 1);
    }
}
