//! End-to-end pipeline sequencing.
//!
//! Text recovery, heuristic extraction, conditional AI extraction, prompt
//! filter, profiler, quality gate. The whole run sits under one wall-clock
//! budget; exceeding it yields a timeout outcome with no partial state.

use std::time::Duration;

use crate::config::{ExtractionMode, PipelineConfig};
use crate::pipeline::format;
use crate::pipeline::heuristics;
use crate::pipeline::providers::backend::CompletionBackend;
use crate::pipeline::providers::ProviderRegistry;
use crate::pipeline::types::{dedupe_entries, ExtractOutcome, RawDocument};
use crate::pipeline::{ai, filter, profile, quality};

/// Diagnostic caps on the wire result.
const MAX_PROVIDER_ERRORS: usize = 8;
const MAX_REVIEW_ENTRIES: usize = 25;

/// One pipeline instance per process. The provider registry inside carries
/// cross-request cooldown and daily-budget state.
pub struct Pipeline {
    registry: ProviderRegistry,
    backend: Box<dyn CompletionBackend>,
}

impl Pipeline {
    pub fn new(backend: Box<dyn CompletionBackend>) -> Self {
        Self {
            registry: ProviderRegistry::new(),
            backend,
        }
    }

    /// Run the full pipeline under the configured wall-clock budget.
    pub async fn run(&self, doc: RawDocument, cfg: PipelineConfig) -> ExtractOutcome {
        let mode = cfg.extraction_mode.as_str();
        let budget = Duration::from_secs(cfg.pipeline_timeout_secs.max(1));
        match tokio::time::timeout(budget, self.run_inner(doc, cfg)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(budget_secs = budget.as_secs(), "pipeline timed out");
                ExtractOutcome::failed(mode, "pipeline exceeded its time budget")
            }
        }
    }

    async fn run_inner(&self, doc: RawDocument, mut cfg: PipelineConfig) -> ExtractOutcome {
        let file_name = doc.file_name.clone();
        tracing::info!(
            file = %file_name,
            mode = cfg.extraction_mode.as_str(),
            "pipeline start"
        );

        let text = format::extract_text(&doc, &cfg).await;
        tracing::debug!(chars = text.text.chars().count(), "text recovered");

        let mut used_ai = false;
        let mut providers_used: Vec<String> = Vec::new();
        let mut provider_errors: Vec<String> = Vec::new();

        let heuristic_entries = if cfg.extraction_mode == ExtractionMode::AiOnly {
            Vec::new()
        } else {
            heuristics::extract_pairs(&text.text)
        };
        tracing::debug!(pairs = heuristic_entries.len(), "heuristic extraction done");

        let run_ai = match cfg.extraction_mode {
            ExtractionMode::AiOnly | ExtractionMode::Hybrid => true,
            ExtractionMode::LocalFirst => {
                let wants_ai = heuristic_entries.len() < cfg.local_first_min_yield
                    || cfg.has_instruction();
                let within_size = text.text.chars().count() <= cfg.local_first_ai_char_limit;
                wants_ai && (within_size || cfg.force_ai)
            }
        };

        let mut candidates = heuristic_entries;
        if run_ai && !text.text.trim().is_empty() {
            let extraction =
                ai::extract(&self.registry, self.backend.as_ref(), &cfg, &text.text).await;
            used_ai = extraction.any_completion;
            merge_unique(&mut providers_used, extraction.providers_used);
            merge_unique(&mut provider_errors, extraction.errors);
            candidates.extend(extraction.entries);
            candidates = dedupe_entries(candidates);
        }

        // Strict-by-default: an instruction answered by a strict-capable
        // provider is treated as strict even when not explicitly requested.
        if !cfg.strict_extraction
            && cfg.has_instruction()
            && providers_used.iter().any(|p| filter::provider_is_strict_capable(p))
        {
            cfg.strict_extraction = true;
        }

        let filter_report = if cfg.has_instruction() {
            let outcome =
                filter::apply(&self.registry, self.backend.as_ref(), &cfg, candidates).await;
            used_ai = used_ai || outcome.ai_pass_ran;
            merge_unique(&mut providers_used, outcome.providers_used);
            merge_unique(&mut provider_errors, outcome.errors);
            candidates = outcome.kept;
            let mut report = outcome.report;
            // The filter's own judgment call can be the first strict-capable
            // answer when extraction skipped AI entirely.
            if !cfg.strict_extraction
                && providers_used.iter().any(|p| filter::provider_is_strict_capable(p))
            {
                cfg.strict_extraction = true;
                report.mode = "strict".to_string();
            }
            Some(report)
        } else {
            None
        };

        let (profiled, profile_report) = profile::apply(&cfg, candidates);
        let (accepted, mut review, quality_report) = quality::apply(&cfg, profiled);

        let strict_no_match =
            (cfg.strict_extraction && cfg.has_instruction() && accepted.is_empty()).then_some(true);

        provider_errors.truncate(MAX_PROVIDER_ERRORS);
        review.truncate(MAX_REVIEW_ENTRIES);

        tracing::info!(
            file = %file_name,
            accepted = accepted.len(),
            review = review.len(),
            used_ai,
            "pipeline complete"
        );

        ExtractOutcome {
            ok: true,
            count: accepted.len(),
            entries: accepted,
            used_ai,
            extraction_mode: cfg.extraction_mode.as_str().to_string(),
            providers_used,
            provider_errors,
            filter_report,
            profile_report,
            quality_report,
            review_entries: review,
            page_range_applied: text.page_range_applied,
            strict_no_match,
            error: None,
        }
    }
}

fn merge_unique(target: &mut Vec<String>, additions: Vec<String>) {
    for item in additions {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}
