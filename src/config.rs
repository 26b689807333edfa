//! Pipeline configuration resolved once per request.
//!
//! Resolution order: built-in defaults → process environment (`CARDIFY_*`)
//! → per-request settings document. The merged `PipelineConfig` is passed by
//! value through every stage; no stage re-reads ambient configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Cardify";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory (~/Cardify on all platforms).
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Cardify")
}

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> String {
    "info,cardify=debug".to_string()
}

/// How the orchestrator balances heuristic vs AI extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Heuristics first; AI only when yield is low or an instruction is set.
    LocalFirst,
    /// AI extraction only.
    AiOnly,
    /// Always run both and union the results.
    Hybrid,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalFirst => "local_first",
            Self::AiOnly => "ai_only",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Optional shape transform applied after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentProfile {
    PassThrough,
    NounsOnly,
    ChapterTagging,
}

impl ContentProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass_through",
            Self::NounsOnly => "nouns_only",
            Self::ChapterTagging => "chapter_tagging",
        }
    }

    fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "nouns_only" | "nouns-only" | "nouns" => Self::NounsOnly,
            "chapter_tagging" | "chapter" | "chapters" => Self::ChapterTagging,
            _ => Self::PassThrough,
        }
    }
}

/// Per-request settings document as received on the wire.
///
/// Everything is optional; unset fields fall back to the process config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractSettings {
    pub page_range: Option<String>,
    pub ai_prompt: Option<String>,
    pub strict_extraction: Option<bool>,
    pub extraction_mode: Option<ExtractionMode>,
    pub content_profile: Option<String>,
    pub min_entry_confidence: Option<f32>,
    pub provider_chain: Option<Vec<String>>,
    pub provider_keys: Option<HashMap<String, String>>,
    pub provider_models: Option<HashMap<String, String>>,
    pub provider_daily_limits: Option<HashMap<String, u32>>,
    pub min_pairs_before_ocr: Option<usize>,
    pub max_ai_chunks: Option<usize>,
    pub max_pipeline_chars: Option<usize>,
    pub ocr_api_key: Option<String>,
    pub ocr_language: Option<String>,
    pub disable_local_ocr: Option<bool>,
    pub disable_ai_filter: Option<bool>,
    pub force_ai: Option<bool>,
    pub subject: Option<String>,
    pub unit: Option<String>,
    pub chapter: Option<String>,
    /// Persistence targets — entries are only stored when both are present.
    pub category: Option<String>,
    pub file: Option<String>,
}

/// Fully resolved pipeline configuration. Cloned per request.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub page_range: Option<String>,
    pub ai_prompt: Option<String>,
    pub strict_extraction: bool,
    pub extraction_mode: ExtractionMode,
    pub content_profile: ContentProfile,
    pub min_entry_confidence: f32,
    pub provider_chain: Vec<String>,
    pub provider_keys: HashMap<String, String>,
    pub provider_models: HashMap<String, String>,
    pub provider_daily_limits: HashMap<String, u32>,
    pub min_pairs_before_ocr: usize,
    pub max_ai_chunks: usize,
    pub max_chunk_chars: usize,
    pub max_pipeline_chars: usize,
    pub ocr_api_key: Option<String>,
    pub ocr_endpoint: String,
    pub ocr_language: String,
    pub disable_local_ocr: bool,
    pub disable_ai_filter: bool,
    pub force_ai: bool,
    pub ollama_endpoint: String,
    pub pipeline_timeout_secs: u64,
    pub ocr_batch_size: usize,
    /// local_first: run AI when heuristic yield is below this.
    pub local_first_min_yield: usize,
    /// local_first: skip AI entirely above this many chars unless forced.
    pub local_first_ai_char_limit: usize,
    pub subject: Option<String>,
    pub unit: Option<String>,
    pub chapter: Option<String>,
    pub category: Option<String>,
    pub file: Option<String>,
}

/// Default provider order when neither request nor env override it.
pub const DEFAULT_PROVIDER_CHAIN: [&str; 4] = ["gemini", "groq", "openrouter", "ollama"];

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_range: None,
            ai_prompt: None,
            strict_extraction: false,
            extraction_mode: ExtractionMode::LocalFirst,
            content_profile: ContentProfile::PassThrough,
            min_entry_confidence: 0.42,
            provider_chain: DEFAULT_PROVIDER_CHAIN.iter().map(|s| s.to_string()).collect(),
            provider_keys: HashMap::new(),
            provider_models: HashMap::new(),
            provider_daily_limits: HashMap::new(),
            min_pairs_before_ocr: 4,
            max_ai_chunks: 80,
            max_chunk_chars: 9_000,
            max_pipeline_chars: 200_000,
            ocr_api_key: None,
            ocr_endpoint: "https://api.ocr.space/parse/image".to_string(),
            ocr_language: "eng".to_string(),
            disable_local_ocr: false,
            disable_ai_filter: false,
            force_ai: false,
            ollama_endpoint: "http://localhost:11434".to_string(),
            pipeline_timeout_secs: 120,
            ocr_batch_size: 6,
            local_first_min_yield: 5,
            local_first_ai_char_limit: 60_000,
            subject: None,
            unit: None,
            chapter: None,
            category: None,
            file: None,
        }
    }
}

impl PipelineConfig {
    /// Process-level config: defaults overlaid with `CARDIFY_*` env vars.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(key) = std::env::var("CARDIFY_OCR_API_KEY") {
            if !key.is_empty() {
                cfg.ocr_api_key = Some(key);
            }
        }
        if let Ok(endpoint) = std::env::var("CARDIFY_OCR_ENDPOINT") {
            if !endpoint.is_empty() {
                cfg.ocr_endpoint = endpoint;
            }
        }
        if let Ok(endpoint) = std::env::var("CARDIFY_OLLAMA_ENDPOINT") {
            if !endpoint.is_empty() {
                cfg.ollama_endpoint = endpoint;
            }
        }
        if let Ok(chain) = std::env::var("CARDIFY_PROVIDER_CHAIN") {
            let parsed: Vec<String> = chain
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                cfg.provider_chain = parsed;
            }
        }
        for provider in DEFAULT_PROVIDER_CHAIN {
            let var = format!("CARDIFY_{}_API_KEY", provider.to_uppercase());
            if let Ok(key) = std::env::var(&var) {
                if !key.is_empty() {
                    cfg.provider_keys.insert(provider.to_string(), key);
                }
            }
        }
        if let Ok(secs) = std::env::var("CARDIFY_PIPELINE_TIMEOUT_SECS") {
            if let Ok(parsed) = secs.parse::<u64>() {
                cfg.pipeline_timeout_secs = parsed.max(5);
            }
        }

        cfg
    }

    /// Merge per-request settings over this config, producing the final
    /// request-scoped configuration.
    pub fn merged(&self, settings: &ExtractSettings) -> Self {
        let mut cfg = self.clone();

        if settings.page_range.is_some() {
            cfg.page_range = settings.page_range.clone();
        }
        if let Some(prompt) = &settings.ai_prompt {
            let trimmed = prompt.trim();
            cfg.ai_prompt = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        if let Some(strict) = settings.strict_extraction {
            cfg.strict_extraction = strict;
        }
        if let Some(mode) = settings.extraction_mode {
            cfg.extraction_mode = mode;
        }
        if let Some(profile) = &settings.content_profile {
            cfg.content_profile = ContentProfile::parse(profile);
        }
        if let Some(min) = settings.min_entry_confidence {
            cfg.min_entry_confidence = min.clamp(0.2, 0.95);
        }
        if let Some(chain) = &settings.provider_chain {
            let cleaned: Vec<String> = chain
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect();
            if !cleaned.is_empty() {
                cfg.provider_chain = cleaned;
            }
        }
        if let Some(keys) = &settings.provider_keys {
            for (provider, key) in keys {
                cfg.provider_keys.insert(provider.to_lowercase(), key.clone());
            }
        }
        if let Some(models) = &settings.provider_models {
            for (provider, model) in models {
                cfg.provider_models.insert(provider.to_lowercase(), model.clone());
            }
        }
        if let Some(limits) = &settings.provider_daily_limits {
            for (provider, limit) in limits {
                cfg.provider_daily_limits.insert(provider.to_lowercase(), *limit);
            }
        }
        if let Some(min_pairs) = settings.min_pairs_before_ocr {
            cfg.min_pairs_before_ocr = min_pairs;
        }
        if let Some(max_chunks) = settings.max_ai_chunks {
            cfg.max_ai_chunks = max_chunks.clamp(1, 80);
        }
        if let Some(max_chars) = settings.max_pipeline_chars {
            cfg.max_pipeline_chars = max_chars.clamp(1_000, 2_000_000);
        }
        if let Some(key) = &settings.ocr_api_key {
            if !key.trim().is_empty() {
                cfg.ocr_api_key = Some(key.trim().to_string());
            }
        }
        if let Some(lang) = &settings.ocr_language {
            if !lang.trim().is_empty() {
                cfg.ocr_language = lang.trim().to_string();
            }
        }
        if let Some(disable) = settings.disable_local_ocr {
            cfg.disable_local_ocr = disable;
        }
        if let Some(disable) = settings.disable_ai_filter {
            cfg.disable_ai_filter = disable;
        }
        if let Some(force) = settings.force_ai {
            cfg.force_ai = force;
        }
        cfg.subject = settings.subject.clone().or(cfg.subject);
        cfg.unit = settings.unit.clone().or(cfg.unit);
        cfg.chapter = settings.chapter.clone().or(cfg.chapter);
        cfg.category = settings.category.clone().or(cfg.category);
        cfg.file = settings.file.clone().or(cfg.file);

        cfg
    }

    /// Whether a non-empty user instruction is active.
    pub fn has_instruction(&self) -> bool {
        self.ai_prompt.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}
