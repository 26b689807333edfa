//! Provider fallback chain with cooldowns and daily budgets.
//!
//! Providers are tried in configured order. A throttle-shaped failure puts
//! the provider on a short cooldown; every attempt counts against a per-UTC-day
//! budget. Exhausting the chain is a valid outcome, not an error: the caller
//! receives the synthetic "local" provider and the full error trail.

pub mod backend;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::PipelineConfig;
use crate::pipeline::providers::backend::CompletionBackend;

/// Cooldown applied after a throttle-shaped failure.
const THROTTLE_COOLDOWN: Duration = Duration::from_secs(120);

/// Synthetic provider name reported when the whole chain failed.
pub const LOCAL_PROVIDER: &str = "local";

/// Static description of one supported provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub timeout: Duration,
    pub default_daily_limit: u32,
    pub default_model: &'static str,
    pub requires_key: bool,
    /// Providers that follow instruction prompts reliably enough for
    /// strict filtering to trust their judgment.
    pub strict_capable: bool,
}

/// The fixed provider set, in default chain order.
pub const PROVIDERS: [ProviderSpec; 4] = [
    ProviderSpec {
        name: "gemini",
        timeout: Duration::from_secs(18),
        default_daily_limit: 45,
        default_model: "gemini-1.5-flash",
        requires_key: true,
        strict_capable: true,
    },
    ProviderSpec {
        name: "groq",
        timeout: Duration::from_secs(12),
        default_daily_limit: 250,
        default_model: "llama-3.1-8b-instant",
        requires_key: true,
        strict_capable: true,
    },
    ProviderSpec {
        name: "openrouter",
        timeout: Duration::from_secs(20),
        default_daily_limit: 40,
        default_model: "meta-llama/llama-3.1-8b-instruct:free",
        requires_key: true,
        strict_capable: false,
    },
    ProviderSpec {
        name: "ollama",
        timeout: Duration::from_secs(25),
        default_daily_limit: u32::MAX,
        default_model: "llama3.1",
        requires_key: false,
        strict_capable: false,
    },
];

impl ProviderSpec {
    pub fn lookup(name: &str) -> Option<&'static ProviderSpec> {
        PROVIDERS.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Default, Clone)]
struct ProviderState {
    cooldown_until: Option<DateTime<Utc>>,
    calls_today: u32,
    day: Option<NaiveDate>,
}

/// Mutable per-process provider health. Shared across requests.
#[derive(Default)]
pub struct ProviderRegistry {
    states: Mutex<HashMap<String, ProviderState>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProviderState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Why this provider cannot be tried right now, if anything.
    pub fn unavailable_reason_at(
        &self,
        name: &str,
        daily_limit: u32,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let mut states = self.lock();
        let state = states.entry(name.to_string()).or_default();
        roll_day(state, now);

        if let Some(until) = state.cooldown_until {
            if until > now {
                let remaining = (until - now).num_seconds().max(1);
                return Some(format!("cooling down for {remaining}s"));
            }
            state.cooldown_until = None;
        }
        if state.calls_today >= daily_limit {
            return Some(format!("daily limit of {daily_limit} reached"));
        }
        None
    }

    /// Count one attempt against today's budget.
    pub fn record_attempt_at(&self, name: &str, now: DateTime<Utc>) {
        let mut states = self.lock();
        let state = states.entry(name.to_string()).or_default();
        roll_day(state, now);
        state.calls_today = state.calls_today.saturating_add(1);
    }

    /// Clear any cooldown after a successful completion.
    pub fn record_success(&self, name: &str) {
        let mut states = self.lock();
        if let Some(state) = states.get_mut(name) {
            state.cooldown_until = None;
        }
    }

    /// Put the provider on cooldown after a throttle-shaped failure.
    pub fn record_throttle_at(&self, name: &str, now: DateTime<Utc>) {
        let mut states = self.lock();
        let state = states.entry(name.to_string()).or_default();
        state.cooldown_until = Some(now + THROTTLE_COOLDOWN);
        tracing::warn!(provider = name, "provider throttled, cooling down");
    }

    pub fn calls_today_at(&self, name: &str, now: DateTime<Utc>) -> u32 {
        let mut states = self.lock();
        let state = states.entry(name.to_string()).or_default();
        roll_day(state, now);
        state.calls_today
    }
}

/// Reset the daily counter when the UTC date has rolled over.
fn roll_day(state: &mut ProviderState, now: DateTime<Utc>) {
    let today = now.date_naive();
    if state.day != Some(today) {
        state.day = Some(today);
        state.calls_today = 0;
    }
}

/// Result of walking the chain: the provider that answered (or `local` when
/// none did), its text, and every error encountered along the way.
#[derive(Debug)]
pub struct ChainOutcome {
    pub provider: String,
    pub text: String,
    pub errors: Vec<String>,
}

impl ChainOutcome {
    pub fn is_exhausted(&self) -> bool {
        self.provider == LOCAL_PROVIDER
    }
}

/// Try each configured provider in order until one returns usable text.
pub async fn complete_with_fallback(
    registry: &ProviderRegistry,
    backend: &dyn CompletionBackend,
    cfg: &PipelineConfig,
    prompt: &str,
) -> ChainOutcome {
    let mut errors = Vec::new();

    for name in &cfg.provider_chain {
        let Some(spec) = ProviderSpec::lookup(name) else {
            errors.push(format!("{name}: unknown provider"));
            continue;
        };
        if spec.requires_key && !cfg.provider_keys.contains_key(name) {
            errors.push(format!("{name}: no API key configured"));
            continue;
        }

        let limit = cfg
            .provider_daily_limits
            .get(name)
            .copied()
            .unwrap_or(spec.default_daily_limit);
        let now = Utc::now();
        if let Some(reason) = registry.unavailable_reason_at(name, limit, now) {
            tracing::debug!(provider = name, reason, "skipping provider");
            errors.push(format!("{name}: {reason}"));
            continue;
        }

        registry.record_attempt_at(name, now);
        let attempt = tokio::time::timeout(spec.timeout, backend.complete(spec, cfg, prompt)).await;
        match attempt {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                tracing::debug!(provider = name, chars = text.len(), "completion succeeded");
                registry.record_success(name);
                return ChainOutcome {
                    provider: name.clone(),
                    text,
                    errors,
                };
            }
            Ok(Ok(_)) => errors.push(format!("{name}: empty completion")),
            Ok(Err(e)) => {
                if e.is_throttle() {
                    registry.record_throttle_at(name, Utc::now());
                }
                errors.push(format!("{name}: {e}"));
            }
            Err(_) => {
                errors.push(format!("{name}: timed out after {}s", spec.timeout.as_secs()));
            }
        }
    }

    tracing::info!(errors = errors.len(), "provider chain exhausted");
    ChainOutcome {
        provider: LOCAL_PROVIDER.to_string(),
        text: String::new(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::backend::{BackendError, MockBackend};
    use super::*;
    use chrono::TimeZone;

    fn keyed_cfg(chain: &[&str]) -> PipelineConfig {
        let mut cfg = PipelineConfig {
            provider_chain: chain.iter().map(|s| s.to_string()).collect(),
            ..PipelineConfig::default()
        };
        for name in chain {
            cfg.provider_keys.insert(name.to_string(), "test-key".into());
        }
        cfg
    }

    #[test]
    fn lookup_knows_the_fixed_set() {
        for name in ["gemini", "groq", "openrouter", "ollama"] {
            assert!(ProviderSpec::lookup(name).is_some());
        }
        assert!(ProviderSpec::lookup("claude").is_none());
    }

    #[test]
    fn throttle_sets_cooldown_that_expires() {
        let registry = ProviderRegistry::new();
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        registry.record_throttle_at("groq", t0);

        let during = t0 + chrono::Duration::seconds(60);
        assert!(registry.unavailable_reason_at("groq", 100, during).is_some());

        let after = t0 + chrono::Duration::seconds(121);
        assert!(registry.unavailable_reason_at("groq", 100, after).is_none());
    }

    #[test]
    fn daily_limit_blocks_and_resets_at_utc_midnight() {
        let registry = ProviderRegistry::new();
        let day1 = Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 0).unwrap();
        for _ in 0..3 {
            registry.record_attempt_at("gemini", day1);
        }
        assert!(registry.unavailable_reason_at("gemini", 3, day1).is_some());

        let day2 = Utc.with_ymd_and_hms(2025, 6, 2, 0, 1, 0).unwrap();
        assert!(registry.unavailable_reason_at("gemini", 3, day2).is_none());
        assert_eq!(registry.calls_today_at("gemini", day2), 0);
    }

    #[tokio::test]
    async fn chain_falls_through_throttled_providers() {
        let registry = ProviderRegistry::new();
        let backend = MockBackend::new(vec![
            Err(BackendError::Throttled("429".into())),
            Err(BackendError::Throttled("quota".into())),
            Ok("[]".into()),
        ]);
        let cfg = keyed_cfg(&["gemini", "groq", "openrouter"]);

        let outcome = complete_with_fallback(&registry, &backend, &cfg, "extract").await;
        assert_eq!(outcome.provider, "openrouter");
        assert_eq!(outcome.text, "[]");
        assert_eq!(outcome.errors.len(), 2);

        // Both throttled providers are now cooling down.
        let now = Utc::now();
        assert!(registry.unavailable_reason_at("gemini", 100, now).is_some());
        assert!(registry.unavailable_reason_at("groq", 100, now).is_some());
    }

    #[tokio::test]
    async fn exhausted_chain_reports_local_with_error_trail() {
        let registry = ProviderRegistry::new();
        let backend = MockBackend::new(vec![
            Err(BackendError::Status(500)),
            Err(BackendError::Malformed),
        ]);
        let cfg = keyed_cfg(&["gemini", "groq"]);

        let outcome = complete_with_fallback(&registry, &backend, &cfg, "extract").await;
        assert!(outcome.is_exhausted());
        assert_eq!(outcome.provider, LOCAL_PROVIDER);
        assert!(outcome.text.is_empty());
        assert_eq!(outcome.errors.len(), 2);
    }

    #[tokio::test]
    async fn keyless_provider_is_skipped_without_a_call() {
        let registry = ProviderRegistry::new();
        let backend = MockBackend::new(vec![Ok("fine".into())]);
        let mut cfg = keyed_cfg(&["gemini", "groq"]);
        cfg.provider_keys.remove("gemini");

        let outcome = complete_with_fallback(&registry, &backend, &cfg, "extract").await;
        assert_eq!(outcome.provider, "groq");
        assert_eq!(backend.prompt_count(), 1);
        assert!(outcome.errors[0].contains("no API key"));
    }

    #[tokio::test]
    async fn unknown_provider_names_are_recorded_not_fatal() {
        let registry = ProviderRegistry::new();
        let backend = MockBackend::new(vec![Ok("ok".into())]);
        let mut cfg = keyed_cfg(&["groq"]);
        cfg.provider_chain.insert(0, "claude".into());

        let outcome = complete_with_fallback(&registry, &backend, &cfg, "extract").await;
        assert_eq!(outcome.provider, "groq");
        assert!(outcome.errors[0].contains("unknown provider"));
    }

    #[tokio::test]
    async fn empty_completion_falls_through() {
        let registry = ProviderRegistry::new();
        let backend = MockBackend::new(vec![Ok("   ".into()), Ok("real text".into())]);
        let cfg = keyed_cfg(&["gemini", "groq"]);

        let outcome = complete_with_fallback(&registry, &backend, &cfg, "extract").await;
        assert_eq!(outcome.provider, "groq");
        assert!(outcome.errors[0].contains("empty completion"));
    }

    #[tokio::test]
    async fn ollama_needs_no_key() {
        let registry = ProviderRegistry::new();
        let backend = MockBackend::new(vec![Ok("local model says hi".into())]);
        let cfg = PipelineConfig {
            provider_chain: vec!["ollama".into()],
            ..PipelineConfig::default()
        };

        let outcome = complete_with_fallback(&registry, &backend, &cfg, "extract").await;
        assert_eq!(outcome.provider, "ollama");
    }
}
