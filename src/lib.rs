//! Cardify turns study documents into reviewable flashcard entries.
//!
//! The heart of the crate is [`pipeline`]: format-aware text recovery with
//! OCR fallback, deterministic pair heuristics, a multi-provider AI stage
//! with cooldown and daily-budget enforcement, instruction filtering, and a
//! confidence-based quality gate. [`api`] exposes it over HTTP and [`store`]
//! persists accepted entries.

pub mod api;
pub mod config;
pub mod pipeline;
pub mod store;
pub mod taxonomy;
