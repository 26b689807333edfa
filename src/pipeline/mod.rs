//! Document-to-flashcard extraction pipeline.
//!
//! Stages, in data-flow order: format-aware text recovery ([`format`], with
//! [`ocr`] fallback), deterministic pair extraction ([`heuristics`]),
//! provider-chain AI extraction ([`providers`], [`ai`], [`lenient`]),
//! instruction filtering ([`filter`]), shape profiling ([`profile`]), and
//! the confidence gate ([`quality`]). [`orchestrator`] sequences them.

pub mod ai;
pub mod filter;
pub mod format;
pub mod heuristics;
pub mod lenient;
pub mod ocr;
pub mod office;
pub mod orchestrator;
pub mod pdf;
pub mod profile;
pub mod providers;
pub mod quality;
pub mod types;

pub use orchestrator::Pipeline;
pub use types::{CandidateEntry, ExtractOutcome, RawDocument};
