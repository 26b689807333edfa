//! HTTP surface: one extraction entry point (multipart or raw text) plus a
//! health endpoint.

pub mod error;
pub mod router;

use std::sync::{Arc, Mutex};

use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::store::Store;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<Pipeline>,
    pub base_config: PipelineConfig,
    /// Absent when the server runs extraction-only.
    pub store: Option<Arc<Mutex<Store>>>,
}

impl ApiContext {
    pub fn new(pipeline: Arc<Pipeline>, base_config: PipelineConfig, store: Option<Store>) -> Self {
        Self {
            pipeline,
            base_config,
            store: store.map(|s| Arc::new(Mutex::new(s))),
        }
    }
}
