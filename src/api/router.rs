//! Route table and extraction handlers.

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::api::error::ApiError;
use crate::api::ApiContext;
use crate::config::{ExtractSettings, PipelineConfig, APP_VERSION};
use crate::pipeline::types::{ExtractOutcome, RawDocument};

/// Uploads above this size are rejected before the pipeline runs.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn api_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/extract", post(extract_file))
        .route("/api/extract/text", post(extract_text))
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
}

async fn health(State(ctx): State<ApiContext>) -> Json<serde_json::Value> {
    let providers: Vec<serde_json::Value> = ctx
        .base_config
        .provider_chain
        .iter()
        .map(|name| {
            let configured = crate::pipeline::providers::ProviderSpec::lookup(name)
                .is_some_and(|spec| {
                    !spec.requires_key || ctx.base_config.provider_keys.contains_key(name)
                });
            json!({ "name": name, "configured": configured })
        })
        .collect();
    Json(json!({
        "status": "ok",
        "version": APP_VERSION,
        "store": ctx.store.is_some(),
        "providers": providers,
    }))
}

/// Multipart upload: one `file` part plus an optional JSON `settings` part.
async fn extract_file(
    State(ctx): State<ApiContext>,
    mut multipart: Multipart,
) -> Result<Json<ExtractOutcome>, ApiError> {
    let mut file: Option<RawDocument> = None;
    let mut settings = ExtractSettings::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart payload: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.bin").to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .or_else(|| mime_guess::from_path(&file_name).first().map(|m| m.to_string()));
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed reading upload: {e}")))?;
                file = Some(RawDocument::new(bytes.to_vec(), file_name, content_type));
            }
            "settings" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed reading settings: {e}")))?;
                settings = serde_json::from_str(&raw)
                    .map_err(|e| ApiError::BadRequest(format!("invalid settings JSON: {e}")))?;
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    let doc = file.ok_or(ApiError::MissingFile)?;
    run_and_persist(&ctx, doc, settings).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextPayload {
    text: String,
    #[serde(default)]
    settings: ExtractSettings,
}

/// Raw-text extraction without a file upload.
async fn extract_text(
    State(ctx): State<ApiContext>,
    Json(payload): Json<TextPayload>,
) -> Result<Json<ExtractOutcome>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".into()));
    }
    let doc = RawDocument::new(
        payload.text.into_bytes(),
        "input.txt",
        Some("text/plain".to_string()),
    );
    run_and_persist(&ctx, doc, payload.settings).await
}

async fn run_and_persist(
    ctx: &ApiContext,
    doc: RawDocument,
    settings: ExtractSettings,
) -> Result<Json<ExtractOutcome>, ApiError> {
    let cfg = ctx.base_config.merged(&settings);
    let outcome = ctx.pipeline.run(doc, cfg.clone()).await;

    // Nothing is written for failed runs or strict no-match results.
    if outcome.ok && outcome.strict_no_match.is_none() {
        persist(ctx, &cfg, &outcome)?;
    }
    Ok(Json(outcome))
}

fn persist(ctx: &ApiContext, cfg: &PipelineConfig, outcome: &ExtractOutcome) -> Result<(), ApiError> {
    let (Some(category), Some(file)) = (&cfg.category, &cfg.file) else {
        return Ok(());
    };
    let Some(store) = &ctx.store else {
        return Err(ApiError::StoreUnavailable);
    };

    let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
    let category_id = store
        .ensure_category(category)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let file_id = store
        .ensure_file(&category_id, file)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let written = store
        .append_entries(&file_id, &outcome.entries)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    tracing::info!(category, file, written, "entries persisted");
    Ok(())
}
