//! OCR fallback engine.
//!
//! Cloud OCR first (primary engine, then the secondary engine mode when the
//! first result is empty or garbage), then a local `tesseract` binary for
//! image/PDF payloads when the cloud text is still unusable. Every failure
//! path degrades to an empty string — OCR is never fatal to the pipeline.

use std::path::PathBuf;
use std::time::Duration;

use base64::Engine as _;
use futures_util::future::join_all;
use once_cell::sync::Lazy;

use crate::config::PipelineConfig;
use crate::pipeline::format::is_garbage_text;

/// Cloud call ceiling; the provider itself usually answers well under this.
const CLOUD_OCR_TIMEOUT: Duration = Duration::from_secs(25);
/// Local binary ceiling, generous for multi-page TIFFs.
const LOCAL_OCR_TIMEOUT: Duration = Duration::from_secs(40);
/// Cloud text shorter than this still triggers the local fallback.
const MIN_USEFUL_CLOUD_CHARS: usize = 80;
/// Hard cap on concurrent embedded-image recognitions.
const MAX_OCR_BATCH: usize = 12;

/// Local binary availability, resolved once per process.
static LOCAL_OCR_BINARY: Lazy<Option<PathBuf>> = Lazy::new(|| {
    let found = which::which("tesseract").ok();
    match &found {
        Some(path) => tracing::info!(path = %path.display(), "local OCR binary available"),
        None => tracing::info!("local OCR binary not found, cloud OCR only"),
    }
    found
});

/// Extensions the local binary can plausibly handle.
fn local_ocr_eligible(extension: &str) -> bool {
    matches!(
        extension,
        "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" | "gif" | "webp" | "pdf"
    )
}

/// Recover text from an image (or scanned-PDF) payload.
///
/// Returns the longer of the cloud and local results; empty string when
/// every path fails or is unconfigured.
pub async fn recognize(bytes: &[u8], file_name: &str, cfg: &PipelineConfig) -> String {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let mut cloud = String::new();
    if cfg.ocr_api_key.is_some() {
        if let Some(first) = cloud_recognize(bytes, &extension, cfg, 1).await {
            cloud = first;
        }
        if cloud.trim().is_empty() || is_garbage_text(&cloud) {
            if let Some(second) = cloud_recognize(bytes, &extension, cfg, 2).await {
                cloud = prefer_result(cloud, second);
            }
        }
    }

    let cloud_unusable = cloud.trim().is_empty()
        || is_garbage_text(&cloud)
        || cloud.chars().count() < MIN_USEFUL_CLOUD_CHARS;

    let mut local = String::new();
    if cloud_unusable && !cfg.disable_local_ocr && local_ocr_eligible(&extension) {
        local = local_recognize(bytes, &extension, cfg).await.unwrap_or_default();
    }

    if local.chars().count() > cloud.chars().count() {
        local
    } else {
        cloud
    }
}

/// OCR a set of embedded images in bounded concurrent batches.
///
/// Peak outstanding requests never exceed the configured batch size (capped).
pub async fn recognize_batch(images: &[Vec<u8>], cfg: &PipelineConfig) -> Vec<String> {
    let batch = cfg.ocr_batch_size.clamp(1, MAX_OCR_BATCH);
    let mut results = Vec::with_capacity(images.len());
    for group in images.chunks(batch) {
        let futures = group.iter().enumerate().map(|(i, image)| {
            let name = format!("embedded_{i}.png");
            async move { recognize(image, &name, cfg).await }
        });
        results.extend(join_all(futures).await);
    }
    results
}

/// Pick the better of two OCR results: non-garbage wins, then length.
fn prefer_result(current: String, candidate: String) -> String {
    let current_ok = !current.trim().is_empty() && !is_garbage_text(&current);
    let candidate_ok = !candidate.trim().is_empty() && !is_garbage_text(&candidate);
    match (current_ok, candidate_ok) {
        (false, true) => candidate,
        (true, false) => current,
        _ => {
            if candidate.chars().count() > current.chars().count() {
                candidate
            } else {
                current
            }
        }
    }
}

/// One cloud OCR call with an explicit engine selector.
async fn cloud_recognize(
    bytes: &[u8],
    extension: &str,
    cfg: &PipelineConfig,
    engine: u8,
) -> Option<String> {
    let api_key = cfg.ocr_api_key.as_deref()?;

    let mime = match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "image/png",
    };
    let payload = format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    );

    let client = reqwest::Client::builder()
        .timeout(CLOUD_OCR_TIMEOUT)
        .build()
        .ok()?;

    let form = reqwest::multipart::Form::new()
        .text("apikey", api_key.to_string())
        .text("language", cfg.ocr_language.clone())
        .text("OCREngine", engine.to_string())
        .text("scale", "true")
        .text("base64Image", payload);

    let response = match client.post(&cfg.ocr_endpoint).multipart(form).send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(engine, error = %e, "cloud OCR request failed");
            return None;
        }
    };
    if !response.status().is_success() {
        tracing::debug!(engine, status = %response.status(), "cloud OCR non-success");
        return None;
    }

    let body: serde_json::Value = response.json().await.ok()?;
    if body
        .get("IsErroredOnProcessing")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        tracing::debug!(engine, "cloud OCR reported processing error");
        return None;
    }

    let parsed = body
        .get("ParsedResults")?
        .as_array()?
        .iter()
        .filter_map(|r| r.get("ParsedText").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("\n");
    Some(parsed)
}

/// Run the local OCR binary over a temp copy of the payload.
///
/// The temp directory is removed on every exit path via RAII.
async fn local_recognize(bytes: &[u8], extension: &str, cfg: &PipelineConfig) -> Option<String> {
    let binary = LOCAL_OCR_BINARY.as_ref()?;

    let dir = tempfile::tempdir().ok()?;
    let input = dir.path().join(format!("input.{extension}"));
    let output_base = dir.path().join("out");
    tokio::fs::write(&input, bytes).await.ok()?;

    let full_args: Vec<std::ffi::OsString> = vec![
        input.clone().into(),
        output_base.clone().into(),
        "-l".into(),
        cfg.ocr_language.clone().into(),
        "--psm".into(),
        "3".into(),
    ];
    let minimal_args: Vec<std::ffi::OsString> = vec![input.into(), output_base.clone().into()];

    let mut succeeded = run_binary(binary, &full_args).await;
    if !succeeded {
        // Older builds reject --psm/-l combinations; retry bare.
        succeeded = run_binary(binary, &minimal_args).await;
    }
    if !succeeded {
        return None;
    }

    let text_path = output_base.with_extension("txt");
    tokio::fs::read_to_string(&text_path).await.ok()
}

async fn run_binary(binary: &PathBuf, args: &[std::ffi::OsString]) -> bool {
    let child = tokio::process::Command::new(binary)
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
    match tokio::time::timeout(LOCAL_OCR_TIMEOUT, child).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "local OCR spawn failed");
            false
        }
        Err(_) => {
            tracing::debug!("local OCR timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_cfg() -> PipelineConfig {
        PipelineConfig {
            ocr_api_key: None,
            disable_local_ocr: true,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn eligible_extensions() {
        assert!(local_ocr_eligible("png"));
        assert!(local_ocr_eligible("pdf"));
        assert!(!local_ocr_eligible("docx"));
        assert!(!local_ocr_eligible(""));
    }

    #[test]
    fn prefer_non_garbage_over_longer_garbage() {
        let readable = "The mitochondria is the powerhouse of the cell. ".repeat(4);
        let garbage = "@#$%^& *)(*&^ %$#@! ~~~ ".repeat(40);
        assert_eq!(prefer_result(garbage.clone(), readable.clone()), readable);
        assert_eq!(prefer_result(readable.clone(), garbage), readable);
    }

    #[test]
    fn prefer_longer_when_both_usable() {
        let short = "Photosynthesis converts light into chemical energy in plants and it matters a great deal for life.".to_string();
        let long = format!("{short} Cellular respiration then releases that energy again when the organism needs it.");
        assert_eq!(prefer_result(short, long.clone()), long);
    }

    #[tokio::test]
    async fn unconfigured_recognize_is_empty_not_fatal() {
        let text = recognize(&[0u8; 32], "scan.png", &offline_cfg()).await;
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn batch_preserves_order_and_count() {
        let images: Vec<Vec<u8>> = (0..5).map(|i| vec![i as u8; 8]).collect();
        let results = recognize_batch(&images, &offline_cfg()).await;
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.is_empty()));
    }

    #[test]
    fn batch_size_is_capped() {
        let cfg = PipelineConfig {
            ocr_batch_size: 50,
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.ocr_batch_size.clamp(1, MAX_OCR_BATCH), 12);
    }
}
