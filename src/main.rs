//! Cardify extraction server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cardify::api::{router::api_router, ApiContext};
use cardify::config::{self, PipelineConfig};
use cardify::pipeline::providers::backend::HttpBackend;
use cardify::pipeline::Pipeline;
use cardify::store::Store;

#[derive(Parser, Debug)]
#[command(name = "cardify-serve", version, about = "Flashcard extraction server")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1", env = "CARDIFY_HOST")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8807, env = "CARDIFY_PORT")]
    port: u16,

    /// Data directory for the entry database. Defaults to ~/Cardify.
    #[arg(long, env = "CARDIFY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Run without persistence; extraction results are returned only.
    #[arg(long, default_value_t = false)]
    no_store: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let args = Args::parse();
    let base_config = PipelineConfig::from_env();

    let store = if args.no_store {
        None
    } else {
        let data_dir = args.data_dir.unwrap_or_else(config::app_data_dir);
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join("cardify.db");
        tracing::info!(path = %db_path.display(), "opening entry store");
        Some(Store::open(&db_path)?)
    };

    let pipeline = Arc::new(Pipeline::new(Box::new(HttpBackend::new())));
    let ctx = ApiContext::new(pipeline, base_config, store);
    let app = api_router(ctx);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, version = config::APP_VERSION, "cardify-serve listening");
    axum::serve(listener, app).await?;
    Ok(())
}
