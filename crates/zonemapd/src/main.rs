use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use zonemap_core::Tuning;
use zonemap_store::Store;

mod config;
mod protocol;
mod service;

use protocol::{Request, Response};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::Config::from_env();
    tracing::info!(db = %cfg.db_path.display(), "zonemapd starting");

    if let Some(parent) = cfg.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }

    let tuning = Tuning::load(&cfg.tuning_path)
        .with_context(|| format!("loading tuning from {}", cfg.tuning_path.display()))?;
    let store = Store::open(&cfg.db_path)
        .with_context(|| format!("opening database {}", cfg.db_path.display()))?;

    let handle = service::spawn_service(store, tuning, cfg.min_frame_interval());
    tracing::info!(max_frame_hz = cfg.max_frame_hz, "zonemapd ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    // One JSON request per line in, one JSON response per line out.
    // EOF on stdin is the orderly shutdown signal from the frontend.
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle.call(request).await?,
            Err(e) => Response::Error {
                message: format!("bad request: {e}"),
            },
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    tracing::info!("zonemapd shutting down");
    Ok(())
}
