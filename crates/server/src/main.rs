//! relaycache host bridge.
//!
//! Reads newline-delimited JSON signals on stdin and writes one JSON reply
//! line per signal on stdout. Logging goes to stderr to keep stdout clean.

use std::sync::Arc;

use anyhow::{Context, Result};
use relaycache_client::{CacheWorker, FetchClient, FetchConfig, Network};
use relaycache_core::{AppConfig, CacheStore};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;

use handler::{Envelope, Reply, SignalHandler, send_reply};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(
        origin = %config.origin,
        version = %config.cache_version,
        db_path = %config.db_path.display(),
        "starting relaycache"
    );

    let store = CacheStore::open(&config.db_path, config.cache_names()).await?;
    let network: Arc<dyn Network> = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let worker = Arc::new(CacheWorker::new(&config, store, network.clone())?);
    let handler = Arc::new(SignalHandler::new(worker, network));

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let envelope = match Envelope::parse(&line) {
            Ok(envelope) => envelope,
            Err((id, err)) => {
                tracing::warn!(error = %err, "rejected signal line");
                if !send_reply(&tx, &Reply::failure(id, err)) {
                    break;
                }
                continue;
            }
        };

        if envelope.is_fetch() {
            let handler = handler.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let reply = handler.handle(envelope).await;
                send_reply(&tx, &reply);
            });
        } else {
            let reply = handler.handle(envelope).await;
            if !send_reply(&tx, &reply) {
                break;
            }
        }
    }

    tracing::info!("input finished, draining replies");
    drop(tx);
    writer.await.context("reply writer panicked")??;

    Ok(())
}
