//! Example: follow the irreversible head and stream operation tallies as JSON lines.
//!
//! Usage: cargo run -p optally --example optally_monitor -- [--endpoint URL] [--interval-ms N]
//!        [--state-dir DIR] [--clear-cursor-on-reset] [--accept-empty-blocks] [--start]
//!
//! Control messages are read from stdin, one JSON object per line, e.g.
//! `{"type":"togglePauseState","paused":false}` or `{"type":"getData"}`.
//! Events and replies are written to stdout; logs go to stderr (RUST_LOG).
//! Closing stdin stops control input only; the process runs until ctrl-c.

use anyhow::Context;
use optally::control::{channel, forward_lines, serve};
use optally::{EmptyBlockPolicy, FileSnapshotStore, HttpRpcClient, Monitor, MonitorConfig, ResetPolicy};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

fn parse_args() -> anyhow::Result<(MonitorConfig, bool)> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = MonitorConfig::default();
    let mut start = false;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--endpoint" => {
                i += 1;
                config.endpoint = args.get(i).cloned().context("--endpoint needs a URL")?;
            }
            "--interval-ms" => {
                i += 1;
                let ms: u64 = args
                    .get(i)
                    .context("--interval-ms needs a value")?
                    .parse()
                    .context("--interval-ms")?;
                config.poll_interval = Duration::from_millis(ms);
            }
            "--state-dir" => {
                i += 1;
                config.state_dir = PathBuf::from(args.get(i).context("--state-dir needs a path")?);
            }
            "--clear-cursor-on-reset" => config.reset_policy = ResetPolicy::ClearCursor,
            "--accept-empty-blocks" => config.retry.empty_block_policy = EmptyBlockPolicy::Accept,
            "--start" => start = true,
            other => anyhow::bail!("unknown argument: {}", other),
        }
        i += 1;
    }
    Ok((config, start))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("optally=info")))
        .with_writer(std::io::stderr)
        .init();
    let (config, start) = match parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!(
                "Usage: optally_monitor [--endpoint URL] [--interval-ms N] [--state-dir DIR] \
                 [--clear-cursor-on-reset] [--accept-empty-blocks] [--start]"
            );
            std::process::exit(1);
        }
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, start))
}

async fn run(config: MonitorConfig, start: bool) -> anyhow::Result<()> {
    let source = HttpRpcClient::new(config.endpoint.clone(), config.request_timeout)?;
    let store = FileSnapshotStore::new(&config.state_dir, &config.state_key);
    tracing::info!(endpoint = %config.endpoint, state = %store.path().display(), "starting");
    let monitor = Arc::new(Monitor::restore(source, store, &config).await);
    if start {
        monitor.set_paused(false).await;
    }

    let mut events = monitor.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(reason = %e, "could not encode event"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let (control, rx) = channel(32);
    tokio::spawn(serve(Arc::clone(&monitor), rx));
    tokio::spawn(Arc::clone(&monitor).run());

    tokio::spawn(async move {
        let input = BufReader::new(tokio::io::stdin());
        if let Err(e) = forward_lines(input, &mut tokio::io::stdout(), &control).await {
            tracing::warn!(reason = %e, "control input stopped");
        }
    });

    tokio::signal::ctrl_c().await.context("listen for ctrl-c")?;
    tracing::info!("interrupted");
    Ok(())
}
