// Runs the line follower over a directory of still frames and logs the velocity
// commands it would send. Usage: line_follower <frames_dir> [config.json]

use anyhow::{Context, Result};
use line_follower::publisher::{ChannelPublisher, spawn_log_transport};
use line_follower::source::DirectorySource;
use line_follower::{FollowerConfig, LinePipeline, load_config, run_follower};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: line_follower <frames_dir> [config.json]");
        return Ok(());
    }
    let frames_dir = PathBuf::from(&args[1]);
    let config = match args.get(2) {
        Some(path) => load_config(Path::new(path))?,
        None => FollowerConfig::default(),
    };
    log::info!("policy {:?}, search budget {}", config.policy, config.search_attempt_budget);

    // --- 2. Frame source and command transport ---
    let mut source = DirectorySource::new(&frames_dir)
        .with_context(|| format!("cannot list frames in {}", frames_dir.display()))?;
    let (publisher, receiver) = ChannelPublisher::new();
    let transport = spawn_log_transport(receiver);

    // --- 3. Follow ---
    let max_steps = config.max_steps;
    let mut pipeline = LinePipeline::new(config);
    let summary = tokio::task::spawn_blocking(move || {
        run_follower(&mut source, &mut pipeline, &publisher, max_steps)
    })
    .await
    .context("follower task failed")?;

    let published = transport.await.context("transport task failed")?;
    log::info!(
        "{} frame(s): {} tracking, {} searching, {} idle, {} skipped; {published} command(s) sent{}",
        summary.frames,
        summary.tracking,
        summary.searching,
        summary.idle,
        summary.skipped,
        if summary.halted { ", halted" } else { "" }
    );
    Ok(())
}
