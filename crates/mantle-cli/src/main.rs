//! # mantle — Mantle CLI
//!
//! Infrastructure as code: plan and apply configuration changes against
//! real infrastructure and track them in state.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::Context as _;
use mantle_cli::{Meta, Streams};
use mantle_common::constants::{LOG_ENV, LOG_FORMAT_ENV};
use tracing_subscriber::EnvFilter;

/// Logging goes to stderr so it never mixes with command output.
fn init_tracing() {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .map_or_else(|| EnvFilter::new("off"), EnvFilter::new);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Applies a leading `--chdir=DIR` and returns the remaining arguments.
fn apply_chdir(mut args: Vec<String>) -> anyhow::Result<Vec<String>> {
    let Some(dir) = args.first().and_then(|a| a.strip_prefix("--chdir=")).map(PathBuf::from) else {
        return Ok(args);
    };
    std::env::set_current_dir(&dir)
        .with_context(|| format!("failed to switch to directory {}", dir.display()))?;
    tracing::debug!(dir = %dir.display(), "changed working directory");
    let _ = args.remove(0);
    Ok(args)
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = apply_chdir(std::env::args().skip(1).collect())?;
    let cwd = std::env::current_dir().context("failed to determine the working directory")?;
    let env: BTreeMap<String, String> = std::env::vars().collect();
    let meta = Meta::new(cwd, Streams::system(), env);

    let stop = meta.stop_flag();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .context("failed to install the interrupt handler")?;

    let code = mantle_cli::run(&meta, args);
    std::process::exit(code);
}
