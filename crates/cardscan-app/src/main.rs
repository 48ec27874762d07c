// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cardscan — ID card capture pipeline
//
// Entry point. Initialises logging and configuration, then replays a
// directory of recorded camera frames through one verification session.
//
// Usage:
//   cardscan <frames-dir> [--out <dir>] [--confirm <front> <back> <face>]
//
// Settings are read from the JSON file named by CARDSCAN_CONFIG, if set.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use cardscan_core::error::{Result, ScanError};
use cardscan_core::human_errors::humanize_error;
use cardscan_core::ScanConfig;
use cardscan_session::{MemorySessionStore, ScanService, SessionStore, SqliteSessionStore};
use clap::Parser;

use services::collaborators::{LogNotifier, ThumbnailMatcher};
use services::data_dir;
use services::replay::{self, ConfirmInputs};

const CONFIG_ENV: &str = "CARDSCAN_CONFIG";

/// Replay recorded camera frames through one capture session.
#[derive(Parser, Debug)]
#[command(name = "cardscan", author, version, about, long_about = None)]
struct Args {
    /// Directory of recorded frames, replayed in file-name order
    #[arg(value_name = "FRAMES_DIR")]
    frames_dir: PathBuf,

    /// Where rectified captures are written (defaults to the data directory)
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Confirm the scan with the front, back and face images
    #[arg(long, num_args = 3, value_names = ["FRONT", "BACK", "FACE"])]
    confirm: Option<Vec<PathBuf>>,
}

impl Args {
    fn confirm_inputs(&self) -> Option<ConfirmInputs> {
        match self.confirm.as_deref() {
            Some([front, back, face]) => Some(ConfirmInputs {
                front: front.clone(),
                back: back.clone(),
                face: face.clone(),
            }),
            _ => None,
        }
    }
}

fn load_config() -> Result<ScanConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            tracing::info!(path = ?path, "loading configuration");
            ScanConfig::load(path)
        }
        None => Ok(ScanConfig::default()),
    }
}

fn run_with<S: SessionStore>(store: S, config: &ScanConfig, args: &Args) -> Result<()> {
    let service = ScanService::new(
        store,
        config,
        Arc::new(ThumbnailMatcher),
        Arc::new(LogNotifier),
    );

    let out_dir = match &args.out {
        Some(dir) => dir.clone(),
        None => data_dir::data_subdir("captures")?,
    };
    let frames = replay::frame_files(&args.frames_dir)?;
    if frames.is_empty() {
        return Err(ScanError::InvalidRequest(format!(
            "no frames found in {}",
            args.frames_dir.display()
        )));
    }

    let summary = replay::replay(&service, &frames, &out_dir, args.confirm_inputs().as_ref())?;
    println!(
        "session {}: {} frames, {} rejected, locked {:?}, status {}",
        summary.session,
        summary.frames_read,
        summary.frames_rejected,
        summary.locked,
        summary.status.keyword()
    );
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let config = load_config()?;

    match &config.database_path {
        Some(path) => run_with(SqliteSessionStore::open(path)?, &config, args),
        None => run_with(MemorySessionStore::new(), &config, args),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Cardscan starting");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let human = humanize_error(&err);
            tracing::error!(error = %err, class = ?human.class, "cardscan failed");
            eprintln!("{}\n{}", human.message, human.suggestion);
            ExitCode::FAILURE
        }
    }
}
