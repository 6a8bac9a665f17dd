// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stampwerk: PDF tracking-barcode stamper
//
// Entry point. Initialises logging, opens the data directory, and dispatches
// the requested command. Results go to stdout as JSON; failures go to stderr
// as a human-readable message with a severity-dependent exit code.

mod args;
mod services;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use stampwerk_core::error::{Result, StampwerkError};
use stampwerk_core::human_errors::{Severity, humanize_error};
use stampwerk_core::types::{Upload, mime_from_extension};
use stampwerk_core::StampConfig;

use args::{Cli, Commands};
use services::data_dir;
use services::stamp_service::StampService;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    tracing::debug!("Stampwerk starting");

    match run(cli).await {
        Ok(code) => code,
        Err(e) => report(&e),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let dir = data_dir::data_dir(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Config { init } => {
            let config = if init {
                let defaults = StampConfig::default();
                defaults.persist(&dir)?;
                tracing::info!(path = %dir.display(), "default configuration written");
                defaults
            } else {
                StampConfig::load(&dir).unwrap_or_default()
            };
            print_json(&config)?;
        }

        Commands::Stamp { file, content_type } => {
            let service = StampService::init(&dir)?;
            let upload = read_upload(&file, content_type)?;
            print_json(&service.stamp(upload).await?)?;
        }

        Commands::Batch { files } => {
            let service = StampService::init(&dir)?;
            let mut uploads = Vec::with_capacity(files.len());
            for file in &files {
                uploads.push(read_upload(file, None)?);
            }

            let mut failed = false;
            let mut entries = Vec::with_capacity(files.len());
            for (file, result) in files.iter().zip(service.batch(uploads).await) {
                let entry = match result {
                    Ok(outcome) => serde_json::json!({ "file": file, "outcome": outcome }),
                    Err(e) => {
                        failed = true;
                        serde_json::json!({ "file": file, "error": humanize_error(&e) })
                    }
                };
                entries.push(entry);
            }
            print_json(&entries)?;
            if failed {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Lookup { identifier } => {
            let service = StampService::init(&dir)?;
            match service.lookup(&identifier)? {
                Some(record) => print_json(&record)?,
                None => return Ok(not_found(&identifier)),
            }
        }

        Commands::Recent { limit } => {
            let service = StampService::init(&dir)?;
            print_json(&service.recent(limit)?)?;
        }

        Commands::Verify { identifier } => {
            let service = StampService::init(&dir)?;
            match service.verify(&identifier)? {
                Some(verified) => print_json(&verified)?,
                None => return Ok(not_found(&identifier)),
            }
        }

        Commands::Barcode { text, output } => {
            let service = StampService::init(&dir)?;
            let png = service.render_barcode(&text)?;
            std::fs::write(&output, png)?;
            tracing::info!(path = %output.display(), "barcode written");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn read_upload(file: &Path, content_type: Option<String>) -> Result<Upload> {
    let bytes = std::fs::read(file)?;
    let content_type = content_type.unwrap_or_else(|| {
        let ext = file.extension().and_then(|e| e.to_str()).unwrap_or_default();
        mime_from_extension(ext).to_owned()
    });
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Upload::new(file_name, content_type, bytes))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn not_found(identifier: &str) -> ExitCode {
    eprintln!("No run has issued {identifier}.");
    ExitCode::FAILURE
}

/// Print a plain-English error and pick the exit code: 2 for rejected
/// uploads, 1 for everything else.
fn report(err: &StampwerkError) -> ExitCode {
    tracing::error!(kind = err.kind(), error = %err, "command failed");
    let human = humanize_error(err);
    eprintln!("{}\n{}", human.message, human.suggestion);
    match human.severity {
        Severity::Rejected => ExitCode::from(2),
        Severity::Transient | Severity::Permanent => ExitCode::FAILURE,
    }
}
