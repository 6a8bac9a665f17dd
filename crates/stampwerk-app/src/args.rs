// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "stampwerk", version)]
#[command(about = "Stamp every page of a PDF with a tracking barcode and append a summary table", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (config, ledger, uploads)
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stamp one PDF and print the outcome as JSON
    Stamp {
        file: PathBuf,

        /// Declared content type (defaults to one inferred from the extension)
        #[arg(long, value_name = "MIME")]
        content_type: Option<String>,
    },

    /// Stamp several PDFs concurrently
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the run whose output carries an identifier
    Lookup { identifier: String },

    /// List recent runs, newest first
    Recent {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },

    /// Check a stored output against its recorded SHA-256
    Verify { identifier: String },

    /// Render a standalone barcode PNG
    Barcode {
        text: String,

        #[arg(short, long, value_name = "FILE.png")]
        output: PathBuf,
    },

    /// Print the effective configuration
    Config {
        /// Write the defaults to the data directory first
        #[arg(long)]
        init: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stamp_with_global_flags() {
        let cli = Cli::try_parse_from([
            "stampwerk",
            "stamp",
            "scan.pdf",
            "--content-type",
            "application/pdf",
            "--data-dir",
            "/tmp/sw",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/sw")));
        match cli.command {
            Commands::Stamp { file, content_type } => {
                assert_eq!(file, PathBuf::from("scan.pdf"));
                assert_eq!(content_type.as_deref(), Some("application/pdf"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn batch_requires_files() {
        assert!(Cli::try_parse_from(["stampwerk", "batch"]).is_err());
    }

    #[test]
    fn recent_defaults_to_ten() {
        let cli = Cli::try_parse_from(["stampwerk", "recent"]).unwrap();
        assert!(matches!(cli.command, Commands::Recent { limit: 10 }));
    }
}
