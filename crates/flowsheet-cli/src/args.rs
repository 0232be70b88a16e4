//! Command-line argument definitions for the flowsheet CLI.
//!
//! This module defines the [`Args`] structure parsed from the command line
//! using [`clap`]. Arguments name the fragment files, configuration file
//! selection, strictness and logging verbosity.

use clap::Parser;

/// Command-line arguments for the flowsheet resolver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Fragment files (JSON element trees), applied in the given order
    #[arg(required = true, help = "Fragment files, base first")]
    pub fragments: Vec<String>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Report unknown attributes as warnings instead of failing
    #[arg(long)]
    pub lenient: bool,

    /// Write the merged model as JSON to this path
    #[arg(long)]
    pub save_merged: Option<String>,
}
