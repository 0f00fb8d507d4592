use std::path::PathBuf;

use clap::Parser;

/// Fetch one URL through the callbridge call adapters.
#[derive(Debug, Parser)]
#[command(name = "callbridge")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Print status line, headers and body, even for non-2xx responses.
    #[arg(long)]
    pub envelope: bool,

    /// Read transport settings from a TOML file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Absolute URL, or a path resolved against the configured base URL.
    pub url: String,
}
