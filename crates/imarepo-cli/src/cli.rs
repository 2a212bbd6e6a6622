use std::path::PathBuf;

use clap::Parser;

/// Expand RPM repository metadata with IMA file digests.
#[derive(Parser)]
#[command(name = "imarepo", version, about)]
pub struct Args {
    /// Path of the repository
    #[arg(value_name = "REPO")]
    pub repository: PathBuf,

    /// Allow N extraction jobs at once (defaults to the number of CPUs)
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Register the imadata artifact in repomd.xml after building it
    #[arg(short, long)]
    pub modify: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json: bool,
}
