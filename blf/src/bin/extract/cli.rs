use std::path::PathBuf;

use clap::{Parser, ValueHint};
use url::Url;

/// Extracts Ethereum data as described by an extraction plan
#[derive(Parser)]
#[command(version, propagate_version = true)]
pub(crate) struct Cli {
    /// The JSON extraction plan to run.
    #[arg(short = 'p', long, env = "BLF_PLAN", value_hint = ValueHint::FilePath)]
    pub(crate) plan: PathBuf,

    /// The HTTP endpoint of the Ethereum node.
    #[arg(short = 'u', long, env = "BLF_RPC_URL", value_hint = ValueHint::Url)]
    pub(crate) rpc_url: Url,

    /// The folder receiving exported files and `error.log`. Must exist.
    #[arg(short = 'o', long, env = "BLF_OUTPUT_DIR", default_value = ".", value_hint = ValueHint::DirPath)]
    pub(crate) output_dir: PathBuf,

    /// Stop the run at the first error instead of logging it and moving on.
    #[arg(long, env = "BLF_ABORT_ON_EXCEPTION")]
    pub(crate) abort_on_exception: bool,

    /// Milliseconds to wait between polls while the chain head is behind the
    /// block range.
    #[arg(long, env = "BLF_POLL_INTERVAL", default_value_t = 3000)]
    pub(crate) poll_interval: u64,
}
