use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "storlink-agent", version, about = "Local transfers through the storlink storage interface")]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/storlink/agent.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Action {
    /// Store SOURCE (`-` for stdin) at PATH.
    Put {
        source: String,
        path: String,
        /// Offset in PATH at which the data lands.
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Copy PATH into OUTPUT.
    Get {
        path: String,
        output: PathBuf,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Bytes to copy; the rest of the object when omitted.
        #[arg(long)]
        length: Option<u64>,
    },
    /// Print the digest of PATH.
    Cksum {
        path: String,
        #[arg(long, short, default_value = "md5")]
        algorithm: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long)]
        length: Option<u64>,
    },
}
