pub mod op;
pub mod ops;

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "km",
    version,
    about = "Versioned document store for regulations, SOPs, policies and training material"
)]
pub struct Cli {
    /// km home directory (default: ~/.km)
    #[arg(long, global = true, env = "KM_CONFIG_PATH")]
    pub config_path: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (default: from config)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: ops::Command,
}
