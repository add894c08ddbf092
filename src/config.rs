// Command-line and environment configuration

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "gramchart")]
#[command(version, about = "Chart rendering tools served over MCP stdio", long_about = None)]
pub struct Args {
    /// Directory for charts saved without an explicit outputPath (default: ./charts)
    #[arg(long, env = "GRAMCHART_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Never open saved charts in the system viewer
    #[arg(long, env = "GRAMCHART_NO_OPEN")]
    pub no_open: bool,

    /// Log filter used when RUST_LOG is unset (e.g. "debug", "gramchart=trace")
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Settings shared by every tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub output_dir: Option<PathBuf>,
    /// Used when a call leaves `autoOpen` unset.
    pub auto_open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            auto_open: true,
        }
    }
}

impl From<&Args> for ServerConfig {
    fn from(args: &Args) -> Self {
        Self {
            output_dir: args.output_dir.clone(),
            auto_open: !args.no_open,
        }
    }
}
