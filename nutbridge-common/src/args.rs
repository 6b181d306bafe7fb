//! CLI argument parsing for bridges.

use std::path::PathBuf;

use clap::Parser;

/// Common CLI arguments for the bridge.
#[derive(Parser, Debug, Clone)]
#[command(about = "NUT to Zenoh bridge")]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// Parse CLI arguments with a default config path.
    ///
    /// If no `--config` argument is provided, uses the default.
    pub fn parse_with_default(default_config: &'static str) -> Result<Self, clap::Error> {
        let matches = <Self as clap::CommandFactory>::command()
            .version(env!("CARGO_PKG_VERSION"))
            .mut_arg("config", |arg| arg.default_value(default_config))
            .try_get_matches()?;

        <Self as clap::FromArgMatches>::from_arg_matches(&matches)
    }

    /// Effective log level: the CLI override if given, otherwise `configured`.
    pub fn log_level_or(&self, configured: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| configured.to_string())
    }
}
