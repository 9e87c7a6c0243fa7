//! Logging initialization for the CLI.

use nvc_util::{LogConfig, LogLevel};

/// Initialize logging from `--verbose` and the configured level.
///
/// `--verbose` wins over the config file; `RUST_LOG` wins over both.
pub fn init_logging(verbose: bool, configured: Option<LogLevel>) {
    let config = if verbose {
        LogConfig::verbose()
    } else {
        LogConfig {
            level: configured.unwrap_or_default(),
            ..LogConfig::default()
        }
    };

    nvc_util::log::init(config);
}
