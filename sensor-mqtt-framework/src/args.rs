//! CLI argument parsing for bridges.

use std::path::PathBuf;

use clap::Parser;

/// Common CLI arguments for all bridges.
#[derive(Parser, Debug, Clone)]
#[command(about = "Sensor to MQTT bridge")]
pub struct BridgeArgs {
    /// Path to configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Increase verbosity, logging every outbound payload.
    #[arg(long)]
    pub debug: bool,
}

impl BridgeArgs {
    /// Log level requested on the command line, if any.
    ///
    /// An explicit `--log-level` wins over `--debug`.
    pub fn log_level_override(&self) -> Option<&str> {
        match (&self.log_level, self.debug) {
            (Some(level), _) => Some(level),
            (None, true) => Some("debug"),
            (None, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = BridgeArgs::try_parse_from(["bridge", "--config", "test.json5", "--debug"])
            .unwrap();
        assert_eq!(args.config, PathBuf::from("test.json5"));
        assert!(args.debug);
        assert_eq!(args.log_level_override(), Some("debug"));
    }

    #[test]
    fn test_log_level_precedence() {
        let args = BridgeArgs {
            config: PathBuf::from("test.json5"),
            log_level: Some("trace".to_string()),
            debug: true,
        };
        assert_eq!(args.log_level_override(), Some("trace"));

        let args = BridgeArgs {
            config: PathBuf::from("test.json5"),
            log_level: None,
            debug: false,
        };
        assert_eq!(args.log_level_override(), None);
    }
}
