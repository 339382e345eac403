//! Command-line arguments and config resolution

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use warden_foundation::{ConfigLoader, Result, WardenConfig};

/// warden - development process supervisor for coding agents
///
/// Speaks JSON-RPC 2.0 on stdin/stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Directory for the process snapshot (default: ~/.warden)
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Extra settings file, applied after user and project settings
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log recovery and crash handling at debug level only
    #[arg(long)]
    pub silent_recovery: bool,

    /// Unclean exits earlier than this are startup failures, later ones crashes
    #[arg(long, value_name = "MS")]
    pub crash_grace_ms: Option<u64>,

    /// Do not resume supervision of processes from the previous session
    #[arg(long)]
    pub no_reattach: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve tools over stdio (default)
    Serve,
    /// Print the effective configuration as JSON
    Config,
    /// Print the tool names and descriptions
    Tools,
}

impl Args {
    /// user → project → `--config` → 환경변수 → 플래그 순으로 병합
    pub fn resolve_config(&self) -> Result<WardenConfig> {
        let mut loader = ConfigLoader::standard();
        if let Some(path) = &self.config {
            loader = loader.with_layer(path);
        }
        let config = loader.load()?;
        Ok(self.apply_flags(config))
    }

    pub fn apply_flags(&self, mut config: WardenConfig) -> WardenConfig {
        if let Some(dir) = &self.state_dir {
            config.state_dir = dir.clone();
        }
        if self.silent_recovery {
            config.silent_recovery = true;
        }
        if let Some(ms) = self.crash_grace_ms {
            config.crash_grace_ms = ms;
        }
        if self.no_reattach {
            config.reattach = false;
        }
        config
    }

    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "warden",
            "--state-dir",
            "/tmp/warden-state",
            "--silent-recovery",
            "--crash-grace-ms",
            "750",
            "--no-reattach",
        ]);
        let config = args.apply_flags(WardenConfig::default());
        assert_eq!(config.state_dir, PathBuf::from("/tmp/warden-state"));
        assert!(config.silent_recovery);
        assert_eq!(config.crash_grace_ms, 750);
        assert!(!config.reattach);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_defaults_untouched_without_flags() {
        let args = Args::parse_from(["warden", "config"]);
        let base = WardenConfig::default();
        let config = args.apply_flags(base.clone());
        assert_eq!(config.crash_grace_ms, base.crash_grace_ms);
        assert_eq!(config.reattach, base.reattach);
        assert_eq!(args.command, Some(Command::Config));
        assert_eq!(args.log_level(), "info");
    }
}
