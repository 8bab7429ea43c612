use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hivemind")]
#[command(about = "hivemind: 24/7 autonomous agent orchestration core")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file
    #[arg(long, default_value = "hivemind.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduling loop until interrupted
    Run,

    /// Dispatch every enabled task once, then exit (smoke test)
    RunOnce,

    /// Print the persisted agent state without touching it
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from(["hivemind", "run"]).unwrap();
        assert!(matches!(cli.command, Commands::Run));
        assert_eq!(cli.config, PathBuf::from("hivemind.toml"));
    }

    #[test]
    fn test_cli_parses_config_override() {
        let cli =
            Cli::try_parse_from(["hivemind", "--config", "/etc/hivemind.toml", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(cli.config, PathBuf::from("/etc/hivemind.toml"));
    }

    #[test]
    fn test_cli_parses_run_once() {
        let cli = Cli::try_parse_from(["hivemind", "run-once"]).unwrap();
        assert!(matches!(cli.command, Commands::RunOnce));
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["hivemind", "reboot"]).is_err());
    }
}
