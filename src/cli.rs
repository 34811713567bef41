//! Command-line interface for viva
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Spoken interview sessions
#[derive(Parser, Debug)]
#[command(
    name = "viva",
    version,
    about = "Spoken interview sessions with turn-taking",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an interview session
    Run {
        /// Interview definition (JSON)
        interview: PathBuf,

        /// Candidate email; names the session directory
        #[arg(long, value_name = "ADDR")]
        email: String,

        /// Session time limit. Examples: 90s, 10m, 1h
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        session_timeout: Option<Duration>,

        /// Audio input device (e.g., hw:0)
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Read answers from a WAV file instead of the microphone
        #[arg(long, value_name = "FILE")]
        replay: Option<PathBuf>,

        /// Root directory for session files
        #[arg(long, value_name = "DIR")]
        sessions_dir: Option<PathBuf>,

        /// Skip answer scoring
        #[arg(long)]
        no_eval: bool,
    },

    /// Print the summary of a saved session
    Show {
        /// Session file (JSON)
        session: PathBuf,
    },

    /// List available audio input devices
    Devices,

    /// Manage configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`, `2m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    let duration = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s).map_err(|e| e.to_string())?,
    };
    if duration.is_zero() {
        return Err("duration must be positive".to_string());
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_minimal() {
        let cli =
            Cli::try_parse_from(["viva", "run", "interview.json", "--email", "a@b.c"]).unwrap();
        match cli.command {
            Commands::Run {
                interview,
                email,
                session_timeout,
                device,
                replay,
                sessions_dir,
                no_eval,
            } => {
                assert_eq!(interview, PathBuf::from("interview.json"));
                assert_eq!(email, "a@b.c");
                assert_eq!(session_timeout, None);
                assert_eq!(device, None);
                assert_eq!(replay, None);
                assert_eq!(sessions_dir, None);
                assert!(!no_eval);
            }
            other => panic!("Expected Run command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_run_with_options() {
        let cli = Cli::try_parse_from([
            "viva",
            "run",
            "i.json",
            "--email",
            "x@y.z",
            "--session-timeout",
            "1h30m",
            "--replay",
            "answers.wav",
            "--no-eval",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                session_timeout,
                replay,
                no_eval,
                ..
            } => {
                assert_eq!(session_timeout, Some(Duration::from_secs(5400)));
                assert_eq!(replay, Some(PathBuf::from("answers.wav")));
                assert!(no_eval);
            }
            other => panic!("Expected Run command, got {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_email() {
        let err = Cli::try_parse_from(["viva", "run", "i.json"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_bare_number_timeout_is_seconds() {
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration(" 10m "), Ok(Duration::from_secs(600)));
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("later").is_err());
    }

    #[test]
    fn test_parse_show() {
        let cli = Cli::try_parse_from(["viva", "show", "s.json"]).unwrap();
        let Commands::Show { session } = cli.command else {
            panic!("expected the show command");
        };
        assert_eq!(session, PathBuf::from("s.json"));
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["viva", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path
            }
        ));
        let cli = Cli::try_parse_from(["viva", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }

    #[test]
    fn test_global_flags_after_command() {
        let args = ["viva", "devices", "-vv", "--config", "/tmp/c.toml"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Devices));
    }

    #[test]
    fn test_subcommand_required() {
        let err = Cli::try_parse_from(["viva"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_completions_shell() {
        let cli = Cli::try_parse_from(["viva", "completions", "bash"]).unwrap();
        assert!(matches!(cli.command, Commands::Completions { shell: Shell::Bash }));
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["viva", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
