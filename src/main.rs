use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use viva::app::{RunOptions, RunSummary, run_interview, show_session};
use viva::cli::{Cli, Commands, ConfigAction};
use viva::config::Config;
use viva::session::state::TurnState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

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
            let config = load_config(cli.config.as_deref())?;
            let summary = run_interview(
                config,
                RunOptions {
                    interview,
                    email,
                    session_timeout,
                    device,
                    replay,
                    sessions_dir,
                    no_eval,
                },
            )
            .await?;
            print_summary(&summary);
        }
        Commands::Show { session } => {
            print!("{}", show_session(&session)?);
        }
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "viva", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `-q` → warn, default info, `-v` debug, `-vv` trace.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("viva={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/viva/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides()?)
}

fn print_summary(summary: &RunSummary) {
    let outcome = &summary.outcome;
    let completed = outcome.count(TurnState::Completed);
    let timed_out = outcome.count(TurnState::TimedOut);
    let total = outcome.record.questions.len();

    println!("{}", "Interview finished".bold());
    println!(
        "  {}  {} ({:.1}s)",
        "Ended by:".dimmed(),
        outcome.ended_by,
        outcome.elapsed.as_secs_f64()
    );
    println!(
        "  {} {}/{}",
        "Answered:".dimmed(),
        completed.to_string().green(),
        total
    );
    if timed_out > 0 {
        println!(
            "  {} {}",
            "Timed out:".dimmed(),
            timed_out.to_string().yellow()
        );
    }
    let unasked = total.saturating_sub(outcome.statuses.len());
    if unasked > 0 {
        println!(
            "  {} {}",
            "Not asked:".dimmed(),
            unasked.to_string().yellow()
        );
    }
    println!(
        "  {}   {}",
        "Session:".dimmed(),
        summary.session_file.display()
    );
    if summary.notified {
        let report = viva::report::report_path(&summary.session_file);
        println!("  {}    {}", "Report:".dimmed(), report.display());
    } else {
        eprintln!(
            "{}",
            "Scoring did not finish in time; the session file may lack scores".yellow()
        );
    }
    if !outcome.actors_acknowledged || outcome.detached_workers > 0 {
        eprintln!(
            "{}",
            "Some session workers did not stop cleanly and were detached".yellow()
        );
    }
}

/// List available audio input devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = viva::audio::capture::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    eprintln!("Built without audio support; rebuild with --features cpal-audio");
    std::process::exit(1);
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides()?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }
    Ok(())
}
