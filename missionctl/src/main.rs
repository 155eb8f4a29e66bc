use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use missionctl::entrypoint::run_entrypoint;
use missionctl::exit_codes;
use missionctl::io::mission_store::DEFAULT_STATE_DIR;
use missionctl::logging;
use missionctl::run::{RunMission, RunOptions, run_text};
use missionctl::status::{ShowStatus, StatusOptions, status_text};

#[derive(Parser)]
#[command(
    name = "missionctl",
    version,
    about = "Resumable multi-agent mission controller"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One line per step.
    #[default]
    Text,
    /// A single result envelope on stdout.
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run a security-audit mission (recon, then analyze) against TARGET.
    Run {
        /// Host, URL or local path.
        target: String,
        /// Resume this mission id instead of starting a new one.
        #[arg(long, value_name = "ID")]
        resume: Option<String>,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
        /// Directory holding mission files and `config.toml`.
        #[arg(long, default_value = DEFAULT_STATE_DIR)]
        state_dir: PathBuf,
        /// Config file (defaults to `<state-dir>/config.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Skip TLS certificate verification in network agents.
        #[arg(long)]
        insecure: bool,
    },
    /// Show a persisted mission.
    Status {
        /// Mission id.
        id: String,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
        #[arg(long, default_value = DEFAULT_STATE_DIR)]
        state_dir: PathBuf,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            std::process::exit(code);
        }
    };
    logging::init();

    let mut stdout = std::io::stdout().lock();
    let code = match cli.command {
        Command::Run {
            target,
            resume,
            format,
            state_dir,
            config,
            insecure,
        } => {
            let options = RunOptions {
                target,
                resume,
                state_dir,
                config_path: config,
                insecure,
            };
            let command = RunMission::default();
            match format {
                OutputFormat::Json => run_entrypoint(&command, &options, &mut stdout),
                OutputFormat::Text => run_text(&command, &options, &mut stdout),
            }
        }
        Command::Status {
            id,
            format,
            state_dir,
        } => {
            let options = StatusOptions {
                mission_id: id,
                state_dir,
            };
            let command = ShowStatus::default();
            match format {
                OutputFormat::Json => run_entrypoint(&command, &options, &mut stdout),
                OutputFormat::Text => status_text(&command, &options, &mut stdout),
            }
        }
    };
    drop(stdout);
    std::process::exit(code);
}
