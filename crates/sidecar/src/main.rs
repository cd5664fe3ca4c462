mod error;
mod install;
mod logging;
mod progress;
mod serve;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, warn};

use crate::error::AppError;
use crate::progress::TerminalProgress;
use crate::serve::ServeArgs;
use crate::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "sidecar", version, about = "Keep a local server binary current and run it")]
struct Cli {
    /// Write debug logs to the log file.
    #[arg(long, global = true)]
    debug: bool,

    /// Install location, overriding settings and the platform default.
    #[arg(long, global = true)]
    install_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install or update the server binary, then run it until it exits or
    /// the terminal is interrupted.
    Serve(ServeArgs),
    /// Install or update the server binary and print its path.
    Install,
}

impl Cli {
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(dir) = &self.install_dir {
            settings.install_dir = Some(dir.clone());
        }
        settings.debug_logging |= self.debug;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (mut settings, settings_warning) = Settings::load();
    cli.apply_to(&mut settings);
    logging::init_logging(settings.debug_logging, settings.max_log_size_bytes);
    if let Some(warning) = settings_warning {
        warn!("{warning}");
    }

    match run(&cli, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(&error);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, settings: &Settings) -> Result<(), AppError> {
    let progress = TerminalProgress::stderr();

    match &cli.command {
        Commands::Serve(args) => {
            serve::serve(args, settings, &progress).await?;
        }
        Commands::Install => {
            let path = install::ensure_binary(settings, &progress).await?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn report(error: &AppError) {
    error!("{error}");
    eprintln!("Error: {error}");
    if let Some(remediation) = error.remediation() {
        eprintln!("{remediation}");
    }
}
