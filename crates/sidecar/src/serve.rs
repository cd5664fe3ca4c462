use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::{error, info};

use sidecar_backend::ProgressSink;
use sidecar_exec::{Outcome, SupervisedProcess, supervise};

use crate::error::AppError;
use crate::install::ensure_binary;
use crate::settings::Settings;

#[derive(Debug, Clone, clap::Args)]
pub struct ServeArgs {
    /// Environment name passed through to the local server.
    #[arg(long)]
    pub env: Option<String>,

    /// Compiled package to serve.
    #[arg(long, default_value = "bin/main.wasm")]
    pub artifact: PathBuf,

    /// Package manifest describing backends and dictionaries.
    #[arg(long, short = 'C', default_value = "fastly.toml")]
    pub manifest: PathBuf,

    /// Stream everything and skip the stderr summary on failure.
    #[arg(long, short)]
    pub verbose: bool,

    /// Extra arguments for the server, after `--`.
    #[arg(last = true)]
    pub extra: Vec<String>,
}

/// `<artifact> -C <manifest> [--env NAME] [extra...]`
pub fn child_args(
    artifact: &Path,
    manifest: &Path,
    env: Option<&str>,
    extra: &[String],
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        artifact.into(),
        "-C".into(),
        manifest.into(),
    ];
    if let Some(env) = env.filter(|env| !env.is_empty()) {
        args.push("--env".into());
        args.push(env.into());
    }
    args.extend(extra.iter().map(OsString::from));
    args
}

pub async fn serve(
    args: &ServeArgs,
    settings: &Settings,
    progress: &dyn ProgressSink,
) -> Result<Outcome, AppError> {
    let bin = ensure_binary(settings, progress).await?;

    let process = SupervisedProcess::new(
        &bin,
        child_args(&args.artifact, &args.manifest, args.env.as_deref(), &args.extra),
    )
    .envs(settings.env.clone())
    .verbose(args.verbose);

    info!("Starting {}", bin.display());
    match supervise(&process).await {
        Ok(Outcome::Interrupted) => {
            info!("{} stopped on request", bin.display());
            Ok(Outcome::Interrupted)
        }
        Ok(outcome) => Ok(outcome),
        Err(source) => {
            let error = AppError::from(source);
            if error.is_fatal_signal_failure() {
                error!("{error}; {} may still be running", bin.display());
            }
            Err(error)
        }
    }
}
