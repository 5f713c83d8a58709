mod logging;
mod settings;
mod single_run;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, FixedOffset};
use log::error;
use thiserror::Error;
use tokio::sync::mpsc;
use upkeep_core::{
    CheckOutcome, HttpTransport, PeVersionProbe, ReleaseInfo, RunOutcome, Stage, StageError,
    StageProgress, Updater, run_update,
};
use upkeep_platform::AppPaths;

use crate::settings::Settings;
use crate::single_run::{AcquireError, SingleRun};

const EXIT_FAILED: u8 = 1;
const EXIT_ALREADY_RUNNING: u8 = 2;

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to create update workspace: {0}")]
    Workspace(#[source] std::io::Error),
    #[error(transparent)]
    Stage(#[from] StageError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings = Settings::load();
    let log_file = logging::init_logging(settings.debug_logging, settings.max_log_size_bytes);

    let Some(install_dir) = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| settings.install_dir.clone())
    else {
        eprintln!(
            "No install directory given. Pass it as the first argument or set \"install_dir\" in settings.json."
        );
        return ExitCode::from(EXIT_FAILED);
    };

    let _guard = match acquire_single_run() {
        Ok(guard) => guard,
        Err(AcquireError::AlreadyRunning) => {
            eprintln!("Another update is already running.");
            return ExitCode::from(EXIT_ALREADY_RUNNING);
        }
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::from(EXIT_FAILED);
        }
    };

    let (progress_tx, mut progress_rx) = mpsc::channel::<StageProgress>(Stage::ALL.len() * 2);
    let printer = tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            println!("[{:>3}%] {}", progress.percent, progress.message);
        }
    });

    let result = update(&settings, &install_dir, progress_tx).await;
    let _ = printer.await;

    match result {
        Ok((outcome, published)) => {
            report_outcome(&outcome, published);
            ExitCode::SUCCESS
        }
        Err(app_error) => {
            eprintln!("{app_error}");
            match &app_error {
                AppError::Stage(stage_error) => {
                    error!("{} stage failed: {}", stage_error.stage(), stage_error.cause());
                }
                other => error!("{other}"),
            }
            if let Some(log_file) = log_file {
                eprintln!("See {} for details.", log_file.display());
            }
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn acquire_single_run() -> Result<SingleRun, AcquireError> {
    let paths = AppPaths::new()?;
    SingleRun::acquire(&paths.lock_file())
}

async fn update(
    settings: &Settings,
    install_dir: &Path,
    progress: mpsc::Sender<StageProgress>,
) -> Result<(RunOutcome, Option<DateTime<FixedOffset>>), AppError> {
    let client = reqwest::Client::builder()
        .timeout(settings.http_timeout())
        .connect_timeout(settings.connect_timeout())
        .user_agent(format!("upkeep/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(AppError::Client)?;

    let workspace_root = AppPaths::new().ok().map(|paths| paths.workspace_root());
    let mut updater = Updater::new(
        settings.updater_config(workspace_root),
        HttpTransport::new(client),
        PeVersionProbe,
    )
    .map_err(AppError::Workspace)?
    .with_progress(progress);

    let outcome = run_update(&mut updater, install_dir).await?;
    let published = updater.release().and_then(ReleaseInfo::published_at);
    Ok((outcome, published))
}

fn report_outcome(outcome: &RunOutcome, published: Option<DateTime<FixedOffset>>) {
    match outcome {
        RunOutcome::Updated { version, stats } => {
            println!(
                "Updated to {version}{} ({} files installed).",
                release_date_suffix(published),
                stats.files_copied
            );
        }
        RunOutcome::UpdatedWithLeftovers {
            version,
            stats,
            workspace,
            error,
        } => {
            println!(
                "Updated to {version}{} ({} files installed).",
                release_date_suffix(published),
                stats.files_copied
            );
            eprintln!("{error}: {}", workspace.display());
        }
        RunOutcome::NoUpdate(CheckOutcome::UpToDate { installed, .. }) => {
            println!("{} ({installed}).", Stage::Check.error_message());
        }
        RunOutcome::NoUpdate(reason) => {
            println!("No update applied: {reason}.");
        }
    }
}

fn release_date_suffix(published: Option<DateTime<FixedOffset>>) -> String {
    published
        .map(|published| format!(", released {}", published.format("%Y-%m-%d")))
        .unwrap_or_default()
}
