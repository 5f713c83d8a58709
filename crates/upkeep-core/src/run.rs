use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::install::MergeStats;
use crate::probe::VersionProbe;
use crate::transport::Transport;
use crate::updater::{StageError, Updater};
use crate::version::CheckOutcome;

#[derive(Debug)]
pub enum RunOutcome {
    Updated {
        version: String,
        stats: MergeStats,
    },
    /// The update was installed but the workspace could not be removed.
    UpdatedWithLeftovers {
        version: String,
        stats: MergeStats,
        workspace: PathBuf,
        error: StageError,
    },
    NoUpdate(CheckOutcome),
}

/// Run the standard stage sequence against `install_path`:
/// fetch, parse, check, download, extract, cleanup.
///
/// The run stops after the check when no update is warranted. A cleanup
/// failure does not undo the installed update and is reported through
/// [`RunOutcome::UpdatedWithLeftovers`].
///
/// # Errors
/// Returns the first failing stage among fetch, parse, download and extract.
pub async fn run_update<T: Transport, P: VersionProbe + 'static>(
    updater: &mut Updater<T, P>,
    install_path: &Path,
) -> Result<RunOutcome, StageError> {
    updater.fetch().await?;
    let version = updater.parse().await?.latest_version.clone();

    let outcome = updater.check(install_path).await;
    if !outcome.update_required() {
        info!("No update applied: {outcome}");
        return Ok(RunOutcome::NoUpdate(outcome));
    }

    updater.download().await?;
    let stats = updater.extract(install_path).await?;

    match updater.cleanup() {
        Ok(()) => {
            info!("Update to {version} complete");
            Ok(RunOutcome::Updated { version, stats })
        }
        Err(error) => {
            let workspace = updater.workspace().path().to_path_buf();
            warn!(
                "Update to {version} installed, but {} was left behind: {}",
                workspace.display(),
                error.cause()
            );
            Ok(RunOutcome::UpdatedWithLeftovers {
                version,
                stats,
                workspace,
                error,
            })
        }
    }
}
