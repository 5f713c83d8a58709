use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::install::{self, InstallError, MergeStats, OverwritePolicy};
use crate::probe::VersionProbe;
use crate::release::{self, FeedError, ReleaseInfo};
use crate::stage::{Stage, StageProgress, StageTracker};
use crate::transport::{self, Transport, TransportError};
use crate::version::{self, CheckOutcome};
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Release feed endpoint returning a newest-first JSON release list.
    pub feed_url: String,
    /// Application executable, relative to the install path.
    pub executable: PathBuf,
    /// Parent directory for the workspace; the OS temp dir when `None`.
    pub workspace_root: Option<PathBuf>,
    pub overwrite: OverwritePolicy,
    /// Upper bound on concurrent file copies; available parallelism when
    /// `None`.
    pub max_parallel_copies: Option<NonZeroUsize>,
}

impl UpdaterConfig {
    #[must_use]
    pub fn new(feed_url: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            feed_url: feed_url.into(),
            executable: executable.into(),
            workspace_root: None,
            overwrite: OverwritePolicy::default(),
            max_parallel_copies: None,
        }
    }

    fn copy_parallelism(&self) -> NonZeroUsize {
        self.max_parallel_copies.unwrap_or_else(|| {
            std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
        })
    }
}

#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error("stage requires {0}, which an earlier stage has not produced")]
    NotReady(&'static str),
    #[error("failed to remove workspace {path}: {source}")]
    Cleanup {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A failed stage.
///
/// Displays the stage's fixed error message; the underlying cause is
/// available through [`StageError::cause`] and the error source chain.
#[derive(Debug, Error)]
#[error("{}", .stage.error_message())]
pub struct StageError {
    stage: Stage,
    #[source]
    cause: StageFailure,
}

impl StageError {
    fn new(stage: Stage, cause: impl Into<StageFailure>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn cause(&self) -> &StageFailure {
        &self.cause
    }

    /// Whether the update itself already succeeded when this error occurred.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.stage != Stage::Cleanup
    }
}

/// State of one update run.
///
/// Every stage method takes `&mut self`, advances the tracker to its stage
/// before doing any work, and leaves it there whether or not the work
/// succeeds. Stages are called by the owner in run order; see
/// [`crate::run_update`] for the standard sequence.
pub struct Updater<T, P> {
    config: UpdaterConfig,
    transport: T,
    probe: Arc<P>,
    workspace: Workspace,
    tracker: StageTracker,
    progress: Option<mpsc::Sender<StageProgress>>,
    release: Option<ReleaseInfo>,
    archive: Option<PathBuf>,
}

impl<T: Transport, P: VersionProbe + 'static> Updater<T, P> {
    /// Create an updater and its workspace.
    ///
    /// # Errors
    /// Returns an error if the workspace directory cannot be created.
    pub fn new(config: UpdaterConfig, transport: T, probe: P) -> std::io::Result<Self> {
        let workspace = Workspace::create(config.workspace_root.as_deref())?;
        Ok(Self {
            config,
            transport,
            probe: Arc::new(probe),
            workspace,
            tracker: StageTracker::new(),
            progress: None,
            release: None,
            archive: None,
        })
    }

    /// Send a [`StageProgress`] snapshot on every stage transition.
    ///
    /// Snapshots are dropped when the channel is full.
    #[must_use]
    pub fn with_progress(mut self, progress: mpsc::Sender<StageProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.tracker.current()
    }

    #[must_use]
    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    #[must_use]
    pub fn release(&self) -> Option<&ReleaseInfo> {
        self.release.as_ref()
    }

    fn advance(&mut self, stage: Stage) {
        self.tracker.advance(stage);
        if let Some(progress) = &self.progress {
            let _ = progress.try_send(self.tracker.snapshot());
        }
    }

    /// Download the release feed into the workspace.
    ///
    /// # Errors
    /// Returns an error if the transport fails or writes no file.
    pub async fn fetch(&mut self) -> Result<(), StageError> {
        self.advance(Stage::Fetch);
        let feed_path = self.workspace.feed_path();
        let written = transport::download_to(&self.transport, &self.config.feed_url, &feed_path)
            .await
            .map_err(|error| StageError::new(Stage::Fetch, error))?;
        info!("Fetched release feed ({written} bytes)");
        Ok(())
    }

    /// Read the fetched feed and remember its latest release.
    ///
    /// # Errors
    /// Returns an error if the feed is missing or structurally invalid. A
    /// release whose archive name carries no version is not an error.
    pub async fn parse(&mut self) -> Result<&ReleaseInfo, StageError> {
        self.advance(Stage::Parse);
        self.release = None;
        self.archive = None;

        let release = release::read_feed(&self.workspace.feed_path())
            .await
            .map_err(|error| StageError::new(Stage::Parse, error))?;
        info!(
            "Latest release {} published {}",
            if release.latest_version.is_empty() {
                "<unversioned>"
            } else {
                release.latest_version.as_str()
            },
            release.published_date
        );
        Ok(self.release.insert(release))
    }

    /// Decide whether the installation at `install_path` needs the parsed
    /// release.
    ///
    /// The installed executable is read on the blocking thread pool.
    pub async fn check(&mut self, install_path: &Path) -> CheckOutcome {
        self.advance(Stage::Check);
        let latest = self
            .release
            .as_ref()
            .map_or_else(String::new, |release| release.latest_version.clone());
        let probe = Arc::clone(&self.probe);
        let install_path = install_path.to_path_buf();
        let executable = self.config.executable.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            version::check_install(&install_path, &executable, &latest, &*probe)
        })
        .await
        .unwrap_or_else(|error| {
            warn!("Version check task failed: {error}");
            CheckOutcome::CompareFailed(format!("version check task failed: {error}"))
        });
        info!("Version check: {outcome}");
        outcome
    }

    /// Download the parsed release's archive into the workspace.
    ///
    /// # Errors
    /// Returns an error if no release was parsed or the transport fails.
    pub async fn download(&mut self) -> Result<(), StageError> {
        self.advance(Stage::Download);
        let Some(release) = &self.release else {
            return Err(StageError::new(
                Stage::Download,
                StageFailure::NotReady("a parsed release"),
            ));
        };

        let archive = self
            .workspace
            .file_path(&install::archive_file_name(&release.download_url));
        let written = transport::download_to(&self.transport, &release.download_url, &archive)
            .await
            .map_err(|error| StageError::new(Stage::Download, error))?;
        info!("Downloaded update archive ({written} bytes)");
        self.archive = Some(archive);
        Ok(())
    }

    /// Unpack the downloaded archive and merge it into `application_path`.
    ///
    /// # Errors
    /// Returns an error if nothing was downloaded, the archive is corrupt, or
    /// any file cannot be written. These errors are fatal for the run.
    pub async fn extract(&mut self, application_path: &Path) -> Result<MergeStats, StageError> {
        self.advance(Stage::Extract);
        let fail = |error: InstallError| StageError::new(Stage::Extract, error);
        let Some(archive) = self.archive.clone() else {
            return Err(StageError::new(
                Stage::Extract,
                StageFailure::NotReady("a downloaded archive"),
            ));
        };

        let extract_dir = self.workspace.extract_dir();
        if tokio::fs::try_exists(&extract_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&extract_dir)
                .await
                .map_err(|source| {
                    fail(InstallError::Io {
                        context: "failed to clear previous extraction",
                        source,
                    })
                })?;
        }
        tokio::fs::create_dir_all(&extract_dir)
            .await
            .map_err(|source| {
                fail(InstallError::Io {
                    context: "failed to create extraction directory",
                    source,
                })
            })?;

        let unpack_dir = extract_dir.clone();
        let files = tokio::task::spawn_blocking(move || install::extract_zip(&archive, &unpack_dir))
            .await
            .map_err(|source| {
                fail(InstallError::Join {
                    context: "extraction task failed",
                    source,
                })
            })?
            .map_err(fail)?;
        info!("Unpacked {files} files");

        let stats = install::merge_tree(
            &extract_dir,
            application_path,
            self.config.overwrite,
            self.config.copy_parallelism(),
        )
        .await
        .map_err(fail)?;
        info!(
            "Installed update into {}: {} copied, {} kept",
            application_path.display(),
            stats.files_copied,
            stats.files_skipped
        );
        Ok(stats)
    }

    /// Delete the workspace and complete the run.
    ///
    /// # Errors
    /// Returns an error if the workspace cannot be removed; the stage stays at
    /// [`Stage::Cleanup`] and the directory is left on disk.
    pub fn cleanup(&mut self) -> Result<(), StageError> {
        self.advance(Stage::Cleanup);
        self.workspace.remove().map_err(|source| {
            StageError::new(
                Stage::Cleanup,
                StageFailure::Cleanup {
                    path: self.workspace.path().display().to_string(),
                    source,
                },
            )
        })?;
        self.advance(Stage::Complete);
        Ok(())
    }
}
