use log::debug;

/// One step of the fixed update sequence.
///
/// Variants are declared in run order; the derived ordering follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Stage {
    #[default]
    Fetch,
    Parse,
    Check,
    Download,
    Extract,
    Cleanup,
    Complete,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Fetch,
        Stage::Parse,
        Stage::Check,
        Stage::Download,
        Stage::Extract,
        Stage::Cleanup,
        Stage::Complete,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn progress_message(self) -> &'static str {
        match self {
            Stage::Fetch => "Checking for updates...",
            Stage::Parse => "Reading release list...",
            Stage::Check => "Comparing installed version...",
            Stage::Download => "Downloading update...",
            Stage::Extract => "Installing update...",
            Stage::Cleanup => "Removing temporary files...",
            Stage::Complete => "Update complete",
        }
    }

    #[must_use]
    pub fn error_message(self) -> &'static str {
        match self {
            Stage::Fetch => "Failed to download the release list",
            Stage::Parse => "Failed to read the release list",
            Stage::Check => "The application is already up to date",
            Stage::Download => "Failed to download the update",
            Stage::Extract => "Failed to install the update",
            Stage::Cleanup => "Failed to remove temporary files",
            Stage::Complete => "No errors reported",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Check => "check",
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Cleanup => "cleanup",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Snapshot of the tracker handed to progress listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageProgress {
    pub stage: Stage,
    pub percent: u8,
    pub message: &'static str,
}

/// Current position of one update run.
///
/// The tracker is a label for the last attempted stage, not a record of
/// failures; callers read [`StageTracker::last_error_message`] after a stage
/// reports failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTracker {
    current: Stage,
}

impl StageTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, stage: Stage) {
        debug!("Update stage {} -> {stage}", self.current);
        self.current = stage;
    }

    #[must_use]
    pub fn current(&self) -> Stage {
        self.current
    }

    /// Proportional progress, 0 at [`Stage::Fetch`] and 100 at
    /// [`Stage::Complete`].
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        let last = Stage::ALL.len() - 1;
        let percent = self.current.index() * 100 / last;
        u8::try_from(percent).unwrap_or(100)
    }

    #[must_use]
    pub fn progress_message(&self) -> &'static str {
        self.current.progress_message()
    }

    #[must_use]
    pub fn last_error_message(&self) -> &'static str {
        self.current.error_message()
    }

    #[must_use]
    pub fn snapshot(&self) -> StageProgress {
        StageProgress {
            stage: self.current,
            percent: self.progress_percent(),
            message: self.progress_message(),
        }
    }
}
