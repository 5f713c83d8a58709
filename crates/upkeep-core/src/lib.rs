//! Self-update engine for an installed desktop application.
//!
//! This crate holds the update state machine and everything it drives:
//! - Stage tracking with fixed progress/error messages.
//! - A per-run temporary workspace.
//! - Release feed download and parsing.
//! - Installed-version detection and comparison.
//! - Archive download, extraction and merge into the install directory.

mod install;
mod probe;
mod release;
mod run;
mod stage;
mod transport;
mod updater;
mod version;
mod workspace;

/// Archive extraction and install-tree merge.
pub use install::{
    InstallError, MergeStats, OverwritePolicy, archive_file_name, extract_zip, merge_tree,
};
/// Embedded executable version readers.
pub use probe::{PeVersionProbe, ProbeError, VersionProbe};
/// Release feed model and parser.
pub use release::{FeedError, ReleaseInfo, parse_feed, version_from_download_url};
/// Standard stage sequence driver.
pub use run::{RunOutcome, run_update};
/// Update stages and progress tracking.
pub use stage::{Stage, StageProgress, StageTracker};
/// Byte transport used for the feed and the archive.
pub use transport::{HttpTransport, Transport, TransportError};
/// Per-run update state.
pub use updater::{StageError, StageFailure, Updater, UpdaterConfig};
/// Version parsing and comparison policy.
pub use version::{AppVersion, CheckOutcome, check_install, compare_versions, parse_version};
/// Temporary directory owned by one updater.
pub use workspace::Workspace;
