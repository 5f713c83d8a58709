use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use log::{debug, warn};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const FALLBACK_ARCHIVE_NAME: &str = "update.zip";

/// What to do when a file being merged already exists at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    #[default]
    Overwrite,
    KeepExisting,
}

/// Counts gathered while merging an extracted tree into the install path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeStats {
    pub directories: usize,
    pub files_copied: usize,
    pub files_skipped: usize,
}

impl std::ops::AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.directories += other.directories;
        self.files_copied += other.files_copied;
        self.files_skipped += other.files_skipped;
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{context}: {source}")]
    Join {
        context: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl InstallError {
    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    fn join(context: &'static str, source: tokio::task::JoinError) -> Self {
        Self::Join { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }
}

/// File name to store a downloaded archive under, taken from the last URL
/// segment.
#[must_use]
pub fn archive_file_name(download_url: &str) -> String {
    let without_query = download_url
        .split(['?', '#'])
        .next()
        .unwrap_or(download_url);
    let raw_name = without_query.rsplit('/').next().unwrap_or_default();
    Path::new(raw_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && !n.contains(".."))
        .unwrap_or(FALLBACK_ARCHIVE_NAME)
        .to_string()
}

/// Unpack `zip_path` into `dest`, returning the number of files written.
///
/// Entries whose paths would escape `dest` are skipped.
///
/// # Errors
/// Returns an error if the archive is unreadable or an entry cannot be
/// written.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<usize, InstallError> {
    let file = std::fs::File::open(zip_path)
        .map_err(|error| InstallError::io_with_path("failed to open zip file", zip_path, &error))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| InstallError::zip("failed to read zip archive", error))?;

    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| InstallError::zip("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                InstallError::io_with_path("failed to create extraction directory", &out_path, &error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                InstallError::io_with_path(
                    "failed to create extraction parent directory",
                    parent,
                    &error,
                )
            })?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            InstallError::io_with_path("failed to create extracted file", &out_path, &error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            InstallError::io_with_path("failed to extract archive entry", &out_path, &error)
        })?;
        files += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("Extracted {files} files to {}", dest.display());
    Ok(files)
}

/// Recursively merge the tree at `src` into `dest`.
///
/// Each directory is created before its children are scheduled. Sibling
/// entries are handled by independent tasks; at most `max_parallel` file
/// copies run at once. The first failure aborts the remaining work.
///
/// # Errors
/// Returns an error if a directory cannot be read or created, or a file
/// cannot be copied.
pub async fn merge_tree(
    src: &Path,
    dest: &Path,
    policy: OverwritePolicy,
    max_parallel: NonZeroUsize,
) -> Result<MergeStats, InstallError> {
    let limiter = Arc::new(Semaphore::new(max_parallel.get()));
    merge_dir(src.to_path_buf(), dest.to_path_buf(), policy, limiter).await
}

fn merge_dir(
    src: PathBuf,
    dest: PathBuf,
    policy: OverwritePolicy,
    limiter: Arc<Semaphore>,
) -> BoxFuture<'static, Result<MergeStats, InstallError>> {
    merge_dir_entries(src, dest, policy, limiter).boxed()
}

async fn merge_dir_entries(
    src: PathBuf,
    dest: PathBuf,
    policy: OverwritePolicy,
    limiter: Arc<Semaphore>,
) -> Result<MergeStats, InstallError> {
    tokio::fs::create_dir_all(&dest).await.map_err(|error| {
        InstallError::io_with_path("failed to create install directory", &dest, &error)
    })?;

    let mut entries = tokio::fs::read_dir(&src).await.map_err(|error| {
        InstallError::io_with_path("failed to read extracted directory", &src, &error)
    })?;

    let mut workers = JoinSet::new();
    while let Some(entry) = entries.next_entry().await.map_err(|error| {
        InstallError::io_with_path("failed to read extracted directory entry", &src, &error)
    })? {
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry.file_type().await.map_err(|error| {
            InstallError::io_with_path("failed to inspect extracted entry", &src_path, &error)
        })?;

        if file_type.is_dir() {
            workers.spawn(merge_dir(src_path, dest_path, policy, Arc::clone(&limiter)));
        } else if file_type.is_file() {
            let limiter = Arc::clone(&limiter);
            workers.spawn(async move {
                match limiter.acquire_owned().await {
                    Ok(_permit) => merge_file(&src_path, &dest_path, policy).await,
                    Err(error) => Err(InstallError::Io {
                        context: "failed to schedule file copy",
                        source: std::io::Error::other(error),
                    }),
                }
            });
        } else {
            debug!("Skipping non-regular entry {}", src_path.display());
        }
    }

    let mut stats = MergeStats {
        directories: 1,
        ..MergeStats::default()
    };
    while let Some(joined) = workers.join_next().await {
        stats += joined.map_err(|error| InstallError::join("merge worker failed", error))??;
    }
    Ok(stats)
}

async fn merge_file(
    src: &Path,
    dest: &Path,
    policy: OverwritePolicy,
) -> Result<MergeStats, InstallError> {
    if policy == OverwritePolicy::KeepExisting && tokio::fs::try_exists(dest).await.unwrap_or(false)
    {
        debug!("Keeping existing {}", dest.display());
        return Ok(MergeStats {
            files_skipped: 1,
            ..MergeStats::default()
        });
    }

    tokio::fs::copy(src, dest).await.map_err(|error| {
        InstallError::Io {
            context: "failed to copy file during update install",
            source: std::io::Error::new(
                error.kind(),
                format!("{} -> {}: {error}", src.display(), dest.display()),
            ),
        }
    })?;

    Ok(MergeStats {
        files_copied: 1,
        ..MergeStats::default()
    })
}
