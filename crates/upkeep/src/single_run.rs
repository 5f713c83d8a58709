use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("another update is already running")]
    AlreadyRunning,
    #[error("failed to resolve application paths: {0}")]
    Paths(#[from] upkeep_platform::AppPathsError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl AcquireError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Exclusive lock held for the duration of one update run.
///
/// Two updaters merging into the same install directory would race, so only
/// one process may hold this at a time. The lock is released on drop.
pub struct SingleRun {
    _file: File,
}

impl SingleRun {
    pub fn acquire(lock_file_path: &Path) -> Result<Self, AcquireError> {
        if let Some(parent) = lock_file_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| AcquireError::io("failed to create lock directory", error))?;
        }

        let mut lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_file_path)
            .map_err(|error| AcquireError::io("failed to open update lock file", error))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {}
            Err(error) if error.kind() == fs2::lock_contended_error().kind() => {
                return Err(AcquireError::AlreadyRunning);
            }
            Err(error) => {
                return Err(AcquireError::io("failed to acquire update lock", error));
            }
        }

        lock_file
            .set_len(0)
            .and_then(|()| lock_file.seek(SeekFrom::Start(0)).map(|_| ()))
            .and_then(|()| writeln!(lock_file, "{}", std::process::id()))
            .map_err(|error| AcquireError::io("failed to write update lock metadata", error))?;

        Ok(Self { _file: lock_file })
    }
}

#[cfg(test)]
mod tests {
    use super::{AcquireError, SingleRun};

    #[test]
    fn acquire_creates_lock_file_with_pid() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let lock_path = temp.path().join("data").join("update.lock");

        let _guard = SingleRun::acquire(&lock_path).expect("lock should be acquired");

        let contents = std::fs::read_to_string(&lock_path).expect("lock file should be readable");
        assert_eq!(contents.trim(), std::process::id().to_string());
    }

    #[test]
    fn second_acquire_reports_already_running() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let lock_path = temp.path().join("update.lock");

        let _guard = SingleRun::acquire(&lock_path).expect("first lock should be acquired");
        let second = SingleRun::acquire(&lock_path);

        assert!(matches!(second, Err(AcquireError::AlreadyRunning)));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let lock_path = temp.path().join("update.lock");

        drop(SingleRun::acquire(&lock_path).expect("first lock should be acquired"));

        assert!(SingleRun::acquire(&lock_path).is_ok());
    }
}
