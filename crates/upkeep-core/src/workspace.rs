use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

const FEED_FILE_NAME: &str = "releases.json";
const EXTRACT_DIR_NAME: &str = "extracted";

/// Temporary directory owned by a single updater.
///
/// The directory is created on construction and removed by
/// [`Workspace::remove`]. Dropping a workspace that was never removed also
/// deletes it; a failed removal leaves whatever is left on disk.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl Workspace {
    /// Create a uniquely named workspace, under `root` when given and under
    /// the OS temporary directory otherwise.
    ///
    /// # Errors
    /// Returns an error if the root or the workspace directory cannot be
    /// created.
    pub fn create(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("upkeep-");

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let path = dir.path().to_path_buf();
        debug!("Created update workspace {}", path.display());
        Ok(Self {
            path,
            dir: Some(dir),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn feed_path(&self) -> PathBuf {
        self.path.join(FEED_FILE_NAME)
    }

    #[must_use]
    pub fn extract_dir(&self) -> PathBuf {
        self.path.join(EXTRACT_DIR_NAME)
    }

    #[must_use]
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }

    /// Recursively delete the workspace.
    ///
    /// Removal is attempted once; after a failure the directory is no longer
    /// tracked and stays on disk.
    ///
    /// # Errors
    /// Returns an error if the workspace was already removed or cannot be
    /// deleted.
    pub fn remove(&mut self) -> io::Result<()> {
        let Some(dir) = self.dir.take() else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("workspace {} was already removed", self.path.display()),
            ));
        };

        if !self.path.exists() {
            let _ = dir.keep();
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("workspace {} no longer exists", self.path.display()),
            ));
        }

        match dir.close() {
            Ok(()) => {
                debug!("Removed update workspace {}", self.path.display());
                Ok(())
            }
            Err(error) => {
                warn!(
                    "Leaving update workspace {} on disk: {error}",
                    self.path.display()
                );
                Err(error)
            }
        }
    }
}
