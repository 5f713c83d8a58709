use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use upkeep_core::{OverwritePolicy, UpdaterConfig};
use upkeep_platform::AppPaths;

const DEFAULT_FEED_URL: &str = "https://api.github.com/repos/upkeep-rs/app/releases";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    #[serde(default)]
    pub install_dir: Option<PathBuf>,

    #[serde(default = "default_executable")]
    pub executable: PathBuf,

    #[serde(default = "default_true")]
    pub overwrite_existing: bool,

    #[serde(default)]
    pub max_parallel_copies: Option<NonZeroUsize>,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_executable() -> PathBuf {
    PathBuf::from("App.exe")
}

fn default_true() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            install_dir: None,
            executable: default_executable(),
            overwrite_existing: true,
            max_parallel_copies: None,
            http_timeout_secs: default_http_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl Settings {
    pub fn load() -> Self {
        let Ok(paths) = AppPaths::new() else {
            return Self::default();
        };
        Self::load_from(&paths.settings_file())
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn updater_config(&self, workspace_root: Option<PathBuf>) -> UpdaterConfig {
        let mut config = UpdaterConfig::new(self.feed_url.clone(), self.executable.clone());
        config.workspace_root = workspace_root;
        config.max_parallel_copies = self.max_parallel_copies;
        config.overwrite = if self.overwrite_existing {
            OverwritePolicy::Overwrite
        } else {
            OverwritePolicy::KeepExisting
        };
        config
    }
}
