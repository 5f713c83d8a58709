use std::path::Path;

use log::{info, warn};
use semver::Version;

use crate::probe::VersionProbe;

/// Result of comparing the installed application against the latest release.
///
/// Only [`CheckOutcome::UpdateAvailable`] and [`CheckOutcome::NotInstalled`]
/// warrant an update; the remaining variants keep the reason the update was
/// suppressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    UpdateAvailable { installed: String, latest: String },
    NotInstalled,
    UpToDate { installed: String, latest: String },
    InvalidInstallPath,
    CompareFailed(String),
}

impl CheckOutcome {
    #[must_use]
    pub fn update_required(&self) -> bool {
        matches!(self, Self::UpdateAvailable { .. } | Self::NotInstalled)
    }
}

impl std::fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpdateAvailable { installed, latest } => {
                write!(f, "update available: {installed} -> {latest}")
            }
            Self::NotInstalled => f.write_str("application is not installed"),
            Self::UpToDate { installed, latest } => {
                write!(f, "installed {installed} is not older than {latest}")
            }
            Self::InvalidInstallPath => f.write_str("install path is empty or missing"),
            Self::CompareFailed(reason) => write!(f, "version comparison failed: {reason}"),
        }
    }
}

/// Decide whether the installation at `install_path` should be updated to
/// `latest`.
///
/// Failures while reading or comparing versions never propagate; they are
/// reported as [`CheckOutcome::CompareFailed`].
pub fn check_install(
    install_path: &Path,
    executable: &Path,
    latest: &str,
    probe: &(impl VersionProbe + ?Sized),
) -> CheckOutcome {
    if install_path.as_os_str().is_empty() || !install_path.exists() {
        warn!("Install path {} is not usable", install_path.display());
        return CheckOutcome::InvalidInstallPath;
    }

    let executable = install_path.join(executable);
    if !executable.is_file() {
        info!(
            "No executable at {}, treating as a fresh install",
            executable.display()
        );
        return CheckOutcome::NotInstalled;
    }

    let installed = match probe.file_version(&executable) {
        Ok(installed) => installed,
        Err(error) => {
            warn!("Could not read installed version: {error}");
            return CheckOutcome::CompareFailed(error.to_string());
        }
    };

    let outcome = compare_versions(&installed, latest);
    if let CheckOutcome::CompareFailed(reason) = &outcome {
        warn!("Suppressing update: {reason}");
    }
    outcome
}

/// A dotted application version.
///
/// The first three components follow semver ordering. Executable file
/// versions carry a fourth revision component, compared last; a missing
/// revision is zero, so `2.4.0` and `2.4.0.0` are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppVersion {
    pub release: Version,
    pub revision: u64,
}

impl AppVersion {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64, revision: u64) -> Self {
        Self {
            release: Version::new(major, minor, patch),
            revision,
        }
    }

    fn is_zero(&self) -> bool {
        *self <= Self::new(0, 0, 0, 0)
    }
}

/// Compare an installed version against the latest advertised one.
#[must_use]
pub fn compare_versions(installed: &str, latest: &str) -> CheckOutcome {
    let Some(installed_version) = parse_version(installed) else {
        return CheckOutcome::CompareFailed(format!("unparseable installed version '{installed}'"));
    };
    let Some(latest_version) = parse_version(latest) else {
        return CheckOutcome::CompareFailed(format!("unparseable latest version '{latest}'"));
    };

    if installed_version.is_zero() {
        return CheckOutcome::CompareFailed(format!(
            "installed version '{installed}' is not a release version"
        ));
    }

    if installed_version < latest_version {
        CheckOutcome::UpdateAvailable {
            installed: installed.to_string(),
            latest: latest.to_string(),
        }
    } else {
        CheckOutcome::UpToDate {
            installed: installed.to_string(),
            latest: latest.to_string(),
        }
    }
}

/// Parse a dotted version of two to four numeric components, with an
/// optional `v` prefix and semver pre-release/build suffix.
///
/// A missing patch is zero. Single-component versions are rejected.
#[must_use]
pub fn parse_version(version: &str) -> Option<AppVersion> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    if let Ok(release) = Version::parse(version) {
        return Some(AppVersion {
            release,
            revision: 0,
        });
    }

    let (core, suffix) = split_semver_core_and_suffix(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next()?.parse::<u64>().ok()?;
    let patch = parts.next().map(str::parse::<u64>).transpose().ok()?;
    let revision = parts.next().map(str::parse::<u64>).transpose().ok()?;
    if parts.next().is_some() {
        return None;
    }

    let release = Version::parse(&format!("{major}.{minor}.{}{suffix}", patch.unwrap_or(0))).ok()?;
    Some(AppVersion {
        release,
        revision: revision.unwrap_or(0),
    })
}

fn split_semver_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use semver::Version;

    use super::{AppVersion, CheckOutcome, check_install, compare_versions, parse_version};
    use crate::probe::{ProbeError, VersionProbe};
    use crate::release::version_from_download_url;

    struct FixedVersion(&'static str);

    impl VersionProbe for FixedVersion {
        fn file_version(&self, _executable: &Path) -> Result<String, ProbeError> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenProbe;

    impl VersionProbe for BrokenProbe {
        fn file_version(&self, executable: &Path) -> Result<String, ProbeError> {
            Err(ProbeError::MissingVersionInfo {
                path: executable.display().to_string(),
            })
        }
    }

    fn install_with_executable() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(temp.path().join("App.exe"), b"MZ").expect("executable should be written");
        temp
    }

    #[test]
    fn parse_version_normalizes_short_and_file_versions() {
        assert_eq!(parse_version("2.1"), Some(AppVersion::new(2, 1, 0, 0)));
        assert_eq!(parse_version("v1.2.3"), Some(AppVersion::new(1, 2, 3, 0)));
        assert_eq!(parse_version("2.4.0.0"), Some(AppVersion::new(2, 4, 0, 0)));
        assert_eq!(parse_version("10.0.1.7"), Some(AppVersion::new(10, 0, 1, 7)));
        assert_eq!(parse_version("0.0"), Some(AppVersion::new(0, 0, 0, 0)));
        assert_eq!(
            parse_version("1.2.0-beta.1").map(|version| version.release),
            Some(Version::parse("1.2.0-beta.1").expect("semver literal should parse"))
        );
        assert!(parse_version("3").is_none());
        assert!(parse_version("1.2.3.0.0").is_none());
        assert!(parse_version("").is_none());
        assert!(parse_version("abc").is_none());
        assert!(parse_version("1..2").is_none());
    }

    #[test]
    fn four_part_versions_order_by_revision_last() {
        assert_eq!(parse_version("2.4.0.0"), parse_version("2.4.0"));
        assert!(parse_version("10.0.1.6") < parse_version("10.0.1.7"));
        assert!(parse_version("2.4.0.3") < parse_version("2.5.0"));
        assert!(parse_version("2.4.0") < parse_version("2.4.0.1"));
    }

    #[test]
    fn compare_versions_requires_strictly_newer_release() {
        assert!(compare_versions("2.1.0", "2.2.0").update_required());
        assert!(compare_versions("2.4.0.0", "2.5.0").update_required());
        assert!(compare_versions("2.4.0.3", "2.5.0").update_required());
        assert!(!compare_versions("2.2.0", "2.2.0").update_required());
        assert!(!compare_versions("2.2.0.0", "2.2.0").update_required());
        assert!(!compare_versions("2.3.0", "2.2.0").update_required());
        assert!(matches!(
            compare_versions("2.2.0", "2.2.0"),
            CheckOutcome::UpToDate { .. }
        ));
    }

    #[test]
    fn compare_versions_orders_file_versions_from_archive_names() {
        let latest = version_from_download_url("https://updates.example.com/App-10.0.1.7.zip");

        assert_eq!(
            compare_versions("10.0.1.6", &latest),
            CheckOutcome::UpdateAvailable {
                installed: "10.0.1.6".to_string(),
                latest: "10.0.1.7".to_string(),
            }
        );
        assert!(!compare_versions("10.0.1.7", &latest).update_required());
    }

    #[test]
    fn compare_versions_fails_closed() {
        assert!(matches!(
            compare_versions("0.0", "1.0"),
            CheckOutcome::CompareFailed(_)
        ));
        assert!(matches!(
            compare_versions("1.0", ""),
            CheckOutcome::CompareFailed(_)
        ));
        assert!(matches!(
            compare_versions("garbage", "1.0"),
            CheckOutcome::CompareFailed(_)
        ));
        assert!(matches!(
            compare_versions("1.0", "3"),
            CheckOutcome::CompareFailed(_)
        ));
    }

    #[test]
    fn check_install_rejects_empty_or_missing_path() {
        let probe = FixedVersion("1.0.0");
        let exe = Path::new("App.exe");

        assert_eq!(
            check_install(Path::new(""), exe, "2.0.0", &probe),
            CheckOutcome::InvalidInstallPath
        );
        assert_eq!(
            check_install(Path::new("/definitely/not/here/upkeep"), exe, "2.0.0", &probe),
            CheckOutcome::InvalidInstallPath
        );
    }

    #[test]
    fn check_install_requires_update_when_executable_is_absent() {
        let temp = tempfile::tempdir().expect("tempdir should be created");

        let outcome = check_install(temp.path(), Path::new("App.exe"), "", &BrokenProbe);

        assert_eq!(outcome, CheckOutcome::NotInstalled);
        assert!(outcome.update_required());
    }

    #[test]
    fn check_install_compares_probed_version() {
        let install = install_with_executable();
        let exe = Path::new("App.exe");

        assert!(check_install(install.path(), exe, "2.2.0", &FixedVersion("2.1.0")).update_required());
        assert!(!check_install(install.path(), exe, "2.2.0", &FixedVersion("2.2.0")).update_required());
        assert!(!check_install(install.path(), exe, "1.0", &FixedVersion("0.0")).update_required());
    }

    #[test]
    fn check_install_swallows_probe_errors() {
        let install = install_with_executable();

        let outcome = check_install(install.path(), Path::new("App.exe"), "2.0.0", &BrokenProbe);

        assert!(matches!(outcome, CheckOutcome::CompareFailed(_)));
        assert!(!outcome.update_required());
    }
}
