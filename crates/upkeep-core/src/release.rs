use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

static ARCHIVE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+(?:\.[0-9]+)*)\.zip").expect("archive version pattern is valid")
});

/// Latest release as advertised by the release feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub download_url: String,
    /// Dotted version taken from the archive file name; empty when the name
    /// carries none.
    pub latest_version: String,
    /// Publish timestamp exactly as the feed reported it.
    pub published_date: String,
}

impl ReleaseInfo {
    #[must_use]
    pub fn published_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.published_date).ok()
    }
}

#[derive(Debug, Deserialize)]
struct FeedRelease {
    assets: Vec<FeedAsset>,
    published_at: String,
}

#[derive(Debug, Deserialize)]
struct FeedAsset {
    browser_download_url: String,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read release feed {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse release feed: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("release feed contains no releases")]
    NoReleases,
    #[error("latest release has no assets")]
    NoAssets,
}

/// Read a fetched feed document from disk and extract the latest release.
///
/// # Errors
/// Returns an error if the file cannot be read or is not a usable feed.
pub async fn read_feed(path: &Path) -> Result<ReleaseInfo, FeedError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| FeedError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_feed(&bytes)
}

/// Extract the latest release from a newest-first JSON release list.
///
/// Only the first release and its first asset are consulted.
///
/// # Errors
/// Returns an error if the document is not a release list, the list is
/// empty, the first release has no assets, or a required field is missing.
pub fn parse_feed(bytes: &[u8]) -> Result<ReleaseInfo, FeedError> {
    let releases: Vec<FeedRelease> = serde_json::from_slice(bytes).map_err(FeedError::Parse)?;
    let release = releases.into_iter().next().ok_or(FeedError::NoReleases)?;
    let asset = release.assets.into_iter().next().ok_or(FeedError::NoAssets)?;

    let latest_version = version_from_download_url(&asset.browser_download_url);
    Ok(ReleaseInfo {
        download_url: asset.browser_download_url,
        latest_version,
        published_date: release.published_at,
    })
}

/// Dotted numeric version immediately preceding `.zip` in `url`, or an
/// empty string.
#[must_use]
pub fn version_from_download_url(url: &str) -> String {
    ARCHIVE_VERSION
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|version| version.as_str().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{FeedError, parse_feed, read_feed, version_from_download_url};

    const FEED: &str = r#"[
        {
            "tag_name": "v2.5.0",
            "published_at": "2024-03-14T09:30:00Z",
            "assets": [
                { "name": "App-2.5.0.zip", "browser_download_url": "https://example.com/download/v2.5.0/App-2.5.0.zip" },
                { "name": "App-2.5.0.sha256", "browser_download_url": "https://example.com/download/v2.5.0/App-2.5.0.sha256" }
            ]
        },
        {
            "tag_name": "v2.4.0",
            "published_at": "2024-01-02T10:00:00Z",
            "assets": [
                { "name": "App-2.4.0.zip", "browser_download_url": "https://example.com/download/v2.4.0/App-2.4.0.zip" }
            ]
        }
    ]"#;

    #[test]
    fn parse_feed_uses_first_release_and_first_asset() {
        let info = parse_feed(FEED.as_bytes()).expect("feed should parse");

        assert_eq!(
            info.download_url,
            "https://example.com/download/v2.5.0/App-2.5.0.zip"
        );
        assert_eq!(info.latest_version, "2.5.0");
        assert_eq!(info.published_date, "2024-03-14T09:30:00Z");
        assert!(info.published_at().is_some());
    }

    #[test]
    fn parse_feed_tolerates_missing_version_in_file_name() {
        let feed = r#"[{ "published_at": "yesterday", "assets": [
            { "browser_download_url": "https://example.com/latest/App.zip" }
        ]}]"#;

        let info = parse_feed(feed.as_bytes()).expect("feed should parse");

        assert_eq!(info.latest_version, "");
        assert_eq!(info.published_date, "yesterday");
        assert!(info.published_at().is_none());
    }

    #[test]
    fn parse_feed_rejects_structural_problems() {
        assert!(matches!(parse_feed(b"not json"), Err(FeedError::Parse(_))));
        assert!(matches!(parse_feed(b"{}"), Err(FeedError::Parse(_))));
        assert!(matches!(parse_feed(b"[]"), Err(FeedError::NoReleases)));
        assert!(matches!(
            parse_feed(br#"[{ "published_at": "2024-01-01T00:00:00Z", "assets": [] }]"#),
            Err(FeedError::NoAssets)
        ));
        assert!(matches!(
            parse_feed(br#"[{ "assets": [{ "browser_download_url": "https://x/App-1.0.zip" }] }]"#),
            Err(FeedError::Parse(_))
        ));
        assert!(matches!(
            parse_feed(br#"[{ "published_at": "2024-01-01T00:00:00Z", "assets": [{ "name": "x" }] }]"#),
            Err(FeedError::Parse(_))
        ));
    }

    #[test]
    fn version_from_download_url_matches_numbers_before_zip() {
        assert_eq!(
            version_from_download_url("https://example.com/App-2.5.0.zip"),
            "2.5.0"
        );
        assert_eq!(
            version_from_download_url("https://example.com/v9/App_10.0.1.7.zip"),
            "10.0.1.7"
        );
        assert_eq!(version_from_download_url("https://example.com/App-3.zip"), "3");
        assert_eq!(version_from_download_url("https://example.com/App.zip"), "");
        assert_eq!(version_from_download_url("https://example.com/App-2.5.0.tar.gz"), "");
    }

    #[tokio::test]
    async fn read_feed_reports_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir should be created");

        let result = read_feed(&temp.path().join("releases.json")).await;

        assert!(matches!(result, Err(FeedError::Read { .. })));
    }
}
