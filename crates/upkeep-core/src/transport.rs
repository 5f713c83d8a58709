use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("transport finished without writing {}", .0.display())]
    MissingOutput(PathBuf),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }
}

/// Capability to copy the bytes behind a URL into a local file.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write the body at `url` to `dest`, returning the number of bytes
    /// written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest` client.
///
/// Timeouts are whatever the client was built with.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
        use futures_util::StreamExt;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| TransportError::http("download request failed", error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(TransportError::HttpStatus {
                url: url.to_string(),
                status,
                body_snippet,
            });
        }

        let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
            TransportError::io_with_path("failed to create download file", dest, &error)
        })?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| TransportError::http("download stream error", error))?;
            file.write_all(&chunk).await.map_err(|error| {
                TransportError::io_with_path("failed to write download data", dest, &error)
            })?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|error| {
            TransportError::io_with_path("failed to flush download file", dest, &error)
        })?;

        debug!("Downloaded {written} bytes from {url}");
        Ok(written)
    }
}

/// Download `url` into `dest` and confirm the file exists afterwards.
///
/// A stale `dest` from an earlier attempt is removed first, so an existing
/// file always comes from this call. Empty files are accepted.
///
/// # Errors
/// Returns the transport's error, or [`TransportError::MissingOutput`] when
/// the transport reported success without producing `dest`.
pub async fn download_to(
    transport: &(impl Transport + ?Sized),
    url: &str,
    dest: &Path,
) -> Result<u64, TransportError> {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            return Err(TransportError::io_with_path(
                "failed to remove stale download",
                dest,
                &error,
            ));
        }
    }

    info!("Downloading {url}");
    let written = transport.download(url, dest).await?;

    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        Ok(written)
    } else {
        Err(TransportError::MissingOutput(dest.to_path_buf()))
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}
