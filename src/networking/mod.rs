use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, Url};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Only there to break redirect loops; real chains are a handful of hops.
const MAX_REDIRECTS: usize = 32;
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Clone, Debug)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

#[derive(Clone)]
pub struct NetworkClient {
    client: Client,
    timeout: Duration,
}

impl NetworkClient {
    /// `timeout` bounds the connect phase and every wait for response data.
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(timeout)
            .redirect(Policy::none())
            .user_agent(concat!("vella-sdk-libs/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client, timeout }
    }

    /// Issue a GET and follow 3xx responses until a 2xx arrives.
    async fn get_following_redirects(&self, url: &str) -> Result<Response> {
        let mut current =
            Url::parse(url).map_err(|e| Error::Network(format!("invalid URL {url}: {e}")))?;

        for hop in 0..=MAX_REDIRECTS {
            let response = timeout(self.timeout, self.client.get(current.clone()).send())
                .await
                .map_err(|_| {
                    Error::Network(format!(
                        "no response from {current} within {:?}",
                        self.timeout
                    ))
                })?
                .map_err(|e| Error::Network(format!("request to {current} failed: {e}")))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if !status.is_redirection() {
                return Err(Error::Network(format!("GET {current} returned {status}")));
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    Error::Network(format!(
                        "GET {current} returned {status} without a Location header"
                    ))
                })?;
            let next = current.join(location).map_err(|e| {
                Error::Network(format!("bad redirect target `{location}` from {current}: {e}"))
            })?;
            debug!("download: redirect {} {} -> {}", hop + 1, current, next);
            current = next;
        }

        Err(Error::Network(format!(
            "too many redirects (more than {MAX_REDIRECTS}) starting at {url}"
        )))
    }

    /// Download `url` into `dest`, calling `progress` as bytes arrive.
    ///
    /// Returns the number of bytes written. A partially written file is removed on failure.
    pub async fn download_to_path<F>(&self, url: &str, dest: &Path, mut progress: F) -> Result<u64>
    where
        F: FnMut(&DownloadProgress),
    {
        info!("download: fetching {url}");
        let response = self.get_following_redirects(url).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io("failed to create download dir", e))?;
        }

        let result = self.stream_to_file(response, dest, &mut progress).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }

    async fn stream_to_file<F>(&self, response: Response, dest: &Path, progress: &mut F) -> Result<u64>
    where
        F: FnMut(&DownloadProgress),
    {
        let mut file = File::create(dest)
            .await
            .map_err(|e| Error::io("failed to create archive file", e))?;

        let total = response.content_length();
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_tick = Instant::now();

        progress(&DownloadProgress { downloaded, total });

        loop {
            let chunk = match timeout(self.timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(Error::Network(format!("stream error: {e}"))),
                Ok(None) => break,
                Err(_) => {
                    return Err(Error::Network(format!(
                        "download stalled: no data for {:?} after {downloaded} bytes",
                        self.timeout
                    )));
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io("failed to write archive", e))?;
            downloaded += chunk.len() as u64;

            if last_tick.elapsed() >= PROGRESS_INTERVAL {
                progress(&DownloadProgress { downloaded, total });
                debug!("download: {downloaded} of {total:?} bytes");
                last_tick = Instant::now();
            }
        }

        progress(&DownloadProgress { downloaded, total });

        file.flush()
            .await
            .map_err(|e| Error::io("failed to flush archive", e))?;

        if let Some(total) = total
            && downloaded < total
        {
            return Err(Error::Network(format!(
                "download incomplete: received {downloaded} of {total} bytes"
            )));
        }

        info!("download: saved {downloaded} bytes to {}", dest.display());
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Route, TestServer};

    fn client() -> NetworkClient {
        NetworkClient::new(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn follows_redirect_chain_to_final_body() {
        let server = TestServer::start().await;
        server.route("/start", Route::Redirect("/hop".into()));
        server.route("/hop", Route::Redirect(server.url("/files/final")));
        server.route("/files/final", Route::Redirect("payload".into()));
        server.route("/files/payload", Route::Body(b"native bits".to_vec()));

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let mut updates = Vec::new();
        let written = client()
            .download_to_path(&server.url("/start"), &dest, |p| updates.push(p.clone()))
            .await
            .unwrap();

        assert_eq!(written, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"native bits");
        assert_eq!(server.hits(), 4);
        let last = updates.last().unwrap();
        assert_eq!(last.downloaded, 11);
        assert_eq!(last.total, Some(11));
    }

    #[tokio::test]
    async fn error_status_is_a_network_error() {
        let server = TestServer::start().await;
        server.route("/gone", Route::Status(404));

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let err = client()
            .download_to_path(&server.url("/gone"), &dest, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Network(ref msg) if msg.contains("404")));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn redirect_without_location_fails() {
        let server = TestServer::start().await;
        server.route("/moved", Route::Status(302));

        let dir = tempfile::tempdir().unwrap();
        let err = client()
            .download_to_path(&server.url("/moved"), &dir.path().join("x"), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(ref msg) if msg.contains("Location")));
    }

    #[tokio::test]
    async fn redirect_loop_is_bounded() {
        let server = TestServer::start().await;
        server.route("/a", Route::Redirect("/b".into()));
        server.route("/b", Route::Redirect("/a".into()));

        let dir = tempfile::tempdir().unwrap();
        let err = client()
            .download_to_path(&server.url("/a"), &dir.path().join("x"), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(ref msg) if msg.contains("too many redirects")));
        assert_eq!(server.hits(), MAX_REDIRECTS + 1);
    }

    #[tokio::test]
    async fn stalled_body_times_out_and_removes_partial_file() {
        let server = TestServer::start().await;
        server.route("/slow", Route::Stall);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let err = NetworkClient::new(Duration::from_millis(200))
            .download_to_path(&server.url("/slow"), &dest, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Network(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn connection_failure_is_a_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = client()
            .download_to_path(&TestServer::unreachable_url(), &dir.path().join("x"), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
