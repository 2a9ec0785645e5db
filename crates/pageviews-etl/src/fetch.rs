//! Streaming download of an hourly dump

use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::layout::{discard_part, part_path};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use pageviews_common::TargetHour;
use reqwest::{Client, StatusCode};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Build the HTTP client used for dump downloads
pub fn build_client(source: &SourceConfig) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(source.user_agent.clone())
        .timeout(source.timeout())
        .build()
}

/// Download the dump for `hour` to `output`.
///
/// The body is streamed chunk by chunk into `<output>.part`, which is renamed
/// onto `output` once the transfer completes. Any existing file at `output`
/// is replaced.
pub async fn fetch(
    client: &Client,
    source: &SourceConfig,
    hour: &TargetHour,
    output: &Path,
) -> Result<PathBuf, FetchError> {
    let url = source.dump_url(hour);
    info!(%url, target_hour = %hour, "Fetching pageviews dump");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|source| FetchError::Transfer {
            url: url.clone(),
            source,
        })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        warn!(%url, "Dump is not published yet");
        return Err(FetchError::NotPublished { url });
    }
    if !status.is_success() {
        return Err(FetchError::Status { url, status });
    }

    let io_err = |source| FetchError::Io {
        path: output.to_path_buf(),
        source,
    };

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let part = part_path(output);
    let progress = progress_bar(response.content_length(), &hour.file_name());

    let result = stream_to_file(response, &url, &part, &progress).await;
    progress.finish_and_clear();

    let downloaded = match result {
        Ok(0) => {
            discard_part(&part);
            return Err(FetchError::Empty { url });
        },
        Ok(bytes) => bytes,
        Err(e) => {
            discard_part(&part);
            return Err(e);
        },
    };

    tokio::fs::rename(&part, output).await.map_err(io_err)?;

    info!(
        path = %output.display(),
        bytes = downloaded,
        "Dump downloaded"
    );
    Ok(output.to_path_buf())
}

async fn stream_to_file(
    response: reqwest::Response,
    url: &str,
    part: &Path,
    progress: &ProgressBar,
) -> Result<u64, FetchError> {
    let io_err = |source| FetchError::Io {
        path: part.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| FetchError::Transfer {
            url: url.to_string(),
            source,
        })?;
        file.write_all(&chunk).await.map_err(io_err)?;
        downloaded += chunk.len() as u64;
        progress.set_position(downloaded);
    }

    file.flush().await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    debug!(path = %part.display(), bytes = downloaded, "Transfer complete");

    Ok(downloaded)
}

/// Progress bar on interactive terminals, hidden otherwise
fn progress_bar(total: Option<u64>, file_name: &str) -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total.unwrap_or(0));
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(format!("Downloading {file_name}"));
    pb
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::DumpLayout;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hour() -> TargetHour {
        TargetHour::new(2025, 12, 10, 16).unwrap()
    }

    fn source_for(server: &MockServer) -> SourceConfig {
        SourceConfig {
            base_url: server.uri(),
            layout: DumpLayout::Dated,
            timeout_secs: 10,
            ..SourceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_writes_dump() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2025/2025-12/pageviews-20251210-160000.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x1f, 0x8b, 0x08, 0x00]))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let output = temp.path().join("raw").join(hour().file_name());
        let source = source_for(&server);
        let client = build_client(&source).unwrap();

        let path = fetch(&client, &source, &hour(), &output).await.unwrap();

        assert_eq!(path, output);
        assert_eq!(std::fs::read(&output).unwrap(), vec![0x1f, 0x8b, 0x08, 0x00]);
        assert!(!part_path(&output).exists());
    }

    #[tokio::test]
    async fn test_fetch_not_published_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let output = temp.path().join(hour().file_name());
        let source = source_for(&server);
        let client = build_client(&source).unwrap();

        let err = fetch(&client, &source, &hour(), &output).await.unwrap_err();

        assert!(matches!(err, FetchError::NotPublished { .. }));
        assert!(!output.exists());
        assert!(!part_path(&output).exists());
    }

    #[tokio::test]
    async fn test_fetch_empty_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::<u8>::new()))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let output = temp.path().join(hour().file_name());
        let source = source_for(&server);
        let client = build_client(&source).unwrap();

        let err = fetch(&client, &source, &hour(), &output).await.unwrap_err();

        assert!(matches!(err, FetchError::Empty { .. }));
        assert!(!output.exists());
        assert!(!part_path(&output).exists());
    }

    #[tokio::test]
    async fn test_fetch_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let output = temp.path().join(hour().file_name());
        let source = source_for(&server);
        let client = build_client(&source).unwrap();

        let err = fetch(&client, &source, &hour(), &output).await.unwrap_err();

        match err {
            FetchError::Status { status, .. } => assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_fetch_interrupted_transfer() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        // Announces more bytes than it sends, then hangs up
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&[b'x'; 10]).await.unwrap();
            socket.flush().await.unwrap();
        });

        let temp = TempDir::new().unwrap();
        let output = temp.path().join(hour().file_name());
        let source = SourceConfig {
            base_url: format!("http://{addr}"),
            layout: DumpLayout::Flat,
            timeout_secs: 10,
            ..SourceConfig::default()
        };
        let client = build_client(&source).unwrap();

        let err = fetch(&client, &source, &hour(), &output).await.unwrap_err();

        assert!(matches!(err, FetchError::Transfer { .. }), "unexpected error: {err}");
        assert!(!output.exists());
        assert!(!part_path(&output).exists());
    }
}
