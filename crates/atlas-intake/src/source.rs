use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt as _;
use tracing::debug;

use crate::errors::{IntakeError, TransportError};
use crate::run::ByteStream;

/// Upload endpoint of the bulk file validator.
pub const VALIDATE_FILE_PATH: &str = "/validate-file";
/// Upload endpoint of the credential document validator.
pub const VALIDATE_CREDENTIALS_PATH: &str = "/api/validate-credentials";

const UPLOAD_FIELD: &str = "file";

/// A file to submit for validation.
#[derive(Clone, Debug, PartialEq)]
pub struct Upload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl Upload {
    /// Builds an upload, guessing the MIME type from the file extension.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        Self {
            mime: mime_for(&file_name).to_string(),
            file_name,
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, IntakeError> {
        let bytes = std::fs::read(path).map_err(|e| IntakeError::io(path, e))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IntakeError::Validation(format!("not a file path: {}", path.display())))?;
        Ok(Self::new(file_name, bytes))
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Something that turns an upload into a validation event stream.
#[async_trait::async_trait]
pub trait StreamSource: Send + Sync {
    async fn open(&self, upload: Upload) -> Result<ByteStream, TransportError>;
}

/// Connection settings for [`HttpSource`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    /// Base URL of the validation backend.
    pub base_url: String,
    /// Path of the upload endpoint.
    pub upload_path: String,
    /// Connect timeout. The response body itself is unbounded; use the run's
    /// idle timeout to bound a stalled stream.
    pub connect_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            upload_path: VALIDATE_FILE_PATH.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SourceConfig {
    /// Builds a config from `ATLAS_API_URL`, `ATLAS_UPLOAD_PATH` and
    /// `ATLAS_CONNECT_TIMEOUT_SECS`, falling back to defaults.
    pub fn from_env() -> Result<Self, IntakeError> {
        let mut config = Self::default();
        if let Some(url) = non_empty_env("ATLAS_API_URL") {
            config.base_url = url;
        }
        if let Some(path) = non_empty_env("ATLAS_UPLOAD_PATH") {
            config.upload_path = path;
        }
        if let Some(raw) = non_empty_env("ATLAS_CONNECT_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                IntakeError::Config(format!("ATLAS_CONNECT_TIMEOUT_SECS is not a number: {raw}"))
            })?;
            config.connect_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn upload_path(mut self, upload_path: impl Into<String>) -> Self {
        self.upload_path = upload_path.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn upload_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.upload_path.trim_start_matches('/')
        )
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Streams validation events from the backend over HTTP.
pub struct HttpSource {
    client: reqwest::Client,
    config: SourceConfig,
}

impl HttpSource {
    pub fn new(config: SourceConfig) -> Result<Self, IntakeError> {
        if config.base_url.trim().is_empty() {
            return Err(IntakeError::Config("base_url must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| IntakeError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, IntakeError> {
        Self::new(SourceConfig::from_env()?)
    }

    /// Uses a caller-built client (custom TLS roots, proxy rules, ...).
    /// `config.connect_timeout` is ignored in favour of the client's own.
    pub fn with_client(client: reqwest::Client, config: SourceConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl StreamSource for HttpSource {
    async fn open(&self, upload: Upload) -> Result<ByteStream, TransportError> {
        let url = self.config.upload_url();
        debug!(%url, file = %upload.file_name, bytes = upload.bytes.len(), "submitting upload");

        let length = upload.bytes.len() as u64;
        let part = reqwest::multipart::Part::stream_with_length(upload.bytes, length)
            .file_name(upload.file_name)
            .mime_str(&upload.mime)
            .map_err(|e| TransportError::request(format!("invalid MIME type: {e}")))?;
        let form = reqwest::multipart::Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::request(format!("upload to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::status(status.as_u16(), body));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::body(e.to_string())));
        Ok(Box::pin(stream))
    }
}

/// Replays a recorded event stream in fixed-size chunks.
///
/// Useful for checking stage keywords against captured backend output.
#[derive(Clone, Debug)]
pub struct ReplaySource {
    recording: Bytes,
    chunk_size: usize,
}

impl ReplaySource {
    pub fn new(recording: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            recording: recording.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn from_path(path: &Path, chunk_size: usize) -> Result<Self, IntakeError> {
        let bytes = std::fs::read(path).map_err(|e| IntakeError::io(path, e))?;
        Ok(Self::new(bytes, chunk_size))
    }

    fn chunks(&self) -> Vec<Bytes> {
        let mut out = Vec::with_capacity(self.recording.len() / self.chunk_size + 1);
        let mut offset = 0;
        while offset < self.recording.len() {
            let end = (offset + self.chunk_size).min(self.recording.len());
            out.push(self.recording.slice(offset..end));
            offset = end;
        }
        out
    }
}

#[async_trait::async_trait]
impl StreamSource for ReplaySource {
    async fn open(&self, upload: Upload) -> Result<ByteStream, TransportError> {
        debug!(file = %upload.file_name, bytes = self.recording.len(), "replaying recorded stream");
        let chunks = self.chunks();
        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt as _;

    #[test]
    fn upload_guesses_mime_from_extension() {
        assert_eq!(Upload::new("roster.CSV", "a").mime, "text/csv");
        assert_eq!(Upload::new("license.pdf", "a").mime, "application/pdf");
        assert_eq!(Upload::new("noext", "a").mime, "application/octet-stream");
    }

    #[test]
    fn upload_from_path_keeps_file_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("providers.csv");
        std::fs::write(&path, "full_name,npi\nJane Roe,1234567893\n").expect("write");
        let upload = Upload::from_path(&path).expect("upload");
        assert_eq!(upload.file_name, "providers.csv");
        assert_eq!(upload.mime, "text/csv");
        assert!(upload.bytes.starts_with(b"full_name"));
    }

    #[test]
    fn upload_url_joins_without_double_slashes() {
        let config = SourceConfig::default()
            .base_url("https://health-atlas-backend.onrender.com/")
            .upload_path(VALIDATE_CREDENTIALS_PATH);
        assert_eq!(
            config.upload_url(),
            "https://health-atlas-backend.onrender.com/api/validate-credentials"
        );
        assert_eq!(SourceConfig::default().upload_url(), "http://127.0.0.1:8000/validate-file");
    }

    #[test]
    fn http_source_rejects_empty_base_url() {
        let err = HttpSource::new(SourceConfig::default().base_url("  ")).err();
        assert!(matches!(err, Some(IntakeError::Config(_))));
    }

    #[tokio::test]
    async fn replay_source_chunks_the_recording() {
        let source = ReplaySource::new(Bytes::from_static(b"abcdefg"), 3);
        let stream = source
            .open(Upload::new("rec.sse", Bytes::new()))
            .await
            .expect("open");
        let chunks: Vec<_> = stream.map(|c| c.expect("chunk")).collect().await;
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"abc"),
                Bytes::from_static(b"def"),
                Bytes::from_static(b"g")
            ]
        );
    }

    /// Accepts one request, answers it with `body` as an event stream and
    /// returns the lower-cased request head.
    async fn serve_once(listener: tokio::net::TcpListener, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        let head_end = loop {
            if let Some(idx) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                break idx + 4;
            }
            let n = socket.read(&mut buf).await.expect("read head");
            assert!(n > 0, "connection closed before the request head");
            request.extend_from_slice(&buf[..n]);
        };
        let head = String::from_utf8_lossy(&request[..head_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());
        if let Some(len) = content_length {
            while request.len() < head_end + len {
                let n = socket.read(&mut buf).await.expect("read body");
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.expect("write");
        head
    }

    #[tokio::test]
    async fn upload_carries_content_length_and_streams_the_reply() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let reply = "data: {\"type\":\"complete\"}\n\n";
        let server = tokio::spawn(serve_once(listener, reply));

        let client = reqwest::Client::builder().no_proxy().build().expect("client");
        let source = HttpSource::with_client(client, SourceConfig::default().base_url(format!("http://{addr}")));
        let stream = source
            .open(Upload::new("providers.csv", "full_name,npi\nJane Roe,1234567893\n"))
            .await
            .expect("open");
        let body = stream
            .map(|chunk| chunk.expect("chunk"))
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(body, reply.as_bytes());

        let head = server.await.expect("server");
        assert!(head.starts_with("post /validate-file "));
        assert!(head.contains("content-length:"));
        assert!(!head.contains("transfer-encoding: chunked"));
        assert!(head.contains("accept: text/event-stream"));
        assert!(head.contains("content-type: multipart/form-data"));
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_request_error() {
        let source = HttpSource::new(
            SourceConfig::default()
                .base_url("http://127.0.0.1:9")
                .connect_timeout(Duration::from_millis(200)),
        )
        .expect("client");
        let err = match source.open(Upload::new("providers.csv", "full_name\n")).await {
            Ok(_) => panic!("nothing listens on the discard port"),
            Err(err) => err,
        };
        assert!(matches!(err, TransportError::Request { .. }));
    }
}
