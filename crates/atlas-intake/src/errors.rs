use std::time::Duration;

/// Errors raised while opening or reading the validation stream, before they
/// are folded into the session as a terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Backend answered with a non-2xx status.
    #[error("backend responded with status {status}: {body}")]
    Status { status: u16, body: String },
    /// The request could not be sent (connect, DNS, TLS, ...).
    #[error("request failed: {message}")]
    Request { message: String },
    /// The response body aborted mid-stream.
    #[error("stream read failed: {message}")]
    Body { message: String },
    /// No chunk arrived within the configured idle window.
    #[error("stream idle for {seconds}s")]
    IdleTimeout { seconds: u64 },
}

impl TransportError {
    /// Creates a status error with the (possibly empty) response body.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Creates a request-level error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates a body read error.
    pub fn body(message: impl Into<String>) -> Self {
        Self::Body {
            message: message.into(),
        }
    }

    /// Creates an idle timeout error for the given window.
    pub fn idle_timeout(window: Duration) -> Self {
        Self::IdleTimeout {
            seconds: window.as_secs(),
        }
    }
}

/// Terminal failure recorded on a session when a run could not finish.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
    /// Backend rejected the upload.
    #[error("backend rejected the upload ({status}): {message}")]
    Backend { status: u16, message: String },
    /// Network or stream transport failed.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The stream stalled past the idle window.
    #[error("stream stalled for {seconds}s")]
    Stalled { seconds: u64 },
}

impl From<&TransportError> for RunFailure {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Status { status, body } => RunFailure::Backend {
                status: *status,
                message: body.clone(),
            },
            TransportError::Request { message } | TransportError::Body { message } => {
                RunFailure::Transport {
                    message: message.clone(),
                }
            }
            TransportError::IdleTimeout { seconds } => RunFailure::Stalled { seconds: *seconds },
        }
    }
}

/// Top-level error type for the public ingestion API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    /// Invalid configuration (bad regex, unreadable TOML, bad env value).
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// Local file could not be read.
    #[error("io error ({path}): {message}")]
    Io { path: String, message: String },
    /// Transport error surfaced outside a run.
    #[error(transparent)]
    Transport(TransportError),
    /// Terminal failure returned from a finished run.
    #[error(transparent)]
    RunFailed(RunFailure),
}

impl IntakeError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<TransportError> for IntakeError {
    fn from(value: TransportError) -> Self {
        IntakeError::Transport(value)
    }
}

impl From<RunFailure> for IntakeError {
    fn from(value: RunFailure) -> Self {
        IntakeError::RunFailed(value)
    }
}
