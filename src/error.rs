use serde::Deserialize;
use std::fmt::{Debug, Display};

pub type Result<T, E = Error> = ::core::result::Result<T, E>;

/// An error returned by a builder
#[derive(Debug)]
pub struct BuilderError<T> {
    pub builder: T,
    pub err: Error,
}

// An error of the `librunpod` library
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("RunPod error: {0}")]
    RunPod(#[from] RunPodError),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    /// No terminal status was observed within the attempt limit.
    #[error("Polling of job '{id}' timed out after {attempts} attempts")]
    PollTimeout { id: String, attempts: u32 },
    #[error("Polling of job '{id}' was cancelled")]
    Cancelled { id: String },
    #[error("Unknown error: {0}")]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum FallibleResponse<T> {
    Ok(T),
    Err { error: RunPodError },
}

/// Body of a non-success HTTP response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: RunPodError,
}

/// Error returned by a RunPod endpoint.
///
/// The service reports failures either as a bare string (`{"error": "..."}`)
/// or as an object carrying a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum RunPodError {
    Message(String),
    Detailed {
        message: String,
        #[serde(default, rename = "type")]
        ty: Option<String>,
        #[serde(default)]
        code: Option<serde_json::Value>,
    },
}

impl Error {
    #[inline]
    pub fn msg<M: Display + Debug + Send + Sync + 'static>(msg: M) -> Self {
        Self::Other(anyhow::Error::msg(msg))
    }

    /// Returns `true` if this error means the poller gave up waiting, as opposed to the job failing
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::PollTimeout { .. })
    }
}

impl<T> BuilderError<T> {
    #[inline]
    pub fn new(builder: T, error: impl Into<Error>) -> Self {
        return Self {
            builder,
            err: error.into(),
        };
    }

    #[inline]
    pub fn msg<M>(builder: T, msg: M) -> Self
    where
        M: Display + Debug + Send + Sync + 'static,
    {
        return Self {
            builder,
            err: Error::msg(msg),
        };
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.builder
    }

    #[inline]
    pub fn into_error(self) -> Error {
        self.err
    }
}

impl<T> FallibleResponse<T> {
    #[inline]
    pub fn into_result(self) -> Result<T, RunPodError> {
        match self {
            FallibleResponse::Ok(x) => Ok(x),
            FallibleResponse::Err { error } => Err(error),
        }
    }
}

impl RunPodError {
    #[inline]
    pub fn message(&self) -> &str {
        match self {
            RunPodError::Message(x) => x,
            RunPodError::Detailed { message, .. } => message,
        }
    }
}

impl<T> From<BuilderError<T>> for Error {
    #[inline]
    fn from(value: BuilderError<T>) -> Self {
        value.into_error()
    }
}

impl Display for RunPodError {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.message(), f)
    }
}

impl<T> Display for BuilderError<T> {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.err, f)
    }
}

impl std::error::Error for RunPodError {}
impl<T: Debug> std::error::Error for BuilderError<T> {}
