use error::{Error, ErrorBody, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Response,
};
use serde::de::DeserializeOwned;
use std::{borrow::Cow, ops::Deref, sync::Arc};

pub(crate) type Str<'a> = Cow<'a, str>;

pub mod chat;
pub mod common;
pub mod error;
pub mod image;
pub mod job;
pub mod record;

pub mod prelude {
    use super::*;

    pub use chat::{ChatCompletion, Message, Role};

    pub use error::{Error, Result};

    pub use super::image::edit::Edit;
    pub use super::image::generate::Generation;
    pub use super::image::size::{sniff_dimensions, Dimensions};
    pub use super::image::{Format, ImageInput};

    pub use job::poll::Poller;
    pub use job::{Job, Status};

    pub use record::RequestLog;

    pub use super::Client;
}

/// Base URL of RunPod's serverless API
pub const API_BASE: &str = "https://api.runpod.ai/v2";
/// Endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "qwen-image-edit-2511";

/// Authenticated handle to RunPod's serverless API.
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct Client {
    inner: reqwest::Client,
    base_url: Arc<str>,
    endpoint: Arc<str>,
}

impl Client {
    /// Creates a new client.
    ///
    /// If `api_key` is `None`, it's read from the `RUNPOD_API_KEY` environment variable.
    /// If `endpoint` is `None`, it's read from `RUNPOD_ENDPOINT_ID`, falling back to [`DEFAULT_ENDPOINT`].
    pub fn new(api_key: Option<&str>, endpoint: Option<&str>) -> Result<Self> {
        let api_key = match api_key {
            Some(x) => x.to_string(),
            None => std::env::var("RUNPOD_API_KEY").unwrap_or_default(),
        };
        let endpoint = match endpoint {
            Some(x) => x.to_string(),
            None => std::env::var("RUNPOD_ENDPOINT_ID")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
        };

        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| Error::msg("API key contains invalid header characters"))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let inner = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        return Ok(Self {
            inner,
            base_url: Arc::from(API_BASE),
            endpoint: Arc::from(endpoint),
        });
    }

    /// Points the client at another API host (mostly useful for proxies and tests)
    #[inline]
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = Arc::from(base_url.as_ref().trim_end_matches('/'));
        self
    }

    /// The endpoint used by requests that don't name one
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds `{base}/{endpoint}/{path}`
    #[inline]
    pub fn endpoint_url(&self, endpoint: Option<&str>, path: &str) -> String {
        let endpoint = endpoint.unwrap_or(&self.endpoint);
        return format!("{}/{endpoint}/{}", self.base_url, path.trim_start_matches('/'));
    }
}

impl Deref for Client {
    type Target = reqwest::Client;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AsRef<Client> for Client {
    #[inline]
    fn as_ref(&self) -> &Client {
        self
    }
}

/// Decodes a JSON response, turning non-success statuses into [`Error::RunPod`]
pub(crate) async fn decode_response<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<T>().await?);
    }

    let body = resp.bytes().await?;
    return match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(ErrorBody { error }) => Err(Error::RunPod(error)),
        Err(_) => Err(Error::msg(format!(
            "Request failed with status {status}: {}",
            String::from_utf8_lossy(&body)
        ))),
    };
}
