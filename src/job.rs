use crate::{decode_response, error::Result, Client};
use bytes::Bytes;
use poll::Poller;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

pub mod poll;

/// Output fields holding inline image data, never written to logs
const INLINE_OUTPUT_FIELDS: &[&str] = &["image", "images", "image_base64", "imageBase64"];

/// Status tag of a serverless job.
///
/// Only [`Completed`](Status::Completed) and [`Failed`](Status::Failed) are terminal.
/// Every other tag (`IN_QUEUE`, `IN_PROGRESS`, ...) is kept verbatim and means "still running".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Completed,
    Failed,
    Other(String),
}

/// A serverless job, as returned by the `run`, `runsync` and `status` endpoints.
///
/// Fields this crate doesn't interpret are kept in [`extra`](Job::extra).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Job {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct RunRequest<'a, T: ?Sized> {
    input: &'a T,
}

impl Status {
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
            Status::Other(x) => x,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

impl From<String> for Status {
    #[inline]
    fn from(value: String) -> Self {
        match value.as_str() {
            "COMPLETED" => Status::Completed,
            "FAILED" => Status::Failed,
            _ => Status::Other(value),
        }
    }
}

impl From<&str> for Status {
    #[inline]
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Status> for String {
    #[inline]
    fn from(value: Status) -> Self {
        match value {
            Status::Other(x) => x,
            other => other.as_str().to_string(),
        }
    }
}

impl Display for Status {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Job {
    /// Creates a job payload with the given status, mostly useful for tests and mocks
    #[inline]
    pub fn with_status(status: impl Into<Status>) -> Self {
        return Self {
            status: Some(status.into()),
            ..Default::default()
        };
    }

    /// Queues a job on `endpoint` (or the client's default endpoint).
    pub async fn run<T: ?Sized + Serialize>(
        endpoint: Option<&str>,
        input: &T,
        client: impl AsRef<Client>,
    ) -> Result<Self> {
        return Self::submit(endpoint, "run", input, client).await;
    }

    /// Runs a job and waits for it server-side. Long jobs may still come back unfinished.
    pub async fn runsync<T: ?Sized + Serialize>(
        endpoint: Option<&str>,
        input: &T,
        client: impl AsRef<Client>,
    ) -> Result<Self> {
        return Self::submit(endpoint, "runsync", input, client).await;
    }

    async fn submit<T: ?Sized + Serialize>(
        endpoint: Option<&str>,
        path: &str,
        input: &T,
        client: impl AsRef<Client>,
    ) -> Result<Self> {
        let client = client.as_ref();
        let url = client.endpoint_url(endpoint, path);

        #[cfg(feature = "tracing")]
        tracing::debug!(%url, "Submitting job");

        let resp = client.post(url).json(&RunRequest { input }).send().await?;
        let job = decode_response::<Self>(resp).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(id = ?job.id, status = ?job.status, "Job submitted");

        return Ok(job);
    }

    /// Returns the current state of a job.
    pub async fn status(
        endpoint: Option<&str>,
        id: impl AsRef<str>,
        client: impl AsRef<Client>,
    ) -> Result<Self> {
        let client = client.as_ref();
        let resp = client
            .get(client.endpoint_url(endpoint, &format!("status/{}", id.as_ref())))
            .send()
            .await?;

        return decode_response::<Self>(resp).await;
    }

    /// Polls the job until it's finished, unless it already is or has no id to poll with.
    pub async fn wait(
        self,
        endpoint: Option<&str>,
        poller: &Poller,
        client: impl AsRef<Client>,
    ) -> Result<Self> {
        let id = match (&self.id, &self.status) {
            (_, Some(status)) if status.is_terminal() => return Ok(self),
            (Some(id), _) => id.clone(),
            (None, _) => return Ok(self),
        };

        return poller.poll_job(endpoint, &id, client).await;
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == Some(Status::Completed)
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == Some(Status::Failed)
    }

    /// URL of the produced file (`output.result`)
    #[inline]
    pub fn output_url(&self) -> Option<&str> {
        return self.output.as_ref()?.get("result")?.as_str();
    }

    /// Downloads the produced file into `path`.
    ///
    /// Returns `None` if the job carries no output URL.
    pub async fn download_output(&self, path: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        let Some(url) = self.output_url() else {
            return Ok(None);
        };

        let path = path.as_ref();
        download(url, path).await?;
        return Ok(Some(path.to_path_buf()));
    }

    /// The job as JSON, with inline image data removed from its output
    pub fn redacted(&self) -> Value {
        let mut job = self.clone();
        if let Some(Value::Object(output)) = job.output.as_mut() {
            for field in INLINE_OUTPUT_FIELDS {
                output.remove(*field);
            }
        }

        return serde_json::to_value(job).unwrap_or(Value::Null);
    }
}

/// Fetches the body of `url`, failing on non-success statuses
pub(crate) async fn fetch(url: &str) -> Result<Bytes> {
    let resp = reqwest::get(url).await?.error_for_status()?;
    return Ok(resp.bytes().await?);
}

/// Fetches `url` into `path`.
pub(crate) async fn download(url: &str, path: &Path) -> Result<()> {
    let bytes = fetch(url).await?;
    tokio::fs::write(path, &bytes).await?;

    #[cfg(feature = "tracing")]
    tracing::info!(path = %path.display(), len = bytes.len(), "Output saved");

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_tags() {
        let job: Job = serde_json::from_value(json!({
            "id": "abc",
            "status": "IN_QUEUE",
            "delayTime": 120
        }))
        .unwrap();
        assert_eq!(job.status, Some(Status::Other("IN_QUEUE".into())));
        assert!(!job.status.as_ref().unwrap().is_terminal());
        assert_eq!(job.extra["delayTime"], 120);

        let job: Job = serde_json::from_value(json!({"status": "COMPLETED"})).unwrap();
        assert!(job.is_completed());

        // Tags are case-sensitive
        let job: Job = serde_json::from_value(json!({"status": "completed"})).unwrap();
        assert!(!job.is_completed());
    }

    #[test]
    fn failed_job_is_not_an_error() {
        let job: Job = serde_json::from_value(json!({
            "id": "abc",
            "status": "FAILED",
            "error": "CUDA out of memory"
        }))
        .unwrap();
        assert!(job.is_failed());
        assert_eq!(job.extra["error"], "CUDA out of memory");
    }

    #[test]
    fn redacts_inline_output() {
        let job: Job = serde_json::from_value(json!({
            "id": "abc",
            "status": "COMPLETED",
            "executionTime": 3100,
            "output": {
                "result": "https://cdn.example.com/out.jpg",
                "image": "AAAA",
                "images": ["AAAA"],
                "image_base64": "AAAA",
                "imageBase64": "AAAA",
                "cost": 0.02
            }
        }))
        .unwrap();

        assert_eq!(job.output_url(), Some("https://cdn.example.com/out.jpg"));
        assert_eq!(
            job.redacted(),
            json!({
                "id": "abc",
                "status": "COMPLETED",
                "executionTime": 3100,
                "output": {
                    "result": "https://cdn.example.com/out.jpg",
                    "cost": 0.02
                }
            })
        );
    }

    #[tokio::test]
    async fn wait_returns_finished_job() {
        let client = Client::new(Some("key"), Some("unused")).unwrap();
        let poller = Poller::new().max_attempts(0);

        let mut job = Job::with_status("COMPLETED");
        job.id = Some("abc".into());
        job.output = Some(json!({"result": "https://cdn.example.com/out.jpg"}));

        let waited = job.clone().wait(None, &poller, &client).await.unwrap();
        assert_eq!(waited, job);
    }

    #[tokio::test]
    async fn wait_without_id() {
        let client = Client::new(Some("key"), Some("unused")).unwrap();
        let poller = Poller::new().max_attempts(0);

        let job = Job::with_status("IN_QUEUE");
        let waited = job.clone().wait(None, &poller, &client).await.unwrap();
        assert_eq!(waited, job);
    }

    #[tokio::test]
    async fn no_output_no_download() {
        let job = Job::with_status("COMPLETED");
        assert_eq!(job.download_output("unused.jpg").await.unwrap(), None);
    }
}
