use super::{Job, Status};
use crate::{
    error::{Error, Result},
    Client,
};
use std::{
    future::Future,
    io::Write,
    time::Duration,
};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Polls a job's status at a fixed interval until it's finished or the attempt limit is hit.
///
/// One status query is in flight at a time. Errors returned by the query are never retried.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    max_attempts: u32,
    cancel: Option<CancellationToken>,
    print_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollState {
    Polling,
    Completed,
    Failed,
    TimedOut,
}

/// Progress report handed out after every status query
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct Attempt<'a> {
    /// 1-based
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: Option<&'a Status>,
    pub state: PollState,
}

impl PollState {
    #[inline]
    pub fn of(status: Option<&Status>) -> Self {
        match status {
            Some(Status::Completed) => PollState::Completed,
            Some(Status::Failed) => PollState::Failed,
            _ => PollState::Polling,
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollState::Polling)
    }
}

impl Attempt<'_> {
    /// Status tag as displayed in progress output
    #[inline]
    pub fn status_str(&self) -> &str {
        self.status.map_or("UNKNOWN", Status::as_str)
    }
}

impl Default for Poller {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Poller {
    #[inline]
    pub fn new() -> Self {
        return Self {
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cancel: None,
            print_progress: false,
        };
    }

    /// Time waited between two status queries.
    #[inline]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Maximum number of status queries before giving up with [`Error::PollTimeout`].
    #[inline]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Stops polling with [`Error::Cancelled`] once `token` is cancelled.
    #[inline]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Writes a `[poll] attempt/max STATUS` line to stdout after every query, overwriting the previous one.
    #[inline]
    pub fn print_progress(mut self, print_progress: bool) -> Self {
        self.print_progress = print_progress;
        self
    }

    #[inline]
    pub fn get_interval(&self) -> Duration {
        self.interval
    }

    #[inline]
    pub fn get_max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Polls RunPod's status endpoint for job `id`.
    pub async fn poll_job(
        &self,
        endpoint: Option<&str>,
        id: &str,
        client: impl AsRef<Client>,
    ) -> Result<Job> {
        let client = client.as_ref();
        return self
            .poll(id, |id| {
                let id = id.to_string();
                async move { Job::status(endpoint, id, client).await }
            })
            .await;
    }

    /// Polls job `id` through `query` until it reports a terminal status.
    ///
    /// A [`Failed`](Status::Failed) job is returned like a completed one; only running out of
    /// attempts produces [`Error::PollTimeout`].
    #[inline]
    pub async fn poll<F, Fut>(&self, id: &str, query: F) -> Result<Job>
    where
        F: FnMut(&str) -> Fut,
        Fut: Future<Output = Result<Job>>,
    {
        return self.poll_with_progress(id, query, |_| {}).await;
    }

    /// Like [`poll`](Poller::poll), calling `progress` after every status query.
    pub async fn poll_with_progress<F, Fut, P>(
        &self,
        id: &str,
        mut query: F,
        mut progress: P,
    ) -> Result<Job>
    where
        F: FnMut(&str) -> Fut,
        Fut: Future<Output = Result<Job>>,
        P: FnMut(&Attempt<'_>),
    {
        for attempt in 1..=self.max_attempts {
            self.check_cancelled(id)?;

            let job = query(id).await?;
            let report = Attempt {
                attempt,
                max_attempts: self.max_attempts,
                status: job.status.as_ref(),
                state: PollState::of(job.status.as_ref()),
            };

            #[cfg(feature = "tracing")]
            tracing::info!(
                id,
                attempt,
                max_attempts = self.max_attempts,
                status = report.status_str(),
                "Polled job"
            );

            progress(&report);
            if self.print_progress {
                print_progress_line(&report);
            }
            if report.state.is_terminal() {
                return Ok(job);
            }

            if attempt < self.max_attempts {
                self.sleep(id).await?;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(id, attempts = self.max_attempts, "Polling timed out");

        return Err(Error::PollTimeout {
            id: id.to_string(),
            attempts: self.max_attempts,
        });
    }

    #[inline]
    fn check_cancelled(&self, id: &str) -> Result<()> {
        return match &self.cancel {
            Some(token) if token.is_cancelled() => Err(Error::Cancelled { id: id.to_string() }),
            _ => Ok(()),
        };
    }

    async fn sleep(&self, id: &str) -> Result<()> {
        let Some(token) = &self.cancel else {
            tokio::time::sleep(self.interval).await;
            return Ok(());
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled { id: id.to_string() }),
            _ = tokio::time::sleep(self.interval) => Ok(()),
        }
    }
}

/// Overwrites the current stdout line with `report`. Write errors are ignored.
fn print_progress_line(report: &Attempt<'_>) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(
        stdout,
        "\r[poll] {}/{} {}   ",
        report.attempt,
        report.max_attempts,
        report.status_str()
    );
    let _ = stdout.flush();
}
