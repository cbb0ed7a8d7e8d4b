//! Waiter - Poll a remote resource until it settles
//!
//! Many remote APIs acknowledge a mutation before its effect is visible. A
//! [`Waiter`] repeatedly asks a [`StatusProber`] for the current status and
//! stops once the status reaches the target set, leaves the pending set, the
//! resource disappears, the timeout elapses, or the caller cancels.
//!
//! ```text
//! Polling --status in target--------> Succeeded(Some(snapshot))
//!    |    --absent, target is Gone---> Succeeded(None)
//!    |    --prober error-------------> Failed
//!    |    --status not pending-------> Failed(UnexpectedStatus)
//!    |    --absent, target statuses--> Failed(Vanished)
//!    |    --deadline passed----------> TimedOut
//!    +----cancellation token---------> Cancelled
//! ```
//!
//! The deadline is checked after every status read, before its answer is
//! classified, so a read that returns late times out even when it reports
//! the target or an absent resource.
//!
//! Cancelling or timing out only stops the waiting; the remote operation
//! that was started keeps running.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::provider::ApiError;

/// Default delay between two probes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default upper bound for a whole wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Deadline used when the configured timeout does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Why a wait ended without reaching its target
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The probe call itself failed
    #[error(transparent)]
    Remote(#[from] ApiError),

    /// The remote answered successfully but reported a failure status
    #[error("remote reported status {status}{}", format_reason(.reason))]
    EmbeddedFailure {
        status: String,
        reason: Option<String>,
    },

    /// The status is neither pending nor a target
    #[error("unexpected status {status} (expected one of: {})", .expected.join(", "))]
    UnexpectedStatus {
        status: String,
        expected: Vec<String>,
    },

    /// The resource disappeared while waiting for it to reach a status
    #[error("resource not found while waiting for status {}", .expected.join(", "))]
    Vanished { expected: Vec<String> },

    /// The deadline passed before the target was reached
    #[error(
        "timeout after {elapsed:?} and {attempts} attempts waiting for {} (last status: {})",
        .expected.join(", "),
        format_status(.last_status)
    )]
    Timeout {
        expected: Vec<String>,
        last_status: Option<String>,
        elapsed: Duration,
        attempts: u32,
    },

    /// The caller cancelled the wait
    #[error("wait cancelled after {attempts} attempts (last status: {})", format_status(.last_status))]
    Cancelled {
        last_status: Option<String>,
        attempts: u32,
    },
}

impl WaitError {
    /// Embedded failure with an optional remote-supplied reason
    pub fn embedded_failure(status: impl fmt::Display, reason: Option<&str>) -> Self {
        Self::EmbeddedFailure {
            status: status.to_string(),
            reason: reason.filter(|r| !r.is_empty()).map(str::to_string),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote(err) if err.is_not_found())
    }
}

fn format_reason(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {}", r))
        .unwrap_or_default()
}

fn format_status(status: &Option<String>) -> String {
    status.clone().unwrap_or_else(|| "none".to_string())
}

/// What the waiter is waiting for
#[derive(Debug, Clone, PartialEq)]
pub enum Target<S> {
    /// Any of these statuses
    Statuses(Vec<S>),
    /// The resource no longer exists
    Gone,
}

/// Wait specification, built fresh for every wait
#[derive(Debug, Clone, PartialEq)]
pub struct WaitSpec<S> {
    pub pending: Vec<S>,
    pub target: Target<S>,
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Time to wait before the first probe
    pub delay: Duration,
}

impl<S> WaitSpec<S> {
    /// Wait until the status is one of `target`
    pub fn until(target: impl IntoIterator<Item = S>) -> Self {
        Self::with_target(Target::Statuses(target.into_iter().collect()))
    }

    /// Wait until the resource is absent
    pub fn until_gone() -> Self {
        Self::with_target(Target::Gone)
    }

    fn with_target(target: Target<S>) -> Self {
        Self {
            pending: Vec::new(),
            target,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            delay: Duration::ZERO,
        }
    }

    pub fn pending(mut self, pending: impl IntoIterator<Item = S>) -> Self {
        self.pending = pending.into_iter().collect();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T, S> {
    /// The resource exists and reports `status`
    Observed { status: S, snapshot: T },
    /// The resource does not exist
    Absent,
}

impl<T, S> Probe<T, S> {
    pub fn observed(status: S, snapshot: T) -> Self {
        Self::Observed { status, snapshot }
    }
}

/// Performs exactly one remote read and classifies it
///
/// Implementations decide how "not found" is reported: as [`Probe::Absent`]
/// (delete-style waits) or as a [`WaitError::Remote`] error.
#[async_trait]
pub trait StatusProber: Send + Sync {
    type Status: Clone + PartialEq + fmt::Display + Send + Sync;
    type Snapshot: Send;

    async fn probe(&self) -> Result<Probe<Self::Snapshot, Self::Status>, WaitError>;
}

/// Polls a [`StatusProber`] until the [`WaitSpec`] is satisfied
#[derive(Debug, Clone)]
pub struct Waiter<S> {
    label: String,
    spec: WaitSpec<S>,
    cancel: Option<CancellationToken>,
}

impl<S> Waiter<S>
where
    S: Clone + PartialEq + fmt::Display + Send + Sync,
{
    /// `label` names the waited-on resource in log lines
    pub fn new(label: impl Into<String>, spec: WaitSpec<S>) -> Self {
        Self {
            label: label.into(),
            spec,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn spec(&self) -> &WaitSpec<S> {
        &self.spec
    }

    /// Poll until the target is reached
    ///
    /// Returns the snapshot of the probe that observed a target status, or
    /// `None` when waiting for the resource to be gone.
    pub async fn wait<P>(&self, prober: &P) -> Result<Option<P::Snapshot>, WaitError>
    where
        P: StatusProber<Status = S>,
    {
        let start = Instant::now();
        let deadline = start
            .checked_add(self.spec.timeout)
            .unwrap_or_else(|| start + FAR_FUTURE);
        let mut attempts: u32 = 0;
        let mut last_status: Option<String> = None;

        if !self.spec.delay.is_zero() {
            let delay = self.spec.delay.min(self.spec.timeout);
            self.guard(tokio::time::sleep(delay), attempts, &last_status)
                .await?;
        }

        loop {
            attempts += 1;
            let probe = self
                .guard(prober.probe(), attempts, &last_status)
                .await?
                .inspect_err(|e| debug!("{}: probe {} failed: {}", self.label, attempts, e))?;

            if let Probe::Observed { status, .. } = &probe {
                last_status = Some(status.to_string());
            }
            if Instant::now() > deadline {
                return Err(self.timeout_error(start, attempts, last_status));
            }

            let status = match probe {
                Probe::Absent => match &self.spec.target {
                    Target::Gone => {
                        debug!("{}: gone after {} attempts", self.label, attempts);
                        return Ok(None);
                    }
                    Target::Statuses(target) => {
                        return Err(WaitError::Vanished {
                            expected: names(target),
                        });
                    }
                },
                Probe::Observed { status, snapshot } => {
                    if let Target::Statuses(target) = &self.spec.target
                        && target.contains(&status)
                    {
                        debug!(
                            "{}: reached {} after {} attempts",
                            self.label, status, attempts
                        );
                        return Ok(Some(snapshot));
                    }
                    status
                }
            };

            if !self.spec.pending.contains(&status) {
                return Err(WaitError::UnexpectedStatus {
                    status: status.to_string(),
                    expected: self.expected_statuses(),
                });
            }
            trace!("{}: still {} (attempt {})", self.label, status, attempts);

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timeout_error(start, attempts, last_status));
            }
            let pause = (deadline - now).min(self.spec.poll_interval);
            self.guard(tokio::time::sleep(pause), attempts, &last_status)
                .await?;
        }
    }

    /// Run `fut` unless the cancellation token fires first
    async fn guard<F>(
        &self,
        fut: F,
        attempts: u32,
        last_status: &Option<String>,
    ) -> Result<F::Output, WaitError>
    where
        F: Future,
    {
        let Some(token) = &self.cancel else {
            return Ok(fut.await);
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("{}: cancelled after {} attempts", self.label, attempts);
                Err(WaitError::Cancelled {
                    last_status: last_status.clone(),
                    attempts,
                })
            }
            out = fut => Ok(out),
        }
    }

    fn timeout_error(&self, start: Instant, attempts: u32, last_status: Option<String>) -> WaitError {
        let expected = match &self.spec.target {
            Target::Statuses(target) => names(target),
            Target::Gone => vec!["gone".to_string()],
        };
        WaitError::Timeout {
            expected,
            last_status,
            elapsed: start.elapsed(),
            attempts,
        }
    }

    fn expected_statuses(&self) -> Vec<String> {
        let mut expected = names(&self.spec.pending);
        match &self.spec.target {
            Target::Statuses(target) => expected.extend(names(target)),
            Target::Gone => expected.push("gone".to_string()),
        }
        expected
    }
}

fn names<S: fmt::Display>(statuses: &[S]) -> Vec<String> {
    statuses.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Working,
        Done,
        Broken,
    }

    impl fmt::Display for Phase {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let s = match self {
                Phase::Working => "WORKING",
                Phase::Done => "DONE",
                Phase::Broken => "BROKEN",
            };
            f.write_str(s)
        }
    }

    type Step = Result<Probe<u32, Phase>, WaitError>;

    /// Replays a script of probe results, repeating the last one forever
    struct Script {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl Script {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusProber for Script {
        type Status = Phase;
        type Snapshot = u32;

        async fn probe(&self) -> Result<Probe<u32, Phase>, WaitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front().unwrap()
            } else {
                steps.front().cloned().unwrap()
            }
        }
    }

    fn spec() -> WaitSpec<Phase> {
        WaitSpec::until([Phase::Done])
            .pending([Phase::Working])
            .poll_interval(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_snapshot_of_the_probe_that_reached_target() {
        let script = Script::new(vec![
            Ok(Probe::observed(Phase::Working, 1)),
            Ok(Probe::observed(Phase::Working, 2)),
            Ok(Probe::observed(Phase::Done, 3)),
        ]);

        let result = Waiter::new("test", spec()).wait(&script).await;

        assert_eq!(result, Ok(Some(3)));
        assert_eq!(script.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn embedded_failure_stops_immediately() {
        let script = Script::new(vec![
            Ok(Probe::observed(Phase::Working, 1)),
            Err(WaitError::embedded_failure("FAILED", Some("quota exceeded"))),
            Ok(Probe::observed(Phase::Done, 3)),
        ]);

        let result = Waiter::new("test", spec()).wait(&script).await;

        assert_eq!(
            result,
            Err(WaitError::EmbeddedFailure {
                status: "FAILED".to_string(),
                reason: Some("quota exceeded".to_string()),
            })
        );
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_errors_are_not_retried() {
        let script = Script::new(vec![Err(WaitError::Remote(ApiError::service(
            "DescribeThing",
            "AccessDeniedException",
            "denied",
        )))]);

        let result = Waiter::new("test", spec()).wait(&script).await;

        assert!(matches!(result, Err(WaitError::Remote(ApiError::Service { .. }))));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_resource_satisfies_gone_target_on_first_probe() {
        let script = Script::new(vec![Ok(Probe::Absent)]);
        let spec = WaitSpec::until_gone().pending([Phase::Working]);

        let result = Waiter::new("test", spec).wait(&script).await;

        assert_eq!(result, Ok(None));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gone_target_keeps_polling_while_pending() {
        let script = Script::new(vec![
            Ok(Probe::observed(Phase::Working, 1)),
            Ok(Probe::observed(Phase::Working, 2)),
            Ok(Probe::Absent),
        ]);
        let spec = WaitSpec::until_gone().pending([Phase::Working]);

        let result = Waiter::new("test", spec).wait(&script).await;

        assert_eq!(result, Ok(None));
        assert_eq!(script.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_resource_fails_a_status_wait() {
        let script = Script::new(vec![Ok(Probe::Absent)]);

        let result = Waiter::new("test", spec()).wait(&script).await;

        assert_eq!(
            result,
            Err(WaitError::Vanished {
                expected: vec!["DONE".to_string()]
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_status_is_fatal() {
        let script = Script::new(vec![
            Ok(Probe::observed(Phase::Working, 1)),
            Ok(Probe::observed(Phase::Broken, 2)),
        ]);

        let result = Waiter::new("test", spec()).wait(&script).await;

        assert_eq!(
            result,
            Err(WaitError::UnexpectedStatus {
                status: "BROKEN".to_string(),
                expected: vec!["WORKING".to_string(), "DONE".to_string()],
            })
        );
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_bounded_number_of_probes() {
        let script = Script::new(vec![Ok(Probe::observed(Phase::Working, 1))]);
        let spec = spec().timeout(Duration::from_secs(15));
        let start = Instant::now();

        let result = Waiter::new("test", spec).wait(&script).await;

        match result {
            Err(WaitError::Timeout {
                last_status,
                attempts,
                elapsed,
                ..
            }) => {
                assert_eq!(last_status.as_deref(), Some("WORKING"));
                // probes at 0s, 5s, 10s and 15s
                assert_eq!(attempts, 4);
                assert_eq!(elapsed, Duration::from_secs(15));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(script.calls(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_not_a_multiple_of_interval_still_bounded() {
        let script = Script::new(vec![Ok(Probe::observed(Phase::Working, 1))]);
        let spec = spec().timeout(Duration::from_secs(12));

        let result = Waiter::new("test", spec).wait(&script).await;

        assert!(matches!(result, Err(WaitError::Timeout { .. })));
        // ceil(12 / 5) + 1
        assert!(script.calls() <= 4);
        assert!(script.calls() >= 3);
    }

    /// Answers `Absent` only after taking `latency` to respond
    struct SlowAbsence {
        latency: Duration,
    }

    #[async_trait]
    impl StatusProber for SlowAbsence {
        type Status = Phase;
        type Snapshot = u32;

        async fn probe(&self) -> Result<Probe<u32, Phase>, WaitError> {
            tokio::time::sleep(self.latency).await;
            Ok(Probe::Absent)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn absence_reported_after_deadline_times_out() {
        let prober = SlowAbsence {
            latency: Duration::from_secs(20),
        };
        let spec = WaitSpec::until_gone()
            .pending([Phase::Working])
            .timeout(Duration::from_secs(10));

        let result = Waiter::new("test", spec).wait(&prober).await;

        match result {
            Err(WaitError::Timeout {
                expected,
                last_status,
                attempts,
                ..
            }) => {
                assert_eq!(expected, vec!["gone".to_string()]);
                assert_eq!(last_status, None);
                assert_eq!(attempts, 1);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn absence_within_deadline_still_succeeds() {
        let prober = SlowAbsence {
            latency: Duration::from_secs(3),
        };
        let spec = WaitSpec::until_gone()
            .pending([Phase::Working])
            .timeout(Duration::from_secs(10));

        let result = Waiter::new("test", spec).wait(&prober).await;

        assert_eq!(result, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_does_not_overflow() {
        let script = Script::new(vec![
            Ok(Probe::observed(Phase::Working, 1)),
            Ok(Probe::observed(Phase::Done, 2)),
        ]);
        let spec = spec().timeout(Duration::MAX).delay(Duration::from_secs(1));

        let result = Waiter::new("test", spec).wait(&script).await;

        assert_eq!(result, Ok(Some(2)));
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_delay_postpones_first_probe() {
        let script = Script::new(vec![Ok(Probe::observed(Phase::Done, 7))]);
        let spec = spec().delay(Duration::from_secs(10));
        let start = Instant::now();

        let result = Waiter::new("test", spec).wait(&script).await;

        assert_eq!(result, Ok(Some(7)));
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_the_wait() {
        let script = Script::new(vec![Ok(Probe::observed(Phase::Working, 1))]);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            canceller.cancel();
        });

        let result = Waiter::new("test", spec())
            .with_cancellation(token)
            .wait(&script)
            .await;

        assert_eq!(
            result,
            Err(WaitError::Cancelled {
                last_status: Some("WORKING".to_string()),
                attempts: 2,
            })
        );
    }

    #[test]
    fn error_messages() {
        let err = WaitError::Timeout {
            expected: vec!["ENABLED".to_string()],
            last_status: Some("ENABLING".to_string()),
            elapsed: Duration::from_secs(300),
            attempts: 61,
        };
        assert_eq!(
            err.to_string(),
            "timeout after 300s and 61 attempts waiting for ENABLED (last status: ENABLING)"
        );

        let err = WaitError::embedded_failure("ERROR", Some(""));
        assert_eq!(err.to_string(), "remote reported status ERROR");
    }
}
