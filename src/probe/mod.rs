//! # Readiness Prober
//!
//! Polls a service's [`HealthCheck`] until it succeeds or its budget runs
//! out. The loop is an explicit, bounded state machine ([`ProbeSchedule`]):
//! an attempt counter capped by `max_attempts` and an optional wall-clock
//! budget, so a probe always terminates.
//!
//! The protocol itself (TCP connect, HTTP GET, command exit status) sits
//! behind the [`HealthProbe`] trait; [`NetworkProbe`] is the real one and
//! [`mock::ScriptedProbe`](crate::mock::ScriptedProbe) the test double.
//!
//! Each service is probed from its own task, so a slow service never holds
//! up independent ones.

pub mod checks;

pub use checks::NetworkProbe;

use crate::model::{HealthCheck, Protocol};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Evaluates one attempt of a health-check protocol.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok(())` when the service answered healthy, `Err(reason)` otherwise.
    async fn check(&self, service: &str, protocol: &Protocol) -> Result<(), String>;
}

/// Result of [`Prober::wait_until_ready`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Ready { attempts: u32, elapsed: Duration },
    TimedOut { attempts: u32, last_failure: String },
    /// A stop signal arrived between two attempts.
    Abandoned { attempts: u32 },
}

/// Attempt counter plus elapsed-time budget for one probe.
#[derive(Debug, Clone)]
pub struct ProbeSchedule {
    attempts: u32,
    max_attempts: u32,
    interval: Duration,
    budget: Option<Duration>,
    started: Instant,
}

impl ProbeSchedule {
    pub fn new(check: &HealthCheck) -> Self {
        Self {
            attempts: 0,
            max_attempts: check.max_attempts.max(1),
            interval: check.interval,
            budget: check.budget,
            started: Instant::now(),
        }
    }

    /// Claims the next attempt number, or `None` once the schedule is exhausted.
    ///
    /// The first attempt is always granted. Later ones need a free attempt
    /// slot and, with a budget, room for another `interval` before it expires.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        if self.attempts > 0 {
            if let Some(budget) = self.budget {
                if self.elapsed() + self.interval > budget {
                    return None;
                }
            }
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// How long the current attempt may take: the per-attempt timeout,
    /// clamped to what is left of the budget.
    pub fn attempt_timeout(&self, timeout: Duration) -> Duration {
        match self.budget {
            Some(budget) => timeout.min(budget.saturating_sub(self.elapsed())),
            None => timeout,
        }
    }
}

/// Drives health checks for the controller.
#[derive(Clone)]
pub struct Prober {
    probe: Arc<dyn HealthProbe>,
    cancel: CancellationToken,
}

impl Prober {
    pub fn new(probe: Arc<dyn HealthProbe>, cancel: CancellationToken) -> Self {
        Self { probe, cancel }
    }

    /// Polls until the first successful attempt or until the schedule is exhausted.
    ///
    /// An in-flight attempt always completes; the stop signal is honoured
    /// while waiting for the next one.
    pub async fn wait_until_ready(&self, service: &str, check: &HealthCheck) -> ProbeOutcome {
        let mut schedule = ProbeSchedule::new(check);
        let mut last_failure = String::from("no attempt was made");

        while let Some(attempt) = schedule.begin_attempt() {
            if attempt > 1 {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!(service, attempts = attempt - 1, "Probe abandoned");
                        return ProbeOutcome::Abandoned { attempts: attempt - 1 };
                    }
                    _ = tokio::time::sleep(check.interval) => {}
                }
            } else if self.cancel.is_cancelled() {
                return ProbeOutcome::Abandoned { attempts: 0 };
            }

            let timeout = schedule.attempt_timeout(check.timeout);
            match self.attempt(service, check, timeout).await {
                Ok(()) => {
                    let elapsed = schedule.elapsed();
                    info!(service, attempt, ?elapsed, "Healthy");
                    return ProbeOutcome::Ready {
                        attempts: attempt,
                        elapsed,
                    };
                }
                Err(reason) => {
                    debug!(service, attempt, %reason, "Not ready yet");
                    last_failure = reason;
                }
            }
        }

        warn!(service, attempts = schedule.attempts(), %last_failure, "Probe timed out");
        ProbeOutcome::TimedOut {
            attempts: schedule.attempts(),
            last_failure,
        }
    }

    /// One attempt, bounded by the check's per-attempt timeout.
    pub async fn probe_once(&self, service: &str, check: &HealthCheck) -> Result<(), String> {
        self.attempt(service, check, check.timeout).await
    }

    async fn attempt(&self, service: &str, check: &HealthCheck, timeout: Duration) -> Result<(), String> {
        match tokio::time::timeout(timeout, self.probe.check(service, &check.protocol)).await {
            Ok(result) => result,
            Err(_) => Err(format!("{} did not answer within {timeout:?}", check.protocol)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedProbe;

    fn check() -> HealthCheck {
        HealthCheck::tcp("127.0.0.1:5432")
            .with_interval(Duration::from_secs(1))
            .with_timeout(Duration::from_millis(500))
            .with_max_attempts(5)
    }

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_success() {
        let probe = ScriptedProbe::new();
        probe.expect_check("postgres").return_err("connection refused");
        probe.expect_check("postgres").return_err("connection refused");
        probe.expect_check("postgres").return_ok();

        let prober = Prober::new(Arc::new(probe.clone()), CancellationToken::new());
        let outcome = prober.wait_until_ready("postgres", &check()).await;

        assert!(matches!(outcome, ProbeOutcome::Ready { attempts: 3, .. }));
        assert_eq!(probe.checks("postgres"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_max_attempts_with_last_reason() {
        let probe = ScriptedProbe::new();
        probe.fail_always("postgres", "connection refused");

        let prober = Prober::new(Arc::new(probe.clone()), CancellationToken::new());
        let outcome = prober.wait_until_ready("postgres", &check()).await;

        assert_eq!(
            outcome,
            ProbeOutcome::TimedOut {
                attempts: 5,
                last_failure: "connection refused".into()
            }
        );
        assert_eq!(probe.checks("postgres"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_cuts_polling_short() {
        let probe = ScriptedProbe::new();
        probe.fail_always("spark", "refused");

        let check = check()
            .with_max_attempts(100)
            .with_budget(Duration::from_millis(2500));
        let prober = Prober::new(Arc::new(probe.clone()), CancellationToken::new());
        let outcome = prober.wait_until_ready("spark", &check).await;

        // Attempts at t=0s, 1s, 2s; a fourth would start past the 2.5s budget.
        assert!(matches!(outcome, ProbeOutcome::TimedOut { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempt_is_cut_by_attempt_timeout() {
        let probe = ScriptedProbe::new();
        probe.expect_check("zeppelin").hang();
        probe.expect_check("zeppelin").return_ok();

        let prober = Prober::new(Arc::new(probe), CancellationToken::new());
        let outcome = prober.wait_until_ready("zeppelin", &check()).await;
        assert!(matches!(outcome, ProbeOutcome::Ready { attempts: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_never_outlasts_the_budget() {
        let probe = ScriptedProbe::new();
        probe.expect_check("metastore").hang();

        let check = check()
            .with_timeout(Duration::from_secs(10))
            .with_budget(Duration::from_millis(2500));
        let prober = Prober::new(Arc::new(probe), CancellationToken::new());
        let started = Instant::now();
        let outcome = prober.wait_until_ready("metastore", &check).await;

        assert_eq!(started.elapsed(), Duration::from_millis(2500));
        assert_eq!(
            outcome,
            ProbeOutcome::TimedOut {
                attempts: 1,
                last_failure: "tcp 127.0.0.1:5432 did not answer within 2.5s".into()
            }
        );
    }

    #[test]
    fn attempt_timeout_is_clamped_to_remaining_budget() {
        let schedule = ProbeSchedule::new(&check().with_budget(Duration::from_millis(300)));
        assert!(schedule.attempt_timeout(Duration::from_secs(10)) <= Duration::from_millis(300));
        assert_eq!(
            ProbeSchedule::new(&check()).attempt_timeout(Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_between_attempts() {
        let probe = ScriptedProbe::new();
        probe.fail_always("airflow", "503");
        let cancel = CancellationToken::new();
        let prober = Prober::new(Arc::new(probe), cancel.clone());

        let task = tokio::spawn({
            let prober = prober.clone();
            async move { prober.wait_until_ready("airflow", &check()).await }
        });
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), ProbeOutcome::Abandoned { attempts: 2 });
    }

    #[test]
    fn schedule_grants_first_attempt_even_with_zero_budget() {
        let check = check().with_budget(Duration::ZERO);
        let mut schedule = ProbeSchedule::new(&check);
        assert_eq!(schedule.begin_attempt(), Some(1));
        assert_eq!(schedule.begin_attempt(), None);
    }
}
