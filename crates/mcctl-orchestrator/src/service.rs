//! ---
//! mcctl_section: "01-core-functionality"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Service manager capability and the two-phase stop protocol."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! Lifecycle control over one named instance.
//!
//! Backends implement three primitives (`status`, `launch`, `signal`). The
//! provided methods build idempotent `start`, `stop`, and `restart` on top of
//! them so every backend shares the same stop protocol:
//!
//! 1. send [`StopSignal::Terminate`],
//! 2. poll `status` every `poll_interval` until the process is halted or
//!    `grace_period` has elapsed since the stop began,
//! 3. send [`StopSignal::Kill`] and poll for the final state within the
//!    settle window ([`settle_window`], `SETTLE_POLLS * poll_interval`).
//!
//! Every backend call is bounded by the deadline of its phase, so a stop
//! returns within `grace_period + settle_window(poll_interval)` even when the
//! backend hangs. Cancelling the poll skips straight to step 3.

use std::time::Duration;

use async_trait::async_trait;
use mcctl_common::LifecycleConfig;
use mcctl_persistence::BackendKind;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{sleep, timeout_at, Instant};
use mcctl_logging::{mc_debug, mc_info, mc_warn, LogContext};
use tracing::Instrument;

use crate::error::ServiceError;
use crate::status::LifecycleStatus;

const SETTLE_POLLS: u32 = 4;

/// Upper bound on the kill phase of a stop.
pub fn settle_window(poll_interval: Duration) -> Duration {
    poll_interval.saturating_mul(SETTLE_POLLS)
}

/// Signal delivered during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Ask the process to exit (SIGTERM).
    Terminate,
    /// End the process immediately (SIGKILL).
    Kill,
}

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// Status observed after the protocol finished.
    pub final_status: LifecycleStatus,
    /// A kill signal was sent.
    pub escalated: bool,
    /// The grace-period poll was cut short by the caller.
    pub cancelled: bool,
    /// Time spent between the first signal and the final status read.
    #[serde(with = "millis")]
    pub waited: Duration,
}

impl StopReport {
    fn noop(status: LifecycleStatus) -> Self {
        Self {
            final_status: status,
            escalated: false,
            cancelled: false,
            waited: Duration::ZERO,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

/// Capability interface over an instance's process lifecycle.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Backend this manager drives.
    fn kind(&self) -> BackendKind;

    /// Grace period and poll cadence used by `stop`.
    fn timing(&self) -> LifecycleConfig;

    /// Current status as reported by the backend.
    async fn status(&self, instance: &str) -> Result<LifecycleStatus, ServiceError>;

    /// Ask the backend to bring the instance up. Not required to be idempotent.
    async fn launch(&self, instance: &str) -> Result<(), ServiceError>;

    /// Deliver a shutdown signal.
    async fn signal(&self, instance: &str, signal: StopSignal) -> Result<(), ServiceError>;

    /// Bring the instance up unless it already is.
    async fn start(&self, instance: &str) -> Result<LifecycleStatus, ServiceError> {
        let backend = self.kind().to_string();
        let ctx = LogContext::lifecycle(instance, &backend).with_operation("start");
        let current = self.status(instance).await?;
        if matches!(current, LifecycleStatus::Running | LifecycleStatus::Starting) {
            mc_debug!(context = ctx, "start skipped, already {current}");
            return Ok(current);
        }
        self.launch(instance).instrument(ctx.span()).await?;
        let status = self.status(instance).await?;
        mc_info!(context = ctx, "instance launched, now {status}");
        Ok(status)
    }

    /// Stop the instance. See the module docs for the graceful protocol.
    async fn stop(&self, instance: &str, graceful: bool) -> Result<StopReport, ServiceError> {
        self.stop_with_cancel(instance, graceful, None).await
    }

    /// Stop, allowing the caller to cut the grace-period poll short by sending `true`.
    async fn stop_with_cancel(
        &self,
        instance: &str,
        graceful: bool,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<StopReport, ServiceError> {
        let timing = self.timing();
        let backend = self.kind().to_string();
        let ctx = LogContext::lifecycle(instance, &backend).with_operation("stop");
        let began = Instant::now();
        let deadline = began + timing.grace_period;

        let current = match timeout_at(deadline, self.status(instance)).await {
            Ok(status) => status?,
            Err(_) => {
                mc_warn!(context = ctx, "status check timed out before stop");
                LifecycleStatus::Unknown
            }
        };
        if current.is_halted() {
            mc_debug!(context = ctx, "stop skipped, already {current}");
            return Ok(StopReport::noop(current));
        }

        let mut cancelled = false;
        if graceful {
            match timeout_at(deadline, self.signal(instance, StopSignal::Terminate)).await {
                Ok(sent) => sent?,
                Err(_) => mc_warn!(context = ctx, "terminate signal timed out"),
            }
            let mut cancel = cancel;
            loop {
                match timeout_at(deadline, self.status(instance)).await {
                    Ok(Ok(status)) if status.is_halted() => {
                        mc_info!(context = ctx, "instance stopped gracefully, now {status}");
                        return Ok(StopReport {
                            final_status: status,
                            escalated: false,
                            cancelled: false,
                            waited: began.elapsed(),
                        });
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => {
                        mc_warn!(context = ctx, "status poll failed during stop: {err}")
                    }
                    Err(_) => break,
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let nap = timing.poll_interval.min(deadline - now);
                if nap_or_cancel(nap, cancel.as_mut()).await {
                    cancelled = true;
                    break;
                }
            }
            mc_warn!(
                context = ctx,
                "escalating to kill after {:?} (cancelled: {cancelled})",
                began.elapsed()
            );
        }

        let settle_deadline = Instant::now() + settle_window(timing.poll_interval);
        match timeout_at(settle_deadline, self.signal(instance, StopSignal::Kill)).await {
            Ok(sent) => sent?,
            Err(_) => {
                return Err(ServiceError::Timeout {
                    action: format!("kill {instance}"),
                    elapsed: began.elapsed(),
                })
            }
        }
        let final_status = settle(self, instance, timing.poll_interval, settle_deadline)
            .instrument(ctx.span())
            .await;
        Ok(StopReport {
            final_status,
            escalated: true,
            cancelled,
            waited: began.elapsed(),
        })
    }

    /// Graceful stop followed by start.
    async fn restart(&self, instance: &str) -> Result<LifecycleStatus, ServiceError> {
        self.stop(instance, true).await?;
        self.start(instance).await
    }
}

async fn settle<M: ServiceManager + ?Sized>(
    manager: &M,
    instance: &str,
    poll: Duration,
    deadline: Instant,
) -> LifecycleStatus {
    let mut last = LifecycleStatus::Unknown;
    for attempt in 0..SETTLE_POLLS {
        if attempt > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(poll.min(deadline - now)).await;
        }
        match timeout_at(deadline, manager.status(instance)).await {
            Ok(Ok(status)) if status.is_halted() => return status,
            Ok(Ok(status)) => last = status,
            Ok(Err(err)) => {
                tracing::warn!(attempt, error = %err, "status poll failed after kill");
                last = LifecycleStatus::Unknown;
            }
            Err(_) => {
                tracing::warn!(attempt, "status poll timed out after kill");
                return LifecycleStatus::Unknown;
            }
        }
    }
    last
}

/// Sleeps for `nap`; returns `true` early if cancellation was requested.
async fn nap_or_cancel(nap: Duration, cancel: Option<&mut watch::Receiver<bool>>) -> bool {
    match cancel {
        None => {
            sleep(nap).await;
            false
        }
        Some(rx) => tokio::select! {
            _ = sleep(nap) => false,
            _ = cancellation(rx) => true,
        },
    }
}

/// Resolves once the flag reads `true`. Never resolves if the sender is gone.
async fn cancellation(rx: &mut watch::Receiver<bool>) {
    loop {
        let requested = *rx.borrow_and_update();
        if requested {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records signals; the process exits on TERM unless `stubborn`.
    struct FakeManager {
        state: Mutex<LifecycleStatus>,
        stubborn: bool,
        status_delay: Option<Duration>,
        timing: LifecycleConfig,
        log: Mutex<Vec<String>>,
    }

    impl FakeManager {
        fn new(state: LifecycleStatus, stubborn: bool) -> Self {
            Self {
                state: Mutex::new(state),
                stubborn,
                status_delay: None,
                timing: LifecycleConfig {
                    grace_period: Duration::from_secs(10),
                    poll_interval: Duration::from_millis(500),
                },
                log: Mutex::new(Vec::new()),
            }
        }

        /// Every status read hangs for `delay`.
        fn hanging(delay: Duration, timing: LifecycleConfig) -> Self {
            Self {
                status_delay: Some(delay),
                timing,
                ..Self::new(LifecycleStatus::Running, true)
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    #[async_trait]
    impl ServiceManager for FakeManager {
        fn kind(&self) -> BackendKind {
            BackendKind::ShellManaged
        }

        fn timing(&self) -> LifecycleConfig {
            self.timing
        }

        async fn status(&self, _instance: &str) -> Result<LifecycleStatus, ServiceError> {
            self.log.lock().push("status".into());
            if let Some(delay) = self.status_delay {
                sleep(delay).await;
            }
            Ok(*self.state.lock())
        }

        async fn launch(&self, _instance: &str) -> Result<(), ServiceError> {
            self.log.lock().push("launch".into());
            *self.state.lock() = LifecycleStatus::Running;
            Ok(())
        }

        async fn signal(&self, _instance: &str, signal: StopSignal) -> Result<(), ServiceError> {
            self.log.lock().push(format!("{signal:?}"));
            if signal == StopSignal::Kill || !self.stubborn {
                *self.state.lock() = LifecycleStatus::Stopped;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let manager = FakeManager::new(LifecycleStatus::Stopped, false);
        assert_eq!(manager.start("a").await.unwrap(), LifecycleStatus::Running);
        assert_eq!(manager.start("a").await.unwrap(), LifecycleStatus::Running);
        let launches = manager.log().iter().filter(|e| *e == "launch").count();
        assert_eq!(launches, 1);
    }

    #[tokio::test]
    async fn graceful_stop_without_escalation() {
        let manager = FakeManager::new(LifecycleStatus::Running, false);
        let report = manager.stop("a", true).await.unwrap();
        assert_eq!(report.final_status, LifecycleStatus::Stopped);
        assert!(!report.escalated);
        assert!(!manager.log().contains(&"Kill".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_process_is_killed_after_grace_period() {
        let manager = FakeManager::new(LifecycleStatus::Running, true);
        let report = manager.stop("a", true).await.unwrap();
        assert!(report.escalated);
        assert!(!report.cancelled);
        assert_eq!(report.final_status, LifecycleStatus::Stopped);
        assert!(report.waited >= Duration::from_secs(10));
        assert!(report.waited < Duration::from_secs(11));
        let log = manager.log();
        assert_eq!(log.iter().filter(|e| *e == "Terminate").count(), 1);
        assert_eq!(log.last().map(String::as_str), Some("status"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_poll_still_kills() {
        let manager = FakeManager::new(LifecycleStatus::Running, true);
        let (tx, rx) = watch::channel(false);
        let canceller = tokio::spawn(async move {
            sleep(Duration::from_secs(2)).await;
            tx.send(true).unwrap();
        });
        let report = manager.stop_with_cancel("a", true, Some(rx)).await.unwrap();
        canceller.await.unwrap();
        assert!(report.cancelled);
        assert!(report.escalated);
        assert_eq!(report.final_status, LifecycleStatus::Stopped);
        assert!(report.waited < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn stop_on_halted_instance_is_noop() {
        let manager = FakeManager::new(LifecycleStatus::Stopped, false);
        let report = manager.stop("a", false).await.unwrap();
        assert_eq!(report, StopReport::noop(LifecycleStatus::Stopped));
        assert_eq!(manager.log(), vec!["status".to_string()]);
    }

    #[tokio::test]
    async fn forceful_stop_skips_terminate() {
        let manager = FakeManager::new(LifecycleStatus::Running, false);
        let report = manager.stop("a", false).await.unwrap();
        assert!(report.escalated);
        assert!(!manager.log().contains(&"Terminate".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_status_cannot_stretch_the_stop() {
        let timing = LifecycleConfig {
            grace_period: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        };
        let manager = FakeManager::hanging(Duration::from_secs(5), timing);
        let began = Instant::now();
        let report = manager.stop("a", true).await.unwrap();
        let bound = timing.grace_period + settle_window(timing.poll_interval);
        assert!(began.elapsed() <= bound, "stop took {:?}", began.elapsed());
        assert!(report.escalated);
        assert_eq!(report.final_status, LifecycleStatus::Unknown);
        assert!(manager.log().contains(&"Kill".to_string()));
    }
}
