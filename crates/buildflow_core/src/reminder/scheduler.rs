//! Periodic driver for reminder passes.
//!
//! # Responsibility
//! - Run one reminder pass as soon as the scheduler becomes active.
//! - Repeat on a fixed period without catching up on missed periods.
//!
//! # Invariants
//! - At most one timer task exists per scheduler. `start` cancels the
//!   previous timer before registering a new one.
//! - `stop` and `Drop` abort the timer task; both are idempotent.
//! - Passes are synchronous, so cancellation only lands between passes.

use chrono::{DateTime, Utc};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default period between reminder passes.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(60 * 60);

/// One unit of scheduled reminder work.
///
/// Implementations must not block for long: they run on the scheduler's
/// runtime thread.
pub trait ReminderPass: Send {
    fn run_pass(&mut self, now: DateTime<Utc>);
}

/// Shared handle to the pass driven by the scheduler.
pub type SharedPass = Arc<Mutex<dyn ReminderPass>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    ZeroPeriod,
    NoRuntime,
}

impl Display for SchedulerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroPeriod => write!(f, "scheduler period must be greater than zero"),
            Self::NoRuntime => write!(f, "scheduler must be started inside a tokio runtime"),
        }
    }
}

impl Error for SchedulerError {}

enum SchedulerState {
    Idle,
    Active(JoinHandle<()>),
}

/// Owns the reminder timer.
pub struct ReminderScheduler {
    period: Duration,
    state: SchedulerState,
}

impl ReminderScheduler {
    pub fn new(period: Duration) -> Result<Self, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        Ok(Self {
            period,
            state: SchedulerState::Idle,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SchedulerState::Active(_))
    }

    /// Activates the scheduler and runs `pass` immediately.
    ///
    /// Calling this while active replaces the running timer; the old timer is
    /// aborted first so only one timer ever exists.
    ///
    /// # Errors
    /// - `NoRuntime` when called outside a tokio runtime.
    pub fn start(&mut self, pass: SharedPass) -> Result<(), SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        self.stop();

        let period = self.period;
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                run_once(&pass);
            }
        });

        info!(
            "event=scheduler_start module=reminder status=ok period_secs={}",
            period.as_secs()
        );
        self.state = SchedulerState::Active(handle);
        Ok(())
    }

    /// Deactivates the scheduler, aborting the timer task.
    pub fn stop(&mut self) {
        if let SchedulerState::Active(handle) =
            std::mem::replace(&mut self.state, SchedulerState::Idle)
        {
            handle.abort();
            info!("event=scheduler_stop module=reminder status=ok");
        }
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_once(pass: &SharedPass) {
    let now = Utc::now();
    match pass.lock() {
        Ok(mut guard) => guard.run_pass(now),
        Err(poisoned) => {
            error!(
                "event=scheduler_tick module=reminder status=error error_code=pass_poisoned"
            );
            poisoned.into_inner().run_pass(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ReminderPass, ReminderScheduler, SchedulerError, SharedPass};
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const PERIOD: Duration = Duration::from_secs(60 * 60);

    struct CountingPass {
        runs: Arc<AtomicUsize>,
    }

    impl ReminderPass for CountingPass {
        fn run_pass(&mut self, _now: DateTime<Utc>) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_pass() -> (SharedPass, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let pass: SharedPass = Arc::new(Mutex::new(CountingPass { runs: runs.clone() }));
        (pass, runs)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(matches!(
            ReminderScheduler::new(Duration::ZERO),
            Err(SchedulerError::ZeroPeriod)
        ));
    }

    #[test]
    fn start_outside_runtime_fails_without_panicking() {
        let (pass, runs) = counting_pass();
        let mut scheduler = ReminderScheduler::new(PERIOD).unwrap();
        assert_eq!(scheduler.start(pass), Err(SchedulerError::NoRuntime));
        assert!(!scheduler.is_active());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_then_once_per_period() {
        let (pass, runs) = counting_pass();
        let mut scheduler = ReminderScheduler::new(PERIOD).unwrap();

        scheduler.start(pass).unwrap();
        settle().await;
        assert!(scheduler.is_active());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::advance(PERIOD).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        tokio::time::advance(PERIOD / 2).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_timer() {
        let (pass, runs) = counting_pass();
        let mut scheduler = ReminderScheduler::new(PERIOD).unwrap();

        scheduler.start(pass).unwrap();
        settle().await;
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_active());

        tokio::time::advance(PERIOD * 5).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_keeps_a_single_timer() {
        let (pass, runs) = counting_pass();
        let mut scheduler = ReminderScheduler::new(PERIOD).unwrap();

        scheduler.start(pass.clone()).unwrap();
        settle().await;
        scheduler.start(pass).unwrap();
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        tokio::time::advance(PERIOD).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn missed_periods_are_not_caught_up() {
        let (pass, runs) = counting_pass();
        let mut scheduler = ReminderScheduler::new(PERIOD).unwrap();

        scheduler.start(pass).unwrap();
        settle().await;
        tokio::time::advance(PERIOD * 3 + PERIOD / 2).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_scheduler_cancels_timer() {
        let (pass, runs) = counting_pass();
        {
            let mut scheduler = ReminderScheduler::new(PERIOD).unwrap();
            scheduler.start(pass).unwrap();
            settle().await;
        }
        tokio::time::advance(PERIOD * 2).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
