//! Cancellable one-shot and repeating timers on the tokio clock.
//!
//! A timer runs as a spawned task that waits on either its deadline or its
//! cancellation token. Cancellation is only observed while waiting: a task
//! body that has already started always runs to completion. Bodies that
//! mutate shared state receive the token and re-check it once they hold the
//! state lock.
//!
//! Dropping a [`TimerHandle`] cancels the timer, so replacing the handle
//! stored in an `Option` is enough to stop the old loop.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shortest period a repeating timer accepts.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Longest wait any timer accepts. Server-supplied intervals above this are
/// clamped so deadline arithmetic on the tokio clock cannot overflow.
const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Owner of a scheduled timer.
#[derive(Debug)]
pub(crate) struct TimerHandle {
    token: CancellationToken,
}

#[cfg(test)]
impl TimerHandle {
    /// Stop the timer at its next wait point.
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Run `task` once after `delay`, unless cancelled first.
pub(crate) fn schedule_once<F, Fut>(delay: Duration, task: F) -> TimerHandle
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let child = token.clone();
    let delay = delay.min(MAX_DELAY);

    tokio::spawn(async move {
        tokio::select! {
            biased;
            () = child.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
        task(child).await;
    });

    TimerHandle { token }
}

/// Run `task` every `period`, first after one full period.
///
/// Ticks never overlap: the next wait starts after the previous body returns.
pub(crate) fn schedule_repeating<F, Fut>(period: Duration, mut task: F) -> TimerHandle
where
    F: FnMut(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let child = token.clone();
    let period = period.clamp(MIN_PERIOD, MAX_DELAY);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = child.cancelled() => break,
                _ = interval.tick() => {}
            }
            task(child.clone()).await;
        }
    });

    TimerHandle { token }
}
