//! Owned periodic tasks.
//!
//! DESIGN
//! ======
//! A [`ScheduledTask`] is a spawned tokio loop whose lifetime is tied to the
//! value: dropping it aborts the loop, so teardown follows
//! ownership (the chat session owns its thread poll, the portal owns the page
//! poll). Ticks never overlap; a slow tick delays the next one and missed
//! ticks are skipped rather than bursted. Tick closures return
//! [`ControlFlow::Break`] when their owner is gone.
//!
//! Aborting does not cancel a backend request that a tick already issued;
//! the owner's generation checks discard such late results.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct ScheduledTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `tick` every `period`, first after one full period.
    pub fn every<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tick().await.is_break() {
                    break;
                }
            }
            debug!(task = name, "scheduled task stopped by owner");
        });
        debug!(task = name, period_ms = period.as_millis(), "scheduled task started");
        Self { name, handle }
    }

    /// Run `tick` immediately, then every `period` and whenever `trigger` is
    /// notified. Notifications that arrive while a tick runs collapse into one
    /// follow-up tick.
    pub fn every_or_triggered<F, Fut>(name: &'static str, period: Duration, trigger: Arc<Notify>, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = trigger.notified() => {
                        debug!(task = name, "scheduled task triggered");
                    }
                }
                if tick().await.is_break() {
                    break;
                }
            }
            debug!(task = name, "scheduled task stopped by owner");
        });
        debug!(task = name, period_ms = period.as_millis(), "triggerable task started");
        Self { name, handle }
    }

    /// Whether the loop has exited (owner gone or aborted).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            debug!(task = self.name, "scheduled task cancelled");
        }
    }
}

#[cfg(test)]
#[path = "schedule_test.rs"]
mod tests;
