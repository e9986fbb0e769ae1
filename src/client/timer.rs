//! Cancellable timers over tokio sleep tasks.
//!
//! Each timer is a spawned task that sleeps and then pushes an event into
//! the supervisor's channel, so ticks are serialized with everything else.
//! Scheduling while armed replaces the previous timer (cancel before
//! reschedule), and dropping the timer aborts it.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// A timer slot holding at most one scheduled task.
#[derive(Debug, Default)]
pub struct CancellableTimer {
    handle: Option<JoinHandle<()>>,
}

impl CancellableTimer {
    /// Create an unarmed timer
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tick is still scheduled
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Deliver one event after `delay`, replacing any scheduled tick
    pub fn schedule_once<T: Send + 'static>(
        &mut self,
        delay: Duration,
        events: UnboundedSender<T>,
        tick: T,
    ) {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(tick);
        }));
    }

    /// Deliver an event every `period` until canceled, replacing any
    /// scheduled tick
    pub fn schedule_repeating<T: Send + 'static>(
        &mut self,
        period: Duration,
        events: UnboundedSender<T>,
        tick: impl Fn() -> T + Send + 'static,
    ) {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if events.send(tick()).is_err() {
                    break;
                }
            }
        }));
    }

    /// Abort the scheduled tick, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for CancellableTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = CancellableTimer::new();

        timer.schedule_once(Duration::from_secs(1), tx, "tick");
        assert!(timer.is_armed());

        assert_eq!(rx.recv().await, Some("tick"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel::<&str>();
        let mut timer = CancellableTimer::new();

        timer.schedule_once(Duration::from_secs(1), tx, "tick");
        timer.cancel();
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = CancellableTimer::new();

        timer.schedule_once(Duration::from_secs(1), tx.clone(), "first");
        timer.schedule_once(Duration::from_secs(1), tx, "second");

        assert_eq!(rx.recv().await, Some("second"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_ticks_until_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = CancellableTimer::new();

        timer.schedule_repeating(Duration::from_secs(2), tx, || "tick");

        assert_eq!(rx.recv().await, Some("tick"));
        assert_eq!(rx.recv().await, Some("tick"));
        assert_eq!(rx.recv().await, Some("tick"));

        timer.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
