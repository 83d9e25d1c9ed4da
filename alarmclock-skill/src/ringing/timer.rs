//! Cancellable single-shot timers that report back to the event loop.
//!
//! A timer is a spawned task that sleeps and then posts a [`TimerEvent`].
//! The site keeps the matching [`TimerHandle`]; dropping or cancelling the
//! handle stops the task. An event that still arrives after its handle was
//! replaced carries a stale id and is ignored by the receiver.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::tracing::prelude::*;
use crate::types::SiteId;

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TimerKind {
    /// Unacknowledged ringing gives up.
    RingTimeout,

    /// No session followed the acknowledgement.
    SessionWait,

    /// No answer to the snooze question.
    AnswerWait,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEvent {
    pub site_id: SiteId,
    pub timer_id: u64,
    pub kind: TimerKind,
}

/// Owner side of a scheduled timer. Cancels the timer when dropped.
#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    kind: TimerKind,
    cancel: CancellationToken,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// Whether `event` was produced by this timer.
    pub fn matches(&self, event: &TimerEvent) -> bool {
        self.id == event.timer_id && self.kind == event.kind
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Timer factory shared by the ring controller and the dialogue coordinator.
#[derive(Debug, Clone)]
pub struct Timers {
    tx: mpsc::Sender<TimerEvent>,
    next_id: Arc<AtomicU64>,
}

impl Timers {
    pub fn new() -> (Self, mpsc::Receiver<TimerEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let timers = Self {
            tx,
            next_id: Arc::new(AtomicU64::new(0)),
        };
        (timers, rx)
    }

    /// Post a `kind` event for `site_id` after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, site_id: &SiteId, kind: TimerKind, delay: Duration) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let deadline = tokio::time::Instant::now() + delay;
        let cancel = CancellationToken::new();

        let event = TimerEvent {
            site_id: site_id.clone(),
            timer_id: id,
            kind,
        };
        let tx = self.tx.clone();
        let cancelled = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {
                    trace!(site = %event.site_id, timer = id, kind = %event.kind, "Timer cancelled");
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if tx.send(event).await.is_err() {
                        debug!(timer = id, "Timer event channel closed");
                    }
                }
            }
        });

        TimerHandle { id, kind, cancel }
    }
}
