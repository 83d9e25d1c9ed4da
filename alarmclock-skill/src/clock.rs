//! Wall-clock source and tick bookkeeping.
//!
//! The skill polls the clock at [`Config::poll_interval`](crate::config::Config)
//! and asks the store for every alarm at or before the current minute. Because
//! the due lookup is a range scan, a tick that arrives late (suspend, clock
//! step) still fires everything that fell into the gap; [`Clock::tick`] only
//! has to notice and report it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tokio::time::{Interval, MissedTickBehavior};

use crate::tracing::prelude::*;
use crate::types::minute;

/// Source of local wall-clock time.
pub trait TimeSource: Send + Sync + fmt::Debug {
    /// Current local time at full precision.
    fn now(&self) -> PrimitiveDateTime;
}

/// The system clock at a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    offset: UtcOffset,
}

impl SystemTimeSource {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    /// Use the machine's current local offset.
    ///
    /// Must run before any other thread is spawned: the offset lookup is
    /// refused once the process is multi-threaded, in which case UTC is used.
    pub fn local() -> Self {
        match UtcOffset::current_local_offset() {
            Ok(offset) => Self::new(offset),
            Err(e) => {
                warn!(error = %e, "Local UTC offset unavailable, scheduling in UTC");
                Self::new(UtcOffset::UTC)
            }
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> PrimitiveDateTime {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        PrimitiveDateTime::new(now.date(), now.time())
    }
}

/// Manually driven time, for simulations and tests.
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Mutex<PrimitiveDateTime>,
}

impl ManualTimeSource {
    pub fn new(start: PrimitiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: PrimitiveDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> PrimitiveDateTime {
        *self.now.lock()
    }
}

/// Result of one clock poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Current minute.
    pub now: PrimitiveDateTime,

    /// Whole minutes that passed without a tick observing them.
    pub skipped_minutes: i64,
}

/// Minute-granularity clock driving due-alarm checks.
#[derive(Debug)]
pub struct Clock {
    source: Arc<dyn TimeSource>,
    poll_interval: Duration,
    last_minute: Option<PrimitiveDateTime>,
}

impl Clock {
    pub fn new(source: Arc<dyn TimeSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
            last_minute: None,
        }
    }

    /// Current time truncated to the minute.
    pub fn now(&self) -> PrimitiveDateTime {
        minute::truncate(self.source.now())
    }

    pub fn source(&self) -> Arc<dyn TimeSource> {
        Arc::clone(&self.source)
    }

    /// Interval that paces [`tick`](Self::tick) calls.
    ///
    /// Late polls are skipped rather than bursted; the range-based due
    /// lookup makes a burst pointless.
    pub fn interval(&self) -> Interval {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    /// Sample the clock and compare with the previous sample.
    pub fn tick(&mut self) -> Tick {
        let now = self.now();
        let mut skipped_minutes = 0;

        if let Some(last) = self.last_minute {
            let gap = (now - last).whole_minutes();
            if gap > 1 {
                skipped_minutes = gap - 1;
                warn!(
                    from = %minute::format(last),
                    to = %minute::format(now),
                    skipped_minutes,
                    "Clock jumped forward; firing everything due in the gap"
                );
            } else if gap < 0 {
                warn!(
                    from = %minute::format(last),
                    to = %minute::format(now),
                    "Clock moved backwards"
                );
            }
        }

        self.last_minute = Some(now);
        Tick {
            now,
            skipped_minutes,
        }
    }
}
