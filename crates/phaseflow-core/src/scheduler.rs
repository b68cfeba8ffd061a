//! Single-threaded tick scheduling
//!
//! The explicit replacement for timer calls scattered across components: one
//! fixed-tick loop drives the serial analysis pipeline, a min-heap timer
//! wheel fires latency-compensated callbacks, and an independent
//! low-frequency timer paces the offset adaptation. Callbacks are
//! fire-and-forget and never touch shared analysis state directly.

use crate::latency::LatencyCompensator;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Opaque handle for cancelling a scheduled callback.
pub type TimerHandle = u64;

type Callback = Box<dyn FnOnce(f64) + Send>;

struct Scheduled {
    due_ms: f64,
    handle: TimerHandle,
    callback: Callback,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}
impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reverse ordering: BinaryHeap is a max-heap, we want the earliest due time
// on top
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_ms
            .total_cmp(&self.due_ms)
            .then_with(|| other.handle.cmp(&self.handle))
    }
}

/// Timer wheel plus the slow adaptation timer.
pub struct TickScheduler {
    timers: BinaryHeap<Scheduled>,
    cancelled: HashSet<TimerHandle>,
    next_handle: TimerHandle,
    adapt_interval_ms: f64,
    last_adapt_ms: f64,
}

impl TickScheduler {
    /// Create a scheduler. `adapt_interval_ms` paces [`Self::poll_adaptation`].
    pub fn new(adapt_interval_ms: f64) -> Self {
        Self {
            timers: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_handle: 0,
            adapt_interval_ms,
            last_adapt_ms: 0.0,
        }
    }

    /// Schedule `callback` to fire `delay_ms` from `now_ms`. The callback
    /// receives the scheduler time at which it actually fired.
    pub fn schedule(
        &mut self,
        now_ms: f64,
        delay_ms: f64,
        callback: impl FnOnce(f64) + Send + 'static,
    ) -> TimerHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.timers.push(Scheduled {
            due_ms: now_ms + delay_ms.max(0.0),
            handle,
            callback: Box::new(callback),
        });
        handle
    }

    /// Schedule with the adaptive latency offset folded into the delay, so
    /// the visible effect lands in sync with the audio that caused it.
    pub fn schedule_compensated(
        &mut self,
        now_ms: f64,
        delay_ms: f64,
        compensator: &LatencyCompensator,
        callback: impl FnOnce(f64) + Send + 'static,
    ) -> TimerHandle {
        let compensated_delay = delay_ms + compensator.profile().adaptive_offset_ms;
        self.schedule(now_ms, compensated_delay, callback)
    }

    /// Invalidate a pending callback. Firing a cancelled handle is a no-op;
    /// cancelling an already-fired or unknown handle is too.
    pub fn cancel(&mut self, handle: TimerHandle) {
        self.cancelled.insert(handle);
    }

    /// Fire every callback due at `now_ms`, in due-time order. Returns the
    /// number fired.
    pub fn pump(&mut self, now_ms: f64) -> usize {
        let mut fired = 0;
        loop {
            match self.timers.peek() {
                Some(top) if top.due_ms <= now_ms => {}
                _ => break,
            }
            if let Some(entry) = self.timers.pop() {
                if self.cancelled.remove(&entry.handle) {
                    continue;
                }
                (entry.callback)(now_ms);
                fired += 1;
            }
        }
        fired
    }

    /// True when one adaptation interval has elapsed; the caller then runs
    /// the compensator's adapt pass. Keeps the slow timer out of the
    /// per-frame path.
    pub fn poll_adaptation(&mut self, now_ms: f64) -> bool {
        if now_ms - self.last_adapt_ms >= self.adapt_interval_ms {
            self.last_adapt_ms = now_ms;
            true
        } else {
            false
        }
    }

    /// Number of callbacks waiting to fire.
    pub fn pending(&self) -> usize {
        self.timers.len() - self.cancelled.len().min(self.timers.len())
    }
}
