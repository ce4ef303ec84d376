//! A virtual-time callback scheduler (spec.md §4.3).
//!
//! Ported from `original_source/src/prtcl/util/scheduler.hpp`. Callbacks run
//! against a virtual clock the caller advances explicitly (there is no wall
//! clock involved), and each callback decides its own next firing time by
//! returning a [`CallbackReturn`].

use std::time::Duration;

use log::debug;

/// A point in virtual time, measured from the scheduler's epoch.
pub type VirtualTime = Duration;

/// What a callback wants to happen after it runs.
pub enum CallbackReturn {
    /// Don't reschedule; the callback is dropped.
    DoNothing,
    /// Reschedule `after` the current tick time.
    RescheduleAfter(Duration),
    /// Reschedule at an absolute virtual time.
    RescheduleAt(VirtualTime),
}

type Callback = Box<dyn FnMut(VirtualTime) -> CallbackReturn + Send>;

struct Scheduled {
    time: VirtualTime,
    callback: Callback,
}

/// A scheduler over a single, explicitly-advanced virtual clock.
///
/// Entries are kept sorted by fire time ascending; [`Scheduler::tick`] fires
/// every entry whose time is `<= now`, staging reschedules into a side
/// buffer so a callback can't observe or disturb entries being processed in
/// the same tick (ported from the original's two-map staging approach).
#[derive(Default)]
pub struct Scheduler {
    now: VirtualTime,
    scheduled: Vec<Scheduled>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> VirtualTime {
        self.now
    }

    pub fn schedule_at(&mut self, time: VirtualTime, callback: Callback) {
        let pos = self
            .scheduled
            .iter()
            .position(|s| s.time > time)
            .unwrap_or(self.scheduled.len());
        self.scheduled.insert(pos, Scheduled { time, callback });
    }

    pub fn schedule_after(&mut self, delay: Duration, callback: Callback) {
        let time = self.now + delay;
        self.schedule_at(time, callback);
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scheduled.len()
    }

    /// Advances the virtual clock to `time` and fires every callback due by
    /// then, in ascending fire-time order.
    pub fn advance_to(&mut self, time: VirtualTime) {
        self.now = time;
        let due_count = self
            .scheduled
            .iter()
            .position(|s| s.time > time)
            .unwrap_or(self.scheduled.len());
        let due: Vec<Scheduled> = self.scheduled.drain(0..due_count).collect();
        if !due.is_empty() {
            debug!("firing {} callback(s) at t={:?}", due.len(), time);
        }

        let mut rescheduled = Vec::new();
        for mut entry in due {
            let fire_time = entry.time;
            match (entry.callback)(fire_time) {
                CallbackReturn::DoNothing => {}
                CallbackReturn::RescheduleAfter(delay) => {
                    rescheduled.push(Scheduled {
                        time: fire_time + delay,
                        callback: entry.callback,
                    });
                }
                CallbackReturn::RescheduleAt(t) => {
                    rescheduled.push(Scheduled {
                        time: t,
                        callback: entry.callback,
                    });
                }
            }
        }
        for entry in rescheduled {
            self.schedule_at(entry.time, entry.callback);
        }
    }

    pub fn advance_by(&mut self, delay: Duration) {
        let time = self.now + delay;
        self.advance_to(time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn callback_reschedules_itself_three_times() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let count_cb = count.clone();
        scheduler.schedule_after(
            Duration::from_secs(1),
            Box::new(move |_now| {
                let n = count_cb.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    CallbackReturn::RescheduleAfter(Duration::from_secs(1))
                } else {
                    CallbackReturn::DoNothing
                }
            }),
        );

        for _ in 0..5 {
            scheduler.advance_by(Duration::from_secs(1));
        }

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn fires_in_ascending_time_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        for (label, delay) in [(3, 3), (1, 1), (2, 2)] {
            let order = order.clone();
            scheduler.schedule_after(
                Duration::from_secs(delay),
                Box::new(move |_now| {
                    order.lock().push(label);
                    CallbackReturn::DoNothing
                }),
            );
        }
        scheduler.advance_by(Duration::from_secs(10));
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }
}
