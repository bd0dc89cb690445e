//! Timers
//!
//! Interval timers driven by explicit ticks from the scheduler. A firing
//! timer only hands its action back; callers enqueue it, so timers stay
//! subject to the queue lock.

use std::collections::BTreeMap;
use std::time::Duration;

/// Timer handle
pub type TimerId = u32;

/// Timer entry
#[derive(Debug, Clone)]
pub struct Timer<A> {
    pub id: TimerId,
    pub action: A,
    pub period: Duration,
    /// Remaining firings; `None` repeats forever
    pub remaining: Option<u32>,
    pub paused: bool,
    elapsed: Duration,
}

/// Timer set owned by one document
#[derive(Debug)]
pub struct TimerSet<A> {
    timers: BTreeMap<TimerId, Timer<A>>,
    next_id: TimerId,
}

impl<A: Clone> TimerSet<A> {
    pub fn new() -> Self {
        Self {
            timers: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Schedule an interval. `iterations == 0` repeats until cleared.
    pub fn schedule(&mut self, action: A, period: Duration, iterations: u32) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.timers.insert(
            id,
            Timer {
                id,
                action,
                period: period.max(Duration::from_millis(1)),
                remaining: (iterations > 0).then_some(iterations),
                paused: false,
                elapsed: Duration::ZERO,
            },
        );
        id
    }

    pub fn clear(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    pub fn pause(&mut self, id: TimerId) -> bool {
        self.set_paused(id, true)
    }

    pub fn resume(&mut self, id: TimerId) -> bool {
        self.set_paused(id, false)
    }

    fn set_paused(&mut self, id: TimerId, paused: bool) -> bool {
        match self.timers.get_mut(&id) {
            Some(timer) => {
                timer.paused = paused;
                true
            }
            None => false,
        }
    }

    /// Advance time; each due timer fires at most once per call.
    pub fn advance(&mut self, delta: Duration) -> Vec<(TimerId, A)> {
        let mut fired = Vec::new();
        let mut finished = Vec::new();

        for timer in self.timers.values_mut().filter(|t| !t.paused) {
            timer.elapsed += delta;
            if timer.elapsed < timer.period {
                continue;
            }
            timer.elapsed = Duration::ZERO;
            fired.push((timer.id, timer.action.clone()));

            if let Some(remaining) = timer.remaining.as_mut() {
                *remaining -= 1;
                if *remaining == 0 {
                    finished.push(timer.id);
                }
            }
        }

        for id in finished {
            self.timers.remove(&id);
        }
        fired
    }

    pub fn get(&self, id: TimerId) -> Option<&Timer<A>> {
        self.timers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<A: Clone> Default for TimerSet<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_interval_fires() {
        let mut timers = TimerSet::new();
        let id = timers.schedule("a", 100 * MS, 0);

        assert!(timers.advance(50 * MS).is_empty());
        assert_eq!(timers.advance(60 * MS), vec![(id, "a")]);
        assert!(timers.advance(50 * MS).is_empty());
        assert_eq!(timers.advance(50 * MS).len(), 1);
        assert!(timers.get(id).is_some());
    }

    #[test]
    fn test_iterations_auto_remove() {
        let mut timers = TimerSet::new();
        let id = timers.schedule("a", 10 * MS, 2);

        assert_eq!(timers.advance(10 * MS).len(), 1);
        assert_eq!(timers.get(id).and_then(|t| t.remaining), Some(1));
        assert_eq!(timers.advance(10 * MS).len(), 1);
        assert!(timers.is_empty());
    }

    #[test]
    fn test_pause_resume_clear() {
        let mut timers = TimerSet::new();
        let id = timers.schedule("a", 10 * MS, 0);

        assert!(timers.pause(id));
        assert!(timers.advance(100 * MS).is_empty());
        assert!(timers.resume(id));
        assert_eq!(timers.advance(10 * MS).len(), 1);

        assert!(timers.clear(id));
        assert!(!timers.clear(id));
        assert!(!timers.pause(id));
    }
}
