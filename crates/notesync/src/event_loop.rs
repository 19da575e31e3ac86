//! Single-threaded task queue with a virtual clock.
//!
//! Every store completion, subscription delivery and request timeout runs as a
//! task on an [`EventLoop`]. Nothing runs until the owner pumps the loop, so a
//! request's callback can never fire re-entrantly inside the call that issued
//! it.
//!
//! Time is virtual: [`EventLoop::advance`] moves the clock and fires due
//! timers, [`EventLoop::run_to_completion`] jumps straight to the next timer
//! whenever the ready queue drains.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

type Task = Box<dyn FnOnce()>;

/// Handle for a delayed task, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId {
    deadline: Duration,
    seq: u64,
}

#[derive(Default)]
struct LoopState {
    now: Duration,
    next_seq: u64,
    ready: VecDeque<Task>,
    timers: BTreeMap<TimerId, Task>,
}

/// Cheap to clone; all clones share one queue.
#[derive(Clone, Default)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task to run on the next pump.
    pub fn post(&self, task: impl FnOnce() + 'static) {
        self.state.borrow_mut().ready.push_back(Box::new(task));
    }

    /// Queue a task to run once the clock has advanced by `delay`.
    pub fn post_delayed(&self, delay: Duration, task: impl FnOnce() + 'static) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = TimerId {
            deadline: state.now + delay,
            seq: state.next_seq,
        };
        state.next_seq += 1;
        state.timers.insert(id, Box::new(task));
        id
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        self.state.borrow_mut().timers.remove(&id).is_some()
    }

    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of ready tasks plus armed timers.
    pub fn pending(&self) -> usize {
        let state = self.state.borrow();
        state.ready.len() + state.timers.len()
    }

    /// Run ready tasks (including ones they post) without moving the clock.
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow must end before the task runs: tasks post more tasks.
            let task = self.state.borrow_mut().ready.pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Move the clock forward by `by`, firing due timers in deadline order and
    /// draining the ready queue after each one.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = self.run_until_idle();
        while let Some(task) = self.pop_timer_due_by(target) {
            task();
            ran += 1 + self.run_until_idle();
        }
        self.state.borrow_mut().now = target;
        ran
    }

    /// Run until there is nothing left to do, jumping the clock to each armed
    /// timer in turn.
    pub fn run_to_completion(&self) -> usize {
        let mut ran = self.run_until_idle();
        while let Some(task) = self.pop_timer_due_by(Duration::MAX) {
            task();
            ran += 1 + self.run_until_idle();
        }
        ran
    }

    fn pop_timer_due_by(&self, limit: Duration) -> Option<Task> {
        let mut state = self.state.borrow_mut();
        let id = *state.timers.keys().next()?;
        if id.deadline > limit {
            return None;
        }
        if id.deadline > state.now {
            state.now = id.deadline;
        }
        state.timers.remove(&id)
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventLoop")
            .field("now", &state.now)
            .field("ready", &state.ready.len())
            .field("timers", &state.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, EventLoop) {
        (Rc::new(RefCell::new(Vec::new())), EventLoop::new())
    }

    #[test]
    fn test_post_runs_only_when_pumped() {
        let (log, event_loop) = recorder();
        let l = log.clone();
        event_loop.post(move || l.borrow_mut().push("a"));
        assert!(log.borrow().is_empty());
        assert_eq!(event_loop.run_until_idle(), 1);
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn test_tasks_posted_by_tasks_run_in_same_pump() {
        let (log, event_loop) = recorder();
        let l = log.clone();
        let inner_loop = event_loop.clone();
        event_loop.post(move || {
            l.borrow_mut().push("outer");
            let l2 = l.clone();
            inner_loop.post(move || l2.borrow_mut().push("inner"));
        });
        assert_eq!(event_loop.run_until_idle(), 2);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let (log, event_loop) = recorder();
        let l1 = log.clone();
        let l2 = log.clone();
        event_loop.post_delayed(Duration::from_millis(20), move || l1.borrow_mut().push("late"));
        event_loop.post_delayed(Duration::from_millis(10), move || l2.borrow_mut().push("early"));

        event_loop.advance(Duration::from_millis(15));
        assert_eq!(*log.borrow(), vec!["early"]);
        assert_eq!(event_loop.now(), Duration::from_millis(15));

        event_loop.advance(Duration::from_millis(5));
        assert_eq!(*log.borrow(), vec!["early", "late"]);
    }

    #[test]
    fn test_cancel_timer() {
        let (log, event_loop) = recorder();
        let l = log.clone();
        let id = event_loop.post_delayed(Duration::from_millis(5), move || l.borrow_mut().push("x"));
        assert!(event_loop.cancel_timer(id));
        assert!(!event_loop.cancel_timer(id));
        event_loop.run_to_completion();
        assert!(log.borrow().is_empty());
        assert_eq!(event_loop.pending(), 0);
    }

    #[test]
    fn test_run_to_completion_jumps_clock() {
        let (log, event_loop) = recorder();
        let l = log.clone();
        event_loop.post_delayed(Duration::from_secs(30), move || l.borrow_mut().push("t"));
        event_loop.run_to_completion();
        assert_eq!(*log.borrow(), vec!["t"]);
        assert_eq!(event_loop.now(), Duration::from_secs(30));
    }
}
