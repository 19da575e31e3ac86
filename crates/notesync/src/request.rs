//! Request plumbing: timeouts with bounded retry, and joining several writes
//! into one completion.
//!
//! A one-shot request is armed with a timer. If the response arrives first the
//! timer is cancelled; if the timer fires first the attempt is abandoned (a
//! late response is discarded) and the request is reissued after a backoff
//! that doubles each time. Once `max_retries` reissues have timed out the
//! caller gets [`GatewayError::StoreUnavailable`]. Errors reported by the
//! store are passed through without retrying.

use crate::error::{GatewayError, Result};
use crate::event_loop::{EventLoop, TimerId};
use crate::store::{Callback, Completion};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5_000),
            max_retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Delay before reissue number `retry` (0-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(retry))
    }
}

type Issue<T> = Rc<dyn Fn(Callback<T>)>;

struct Pending<T> {
    event_loop: EventLoop,
    policy: RetryPolicy,
    label: &'static str,
    issue: Issue<T>,
    on_complete: RefCell<Option<Callback<T>>>,
}

impl<T> Pending<T> {
    fn finish(&self, result: Result<T>) {
        if let Some(on_complete) = self.on_complete.borrow_mut().take() {
            on_complete(result);
        }
    }
}

/// Issue a request through `issue`, applying the timeout/retry policy.
/// `on_complete` is invoked exactly once.
pub fn with_retry<T: 'static>(
    event_loop: &EventLoop,
    policy: RetryPolicy,
    label: &'static str,
    issue: impl Fn(Callback<T>) + 'static,
    on_complete: Callback<T>,
) {
    let pending = Rc::new(Pending {
        event_loop: event_loop.clone(),
        policy,
        label,
        issue: Rc::new(issue),
        on_complete: RefCell::new(Some(on_complete)),
    });
    attempt(pending, 0);
}

fn attempt<T: 'static>(pending: Rc<Pending<T>>, attempt_no: u32) {
    let settled = Rc::new(Cell::new(false));
    let timer: Rc<Cell<Option<TimerId>>> = Rc::new(Cell::new(None));

    let on_timeout = {
        let pending = pending.clone();
        let settled = settled.clone();
        move || {
            if settled.replace(true) {
                return;
            }
            if attempt_no < pending.policy.max_retries {
                let delay = pending.policy.backoff_for(attempt_no);
                tracing::warn!(
                    request = pending.label,
                    attempt = attempt_no + 1,
                    retry_in_ms = delay.as_millis() as u64,
                    "Request timed out, retrying"
                );
                let next = pending.clone();
                pending
                    .event_loop
                    .post_delayed(delay, move || attempt(next, attempt_no + 1));
            } else {
                tracing::warn!(
                    request = pending.label,
                    attempts = attempt_no + 1,
                    "Request timed out, giving up"
                );
                pending.finish(Err(GatewayError::StoreUnavailable(format!(
                    "{} timed out after {} attempt(s)",
                    pending.label,
                    attempt_no + 1
                ))));
            }
        }
    };
    timer.set(Some(
        pending
            .event_loop
            .post_delayed(pending.policy.timeout, on_timeout),
    ));

    let responder = {
        let pending = pending.clone();
        let settled = settled.clone();
        let timer = timer.clone();
        Box::new(move |result: Result<T>| {
            if settled.replace(true) {
                tracing::debug!(request = pending.label, "Discarding late response");
                return;
            }
            if let Some(id) = timer.take() {
                pending.event_loop.cancel_timer(id);
            }
            pending.finish(result);
        })
    };
    (pending.issue)(responder);
}

/// Fans one completion out to `count` writes. The callback fires once, after
/// the last write reports, with the first error seen (if any).
pub struct WriteJoin {
    remaining: Cell<usize>,
    first_error: RefCell<Option<GatewayError>>,
    on_complete: RefCell<Option<Completion>>,
}

impl WriteJoin {
    pub fn new(count: usize, on_complete: Completion) -> Rc<Self> {
        let join = Rc::new(Self {
            remaining: Cell::new(count),
            first_error: RefCell::new(None),
            on_complete: RefCell::new(Some(on_complete)),
        });
        if count == 0 {
            join.fire();
        }
        join
    }

    /// Completion for one of the joined writes.
    pub fn part(self: &Rc<Self>) -> Completion {
        let join = self.clone();
        Box::new(move |result| {
            if let Err(err) = result {
                join.first_error.borrow_mut().get_or_insert(err);
            }
            let left = join.remaining.get().saturating_sub(1);
            join.remaining.set(left);
            if left == 0 {
                join.fire();
            }
        })
    }

    fn fire(&self) {
        let Some(on_complete) = self.on_complete.borrow_mut().take() else {
            return;
        };
        match self.first_error.borrow_mut().take() {
            Some(err) => on_complete(Err(err)),
            None => on_complete(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Slot<T> = Rc<RefCell<Vec<Result<T>>>>;

    fn sink<T: 'static>() -> (Slot<T>, Callback<T>) {
        let slot: Slot<T> = Rc::new(RefCell::new(Vec::new()));
        let s = slot.clone();
        (slot, Box::new(move |r| s.borrow_mut().push(r)))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(100),
            max_retries: 2,
            backoff: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let p = policy();
        assert_eq!(p.backoff_for(0), Duration::from_millis(10));
        assert_eq!(p.backoff_for(1), Duration::from_millis(20));
        assert_eq!(p.backoff_for(2), Duration::from_millis(40));
    }

    #[test]
    fn test_fast_response_cancels_timer() {
        let event_loop = EventLoop::new();
        let (slot, cb) = sink::<u32>();
        let el = event_loop.clone();
        with_retry(
            &event_loop,
            policy(),
            "fetch",
            move |respond| el.post(move || respond(Ok(7))),
            cb,
        );
        event_loop.run_until_idle();
        assert_eq!(slot.borrow().len(), 1);
        assert_eq!(*slot.borrow()[0].as_ref().unwrap(), 7);
        assert_eq!(event_loop.pending(), 0, "timeout timer must be cancelled");
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let event_loop = EventLoop::new();
        let (slot, cb) = sink::<u32>();
        let issued = Rc::new(Cell::new(0));
        let counter = issued.clone();
        with_retry(
            &event_loop,
            policy(),
            "fetch",
            move |_respond| counter.set(counter.get() + 1),
            cb,
        );
        event_loop.run_to_completion();
        assert_eq!(issued.get(), 3);
        let results = slot.borrow();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(GatewayError::StoreUnavailable(_))));
        // 100 + 10 + 100 + 20 + 100
        assert_eq!(event_loop.now(), Duration::from_millis(330));
    }

    #[test]
    fn test_retry_succeeds_and_late_response_discarded() {
        let event_loop = EventLoop::new();
        let (slot, cb) = sink::<u32>();
        let held: Rc<RefCell<Vec<Callback<u32>>>> = Rc::new(RefCell::new(Vec::new()));
        let keep = held.clone();
        let el = event_loop.clone();
        let issued = Rc::new(Cell::new(0));
        let counter = issued.clone();
        with_retry(
            &event_loop,
            policy(),
            "fetch",
            move |respond| {
                counter.set(counter.get() + 1);
                if counter.get() == 1 {
                    keep.borrow_mut().push(respond);
                } else {
                    el.post(move || respond(Ok(2)));
                }
            },
            cb,
        );
        event_loop.run_to_completion();
        let late = held.borrow_mut().pop().unwrap();
        late(Ok(1));

        let results = slot.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(*results[0].as_ref().unwrap(), 2);
        assert_eq!(issued.get(), 2);
    }

    #[test]
    fn test_store_error_is_not_retried() {
        let event_loop = EventLoop::new();
        let (slot, cb) = sink::<u32>();
        let el = event_loop.clone();
        let issued = Rc::new(Cell::new(0));
        let counter = issued.clone();
        with_retry(
            &event_loop,
            policy(),
            "fetch",
            move |respond| {
                counter.set(counter.get() + 1);
                el.post(move || respond(Err(GatewayError::StoreUnavailable("down".into()))));
            },
            cb,
        );
        event_loop.run_to_completion();
        assert_eq!(issued.get(), 1);
        assert!(slot.borrow()[0].is_err());
    }

    #[test]
    fn test_write_join_waits_for_all_parts() {
        let (slot, cb) = sink::<()>();
        let join = WriteJoin::new(3, cb);
        let parts: Vec<Completion> = (0..3).map(|_| join.part()).collect();
        let mut parts = parts.into_iter();
        parts.next().unwrap()(Ok(()));
        parts.next().unwrap()(Err(GatewayError::StoreUnavailable("first".into())));
        assert!(slot.borrow().is_empty());
        parts.next().unwrap()(Err(GatewayError::StoreUnavailable("second".into())));

        let results = slot.borrow();
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(GatewayError::StoreUnavailable(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_write_join_zero_parts_fires_immediately() {
        let (slot, cb) = sink::<()>();
        let _join = WriteJoin::new(0, cb);
        assert!(slot.borrow()[0].is_ok());
    }
}
