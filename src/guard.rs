//! One-shot cleanup guard.
//!
//! A [`Guard`] holds a fallible cleanup action and makes sure it runs at
//! most once. The owner either cancels the guard after the protected work
//! succeeded (the action never runs) or fires it (the action runs exactly
//! once). Both operations are safe to repeat and safe to race.
//!
//! The transaction layer arms one of these with the underlying rollback
//! call, but the guard itself knows nothing about transactions.

use std::fmt;
use std::mem;

use parking_lot::Mutex;

/// Where a guard is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStatus {
    /// The action has neither run nor been suppressed.
    Armed,
    /// `cancel` won: the action will never run.
    Cancelled,
    /// `fire` won: the action has already run.
    Fired,
}

impl fmt::Display for GuardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardStatus::Armed => write!(f, "armed"),
            GuardStatus::Cancelled => write!(f, "cancelled"),
            GuardStatus::Fired => write!(f, "fired"),
        }
    }
}

/// Guard state. The armed variant owns the action, so taking the action
/// out and leaving a terminal state behind is a single swap under the lock.
enum State<E> {
    Armed(Box<dyn FnOnce() -> Result<(), E> + Send>),
    Cancelled,
    Fired,
}

/// A one-shot trigger around a fallible cleanup action.
///
/// Transitions only armed→cancelled and armed→fired; once terminal, both
/// [`cancel`](Guard::cancel) and [`fire`](Guard::fire) are no-ops.
pub struct Guard<E> {
    state: Mutex<State<E>>,
}

impl<E> Guard<E> {
    /// Create a guard armed with the given action.
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        Self {
            state: Mutex::new(State::Armed(Box::new(action))),
        }
    }

    /// Suppress the action.
    ///
    /// Idempotent, and a no-op after [`fire`](Guard::fire) has run the
    /// action.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if matches!(*state, State::Armed(_)) {
            *state = State::Cancelled;
        }
    }

    /// Run the action if the guard is still armed.
    ///
    /// Returns the action's result on the first call after arming; in any
    /// terminal state this is a no-op returning `Ok(())`. When callers race,
    /// exactly one of them runs the action.
    pub fn fire(&self) -> Result<(), E> {
        let action = {
            let mut state = self.state.lock();
            match mem::replace(&mut *state, State::Fired) {
                State::Armed(action) => action,
                State::Cancelled => {
                    *state = State::Cancelled;
                    return Ok(());
                }
                State::Fired => return Ok(()),
            }
        };
        // Invoked outside the lock so a re-entrant cancel/fire from inside
        // the action cannot deadlock.
        action()
    }

    /// Current lifecycle state.
    pub fn status(&self) -> GuardStatus {
        match *self.state.lock() {
            State::Armed(_) => GuardStatus::Armed,
            State::Cancelled => GuardStatus::Cancelled,
            State::Fired => GuardStatus::Fired,
        }
    }
}

impl<E> fmt::Debug for Guard<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").field("status", &self.status()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn counting_guard() -> (Arc<AtomicUsize>, Guard<()>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let guard = Guard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (calls, guard)
    }

    #[test]
    fn test_fire_runs_action_once() {
        let (calls, guard) = counting_guard();
        assert_eq!(guard.status(), GuardStatus::Armed);

        assert!(guard.fire().is_ok());
        assert!(guard.fire().is_ok());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.status(), GuardStatus::Fired);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (calls, guard) = counting_guard();

        guard.cancel();
        guard.cancel();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(guard.status(), GuardStatus::Cancelled);
    }

    #[test]
    fn test_fire_after_cancel_is_noop() {
        let (calls, guard) = counting_guard();

        guard.cancel();
        assert!(guard.fire().is_ok());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(guard.status(), GuardStatus::Cancelled);
    }

    #[test]
    fn test_cancel_after_fire_keeps_fired() {
        let (calls, guard) = counting_guard();

        assert!(guard.fire().is_ok());
        guard.cancel();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.status(), GuardStatus::Fired);
    }

    #[test]
    fn test_fire_returns_action_error_once() {
        let guard: Guard<String> = Guard::new(|| Err("boom".to_string()));

        assert_eq!(guard.fire(), Err("boom".to_string()));
        // Terminal: the failure is not replayed.
        assert_eq!(guard.fire(), Ok(()));
        assert_eq!(guard.status(), GuardStatus::Fired);
    }

    #[test]
    fn test_concurrent_fire_runs_action_once() {
        let (calls, guard) = counting_guard();
        let guard = Arc::new(guard);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                thread::spawn(move || guard.fire())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_racing_cancel_and_fire() {
        let (calls, guard) = counting_guard();
        let guard = Arc::new(guard);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let guard = Arc::clone(&guard);
                thread::spawn(move || {
                    if i % 2 == 0 {
                        guard.cancel();
                    } else {
                        guard.fire().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Whichever side won, the action ran at most once.
        assert!(calls.load(Ordering::SeqCst) <= 1);
        assert_ne!(guard.status(), GuardStatus::Armed);
    }
}
