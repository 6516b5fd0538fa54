//! Reentrant "save in flight" tracking
//!
//! [`BusyGuard::acquire`] hands out a [`BusyScope`]; the guard reports busy
//! while any scope is alive. Observers are told only about the transitions
//! idle -> busy and busy -> idle, however deeply saves nest.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::trace;

type Observer = Arc<dyn Fn(bool) + Send + Sync>;

struct BusyInner {
    outstanding: Mutex<usize>,
    observers: Mutex<Vec<Observer>>,
    state: watch::Sender<bool>,
}

/// Shared busy counter. Clones observe the same state.
#[derive(Clone)]
pub struct BusyGuard {
    inner: Arc<BusyInner>,
}

impl BusyGuard {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);

        Self {
            inner: Arc::new(BusyInner {
                outstanding: Mutex::new(0),
                observers: Mutex::new(Vec::new()),
                state,
            }),
        }
    }

    /// Enters a busy scope; dropping the scope leaves it.
    pub fn acquire(&self) -> BusyScope {
        let mut outstanding = lock(&self.inner.outstanding);
        *outstanding += 1;
        trace!(outstanding = *outstanding, "Busy scope acquired");

        if *outstanding == 1 {
            self.publish(true);
        }

        BusyScope {
            guard: self.clone(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.outstanding() > 0
    }

    /// Number of scopes currently alive
    pub fn outstanding(&self) -> usize {
        *lock(&self.inner.outstanding)
    }

    /// Registers a callback for busy transitions.
    ///
    /// Callbacks run synchronously while the counter is locked and must not
    /// acquire this guard themselves.
    pub fn on_change<F>(&self, observer: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        lock(&self.inner.observers).push(Arc::new(observer));
    }

    /// Watch channel carrying the current busy state
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe()
    }

    fn release(&self) {
        let mut outstanding = lock(&self.inner.outstanding);
        *outstanding = outstanding.saturating_sub(1);
        trace!(outstanding = *outstanding, "Busy scope released");

        if *outstanding == 0 {
            self.publish(false);
        }
    }

    fn publish(&self, busy: bool) {
        self.inner.state.send_replace(busy);

        let observers: Vec<Observer> = lock(&self.inner.observers).clone();
        for observer in observers {
            observer(busy);
        }
    }
}

impl Default for BusyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BusyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusyGuard")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Token returned by [`BusyGuard::acquire`]
#[must_use = "the guard reports idle as soon as the scope is dropped"]
pub struct BusyScope {
    guard: BusyGuard,
}

impl Drop for BusyScope {
    fn drop(&mut self) {
        self.guard.release();
    }
}

impl fmt::Debug for BusyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusyScope").finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(guard: &BusyGuard) -> Arc<Mutex<Vec<bool>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        guard.on_change(move |busy| sink.lock().unwrap().push(busy));
        seen
    }

    #[test]
    fn test_single_scope_fires_twice() {
        let guard = BusyGuard::new();
        let seen = recording(&guard);

        {
            let _scope = guard.acquire();
            assert!(guard.is_busy());
        }

        assert!(!guard.is_busy());
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_nested_scopes_fire_only_on_edges() {
        let guard = BusyGuard::new();
        let seen = recording(&guard);

        let outer = guard.acquire();
        let nested: Vec<BusyScope> = (0..5).map(|_| guard.acquire()).collect();
        assert_eq!(guard.outstanding(), 6);
        drop(nested);
        assert!(guard.is_busy());
        drop(outer);

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_release_on_panic() {
        let guard = BusyGuard::new();
        let cloned = guard.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _scope = cloned.acquire();
            panic!("save failed");
        }));

        assert!(result.is_err());
        assert!(!guard.is_busy());
    }

    #[tokio::test]
    async fn test_watch_channel_tracks_state() {
        let guard = BusyGuard::new();
        let mut rx = guard.subscribe();
        assert!(!*rx.borrow());

        let scope = guard.acquire();
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        drop(scope);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
    }
}
