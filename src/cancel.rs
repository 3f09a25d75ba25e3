use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::watch;

type Listener = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    state: watch::Sender<bool>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener: AtomicU64,
}

/// Cooperative cancellation shared between a build pipeline and the
/// processes it spawns.
///
/// Cloning yields another handle on the same signal. Cancelling is
/// idempotent: listeners run exactly once, on the first call.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state,
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// Signals cancellation. Returns `true` only for the call that flipped
    /// the signal.
    pub fn cancel(&self) -> bool {
        let flipped = self.inner.state.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });

        if flipped {
            let listeners: Vec<Listener> = self
                .inner
                .listeners
                .lock()
                .drain()
                .map(|(_, listener)| listener)
                .collect();
            for listener in listeners {
                listener();
            }
        }

        flipped
    }

    /// Resolves once the token is cancelled (immediately if it already is).
    pub async fn cancelled(&self) {
        let mut state = self.inner.state.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = state.wait_for(|cancelled| *cancelled).await;
    }

    /// Registers a callback to run on cancellation. If the token is already
    /// cancelled the callback runs right away.
    ///
    /// Dropping the returned guard deregisters the callback.
    #[must_use = "dropping the guard deregisters the listener"]
    pub fn on_cancel(&self, listener: impl FnOnce() + Send + 'static) -> CancelGuard {
        let key = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);

        {
            let mut listeners = self.inner.listeners.lock();
            if !self.is_cancelled() {
                listeners.insert(key, Box::new(listener));
                return CancelGuard {
                    token: Some(self.clone()),
                    key,
                };
            }
        }

        listener();
        CancelGuard { token: None, key }
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

pub struct CancelGuard {
    token: Option<CancelToken>,
    key: u64,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.inner.listeners.lock().remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let _guard = token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_multiple_listeners_and_deregistration() {
        let token = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = calls.clone();
        let _kept = token.on_cancel(move || {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = calls.clone();
        let dropped = token.on_cancel(move || {
            second.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(token.listener_count(), 2);

        drop(dropped);
        assert_eq!(token.listener_count(), 1);

        token.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(token.listener_count(), 0);
    }

    #[test]
    fn test_listener_on_cancelled_token_runs_immediately() {
        let token = CancelToken::new();
        token.cancel();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _guard = token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(token.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_future_wakes() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() did not resolve")
            .unwrap();
    }
}
