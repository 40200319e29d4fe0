//! Access lock with bounded wait.
//!
//! The daemon serves exactly one client, so every connection for an endpoint
//! is created and used while this lock is held. The holder is represented by
//! [`AccessGuard`]; [`AccessLock::release`] with nothing held is a no-op.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Mutual-exclusion lock for one daemon endpoint.
#[derive(Debug, Default)]
pub struct AccessLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl AccessLock {
    /// Create an unheld lock.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        // The flag stays consistent even if a holder panicked mid-update.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to take the lock, blocking up to `timeout`.
    ///
    /// Returns `false` if the lock was still held when the timeout expired.
    pub fn acquire(&self, timeout: Duration) -> bool {
        // A timeout too large to represent as a deadline waits without bound.
        let deadline = Instant::now().checked_add(timeout);
        let mut held = self.state();
        while *held {
            held = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.released
                        .wait_timeout(held, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.released.wait(held).unwrap_or_else(PoisonError::into_inner),
            };
        }
        *held = true;
        true
    }

    /// Release the lock.
    ///
    /// Releasing a lock that is not held is a no-op, so cleanup paths that
    /// run after a partial failure may call this unconditionally.
    pub fn release(&self) {
        let mut held = self.state();
        if !*held {
            log::debug!("[lock] release called without a holder; ignoring");
            return;
        }
        *held = false;
        drop(held);
        self.released.notify_one();
    }

    /// Whether some caller currently holds the lock.
    pub fn is_held(&self) -> bool {
        *self.state()
    }

    /// RAII variant of [`acquire`](Self::acquire).
    pub fn lock_for(&self, timeout: Duration) -> Option<AccessGuard<'_>> {
        self.acquire(timeout).then_some(AccessGuard { lock: self })
    }
}

/// Holds an [`AccessLock`] until dropped.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct AccessGuard<'a> {
    lock: &'a AccessLock,
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_and_release() {
        let lock = AccessLock::new();
        assert!(lock.acquire(Duration::from_millis(10)));
        assert!(lock.is_held());
        lock.release();
        assert!(!lock.is_held());
        assert!(lock.acquire(Duration::from_millis(10)));
    }

    #[test]
    fn test_acquire_times_out_while_held() {
        let lock = AccessLock::new();
        assert!(lock.acquire(Duration::ZERO));

        let start = Instant::now();
        assert!(!lock.acquire(Duration::from_millis(100)));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_unbounded_timeout_acquires_free_lock() {
        let lock = AccessLock::new();
        assert!(lock.acquire(Duration::MAX));
        assert!(lock.is_held());
        lock.release();
        assert!(lock.lock_for(Duration::MAX).is_some());
    }

    #[test]
    fn test_unbounded_timeout_waits_for_release() {
        let lock = Arc::new(AccessLock::new());
        assert!(lock.acquire(Duration::ZERO));

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.acquire(Duration::MAX))
        };
        thread::sleep(Duration::from_millis(50));
        lock.release();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_release_without_holder_is_noop() {
        let lock = AccessLock::new();
        lock.release();
        lock.release();
        assert!(!lock.is_held());
        assert!(lock.acquire(Duration::from_millis(10)));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = AccessLock::new();
        {
            let _guard = lock.lock_for(Duration::from_millis(10)).unwrap();
            assert!(lock.is_held());
            assert!(lock.lock_for(Duration::from_millis(10)).is_none());
        }
        assert!(!lock.is_held());
    }

    #[test]
    fn test_waiter_wakes_when_released() {
        let lock = Arc::new(AccessLock::new());
        assert!(lock.acquire(Duration::ZERO));

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.acquire(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(50));
        lock.release();
        assert!(waiter.join().unwrap());
        assert!(lock.is_held());
    }

    #[test]
    fn test_at_most_one_holder() {
        let lock = Arc::new(AccessLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = lock.lock_for(Duration::from_secs(10)).unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
