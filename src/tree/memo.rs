//! Compute-once size cell with explicit invalidation.
//!
//! A [`SizeCell`] stores a `u64` behind an atomic fast path. The first
//! caller to find it empty takes the lock, re-checks, computes and publishes
//! the value; concurrent callers block on the lock and then read the
//! published value, so the computation runs at most once per fill. The lock
//! guard is dropped on every exit path, including an error from the
//! initializer, and a poisoned lock is recovered because the cell only ever
//! holds a fully published value or the sentinel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Sentinel meaning "not computed". No real file or directory reaches it.
const UNSET: u64 = u64::MAX;

/// Lazily computed, thread-safe byte size.
#[derive(Debug)]
pub struct SizeCell {
    value: AtomicU64,
    fill: Mutex<()>,
}

impl Default for SizeCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SizeCell {
    /// An empty cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(UNSET),
            fill: Mutex::new(()),
        }
    }

    /// The cached value, if computed.
    #[must_use]
    pub fn get(&self) -> Option<u64> {
        match self.value.load(Ordering::Acquire) {
            UNSET => None,
            v => Some(v),
        }
    }

    /// Return the cached value or compute and cache it.
    ///
    /// An error from `init` is returned as-is and leaves the cell empty, so
    /// a later call retries.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `init`.
    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<u64, E>) -> Result<u64, E> {
        if let Some(v) = self.get() {
            return Ok(v);
        }

        let _guard = self.fill.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(v) = self.get() {
            return Ok(v);
        }

        let computed = init()?.min(UNSET - 1);
        self.value.store(computed, Ordering::Release);
        Ok(computed)
    }

    /// Infallible variant of [`get_or_try_init`](Self::get_or_try_init).
    pub fn get_or_init(&self, init: impl FnOnce() -> u64) -> u64 {
        match self.get_or_try_init::<std::convert::Infallible>(|| Ok(init())) {
            Ok(v) => v,
            Err(never) => match never {},
        }
    }

    /// Forget the cached value so the next read recomputes it.
    pub fn invalidate(&self) {
        let _guard = self.fill.lock().unwrap_or_else(PoisonError::into_inner);
        self.value.store(UNSET, Ordering::Release);
    }
}
