use std::sync::atomic::{AtomicI32, Ordering};

const DISPOSED: i32 = -1;

/// Counts outstanding users of a resource and gates its disposal.
///
/// Once `try_dispose` succeeds no new reference can be taken.
#[derive(Debug, Default)]
pub struct ReferenceCounter {
    count: AtomicI32,
}

impl ReferenceCounter {
    pub fn new() -> Self {
        Self {
            count: AtomicI32::new(0),
        }
    }

    /// Take a reference. Refused once disposed.
    pub fn increase(&self) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current == DISPOSED {
                return false;
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop a reference.
    ///
    /// # Panics
    ///
    /// If no reference is held or the counter is disposed.
    pub fn decrease(&self) {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            assert!(current > 0, "Illegal reference count: {}", current);
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Dispose if the count is currently zero. Returns `false` when a
    /// reference is held or the counter was already disposed.
    pub fn try_dispose(&self) -> bool {
        self.count
            .compare_exchange(0, DISPOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_disposed(&self) -> bool {
        self.count.load(Ordering::Acquire) == DISPOSED
    }

    pub fn get(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }
}
