// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded concurrency for probe invocations.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit};

/// Caps the number of probes running at once.
///
/// Sized to the endpoint count at start and grown as endpoints are added;
/// it never shrinks.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    permits: Semaphore,
    size: AtomicUsize,
}

impl WorkerPool {
    pub(crate) fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
            size: AtomicUsize::new(0),
        }
    }

    /// Ensure at least `n` workers (and never fewer than one).
    pub(crate) fn grow_to(&self, n: usize) {
        let n = n.max(1);
        let previous = self.size.fetch_max(n, Ordering::SeqCst);
        if n > previous {
            self.permits.add_permits(n - previous);
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Wait for a free worker. `None` once the pool is shut down.
    pub(crate) async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.permits.acquire().await.ok()
    }

    pub(crate) fn shutdown(&self) {
        self.permits.close();
    }
}
