// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cancellation for per-endpoint check loops.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Why a check loop was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The endpoint was removed or relocated.
    Removed,
    /// The scheduler was stopped.
    Stopped,
    /// The scheduler was dropped without being stopped.
    Dropped,
}

impl CancelReason {
    /// Short lowercase label for log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Removed => "removed",
            Self::Stopped => "stopped",
            Self::Dropped => "dropped",
        }
    }

    fn encode(self) -> u8 {
        match self {
            Self::Removed => 1,
            Self::Stopped => 2,
            Self::Dropped => 3,
        }
    }

    fn decode(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Removed),
            2 => Some(Self::Stopped),
            3 => Some(Self::Dropped),
            _ => None,
        }
    }
}

/// A cloneable token shared between a check loop and its owner.
///
/// All clones observe the same state. The first reason passed to
/// [`cancel`](Self::cancel) is kept; later calls are no-ops.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    reason: AtomicU8,
    notify: Notify,
}

impl CancellationToken {
    /// A token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                reason: AtomicU8::new(0),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self, reason: CancelReason) {
        let first = self
            .inner
            .reason
            .compare_exchange(0, reason.encode(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.inner.notify.notify_waiters();
        }
    }

    /// `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// The reason given to the first [`cancel`](Self::cancel) call.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        CancelReason::decode(self.inner.reason.load(Ordering::SeqCst))
    }

    /// Resolves once the token is cancelled; immediately if it already is.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_reason_wins() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel(CancelReason::Removed);
        token.cancel(CancelReason::Stopped);
        assert_eq!(token.reason(), Some(CancelReason::Removed));
    }

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel(CancelReason::Stopped);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel(CancelReason::Dropped);
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        token.cancel(CancelReason::Stopped);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
