//! Correlated request/response bookkeeping for the sandbox message channel.
//!
//! One pending-call table serves every RPC on the channel. Each entry is
//! removed exactly once, by whichever of reply, timeout, or channel shutdown
//! gets there first; replies for unknown or expired ids are dropped silently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use super::protocol::CallId;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("call {id} timed out after {timeout:?}")]
    Timeout { id: CallId, timeout: Duration },

    #[error("channel closed before call {id} resolved")]
    Closed { id: CallId },
}

#[derive(Debug)]
pub struct PendingCalls<R> {
    next_id: AtomicU64,
    pending: Mutex<HashMap<CallId, oneshot::Sender<R>>>,
}

impl<R> PendingCalls<R> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates the next correlation id and registers its resolver.
    pub fn register(&self) -> (CallId, oneshot::Receiver<R>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }
        (id, rx)
    }

    /// Awaits the reply for `id`, purging the entry on timeout so a late
    /// reply becomes a no-op instead of resolving a settled call.
    pub async fn wait(
        &self,
        id: CallId,
        rx: oneshot::Receiver<R>,
        timeout: Duration,
    ) -> Result<R, CallError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                self.purge(id);
                Err(CallError::Closed { id })
            }
            Err(_) => {
                self.purge(id);
                tracing::warn!(id, ?timeout, "sandbox call timed out");
                Err(CallError::Timeout { id, timeout })
            }
        }
    }

    /// Resolves a pending call exactly once. Returns false for unknown or
    /// already-settled ids, which are otherwise ignored.
    pub fn resolve(&self, id: CallId, reply: R) -> bool {
        let sender = match self.pending.lock() {
            Ok(mut pending) => pending.remove(&id),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx.send(reply).is_ok(),
            None => {
                tracing::debug!(id, "dropping reply for unknown or expired call");
                false
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    fn purge(&self, id: CallId) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

impl<R> Default for PendingCalls<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_allocates_monotonically_increasing_ids() {
        let calls: PendingCalls<u32> = PendingCalls::new();
        let (first, _rx1) = calls.register();
        let (second, _rx2) = calls.register();
        assert!(second > first);
        assert_eq!(calls.in_flight(), 2);
    }

    #[tokio::test]
    async fn resolved_call_completes_and_leaves_the_table() {
        let calls: PendingCalls<u32> = PendingCalls::new();
        let (id, rx) = calls.register();
        assert!(calls.resolve(id, 42));
        let reply = calls
            .wait(id, rx, Duration::from_secs(1))
            .await
            .expect("reply should resolve");
        assert_eq!(reply, 42);
        assert_eq!(calls.in_flight(), 0);
    }

    #[tokio::test]
    async fn timed_out_call_rejects_once_and_late_reply_is_a_no_op() {
        let calls: PendingCalls<u32> = PendingCalls::new();
        let (id, rx) = calls.register();
        let err = calls
            .wait(id, rx, Duration::from_millis(10))
            .await
            .expect_err("no reply should time out");
        assert!(matches!(err, CallError::Timeout { .. }));
        assert_eq!(calls.in_flight(), 0);

        // The late reply must neither resolve a second time nor panic.
        assert!(!calls.resolve(id, 42));
    }

    #[tokio::test]
    async fn multiple_in_flight_calls_resolve_independently() {
        let calls: PendingCalls<&'static str> = PendingCalls::new();
        let (first, rx_first) = calls.register();
        let (second, rx_second) = calls.register();

        assert!(calls.resolve(second, "second"));
        assert!(calls.resolve(first, "first"));
        assert_eq!(
            calls
                .wait(first, rx_first, Duration::from_secs(1))
                .await
                .expect("first reply"),
            "first"
        );
        assert_eq!(
            calls
                .wait(second, rx_second, Duration::from_secs(1))
                .await
                .expect("second reply"),
            "second"
        );
    }

    #[tokio::test]
    async fn unknown_id_is_ignored() {
        let calls: PendingCalls<u32> = PendingCalls::new();
        assert!(!calls.resolve(999, 1));
    }
}
