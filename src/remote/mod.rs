//! Single-resolution adapter over callback-completing remote calls.
//!
//! The transport collaborator reports results through completion handlers,
//! not futures. This module converts one callback-completing remote call
//! into one [`RemoteOp`], a future that resolves or fails exactly once.
//! Every higher layer of the crate funnels its remote calls through
//! [`issue`].

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{BridgeError, Result, TransportError};

/// Completion handle passed to the transport for one remote call.
///
/// The first call to [`Completion::complete`] (or the `resolve`/`fail`
/// shorthands) settles the paired [`RemoteOp`]. Any later call is dropped:
/// a transport that fires its handler twice cannot double-resolve the
/// future.
pub struct Completion<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<T>>>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Completion<T> {
    /// Settle the pending operation with the given outcome.
    pub fn complete(&self, outcome: Result<T>) {
        let sender = self.slot.lock().ok().and_then(|mut slot| slot.take());
        match sender {
            // The receiver side may already be gone; that is not an error.
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => trace!("duplicate completion dropped"),
        }
    }

    /// Settle the pending operation with a result value.
    pub fn resolve(&self, value: T) {
        self.complete(Ok(value));
    }

    /// Settle the pending operation with an error.
    pub fn fail(&self, error: BridgeError) {
        self.complete(Err(error));
    }
}

/// A single in-flight remote call.
///
/// Resolves with the transport's result or fails with its error, exactly
/// once. If the transport drops its [`Completion`] without firing it, the
/// future fails with a [`TransportError`] instead of hanging.
#[must_use = "a pending remote operation does nothing unless awaited"]
pub struct RemoteOp<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for RemoteOp<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::Transport(TransportError::dropped())),
        })
    }
}

/// Issue one remote call and return its pending result.
///
/// `start` receives the [`Completion`] handle and is expected to begin
/// exactly one remote call. The call is issued eagerly, inside `issue`
/// itself; the returned [`RemoteOp`] only observes the outcome. (The
/// underlying transports complete eagerly-started work, so deferring the
/// start until first poll would buy nothing and change observable order.)
///
/// No retry happens here. Retry policy, if any, belongs to the transport
/// or to the caller.
pub fn issue<T, F>(start: F) -> RemoteOp<T>
where
    F: FnOnce(Completion<T>),
{
    let (tx, rx) = oneshot::channel();
    let completion = Completion {
        slot: Arc::new(Mutex::new(Some(tx))),
    };
    start(completion);
    RemoteOp { rx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn resolves_with_the_transport_result() {
        let op = issue(|done: Completion<u32>| done.resolve(7));
        assert_eq!(op.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn fails_with_the_transport_error() {
        let op = issue(|done: Completion<u32>| {
            done.fail(TransportError::new(13, "unauthorized").into());
        });
        match op.await {
            Err(BridgeError::Transport(e)) => assert_eq!(e.code, Some(13)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_fire_wins_on_double_completion() {
        let op = issue(|done: Completion<&'static str>| {
            done.resolve("first");
            done.resolve("second");
            done.fail(ConnectionError::Closed.into());
        });
        assert_eq!(op.await.unwrap(), "first");
    }

    #[tokio::test]
    async fn deferred_completion_resolves_later() {
        let op = issue(|done: Completion<u32>| {
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                done.resolve(99);
            });
        });
        assert_eq!(op.await.unwrap(), 99);
    }

    #[tokio::test]
    async fn dropped_completion_fails_instead_of_hanging() {
        let op = issue(|done: Completion<u32>| drop(done));
        match op.await {
            Err(BridgeError::Transport(e)) => {
                assert!(e.message.contains("without firing"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_call_is_issued_eagerly() {
        let fired = Arc::new(AtomicBool::new(false));
        let observed = Arc::clone(&fired);
        let op = issue(|done: Completion<()>| {
            fired.store(true, Ordering::SeqCst);
            done.resolve(());
        });
        // The remote call ran during issue(), before the future was polled.
        assert!(observed.load(Ordering::SeqCst));
        op.await.unwrap();
    }
}
