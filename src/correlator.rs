//! Correlation of asynchronous bridge callbacks with the call that started them.
//!
//! Each in-flight operation owns one slot in a map keyed by [`OperationId`].
//! A callback first *claims* the slot, which removes it atomically; only the
//! holder of the [`Claim`] can resolve it, and resolving consumes the claim.
//! A second callback for the same id finds nothing and is ignored.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::{error::Error, payloads::SignInResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperationId(Ulid);

impl OperationId {
    fn new() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value a caller observes when the slot is dropped without being resolved.
pub trait Outcome: Send + 'static {
    fn abandoned() -> Self;
}

impl Outcome for SignInResult {
    fn abandoned() -> Self {
        Self::Failed
    }
}

impl Outcome for bool {
    fn abandoned() -> Self {
        false
    }
}

/// Awaitable handle for one in-flight operation.
#[must_use = "an operation's outcome is only observed by awaiting it"]
pub struct PendingOperation<T> {
    id: OperationId,
    receiver: oneshot::Receiver<T>,
}

impl<T: Outcome> PendingOperation<T> {
    /// A handle that is already resolved, for operations refused before dispatch.
    pub fn ready(value: T) -> Self {
        let (sender, receiver) = oneshot::channel();
        // The receiver is alive, the send cannot fail.
        let _ = sender.send(value);
        Self {
            id: OperationId::new(),
            receiver,
        }
    }
}

impl<T> PendingOperation<T> {
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }
}

impl<T: Outcome> Future for PendingOperation<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(value),
            Poll::Ready(Err(_)) => {
                warn!(operation = %this.id, "{}", Error::TransportFailure);
                Poll::Ready(T::abandoned())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

struct Slot<C, T> {
    context: C,
    sender: oneshot::Sender<T>,
}

/// Exclusive right to resolve one operation.
pub struct Claim<C, T> {
    id: OperationId,
    context: C,
    sender: oneshot::Sender<T>,
}

impl<C, T> Claim<C, T> {
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    #[must_use]
    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn resolve(self, value: T) {
        if self.sender.send(value).is_err() {
            debug!(operation = %self.id, "caller stopped waiting before resolution");
        }
    }
}

pub struct Correlator<C, T> {
    pending: Mutex<HashMap<OperationId, Slot<C, T>>>,
}

impl<C, T> Default for Correlator<C, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, T> Correlator<C, T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Open a slot carrying `context` and return the caller's handle.
    pub async fn register(&self, context: C) -> PendingOperation<T> {
        let id = OperationId::new();
        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(id, Slot { context, sender });
        PendingOperation { id, receiver }
    }

    /// Take the slot for `id` out of the map.
    ///
    /// # Errors
    /// Returns [`Error::DoubleResolution`] when the slot was already claimed or
    /// never existed.
    pub async fn claim(&self, id: OperationId) -> Result<Claim<C, T>, Error> {
        let slot = self
            .pending
            .lock()
            .await
            .remove(&id)
            .ok_or(Error::DoubleResolution)?;
        Ok(Claim {
            id,
            context: slot.context,
            sender: slot.sender,
        })
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}
