//! Contract between the dispatcher and whatever relays envelopes through the
//! remote execution context (usually a browser tab).
//!
//! A bridge delivers an envelope to the remote side, which performs exactly one
//! HTTP call to the relay endpoint and eventually reports back by invoking the
//! [`ClientCallback`] it was handed. The remote side is not trusted: it may
//! call back late, twice, or never. The dispatcher copes with all three.

pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::correlator::OperationId;

pub use http::HttpRelay;

/// Receives the raw result of a relayed call.
#[async_trait]
pub trait CompletionHandler<R: Send + 'static>: Send + Sync {
    async fn on_complete(&self, operation: OperationId, response: R);
}

/// Callback bound to one operation. Cloning it does not create a new slot.
pub struct ClientCallback<R: Send + 'static> {
    operation: OperationId,
    handler: Arc<dyn CompletionHandler<R>>,
}

impl<R: Send + 'static> Clone for ClientCallback<R> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation,
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<R: Send + 'static> ClientCallback<R> {
    #[must_use]
    pub fn new(operation: OperationId, handler: Arc<dyn CompletionHandler<R>>) -> Self {
        Self { operation, handler }
    }

    #[must_use]
    pub fn operation(&self) -> OperationId {
        self.operation
    }

    /// Report the remote result. Only the first call per operation has any effect.
    pub async fn complete(&self, response: R) {
        self.handler.on_complete(self.operation, response).await;
    }
}

/// What the dispatcher needs from the remote execution context.
///
/// Each relay method starts exactly one call and returns once it has been
/// handed off; the outcome arrives later through the callback. Returning an
/// error means nothing was sent and the callback will never fire.
#[async_trait]
pub trait ClientBridge: Send + Sync {
    /// POST `/login?encodedLoginModel=<envelope>`; callback gets the response body,
    /// whatever the HTTP status.
    async fn relay_login(&self, envelope: String, on_complete: ClientCallback<String>)
        -> Result<()>;

    /// POST `/logout`; callback fires once the call finishes.
    async fn relay_logout(&self, on_complete: ClientCallback<()>) -> Result<()>;

    /// POST `/refresh?encodedRefreshDto=<envelope>`; callback gets `status == 200`.
    async fn relay_refresh(&self, envelope: String, on_complete: ClientCallback<bool>)
        -> Result<()>;
}
