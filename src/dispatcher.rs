//! Starts sign-in, sign-out and refresh operations and finishes them when the
//! bridge calls back.
//!
//! Flow Overview: build the payload with a fresh expiry, seal it, register a
//! slot, hand envelope and callback to the bridge, return the pending handle.
//! On callback: claim the slot, open the `response` envelope, finalize the
//! session if the remote side confirmed, then resolve. A sign-in caller never
//! sees `Succeeded` before the session principal has been replaced.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    bridge::{ClientBridge, ClientCallback, CompletionHandler},
    correlator::{Correlator, OperationId, PendingOperation},
    error::Error,
    identity::IdentityStore,
    payloads::{
        clamp_ttl_seconds, open, seal, Credentials, Expiring, RefreshRequest, ResultResponse,
        SignInRequest, SignInResult,
    },
    protector::{EnvelopeProtector, PURPOSE_LOGIN, PURPOSE_REFRESH, PURPOSE_RESPONSE},
    session::{SessionFinalizer, SessionState},
};

const DEFAULT_REQUEST_TTL_SECONDS: i64 = 30;

#[derive(Clone, Copy, Debug)]
pub struct DispatcherConfig {
    request_ttl_seconds: i64,
    lockout_on_failure: bool,
}

impl DispatcherConfig {
    /// `lockout_on_failure` has no default: callers decide whether a failed
    /// password counts towards account lockout.
    #[must_use]
    pub fn new(lockout_on_failure: bool) -> Self {
        Self {
            request_ttl_seconds: DEFAULT_REQUEST_TTL_SECONDS,
            lockout_on_failure,
        }
    }

    /// Clamped to at most [`crate::payloads::MAX_TTL_SECONDS`] either way.
    #[must_use]
    pub fn with_request_ttl_seconds(mut self, seconds: i64) -> Self {
        self.request_ttl_seconds = clamp_ttl_seconds(seconds);
        self
    }

    #[must_use]
    pub fn request_ttl_seconds(&self) -> i64 {
        self.request_ttl_seconds
    }

    #[must_use]
    pub fn lockout_on_failure(&self) -> bool {
        self.lockout_on_failure
    }

    fn request_ttl(&self) -> Duration {
        Duration::seconds(self.request_ttl_seconds)
    }
}

struct SignInContext {
    user_name: String,
}

struct RefreshContext {
    user_name: String,
}

/// In-flight operations per kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub sign_ins: usize,
    pub sign_outs: usize,
    pub refreshes: usize,
}

struct DispatcherCore<S> {
    protector: Arc<EnvelopeProtector>,
    finalizer: SessionFinalizer<S>,
    sign_ins: Correlator<SignInContext, SignInResult>,
    sign_outs: Correlator<(), bool>,
    refreshes: Correlator<RefreshContext, bool>,
}

impl<S: IdentityStore> DispatcherCore<S> {
    fn decode_response(&self, encoded: &str) -> Result<SignInResult, Error> {
        let response: ResultResponse = open(&self.protector, PURPOSE_RESPONSE, encoded)?;
        response.ensure_fresh(Utc::now())?;
        Ok(response.result)
    }
}

#[async_trait]
impl<S: IdentityStore> CompletionHandler<String> for DispatcherCore<S> {
    async fn on_complete(&self, operation: OperationId, encoded_response: String) {
        let claim = match self.sign_ins.claim(operation).await {
            Ok(claim) => claim,
            Err(err) => {
                debug!(%operation, "Ignoring sign-in callback: {err}");
                return;
            }
        };

        let result = match self.decode_response(&encoded_response) {
            Ok(result) => result,
            Err(err) => {
                warn!(%operation, "Rejected sign-in response: {err}");
                SignInResult::Failed
            }
        };

        let result = if result.succeeded() {
            let user_name = claim.context().user_name.as_str();
            match self.finalizer.finalize_sign_in(user_name).await {
                Ok(()) => {
                    info!(%operation, user_name, "User signed in");
                    SignInResult::Succeeded
                }
                Err(err) => {
                    warn!(%operation, user_name, "Sign-in finalize failed: {err}");
                    SignInResult::from(&err)
                }
            }
        } else {
            result
        };

        claim.resolve(result);
    }
}

#[async_trait]
impl<S: IdentityStore> CompletionHandler<()> for DispatcherCore<S> {
    async fn on_complete(&self, operation: OperationId, _response: ()) {
        let claim = match self.sign_outs.claim(operation).await {
            Ok(claim) => claim,
            Err(err) => {
                debug!(%operation, "Ignoring sign-out callback: {err}");
                return;
            }
        };

        self.finalizer.finalize_sign_out().await;
        info!(%operation, "User signed out");
        claim.resolve(true);
    }
}

#[async_trait]
impl<S: IdentityStore> CompletionHandler<bool> for DispatcherCore<S> {
    async fn on_complete(&self, operation: OperationId, succeeded: bool) {
        let claim = match self.refreshes.claim(operation).await {
            Ok(claim) => claim,
            Err(err) => {
                debug!(%operation, "Ignoring refresh callback: {err}");
                return;
            }
        };

        if !succeeded {
            warn!(%operation, "Refresh refused by relay endpoint");
            claim.resolve(false);
            return;
        }

        let refreshed = match self
            .finalizer
            .finalize_refresh(&claim.context().user_name)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(%operation, "Refresh finalize failed: {err}");
                false
            }
        };

        claim.resolve(refreshed);
    }
}

/// Entry point for the interactive app. One dispatcher per logical session.
pub struct SignInDispatcher<S> {
    core: Arc<DispatcherCore<S>>,
    bridge: Arc<dyn ClientBridge>,
    config: DispatcherConfig,
}

impl<S: IdentityStore> SignInDispatcher<S> {
    #[must_use]
    pub fn new(
        protector: Arc<EnvelopeProtector>,
        bridge: Arc<dyn ClientBridge>,
        finalizer: SessionFinalizer<S>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            core: Arc::new(DispatcherCore {
                protector,
                finalizer,
                sign_ins: Correlator::new(),
                sign_outs: Correlator::new(),
                refreshes: Correlator::new(),
            }),
            bridge,
            config,
        }
    }

    #[must_use]
    pub fn session(&self) -> &SessionState {
        self.core.finalizer.session()
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub async fn pending(&self) -> PendingCounts {
        PendingCounts {
            sign_ins: self.core.sign_ins.len().await,
            sign_outs: self.core.sign_outs.len().await,
            refreshes: self.core.refreshes.len().await,
        }
    }

    /// Start a sign-in. The handle resolves to one of the five result codes.
    pub async fn begin_sign_in(&self, credentials: &Credentials) -> PendingOperation<SignInResult> {
        if !credentials.is_complete() {
            warn!("Sign-in refused: user name and password are required");
            return PendingOperation::ready(SignInResult::Failed);
        }

        let request = SignInRequest::from_credentials(
            credentials,
            self.config.lockout_on_failure,
            self.config.request_ttl(),
        );
        let envelope = match seal(&self.core.protector, PURPOSE_LOGIN, &request) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!("Failed to seal sign-in request: {err}");
                return PendingOperation::ready(SignInResult::Failed);
            }
        };

        let pending = self
            .core
            .sign_ins
            .register(SignInContext {
                user_name: request.user_name,
            })
            .await;
        let handler: Arc<dyn CompletionHandler<String>> = self.core.clone();
        let callback = ClientCallback::new(pending.id(), handler);

        if let Err(err) = self.bridge.relay_login(envelope, callback).await {
            warn!(operation = %pending.id(), "Sign-in relay failed: {err:#}");
            if let Ok(claim) = self.core.sign_ins.claim(pending.id()).await {
                claim.resolve(SignInResult::from(&Error::TransportFailure));
            }
        }

        pending
    }

    /// Start a sign-out. Resolves `true` once the session principal is anonymous.
    pub async fn begin_sign_out(&self) -> PendingOperation<bool> {
        let pending = self.core.sign_outs.register(()).await;
        let handler: Arc<dyn CompletionHandler<()>> = self.core.clone();
        let callback = ClientCallback::new(pending.id(), handler);

        if let Err(err) = self.bridge.relay_logout(callback).await {
            warn!(operation = %pending.id(), "Sign-out relay failed: {err:#}");
            if let Ok(claim) = self.core.sign_outs.claim(pending.id()).await {
                claim.resolve(false);
            }
        }

        pending
    }

    /// Start a refresh of `user_name`'s sign-in. Resolves `true` once the
    /// principal has been re-derived.
    pub async fn begin_refresh(&self, user_name: &str) -> PendingOperation<bool> {
        let request = RefreshRequest::new(user_name, self.config.request_ttl());
        let envelope = match seal(&self.core.protector, PURPOSE_REFRESH, &request) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!("Failed to seal refresh request: {err}");
                return PendingOperation::ready(false);
            }
        };

        let pending = self
            .core
            .refreshes
            .register(RefreshContext {
                user_name: request.user_name,
            })
            .await;
        let handler: Arc<dyn CompletionHandler<bool>> = self.core.clone();
        let callback = ClientCallback::new(pending.id(), handler);

        if let Err(err) = self.bridge.relay_refresh(envelope, callback).await {
            warn!(operation = %pending.id(), "Refresh relay failed: {err:#}");
            if let Ok(claim) = self.core.refreshes.claim(pending.id()).await {
                claim.resolve(false);
            }
        }

        pending
    }
}
