//! Server side of the relay: what the browser's HTTP call lands on.
//!
//! Every login request is answered with an envelope sealed under `response`,
//! including undecodable or expired input, so the wire never carries
//! decryption diagnostics. Refresh has no positive payload and answers with a
//! plain success or failure.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    error::Error,
    identity::IdentityStore,
    payloads::{
        clamp_ttl_seconds, open, seal, Expiring, RefreshRequest, ResultResponse, SignInRequest,
        SignInResult,
    },
    protector::{EnvelopeProtector, PURPOSE_LOGIN, PURPOSE_REFRESH, PURPOSE_RESPONSE},
};

const DEFAULT_RESPONSE_TTL_SECONDS: i64 = 60;

#[derive(Clone, Copy, Debug)]
pub struct EndpointConfig {
    response_ttl_seconds: i64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            response_ttl_seconds: DEFAULT_RESPONSE_TTL_SECONDS,
        }
    }

    /// Clamped to at most [`crate::payloads::MAX_TTL_SECONDS`] either way.
    #[must_use]
    pub fn with_response_ttl_seconds(mut self, seconds: i64) -> Self {
        self.response_ttl_seconds = clamp_ttl_seconds(seconds);
        self
    }

    #[must_use]
    pub fn response_ttl_seconds(&self) -> i64 {
        self.response_ttl_seconds
    }
}

/// Outcome of a login request: the code (for the HTTP status) and the sealed
/// response that carries it.
#[derive(Clone, Debug)]
pub struct LoginReply {
    pub result: SignInResult,
    pub envelope: String,
}

/// Object-safe view of the endpoint, shared with the HTTP handlers.
#[async_trait]
pub trait AuthEndpoint: Send + Sync {
    /// # Errors
    /// Only when the response itself cannot be sealed.
    async fn login(&self, encoded_login: &str) -> Result<LoginReply, Error>;

    async fn logout(&self);

    /// # Errors
    /// Any rejection: undecodable or expired envelope, unknown user, store fault.
    async fn refresh(&self, encoded_refresh: &str) -> Result<(), Error>;
}

pub struct RemoteEndpoint<S> {
    protector: Arc<EnvelopeProtector>,
    store: S,
    config: EndpointConfig,
}

impl<S: IdentityStore> RemoteEndpoint<S> {
    #[must_use]
    pub fn new(protector: Arc<EnvelopeProtector>, store: S, config: EndpointConfig) -> Self {
        Self {
            protector,
            store,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn check_login(&self, encoded_login: &str) -> SignInResult {
        let request: SignInRequest = match open(&self.protector, PURPOSE_LOGIN, encoded_login) {
            Ok(request) => request,
            Err(err) => {
                warn!("Invalid login data submitted: {err}");
                return SignInResult::Failed;
            }
        };

        if let Err(err) = request.ensure_fresh(Utc::now()) {
            warn!(user_name = %request.user_name, "Expired login data submitted: {err}");
            return SignInResult::Failed;
        }

        let check = match self
            .store
            .password_sign_in(
                &request.user_name,
                &request.password,
                request.remember_me,
                request.lockout_on_failure,
            )
            .await
        {
            Ok(check) => check,
            Err(err) => {
                error!(user_name = %request.user_name, "Identity store failure: {err:#}");
                return SignInResult::Failed;
            }
        };

        match check.into_result() {
            Ok(()) => {
                info!(user_name = %request.user_name, "User logged in.");
                SignInResult::Succeeded
            }
            Err(err) => {
                warn!(user_name = %request.user_name, "{err}");
                SignInResult::from(&err)
            }
        }
    }

    async fn check_refresh(&self, encoded_refresh: &str) -> Result<String, Error> {
        let request: RefreshRequest = open(&self.protector, PURPOSE_REFRESH, encoded_refresh)
            .inspect_err(|err| warn!("Invalid refresh sign in data submitted: {err}"))?;

        request
            .ensure_fresh(Utc::now())
            .inspect_err(|err| warn!("Expired refresh sign in data submitted: {err}"))?;

        let user = self
            .store
            .find_user_by_name(&request.user_name)
            .await
            .map_err(Error::IdentityStore)?
            .ok_or_else(|| Error::UserNotFound(request.user_name.clone()))?;

        self.store
            .refresh_sign_in(&user)
            .await
            .map_err(Error::IdentityStore)?;

        Ok(request.user_name)
    }
}

#[async_trait]
impl<S: IdentityStore> AuthEndpoint for RemoteEndpoint<S> {
    async fn login(&self, encoded_login: &str) -> Result<LoginReply, Error> {
        let result = self.check_login(encoded_login).await;
        let response = ResultResponse::new(
            result,
            Duration::seconds(self.config.response_ttl_seconds),
        );
        let envelope = seal(&self.protector, PURPOSE_RESPONSE, &response)?;
        Ok(LoginReply { result, envelope })
    }

    async fn logout(&self) {
        match self.store.sign_out().await {
            Ok(()) => info!("User logged out."),
            Err(err) => error!("Identity store sign-out failed: {err:#}"),
        }
    }

    async fn refresh(&self, encoded_refresh: &str) -> Result<(), Error> {
        match self.check_refresh(encoded_refresh).await {
            Ok(user_name) => {
                info!(user_name = %user_name, "Sign in refreshed.");
                Ok(())
            }
            Err(err) => {
                if !err.is_envelope_rejection() {
                    warn!("Refresh refused: {err}");
                }
                Err(err)
            }
        }
    }
}
