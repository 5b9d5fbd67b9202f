use thiserror::Error;

/// Failures raised while moving an operation across the relay.
///
/// None of these reach a sign-in caller directly: they are folded into a
/// [`crate::payloads::SignInResult`] (or `false` for sign-out/refresh) at the
/// completion slot, and into a `Failed` envelope on the wire.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed envelope")]
    MalformedEnvelope,
    #[error("envelope expired")]
    Expired,
    #[error("requires two factor authentication (not supported)")]
    UnsupportedFactor,
    #[error("user account locked out")]
    AccountLocked,
    #[error("account not confirmed")]
    AccountNotAllowed,
    #[error("invalid login attempt")]
    CredentialsInvalid,
    #[error("client bridge did not confirm the operation")]
    TransportFailure,
    #[error("operation already resolved")]
    DoubleResolution,
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("identity store failure: {0}")]
    IdentityStore(#[source] anyhow::Error),
}

impl Error {
    /// True for failures caused by the envelope itself rather than the account.
    #[must_use]
    pub fn is_envelope_rejection(&self) -> bool {
        matches!(self, Self::MalformedEnvelope | Self::Expired)
    }
}

impl From<serde_json::Error> for Error {
    fn from(_: serde_json::Error) -> Self {
        Self::MalformedEnvelope
    }
}
