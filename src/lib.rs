//! # signin-relay
//!
//! Round-trip sign-in for a server-rendered interactive app whose credential
//! check has to be performed by an HTTP call made from the browser.
//!
//! ## Handshake
//!
//! 1. The app calls [`SignInDispatcher::begin_sign_in`] (or sign-out, refresh).
//!    The request is sealed into an **envelope** under its purpose and handed
//!    to a [`ClientBridge`] together with a single-use callback.
//! 2. The browser POSTs the envelope to the relay endpoint ([`api::router`]),
//!    which opens it, checks expiry, asks the [`IdentityStore`] and answers
//!    with a sealed `response` envelope.
//! 3. The browser hands the raw answer back through the callback. The
//!    dispatcher claims the pending slot, opens the response, and on success
//!    installs the new principal in [`SessionState`] *before* the caller's
//!    [`PendingOperation`] resolves.
//!
//! ## Envelopes
//!
//! ChaCha20-Poly1305 with the purpose (`login`, `refresh`, `response`) bound
//! into the associated data, base64url encoded. Every payload carries an
//! `expirationUtc` checked after decryption, so a replayed or late envelope
//! is refused even though the cryptography accepts it.

pub mod api;
pub mod bridge;
pub mod cli;
pub mod correlator;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod payloads;
pub mod protector;
pub mod session;

pub use bridge::{ClientBridge, ClientCallback, CompletionHandler, HttpRelay};
pub use correlator::{OperationId, PendingOperation};
pub use dispatcher::{DispatcherConfig, PendingCounts, SignInDispatcher};
pub use endpoint::{AuthEndpoint, EndpointConfig, LoginReply, RemoteEndpoint};
pub use error::Error;
pub use identity::{IdentityStore, PasswordCheck};
pub use payloads::{Credentials, SignInResult};
pub use protector::EnvelopeProtector;
pub use session::{Principal, PrincipalClaim, SessionFinalizer, SessionState};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
