//! Session state and the finalizer that overwrites it after remote confirmation.
//!
//! The finalizer never reads the principal it replaces. Finalize calls are
//! serialized per finalizer so two completions cannot interleave their writes.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::{error::Error, identity::IdentityStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrincipalClaim {
    pub kind: String,
    pub value: String,
}

impl PrincipalClaim {
    #[must_use]
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub authentication_type: String,
    pub claims: Vec<PrincipalClaim>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Principal {
    #[default]
    Anonymous,
    Authenticated(Identity),
}

impl Principal {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(identity) => Some(identity.name.as_str()),
        }
    }
}

/// Handle to the principal of one logical session (one connected app instance).
///
/// Clones refer to the same session. Subscribers are notified on every
/// overwrite.
#[derive(Clone, Debug)]
pub struct SessionState {
    principal: Arc<watch::Sender<Principal>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Principal::Anonymous);
        Self {
            principal: Arc::new(sender),
        }
    }

    pub fn set(&self, principal: Principal) {
        self.principal.send_replace(principal);
    }

    #[must_use]
    pub fn current(&self) -> Principal {
        self.principal.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Principal> {
        self.principal.subscribe()
    }
}

pub struct SessionFinalizer<S> {
    store: S,
    session: SessionState,
    serialize: Mutex<()>,
}

impl<S: IdentityStore> SessionFinalizer<S> {
    #[must_use]
    pub fn new(store: S, session: SessionState) -> Self {
        Self {
            store,
            session,
            serialize: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Install the principal of `user_name` after a confirmed sign-in.
    ///
    /// # Errors
    /// Returns [`Error::UserNotFound`] if the user vanished since the remote
    /// check, or [`Error::IdentityStore`] on a store fault. The session is left
    /// untouched in both cases.
    pub async fn finalize_sign_in(&self, user_name: &str) -> Result<(), Error> {
        let _guard = self.serialize.lock().await;
        let principal = principal_for(&self.store, user_name).await?;
        self.session.set(principal);
        debug!(user_name, "session principal installed");
        Ok(())
    }

    pub async fn finalize_sign_out(&self) {
        let _guard = self.serialize.lock().await;
        self.session.set(Principal::Anonymous);
        debug!("session principal cleared");
    }

    /// Re-derive the principal of `user_name` on a fresh store scope.
    ///
    /// # Errors
    /// Same as [`Self::finalize_sign_in`].
    pub async fn finalize_refresh(&self, user_name: &str) -> Result<(), Error> {
        let _guard = self.serialize.lock().await;
        let scope = self.store.fresh_scope();
        let principal = principal_for(&scope, user_name).await?;
        self.session.set(principal);
        debug!(user_name, "session principal refreshed");
        Ok(())
    }
}

async fn principal_for<S: IdentityStore>(store: &S, user_name: &str) -> Result<Principal, Error> {
    let user = store
        .find_user_by_name(user_name)
        .await
        .map_err(Error::IdentityStore)?
        .ok_or_else(|| Error::UserNotFound(user_name.to_string()))?;

    store
        .create_principal(&user)
        .await
        .map_err(Error::IdentityStore)
}
