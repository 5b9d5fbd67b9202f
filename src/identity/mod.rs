//! Identity-store collaborator.
//!
//! Password verification, lockout counters and user lookup live behind
//! [`IdentityStore`]. The relay only sequences calls into it; the store manages
//! its own concurrency. [`memory::MemoryIdentityStore`] is a self-contained
//! implementation used by the bundled server and the tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::{error::Error, session::Principal};

/// Outcome of a password check, as reported by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordCheck {
    Succeeded,
    RequiresTwoFactor,
    LockedOut,
    NotAllowed,
    Failed,
}

impl PasswordCheck {
    /// Anything but `Succeeded` becomes the matching error.
    ///
    /// # Errors
    /// Returns the error variant describing why the sign-in was refused.
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Self::Succeeded => Ok(()),
            Self::RequiresTwoFactor => Err(Error::UnsupportedFactor),
            Self::LockedOut => Err(Error::AccountLocked),
            Self::NotAllowed => Err(Error::AccountNotAllowed),
            Self::Failed => Err(Error::CredentialsInvalid),
        }
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync + 'static {
    type User: Send + Sync + 'static;

    async fn find_user_by_name(&self, user_name: &str) -> Result<Option<Self::User>>;

    async fn password_sign_in(
        &self,
        user_name: &str,
        password: &str,
        remember_me: bool,
        lockout_on_failure: bool,
    ) -> Result<PasswordCheck>;

    async fn create_principal(&self, user: &Self::User) -> Result<Principal>;

    async fn sign_out(&self) -> Result<()>;

    async fn refresh_sign_in(&self, user: &Self::User) -> Result<()>;

    /// A new scope over the same backing data, free of any per-request state
    /// the current instance may carry.
    #[must_use]
    fn fresh_scope(&self) -> Self
    where
        Self: Sized;
}
