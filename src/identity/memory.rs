//! In-memory identity store with argon2 password hashes and lockout counters.
//!
//! Check order follows the usual identity-framework flow: confirmation
//! (`NotAllowed`), then an active lockout, then the password. A correct
//! password on a two-factor account reports `RequiresTwoFactor`; a wrong one
//! counts towards the lockout when `lockout_on_failure` is set.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{IdentityStore, PasswordCheck};
use crate::payloads::saturating_expiry;
use crate::session::{Identity, Principal, PrincipalClaim};

const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_SECONDS: i64 = 5 * 60;
pub const MAX_LOCKOUT_SECONDS: i64 = 365 * 24 * 60 * 60;
pub const AUTHENTICATION_TYPE: &str = "Identity.Application";

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    max_failed_attempts: u32,
    lockout_seconds: i64,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_max_failed_attempts(mut self, attempts: u32) -> Self {
        self.max_failed_attempts = attempts.max(1);
        self
    }

    /// Clamped to at most [`MAX_LOCKOUT_SECONDS`] either way.
    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds.clamp(-MAX_LOCKOUT_SECONDS, MAX_LOCKOUT_SECONDS);
        self
    }

    #[must_use]
    pub fn max_failed_attempts(&self) -> u32 {
        self.max_failed_attempts
    }

    #[must_use]
    pub fn lockout_seconds(&self) -> i64 {
        self.lockout_seconds
    }
}

/// One entry of a users seed file.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSeed {
    pub user_name: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub email_confirmed: bool,
    #[serde(default)]
    pub two_factor_enabled: bool,
}

const fn default_true() -> bool {
    true
}

impl UserSeed {
    #[must_use]
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
            email: None,
            email_confirmed: true,
            two_factor_enabled: false,
        }
    }

    #[must_use]
    pub fn with_email_confirmed(mut self, confirmed: bool) -> Self {
        self.email_confirmed = confirmed;
        self
    }

    #[must_use]
    pub fn with_two_factor(mut self, enabled: bool) -> Self {
        self.two_factor_enabled = enabled;
        self
    }
}

#[derive(Clone, Debug)]
pub struct MemoryUser {
    pub id: Uuid,
    pub user_name: String,
    pub email: Option<String>,
    pub email_confirmed: bool,
    pub two_factor_enabled: bool,
    pub security_stamp: Uuid,
    password_hash: String,
    access_failed_count: u32,
    lockout_end: Option<DateTime<Utc>>,
}

impl MemoryUser {
    fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.lockout_end.is_some_and(|end| end > now)
    }
}

/// Bookkeeping of what the store was asked to do, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    SignedIn { user_name: String, persistent: bool },
    SignInRefused { user_name: String, check: PasswordCheck },
    SignedOut,
    Refreshed { user_name: String },
}

struct Shared {
    users: RwLock<HashMap<String, MemoryUser>>,
    events: Mutex<Vec<StoreEvent>>,
    policy: LockoutPolicy,
    scopes: AtomicU64,
}

/// Cheap to clone; clones share the same user table and scope.
#[derive(Clone)]
pub struct MemoryIdentityStore {
    shared: Arc<Shared>,
    scope: u64,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                users: RwLock::new(HashMap::new()),
                events: Mutex::new(Vec::new()),
                policy,
                scopes: AtomicU64::new(0),
            }),
            scope: 0,
        }
    }

    /// Build a store from seed entries.
    ///
    /// # Errors
    /// Returns an error if a seed is invalid or a password cannot be hashed.
    pub async fn from_seeds(seeds: Vec<UserSeed>, policy: LockoutPolicy) -> Result<Self> {
        let store = Self::new(policy);
        for seed in seeds {
            store.add_user(seed).await?;
        }
        Ok(store)
    }

    /// Add (or replace) a user.
    ///
    /// # Errors
    /// Returns an error for an empty user name or a hashing failure.
    pub async fn add_user(&self, seed: UserSeed) -> Result<Uuid> {
        let user_name = seed.user_name.trim().to_string();
        if user_name.is_empty() {
            return Err(anyhow!("user name must not be empty"));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(seed.password.as_bytes(), &salt)
            .map_err(|e| anyhow!("password hash failure: {e}"))?
            .to_string();

        let id = Uuid::new_v4();
        let user = MemoryUser {
            id,
            user_name: user_name.clone(),
            email: seed.email,
            email_confirmed: seed.email_confirmed,
            two_factor_enabled: seed.two_factor_enabled,
            security_stamp: Uuid::new_v4(),
            password_hash,
            access_failed_count: 0,
            lockout_end: None,
        };

        self.shared
            .users
            .write()
            .await
            .insert(normalize_user_name(&user_name), user);

        Ok(id)
    }

    pub async fn remove_user(&self, user_name: &str) -> bool {
        self.shared
            .users
            .write()
            .await
            .remove(&normalize_user_name(user_name))
            .is_some()
    }

    pub async fn events(&self) -> Vec<StoreEvent> {
        self.shared.events.lock().await.clone()
    }

    #[must_use]
    pub fn scope_id(&self) -> u64 {
        self.scope
    }

    #[must_use]
    pub fn policy(&self) -> LockoutPolicy {
        self.shared.policy
    }

    async fn record(&self, event: StoreEvent) {
        self.shared.events.lock().await.push(event);
    }

    fn verify_password(hash: &str, password: &str) -> bool {
        PasswordHash::new(hash).is_ok_and(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
    }

    async fn check_password(
        &self,
        user_name: &str,
        password: &str,
        lockout_on_failure: bool,
    ) -> PasswordCheck {
        let now = Utc::now();
        let mut users = self.shared.users.write().await;
        let Some(user) = users.get_mut(&normalize_user_name(user_name)) else {
            return PasswordCheck::Failed;
        };

        if !user.email_confirmed {
            return PasswordCheck::NotAllowed;
        }
        if user.is_locked_out(now) {
            return PasswordCheck::LockedOut;
        }

        if Self::verify_password(&user.password_hash, password) {
            user.access_failed_count = 0;
            user.lockout_end = None;
            if user.two_factor_enabled {
                return PasswordCheck::RequiresTwoFactor;
            }
            return PasswordCheck::Succeeded;
        }

        if lockout_on_failure {
            user.access_failed_count += 1;
            if user.access_failed_count >= self.shared.policy.max_failed_attempts {
                user.access_failed_count = 0;
                user.lockout_end = Some(saturating_expiry(
                    now,
                    Duration::seconds(self.shared.policy.lockout_seconds),
                ));
                debug!(user_name = %user.user_name, "account locked out after failed attempts");
                return PasswordCheck::LockedOut;
            }
        }

        PasswordCheck::Failed
    }
}

fn normalize_user_name(user_name: &str) -> String {
    user_name.trim().to_lowercase()
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    type User = MemoryUser;

    async fn find_user_by_name(&self, user_name: &str) -> Result<Option<MemoryUser>> {
        Ok(self
            .shared
            .users
            .read()
            .await
            .get(&normalize_user_name(user_name))
            .cloned())
    }

    async fn password_sign_in(
        &self,
        user_name: &str,
        password: &str,
        remember_me: bool,
        lockout_on_failure: bool,
    ) -> Result<PasswordCheck> {
        let check = self
            .check_password(user_name, password, lockout_on_failure)
            .await;

        let event = if check == PasswordCheck::Succeeded {
            StoreEvent::SignedIn {
                user_name: user_name.to_string(),
                persistent: remember_me,
            }
        } else {
            StoreEvent::SignInRefused {
                user_name: user_name.to_string(),
                check,
            }
        };
        self.record(event).await;

        Ok(check)
    }

    async fn create_principal(&self, user: &MemoryUser) -> Result<Principal> {
        let mut claims = vec![
            PrincipalClaim::new("sub", user.id.to_string()),
            PrincipalClaim::new("name", user.user_name.clone()),
            PrincipalClaim::new("security_stamp", user.security_stamp.to_string()),
        ];
        if let Some(email) = &user.email {
            claims.push(PrincipalClaim::new("email", email.clone()));
        }

        Ok(Principal::Authenticated(Identity {
            name: user.user_name.clone(),
            authentication_type: AUTHENTICATION_TYPE.to_string(),
            claims,
        }))
    }

    async fn sign_out(&self) -> Result<()> {
        self.record(StoreEvent::SignedOut).await;
        Ok(())
    }

    async fn refresh_sign_in(&self, user: &MemoryUser) -> Result<()> {
        let exists = self
            .shared
            .users
            .read()
            .await
            .contains_key(&normalize_user_name(&user.user_name));
        if !exists {
            return Err(anyhow!("user {} no longer exists", user.user_name));
        }

        self.record(StoreEvent::Refreshed {
            user_name: user.user_name.clone(),
        })
        .await;
        Ok(())
    }

    fn fresh_scope(&self) -> Self {
        let scope = self.shared.scopes.fetch_add(1, Ordering::Relaxed) + 1;
        Self {
            shared: Arc::clone(&self.shared),
            scope,
        }
    }
}
