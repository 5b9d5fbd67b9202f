//! Full sign-in / sign-out / refresh round trips with an in-process bridge
//! that plays the browser: it forwards each envelope to the relay endpoint on
//! another task and reports the raw answer through the callback.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use signin_relay::{
    identity::memory::{LockoutPolicy, MemoryIdentityStore, MemoryUser, UserSeed},
    session::Principal,
    AuthEndpoint, ClientBridge, ClientCallback, Credentials, DispatcherConfig, EndpointConfig,
    EnvelopeProtector, IdentityStore, PasswordCheck, PendingCounts, RemoteEndpoint,
    SessionFinalizer, SessionState, SignInDispatcher, SignInResult,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Notify;

#[derive(Clone, Copy, Default)]
struct Behaviour {
    deliver_twice: bool,
    mangle_response: bool,
}

struct InProcessBridge {
    endpoint: Arc<dyn AuthEndpoint>,
    behaviour: Behaviour,
}

#[async_trait]
impl ClientBridge for InProcessBridge {
    async fn relay_login(
        &self,
        envelope: String,
        on_complete: ClientCallback<String>,
    ) -> Result<()> {
        let endpoint = Arc::clone(&self.endpoint);
        let behaviour = self.behaviour;
        tokio::spawn(async move {
            let mut body = endpoint
                .login(&envelope)
                .await
                .map(|reply| reply.envelope)
                .unwrap_or_default();
            if behaviour.mangle_response {
                body = body.chars().rev().collect();
            }
            on_complete.complete(body.clone()).await;
            if behaviour.deliver_twice {
                on_complete.complete(body).await;
            }
        });
        Ok(())
    }

    async fn relay_logout(&self, on_complete: ClientCallback<()>) -> Result<()> {
        let endpoint = Arc::clone(&self.endpoint);
        tokio::spawn(async move {
            endpoint.logout().await;
            on_complete.complete(()).await;
        });
        Ok(())
    }

    async fn relay_refresh(
        &self,
        envelope: String,
        on_complete: ClientCallback<bool>,
    ) -> Result<()> {
        let endpoint = Arc::clone(&self.endpoint);
        let behaviour = self.behaviour;
        tokio::spawn(async move {
            let succeeded = endpoint.refresh(&envelope).await.is_ok();
            on_complete.complete(succeeded).await;
            if behaviour.deliver_twice {
                on_complete.complete(!succeeded).await;
            }
        });
        Ok(())
    }
}

async fn seeded_store(policy: LockoutPolicy) -> Result<MemoryIdentityStore> {
    MemoryIdentityStore::from_seeds(
        vec![
            UserSeed::new("alice", "correct horse"),
            UserSeed::new("bob", "pw").with_email_confirmed(false),
            UserSeed::new("carol", "pw").with_two_factor(true),
        ],
        policy,
    )
    .await
}

fn bridge(
    protector: Arc<EnvelopeProtector>,
    store: MemoryIdentityStore,
    config: EndpointConfig,
    behaviour: Behaviour,
) -> Arc<InProcessBridge> {
    Arc::new(InProcessBridge {
        endpoint: Arc::new(RemoteEndpoint::new(protector, store, config)),
        behaviour,
    })
}

struct Harness {
    dispatcher: SignInDispatcher<MemoryIdentityStore>,
    store: MemoryIdentityStore,
}

async fn harness(
    policy: LockoutPolicy,
    config: EndpointConfig,
    behaviour: Behaviour,
) -> Result<Harness> {
    let protector = Arc::new(EnvelopeProtector::generate());
    let store = seeded_store(policy).await?;
    let dispatcher = SignInDispatcher::new(
        protector.clone(),
        bridge(protector, store.clone(), config, behaviour),
        SessionFinalizer::new(store.clone(), SessionState::new()),
        DispatcherConfig::new(true),
    );
    Ok(Harness { dispatcher, store })
}

async fn default_harness() -> Result<Harness> {
    harness(LockoutPolicy::new(), EndpointConfig::new(), Behaviour::default()).await
}

#[tokio::test]
async fn valid_credentials_install_principal() -> Result<()> {
    let h = default_harness().await?;
    let mut changes = h.dispatcher.session().subscribe();

    let result = h
        .dispatcher
        .begin_sign_in(&Credentials::new("alice", "correct horse"))
        .await
        .await;

    assert_eq!(result, SignInResult::Succeeded);
    let Some(user) = h.store.find_user_by_name("alice").await? else {
        return Err(anyhow!("alice should exist"));
    };
    assert_eq!(
        h.dispatcher.session().current(),
        h.store.create_principal(&user).await?
    );
    assert!(changes.has_changed()?);
    assert_eq!(h.dispatcher.pending().await, PendingCounts::default());
    Ok(())
}

#[tokio::test]
async fn refusals_leave_session_unchanged() -> Result<()> {
    let h = harness(
        LockoutPolicy::new().with_max_failed_attempts(1),
        EndpointConfig::new(),
        Behaviour::default(),
    )
    .await?;

    for (user_name, password, expected) in [
        ("alice", "wrong", SignInResult::IsLockedOut),
        ("alice", "correct horse", SignInResult::IsLockedOut),
        ("bob", "pw", SignInResult::IsNotAllowed),
        ("carol", "pw", SignInResult::RequiresTwoFactor),
        ("nobody", "pw", SignInResult::Failed),
    ] {
        let result = h
            .dispatcher
            .begin_sign_in(&Credentials::new(user_name, password))
            .await
            .await;
        assert_eq!(result, expected, "{user_name}");
        assert_eq!(h.dispatcher.session().current(), Principal::Anonymous);
    }
    Ok(())
}

#[tokio::test]
async fn duplicate_callback_resolves_once() -> Result<()> {
    let h = harness(
        LockoutPolicy::new(),
        EndpointConfig::new(),
        Behaviour {
            deliver_twice: true,
            ..Behaviour::default()
        },
    )
    .await?;

    let result = h
        .dispatcher
        .begin_sign_in(&Credentials::new("alice", "correct horse"))
        .await
        .await;
    assert_eq!(result, SignInResult::Succeeded);

    // The second refresh callback reports failure; it must not overwrite the first.
    assert!(h.dispatcher.begin_refresh("alice").await.await);

    // Give the duplicate deliveries time to land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.dispatcher.session().current().name(), Some("alice"));
    assert_eq!(h.dispatcher.pending().await, PendingCounts::default());
    Ok(())
}

#[tokio::test]
async fn expired_response_is_refused() -> Result<()> {
    let h = harness(
        LockoutPolicy::new(),
        EndpointConfig::new().with_response_ttl_seconds(-1),
        Behaviour::default(),
    )
    .await?;

    let result = h
        .dispatcher
        .begin_sign_in(&Credentials::new("alice", "correct horse"))
        .await
        .await;
    assert_eq!(result, SignInResult::Failed);
    assert_eq!(h.dispatcher.session().current(), Principal::Anonymous);
    Ok(())
}

#[tokio::test]
async fn mangled_response_is_refused() -> Result<()> {
    let h = harness(
        LockoutPolicy::new(),
        EndpointConfig::new(),
        Behaviour {
            mangle_response: true,
            ..Behaviour::default()
        },
    )
    .await?;

    let result = h
        .dispatcher
        .begin_sign_in(&Credentials::new("alice", "correct horse"))
        .await
        .await;
    assert_eq!(result, SignInResult::Failed);
    assert_eq!(h.dispatcher.session().current(), Principal::Anonymous);
    Ok(())
}

#[tokio::test]
async fn endpoint_with_other_key_answers_failed() -> Result<()> {
    let store = seeded_store(LockoutPolicy::new()).await?;
    let dispatcher = SignInDispatcher::new(
        Arc::new(EnvelopeProtector::generate()),
        bridge(
            Arc::new(EnvelopeProtector::generate()),
            store.clone(),
            EndpointConfig::new(),
            Behaviour::default(),
        ),
        SessionFinalizer::new(store.clone(), SessionState::new()),
        DispatcherConfig::new(true),
    );

    let result = dispatcher
        .begin_sign_in(&Credentials::new("alice", "correct horse"))
        .await
        .await;
    assert_eq!(result, SignInResult::Failed);
    // The endpoint could not open the request, so the store was never asked.
    assert!(store.events().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn sign_out_after_sign_in() -> Result<()> {
    let h = default_harness().await?;
    assert!(h
        .dispatcher
        .begin_sign_in(&Credentials::new("alice", "correct horse"))
        .await
        .await
        .succeeded());

    assert!(h.dispatcher.begin_sign_out().await.await);
    assert_eq!(h.dispatcher.session().current(), Principal::Anonymous);
    Ok(())
}

#[tokio::test]
async fn refresh_known_and_unknown_users() -> Result<()> {
    let h = default_harness().await?;

    assert!(h.dispatcher.begin_refresh("alice").await.await);
    assert_eq!(h.dispatcher.session().current().name(), Some("alice"));

    assert!(!h.dispatcher.begin_refresh("mallory").await.await);
    // A failed refresh does not clear the existing principal.
    assert_eq!(h.dispatcher.session().current().name(), Some("alice"));
    Ok(())
}

/// Store whose `create_principal` parks until the test releases it.
#[derive(Clone)]
struct GatedStore {
    inner: MemoryIdentityStore,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl IdentityStore for GatedStore {
    type User = MemoryUser;

    async fn find_user_by_name(&self, user_name: &str) -> Result<Option<MemoryUser>> {
        self.inner.find_user_by_name(user_name).await
    }

    async fn password_sign_in(
        &self,
        user_name: &str,
        password: &str,
        remember_me: bool,
        lockout_on_failure: bool,
    ) -> Result<PasswordCheck> {
        self.inner
            .password_sign_in(user_name, password, remember_me, lockout_on_failure)
            .await
    }

    async fn create_principal(&self, user: &MemoryUser) -> Result<Principal> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.create_principal(user).await
    }

    async fn sign_out(&self) -> Result<()> {
        self.inner.sign_out().await
    }

    async fn refresh_sign_in(&self, user: &MemoryUser) -> Result<()> {
        self.inner.refresh_sign_in(user).await
    }

    fn fresh_scope(&self) -> Self {
        Self {
            inner: self.inner.fresh_scope(),
            entered: Arc::clone(&self.entered),
            release: Arc::clone(&self.release),
        }
    }
}

#[tokio::test]
async fn success_is_not_observable_before_principal_is_installed() -> Result<()> {
    let protector = Arc::new(EnvelopeProtector::generate());
    let store = seeded_store(LockoutPolicy::new()).await?;
    let gated = GatedStore {
        inner: store.clone(),
        entered: Arc::new(Notify::new()),
        release: Arc::new(Notify::new()),
    };
    let dispatcher = SignInDispatcher::new(
        protector.clone(),
        bridge(protector, store, EndpointConfig::new(), Behaviour::default()),
        SessionFinalizer::new(gated.clone(), SessionState::new()),
        DispatcherConfig::new(true),
    );
    let session = dispatcher.session().clone();

    let pending = dispatcher
        .begin_sign_in(&Credentials::new("alice", "correct horse"))
        .await;
    let waiter = tokio::spawn(pending);

    // The finalizer is now parked inside the overwrite.
    gated.entered.notified().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());
    assert_eq!(session.current(), Principal::Anonymous);

    gated.release.notify_one();
    let result = waiter.await?;
    assert_eq!(result, SignInResult::Succeeded);
    assert_eq!(session.current().name(), Some("alice"));
    Ok(())
}
