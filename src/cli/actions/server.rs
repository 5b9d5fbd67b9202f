use crate::{
    api,
    endpoint::{AuthEndpoint, EndpointConfig, RemoteEndpoint},
    identity::memory::{LockoutPolicy, MemoryIdentityStore, UserSeed},
    protector::EnvelopeProtector,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{fs, sync::Arc};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub protection_key: Option<SecretString>,
    pub users_file: Option<String>,
    pub response_ttl_seconds: i64,
    pub lockout_max_attempts: u32,
    pub lockout_seconds: i64,
}

impl Args {
    fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy::new()
            .with_max_failed_attempts(self.lockout_max_attempts)
            .with_lockout_seconds(self.lockout_seconds)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the key or users file is invalid, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let endpoint = build_endpoint(&args).await?;

    api::new(args.port, endpoint).await
}

async fn build_endpoint(args: &Args) -> Result<Arc<dyn AuthEndpoint>> {
    let protector = if let Some(key) = &args.protection_key {
        EnvelopeProtector::from_base64(key).context("Invalid protection key")?
    } else {
        warn!("No protection key configured, envelopes sealed by other processes will be rejected");
        EnvelopeProtector::generate()
    };

    let store = if let Some(path) = &args.users_file {
        load_users(path, args.lockout_policy()).await?
    } else {
        warn!("No users file configured, the identity store is empty");
        MemoryIdentityStore::new(args.lockout_policy())
    };

    let config = EndpointConfig::new().with_response_ttl_seconds(args.response_ttl_seconds);
    debug!("endpoint config: {:?}", config);

    Ok(Arc::new(RemoteEndpoint::new(Arc::new(protector), store, config)))
}

async fn load_users(path: &str, policy: LockoutPolicy) -> Result<MemoryIdentityStore> {
    let json =
        fs::read_to_string(path).with_context(|| format!("Failed to read users file: {path}"))?;
    let seeds: Vec<UserSeed> =
        serde_json::from_str(&json).with_context(|| format!("Invalid users file: {path}"))?;
    let count = seeds.len();

    let store = MemoryIdentityStore::from_seeds(seeds, policy)
        .await
        .with_context(|| format!("Failed to load users from {path}"))?;

    info!("Loaded {} users from {}", count, path);

    Ok(store)
}
