//! Bridge that performs the relay calls itself over HTTP.
//!
//! Stands in for the browser helper: one POST per relay call on a spawned
//! task, then exactly one callback with the raw result. Network failures are
//! reported as an empty body (login) or `false` (refresh) so the callback
//! still fires.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::{ClientBridge, ClientCallback};
use crate::APP_USER_AGENT;

#[derive(Clone, Debug)]
pub struct HttpRelay {
    client: Client,
    base_url: Url,
}

impl HttpRelay {
    /// `base_url` is where the relay routes are mounted, e.g. `https://app.tld/api/relay/`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid relay base URL: {base_url}"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, route: &str) -> Result<Url> {
        self.base_url
            .join(route)
            .with_context(|| format!("Invalid relay route: {route}"))
    }
}

#[async_trait]
impl ClientBridge for HttpRelay {
    async fn relay_login(
        &self,
        envelope: String,
        on_complete: ClientCallback<String>,
    ) -> Result<()> {
        let mut url = self.endpoint("login")?;
        url.query_pairs_mut()
            .append_pair("encodedLoginModel", &envelope);
        let client = self.client.clone();

        tokio::spawn(async move {
            let body = match client.post(url).send().await {
                Ok(response) => {
                    debug!(status = %response.status(), "login relay answered");
                    response.text().await.unwrap_or_else(|err| {
                        warn!("Failed to read login relay body: {err}");
                        String::new()
                    })
                }
                Err(err) => {
                    warn!("Login relay request failed: {err}");
                    String::new()
                }
            };
            on_complete.complete(body).await;
        });

        Ok(())
    }

    async fn relay_logout(&self, on_complete: ClientCallback<()>) -> Result<()> {
        let url = self.endpoint("logout")?;
        let client = self.client.clone();

        tokio::spawn(async move {
            if let Err(err) = client.post(url).send().await {
                warn!("Logout relay request failed: {err}");
            }
            on_complete.complete(()).await;
        });

        Ok(())
    }

    async fn relay_refresh(
        &self,
        envelope: String,
        on_complete: ClientCallback<bool>,
    ) -> Result<()> {
        let mut url = self.endpoint("refresh")?;
        url.query_pairs_mut()
            .append_pair("encodedRefreshDto", &envelope);
        let client = self.client.clone();

        tokio::spawn(async move {
            let succeeded = match client.post(url).send().await {
                Ok(response) => response.status() == StatusCode::OK,
                Err(err) => {
                    warn!("Refresh relay request failed: {err}");
                    false
                }
            };
            on_complete.complete(succeeded).await;
        });

        Ok(())
    }
}
