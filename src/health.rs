//! Startup checks run before any monitor polls.

use futures::future::join_all;
use url::Url;

use crate::config::{AppConfig, EndpointConfig, HealthConfig};
use crate::dispatcher::NotificationDispatcher;
use crate::plugins::notifiers::startup_payload;
use crate::scraper::StoreClient;
use crate::utils::error::{AppError, Result};

const LOCAL_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];
const DISCORD_DOMAINS: [&str; 2] = ["discord.com", "discordapp.com"];

/// `discord.com`, `discordapp.com` or one of their subdomains.
fn is_discord_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    DISCORD_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Check that `url` looks like a webhook endpoint we can post to.
///
/// Returns the reason for rejection. A URL outside `/api/webhooks` only warns.
pub fn validate_endpoint_url(url: &str) -> std::result::Result<(), String> {
    let parsed = Url::parse(url).map_err(|e| format!("'{}' is not a URL: {}", url, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("'{}' must be http(s)", url));
    }

    let host = parsed.host_str().unwrap_or_default();
    if !is_discord_host(host) && !LOCAL_HOSTS.contains(&host) {
        return Err(format!(
            "'{}' does not look like a Discord webhook; set health.validate_endpoints = false to override",
            url
        ));
    }
    if !parsed.path().contains("/api/webhooks") {
        tracing::warn!("Webhook {} does not include '/api/webhooks'; double-check the URL", url);
    }
    Ok(())
}

pub struct HealthCheck {
    settings: HealthConfig,
    endpoints: Vec<EndpointConfig>,
    stores: Vec<String>,
    client: StoreClient,
    dispatcher: NotificationDispatcher,
}

impl HealthCheck {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self::with_clients(
            config,
            StoreClient::new(&config.http)?,
            NotificationDispatcher::new(&config.delivery)?,
        ))
    }

    pub fn with_clients(config: &AppConfig, client: StoreClient, dispatcher: NotificationDispatcher) -> Self {
        Self {
            settings: config.health.clone(),
            endpoints: config.endpoints.clone(),
            stores: config.stores.iter().map(|s| s.name.clone()).collect(),
            client,
            dispatcher,
        }
    }

    /// Run every enabled stage; the first failure aborts.
    pub async fn run(&self) -> Result<()> {
        if self.settings.validate_endpoints {
            self.validate_endpoints()?;
        }
        if self.settings.check_connectivity {
            self.check_connectivity().await?;
        }
        if self.settings.send_startup_ping {
            self.send_startup_ping().await?;
        }
        tracing::info!("Startup health check passed");
        Ok(())
    }

    pub fn validate_endpoints(&self) -> Result<()> {
        for endpoint in &self.endpoints {
            validate_endpoint_url(&endpoint.url).map_err(|reason| {
                AppError::HealthCheck(format!("endpoint {}: {}", endpoint.label(), reason))
            })?;
        }
        Ok(())
    }

    pub async fn check_connectivity(&self) -> Result<()> {
        let url = &self.settings.connectivity_url;
        match self.client.probe(url).await {
            Ok(status) if status.is_success() => {
                tracing::info!("Connectivity check against {} succeeded", url);
                Ok(())
            }
            Ok(status) => Err(AppError::HealthCheck(format!(
                "connectivity check against {} answered HTTP {}",
                url, status
            ))),
            Err(e) => Err(AppError::HealthCheck(format!(
                "connectivity check against {} failed: {}",
                url, e
            ))),
        }
    }

    pub async fn send_startup_ping(&self) -> Result<()> {
        let pings = self.endpoints.iter().map(|endpoint| async move {
            let payload = startup_payload(endpoint, &self.stores);
            self.dispatcher.deliver(endpoint, &payload).await
        });

        let failures: Vec<String> = join_all(pings)
            .await
            .into_iter()
            .filter_map(|result| result.err().map(|e| e.to_string()))
            .collect();

        if failures.is_empty() {
            tracing::info!("Startup ping delivered to {} endpoints", self.endpoints.len());
            Ok(())
        } else {
            Err(AppError::HealthCheck(format!(
                "startup ping failed: {}",
                failures.join("; ")
            )))
        }
    }
}
