use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio_retry::RetryIf;

use crate::config::{DeliveryConfig, EndpointConfig};
use crate::models::NotificationEvent;
use crate::plugins::notifiers::event_payload;
use crate::retry::RetryPolicy;
use crate::utils::error::{AppError, DeliveryError};

/// Outcome of fanning one event out to every endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Posts notification payloads to webhook endpoints.
///
/// Each endpoint is delivered to independently: a slow or failing endpoint
/// neither delays nor cancels delivery to the others, and an exhausted
/// delivery is logged and dropped rather than re-queued.
#[derive(Clone)]
pub struct NotificationDispatcher {
    client: Client,
    policy: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(config: &DeliveryConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_policy(client, RetryPolicy::for_delivery(config)))
    }

    pub fn with_policy(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub async fn dispatch(&self, event: &NotificationEvent, endpoints: &[EndpointConfig]) -> DispatchReport {
        let deliveries = endpoints.iter().map(|endpoint| async move {
            let payload = event_payload(event, endpoint);
            (endpoint, self.deliver(endpoint, &payload).await)
        });

        let mut report = DispatchReport::default();
        for (endpoint, result) in join_all(deliveries).await {
            match result {
                Ok(()) => {
                    report.delivered += 1;
                    metrics::counter!("restock_deliveries_total", "endpoint" => endpoint.label().to_string())
                        .increment(1);
                    tracing::info!(
                        "Sent {} notification for '{}' to {}",
                        event.kind,
                        event.product.title(),
                        endpoint.label()
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    metrics::counter!("restock_delivery_failures_total", "endpoint" => endpoint.label().to_string())
                        .increment(1);
                    tracing::error!(
                        "Dropping {} notification for '{}' to {}: {}",
                        event.kind,
                        event.product.title(),
                        endpoint.label(),
                        e
                    );
                }
            }
        }
        report
    }

    /// POST `payload` with bounded retries for retryable failures.
    pub async fn deliver(&self, endpoint: &EndpointConfig, payload: &Value) -> Result<(), DeliveryError> {
        RetryIf::spawn(
            self.policy.delays(),
            move || async move {
                let result = self.post(endpoint, payload).await;
                if let Err(e) = &result {
                    tracing::warn!("Delivery to {} failed: {}", endpoint.label(), e);
                }
                result
            },
            |e: &DeliveryError| e.is_retryable(),
        )
        .await
    }

    async fn post(&self, endpoint: &EndpointConfig, payload: &Value) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&endpoint.url)
            .json(payload)
            .send()
            .await
            .map_err(|source| DeliveryError::Transport {
                endpoint: endpoint.label().to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Status {
            endpoint: endpoint.label().to_string(),
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}
