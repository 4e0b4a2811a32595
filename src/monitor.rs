use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{EndpointConfig, MIN_REFRESH_INTERVAL_SECS, StoreConfig};
use crate::dispatcher::NotificationDispatcher;
use crate::models::BackoffState;
use crate::plugins::ProductExtractor;
use crate::retry::{RetryFailure, RetryPolicy};
use crate::scraper::StoreClient;
use crate::seen_state::SeenStateStore;

/// What one pass over a store's keywords produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub keywords_ok: usize,
    pub keywords_failed: usize,
    pub events: usize,
    pub delivered: usize,
}

/// Everything the monitors share.
#[derive(Clone)]
pub struct MonitorContext {
    pub client: StoreClient,
    pub seen: Arc<SeenStateStore>,
    pub dispatcher: NotificationDispatcher,
    pub endpoints: Arc<[EndpointConfig]>,
    pub retry: RetryPolicy,
}

/// Repeated failures are reported on the 1st, 2nd, 4th, 8th... occurrence.
fn should_report(consecutive_failures: u32) -> bool {
    consecutive_failures.is_power_of_two()
}

/// Polling loop for one store.
pub struct StoreMonitor {
    store: StoreConfig,
    extractor: Arc<dyn ProductExtractor>,
    ctx: MonitorContext,
    backoff: HashMap<String, BackoffState>,
    cancel: CancellationToken,
}

impl StoreMonitor {
    pub fn new(
        store: StoreConfig,
        extractor: Arc<dyn ProductExtractor>,
        ctx: MonitorContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            extractor,
            ctx,
            backoff: HashMap::new(),
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.store.name
    }

    pub fn backoff(&self, keyword: &str) -> BackoffState {
        self.backoff.get(keyword).copied().unwrap_or_default()
    }

    /// `max(refresh_interval, floor) + uniform(jitter_min, jitter_max)`.
    pub fn next_delay(&self) -> Duration {
        let floor = Duration::from_secs_f64(MIN_REFRESH_INTERVAL_SECS);
        let refresh = self.store.refresh_interval.max(floor);
        let (low, high) = (self.store.jitter_min, self.store.jitter_max);
        let jitter = if high > low {
            let sampled = rand::rng().random_range(low.as_secs_f64()..=high.as_secs_f64());
            Duration::try_from_secs_f64(sampled).unwrap_or(high)
        } else {
            low
        };
        refresh.saturating_add(jitter)
    }

    /// Fetch, diff and notify for every keyword, in configured order.
    ///
    /// Cancellation is honoured before each fetch and during backoff. Once a
    /// fetch has returned, its diff and notifications always complete.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let store = &self.store.name;

        for keyword in &self.store.keywords {
            if self.cancel.is_cancelled() {
                break;
            }

            let target = format!("{}/{}", store, keyword);
            let state = self.backoff.entry(keyword.clone()).or_default();
            let extractor = self.extractor.as_ref();
            let client = &self.ctx.client;

            metrics::counter!("restock_fetch_total", "store" => store.clone()).increment(1);
            let fetched = self
                .ctx
                .retry
                .run(&target, state, &self.cancel, || extractor.extract(client, keyword))
                .await;

            let mut products = match fetched {
                Ok(products) => products,
                Err(RetryFailure::Cancelled) => break,
                Err(failure) => {
                    let kind = match &failure {
                        RetryFailure::Aborted(_) => "permanent",
                        _ => "exhausted",
                    };
                    metrics::counter!("restock_fetch_errors_total", "store" => store.clone(), "kind" => kind)
                        .increment(1);
                    let failures = state.consecutive_failures;
                    if should_report(failures) {
                        tracing::warn!(
                            "{}: keyword cycle failed ({} consecutive failures): {}",
                            target,
                            failures,
                            failure
                        );
                    } else {
                        tracing::debug!("{}: keyword cycle failed: {}", target, failure);
                    }
                    report.keywords_failed += 1;
                    continue;
                }
            };

            report.keywords_ok += 1;
            products.retain(|product| self.store.watches(product));
            let events = self.ctx.seen.diff(store, &products);
            tracing::debug!(
                "{}: {} products, {} events",
                target,
                products.len(),
                events.len()
            );

            for event in &events {
                metrics::counter!("restock_events_total", "store" => store.clone(), "kind" => event.kind.to_string())
                    .increment(1);
                tracing::info!(
                    "{}: {} '{}' sizes [{}]",
                    store,
                    event.kind,
                    event.product.title(),
                    event.new_sizes.iter().cloned().collect::<Vec<_>>().join(", ")
                );
                let dispatched = self.ctx.dispatcher.dispatch(event, &self.ctx.endpoints).await;
                report.delivered += dispatched.delivered;
            }
            report.events += events.len();
        }

        report
    }

    /// Run cycles until cancelled.
    pub async fn run(mut self) {
        tracing::info!(
            "Starting {} monitor for {} ({} keywords, every {:.1}s)",
            self.store.platform,
            self.store.name,
            self.store.keywords.len(),
            self.store.refresh_interval.as_secs_f64()
        );

        while !self.cancel.is_cancelled() {
            let started = Instant::now();
            let report = self.run_cycle().await;
            metrics::histogram!("restock_cycle_seconds", "store" => self.store.name.clone())
                .record(started.elapsed().as_secs_f64());
            tracing::debug!("{}: cycle finished {:?}", self.store.name, report);

            let delay = self.next_delay();
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Monitor for {} stopped", self.store.name);
    }
}
