use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::config::HttpConfig;
use crate::utils::error::{AppError, FetchError};
use crate::utils::user_agent::random_user_agent;

/// Caps simultaneous requests to any single host, process-wide.
pub struct HostLimiter {
    permits_per_host: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostLimiter {
    pub fn new(permits_per_host: usize) -> Self {
        Self {
            permits_per_host: permits_per_host.max(1),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, host: &str) -> Arc<Semaphore> {
        let mut hosts = self.hosts.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(
            hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.permits_per_host))),
        )
    }

    pub async fn acquire(&self, host: &str) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.semaphore(host).acquire_owned().await
    }

    pub fn available(&self, host: &str) -> usize {
        self.semaphore(host).available_permits()
    }
}

/// HTTP session shared by every extractor.
#[derive(Clone)]
pub struct StoreClient {
    client: Client,
    limiter: Arc<HostLimiter>,
    rotate_user_agent: bool,
}

impl StoreClient {
    pub fn new(config: &HttpConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("text/html,application/json;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(config.max_connections_per_host);

        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }

        Ok(Self {
            client: builder.build()?,
            limiter: Arc::new(HostLimiter::new(config.max_connections_per_host)),
            rotate_user_agent: config.rotate_user_agent && config.user_agent.is_none(),
        })
    }

    /// GET `url` and return the body of a 2xx response.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url)
            .map_err(|e| FetchError::unparsable(url, format!("invalid URL: {}", e)))?;
        let host = parsed.host_str().unwrap_or_default().to_string();

        let _permit = self
            .limiter
            .acquire(&host)
            .await
            .map_err(|e| FetchError::Transient {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let mut request = self.client.get(parsed);
        if self.rotate_user_agent {
            request = request.header(header::USER_AGENT, random_user_agent());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_transport(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            tracing::debug!("{} answered {}", url, status);
            return Err(FetchError::from_status(url, status.as_u16(), retry_after));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_transport(url, &e))
    }

    /// GET `url` and parse the body as JSON. A body that is not JSON means
    /// the endpoint changed shape, so it is classified as permanent.
    pub async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body)
            .map_err(|e| FetchError::unparsable(url, format!("invalid JSON: {}", e)))
    }

    /// Plain GET used by the startup connectivity probe.
    pub async fn probe(&self, url: &str) -> Result<StatusCode, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        Ok(response.status())
    }
}

fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::FetchErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> StoreClient {
        StoreClient::new(&HttpConfig {
            timeout_secs: 2,
            ..HttpConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_text_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let body = client()
            .get_text(&format!("{}/search", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<html></html>");
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        for (route, status) in [("/limited", 429), ("/banned", 403), ("/down", 503), ("/gone", 404)] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }

        let client = client();
        let kind = |r: Result<String, FetchError>| r.unwrap_err().kind();
        assert_eq!(
            kind(client.get_text(&format!("{}/limited", server.uri())).await),
            FetchErrorKind::RateLimited
        );
        assert_eq!(
            kind(client.get_text(&format!("{}/banned", server.uri())).await),
            FetchErrorKind::RateLimited
        );
        assert_eq!(
            kind(client.get_text(&format!("{}/down", server.uri())).await),
            FetchErrorKind::Transient
        );
        assert_eq!(
            kind(client.get_text(&format!("{}/gone", server.uri())).await),
            FetchErrorKind::Permanent
        );
    }

    #[tokio::test]
    async fn test_retry_after_header_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let err = client().get_text(&server.uri()).await.unwrap_err();
        match err {
            FetchError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"results": []}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let client = client();
        let body = client
            .get_json(&format!("{}/api/products", server.uri()))
            .await
            .unwrap();
        assert_eq!(body["results"], serde_json::json!([]));

        let err = client
            .get_json(&format!("{}/api/broken", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Permanent);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Nothing listens on port 9 locally.
        let err = client().get_text("http://127.0.0.1:9/").await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_host_limiter_caps_permits() {
        let limiter = HostLimiter::new(2);
        let first = limiter.acquire("kith.com").await.unwrap();
        let _second = limiter.acquire("kith.com").await.unwrap();
        assert_eq!(limiter.available("kith.com"), 0);
        assert_eq!(limiter.available("nike.com"), 2);

        drop(first);
        assert_eq!(limiter.available("kith.com"), 1);
    }
}
