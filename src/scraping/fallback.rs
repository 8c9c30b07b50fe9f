//! Second-chance fetch through a rendering proxy (ScraperAPI-style) when the
//! headless render was rejected as a bot-wall.

use super::html_text::{extract_text, extract_title};
use crate::types::{FailureReason, FetchFailure, FetchOutcome, FetchedPage};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use url::Url;

#[async_trait]
pub trait FallbackRenderer: Send + Sync {
    /// Fetch `url` through the proxy, finishing no later than `deadline`.
    async fn fetch(&self, url: &str, deadline: Instant) -> FetchOutcome;
}

pub struct ScraperApiFetcher {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl ScraperApiFetcher {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            timeout,
        }
    }

    fn request_url(&self, api_key: &str, target: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &self.endpoint,
            &[("api_key", api_key), ("render", "true"), ("url", target)],
        )
    }
}

fn failure(text: impl Into<String>) -> FetchFailure {
    FetchFailure::new(FailureReason::Scraperapi, text)
}

#[async_trait]
impl FallbackRenderer for ScraperApiFetcher {
    async fn fetch(&self, url: &str, deadline: Instant) -> FetchOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(failure("credential missing"));
        };

        let request_url = self
            .request_url(api_key, url)
            .map_err(|e| failure(format!("invalid rendering proxy endpoint: {}", e)))?;

        // Whichever is sooner: the proxy's own budget or the task deadline.
        let remaining = deadline.saturating_duration_since(Instant::now());
        let budget = self.timeout.min(remaining);
        if budget.is_zero() {
            return Err(failure("timeout"));
        }

        info!("Fallback render via proxy: {}", url);
        let response = self
            .client
            .get(request_url)
            .timeout(budget)
            .send()
            .await
            .map_err(|e| {
                // The request URL carries the credential.
                let e = e.without_url();
                warn!("Rendering proxy request for {} failed: {}", url, e);
                if e.is_timeout() {
                    failure("timeout")
                } else {
                    failure(format!("rendering proxy request failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        if status >= 400 {
            warn!("Rendering proxy returned HTTP {} for {}", status, url);
            return Err(
                failure(format!("rendering proxy returned HTTP {}", status)).with_status(status)
            );
        }

        let html = response.text().await.map_err(|e| {
            failure(format!("rendering proxy body unreadable: {}", e.without_url()))
                .with_status(status)
        })?;

        Ok(FetchedPage {
            http_status: Some(status),
            title: extract_title(&html),
            content: extract_text(&html),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_url_encodes_target() {
        let f = ScraperApiFetcher::new(
            reqwest::Client::new(),
            "https://api.scraperapi.com/",
            Some("k".into()),
            Duration::from_secs(40),
        );
        let u = f
            .request_url("k", "https://example.com/a?b=c&d=e")
            .unwrap();
        assert_eq!(
            u.as_str(),
            "https://api.scraperapi.com/?api_key=k&render=true&url=https%3A%2F%2Fexample.com%2Fa%3Fb%3Dc%26d%3De"
        );
    }

    #[tokio::test]
    async fn missing_credential_fails_fast() {
        let f = ScraperApiFetcher::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/",
            None,
            Duration::from_secs(1),
        );
        let err = f
            .fetch("https://example.com", Instant::now() + Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.reason, FailureReason::Scraperapi);
        assert_eq!(err.text, "credential missing");
    }
}
