//! Primary fetch: headless render through the shared [`BrowserPool`].

use super::browser_manager::{self, BrowserPool, IsolatedContext, TEXT_ONLY_BLOCKED_TYPES};
use super::{truncate_chars, MAX_TEXT_CHARS};
use crate::types::{FailureReason, FetchFailure, FetchOutcome, FetchedPage};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render `url` and extract its title and visible text, finishing (and
    /// releasing every browser resource) no later than `deadline`.
    async fn render(&self, url: &str, deadline: Instant) -> FetchOutcome;
}

/// Extraction attempts when the page reloads under us.
const EXTRACT_ATTEMPTS: usize = 2;
/// Bounded wait for an in-flight navigation before retrying extraction.
const RENAVIGATION_WAIT: Duration = Duration::from_secs(10);
/// Settle delay used when the navigation wait itself fails.
const SETTLE_DELAY: Duration = Duration::from_millis(1500);
/// Network-idle heuristic after load.
const IDLE_QUIET_MS: u64 = 500;
const IDLE_TIMEOUT_MS: u64 = 3000;
/// How long to look for the main document response after navigation.
const STATUS_LOOKUP: Duration = Duration::from_millis(500);

const EXTRACT_SCRIPT: &str = r#"(() => ({
    title: document.title || "",
    text: document.body ? (document.body.innerText || "") : ""
}))()"#;

#[derive(Debug, Error)]
enum RenderError {
    #[error("timeout")]
    Timeout,
    #[error("{0}")]
    Browser(String),
}

impl RenderError {
    /// Mid-flight reloads destroy the JS context the evaluation ran in.
    fn is_transient_context_error(&self) -> bool {
        let RenderError::Browser(msg) = self else {
            return false;
        };
        let lower = msg.to_lowercase();
        lower.contains("execution context was destroyed")
            || lower.contains("cannot find context with specified id")
            || lower.contains("inspected target navigated or closed")
            || lower.contains("invalid context")
    }
}

/// Run `attempt` up to [`EXTRACT_ATTEMPTS`] times. Only transient context
/// errors are retried, each after `before_retry`.
async fn retry_transient<T, A, AFut, W, WFut>(
    mut attempt: A,
    mut before_retry: W,
) -> Result<T, RenderError>
where
    A: FnMut() -> AFut,
    AFut: Future<Output = Result<T, RenderError>>,
    W: FnMut() -> WFut,
    WFut: Future<Output = ()>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) if tries < EXTRACT_ATTEMPTS && e.is_transient_context_error() => {
                warn!("Extraction hit a reload ({}); retrying", e);
                before_retry().await;
                tries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map the main document status to a render failure or the status to keep.
fn navigation_status(status: Option<i64>) -> Result<Option<u16>, FetchFailure> {
    match status {
        None => Err(FetchFailure::new(
            FailureReason::OfflineOnPuppeteer,
            "navigation returned no response",
        )),
        Some(s) if s >= 400 => {
            let failure = FetchFailure::new(
                FailureReason::OfflineOnPuppeteer,
                format!("page responded with HTTP {}", s),
            );
            Err(match u16::try_from(s) {
                Ok(code) => failure.with_status(code),
                Err(_) => failure,
            })
        }
        Some(s) => Ok(u16::try_from(s).ok()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct PageText {
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
}

pub struct ChromeRenderer {
    pool: Arc<BrowserPool>,
    op_timeout: Duration,
}

impl ChromeRenderer {
    pub fn new(pool: Arc<BrowserPool>, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    /// Run one CDP operation under the per-context timeout, clipped to `deadline`.
    async fn bounded<T, E, F>(
        &self,
        what: &str,
        deadline: Instant,
        fut: F,
    ) -> Result<T, RenderError>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let limit = self
            .op_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(RenderError::Browser(format!("{}: {}", what, e))),
            Err(_) => Err(RenderError::Timeout),
        }
    }

    async fn extract(&self, page: &Page, deadline: Instant) -> Result<PageText, RenderError> {
        let result = self
            .bounded("evaluate", deadline, page.evaluate(EXTRACT_SCRIPT))
            .await?;
        result
            .into_value::<PageText>()
            .map_err(|e| RenderError::Browser(format!("decode page text: {}", e)))
    }

    /// Best-effort wait for the reload that broke extraction to finish.
    async fn await_renavigation(page: &Page, deadline: Instant) {
        let wait = RENAVIGATION_WAIT.min(deadline.saturating_duration_since(Instant::now()));
        let navigated = tokio::time::timeout(wait, page.wait_for_navigation()).await;
        if !matches!(navigated, Ok(Ok(_))) {
            tokio::time::sleep(SETTLE_DELAY).await;
        }
    }

    async fn extract_with_retry(
        &self,
        page: &Page,
        deadline: Instant,
    ) -> Result<PageText, RenderError> {
        retry_transient(
            move || self.extract(page, deadline),
            move || Self::await_renavigation(page, deadline),
        )
        .await
    }

    async fn render_in(
        &self,
        ctx: &IsolatedContext,
        url: &str,
        deadline: Instant,
    ) -> Result<FetchedPage, FetchFailure> {
        let page = ctx.page();
        let offline =
            |e: RenderError| FetchFailure::new(FailureReason::OfflineOnPuppeteer, e.to_string());

        let mut responses = self
            .bounded(
                "listen",
                deadline,
                page.event_listener::<EventResponseReceived>(),
            )
            .await
            .map_err(offline)?;

        self.bounded("navigate", deadline, page.goto(url))
            .await
            .map_err(offline)?;

        // Redirect hops don't emit `responseReceived`; the first document
        // response is the final navigation answer.
        let status = tokio::time::timeout(STATUS_LOOKUP, async {
            while let Some(event) = responses.next().await {
                if event.r#type == ResourceType::Document {
                    return Some(event.response.status);
                }
            }
            None
        })
        .await
        .ok()
        .flatten();

        let status = navigation_status(status)?;

        let idle_budget = deadline
            .saturating_duration_since(Instant::now())
            .as_millis()
            .min(IDLE_TIMEOUT_MS as u128) as u64;
        browser_manager::wait_until_stable(page, IDLE_QUIET_MS, idle_budget).await;

        let text = self.extract_with_retry(page, deadline).await.map_err(|e| {
            let mut failure = offline(e);
            failure.http_status = status;
            failure
        })?;

        Ok(FetchedPage {
            http_status: status,
            title: text.title.trim().to_string(),
            content: truncate_chars(text.text.trim(), MAX_TEXT_CHARS),
        })
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str, deadline: Instant) -> FetchOutcome {
        let open = tokio::time::timeout_at(
            deadline,
            self.pool.open_context(TEXT_ONLY_BLOCKED_TYPES),
        )
        .await;
        let ctx = match open {
            Ok(Ok(ctx)) => ctx,
            Ok(Err(e)) => {
                warn!("Render setup failed for {}: {}", url, e);
                return Err(FetchFailure::new(
                    FailureReason::OfflineOnPuppeteer,
                    format!("browser unavailable: {}", e),
                ));
            }
            Err(_) => {
                return Err(FetchFailure::new(FailureReason::OfflineOnPuppeteer, "timeout"));
            }
        };

        info!("Rendering {}", url);
        let result = self.render_in(&ctx, url, deadline).await;
        ctx.release().await;

        match &result {
            Ok(page) => debug!("Rendered {} ({} chars)", url, page.content.len()),
            Err(f) => warn!("Render of {} failed: {}", url, f.text),
        }
        result
    }
}
