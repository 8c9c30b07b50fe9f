//! Stub collaborators shared by the integration tests. No browser or
//! network access is needed.
#![allow(dead_code)]

use async_trait::async_trait;
use scrape_gate::core::config::AppConfig;
use scrape_gate::features::reputation::ReputationService;
use scrape_gate::scraping::{FallbackRenderer, PageRenderer};
use scrape_gate::{AppState, FetchFailure, FetchOutcome, FetchedPage, ReputationOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn clean_text() -> String {
    "Rust is a general purpose programming language. ".repeat(20)
}

pub fn page(title: &str, content: &str) -> FetchedPage {
    FetchedPage {
        http_status: Some(200),
        title: title.to_string(),
        content: content.to_string(),
    }
}

/// Config with no credentials and no browser warm-up.
pub fn test_config() -> AppConfig {
    AppConfig {
        warm_browser: false,
        ..AppConfig::default()
    }
}

/// State wired with the given stubs on top of [`test_config`].
pub fn stub_state(
    config: AppConfig,
    reputation: Arc<dyn ReputationService>,
    renderer: Arc<dyn PageRenderer>,
    fallback: Arc<dyn FallbackRenderer>,
) -> AppState {
    AppState::new(config, reqwest::Client::new())
        .with_reputation(reputation)
        .with_renderer(renderer)
        .with_fallback(fallback)
}

// ── Reputation ──────────────────────────────────────────────────────────────

pub struct StubReputation {
    outcome: ReputationOutcome,
    delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl StubReputation {
    pub fn new(outcome: ReputationOutcome) -> Arc<Self> {
        Self::slow(outcome, Duration::ZERO)
    }

    pub fn ok() -> Arc<Self> {
        Self::new(ReputationOutcome::Ok)
    }

    pub fn slow(outcome: ReputationOutcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReputationService for StubReputation {
    async fn check(&self, _host: &str) -> ReputationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

// ── Renderers ───────────────────────────────────────────────────────────────

pub struct StubRenderer {
    outcome: FetchOutcome,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl StubRenderer {
    pub fn new(outcome: FetchOutcome) -> Arc<Self> {
        Self::slow(outcome, Duration::ZERO)
    }

    pub fn slow(outcome: FetchOutcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn serving(title: &str, content: &str) -> Arc<Self> {
        Self::new(Ok(page(title, content)))
    }

    pub fn failing(failure: FetchFailure) -> Arc<Self> {
        Self::new(Err(failure))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}

#[async_trait]
impl PageRenderer for StubRenderer {
    async fn render(&self, _url: &str, _deadline: Instant) -> FetchOutcome {
        self.respond().await
    }
}

#[async_trait]
impl FallbackRenderer for StubRenderer {
    async fn fetch(&self, _url: &str, _deadline: Instant) -> FetchOutcome {
        self.respond().await
    }
}

/// Renderer that panics for URLs containing `trigger` and serves a clean
/// page otherwise.
pub struct PanickingRenderer {
    pub trigger: &'static str,
}

impl PanickingRenderer {
    pub fn on(trigger: &'static str) -> Arc<Self> {
        Arc::new(Self { trigger })
    }
}

#[async_trait]
impl PageRenderer for PanickingRenderer {
    async fn render(&self, url: &str, _deadline: Instant) -> FetchOutcome {
        if url.contains(self.trigger) {
            panic!("renderer crashed on {url}");
        }
        Ok(page("Home", &clean_text()))
    }
}
