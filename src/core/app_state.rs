use crate::core::config::AppConfig;
use crate::features::reputation::{ApiVoidChecker, ReputationService};
use crate::scraping::{
    BrowserPool, ChromeRenderer, FallbackRenderer, PageRenderer, ScraperApiFetcher,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    // Shared persistent browser instance (one context per render).
    pub browser_pool: Arc<BrowserPool>,

    // External collaborators, swappable for stubs in tests.
    pub reputation: Arc<dyn ReputationService>,
    pub renderer: Arc<dyn PageRenderer>,
    pub fallback: Arc<dyn FallbackRenderer>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("browser_started", &self.browser_pool.is_started())
            .finish()
    }
}

impl AppState {
    /// Wire the real collaborators from `config`. `http_client` is shared by
    /// the reputation and rendering-proxy clients.
    pub fn new(config: AppConfig, http_client: reqwest::Client) -> Self {
        let browser_pool = BrowserPool::new(config.chrome_executable.clone());
        let reputation = Arc::new(ApiVoidChecker::new(
            http_client.clone(),
            config.apivoid_endpoint.clone(),
            config.apivoid_api_key.clone(),
            config.reputation_timeout,
        ));
        let renderer = Arc::new(ChromeRenderer::new(
            Arc::clone(&browser_pool),
            config.render_op_timeout,
        ));
        let fallback = Arc::new(ScraperApiFetcher::new(
            http_client,
            config.scraperapi_endpoint.clone(),
            config.scraperapi_key.clone(),
            config.fallback_timeout,
        ));

        Self {
            config: Arc::new(config),
            browser_pool,
            reputation,
            renderer,
            fallback,
        }
    }

    pub fn with_reputation(mut self, reputation: Arc<dyn ReputationService>) -> Self {
        self.reputation = reputation;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackRenderer>) -> Self {
        self.fallback = fallback;
        self
    }
}
