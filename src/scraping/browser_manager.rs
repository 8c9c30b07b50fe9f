//! Native browser management using `chromiumoxide`.
//!
//! This module owns:
//! * Finding a usable browser executable (Brave → Chrome → Chromium, cross-platform).
//! * `BrowserPool`: the one process-wide browser, launched once under a
//!   single-flight guard and shared read-only by every render.
//! * `IsolatedContext`: a per-fetch incognito context + tab that is always
//!   disposed, even when the future holding it is dropped.
//! * Resource-type blocking and the `wait_until_stable` network-idle heuristic.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams as FetchEnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound for best-effort cleanup CDP calls (tab close, context dispose).
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `configured` (from `CHROME_EXECUTABLE` / config file), if it exists
/// 2. PATH lookup of well-known binary names
/// 3. OS-specific well-known install paths
pub fn find_chrome_executable(configured: Option<&str>) -> Option<String> {
    if let Some(p) = configured {
        if Path::new(p).exists() {
            return Some(p.to_string());
        }
        warn!("Configured browser executable not found: {}", p);
    }

    for exe in [
        "brave-browser",
        "brave",
        "google-chrome",
        "chromium",
        "chromium-browser",
        "chrome",
    ] {
        if let Ok(full) = which::which(exe) {
            return Some(full.to_string_lossy().to_string());
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/local/bin/chromium",
            "/headless-shell/headless-shell",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Headless browser config builder ──────────────────────────────────────────

/// Build a `BrowserConfig` for headless operation with stealth defaults.
///
/// `--no-sandbox` / `--disable-dev-shm-usage` keep it working in containers;
/// `--disable-blink-features=AutomationControlled` hides `navigator.webdriver`.
pub fn build_headless_config(exe: &str, width: u32, height: u32) -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", random_user_agent()))
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Browser Pool ─────────────────────────────────────────────────────────────

struct LaunchedBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// The process-wide browser handle.
///
/// Launch happens at most once: concurrent first callers wait on the same
/// initialization. After launch the browser is only read, each render opening
/// its own [`IsolatedContext`]. Store `Arc<BrowserPool>` in `AppState`.
pub struct BrowserPool {
    exe: Option<String>,
    inner: OnceCell<LaunchedBrowser>,
    closed: AtomicBool,
    open_contexts: AtomicUsize,
}

impl BrowserPool {
    /// Create a pool. `configured_exe` overrides auto-discovery. Browser is lazy-started.
    pub fn new(configured_exe: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            exe: configured_exe,
            inner: OnceCell::new(),
            closed: AtomicBool::new(false),
            open_contexts: AtomicUsize::new(0),
        })
    }

    /// Executable that will be (or was) launched.
    pub fn executable(&self) -> Option<String> {
        find_chrome_executable(self.exe.as_deref())
    }

    pub fn is_started(&self) -> bool {
        self.inner.initialized()
    }

    /// Browser contexts created and not yet disposed.
    pub fn open_contexts(&self) -> usize {
        self.open_contexts.load(Ordering::Acquire)
    }

    async fn launch(&self) -> Result<LaunchedBrowser> {
        let exe = self.executable().ok_or_else(|| {
            anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE.")
        })?;
        info!("🚀 Browser pool: launching instance ({})", exe);

        let config = build_headless_config(&exe, 1366, 900)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Pool: failed to launch ({}): {}", exe, e))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Pool CDP handler error: {}", e);
                }
            }
        });
        Ok(LaunchedBrowser { browser, handler })
    }

    /// Shared browser, launching it on first use (single-flight).
    pub async fn browser(&self) -> Result<&Browser> {
        if self.closed.load(Ordering::Acquire) {
            return Err(anyhow!("browser pool is shut down"));
        }
        let launched = self.inner.get_or_try_init(|| self.launch()).await?;
        Ok(&launched.browser)
    }

    /// Best-effort eager launch so the first request doesn't pay for it.
    pub async fn warm_up(&self) {
        match self.browser().await {
            Ok(_) => info!("Browser pool warmed up"),
            Err(e) => warn!("Browser warm-up failed (will retry lazily): {}", e),
        }
    }

    /// Open a fresh incognito context with one blank tab.
    ///
    /// `block` lists resource types that will be failed at the network layer.
    /// The context is owned by a guard from the moment it exists, so dropping
    /// this future half-way still disposes it.
    pub async fn open_context(self: &Arc<Self>, block: &[ResourceType]) -> Result<IsolatedContext> {
        let browser = self.browser().await?;

        let context_id = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| anyhow!("Failed to create browser context: {}", e))?
            .result
            .browser_context_id;
        let mut guard = ContextGuard::new(Arc::clone(self), context_id.clone());

        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(|e| anyhow!("Invalid target params: {}", e))?;
        let page = browser
            .new_page(params)
            .await
            .map_err(|e| anyhow!("Failed to open tab: {}", e))?;
        guard.page = Some(page.clone());

        let blocker = if block.is_empty() {
            None
        } else {
            Some(block_resource_types(&page, block).await?)
        };
        guard.disarm();

        Ok(IsolatedContext {
            pool: Arc::clone(self),
            page,
            context_id,
            blocker,
            released: false,
        })
    }

    async fn dispose_context(&self, context_id: BrowserContextId) {
        self.open_contexts.fetch_sub(1, Ordering::AcqRel);
        let Some(launched) = self.inner.get() else {
            return;
        };
        match tokio::time::timeout(
            CLEANUP_TIMEOUT,
            launched
                .browser
                .execute(DisposeBrowserContextParams::new(context_id)),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Dispose browser context failed: {}", e),
            Err(_) => warn!("Dispose browser context timed out"),
        }
    }

    /// Gracefully close the pooled browser. Later `open_context` calls fail.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(launched) = self.inner.get() {
            let close = launched.browser.execute(CloseParams::default());
            if let Err(e) = tokio::time::timeout(CLEANUP_TIMEOUT, close).await {
                warn!("Browser close timed out: {}", e);
            }
            launched.handler.abort();
            info!("🛑 Browser pool shut down");
        }
    }
}

impl Drop for BrowserPool {
    fn drop(&mut self) {
        // Best-effort cleanup. Drop cannot await; if we're inside a tokio runtime,
        // spawn a task to close the browser to avoid zombie Chromium processes.
        let Some(mut launched) = self.inner.take() else {
            return;
        };
        launched.handler.abort();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        handle.spawn(async move {
            let _ = launched.browser.close().await;
        });
    }
}

// ── Isolated per-fetch context ───────────────────────────────────────────────

/// Owns a freshly created browser context until it is handed to an
/// [`IsolatedContext`]. Dropped while armed, it disposes the context (and the
/// tab, if one was opened) in the background.
struct ContextGuard {
    pool: Arc<BrowserPool>,
    context_id: Option<BrowserContextId>,
    page: Option<Page>,
}

impl ContextGuard {
    fn new(pool: Arc<BrowserPool>, context_id: BrowserContextId) -> Self {
        pool.open_contexts.fetch_add(1, Ordering::AcqRel);
        Self {
            pool,
            context_id: Some(context_id),
            page: None,
        }
    }

    /// Ownership moves to the caller; dropping no longer disposes anything.
    fn disarm(mut self) {
        self.context_id = None;
        self.page = None;
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let Some(context_id) = self.context_id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        debug!("Browser context abandoned while opening; disposing in background");
        handle.spawn(close_context(
            Arc::clone(&self.pool),
            self.page.take(),
            context_id,
            None,
        ));
    }
}

/// Incognito context + tab owned by one fetch.
///
/// Call [`IsolatedContext::release`] on the normal path. If the owning future
/// is dropped first (deadline won the race), `Drop` spawns the same cleanup.
pub struct IsolatedContext {
    pool: Arc<BrowserPool>,
    page: Page,
    context_id: BrowserContextId,
    blocker: Option<JoinHandle<()>>,
    released: bool,
}

impl IsolatedContext {
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the tab and dispose the context.
    pub async fn release(mut self) {
        self.released = true;
        close_context(
            Arc::clone(&self.pool),
            Some(self.page.clone()),
            self.context_id.clone(),
            self.blocker.take(),
        )
        .await;
    }
}

impl Drop for IsolatedContext {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        debug!("Browser context dropped before release; disposing in background");
        handle.spawn(close_context(
            Arc::clone(&self.pool),
            Some(self.page.clone()),
            self.context_id.clone(),
            self.blocker.take(),
        ));
    }
}

async fn close_context(
    pool: Arc<BrowserPool>,
    page: Option<Page>,
    context_id: BrowserContextId,
    blocker: Option<JoinHandle<()>>,
) {
    if let Some(blocker) = blocker {
        blocker.abort();
    }
    if let Some(page) = page {
        match tokio::time::timeout(CLEANUP_TIMEOUT, page.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Tab close error (non-fatal): {}", e),
            Err(_) => warn!("Tab close timed out"),
        }
    }
    pool.dispose_context(context_id).await;
}

// ── Resource blocking ────────────────────────────────────────────────────────

/// Resource types that are never needed for text extraction.
pub const TEXT_ONLY_BLOCKED_TYPES: &[ResourceType] = &[
    ResourceType::Image,
    ResourceType::Font,
    ResourceType::Media,
    ResourceType::Stylesheet,
];

/// Pause requests of the given types at the Fetch layer and fail them.
///
/// Returns the listener task; abort it when the page goes away.
pub async fn block_resource_types(page: &Page, types: &[ResourceType]) -> Result<JoinHandle<()>> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| anyhow!("Failed to listen for paused requests: {}", e))?;

    let patterns: Vec<RequestPattern> = types
        .iter()
        .map(|t| RequestPattern::builder().resource_type(t.clone()).build())
        .collect();
    page.execute(FetchEnableParams::builder().patterns(patterns).build())
        .await
        .map_err(|e| anyhow!("Failed to enable request interception: {}", e))?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let fail =
                FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
            if let Err(e) = page.execute(fail).await {
                debug!("Failed to block request {}: {}", event.request.url, e);
            }
        }
    }))
}

// ── Smart wait / networkidle ─────────────────────────────────────────────────

/// Wait until the DOM is parsed and the page network goes idle (no new
/// resource entries for `quiet_ms` consecutive ms), or until `timeout_ms`.
///
/// Polls `performance.getEntriesByType("resource").length` every 250 ms,
/// a Playwright-style networkidle heuristic that works without CDP Network events.
pub async fn wait_until_stable(page: &Page, quiet_ms: u64, timeout_ms: u64) {
    let poll_ms = 250u64;
    let start = std::time::Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = std::time::Instant::now();

    loop {
        if start.elapsed().as_millis() as u64 >= timeout_ms {
            debug!("wait_until_stable: timeout after {}ms", timeout_ms);
            break;
        }

        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let parsed: bool = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_str().map(|s| s == "interactive" || s == "complete"))
            .unwrap_or(false);

        if !parsed {
            // DOM still loading; do not allow "idle" to trigger.
            stable_since = std::time::Instant::now();
            last_count = count;
        } else if count != last_count {
            last_count = count;
            stable_since = std::time::Instant::now();
        } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
            debug!(
                "wait_until_stable: idle after {}ms ({} resources)",
                start.elapsed().as_millis(),
                count
            );
            break;
        }

        tokio::time::sleep(Duration::from_millis(poll_ms)).await;
    }
}
