use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// FileConfig: optional scrape-gate.json, every field overridable by env var
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "SCRAPE_GATE_CONFIG";
pub const ENV_APIVOID_API_KEY: &str = "APIVOID_API_KEY";
pub const ENV_APIVOID_ENDPOINT: &str = "APIVOID_ENDPOINT";
pub const ENV_SCRAPERAPI_KEY: &str = "SCRAPERAPI_KEY";
pub const ENV_SCRAPERAPI_ENDPOINT: &str = "SCRAPERAPI_ENDPOINT";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_PORT: &str = "PORT";
pub const ENV_MAX_BATCH_URLS: &str = "MAX_BATCH_URLS";
pub const ENV_BATCH_CONCURRENCY: &str = "BATCH_CONCURRENCY";
pub const ENV_TASK_TIMEOUT_SECS: &str = "TASK_TIMEOUT_SECS";
pub const ENV_REPUTATION_TIMEOUT_SECS: &str = "REPUTATION_TIMEOUT_SECS";
pub const ENV_RENDER_OP_TIMEOUT_SECS: &str = "RENDER_OP_TIMEOUT_SECS";
pub const ENV_FALLBACK_TIMEOUT_SECS: &str = "FALLBACK_TIMEOUT_SECS";
pub const ENV_WARM_BROWSER: &str = "WARM_BROWSER";

pub const DEFAULT_APIVOID_ENDPOINT: &str = "https://api.apivoid.com/v2/site-trustworthiness";
pub const DEFAULT_SCRAPERAPI_ENDPOINT: &str = "https://api.scraperapi.com/";

/// Raw shape of `scrape-gate.json`. All fields optional.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct FileConfig {
    pub apivoid_api_key: Option<String>,
    pub apivoid_endpoint: Option<String>,
    pub scraperapi_key: Option<String>,
    pub scraperapi_endpoint: Option<String>,
    pub chrome_executable: Option<String>,
    pub port: Option<u16>,
    pub max_batch_urls: Option<usize>,
    pub batch_concurrency: Option<usize>,
    pub task_timeout_secs: Option<u64>,
    pub reputation_timeout_secs: Option<u64>,
    pub render_op_timeout_secs: Option<u64>,
    pub fallback_timeout_secs: Option<u64>,
    pub warm_browser: Option<bool>,
}

/// Resolved process configuration. Read once at startup.
#[derive(Clone)]
pub struct AppConfig {
    /// Never logged.
    pub apivoid_api_key: Option<String>,
    pub apivoid_endpoint: String,
    /// Never logged.
    pub scraperapi_key: Option<String>,
    pub scraperapi_endpoint: String,
    pub chrome_executable: Option<String>,
    pub port: u16,
    pub max_batch_urls: usize,
    pub batch_concurrency: usize,
    pub task_timeout: Duration,
    pub reputation_timeout: Duration,
    pub render_op_timeout: Duration,
    pub fallback_timeout: Duration,
    pub warm_browser: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            apivoid_api_key: None,
            apivoid_endpoint: DEFAULT_APIVOID_ENDPOINT.to_string(),
            scraperapi_key: None,
            scraperapi_endpoint: DEFAULT_SCRAPERAPI_ENDPOINT.to_string(),
            chrome_executable: None,
            port: 3000,
            max_batch_urls: 50,
            batch_concurrency: 2,
            task_timeout: Duration::from_secs(60),
            reputation_timeout: Duration::from_secs(12),
            render_op_timeout: Duration::from_secs(35),
            fallback_timeout: Duration::from_secs(40),
            warm_browser: true,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("apivoid_api_key", &self.apivoid_api_key.as_ref().map(|_| "<set>"))
            .field("apivoid_endpoint", &self.apivoid_endpoint)
            .field("scraperapi_key", &self.scraperapi_key.as_ref().map(|_| "<set>"))
            .field("scraperapi_endpoint", &self.scraperapi_endpoint)
            .field("chrome_executable", &self.chrome_executable)
            .field("port", &self.port)
            .field("max_batch_urls", &self.max_batch_urls)
            .field("batch_concurrency", &self.batch_concurrency)
            .field("task_timeout", &self.task_timeout)
            .field("warm_browser", &self.warm_browser)
            .finish()
    }
}

impl AppConfig {
    /// Resolve each field: JSON value → env var → default.
    pub fn resolve(file: FileConfig) -> Self {
        let d = AppConfig::default();
        Self {
            apivoid_api_key: non_blank(file.apivoid_api_key)
                .or_else(|| env_str(ENV_APIVOID_API_KEY)),
            apivoid_endpoint: non_blank(file.apivoid_endpoint)
                .or_else(|| env_str(ENV_APIVOID_ENDPOINT))
                .unwrap_or(d.apivoid_endpoint),
            scraperapi_key: non_blank(file.scraperapi_key).or_else(|| env_str(ENV_SCRAPERAPI_KEY)),
            scraperapi_endpoint: non_blank(file.scraperapi_endpoint)
                .or_else(|| env_str(ENV_SCRAPERAPI_ENDPOINT))
                .unwrap_or(d.scraperapi_endpoint),
            chrome_executable: non_blank(file.chrome_executable)
                .or_else(|| env_str(ENV_CHROME_EXECUTABLE)),
            port: file.port.or_else(|| env_parse(ENV_PORT)).unwrap_or(d.port),
            max_batch_urls: file
                .max_batch_urls
                .or_else(|| env_parse(ENV_MAX_BATCH_URLS))
                .unwrap_or(d.max_batch_urls),
            batch_concurrency: file
                .batch_concurrency
                .or_else(|| env_parse(ENV_BATCH_CONCURRENCY))
                .unwrap_or(d.batch_concurrency)
                .max(1),
            task_timeout: secs(file.task_timeout_secs, ENV_TASK_TIMEOUT_SECS, d.task_timeout),
            reputation_timeout: secs(
                file.reputation_timeout_secs,
                ENV_REPUTATION_TIMEOUT_SECS,
                d.reputation_timeout,
            ),
            render_op_timeout: secs(
                file.render_op_timeout_secs,
                ENV_RENDER_OP_TIMEOUT_SECS,
                d.render_op_timeout,
            ),
            fallback_timeout: secs(
                file.fallback_timeout_secs,
                ENV_FALLBACK_TIMEOUT_SECS,
                d.fallback_timeout,
            ),
            warm_browser: file
                .warm_browser
                .or_else(|| env_flag(ENV_WARM_BROWSER))
                .unwrap_or(d.warm_browser),
        }
    }
}

/// Load `scrape-gate.json` from standard locations and resolve it against env vars.
///
/// Search order (first found wins):
/// 1. `SCRAPE_GATE_CONFIG` env var path
/// 2. `./scrape-gate.json`
/// 3. `../scrape-gate.json`
///
/// Missing file → env vars and defaults only. Parse error → warning, same as missing.
pub fn load_config() -> AppConfig {
    AppConfig::resolve(load_file_config())
}

fn load_file_config() -> FileConfig {
    let mut candidates = vec![
        PathBuf::from("scrape-gate.json"),
        PathBuf::from("../scrape-gate.json"),
    ];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        return match serde_json::from_str::<FileConfig>(&contents) {
            Ok(cfg) => {
                tracing::info!("scrape-gate.json loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    "scrape-gate.json parse error at {}: {}; using env/defaults",
                    path.display(),
                    e
                );
                FileConfig::default()
            }
        };
    }

    FileConfig::default()
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn env_str(key: &str) -> Option<String> {
    non_blank(std::env::var(key).ok())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_str(key).and_then(|v| v.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    let v = env_str(key)?.to_ascii_lowercase();
    match v.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn secs(file: Option<u64>, key: &str, default: Duration) -> Duration {
    file.or_else(|| env_parse(key))
        .map(Duration::from_secs)
        .unwrap_or(default)
}
