use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use scrape_gate::core::config::load_config;
use scrape_gate::{http, AppState};

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(v) = args.next() {
                if let Ok(p) = v.parse::<u16>() {
                    return Some(p);
                }
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = load_config();
    info!("Starting scrape-gate with {:?}", config);
    if config.apivoid_api_key.is_none() {
        warn!("APIVOID_API_KEY not set: every URL will fail the reputation stage");
    }
    if config.scraperapi_key.is_none() {
        warn!("SCRAPERAPI_KEY not set: rendering-proxy fallback disabled");
    }

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let port = parse_port_from_args().unwrap_or(config.port);
    let warm_browser = config.warm_browser;
    let state = Arc::new(AppState::new(config, http_client));

    if warm_browser {
        let pool = Arc::clone(&state.browser_pool);
        tokio::spawn(async move { pool.warm_up().await });
    }

    let app = http::router(state.clone());

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("scrape-gate listening on http://{}", bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // In-flight batches have drained; now the browser can go.
    state.browser_pool.shutdown().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received; draining in-flight requests");
}
