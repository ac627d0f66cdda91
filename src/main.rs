use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::{env, fs, net::SocketAddr, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use carlot_rust::{build_app, config::Settings, AppState};

#[derive(Deserialize, Debug)]
struct ProxyConfig {
    http_proxy: Option<String>,
    https_proxy: Option<String>,
}

fn set_proxy_var(name: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    // SAFETY: only called during startup, before any task reads the environment.
    unsafe { env::set_var(name, value) };
    tracing::info!("Set {} environment variable.", name);
}

// proxyconfig.json wins over `proxy_url` from the settings.
fn apply_proxy_settings(settings: &Settings) -> Result<()> {
    let config_path = Path::new("proxyconfig.json");
    if config_path.exists() {
        tracing::info!("Found proxyconfig.json, loading proxy settings...");
        let content = fs::read_to_string(config_path).context("Failed to read proxyconfig.json")?;
        let proxy: ProxyConfig = serde_json::from_str(&content).context("Failed to parse proxyconfig.json")?;
        if let Some(http_proxy) = proxy.http_proxy {
            set_proxy_var("HTTP_PROXY", &http_proxy);
        }
        if let Some(https_proxy) = proxy.https_proxy {
            set_proxy_var("HTTPS_PROXY", &https_proxy);
        }
    } else if let Some(proxy_url) = &settings.proxy_url {
        set_proxy_var("HTTP_PROXY", proxy_url);
        set_proxy_var("HTTPS_PROXY", proxy_url);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "carlot_rust=info,tower_http=info".into()))
        .with(fmt::layer())
        .init();

    tracing::info!("Initializing CarLot server...");

    let settings = match Settings::new() {
        Ok(s) => {
            tracing::info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    if let Err(e) = apply_proxy_settings(&settings) {
        tracing::warn!("Failed to load or apply proxy configuration: {}", e);
    }

    // Built after the proxy variables are set so it picks them up.
    let http_client = Arc::new(
        Client::builder()
            .timeout(Duration::from_secs(settings.backend.request_timeout_secs))
            .cookie_store(true)
            .build()
            .context("Failed to build shared reqwest client")?,
    );

    let addr: SocketAddr = settings
        .server_address
        .parse()
        .with_context(|| format!("Invalid server address format: {}", settings.server_address))?;

    let app = build_app(AppState::build(settings, http_client));

    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => {
            tracing::info!("Server listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
