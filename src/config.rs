// Application configuration.
// Layered with the 'config' crate: built-in defaults, then an optional
// config.toml, then APP_-prefixed environment variables (APP_BACKEND__BASE_URL, ...).

use anyhow::{bail, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Talk to the hosted backend over HTTP.
    Rest,
    /// Keep every record in process memory (local development and tests).
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    pub mode: BackendMode,
    pub base_url: String,
    pub app_id: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    // Shared secret the backend signs session tokens with (HS256).
    pub jwt_secret: Option<String>,
    pub jwt_issuer: Option<String>,
    pub login_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceSettings {
    pub page_size: usize,
    pub similar_limit: usize,
    pub geocode_cache_size: usize,
    pub geocode_cache_ttl_secs: u64,
    // Per-session search state, keyed by user email or x-session-id.
    pub session_cache_size: usize,
    pub session_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WizardSettings {
    pub draft_cache_size: usize,
    pub draft_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagingSettings {
    pub poll_interval_secs: u64,
    pub system_sender: String,
    pub conversation_cache_size: usize,
    pub conversation_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_address: String,
    pub proxy_url: Option<String>,
    pub backend: BackendSettings,
    pub auth: AuthSettings,
    pub marketplace: MarketplaceSettings,
    pub wizard: WizardSettings,
    pub messaging: MessagingSettings,
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Self::with_defaults(Config::builder())?
            // Load from a configuration file (e.g., config.toml)
            .add_source(File::with_name("config").required(false))
            // Load from environment variables (e.g., APP_BACKEND__BASE_URL)
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Built-in defaults only, without reading files or the environment.
    pub fn defaults() -> Result<Self> {
        let settings: Self = Self::with_defaults(Config::builder())?
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.messaging.poll_interval_secs == 0 {
            bail!("messaging.poll_interval_secs must be at least 1");
        }
        let caches = [
            ("marketplace.geocode_cache_size", self.marketplace.geocode_cache_size),
            ("marketplace.session_cache_size", self.marketplace.session_cache_size),
            ("wizard.draft_cache_size", self.wizard.draft_cache_size),
            ("messaging.conversation_cache_size", self.messaging.conversation_cache_size),
        ];
        for (key, size) in caches {
            if size == 0 {
                bail!("{} must be at least 1", key);
            }
        }
        Ok(())
    }

    fn with_defaults(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>> {
        Ok(builder
            .set_default("server_address", "127.0.0.1:3000")?
            .set_default("backend.mode", "rest")?
            .set_default("backend.base_url", "https://app.base44.com/api")?
            .set_default("backend.app_id", "")?
            .set_default("backend.request_timeout_secs", 30)?
            .set_default("auth.login_url", "https://app.base44.com/login")?
            .set_default("marketplace.page_size", 20)?
            .set_default("marketplace.similar_limit", 6)?
            .set_default("marketplace.geocode_cache_size", 1024)?
            .set_default("marketplace.geocode_cache_ttl_secs", 86_400)?
            .set_default("marketplace.session_cache_size", 10_000)?
            .set_default("marketplace.session_cache_ttl_secs", 7 * 86_400)?
            .set_default("wizard.draft_cache_size", 2_000)?
            .set_default("wizard.draft_cache_ttl_secs", 86_400)?
            .set_default("messaging.poll_interval_secs", 5)?
            .set_default("messaging.system_sender", "system@carlot.app")?
            .set_default("messaging.conversation_cache_size", 5_000)?
            .set_default("messaging.conversation_cache_ttl_secs", 3_600)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize() {
        let settings = Settings::defaults().unwrap();
        assert_eq!(settings.server_address, "127.0.0.1:3000");
        assert_eq!(settings.backend.mode, BackendMode::Rest);
        assert_eq!(settings.marketplace.page_size, 20);
        assert_eq!(settings.messaging.poll_interval_secs, 5);
        assert!(settings.auth.jwt_secret.is_none());
        assert_eq!(settings.wizard.draft_cache_size, 2_000);
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut settings = Settings::defaults().unwrap();
        settings.messaging.poll_interval_secs = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));

        settings.messaging.poll_interval_secs = 1;
        settings.wizard.draft_cache_size = 0;
        assert!(settings.validate().is_err());
    }
}
