//! # kf-config
//!
//! Static configuration for the forum client. The built-in defaults are the
//! production constants; a `kino-forum.toml` file or `KINO__SECTION__KEY`
//! environment variables may override them.

pub mod telemetry;

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] config::ConfigError),

    #[error("telemetry init failed: {0}")]
    Telemetry(String),
}

/// Connection identifiers for the database/auth collaborator.
#[derive(Debug, Deserialize)]
#[serde(from = "RawBackend")]
pub struct BackendConfig {
    pub api_key: SecretString,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
}

#[derive(Deserialize)]
struct RawBackend {
    api_key: String,
    auth_domain: String,
    project_id: String,
    storage_bucket: String,
    messaging_sender_id: String,
    app_id: String,
}

impl From<RawBackend> for BackendConfig {
    fn from(raw: RawBackend) -> Self {
        Self {
            api_key: SecretString::from(raw.api_key),
            auth_domain: raw.auth_domain,
            project_id: raw.project_id,
            storage_bucket: raw.storage_bucket,
            messaging_sender_id: raw.messaging_sender_id,
            app_id: raw.app_id,
        }
    }
}

/// Media host account and unsigned upload preset.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub upload_preset: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ForumConfig {
    pub backend: BackendConfig,
    pub media: MediaConfig,
}

const DEFAULTS: &[(&str, &str)] = &[
    ("backend.api_key", ""),
    ("backend.auth_domain", "kino-forum-1980.firebaseapp.com"),
    ("backend.project_id", "kino-forum-1980"),
    ("backend.storage_bucket", "kino-forum-1980.firebasestorage.app"),
    ("backend.messaging_sender_id", "787404143040"),
    ("backend.app_id", "1:787404143040:web:ed78b42eaf3a27ddce3025"),
    ("media.cloud_name", "ddxdtdbxh"),
    ("media.upload_preset", "kino-forum"),
    ("media.api_base", "https://api.cloudinary.com"),
];

const DEFAULT_TIMEOUT_SECS: i64 = 30;

impl ForumConfig {
    /// `.env` → defaults → optional `kino-forum.toml` → `KINO__*` environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = Self::builder()?
            .add_source(File::with_name("kino-forum").required(false))
            .add_source(
                Environment::with_prefix("KINO")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Self>()?;
        debug!("forum configuration loaded");
        Ok(cfg)
    }

    /// Defaults overlaid with a TOML document, without touching the environment.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Ok(Self::builder()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }

    /// The built-in constants alone.
    pub fn defaults() -> Result<Self, ConfigError> {
        Ok(Self::builder()?.build()?.try_deserialize()?)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let mut builder = Config::builder();
        for (key, value) in DEFAULTS {
            builder = builder.set_default(*key, *value)?;
        }
        Ok(builder.set_default("media.timeout_secs", DEFAULT_TIMEOUT_SECS)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults_are_the_production_constants() {
        let cfg = ForumConfig::defaults().unwrap();
        assert_eq!(cfg.media.cloud_name, "ddxdtdbxh");
        assert_eq!(cfg.media.upload_preset, "kino-forum");
        assert_eq!(cfg.media.timeout_secs, 30);
        assert_eq!(cfg.backend.project_id, "kino-forum-1980");
        assert_eq!(cfg.backend.api_key.expose_secret(), "");
    }

    #[test]
    fn toml_overrides_individual_keys() {
        let cfg = ForumConfig::from_toml(
            r#"
            [media]
            upload_preset = "staging"
            timeout_secs = 5

            [backend]
            api_key = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.media.upload_preset, "staging");
        assert_eq!(cfg.media.cloud_name, "ddxdtdbxh");
        assert_eq!(cfg.media.timeout_secs, 5);
        assert_eq!(cfg.backend.api_key.expose_secret(), "secret");
        assert!(!format!("{:?}", cfg.backend).contains("secret"));
    }
}
