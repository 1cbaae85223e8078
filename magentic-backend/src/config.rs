use std::env;

use crate::ai::ProviderSettings;
use crate::storage::record_store::DEFAULT_MAX_DOCUMENT_BYTES;
use crate::storage::serializer::DEFAULT_BUDGET_BYTES;

pub const DEFAULT_UI_PORT: u16 = 8501;
pub const DEFAULT_API_PORT: u16 = 8000;

/// Run result persistence settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub enabled: bool,
    pub record_store_path: String,
    pub record_container: String,
    pub record_max_bytes: usize,
    pub budget_bytes: usize,
    pub blob_account_url: Option<String>,
    pub blob_container: String,
    pub blob_token: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            record_store_path: "./.db/run_results.db".to_string(),
            record_container: "run_results".to_string(),
            record_max_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            budget_bytes: DEFAULT_BUDGET_BYTES,
            blob_account_url: None,
            blob_container: "magentic-one-images".to_string(),
            blob_token: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub storage: StorageConfig,
    pub providers: ProviderSettings,
    /// Host used in shareable run links
    pub public_host: Option<String>,
}

impl Config {
    pub fn from_env(default_port: u16) -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok(), default_port)
    }

    /// Build the configuration from any key lookup (the process environment in production)
    pub fn from_lookup<F>(lookup: F, default_port: u16) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = StorageConfig::default();

        let storage = StorageConfig {
            enabled: get("STORE_RUN_RESULT").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            record_store_path: get("RECORD_STORE_PATH").unwrap_or(defaults.record_store_path),
            record_container: get("RECORD_STORE_CONTAINER").unwrap_or(defaults.record_container),
            record_max_bytes: parse_or(get("RECORD_MAX_BYTES"), "RECORD_MAX_BYTES", defaults.record_max_bytes)?,
            budget_bytes: parse_or(get("RECORD_BUDGET_BYTES"), "RECORD_BUDGET_BYTES", defaults.budget_bytes)?,
            blob_account_url: get("AZURE_STORAGE_ACCOUNT_URL"),
            blob_container: get("AZURE_STORAGE_CONTAINER").unwrap_or(defaults.blob_container),
            blob_token: get("AZURE_STORAGE_TOKEN"),
        };

        let providers = ProviderSettings {
            openai_api_key: get("OPEN_AI_API_KEY"),
            openai_endpoint: get("OPEN_AI_ENDPOINT"),
            azure_endpoint: get("AZURE_OPEN_AI_ENDPOINT"),
            azure_api_key: get("AZURE_OPEN_AI_KEY"),
            azure_api_version: get("AZURE_OPEN_AI_API_VERSION"),
        };

        Ok(Self {
            port: parse_or(get("PORT"), "PORT", default_port)?,
            database_url: get("DATABASE_URL").unwrap_or_else(|| "./.db/magentic_tasks.db".to_string()),
            storage,
            providers,
            public_host: get("WEBSITE_HOSTNAME").or_else(|| get("HTTP_HOST")).or_else(|| get("HOST")),
        })
    }

    /// Link that reopens a stored run
    pub fn share_url(&self, run_id: &str) -> String {
        match &self.public_host {
            Some(host) => format!("https://{}?run_id={}", host, run_id),
            None => format!("http://localhost:{}?run_id={}", self.port, run_id),
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, String> {
    match value {
        Some(v) => v
            .parse()
            .map_err(|_| format!("{} must be a valid number, got '{}'", key, v)),
        None => Ok(default),
    }
}
