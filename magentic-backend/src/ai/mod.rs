pub mod openai;

pub use openai::{Completion, ModelClient};

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-12-01-preview";

/// Models offered in the UI when the alternate (Azure OpenAI) provider is selected
pub const ALTERNATE_PROVIDER_MODELS: &[&str] =
    &["gpt-4.1-mini", "gpt-4.1", "gpt-4o", "gpt-4o-mini", "o3-mini"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Provider {
    #[strum(serialize = "OpenAI")]
    OpenAI,
    #[strum(serialize = "Azure OpenAI")]
    AzureOpenAI,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Provider credentials, loaded once from the environment
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub openai_api_key: Option<String>,
    pub openai_endpoint: Option<String>,
    pub azure_endpoint: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_api_version: Option<String>,
}

impl ProviderSettings {
    /// Resolve the configuration for one run.
    ///
    /// Missing credentials are not an error here; the model client reports
    /// them on its first request.
    pub fn provider_config(&self, use_alternate_provider: bool, model_name: &str) -> ProviderConfig {
        let model_name = if model_name.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            model_name.trim().to_string()
        };

        if use_alternate_provider {
            ProviderConfig {
                provider: Provider::AzureOpenAI,
                model_name,
                api_key: self.azure_api_key.clone(),
                endpoint: self.azure_endpoint.clone(),
                api_version: self
                    .azure_api_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            }
        } else {
            ProviderConfig {
                provider: Provider::OpenAI,
                model_name,
                api_key: self.openai_api_key.clone(),
                endpoint: self.openai_endpoint.clone(),
                api_version: String::new(),
            }
        }
    }
}

/// Provider selection, model and credentials for a single run
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model_name: String,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub api_version: String,
}
