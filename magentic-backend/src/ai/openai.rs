use crate::agents::MessageUsage;
use crate::ai::{Message, Provider, ProviderConfig};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Chat-completion client for OpenAI and Azure OpenAI deployments
#[derive(Clone)]
pub struct ModelClient {
    client: Client,
    provider: Provider,
    endpoint: Option<String>,
    model: String,
    api_key: Option<String>,
    api_version: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// A single model reply with the usage the service reported for it
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: MessageUsage,
    pub finish_reason: Option<String>,
}

impl ModelClient {
    /// Build a client for the given provider.
    ///
    /// Credentials are not checked here: a missing key or endpoint fails the
    /// first request instead.
    pub fn from_provider(config: &ProviderConfig) -> Result<Self, String> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            provider: config.provider,
            endpoint: config.endpoint.clone().filter(|e| !e.is_empty()),
            model: config.model_name.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            api_version: config.api_version.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn request_url(&self) -> Result<String, String> {
        match self.provider {
            Provider::OpenAI => Ok(self
                .endpoint
                .clone()
                .unwrap_or_else(|| OPENAI_CHAT_COMPLETIONS_URL.to_string())),
            Provider::AzureOpenAI => {
                let endpoint = self
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| "AZURE_OPEN_AI_ENDPOINT is not set".to_string())?;
                Ok(format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    endpoint.trim_end_matches('/'),
                    self.model,
                    self.api_version
                ))
            }
        }
    }

    pub async fn complete(&self, messages: Vec<Message>) -> Result<Completion, String> {
        let url = self.request_url()?;
        let api_key = self.api_key.as_deref().ok_or_else(|| match self.provider {
            Provider::OpenAI => "OPEN_AI_API_KEY is not set".to_string(),
            Provider::AzureOpenAI => "AZURE_OPEN_AI_KEY is not set".to_string(),
        })?;

        let request = CompletionRequest {
            model: &self.model,
            messages: &messages,
        };

        log::info!(
            "[MODEL] Sending {} messages to {} ({}, model {})",
            messages.len(),
            self.provider,
            url,
            self.model
        );

        let builder = self.client.post(&url).json(&request);
        let builder = match self.provider {
            Provider::OpenAI => builder.bearer_auth(api_key),
            Provider::AzureOpenAI => builder.header("api-key", api_key),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| format!("{} request failed: {}", self.provider, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                return Err(format!("{} error: {}", self.provider, error_response.error.message));
            }

            return Err(format!(
                "{} returned error status: {}, body: {}",
                self.provider, status, error_text
            ));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read {} response: {}", self.provider, e))?;

        log::debug!("[MODEL] Raw response:\n{}", response_text);

        let data: CompletionResponse = serde_json::from_str(&response_text).map_err(|e| {
            format!("Failed to parse {} response: {} - body: {}", self.provider, e, response_text)
        })?;

        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| format!("{} returned no choices", self.provider))?;

        let usage = data
            .usage
            .map(|u| MessageUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        log::info!(
            "[MODEL] Response - content_len: {}, prompt_tokens: {}, completion_tokens: {}, finish_reason: {:?}",
            choice.message.content.as_ref().map(|c| c.len()).unwrap_or(0),
            usage.prompt_tokens,
            usage.completion_tokens,
            choice.finish_reason
        );

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            usage,
            finish_reason: choice.finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ProviderSettings;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion_body() -> serde_json::Value {
        json!({
            "choices": [{
                "message": { "role": "assistant", "content": "Paris" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        })
    }

    #[tokio::test]
    async fn test_openai_completion_reports_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
            .expect(1)
            .mount(&server)
            .await;

        let settings = ProviderSettings {
            openai_api_key: Some("sk-test".to_string()),
            openai_endpoint: Some(format!("{}/v1/chat/completions", server.uri())),
            ..Default::default()
        };
        let client = ModelClient::from_provider(&settings.provider_config(false, "gpt-4o")).unwrap();

        let completion = client
            .complete(vec![Message::user("Capital of France?")])
            .await
            .unwrap();
        assert_eq!(completion.content, "Paris");
        assert_eq!(completion.usage.prompt_tokens, 12);
        assert_eq!(completion.usage.completion_tokens, 3);
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_azure_uses_deployment_path_and_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4.1/chat/completions"))
            .and(query_param("api-version", "2024-12-01-preview"))
            .and(header("api-key", "azure-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
            .expect(1)
            .mount(&server)
            .await;

        let settings = ProviderSettings {
            azure_endpoint: Some(format!("{}/", server.uri())),
            azure_api_key: Some("azure-key".to_string()),
            ..Default::default()
        };
        let client = ModelClient::from_provider(&settings.provider_config(true, "gpt-4.1")).unwrap();

        let completion = client.complete(vec![Message::user("hi")]).await.unwrap();
        assert_eq!(completion.content, "Paris");
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_on_first_use() {
        let settings = ProviderSettings::default();

        let client = ModelClient::from_provider(&settings.provider_config(false, "gpt-4o")).unwrap();
        let err = client.complete(vec![Message::user("hi")]).await.unwrap_err();
        assert!(err.contains("OPEN_AI_API_KEY"));

        let client = ModelClient::from_provider(&settings.provider_config(true, "gpt-4o")).unwrap();
        let err = client.complete(vec![Message::user("hi")]).await.unwrap_err();
        assert!(err.contains("AZURE_OPEN_AI_ENDPOINT"));
    }

    #[tokio::test]
    async fn test_error_body_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Incorrect API key provided" }
            })))
            .mount(&server)
            .await;

        let settings = ProviderSettings {
            openai_api_key: Some("sk-bad".to_string()),
            openai_endpoint: Some(server.uri()),
            ..Default::default()
        };
        let client = ModelClient::from_provider(&settings.provider_config(false, "gpt-4o")).unwrap();

        let err = client.complete(vec![Message::user("hi")]).await.unwrap_err();
        assert_eq!(err, "OpenAI error: Incorrect API key provided");
    }
}
