use crate::config::ServiceConfig;
use crate::error::{HealError, Result};
use crate::providers::{CompletionRequest, CompletionResponse, Provider};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible chat completions endpoint (GitHub Models, Azure
/// inference, or anything speaking the same wire format).
pub struct GitHubModelsProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl GitHubModelsProvider {
    pub fn new(api_key: String, config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn completions_url(&self) -> String {
        if self.base_url.ends_with("/chat/completions") {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

/// Pull the completion text out of a chat-completions response body.
pub fn parse_completion(data: &serde_json::Value, model: &str) -> Result<CompletionResponse> {
    let content = data["choices"][0]["message"]["content"]
        .as_str()
        .ok_or(HealError::MissingCompletion)?
        .to_string();

    let finish_reason = data["choices"][0]["finish_reason"]
        .as_str()
        .map(|s| s.to_string());

    Ok(CompletionResponse {
        id: data["id"].as_str().unwrap_or("unknown").to_string(),
        model: data["model"].as_str().unwrap_or(model).to_string(),
        content,
        finish_reason,
    })
}

#[async_trait]
impl Provider for GitHubModelsProvider {
    fn name(&self) -> &str {
        "github-models"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!(model = %request.model, messages = request.messages.len(), "Sending completion request");

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HealError::ApiRequest {
                status: Some(status.as_u16()),
                message: format!("{} {}", status.as_u16(), error_text),
            });
        }

        let data: serde_json::Value = response.json().await?;
        parse_completion(&data, &request.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_completion() {
        let data = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024",
            "choices": [{ "message": { "role": "assistant", "content": "fixed" }, "finish_reason": "stop" }]
        });
        let response = parse_completion(&data, "gpt-4o").unwrap();
        assert_eq!(response.content, "fixed");
        assert_eq!(response.model, "gpt-4o-2024");
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_missing_completion_field() {
        let data = json!({ "choices": [] });
        assert!(matches!(
            parse_completion(&data, "gpt-4o"),
            Err(HealError::MissingCompletion)
        ));

        let data = json!({ "choices": [{ "message": { "content": null } }] });
        assert!(matches!(
            parse_completion(&data, "gpt-4o"),
            Err(HealError::MissingCompletion)
        ));
    }

    #[test]
    fn test_completions_url() {
        let mut config = ServiceConfig::default();
        config.endpoint = "https://models.github.ai/inference/".to_string();
        let provider = GitHubModelsProvider::new("k".to_string(), &config).unwrap();
        assert_eq!(
            provider.completions_url(),
            "https://models.github.ai/inference/chat/completions"
        );

        config.endpoint = "https://models.inference.ai.azure.com/chat/completions".to_string();
        let provider = GitHubModelsProvider::new("k".to_string(), &config).unwrap();
        assert_eq!(
            provider.completions_url(),
            "https://models.inference.ai.azure.com/chat/completions"
        );
    }
}
