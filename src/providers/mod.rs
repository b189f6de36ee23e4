use crate::config::HealerConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod github_models;
pub mod retry;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: String,
    pub finish_reason: Option<String>,
}

/// The "complete a chat-style prompt, return text" contract of the
/// code-generation service.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// One request, one completion. A response without completion text is
    /// `HealError::MissingCompletion`.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

/// Build the configured provider. Fails up front when no credential is set.
pub fn create_provider(config: &HealerConfig) -> Result<Arc<dyn Provider>> {
    let api_key = config.require_api_key()?;

    Ok(Arc::new(github_models::GitHubModelsProvider::new(
        api_key.to_string(),
        &config.service,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HealError;

    #[test]
    fn test_request_wire_shape() {
        let request = CompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![Message::system("rules"), Message::user("fix it")],
            temperature: 0.0,
            max_tokens: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["temperature"], 0.0);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "fix it");
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn test_create_provider_requires_credential() {
        let mut config = HealerConfig::default();
        assert!(matches!(
            create_provider(&config),
            Err(HealError::MissingCredential(_))
        ));

        config.service.api_key = Some("token".to_string());
        assert_eq!(create_provider(&config).unwrap().name(), "github-models");
    }
}
