//! LLM provider factory.
//!
//! Resolves the configured provider name into a client and checks that the
//! secrets it needs are present.

use crate::client::LlmClient;
use crate::providers::OpenAiClient;
use policypro_core::{AppConfig, AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("openai")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - API key, required by every remote provider
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "openai" => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config("OpenAI provider requires OPENAI_API_KEY".to_string())
            })?;
            let client = match endpoint {
                Some(base_url) => OpenAiClient::with_base_url(api_key, base_url)?,
                None => OpenAiClient::new(api_key)?,
            };
            Ok(Arc::new(client))
        }
        _ => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}

/// Create the completion client described by `config.llm`.
pub fn client_from_config(config: &AppConfig) -> AppResult<Arc<dyn LlmClient>> {
    create_client(
        &config.llm.provider,
        config.llm.base_url.as_deref(),
        config.llm.api_key.as_deref(),
    )
}
