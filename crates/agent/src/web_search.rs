//! Google Custom Search client.

use policypro_core::config::WebSearchSettings;
use policypro_core::{AppError, AppResult};
use serde_json::Value;

/// Reply used when the search returns no items.
pub const NO_RESULTS: &str = "No good Google Search Result was found";

#[async_trait::async_trait]
pub trait WebSearch: Send + Sync {
    /// Text summary of the top results for `query`.
    async fn search(&self, query: &str) -> AppResult<String>;
}

pub struct GoogleSearchClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
    num_results: u32,
}

impl GoogleSearchClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
        num_results: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            num_results: num_results.clamp(1, 10),
        }
    }

    /// # Errors
    /// `Config` when the API key or engine id is missing.
    pub fn from_settings(settings: &WebSearchSettings) -> AppResult<Self> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| AppError::Config("Missing required settings: GOOGLE_API_KEY".to_string()))?;
        let engine_id = settings.engine_id.clone().ok_or_else(|| {
            AppError::Config("Missing required settings: CUSTOM_SEARCH_ENGINE_ID".to_string())
        })?;
        Ok(Self::new(
            settings.endpoint.clone(),
            api_key,
            engine_id,
            settings.num_results,
        ))
    }

    fn request_url(&self, query: &str) -> String {
        format!(
            "{}?key={}&cx={}&q={}&num={}",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&self.engine_id),
            urlencoding::encode(query),
            self.num_results
        )
    }
}

#[async_trait::async_trait]
impl WebSearch for GoogleSearchClient {
    async fn search(&self, query: &str) -> AppResult<String> {
        tracing::debug!(query = %query, "Running web search");

        let response = self
            .client
            .get(self.request_url(query))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Web search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Web search returned {}: {}",
                status, body
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Unparseable web search payload: {}", e)))?;

        let summary = summarize_results(&payload)?;
        tracing::info!(chars = summary.len(), "Web search completed");
        Ok(summary)
    }
}

/// Snippets of every item joined with spaces.
///
/// # Errors
/// `Upstream` when the payload is not a JSON object or `items` is not a list.
pub fn summarize_results(payload: &Value) -> AppResult<String> {
    if !payload.is_object() {
        return Err(AppError::Upstream(
            "Web search payload is not a JSON object".to_string(),
        ));
    }

    let items = match payload.get("items") {
        None | Some(Value::Null) => return Ok(NO_RESULTS.to_string()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(AppError::Upstream(
                "Web search payload has a non-list 'items' field".to_string(),
            ))
        }
    };

    let snippets: Vec<&str> = items
        .iter()
        .filter_map(|item| item.get("snippet").and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if snippets.is_empty() {
        Ok(NO_RESULTS.to_string())
    } else {
        Ok(snippets.join(" "))
    }
}
