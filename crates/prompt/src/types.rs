//! Prompt types for Policy Pro.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A prompt definition, built in or loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier (e.g. "agent.system")
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    #[serde(default)]
    pub behavior: PromptBehavior,

    /// Variables that must be supplied when rendering
    #[serde(default)]
    pub variables: Vec<String>,

    /// Template string with Handlebars syntax
    pub template: String,

    #[serde(default)]
    pub output: PromptOutputSpec,
}

/// Behavioral settings for prompt execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBehavior {
    /// Language the model must answer in
    #[serde(default = "default_language")]
    pub language: String,

    /// Tone (e.g., "professional", "neutral")
    #[serde(default)]
    pub tone: String,

    /// Style (e.g., "concise", "detailed")
    #[serde(default)]
    pub style: String,
}

fn default_language() -> String {
    "es".to_string()
}

impl Default for PromptBehavior {
    fn default() -> Self {
        Self {
            language: default_language(),
            tone: "professional".to_string(),
            style: "concise".to_string(),
        }
    }
}

/// Output specification for the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    /// Output format ("text" or "json")
    pub format: String,
}

impl Default for PromptOutputSpec {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
        }
    }
}

/// Where a definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptOrigin {
    Builtin,
    Workspace,
}

/// A rendered prompt ready to be sent as a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    pub text: String,
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Whether the definition expects JSON output
    #[serde(rename = "expectsJson")]
    pub expects_json: bool,

    #[serde(rename = "resolvedVariables")]
    pub resolved_variables: HashMap<String, String>,
}
