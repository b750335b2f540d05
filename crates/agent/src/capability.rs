//! The two tools the assistant can use, and the record of each use.

use policypro_llm::{ToolCall, ToolDefinition};
use policypro_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Closed set of capabilities exposed to the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    DocumentRetrieval,
    WebSearch,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::DocumentRetrieval, Capability::WebSearch];

    /// Name of the tool as the model sees it.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Capability::DocumentRetrieval => "retriever",
            Capability::WebSearch => "google_search",
        }
    }

    pub fn from_tool_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tool_name() == name)
    }

    pub fn definition(&self) -> ToolDefinition {
        let (description, query_description) = match self {
            Capability::DocumentRetrieval => (
                "Útil para cuando necesitas buscar información relevante en la base de datos de pólizas de seguro.",
                "Pregunta o términos a buscar en las pólizas",
            ),
            Capability::WebSearch => (
                "Útil para cuando necesitas buscar en internet noticias o información sobre seguros en general que no se encuentra en la base de datos de pólizas. Úsala solo si el usuario lo pide explícitamente diciendo \"busca en google\".",
                "Consulta para el buscador web",
            ),
        };

        ToolDefinition::new(
            self.tool_name(),
            description,
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": query_description
                    }
                },
                "required": ["query"]
            }),
        )
    }

    /// Definitions of every capability, in a stable order.
    pub fn tool_definitions() -> Vec<ToolDefinition> {
        Self::ALL.iter().map(Capability::definition).collect()
    }
}

#[derive(Debug, Deserialize)]
struct QueryArguments {
    query: String,
}

/// A tool call from the model, resolved to a capability.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityRequest {
    pub call_id: String,
    pub capability: Capability,
    pub query: String,
}

impl CapabilityRequest {
    /// # Errors
    /// `Upstream` for an unknown tool or arguments without a non-empty
    /// `query` string.
    pub fn from_tool_call(call: &ToolCall) -> AppResult<Self> {
        let capability = Capability::from_tool_name(&call.name).ok_or_else(|| {
            AppError::Upstream(format!("Model requested unknown tool '{}'", call.name))
        })?;

        let args: QueryArguments = call.parse_arguments().map_err(|e| {
            AppError::Upstream(format!(
                "Malformed arguments for tool '{}': {}",
                call.name, e
            ))
        })?;

        let query = args.query.trim().to_string();
        if query.is_empty() {
            return Err(AppError::Upstream(format!(
                "Empty query for tool '{}'",
                call.name
            )));
        }

        Ok(Self {
            call_id: call.id.clone(),
            capability,
            query,
        })
    }
}

/// One tool use within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    pub tool_name: String,
    pub input: String,
    pub output: String,
}

impl ToolInvocationRecord {
    pub fn new(capability: Capability, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: capability.tool_name().to_string(),
            input: input.into(),
            output: output.into(),
        }
    }
}
