//! Prompt rendering.

use crate::defaults::BUILTIN_IDS;
use crate::loader::load_prompt;
use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use policypro_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;
use std::path::Path;

/// Render a definition with the given variables.
///
/// Every variable the definition declares must be present; extra variables
/// are ignored.
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let missing: Vec<&str> = definition
        .variables
        .iter()
        .filter(|name| !variables.contains_key(name.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Prompt(format!(
            "Prompt {} is missing variables: {}",
            definition.id,
            missing.join(", ")
        )));
    }

    let text = render_template(&definition.template, &variables)?;

    Ok(BuiltPrompt {
        text,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            expects_json: definition.output.format == "json",
            resolved_variables: variables,
        },
    })
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", &variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

/// All prompts the assistant uses, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    definitions: HashMap<String, PromptDefinition>,
}

impl PromptLibrary {
    /// Built-in definitions only.
    pub fn builtin() -> Self {
        let definitions = BUILTIN_IDS
            .iter()
            .filter_map(|id| crate::defaults::builtin(id))
            .map(|def| (def.id.clone(), def))
            .collect();
        Self { definitions }
    }

    /// Resolve every prompt for `workspace_path`, failing on a bad override.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        let mut definitions = HashMap::new();
        for id in BUILTIN_IDS {
            let (definition, origin) = load_prompt(workspace_path, id)?;
            tracing::debug!(prompt = id, ?origin, "Resolved prompt");
            definitions.insert(id.to_string(), definition);
        }
        Ok(Self { definitions })
    }

    pub fn get(&self, id: &str) -> AppResult<&PromptDefinition> {
        self.definitions
            .get(id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", id)))
    }

    /// Render `id` with `(name, value)` pairs.
    pub fn render(&self, id: &str, variables: &[(&str, &str)]) -> AppResult<String> {
        let vars = variables
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(build_prompt(self.get(id)?, vars)?.text)
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{builtin, AGENT_SYSTEM, MEMORY_SUMMARIZE};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_render_simple_template() {
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), "¿Qué cubre?".to_string());

        let result = render_template("Pregunta: {{query}}", &vars).unwrap();
        assert_eq!(result, "Pregunta: ¿Qué cubre?");
    }

    #[test]
    fn test_no_html_escaping() {
        let mut vars = HashMap::new();
        vars.insert("new_lines".to_string(), "user: <a> & \"b\"".to_string());
        let result = render_template("{{new_lines}}", &vars).unwrap();
        assert_eq!(result, "user: <a> & \"b\"");
    }

    #[test]
    fn test_build_prompt_requires_declared_variables() {
        let def = builtin(MEMORY_SUMMARIZE).unwrap();
        let mut vars = HashMap::new();
        vars.insert("summary".to_string(), String::new());

        match build_prompt(&def, vars) {
            Err(AppError::Prompt(msg)) => assert!(msg.contains("new_lines")),
            other => panic!("Expected prompt error, got {:?}", other),
        }
    }

    #[test]
    fn test_library_renders_system_prompt() {
        let library = PromptLibrary::builtin();
        let text = library
            .render(
                AGENT_SYSTEM,
                &[
                    ("document_description", "Colección de pólizas de seguros"),
                    ("retriever_tool", "retriever"),
                    ("web_search_tool", "google_search"),
                    ("web_search_triggers", "\"busca en internet\", \"search the web\""),
                ],
            )
            .unwrap();

        assert!(text.contains("\"google_search\""));
        assert!(text.contains("Colección de pólizas de seguros"));
        assert!(text.contains("\"busca en internet\", \"search the web\""));
        assert!(!text.contains("{{"));
    }

    #[test]
    fn test_library_load_uses_override() {
        let temp_dir = TempDir::new().unwrap();
        let prompts = temp_dir.path().join(".policypro/prompts");
        fs::create_dir_all(&prompts).unwrap();
        fs::write(
            prompts.join("memory.summarize.yml"),
            r#"
id: memory.summarize
title: Resumen
apiVersion: "1.0"
variables: [summary, new_lines]
template: "S={{summary}} N={{new_lines}}"
"#,
        )
        .unwrap();

        let library = PromptLibrary::load(temp_dir.path()).unwrap();
        let text = library
            .render(MEMORY_SUMMARIZE, &[("summary", "a"), ("new_lines", "b")])
            .unwrap();
        assert_eq!(text, "S=a N=b");
        assert!(library.get(AGENT_SYSTEM).is_ok());
    }
}
