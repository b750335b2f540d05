//! Prompt loader: workspace overrides first, built-in definitions second.

use crate::defaults;
use crate::types::{PromptDefinition, PromptOrigin};
use policypro_core::config::STATE_DIR;
use policypro_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

/// Load a prompt definition by ID.
///
/// `.policypro/prompts/<id>.yml` in the workspace takes precedence over the
/// built-in definition of the same id. An override that fails to parse or
/// validate is an error, never silently ignored.
///
/// # Example
/// ```no_run
/// use policypro_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (prompt, _origin) = load_prompt(Path::new("."), "agent.system")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(
    workspace_path: &Path,
    prompt_id: &str,
) -> AppResult<(PromptDefinition, PromptOrigin)> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);
        let definition = read_definition(&prompt_file)?;

        if definition.id != prompt_id {
            return Err(AppError::Prompt(format!(
                "Prompt file {:?} declares id '{}', expected '{}'",
                prompt_file, definition.id, prompt_id
            )));
        }

        tracing::info!("Using workspace prompt: {} ({})", definition.id, definition.title);
        return Ok((definition, PromptOrigin::Workspace));
    }

    defaults::builtin(prompt_id)
        .map(|definition| (definition, PromptOrigin::Builtin))
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))
}

fn read_definition(prompt_file: &Path) -> AppResult<PromptDefinition> {
    let contents = std::fs::read_to_string(prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// List the prompt overrides present in the workspace.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(workspace_path);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompt_ids.push(stem.to_string());
            }
        }
    }

    prompt_ids.sort();
    Ok(prompt_ids)
}

/// Validate a prompt definition.
pub fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if !matches!(def.output.format.as_str(), "text" | "json") {
        return Err(AppError::Prompt(format!(
            "Unsupported output format '{}' in prompt {}",
            def.output.format, def.id
        )));
    }

    handlebars::Template::compile(&def.template).map_err(|e| {
        AppError::Prompt(format!("Invalid template in prompt {}: {}", def.id, e))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_override(dir: &Path, id: &str, content: &str) {
        let prompts = prompts_dir(dir);
        fs::create_dir_all(&prompts).unwrap();
        fs::write(prompts.join(format!("{}.yml", id)), content).unwrap();
    }

    fn valid_yaml(id: &str) -> String {
        format!(
            r#"
id: {}
title: "Resumen corto"
apiVersion: "1.1"
variables: [summary, new_lines]
template: "Resumen: {{{{summary}}}} / {{{{new_lines}}}}"
"#,
            id
        )
    }

    #[test]
    fn test_builtin_used_without_override() {
        let temp_dir = TempDir::new().unwrap();
        let (prompt, origin) = load_prompt(temp_dir.path(), defaults::AGENT_SYSTEM).unwrap();
        assert_eq!(origin, PromptOrigin::Builtin);
        assert_eq!(prompt.id, defaults::AGENT_SYSTEM);
    }

    #[test]
    fn test_workspace_override_wins() {
        let temp_dir = TempDir::new().unwrap();
        write_override(
            temp_dir.path(),
            defaults::MEMORY_SUMMARIZE,
            &valid_yaml(defaults::MEMORY_SUMMARIZE),
        );

        let (prompt, origin) = load_prompt(temp_dir.path(), defaults::MEMORY_SUMMARIZE).unwrap();
        assert_eq!(origin, PromptOrigin::Workspace);
        assert_eq!(prompt.title, "Resumen corto");
    }

    #[test]
    fn test_override_with_mismatched_id() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), defaults::MEMORY_SUMMARIZE, &valid_yaml("other.id"));
        assert!(load_prompt(temp_dir.path(), defaults::MEMORY_SUMMARIZE).is_err());
    }

    #[test]
    fn test_invalid_override_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), defaults::AGENT_SYSTEM, "invalid: yaml: content:");
        assert!(matches!(
            load_prompt(temp_dir.path(), defaults::AGENT_SYSTEM),
            Err(AppError::Prompt(_))
        ));
    }

    #[test]
    fn test_unknown_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_validate_rejects_broken_template() {
        let mut def = defaults::builtin(defaults::AGENT_SYSTEM).unwrap();
        def.template = "{{#if x}}sin cerrar".to_string();
        assert!(validate_prompt(&def).is_err());
    }

    #[test]
    fn test_list_prompts() {
        let temp_dir = TempDir::new().unwrap();
        assert!(list_prompts(temp_dir.path()).unwrap().is_empty());

        write_override(temp_dir.path(), "b.prompt", &valid_yaml("b.prompt"));
        write_override(temp_dir.path(), "a.prompt", &valid_yaml("a.prompt"));

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts, vec!["a.prompt".to_string(), "b.prompt".to_string()]);
    }
}
