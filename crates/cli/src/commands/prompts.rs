//! Prompts command handler.
//!
//! Shows which prompt definitions the assistant will use and whether each
//! comes from the built-in set or from a workspace override.

use clap::Args;
use policypro_core::{config::AppConfig, AppResult};
use policypro_prompt::{list_prompts, load_prompt, PromptOrigin, BUILTIN_IDS};
use serde::Serialize;
use std::path::Path;

/// List prompt definitions and their origin
#[derive(Args, Debug)]
pub struct PromptsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptEntry {
    id: String,
    title: String,
    origin: PromptOrigin,
}

/// Resolve every built-in id against the workspace, plus the ids of any
/// override files that no built-in prompt uses.
fn resolve_entries(workspace: &Path) -> AppResult<(Vec<PromptEntry>, Vec<String>)> {
    let mut entries = Vec::with_capacity(BUILTIN_IDS.len());
    for id in BUILTIN_IDS {
        let (definition, origin) = load_prompt(workspace, id)?;
        entries.push(PromptEntry {
            id: id.to_string(),
            title: definition.title,
            origin,
        });
    }

    let unused = list_prompts(workspace)?
        .into_iter()
        .filter(|id| !BUILTIN_IDS.contains(&id.as_str()))
        .collect();

    Ok((entries, unused))
}

impl PromptsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing prompts command");

        let (entries, unused) = resolve_entries(&config.workspace)?;

        if self.json {
            let output = serde_json::json!({
                "prompts": entries,
                "unusedOverrides": unused,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            for entry in &entries {
                let origin = match entry.origin {
                    PromptOrigin::Builtin => "builtin",
                    PromptOrigin::Workspace => "workspace",
                };
                println!("{:<22} {:<10} {}", entry.id, origin, entry.title);
            }
            for id in &unused {
                println!("{:<22} {:<10} (not used by any prompt)", id, "ignored");
            }
        }

        Ok(())
    }
}
