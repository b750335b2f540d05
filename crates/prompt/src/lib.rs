//! Prompt system for Policy Pro.
//!
//! - Built-in Spanish prompt definitions
//! - YAML overrides under `.policypro/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

pub use builder::{build_prompt, PromptLibrary};
pub use defaults::{AGENT_SYSTEM, BUILTIN_IDS, MEMORY_SUMMARIZE, RETRIEVAL_SELF_QUERY};
pub use loader::{list_prompts, load_prompt, validate_prompt};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, PromptBehavior, PromptDefinition, PromptOrigin,
    PromptOutputSpec,
};
