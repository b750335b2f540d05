//! Command handlers for the Policy Pro CLI.

pub mod ask;
pub mod chat;
pub mod prompts;
pub mod stats;

pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use prompts::PromptsCommand;
pub use stats::StatsCommand;
