//! Answer orchestration for Policy Pro.
//!
//! Decides per turn between the policy documents and an explicitly
//! requested web search, keeps the conversation within its token ceiling,
//! and exposes the whole loop as a [`Session`].

pub mod capability;
pub mod memory;
pub mod orchestrator;
pub mod policy;
pub mod session;
pub mod web_search;

#[cfg(test)]
mod testing;

pub use capability::{Capability, CapabilityRequest, ToolInvocationRecord};
pub use memory::{
    ConversationMemory, ConversationState, LlmSummarizer, Summarizer, TiktokenCounter,
    TokenCounter, MESSAGE_OVERHEAD,
};
pub use orchestrator::{AnswerOrchestrator, TurnOutcome, DONT_KNOW_REPLY};
pub use policy::{requests_web_search, strip_trigger, PrimarySource, TurnPolicy, WEB_SEARCH_TRIGGERS};
pub use session::Session;
pub use web_search::{GoogleSearchClient, WebSearch};
