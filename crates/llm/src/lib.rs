//! Completion service integration for Policy Pro.
//!
//! A provider-agnostic [`LlmClient`] trait plus the OpenAI chat completions
//! provider, including tool (function) calling.
//!
//! # Example
//! ```no_run
//! use policypro_llm::{ChatMessage, LlmClient, LlmRequest, providers::OpenAiClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenAiClient::new("sk-...")?;
//! let request = LlmRequest::new("gpt-3.5-turbo", vec![ChatMessage::user("Hola")])
//!     .with_temperature(0.0);
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

pub use client::{LlmClient, LlmRequest, LlmResponse};
pub use factory::{client_from_config, create_client};
pub use providers::OpenAiClient;
pub use types::{ChatMessage, LlmUsage, Role, ToolCall, ToolDefinition};
