//! Ask command handler.
//!
//! Runs a single turn against a fresh conversation.

use clap::Args;
use policypro_agent::Session;
use policypro_core::{config::AppConfig, AppError, AppResult};

/// Answer a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,

    /// Output as JSON, including the tools used
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub fn question_text(&self) -> String {
        self.question.join(" ").trim().to_string()
    }

    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let question = self.question_text();
        if question.is_empty() {
            return Err(AppError::Config("No question provided".to_string()));
        }

        let mut session = Session::from_config(config).await?;
        let answer = session.query(&question).await?;

        if self.json {
            let output = serde_json::json!({
                "question": question,
                "answer": answer,
                "model": config.llm.model,
                "tools": session.last_invocations(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", answer);
        }

        Ok(())
    }
}
