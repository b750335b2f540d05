//! Stats command handler.
//!
//! Reports what the configured document index contains.

use clap::Args;
use policypro_core::{config::AppConfig, AppResult};
use policypro_knowledge::{open_index, VectorIndex};

/// Show document index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let index = open_index(config).await?;
        let fragments = index.count().await?;
        let path = config.index_path().unwrap_or_default();

        if self.json {
            let output = serde_json::json!({
                "indexPath": path,
                "table": config.retrieval.table_name,
                "fragments": fragments,
                "embeddingModel": config.llm.embedding_model,
                "dimensions": config.llm.embedding_dimensions,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Index:      {}", path.display());
            println!("Table:      {}", config.retrieval.table_name);
            println!("Fragments:  {}", fragments);
            println!(
                "Embeddings: {} ({} dimensions)",
                config.llm.embedding_model, config.llm.embedding_dimensions
            );
        }

        Ok(())
    }
}
