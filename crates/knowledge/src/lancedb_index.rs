//! LanceDB-backed vector index.
//!
//! The index is populated offline; at runtime it is only opened and queried.
//! Expected table layout:
//!
//! | column   | type                         |
//! |----------|------------------------------|
//! | `id`     | Utf8                         |
//! | `text`   | Utf8                         |
//! | `source` | Utf8                         |
//! | `page`   | Int64 (Int32 accepted)       |
//! | `title`  | Utf8, nullable               |
//! | `vector` | FixedSizeList<Float32, dim>  |

use crate::types::{filter_to_sql, DocumentFragment, Predicate, ScoredFragment};
use crate::vector_index::{cosine_similarity, rank, VectorIndex};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;
use policypro_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Columns every fragments table must carry.
pub const REQUIRED_COLUMNS: [&str; 6] = ["id", "text", "source", "page", "title", "vector"];

const VECTOR_COLUMN: &str = "vector";

/// LanceDB-backed index of policy fragments.
pub struct LanceDbIndex {
    table: Table,
    embedding_dim: usize,
    path: PathBuf,
}

impl LanceDbIndex {
    /// Open an existing index.
    ///
    /// # Errors
    /// `IndexUnavailable` when the directory or table is missing or the table
    /// lacks a required column; `Config` when the stored vectors do not have
    /// `embedding_dim` dimensions.
    pub async fn open(db_path: &Path, table_name: &str, embedding_dim: usize) -> AppResult<Self> {
        if !db_path.is_dir() {
            return Err(AppError::IndexUnavailable(format!(
                "No vector index found at {:?}",
                db_path
            )));
        }

        let uri = db_path.to_string_lossy().to_string();
        let conn = lancedb::connect(&uri).execute().await.map_err(|e| {
            AppError::IndexUnavailable(format!("Failed to connect to LanceDB at {:?}: {}", db_path, e))
        })?;

        let table_names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to list tables: {}", e)))?;

        if !table_names.iter().any(|name| name == table_name) {
            return Err(AppError::IndexUnavailable(format!(
                "Table '{}' not found in {:?}",
                table_name, db_path
            )));
        }

        let table = conn.open_table(table_name).execute().await.map_err(|e| {
            AppError::IndexUnavailable(format!("Failed to open table '{}': {}", table_name, e))
        })?;

        let schema = table
            .schema()
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to read schema: {}", e)))?;
        validate_schema(&schema, embedding_dim)?;

        tracing::info!("Opened LanceDB index at {:?} (table '{}')", db_path, table_name);

        Ok(Self {
            table,
            embedding_dim,
            path: db_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn validate_schema(schema: &Schema, embedding_dim: usize) -> AppResult<()> {
    for column in REQUIRED_COLUMNS {
        if schema.field_with_name(column).is_err() {
            return Err(AppError::IndexUnavailable(format!(
                "Index table is missing column '{}'",
                column
            )));
        }
    }

    match schema.field_with_name(VECTOR_COLUMN).map(|f| f.data_type()) {
        Ok(DataType::FixedSizeList(_, size)) if *size as usize == embedding_dim => Ok(()),
        Ok(DataType::FixedSizeList(_, size)) => Err(AppError::Config(format!(
            "Index vectors have {} dimensions but the embedding model produces {}",
            size, embedding_dim
        ))),
        _ => Err(AppError::IndexUnavailable(
            "Index column 'vector' is not a fixed-size list".to_string(),
        )),
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::Upstream(format!("Invalid '{}' column in index result", name)))
}

fn page_value(batch: &RecordBatch, row_idx: usize) -> AppResult<i64> {
    let column = batch
        .column_by_name("page")
        .ok_or_else(|| AppError::Upstream("Missing 'page' column in index result".to_string()))?;

    if let Some(pages) = column.as_any().downcast_ref::<Int64Array>() {
        return Ok(pages.value(row_idx));
    }
    if let Some(pages) = column.as_any().downcast_ref::<Int32Array>() {
        return Ok(pages.value(row_idx) as i64);
    }
    Err(AppError::Upstream("Invalid 'page' column in index result".to_string()))
}

fn vector_value(batch: &RecordBatch, row_idx: usize) -> AppResult<Vec<f32>> {
    let list = batch
        .column_by_name(VECTOR_COLUMN)
        .and_then(|col| col.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| AppError::Upstream("Invalid 'vector' column in index result".to_string()))?;

    let values_ref = list.value(row_idx);
    let values = values_ref
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| AppError::Upstream("Invalid vector values in index result".to_string()))?;

    Ok(values.values().to_vec())
}

/// Convert one result row to a fragment plus its stored vector.
fn row_to_fragment(batch: &RecordBatch, row_idx: usize) -> AppResult<(DocumentFragment, Vec<f32>)> {
    let titles = string_column(batch, "title")?;
    let fragment = DocumentFragment {
        id: string_column(batch, "id")?.value(row_idx).to_string(),
        text: string_column(batch, "text")?.value(row_idx).to_string(),
        source: string_column(batch, "source")?.value(row_idx).to_string(),
        page: page_value(batch, row_idx)?,
        title: if titles.is_null(row_idx) {
            String::new()
        } else {
            titles.value(row_idx).to_string()
        },
    };
    Ok((fragment, vector_value(batch, row_idx)?))
}

#[async_trait::async_trait]
impl VectorIndex for LanceDbIndex {
    async fn search(
        &self,
        query_embedding: &[f32],
        filter: &[Predicate],
        top_k: usize,
    ) -> AppResult<Vec<ScoredFragment>> {
        if query_embedding.len() != self.embedding_dim {
            return Err(AppError::Upstream(format!(
                "Query embedding dimension mismatch: expected {}, got {}",
                self.embedding_dim,
                query_embedding.len()
            )));
        }

        let mut query = self
            .table
            .query()
            .nearest_to(query_embedding.to_vec())
            .map_err(|e| AppError::Upstream(format!("Failed to create query: {}", e)))?
            .limit(top_k);

        if let Some(predicate) = filter_to_sql(filter) {
            tracing::debug!("Applying metadata filter: {}", predicate);
            query = query.only_if(predicate);
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to execute search: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to collect results: {}", e)))?;

        let mut results = Vec::new();
        for batch in &batches {
            for row_idx in 0..batch.num_rows() {
                let (fragment, vector) = match row_to_fragment(batch, row_idx) {
                    Ok(row) => row,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable index row {}: {}", row_idx, e);
                        continue;
                    }
                };
                let score = cosine_similarity(query_embedding, &vector);
                results.push(ScoredFragment { fragment, score });
            }
        }

        tracing::debug!(
            "Retrieved {} fragments (requested top-{})",
            results.len(),
            top_k
        );

        Ok(rank(results, top_k))
    }

    async fn count(&self) -> AppResult<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to count rows: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterValue;
    use arrow_array::RecordBatchIterator;
    use arrow_schema::Field;
    use std::sync::Arc;
    use tempfile::TempDir;

    const DIM: usize = 3;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("page", DataType::Int64, false),
            Field::new("title", DataType::Utf8, true),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    DIM as i32,
                ),
                false,
            ),
        ]))
    }

    fn batch(rows: &[(&str, &str, &str, i64, [f32; DIM])]) -> RecordBatch {
        let values: Vec<f32> = rows.iter().flat_map(|r| r.4).collect();
        let vectors = FixedSizeListArray::new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            DIM as i32,
            Arc::new(Float32Array::from(values)),
            None,
        );

        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(StringArray::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
                Arc::new(StringArray::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
                Arc::new(StringArray::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
                Arc::new(Int64Array::from(rows.iter().map(|r| r.3).collect::<Vec<_>>())),
                Arc::new(StringArray::from(vec![Some("Seguro de hogar"); rows.len()])),
                Arc::new(vectors),
            ],
        )
        .unwrap()
    }

    async fn seeded_index(dir: &Path) {
        let conn = lancedb::connect(&dir.to_string_lossy()).execute().await.unwrap();
        let data = batch(&[
            ("1", "Cubre incendio y robo", "POL1.pdf", 1, [1.0, 0.0, 0.0]),
            ("2", "Exclusiones por inundación", "POL1.pdf", 2, [0.9, 0.1, 0.0]),
            ("3", "Cobertura dental básica", "POL2.pdf", 1, [0.0, 1.0, 0.0]),
        ]);
        conn.create_table("fragments", RecordBatchIterator::new(vec![Ok(data)], schema()))
            .execute()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let result = LanceDbIndex::open(&temp.path().join("nope"), "fragments", DIM).await;
        assert!(matches!(result, Err(AppError::IndexUnavailable(_))));
    }

    #[tokio::test]
    async fn test_missing_table_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let result = LanceDbIndex::open(temp.path(), "fragments", DIM).await;
        assert!(matches!(result, Err(AppError::IndexUnavailable(_))));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_config_error() {
        let temp = TempDir::new().unwrap();
        seeded_index(temp.path()).await;
        let result = LanceDbIndex::open(temp.path(), "fragments", 1536).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let temp = TempDir::new().unwrap();
        seeded_index(temp.path()).await;
        let index = LanceDbIndex::open(temp.path(), "fragments", DIM).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 3);

        let unfiltered = index.search(&[1.0, 0.0, 0.0], &[], 2).await.unwrap();
        assert_eq!(unfiltered.len(), 2);
        assert_eq!(unfiltered[0].fragment.id, "1");
        assert!(unfiltered[0].score >= unfiltered[1].score);

        let filter = vec![Predicate::eq("source", FilterValue::Text("POL2.pdf".into()))];
        let filtered = index.search(&[1.0, 0.0, 0.0], &filter, 4).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].fragment.source, "POL2.pdf");
        assert_eq!(filtered[0].fragment.title, "Seguro de hogar");
    }

    #[tokio::test]
    async fn test_query_dimension_is_checked() {
        let temp = TempDir::new().unwrap();
        seeded_index(temp.path()).await;
        let index = LanceDbIndex::open(temp.path(), "fragments", DIM).await.unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0], &[], 4).await,
            Err(AppError::Upstream(_))
        ));
    }
}
