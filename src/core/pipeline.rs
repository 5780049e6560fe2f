use crate::core::catalog::{analyze_table, generate_file_id, Catalog, CatalogEntry};
use crate::core::operations;
use crate::core::prompts::{self, ENHANCE_OPTIONS, NARRATIVE_OPTIONS};
use crate::core::table::DataTable;
use crate::core::vector_store::{SearchFilter, VectorStoreManager};
use crate::domain::intent::{supported_intents, ActionIntent, ExplainRowParams};
use crate::domain::model::{AgentStatus, Computation, FileMetadata, FileSummary, VectorMetadata};
use crate::domain::ports::{ConfigProvider, EmbeddingTask, LanguageModel, Pipeline, RawIntent, Storage};
use crate::utils::error::{AgentError, Result};
use crate::utils::validation::{validate_csv_path, validate_file_id};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::path::Path;

pub const INPUT_DIR: &str = "input";
const META_SUFFIX: &str = ".meta.json";
const MAX_ROW_TEXT_CHARS: usize = 500;

fn table_path(file_id: &str) -> String {
    format!("{}/{}.csv", INPUT_DIR, file_id)
}

fn metadata_path(file_id: &str) -> String {
    format!("{}/{}{}", INPUT_DIR, file_id, META_SUFFIX)
}

/// 資料表目錄、向量庫與語言模型的組合
pub struct TablePipeline<S: Storage, M: LanguageModel, C: ConfigProvider> {
    storage: S,
    model: M,
    config: C,
    catalog: Catalog,
    vectors: VectorStoreManager,
}

impl<S: Storage, M: LanguageModel, C: ConfigProvider> TablePipeline<S, M, C> {
    /// 建立管道並載回先前匯入的資料表與向量庫
    pub async fn open(storage: S, model: M, config: C) -> Result<Self> {
        let mut pipeline = Self {
            storage,
            model,
            config,
            catalog: Catalog::new(),
            vectors: VectorStoreManager::new(),
        };
        pipeline.restore().await?;
        Ok(pipeline)
    }

    async fn restore(&mut self) -> Result<()> {
        for name in self.storage.list_files(INPUT_DIR).await? {
            let Some(file_id) = name.strip_suffix(META_SUFFIX) else {
                continue;
            };
            match self.load_entry(file_id).await {
                Ok(entry) => self.catalog.insert(entry),
                Err(e) => tracing::warn!("⚠️ Skipping stored table {}: {}", file_id, e),
            }
        }
        self.catalog.sort_by_ingestion();

        let stores = self.vectors.load_all(&self.storage).await?;
        tracing::debug!(
            "Restored {} tables and {} vector stores",
            self.catalog.len(),
            stores
        );
        Ok(())
    }

    async fn load_entry(&self, file_id: &str) -> Result<CatalogEntry> {
        let meta_bytes = self.storage.read_file(&metadata_path(file_id)).await?;
        let metadata: FileMetadata = serde_json::from_slice(&meta_bytes)?;
        let csv_bytes = self.storage.read_file(&table_path(file_id)).await?;
        let table = DataTable::from_csv_bytes(&csv_bytes)?;
        Ok(CatalogEntry { metadata, table })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn list_files(&self) -> Vec<FileSummary> {
        self.catalog.list_files()
    }

    pub async fn ingest_csv(
        &mut self,
        path: &Path,
        file_id: Option<&str>,
        vectorize: bool,
    ) -> Result<FileMetadata> {
        validate_csv_path(path)?;
        if let Some(id) = file_id {
            validate_file_id(id)?;
        }

        let display = path.to_string_lossy().to_string();

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&display)
            .to_string();

        tracing::info!("📥 Loading CSV: {}", filename);
        let bytes = tokio::fs::read(path).await?;
        let table = DataTable::from_csv_bytes(&bytes)?;

        let now = Utc::now();
        let file_id = match file_id {
            Some(id) => id.to_string(),
            None => generate_file_id(&filename, now),
        };
        let mut metadata = analyze_table(&table, &file_id, &filename, now);
        // 重新匯入沿用最初的匯入時間
        if let Ok(existing) = self.catalog.get(&file_id) {
            tracing::info!("♻️ Replacing previously ingested {}", file_id);
            metadata.ingestion_timestamp = existing.metadata.ingestion_timestamp.clone();
        }
        tracing::info!(
            "  Loaded {} rows and {} columns",
            metadata.num_rows,
            metadata.num_columns
        );

        self.storage.write_file(&table_path(&file_id), &bytes).await?;
        self.storage
            .write_file(
                &metadata_path(&file_id),
                &serde_json::to_vec_pretty(&metadata)?,
            )
            .await?;

        self.catalog.insert(CatalogEntry {
            metadata: metadata.clone(),
            table,
        });

        if vectorize {
            self.vectorize(&file_id).await?;
        }

        tracing::info!("✅ Successfully ingested {} as {}", filename, file_id);
        Ok(metadata)
    }

    /// 每列一個向量，每欄一個摘要向量
    async fn vectorize(&mut self, file_id: &str) -> Result<()> {
        let entry = self.catalog.get(file_id)?;
        let table = &entry.table;

        let mut texts = Vec::with_capacity(table.num_rows() + table.num_columns());
        let mut metadata = Vec::with_capacity(texts.capacity());

        for idx in 0..table.num_rows() {
            let text = table.row_text(idx);
            metadata.push(VectorMetadata {
                file_id: file_id.to_string(),
                row_idx: idx as i64,
                column_name: None,
                is_row_vector: true,
                original_text: prompts::truncate(&text, MAX_ROW_TEXT_CHARS),
            });
            texts.push(text);
        }
        for (col, name) in table.columns().iter().enumerate() {
            let summary = table.column_summary(col);
            metadata.push(VectorMetadata {
                file_id: file_id.to_string(),
                row_idx: -1,
                column_name: Some(name.clone()),
                is_row_vector: false,
                original_text: summary.clone(),
            });
            texts.push(summary);
        }

        tracing::info!("🧮 Generating embeddings for {} texts...", texts.len());
        let embeddings = self
            .model
            .embed_batch(&texts, EmbeddingTask::RetrievalDocument)
            .await?;

        let dimension = self.config.vector_dimension();
        let store = self.vectors.create_store(file_id, dimension);
        store.add_vectors(embeddings, metadata)?;
        tracing::info!("  Added {} vectors to the index", store.size());

        self.vectors.save_store(&self.storage, file_id).await
    }

    async fn explain_row(&self, params: &ExplainRowParams) -> Result<Computation> {
        let entry = self.catalog.resolve(params.file_id.as_deref())?;
        let file_id = entry.metadata.file_id.as_str();

        let store = self
            .vectors
            .get_store(file_id)
            .ok_or_else(|| AgentError::VectorStoreError {
                message: format!("No vector store for {}", file_id),
            })?;

        let query = self
            .model
            .embed(&params.query, EmbeddingTask::RetrievalQuery)
            .await?;
        let filter = SearchFilter {
            file_id: Some(file_id),
            rows_only: true,
        };
        let hits = store.search(&query, params.top_k, &filter)?;

        let mut result_table = Vec::with_capacity(hits.len());
        let mut row_indices = Vec::with_capacity(hits.len());
        let mut scores = Vec::with_capacity(hits.len());
        for (meta, distance) in hits {
            let Ok(idx) = usize::try_from(meta.row_idx) else {
                continue;
            };
            if idx >= entry.table.num_rows() {
                tracing::warn!("⚠️ Vector for row {} is stale in {}", idx, file_id);
                continue;
            }
            let similarity = f64::from(1.0 - distance);
            let mut record = entry.table.row_record(idx);
            record.insert("_row_index", idx);
            record.insert("_similarity_score", similarity);
            result_table.push(record);
            row_indices.push(Value::from(idx));
            scores.push(Value::from(similarity));
        }

        let mut numbers = Map::new();
        numbers.insert("query".to_string(), Value::from(params.query.clone()));
        numbers.insert("top_k".to_string(), Value::from(params.top_k));
        numbers.insert("row_indices".to_string(), Value::Array(row_indices));
        numbers.insert("similarity_scores".to_string(), Value::Array(scores));
        numbers.insert("file_id".to_string(), Value::from(file_id));

        Ok(Computation {
            result_table,
            numbers,
        })
    }
}

#[async_trait]
impl<S: Storage, M: LanguageModel, C: ConfigProvider> Pipeline for TablePipeline<S, M, C> {
    fn has_data(&self) -> bool {
        !self.catalog.is_empty()
    }

    async fn enhance(&self, query: &str) -> Result<String> {
        let enhanced = self
            .model
            .generate(&prompts::enhance_prompt(query), ENHANCE_OPTIONS)
            .await?;
        let enhanced = enhanced.trim().trim_matches('"').trim();
        if enhanced.is_empty() {
            return Ok(query.to_string());
        }
        tracing::info!("✨ Enhanced query: {}", enhanced);
        Ok(enhanced.to_string())
    }

    async fn interpret(&self, query: &str) -> Result<RawIntent> {
        let files: Vec<FileMetadata> = self.catalog.metadata().cloned().collect();
        let prompt = prompts::intent_prompt(&files, query);
        let reply = self
            .model
            .generate(&prompt, self.config.intent_options())
            .await?;
        let raw = prompts::parse_intent_reply(&reply)?;
        tracing::info!("🎯 Parsed intent: {}", raw.intent);
        tracing::debug!("Parameters: {}", raw.parameters);
        Ok(raw)
    }

    async fn execute(&self, intent: &ActionIntent) -> Result<Computation> {
        match intent {
            ActionIntent::CompareAverages(p) => operations::compare_averages(&self.catalog, p),
            ActionIntent::FilterThreshold(p) => {
                operations::filter_threshold(&self.catalog, p, self.config.max_rows_display())
            }
            ActionIntent::Sort(p) => operations::sort(&self.catalog, p),
            ActionIntent::TopN(p) => operations::top_n(&self.catalog, p),
            ActionIntent::CompareTop(p) => operations::compare_top(&self.catalog, p),
            ActionIntent::ExplainRow(p) => self.explain_row(p).await,
        }
    }

    async fn narrate(
        &self,
        intent: &ActionIntent,
        parameters: &Value,
        computation: &Computation,
    ) -> Result<String> {
        let prompt = prompts::narrative_prompt(
            intent.name(),
            parameters,
            &computation.numbers,
            &computation.result_table,
        );
        self.model.generate(&prompt, NARRATIVE_OPTIONS).await
    }

    async fn status(&self) -> Result<AgentStatus> {
        Ok(AgentStatus {
            status: "ready".to_string(),
            loaded_files: self.catalog.len(),
            files: self.catalog.list_files(),
            vector_stores: self.vectors.list_stores(&self.storage).await?,
            supported_intents: supported_intents(),
        })
    }
}
