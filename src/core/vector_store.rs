use crate::domain::model::VectorMetadata;
use crate::domain::ports::Storage;
use crate::utils::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const VECTOR_DIR: &str = "vectors";

pub fn store_path(file_id: &str) -> String {
    format!("{}/{}.json", VECTOR_DIR, file_id)
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilter<'a> {
    pub file_id: Option<&'a str>,
    pub rows_only: bool,
}

impl SearchFilter<'_> {
    fn accepts(&self, meta: &VectorMetadata) -> bool {
        if self.rows_only && !meta.is_row_vector {
            return false;
        }
        self.file_id.map_or(true, |id| meta.file_id == id)
    }
}

/// 扁平精確索引：向量正規化後以平方 L2 距離排序
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStore {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<VectorMetadata>,
}

impl VectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn size(&self) -> usize {
        self.vectors.len()
    }

    pub fn add_vectors(
        &mut self,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<VectorMetadata>,
    ) -> Result<()> {
        if vectors.len() != metadata.len() {
            return Err(AgentError::VectorStoreError {
                message: format!(
                    "Number of vectors ({}) must match metadata length ({})",
                    vectors.len(),
                    metadata.len()
                ),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(AgentError::VectorStoreError {
                message: format!(
                    "Vector dimension {} doesn't match {}",
                    bad.len(),
                    self.dimension
                ),
            });
        }

        for mut vector in vectors {
            normalize(&mut vector);
            self.vectors.push(vector);
        }
        self.metadata.extend(metadata);
        Ok(())
    }

    /// 回傳 (metadata, 距離)，距離由小到大
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter<'_>,
    ) -> Result<Vec<(VectorMetadata, f32)>> {
        if query.len() != self.dimension {
            return Err(AgentError::VectorStoreError {
                message: format!(
                    "Query dimension {} doesn't match {}",
                    query.len(),
                    self.dimension
                ),
            });
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx, squared_l2(&query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .filter(|(idx, _)| filter.accepts(&self.metadata[*idx]))
            .take(k)
            .map(|(idx, dist)| (self.metadata[idx].clone(), dist))
            .collect())
    }

    pub async fn save<S: Storage>(&self, storage: &S, file_id: &str) -> Result<()> {
        let data = serde_json::to_vec(self)?;
        storage.write_file(&store_path(file_id), &data).await
    }

    pub async fn load<S: Storage>(storage: &S, file_id: &str) -> Result<Self> {
        let data = storage.read_file(&store_path(file_id)).await?;
        let store: VectorStore = serde_json::from_slice(&data)?;
        if store.vectors.len() != store.metadata.len() {
            return Err(AgentError::VectorStoreError {
                message: format!("Vector store for {} is inconsistent", file_id),
            });
        }
        Ok(store)
    }
}

#[derive(Debug, Default)]
pub struct VectorStoreManager {
    stores: BTreeMap<String, VectorStore>,
}

impl VectorStoreManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_store(&mut self, file_id: &str, dimension: usize) -> &mut VectorStore {
        let store = self
            .stores
            .entry(file_id.to_string())
            .or_insert_with(|| VectorStore::new(dimension));
        *store = VectorStore::new(dimension);
        store
    }

    pub fn get_store(&self, file_id: &str) -> Option<&VectorStore> {
        self.stores.get(file_id)
    }

    pub async fn save_store<S: Storage>(&self, storage: &S, file_id: &str) -> Result<()> {
        match self.stores.get(file_id) {
            Some(store) => store.save(storage, file_id).await,
            None => Err(AgentError::VectorStoreError {
                message: format!("Vector store for {} not found", file_id),
            }),
        }
    }

    /// 載入儲存空間裡所有向量庫，壞掉的檔案只記錄警告
    pub async fn load_all<S: Storage>(&mut self, storage: &S) -> Result<usize> {
        let mut loaded = 0;
        for name in storage.list_files(VECTOR_DIR).await? {
            let Some(file_id) = name.strip_suffix(".json") else {
                continue;
            };
            match VectorStore::load(storage, file_id).await {
                Ok(store) => {
                    self.stores.insert(file_id.to_string(), store);
                    loaded += 1;
                }
                Err(e) => tracing::warn!("⚠️ Skipping vector store {}: {}", file_id, e),
            }
        }
        Ok(loaded)
    }

    /// 記憶體中與磁碟上的向量庫
    pub async fn list_stores<S: Storage>(&self, storage: &S) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.stores.keys().cloned().collect();
        for name in storage.list_files(VECTOR_DIR).await? {
            if let Some(id) = name.strip_suffix(".json") {
                if !ids.iter().any(|existing| existing == id) {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(file_id: &str, row_idx: i64) -> VectorMetadata {
        VectorMetadata {
            file_id: file_id.to_string(),
            row_idx,
            column_name: if row_idx < 0 { Some("price".to_string()) } else { None },
            is_row_vector: row_idx >= 0,
            original_text: format!("row {}", row_idx),
        }
    }

    #[test]
    fn test_add_vectors_rejects_mismatches() {
        let mut store = VectorStore::new(3);

        let err = store
            .add_vectors(vec![vec![1.0, 0.0, 0.0]], vec![])
            .unwrap_err();
        assert!(matches!(err, AgentError::VectorStoreError { .. }));

        let err = store
            .add_vectors(vec![vec![1.0, 0.0]], vec![meta("f", 0)])
            .unwrap_err();
        assert!(err.to_string().contains("dimension 2"));
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_search_orders_by_distance() {
        let mut store = VectorStore::new(2);
        store
            .add_vectors(
                vec![vec![0.0, 2.0], vec![3.0, 0.0], vec![1.0, 1.0]],
                vec![meta("f", 0), meta("f", 1), meta("f", 2)],
            )
            .unwrap();

        let results = store.search(&[5.0, 0.0], 2, &SearchFilter::default()).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.row_idx, 1);
        assert!(results[0].1.abs() < 1e-6);
        assert_eq!(results[1].0.row_idx, 2);
        // |(1,0) - (0.707, 0.707)|^2 = 2 - 2 * cos(45°)
        assert!((results[1].1 - (2.0 - 2.0 * std::f32::consts::FRAC_1_SQRT_2)).abs() < 1e-5);
    }

    #[test]
    fn test_search_filters_rows_and_files() {
        let mut store = VectorStore::new(2);
        store
            .add_vectors(
                vec![vec![1.0, 0.0], vec![1.0, 0.1], vec![0.0, 1.0]],
                vec![meta("f", -1), meta("g", 0), meta("f", 1)],
            )
            .unwrap();

        let filter = SearchFilter {
            file_id: Some("f"),
            rows_only: true,
        };
        let results = store.search(&[1.0, 0.0], 5, &filter).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.row_idx, 1);
        assert_eq!(results[0].0.file_id, "f");
    }

    #[test]
    fn test_query_dimension_checked() {
        let store = VectorStore::new(4);
        assert!(store.search(&[1.0], 1, &SearchFilter::default()).is_err());
    }
}
