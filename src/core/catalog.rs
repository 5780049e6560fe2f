use crate::core::table::DataTable;
use crate::domain::model::{FileMetadata, FileSummary};
use crate::utils::error::{AgentError, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub metadata: FileMetadata,
    pub table: DataTable,
}

/// 已載入的資料表，依載入順序排列
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 相同 file_id 會取代舊資料，位置不變
    pub fn insert(&mut self, entry: CatalogEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.metadata.file_id == entry.metadata.file_id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, file_id: &str) -> Result<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.metadata.file_id == file_id)
            .ok_or_else(|| AgentError::FileNotLoaded {
                file_id: file_id.to_string(),
            })
    }

    /// 未指定檔案時使用最早載入的檔案
    pub fn resolve(&self, file_id: Option<&str>) -> Result<&CatalogEntry> {
        match file_id {
            Some(id) => self.get(id),
            None => self.entries.first().ok_or(AgentError::NoData),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn metadata(&self) -> impl Iterator<Item = &FileMetadata> {
        self.entries.iter().map(|e| &e.metadata)
    }

    pub fn sort_by_ingestion(&mut self) {
        self.entries
            .sort_by(|a, b| a.metadata.ingestion_timestamp.cmp(&b.metadata.ingestion_timestamp));
    }

    pub fn list_files(&self) -> Vec<FileSummary> {
        self.entries
            .iter()
            .map(|e| FileSummary {
                file_id: e.metadata.file_id.clone(),
                filename: e.metadata.filename.clone(),
                rows: e.metadata.num_rows,
                columns: e.metadata.num_columns,
                numeric_columns: e.metadata.numeric_columns.clone(),
            })
            .collect()
    }
}

/// `{檔名主體}_{雜湊前 8 碼}`
pub fn generate_file_id(filename: &str, now: DateTime<Utc>) -> String {
    let unique = format!("{}_{}", filename, now.to_rfc3339());
    let hash = format!("{:x}", Sha256::digest(unique.as_bytes()));

    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let clean: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();

    format!("{}_{}", clean, &hash[..8])
}

pub fn analyze_table(
    table: &DataTable,
    file_id: &str,
    filename: &str,
    ingested_at: DateTime<Utc>,
) -> FileMetadata {
    let mut column_types = BTreeMap::new();
    let mut numeric_columns = Vec::new();
    let mut text_columns = Vec::new();

    for (idx, name) in table.columns().iter().enumerate() {
        let ty = table.column_type(idx);
        column_types.insert(name.clone(), ty.dtype().to_string());
        if ty.is_numeric() {
            numeric_columns.push(name.clone());
        } else {
            text_columns.push(name.clone());
        }
    }

    FileMetadata {
        file_id: file_id.to_string(),
        filename: filename.to_string(),
        num_rows: table.num_rows(),
        num_columns: table.num_columns(),
        columns: table.columns().to_vec(),
        column_types,
        numeric_columns,
        text_columns,
        ingestion_timestamp: ingested_at.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(file_id: &str, ts: DateTime<Utc>, csv: &str) -> CatalogEntry {
        let table = DataTable::from_csv_bytes(csv.as_bytes()).unwrap();
        let metadata = analyze_table(&table, file_id, &format!("{}.csv", file_id), ts);
        CatalogEntry { metadata, table }
    }

    #[test]
    fn test_generate_file_id() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let id = generate_file_id("Q1 sales report.csv", now);

        assert!(id.starts_with("Q1_sales_report_"));
        assert_eq!(id.len(), "Q1_sales_report_".len() + 8);
        assert_eq!(id, generate_file_id("Q1 sales report.csv", now));
        assert_ne!(id, generate_file_id("Q1 sales report.csv", now + chrono::Duration::seconds(1)));

        let id = generate_file_id("sales (q1)#v1.2.csv", now);
        assert!(id.starts_with("sales__q1__v1.2_"));
    }

    #[test]
    fn test_analyze_table_splits_columns() {
        let e = entry("products", Utc::now(), "id,name,price\n1,a,2.5\n2,b,3.0\n");

        assert_eq!(e.metadata.num_rows, 2);
        assert_eq!(e.metadata.numeric_columns, vec!["id", "price"]);
        assert_eq!(e.metadata.text_columns, vec!["name"]);
        assert_eq!(e.metadata.column_types["price"], "float64");
    }

    #[test]
    fn test_resolve_defaults_to_first_ingested() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let mut catalog = Catalog::new();
        assert!(matches!(catalog.resolve(None), Err(AgentError::NoData)));

        catalog.insert(entry("second", late, "a\n1\n"));
        catalog.insert(entry("first", early, "a\n1\n"));
        catalog.sort_by_ingestion();

        assert_eq!(catalog.resolve(None).unwrap().metadata.file_id, "first");
        assert_eq!(catalog.resolve(Some("second")).unwrap().metadata.file_id, "second");
        assert!(matches!(
            catalog.resolve(Some("missing")),
            Err(AgentError::FileNotLoaded { .. })
        ));
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let mut catalog = Catalog::new();
        catalog.insert(entry("sales", Utc::now(), "a\n1\n"));
        catalog.insert(entry("sales", Utc::now(), "a\n1\n2\n"));

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("sales").unwrap().table.num_rows(), 2);
        assert_eq!(catalog.list_files()[0].rows, 2);
    }
}
