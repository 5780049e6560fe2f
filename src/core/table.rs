use crate::domain::model::Record;
use crate::utils::error::{AgentError, Result};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::io::Read;

/// 視為缺值的字串
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Int(i) => Value::from(*i),
            Cell::Float(f) => Value::from(*f),
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Null => Value::Null,
        }
    }

    /// 文字表示（用於嵌入文字與分組鍵）
    pub fn display(&self) -> String {
        match self {
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => format_float(*f),
            Cell::Text(s) => s.clone(),
            Cell::Null => "nan".to_string(),
        }
    }

    pub(crate) fn compare(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Null, Cell::Null) => Ordering::Equal,
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        }
    }
}

/// 整數值的浮點數顯示為 `20.0`
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
}

impl ColumnType {
    pub fn dtype(&self) -> &'static str {
        match self {
            ColumnType::Integer => "int64",
            ColumnType::Float => "float64",
            ColumnType::Text => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ColumnType::Text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DataTable {
    columns: Vec<String>,
    types: Vec<ColumnType>,
    rows: Vec<Vec<Cell>>,
}

impl DataTable {
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = rdr.headers()?.clone();
        if headers.is_empty() {
            return Err(AgentError::ValidationError {
                message: "CSV file has no columns".to_string(),
            });
        }
        let columns = dedupe_headers(headers.iter());

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for record in rdr.records() {
            let record = record?;
            raw_rows.push(record.iter().map(|s| s.to_string()).collect());
        }

        let types: Vec<ColumnType> = (0..columns.len())
            .map(|col| infer_type(raw_rows.iter().map(|row| row[col].as_str())))
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(types.iter())
                    .map(|(raw, ty)| parse_cell(&raw, *ty))
                    .collect()
            })
            .collect();

        Ok(Self { columns, types, rows })
    }

    pub fn from_csv_bytes(data: &[u8]) -> Result<Self> {
        Self::from_csv_reader(data)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_type(&self, col: usize) -> ColumnType {
        self.types[col]
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.rows[row][col]
    }

    pub fn numeric_values(&self, col: usize) -> Vec<Option<f64>> {
        self.rows.iter().map(|row| row[col].as_f64()).collect()
    }

    /// 非缺值的數值
    pub fn present_values(&self, col: usize) -> Vec<f64> {
        self.rows.iter().filter_map(|row| row[col].as_f64()).collect()
    }

    pub fn numeric_stats(&self, col: usize) -> NumericStats {
        let values = self.present_values(col);
        NumericStats {
            count: values.len(),
            mean: mean(&values),
            std_dev: sample_std(&values),
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
            median: median(&values),
        }
    }

    pub fn nunique(&self, col: usize) -> usize {
        self.rows
            .iter()
            .filter(|row| !row[col].is_null())
            .map(|row| row[col].display())
            .collect::<HashSet<_>>()
            .len()
    }

    /// 依出現次數遞減排序，同次數依首次出現順序
    pub fn value_counts(&self, col: usize) -> Vec<(String, usize)> {
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for row in &self.rows {
            if row[col].is_null() {
                continue;
            }
            let key = row[col].display();
            let entry = counts.entry(key.clone()).or_insert(0);
            if *entry == 0 {
                order.push(key);
            }
            *entry += 1;
        }

        let mut result: Vec<(String, usize)> = order
            .into_iter()
            .map(|k| {
                let n = counts[&k];
                (k, n)
            })
            .collect();
        result.sort_by(|a, b| b.1.cmp(&a.1));
        result
    }

    /// 穩定排序；缺值永遠排在最後
    pub fn sorted_indices(&self, col: usize, ascending: bool) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.rows.len()).collect();
        indices.sort_by(|&a, &b| {
            let (x, y) = (&self.rows[a][col], &self.rows[b][col]);
            match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = x.compare(y);
                    if ascending {
                        ord
                    } else {
                        ord.reverse()
                    }
                }
            }
        });
        indices
    }

    pub fn row_record(&self, idx: usize) -> Record {
        let mut record = Record::new();
        for (col, name) in self.columns.iter().enumerate() {
            record.insert(name.clone(), self.rows[idx][col].to_json());
        }
        record
    }

    /// `col: value | col: value`，略過缺值
    pub fn row_text(&self, idx: usize) -> String {
        self.columns
            .iter()
            .zip(self.rows[idx].iter())
            .filter(|(_, cell)| !cell.is_null())
            .map(|(name, cell)| format!("{}: {}", name, cell.display()))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    pub fn column_summary(&self, col: usize) -> String {
        let name = &self.columns[col];
        match self.types[col] {
            ColumnType::Integer | ColumnType::Float => {
                let stats = self.numeric_stats(col);
                let shown = |v: Option<f64>| match (v, self.types[col]) {
                    (Some(x), ColumnType::Integer) => (x as i64).to_string(),
                    (Some(x), _) => format_float(x),
                    (None, _) => "nan".to_string(),
                };
                format!(
                    "Column {}: numeric. Min: {}, Max: {}, Mean: {}, Median: {}",
                    name,
                    shown(stats.min),
                    shown(stats.max),
                    stats
                        .mean
                        .map(|m| format!("{:.2}", m))
                        .unwrap_or_else(|| "nan".to_string()),
                    stats.median.map(format_float).unwrap_or_else(|| "nan".to_string()),
                )
            }
            ColumnType::Text => {
                let top: Vec<String> = self
                    .value_counts(col)
                    .into_iter()
                    .take(3)
                    .map(|(value, _)| value)
                    .collect();
                format!(
                    "Column {}: text/categorical. Unique values: {}. Top values: {}",
                    name,
                    self.nunique(col),
                    top.join(", ")
                )
            }
        }
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn is_na(raw: &str) -> bool {
    NA_VALUES.contains(&raw)
}

fn infer_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut all_int = true;
    let mut all_float = true;
    let mut has_missing = false;
    let mut has_rows = false;

    for raw in values {
        has_rows = true;
        if is_na(raw) {
            has_missing = true;
            continue;
        }
        let trimmed = raw.trim();
        if all_int && trimmed.parse::<i64>().is_err() {
            all_int = false;
        }
        if trimmed.parse::<f64>().is_err() {
            all_float = false;
            break;
        }
    }

    if !has_rows {
        ColumnType::Text
    } else if all_float && all_int && !has_missing {
        ColumnType::Integer
    } else if all_float {
        ColumnType::Float
    } else {
        ColumnType::Text
    }
}

fn parse_cell(raw: &str, ty: ColumnType) -> Cell {
    if is_na(raw) {
        return Cell::Null;
    }
    let trimmed = raw.trim();
    match ty {
        ColumnType::Integer => trimmed.parse().map(Cell::Int).unwrap_or(Cell::Null),
        ColumnType::Float => trimmed.parse().map(Cell::Float).unwrap_or(Cell::Null),
        ColumnType::Text => Cell::Text(raw.to_string()),
    }
}

fn dedupe_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::new();

    for (i, header) in headers.enumerate() {
        let base = if header.is_empty() {
            format!("Unnamed: {}", i)
        } else {
            header.to_string()
        };

        let mut name = base.clone();
        while let Some(count) = seen.get_mut(&name) {
            *count += 1;
            name = format!("{}.{}", base, count);
        }
        seen.insert(name.clone(), 0);
        columns.push(name);
    }

    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCTS: &str = "id,name,price,quantity,category
1,Product_1,10.5,100,A
2,Product_2,20.0,50,B
3,Product_3,15.5,75,A
4,Product_4,30.0,30,C
5,Product_5,25.5,45,B
";

    #[test]
    fn test_column_types_are_inferred() {
        let table = DataTable::from_csv_bytes(PRODUCTS.as_bytes()).unwrap();

        assert_eq!(table.num_rows(), 5);
        assert_eq!(table.num_columns(), 5);
        assert_eq!(table.column_type(0), ColumnType::Integer);
        assert_eq!(table.column_type(1), ColumnType::Text);
        assert_eq!(table.column_type(2), ColumnType::Float);
        assert_eq!(table.column_type(3).dtype(), "int64");
        assert_eq!(table.column_type(4).dtype(), "object");
    }

    #[test]
    fn test_missing_values_make_integers_float() {
        let table = DataTable::from_csv_bytes(b"a,b\n1,x\n,y\n3,NA\n").unwrap();

        assert_eq!(table.column_type(0), ColumnType::Float);
        assert!(table.cell(1, 0).is_null());
        assert!(table.cell(2, 1).is_null());
        assert_eq!(table.present_values(0), vec![1.0, 3.0]);
    }

    #[test]
    fn test_numeric_stats() {
        let table = DataTable::from_csv_bytes(PRODUCTS.as_bytes()).unwrap();
        let stats = table.numeric_stats(2);

        assert_eq!(stats.count, 5);
        assert!((stats.mean.unwrap() - 20.3).abs() < 1e-9);
        assert_eq!(stats.min, Some(10.5));
        assert_eq!(stats.max, Some(30.0));
        assert_eq!(stats.median, Some(20.0));
        // sample std of [10.5, 20, 15.5, 30, 25.5]
        assert!((stats.std_dev.unwrap() - 7.750806410).abs() < 1e-6);
    }

    #[test]
    fn test_sort_puts_missing_last() {
        let table = DataTable::from_csv_bytes(b"k,v\na,3\nb,\nc,1\nd,2\n").unwrap();

        assert_eq!(table.sorted_indices(1, true), vec![2, 3, 0, 1]);
        assert_eq!(table.sorted_indices(1, false), vec![0, 3, 2, 1]);
    }

    #[test]
    fn test_row_text_and_summary() {
        let table = DataTable::from_csv_bytes(PRODUCTS.as_bytes()).unwrap();

        assert_eq!(
            table.row_text(1),
            "id: 2 | name: Product_2 | price: 20.0 | quantity: 50 | category: B"
        );
        assert_eq!(
            table.column_summary(3),
            "Column quantity: numeric. Min: 30, Max: 100, Mean: 60.00, Median: 50.0"
        );
        assert_eq!(
            table.column_summary(4),
            "Column category: text/categorical. Unique values: 3. Top values: A, B, C"
        );
    }

    #[test]
    fn test_summary_of_empty_numeric_column() {
        let table = DataTable::from_csv_bytes(b"name,score\na,\nb,NA\n").unwrap();

        assert_eq!(table.column_type(1), ColumnType::Float);
        assert_eq!(
            table.column_summary(1),
            "Column score: numeric. Min: nan, Max: nan, Mean: nan, Median: nan"
        );
    }

    #[test]
    fn test_headers_are_deduplicated() {
        let table = DataTable::from_csv_bytes(b"a,a,,a\n1,2,3,4\n").unwrap();
        assert_eq!(table.columns(), &["a", "a.1", "Unnamed: 2", "a.2"]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = DataTable::from_csv_bytes(b"a,b\n1,2\n3\n").unwrap_err();
        assert!(matches!(err, AgentError::CsvError(_)));
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(20.0), "20.0");
        assert_eq!(format_float(10.5), "10.5");
        assert_eq!(format_float(-3.0), "-3.0");
    }
}
