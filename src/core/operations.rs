//! 確定性的表格運算。所有數值都在這裡計算，不經過語言模型。

use crate::core::catalog::{Catalog, CatalogEntry};
use crate::core::table::{mean, Cell};
use crate::domain::intent::{
    CompareAveragesParams, CompareTopParams, FilterThresholdParams, SortParams, TopNParams,
};
use crate::domain::model::{Computation, Record};
use crate::utils::error::{AgentError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;

fn column_of(entry: &CatalogEntry, column: &str) -> Result<usize> {
    entry
        .table
        .column_index(column)
        .ok_or_else(|| AgentError::ColumnNotFound {
            column: column.to_string(),
            file_id: entry.metadata.file_id.clone(),
        })
}

fn numeric_column_of(entry: &CatalogEntry, column: &str) -> Result<usize> {
    let col = column_of(entry, column)?;
    if !entry.table.column_type(col).is_numeric() {
        return Err(AgentError::ColumnNotNumeric {
            column: column.to_string(),
            file_id: entry.metadata.file_id.clone(),
        });
    }
    Ok(col)
}

/// NaN 與缺值一律輸出為 null
fn number(value: Option<f64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn column_mean(entry: &CatalogEntry, col: usize) -> f64 {
    mean(&entry.table.present_values(col)).unwrap_or(f64::NAN)
}

fn indices_value(indices: &[usize]) -> Value {
    Value::Array(indices.iter().map(|&i| Value::from(i)).collect())
}

fn cells_value(entry: &CatalogEntry, indices: &[usize], col: usize) -> Vec<Value> {
    indices
        .iter()
        .map(|&i| entry.table.cell(i, col).to_json())
        .collect()
}

pub fn compare_averages(catalog: &Catalog, params: &CompareAveragesParams) -> Result<Computation> {
    let column = params.column.as_str();

    if let (Some(file1), Some(file2)) = (&params.file1_id, &params.file2_id) {
        let first = catalog.get(file1)?;
        let second = catalog.get(file2)?;
        let avg1 = column_mean(first, numeric_column_of(first, column)?);
        let avg2 = column_mean(second, numeric_column_of(second, column)?);
        let diff = avg1 - avg2;
        let pct_diff = if avg2 != 0.0 { diff / avg2 * 100.0 } else { 0.0 };

        let mut numbers = Map::new();
        numbers.insert(format!("{}_average", file1), Value::from(avg1));
        numbers.insert(format!("{}_average", file2), Value::from(avg2));
        numbers.insert("difference".into(), Value::from(diff));
        numbers.insert("percent_difference".into(), Value::from(pct_diff));

        let result_table = vec![
            Record::new().with("file_id", file1.as_str()).with("average", avg1),
            Record::new().with("file_id", file2.as_str()).with("average", avg2),
        ];
        return Ok(Computation { result_table, numbers });
    }

    let entry = catalog.resolve(params.file1_id.as_deref())?;
    let col = numeric_column_of(entry, column)?;

    if let Some(group_by) = &params.group_by {
        let key_col = column_of(entry, group_by)?;
        let table = &entry.table;

        // 分組鍵保留原始 Cell 以便數值排序；同一欄型別一致，顯示字串即可當鍵
        let mut groups: Vec<(Cell, Vec<f64>)> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        for row in 0..table.num_rows() {
            let key = table.cell(row, key_col);
            if key.is_null() {
                continue;
            }
            let idx = *slots.entry(key.display()).or_insert_with(|| {
                groups.push((key.clone(), Vec::new()));
                groups.len() - 1
            });
            if let Some(v) = table.cell(row, col).as_f64() {
                groups[idx].1.push(v);
            }
        }
        groups.sort_by(|a, b| a.0.compare(&b.0));

        let averages: Vec<(String, Option<f64>)> = groups
            .iter()
            .map(|(key, values)| (key.display(), mean(values)))
            .collect();

        let result_table = averages
            .iter()
            .map(|(key, avg)| {
                Record::new()
                    .with(group_by.as_str(), key.as_str())
                    .with("average", number(*avg))
            })
            .collect();

        let by_group: Map<String, Value> = averages
            .iter()
            .map(|(key, avg)| (key.clone(), number(*avg)))
            .collect();
        let present: Vec<f64> = averages.iter().filter_map(|(_, avg)| *avg).collect();

        let mut numbers = Map::new();
        numbers.insert(format!("average_by_{}", group_by), Value::Object(by_group));
        numbers.insert("overall_average".into(), Value::from(column_mean(entry, col)));
        numbers.insert("max_average".into(), number(present.iter().copied().reduce(f64::max)));
        numbers.insert("min_average".into(), number(present.iter().copied().reduce(f64::min)));
        return Ok(Computation { result_table, numbers });
    }

    let stats = entry.table.numeric_stats(col);
    let mut numbers = Map::new();
    numbers.insert("average".into(), number(stats.mean));
    numbers.insert("std_dev".into(), number(stats.std_dev));
    numbers.insert("min".into(), number(stats.min));
    numbers.insert("max".into(), number(stats.max));
    numbers.insert("count".into(), Value::from(entry.table.num_rows()));

    let result_table = numbers
        .iter()
        .map(|(metric, value)| Record::new().with("metric", metric.as_str()).with("value", value.clone()))
        .collect();
    Ok(Computation { result_table, numbers })
}

pub fn filter_threshold(
    catalog: &Catalog,
    params: &FilterThresholdParams,
    max_rows: usize,
) -> Result<Computation> {
    let entry = catalog.resolve(params.file_id.as_deref())?;
    let col = numeric_column_of(entry, &params.column)?;
    let total = entry.table.num_rows();

    let matched: Vec<usize> = entry
        .table
        .numeric_values(col)
        .into_iter()
        .enumerate()
        .filter(|(_, v)| params.operator.matches(*v, params.value))
        .map(|(i, _)| i)
        .collect();

    let shown = &matched[..matched.len().min(max_rows)];
    let result_table = shown.iter().map(|&i| entry.table.row_record(i)).collect();

    let percentage = if total > 0 {
        matched.len() as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let mut numbers = Map::new();
    numbers.insert("total_rows".into(), Value::from(total));
    numbers.insert("filtered_rows".into(), Value::from(matched.len()));
    numbers.insert("filter_column".into(), Value::from(params.column.as_str()));
    numbers.insert("filter_operator".into(), Value::from(params.operator.as_str()));
    numbers.insert("filter_value".into(), Value::from(params.value));
    numbers.insert("percentage_matched".into(), Value::from(percentage));
    numbers.insert("row_indices".into(), indices_value(shown));
    Ok(Computation { result_table, numbers })
}

pub fn sort(catalog: &Catalog, params: &SortParams) -> Result<Computation> {
    let entry = catalog.resolve(params.file_id.as_deref())?;
    let col = column_of(entry, &params.column)?;

    let mut order = entry.table.sorted_indices(col, params.ascending);
    // limit 為 0 視同未設定
    if let Some(limit) = params.limit.filter(|&l| l > 0) {
        order.truncate(limit);
    }

    let result_table = order.iter().map(|&i| entry.table.row_record(i)).collect();
    let edge = |idx: Option<&usize>| {
        idx.map(|&i| entry.table.cell(i, col).to_json())
            .unwrap_or(Value::Null)
    };

    let mut numbers = Map::new();
    numbers.insert("total_rows".into(), Value::from(entry.table.num_rows()));
    numbers.insert("returned_rows".into(), Value::from(order.len()));
    numbers.insert("sort_column".into(), Value::from(params.column.as_str()));
    numbers.insert("ascending".into(), Value::from(params.ascending));
    numbers.insert("first_value".into(), edge(order.first()));
    numbers.insert("last_value".into(), edge(order.last()));
    numbers.insert("row_indices".into(), indices_value(&order));
    Ok(Computation { result_table, numbers })
}

pub fn top_n(catalog: &Catalog, params: &TopNParams) -> Result<Computation> {
    let entry = catalog.resolve(params.file_id.as_deref())?;
    let col = numeric_column_of(entry, &params.column)?;

    let mut top = entry.table.sorted_indices(col, params.ascending);
    top.truncate(params.n);

    let result_table = top.iter().map(|&i| entry.table.row_record(i)).collect();
    let top_values = cells_value(entry, &top, col);
    let present: Vec<f64> = top
        .iter()
        .filter_map(|&i| entry.table.cell(i, col).as_f64())
        .collect();

    let mut numbers = Map::new();
    numbers.insert("n".into(), Value::from(params.n));
    numbers.insert("column".into(), Value::from(params.column.as_str()));
    numbers.insert("top_values".into(), Value::Array(top_values.clone()));
    numbers.insert("top_indices".into(), indices_value(&top));
    numbers.insert(
        "highest_value".into(),
        top_values.first().cloned().unwrap_or(Value::Null),
    );
    numbers.insert(
        "lowest_in_top".into(),
        top_values.last().cloned().unwrap_or(Value::Null),
    );
    numbers.insert("average_of_top".into(), number(mean(&present)));
    Ok(Computation { result_table, numbers })
}

/// 取前 n 個非缺值（由大到小，同值保留先出現者）
fn nlargest(entry: &CatalogEntry, col: usize, n: usize) -> Vec<usize> {
    entry
        .table
        .sorted_indices(col, false)
        .into_iter()
        .filter(|&i| !entry.table.cell(i, col).is_null())
        .take(n)
        .collect()
}

pub fn compare_top(catalog: &Catalog, params: &CompareTopParams) -> Result<Computation> {
    let (file1, file2) = match (&params.file1_id, &params.file2_id) {
        (Some(f1), Some(f2)) => (f1.as_str(), f2.as_str()),
        _ => {
            return Err(AgentError::InvalidParameter {
                message: "Both file1_id and file2_id required for compare_top".to_string(),
            })
        }
    };

    let first = catalog.get(file1)?;
    let second = catalog.get(file2)?;
    let col1 = numeric_column_of(first, &params.column)?;
    let col2 = numeric_column_of(second, &params.column)?;

    let top1 = nlargest(first, col1, params.n);
    let top2 = nlargest(second, col2, params.n);

    // 列數以實際取得的筆數為準
    let ranks = top1.len().max(top2.len());
    let mut result_table = Vec::with_capacity(ranks);
    for rank in 0..ranks {
        let mut row = Record::new().with("rank", rank + 1);
        for (file_id, entry, col, top) in [(file1, first, col1, &top1), (file2, second, col2, &top2)] {
            if let Some(&idx) = top.get(rank) {
                row.insert(
                    format!("{}_{}", file_id, params.column),
                    entry.table.cell(idx, col).to_json(),
                );
                row.insert(format!("{}_index", file_id), idx);
            }
        }
        result_table.push(row);
    }

    let values1: Vec<f64> = top1.iter().filter_map(|&i| first.table.cell(i, col1).as_f64()).collect();
    let values2: Vec<f64> = top2.iter().filter_map(|&i| second.table.cell(i, col2).as_f64()).collect();

    let mut numbers = Map::new();
    numbers.insert("n".into(), Value::from(params.n));
    numbers.insert("column".into(), Value::from(params.column.as_str()));
    numbers.insert(
        format!("{}_top_values", file1),
        Value::Array(cells_value(first, &top1, col1)),
    );
    numbers.insert(
        format!("{}_top_values", file2),
        Value::Array(cells_value(second, &top2, col2)),
    );
    numbers.insert(format!("{}_average", file1), number(mean(&values1)));
    numbers.insert(format!("{}_average", file2), number(mean(&values2)));
    numbers.insert(format!("{}_max", file1), number(values1.first().copied()));
    numbers.insert(format!("{}_max", file2), number(values2.first().copied()));
    Ok(Computation { result_table, numbers })
}
