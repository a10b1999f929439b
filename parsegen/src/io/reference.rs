//! Reference table loading from delimited files.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::table::{Cell, Column, Table};

/// Values read as missing, matching what dataframe readers treat as NA by default.
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Load a CSV file whose first row holds column names.
pub fn load_reference_table(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("open reference table {}", path.display()))?;
    let table = parse_reference_table(file)
        .with_context(|| format!("parse reference table {}", path.display()))?;
    debug!(
        path = %path.display(),
        columns = table.columns.len(),
        rows = table.row_count(),
        "reference table loaded"
    );
    Ok(table)
}

/// Parse CSV from any reader, inferring a type per column.
///
/// A column is numeric when every non-NA value parses as a number; otherwise its
/// non-NA values stay text. NA values become [`Cell::Null`] in both cases.
pub fn parse_reference_table<R: Read>(reader: R) -> Result<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .context("read header row")?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() {
        return Err(anyhow!("reference table has no columns"));
    }

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for (idx, record) in csv_reader.records().enumerate() {
        let record = record.with_context(|| format!("read record {}", idx + 1))?;
        for (column, value) in raw.iter_mut().zip(record.iter()) {
            column.push(value.to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, values)| Column::new(name, infer_cells(&values)))
        .collect();
    Table::new(columns)
}

fn is_na(value: &str) -> bool {
    NA_VALUES.contains(&value.trim())
}

fn infer_cells(values: &[String]) -> Vec<Cell> {
    let numeric: Option<Vec<Cell>> = values
        .iter()
        .map(|value| {
            if is_na(value) {
                Some(Cell::Null)
            } else {
                // "NAN" and friends parse as f64 NaN but mean a missing cell.
                value
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .map(|n| if n.is_nan() { Cell::Null } else { Cell::Number(n) })
            }
        })
        .collect();
    if let Some(cells) = numeric {
        return cells;
    }
    values
        .iter()
        .map(|value| {
            if is_na(value) {
                Cell::Null
            } else {
                Cell::Text(value.clone())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validator::{Verdict, validate};

    const STATEMENT: &str = "\
Date,Description,Debit Amt,Credit Amt,Balance
01-08-2024,Salary Credit XYZ Pvt Ltd,,1935.3,6864.58
02-08-2024,Salary Debit XYZ Pvt Ltd,1652.61,,5211.97
";

    #[test]
    fn reads_headers_in_order() {
        let table = parse_reference_table(STATEMENT.as_bytes()).expect("parse");
        assert_eq!(
            table.column_names(),
            vec!["Date", "Description", "Debit Amt", "Credit Amt", "Balance"]
        );
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn numeric_columns_keep_empty_cells_as_null() {
        let table = parse_reference_table(STATEMENT.as_bytes()).expect("parse");
        assert_eq!(table.columns[2].cells, vec![Cell::Null, Cell::Number(1652.61)]);
        assert_eq!(table.columns[3].cells, vec![Cell::Number(1935.3), Cell::Null]);
    }

    #[test]
    fn nan_spellings_read_as_null() {
        let table = parse_reference_table("a\n1\nNAN\nNan\n".as_bytes()).expect("parse");
        assert_eq!(
            table.columns[0].cells,
            vec![Cell::Number(1.0), Cell::Null, Cell::Null]
        );
        assert_eq!(validate(&table, &table, None), Verdict::Match);
    }

    #[test]
    fn mixed_columns_stay_text() {
        let table = parse_reference_table("id\n1\nabc\nNA\n".as_bytes()).expect("parse");
        assert_eq!(
            table.columns[0].cells,
            vec![
                Cell::Text("1".to_string()),
                Cell::Text("abc".to_string()),
                Cell::Null
            ]
        );
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = parse_reference_table("a,b\n1,2\n3\n".as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("record"));
    }

    #[test]
    fn missing_file_errors_with_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_reference_table(&temp.path().join("result.csv")).unwrap_err();
        assert!(err.to_string().contains("result.csv"));
    }
}
