//! Column-oriented table model shared by the reference reader and the executor.
//!
//! Equality is structural: same column names in the same order, same row count,
//! and every cell equal by value with `Null == Null`.

use std::fmt;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// A single typed cell value.
///
/// Serialized untagged so the wire form is plain JSON: `null`, a number, or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Compare two cells, optionally allowing an absolute epsilon between numbers.
    pub fn matches(&self, other: &Cell, tolerance: Option<f64>) -> bool {
        match (self, other) {
            (Cell::Null, Cell::Null) => true,
            (Cell::Number(a), Cell::Number(b)) => match tolerance {
                Some(eps) => (a - b).abs() <= eps,
                None => a == b,
            },
            (Cell::Text(a), Cell::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("null"),
            Cell::Number(n) => write!(f, "{n}"),
            Cell::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// A named column of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }
}

/// An ordered list of equally long columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
}

/// First structural difference found between two tables.
#[derive(Debug, Clone, PartialEq)]
pub enum TableDifference {
    ColumnNames {
        produced: Vec<String>,
        expected: Vec<String>,
    },
    RowCount {
        produced: usize,
        expected: usize,
    },
    Cell {
        row: usize,
        column: String,
        produced: Cell,
        expected: Cell,
    },
}

impl fmt::Display for TableDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableDifference::ColumnNames { produced, expected } => write!(
                f,
                "columns {produced:?} do not match expected {expected:?}"
            ),
            TableDifference::RowCount { produced, expected } => {
                write!(f, "got {produced} rows, expected {expected}")
            }
            TableDifference::Cell {
                row,
                column,
                produced,
                expected,
            } => write!(
                f,
                "row {row} column '{column}': got {produced}, expected {expected}"
            ),
        }
    }
}

impl Table {
    /// Build a table, rejecting columns of unequal length.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let table = Self { columns };
        table.check_shape()?;
        Ok(table)
    }

    /// Verify every column has the same number of cells.
    pub fn check_shape(&self) -> Result<()> {
        let Some(first) = self.columns.first() else {
            return Ok(());
        };
        let rows = first.cells.len();
        for column in &self.columns {
            if column.cells.len() != rows {
                return Err(anyhow!(
                    "column '{}' has {} cells but '{}' has {}",
                    column.name,
                    column.cells.len(),
                    first.name,
                    rows
                ));
            }
        }
        Ok(())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.cells.len())
    }

    /// Return the first difference from `expected`, or `None` when the tables are equal.
    ///
    /// Checks run in a fixed order: column names/order, row count, then cells
    /// row-major so the reported cell is the top-left-most mismatch.
    pub fn first_difference(
        &self,
        expected: &Table,
        tolerance: Option<f64>,
    ) -> Option<TableDifference> {
        let produced_names = self.column_names();
        let expected_names = expected.column_names();
        if produced_names != expected_names {
            return Some(TableDifference::ColumnNames {
                produced: produced_names,
                expected: expected_names,
            });
        }

        let (produced_rows, expected_rows) = (self.row_count(), expected.row_count());
        if produced_rows != expected_rows {
            return Some(TableDifference::RowCount {
                produced: produced_rows,
                expected: expected_rows,
            });
        }

        for row in 0..expected_rows {
            for (got, want) in self.columns.iter().zip(&expected.columns) {
                let (got_cell, want_cell) = (&got.cells[row], &want.cells[row]);
                if !got_cell.matches(want_cell, tolerance) {
                    return Some(TableDifference::Cell {
                        row,
                        column: want.name.clone(),
                        produced: got_cell.clone(),
                        expected: want_cell.clone(),
                    });
                }
            }
        }
        None
    }
}
