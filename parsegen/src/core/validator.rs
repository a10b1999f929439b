//! Structural comparison of a produced table against the reference table.

use crate::core::table::Table;

/// Fixed prefix of every mismatch diagnostic.
pub const MISMATCH_DIAGNOSTIC: &str = "Output doesn't match CSV";

/// Result of comparing a produced table to the reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Match,
    /// Diagnostic starts with [`MISMATCH_DIAGNOSTIC`]; anything after it is advisory.
    Mismatch(String),
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match)
    }
}

/// Compare `produced` against `expected`.
///
/// `tolerance` is an absolute epsilon for numeric cells; `None` means exact equality.
pub fn validate(produced: &Table, expected: &Table, tolerance: Option<f64>) -> Verdict {
    match produced.first_difference(expected, tolerance) {
        None => Verdict::Match,
        Some(diff) => Verdict::Mismatch(format!("{MISMATCH_DIAGNOSTIC}: {diff}")),
    }
}
