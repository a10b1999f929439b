//! Task specification: everything a run derives from the target identifier.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::table::Table;
use crate::core::target::normalize_target;
use crate::io::config::ParsegenConfig;
use crate::io::document::{DocumentExcerpt, extract_excerpt};
use crate::io::reference::load_reference_table;

/// Immutable per-run task description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub target: String,
    /// `data/<target>/<target> sample.pdf`
    pub document_path: PathBuf,
    /// `data/<target>/result.csv`
    pub reference_path: PathBuf,
    /// `custom_parsers/<target>_parser.<ext>`
    pub artifact_path: PathBuf,
    /// `<report_dir>/<target>.json`
    pub report_path: PathBuf,
}

impl TaskSpec {
    /// Derive all paths for `raw_target` under `root`.
    pub fn from_target(root: &Path, raw_target: &str, config: &ParsegenConfig) -> Result<Self> {
        let target = normalize_target(raw_target)?;
        let data_dir = root.join(&config.data_dir).join(&target);
        Ok(Self {
            document_path: data_dir.join(format!("{target} sample.pdf")),
            reference_path: data_dir.join("result.csv"),
            artifact_path: root
                .join(&config.artifact.dir)
                .join(format!("{target}_parser.{}", config.artifact.extension)),
            report_path: root.join(&config.report_dir).join(format!("{target}.json")),
            target,
        })
    }

    /// Fail unless both inputs exist.
    pub fn check_inputs(&self) -> Result<()> {
        if !self.document_path.is_file() {
            return Err(anyhow!(
                "source document not found: {}",
                self.document_path.display()
            ));
        }
        if !self.reference_path.is_file() {
            return Err(anyhow!(
                "reference table not found: {}",
                self.reference_path.display()
            ));
        }
        Ok(())
    }
}

/// Inputs read once before the first attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTask {
    /// Header row of the reference table.
    pub schema: Vec<String>,
    pub expected: Table,
    pub excerpt: DocumentExcerpt,
}

/// Read the reference table and the document preview.
#[instrument(skip_all, fields(target_id = %task.target))]
pub fn prepare(task: &TaskSpec, config: &ParsegenConfig) -> Result<PreparedTask> {
    task.check_inputs()?;
    let expected = load_reference_table(&task.reference_path)?;
    let excerpt = extract_excerpt(&task.document_path, &config.excerpt, config.excerpt_chars)
        .context("extract document preview")?;
    debug!(
        columns = expected.columns.len(),
        rows = expected.row_count(),
        pages = excerpt.page_count,
        "task prepared"
    );
    Ok(PreparedTask {
        schema: expected.column_names(),
        expected,
        excerpt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn derives_conventional_paths() {
        let task =
            TaskSpec::from_target(Path::new("/work"), "ICICI", &ParsegenConfig::default())
                .expect("task");
        assert_eq!(task.target, "icici");
        assert_eq!(
            task.document_path,
            Path::new("/work/data/icici/icici sample.pdf")
        );
        assert_eq!(task.reference_path, Path::new("/work/data/icici/result.csv"));
        assert_eq!(
            task.artifact_path,
            Path::new("/work/custom_parsers/icici_parser.py")
        );
        assert_eq!(
            task.report_path,
            Path::new("/work/.parsegen/reports/icici.json")
        );
    }

    #[test]
    fn invalid_target_is_rejected() {
        assert!(TaskSpec::from_target(Path::new("."), "../x", &ParsegenConfig::default()).is_err());
    }

    #[test]
    fn missing_inputs_are_setup_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let task = TaskSpec::from_target(temp.path(), "demo", &ParsegenConfig::default())
            .expect("task");
        let err = task.check_inputs().unwrap_err();
        assert!(err.to_string().contains("source document not found"));

        fs::create_dir_all(task.document_path.parent().expect("parent")).expect("mkdir");
        fs::write(&task.document_path, "pdf").expect("write doc");
        let err = task.check_inputs().unwrap_err();
        assert!(err.to_string().contains("reference table not found"));
    }

    #[test]
    fn prepare_reads_schema_and_excerpt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = ParsegenConfig::default();
        config.excerpt.command = Vec::new();
        config.excerpt_chars = 9;
        let task = TaskSpec::from_target(temp.path(), "demo", &config).expect("task");
        fs::create_dir_all(task.document_path.parent().expect("parent")).expect("mkdir");
        fs::write(&task.document_path, "Statement page one\x0cpage two").expect("write doc");
        fs::write(&task.reference_path, "Date,Balance\n01-08-2024,100.5\n").expect("write csv");

        let prepared = prepare(&task, &config).expect("prepare");
        assert_eq!(prepared.schema, vec!["Date", "Balance"]);
        assert_eq!(prepared.expected.row_count(), 1);
        assert_eq!(prepared.excerpt.text, "Statement");
        assert_eq!(prepared.excerpt.page_count, 2);
    }
}
