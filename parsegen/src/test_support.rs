//! Test-only fakes and fixtures for driving the generation loop without a model
//! service or an interpreter.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::table::{Cell, Column, Table};
use crate::io::artifact_store::{Artifact, ArtifactStore};
use crate::io::config::ParsegenConfig;
use crate::io::executor::{ExecutionOutcome, Executor};
use crate::io::model::ModelClient;
use crate::task::{PreparedTask, TaskSpec, prepare};

/// Model client that replays canned completions and records every prompt.
///
/// `Err(message)` entries simulate a failing service call.
pub struct ScriptedModel {
    responses: RefCell<VecDeque<std::result::Result<String, String>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted model has no more responses")),
        }
    }
}

/// Executor that returns queued outcomes and records the source it was handed.
pub struct ScriptedExecutor {
    outcomes: RefCell<VecDeque<ExecutionOutcome>>,
    sources: RefCell<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(outcomes: Vec<ExecutionOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            sources: RefCell::new(Vec::new()),
        }
    }

    /// Artifact sources seen so far, in call order.
    pub fn sources(&self) -> Vec<String> {
        self.sources.borrow().clone()
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, artifact: &Artifact, _document: &Path) -> Result<ExecutionOutcome> {
        self.sources.borrow_mut().push(artifact.source.clone());
        self.outcomes
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted executor has no more outcomes"))
    }
}

/// A five-row bank statement with mixed text, numeric and missing cells.
pub fn demo_table() -> Table {
    let text = |values: &[&str]| -> Vec<Cell> {
        values.iter().map(|v| Cell::Text((*v).to_string())).collect()
    };
    let amounts = |values: &[Option<f64>]| -> Vec<Cell> {
        values
            .iter()
            .map(|v| v.map_or(Cell::Null, Cell::Number))
            .collect()
    };
    Table {
        columns: vec![
            Column::new(
                "Date",
                text(&[
                    "01-08-2024",
                    "02-08-2024",
                    "03-08-2024",
                    "03-08-2024",
                    "14-08-2024",
                ]),
            ),
            Column::new(
                "Description",
                text(&[
                    "Salary Credit XYZ Pvt Ltd",
                    "Salary Credit XYZ Pvt Ltd",
                    "IMPS UPI Payment Amazon",
                    "Mobile Recharge Via UPI",
                    "Fuel Purchase Debit Card",
                ]),
            ),
            Column::new(
                "Debit Amt",
                amounts(&[None, None, Some(3886.08), None, Some(1024.35)]),
            ),
            Column::new(
                "Credit Amt",
                amounts(&[Some(1935.3), Some(1652.61), None, Some(1648.72), None]),
            ),
            Column::new(
                "Balance",
                amounts(&[
                    Some(6864.58),
                    Some(8517.19),
                    Some(4631.11),
                    Some(6279.83),
                    Some(5255.48),
                ]),
            ),
        ],
    }
}

/// Render `table` as CSV the way a dataframe writer would (`NaN` as empty).
pub fn table_to_csv(table: &Table) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.column_names())?;
    for row in 0..table.row_count() {
        writer.write_record(table.columns.iter().map(|column| match &column.cells[row] {
            Cell::Null => String::new(),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
        }))?;
    }
    let bytes = writer.into_inner().map_err(|err| anyhow!("flush csv: {err}"))?;
    String::from_utf8(bytes).context("csv is utf-8")
}

/// Temporary project root with `data/<target>/` inputs in place.
pub struct TestWorkspace {
    temp: TempDir,
    target: String,
    config: ParsegenConfig,
}

impl TestWorkspace {
    /// Create the document and the reference CSV for `target`.
    ///
    /// The document is plain text with form-feed page breaks and the config reads
    /// it directly, so no PDF tooling is needed.
    pub fn new(target: &str, expected: &Table) -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let mut config = ParsegenConfig::default();
        config.excerpt.command = Vec::new();
        let workspace = Self {
            temp,
            target: target.to_string(),
            config,
        };
        let task = workspace.task()?;
        let data_dir = task
            .document_path
            .parent()
            .context("document path has a parent")?;
        fs::create_dir_all(data_dir)?;
        fs::write(
            &task.document_path,
            "ChequeBank statement of account\nDate Description Debit Credit Balance\x0cpage two\x0c",
        )?;
        fs::write(&task.reference_path, table_to_csv(expected)?)?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn config(&self) -> &ParsegenConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ParsegenConfig {
        &mut self.config
    }

    /// Where a config file for this workspace would live.
    pub fn config_path(&self) -> PathBuf {
        self.root().join(".parsegen").join("config.toml")
    }

    pub fn task(&self) -> Result<TaskSpec> {
        TaskSpec::from_target(self.root(), &self.target, &self.config)
    }

    pub fn prepare(&self, task: &TaskSpec) -> Result<PreparedTask> {
        prepare(task, &self.config)
    }

    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(
            self.root().join(&self.config.artifact.dir),
            self.config.artifact.extension.clone(),
        )
    }
}
