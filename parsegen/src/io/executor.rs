//! Executor abstraction for running generated programs.
//!
//! The [`Executor`] trait decouples the generation loop from how a program is
//! actually run. [`SubprocessExecutor`] runs it in a child interpreter behind a
//! JSON table boundary, so crashes in generated code stay in the child. Tests use
//! scripted executors that return predetermined outcomes without spawning processes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::core::table::Table;
use crate::io::artifact_store::Artifact;
use crate::io::config::ExecutionConfig;
use crate::io::process::{render_command, run_command_with_timeout};

/// Interpreter-side shim that loads a program and prints its table as JSON.
pub const PYTHON_HARNESS: &str = include_str!("harness.py");

/// Prefix of the final stderr line the harness writes when the program raises.
const ERROR_RECORD_PREFIX: &str = "parsegen-error: ";

/// Any failure attributable to the generated program.
///
/// Carries only the diagnostic text; callers never branch on the cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFailure {
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ExecutionFailure {}

/// Outcome of running a program against a document.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Table(Table),
    Failed(ExecutionFailure),
}

/// Abstraction over program execution backends.
///
/// `Err` is reserved for faults of the host environment (e.g. the interpreter
/// cannot be spawned); everything the program itself does wrong is
/// [`ExecutionOutcome::Failed`].
pub trait Executor {
    fn execute(&self, artifact: &Artifact, document: &Path) -> Result<ExecutionOutcome>;
}

/// Executor that runs the configured command template in a child process.
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    command: Vec<String>,
    entry_point: String,
    timeout: Duration,
    output_limit_bytes: usize,
    workdir: Option<PathBuf>,
}

impl SubprocessExecutor {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            command: config.command.clone(),
            entry_point: config.entry_point.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            workdir: None,
        }
    }

    /// Run programs from `dir` so relative paths inside them resolve there.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

impl Executor for SubprocessExecutor {
    #[instrument(skip_all, fields(artifact = %artifact.path.display(), timeout_secs = self.timeout.as_secs()))]
    fn execute(&self, artifact: &Artifact, document: &Path) -> Result<ExecutionOutcome> {
        info!(target_id = %artifact.target, "executing generated program");
        let artifact_arg = artifact.path.to_string_lossy();
        let document_arg = document.to_string_lossy();
        let mut cmd = render_command(
            &self.command,
            &[
                ("harness", PYTHON_HARNESS),
                ("artifact", artifact_arg.as_ref()),
                ("entry_point", self.entry_point.as_str()),
                ("document", document_arg.as_ref()),
            ],
        )?;
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .context("run generated program")?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "program timed out");
            return Ok(ExecutionOutcome::Failed(ExecutionFailure::new(format!(
                "program timed out after {}s",
                self.timeout.as_secs()
            ))));
        }
        if !output.status.success() {
            let message = error_record(&output.stderr_lossy())
                .or_else(|| output.last_stderr_line())
                .unwrap_or_else(|| {
                    format!("program exited with status {:?}", output.status.code())
                });
            warn!(exit_code = ?output.status.code(), %message, "program failed");
            debug!(stderr = %output.stderr_lossy(), "{}", output.stderr_truncated_notice("program"));
            return Ok(ExecutionOutcome::Failed(ExecutionFailure::new(message)));
        }
        if output.stdout_truncated > 0 {
            return Ok(ExecutionOutcome::Failed(ExecutionFailure::new(format!(
                "program output exceeded {} bytes",
                self.output_limit_bytes
            ))));
        }

        let outcome = match decode_table(&output.stdout_lossy()) {
            Ok(table) => {
                debug!(
                    columns = table.columns.len(),
                    rows = table.row_count(),
                    "program returned a table"
                );
                ExecutionOutcome::Table(table)
            }
            Err(failure) => ExecutionOutcome::Failed(failure),
        };
        Ok(outcome)
    }
}

#[derive(Deserialize)]
struct ErrorRecord {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// Full `Type: message` text from the harness error record, if one was written.
///
/// Exception messages may span lines, so the record is JSON on a single line.
fn error_record(stderr: &str) -> Option<String> {
    let line = stderr
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(ERROR_RECORD_PREFIX))?;
    let record: ErrorRecord = serde_json::from_str(line.trim()).ok()?;
    Some(if record.message.is_empty() {
        record.kind
    } else {
        format!("{}: {}", record.kind, record.message)
    })
}

/// Decode the harness JSON into a rectangular table.
pub fn decode_table(stdout: &str) -> std::result::Result<Table, ExecutionFailure> {
    let table: Table = serde_json::from_str(stdout.trim())
        .map_err(|err| ExecutionFailure::new(format!("wrong return shape: {err}")))?;
    table
        .check_shape()
        .map_err(|err| ExecutionFailure::new(format!("wrong return shape: {err}")))?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::{Cell, Column};
    use std::fs;

    fn artifact_with(dir: &Path, source: &str) -> Artifact {
        let path = dir.join("demo_parser.py");
        fs::write(&path, source).expect("write artifact");
        Artifact {
            target: "demo".to_string(),
            path,
            source: source.to_string(),
        }
    }

    fn executor(script: &str) -> SubprocessExecutor {
        // `sh -c <script> <artifact> <document>`: $0 is the artifact, $1 the document.
        SubprocessExecutor::new(&ExecutionConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                script.to_string(),
                "{artifact}".to_string(),
                "{document}".to_string(),
            ],
            entry_point: "parse".to_string(),
            timeout_secs: 5,
            output_limit_bytes: 1_000_000,
        })
    }

    #[test]
    fn decodes_table_printed_by_program() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = artifact_with(
            temp.path(),
            r#"{"columns":[{"name":"Balance","cells":[1.5,null]}]}"#,
        );
        let outcome = executor(r#"cat "$0""#)
            .execute(&artifact, Path::new("doc.pdf"))
            .expect("execute");
        let expected = Table::new(vec![Column::new(
            "Balance",
            vec![Cell::Number(1.5), Cell::Null],
        )])
        .expect("table");
        assert_eq!(outcome, ExecutionOutcome::Table(expected));
    }

    #[test]
    fn program_error_becomes_failure_with_last_stderr_line() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = artifact_with(temp.path(), "");
        let outcome = executor(
            "echo 'Traceback (most recent call last):' >&2; \
             echo \"AttributeError: program does not define a callable 'parse'\" >&2; exit 1",
        )
        .execute(&artifact, Path::new("doc.pdf"))
        .expect("execute");
        assert_eq!(
            outcome,
            ExecutionOutcome::Failed(ExecutionFailure::new(
                "AttributeError: program does not define a callable 'parse'"
            ))
        );
    }

    #[test]
    fn silent_crash_reports_exit_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = artifact_with(temp.path(), "");
        let outcome = executor("exit 7")
            .execute(&artifact, Path::new("doc.pdf"))
            .expect("execute");
        let ExecutionOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert!(failure.message.contains("Some(7)"));
    }

    #[test]
    fn non_table_output_is_wrong_shape() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = artifact_with(temp.path(), "");
        let outcome = executor("echo '[1, 2, 3]'")
            .execute(&artifact, Path::new("doc.pdf"))
            .expect("execute");
        let ExecutionOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert!(failure.message.starts_with("wrong return shape"));
    }

    #[test]
    fn ragged_table_is_wrong_shape() {
        let failure = decode_table(
            r#"{"columns":[{"name":"a","cells":[1]},{"name":"b","cells":[]}]}"#,
        )
        .unwrap_err();
        assert!(failure.message.contains("column 'b'"));
    }

    #[test]
    fn timeout_is_a_failure_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = artifact_with(temp.path(), "");
        let mut exec = executor("exec sleep 5");
        exec.timeout = Duration::from_millis(100);
        let outcome = exec
            .execute(&artifact, Path::new("doc.pdf"))
            .expect("execute");
        let ExecutionOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert!(failure.message.contains("timed out"));
    }

    #[test]
    fn missing_interpreter_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = artifact_with(temp.path(), "");
        let exec = SubprocessExecutor::new(&ExecutionConfig {
            command: vec!["parsegen-no-such-interpreter".to_string()],
            ..ExecutionConfig::default()
        });
        assert!(exec.execute(&artifact, Path::new("doc.pdf")).is_err());
    }

    #[test]
    fn error_record_keeps_multi_line_messages() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = artifact_with(temp.path(), "");
        let outcome = executor(
            r#"echo 'Traceback (most recent call last):' >&2; \
               printf '%s\n' 'parsegen-error: {"type":"ValueError","message":"bad row 3\nexpected columns: Date, Balance"}' >&2; \
               exit 1"#,
        )
        .execute(&artifact, Path::new("doc.pdf"))
        .expect("execute");
        assert_eq!(
            outcome,
            ExecutionOutcome::Failed(ExecutionFailure::new(
                "ValueError: bad row 3\nexpected columns: Date, Balance"
            ))
        );
    }

    #[test]
    fn error_record_without_message_is_just_the_type() {
        assert_eq!(
            error_record("noise\nparsegen-error: {\"type\":\"StopIteration\",\"message\":\"\"}\n"),
            Some("StopIteration".to_string())
        );
        assert_eq!(error_record("parsegen-error: not json\n"), None);
        assert_eq!(error_record("ValueError: plain\n"), None);
    }

    #[test]
    fn harness_declares_expected_usage() {
        assert!(PYTHON_HARNESS.contains("usage: harness <artifact> <entry_point> <document>"));
    }

    // The tests below run the bundled harness under the default command and skip
    // when `python3` is not on PATH.

    fn python3_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|output| output.status.success())
    }

    fn run_python(source: &str) -> Option<ExecutionOutcome> {
        if !python3_available() {
            eprintln!("python3 not found; skipping harness test");
            return None;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = artifact_with(temp.path(), source);
        let document = temp.path().join("statement.pdf");
        fs::write(&document, "statement").expect("write document");
        let outcome = SubprocessExecutor::new(&ExecutionConfig::default())
            .execute(&artifact, &document)
            .expect("execute");
        Some(outcome)
    }

    fn failure_message(outcome: ExecutionOutcome) -> String {
        match outcome {
            ExecutionOutcome::Failed(failure) => failure.message,
            ExecutionOutcome::Table(table) => panic!("expected failure, got {table:?}"),
        }
    }

    #[test]
    fn harness_returns_mapping_as_table() {
        let Some(outcome) = run_python(
            "def parse(path):\n    return {'Date': ['01-08-2024', None], 'Balance': [6864.58, 2]}\n",
        ) else {
            return;
        };
        let expected = Table::new(vec![
            Column::new(
                "Date",
                vec![Cell::Text("01-08-2024".to_string()), Cell::Null],
            ),
            Column::new("Balance", vec![Cell::Number(6864.58), Cell::Number(2.0)]),
        ])
        .expect("table");
        assert_eq!(outcome, ExecutionOutcome::Table(expected));
    }

    #[test]
    fn harness_keeps_program_prints_off_the_table_stream() {
        let Some(outcome) = run_python(
            "print('loading parser')\n\
             def parse(path):\n    print('parsing', path)\n    return {'a': [1.0, 2.0]}\n",
        ) else {
            return;
        };
        let expected = Table::new(vec![Column::new(
            "a",
            vec![Cell::Number(1.0), Cell::Number(2.0)],
        )])
        .expect("table");
        assert_eq!(outcome, ExecutionOutcome::Table(expected));
    }

    #[test]
    fn harness_maps_nan_to_null() {
        let Some(outcome) =
            run_python("def parse(path):\n    return {'a': [float('nan'), 1]}\n")
        else {
            return;
        };
        let expected =
            Table::new(vec![Column::new("a", vec![Cell::Null, Cell::Number(1.0)])]).expect("table");
        assert_eq!(outcome, ExecutionOutcome::Table(expected));
    }

    #[test]
    fn harness_reports_missing_entry_point() {
        let Some(outcome) = run_python("def extract(path):\n    return {}\n") else {
            return;
        };
        assert_eq!(
            failure_message(outcome),
            "AttributeError: program does not define a callable 'parse'"
        );
    }

    #[test]
    fn harness_reports_syntax_error() {
        let Some(outcome) = run_python("def parse(path)\n    return {}\n") else {
            return;
        };
        assert!(failure_message(outcome).starts_with("SyntaxError"));
    }

    #[test]
    fn harness_rejects_non_table_return() {
        let Some(outcome) = run_python("def parse(path):\n    return 42\n") else {
            return;
        };
        assert_eq!(
            failure_message(outcome),
            "TypeError: entry point must return a DataFrame or a mapping of columns, got int"
        );
    }

    #[test]
    fn harness_reports_multi_line_exception_message() {
        let Some(outcome) = run_python(
            "def parse(path):\n    raise ValueError('bad row 3\\nexpected columns: Date, Balance')\n",
        ) else {
            return;
        };
        assert_eq!(
            failure_message(outcome),
            "ValueError: bad row 3\nexpected columns: Date, Balance"
        );
    }
}
