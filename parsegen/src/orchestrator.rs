//! The generate → persist → execute/validate → retry loop.
//!
//! [`run_loop`] owns the [`AttemptState`] for one run and advances it with an
//! explicit match on [`Phase`]. Recoverable failures (program errors and table
//! mismatches) are folded into `last_error` and consume one attempt each; setup
//! and persistence faults abort the run with `Err`.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::state::{AttemptState, Phase, Terminal};
use crate::core::table::Table;
use crate::core::validator::{Verdict, validate};
use crate::generator::{GenerationRequest, Generator};
use crate::io::artifact_store::{Artifact, ArtifactStore};
use crate::io::config::ParsegenConfig;
use crate::io::executor::{ExecutionOutcome, Executor};
use crate::io::model::ModelClient;
use crate::task::{PreparedTask, TaskSpec};

/// Loop policy knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    pub max_attempts: u32,
    /// Treat a failed generation call as a consumed attempt instead of aborting.
    pub retry_generation_errors: bool,
    pub numeric_tolerance: Option<f64>,
}

impl LoopSettings {
    pub fn from_config(config: &ParsegenConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_generation_errors: config.retry_generation_errors,
            numeric_tolerance: config.numeric_tolerance,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&ParsegenConfig::default())
    }
}

/// The collaborators the loop calls into.
pub struct Components<'a, M: ModelClient + ?Sized, E: Executor + ?Sized> {
    pub generator: &'a Generator,
    pub client: &'a M,
    pub store: &'a ArtifactStore,
    pub executor: &'a E,
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Match,
    Mismatch,
    ExecutionFailed,
    GenerationFailed,
}

/// Result of executing and validating one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub kind: AttemptKind,
    /// Diagnostic text; `None` on a match.
    pub diagnostic: Option<String>,
}

impl Evaluation {
    pub fn passed(&self) -> bool {
        self.kind == AttemptKind::Match
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub kind: AttemptKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub duration_ms: u64,
}

/// Progress notifications for the caller (console output in the CLI).
#[derive(Debug, Clone, Copy)]
pub enum AttemptEvent<'a> {
    Started { attempt: u32, max_attempts: u32 },
    Saved { attempt: u32, path: &'a Path },
    Finished(&'a AttemptRecord),
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub target: String,
    pub terminal: Terminal,
    /// Generation calls made.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Most recent diagnostic; absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub history: Vec<AttemptRecord>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.terminal == Terminal::Success
    }
}

/// Drive attempts until the program matches or the budget is spent.
///
/// At most `settings.max_attempts` generation calls are made. No side effects
/// happen after a terminal phase is reached.
#[instrument(skip_all, fields(target_id = %task.target, max_attempts = settings.max_attempts))]
pub fn run_loop<M, E, F>(
    task: &TaskSpec,
    prepared: &PreparedTask,
    parts: &Components<'_, M, E>,
    settings: LoopSettings,
    mut on_event: F,
) -> Result<RunOutcome>
where
    M: ModelClient + ?Sized,
    E: Executor + ?Sized,
    F: FnMut(&AttemptEvent<'_>),
{
    let document_arg = task.document_path.to_string_lossy();
    let reference_arg = task.reference_path.to_string_lossy();
    let mut state = AttemptState::default();
    let mut history: Vec<AttemptRecord> = Vec::new();
    let mut attempt_started = Instant::now();

    loop {
        match state.phase {
            Phase::Generate => {
                state.attempt_count += 1;
                attempt_started = Instant::now();
                on_event(&AttemptEvent::Started {
                    attempt: state.attempt_count,
                    max_attempts: settings.max_attempts,
                });
                let request = GenerationRequest {
                    schema: &prepared.schema,
                    excerpt: &prepared.excerpt,
                    prior_error: state.prior_error(),
                    document_path: &document_arg,
                    reference_path: &reference_arg,
                    attempt: state.attempt_count,
                };
                match parts.generator.generate(parts.client, &request) {
                    Ok(source) => {
                        state.generated_source = source;
                        state.phase = Phase::Persist;
                    }
                    Err(err) if settings.retry_generation_errors => {
                        let diagnostic = format!("generation failed: {err:#}");
                        warn!(attempt = state.attempt_count, %diagnostic, "generation failed; retrying");
                        let record = AttemptRecord {
                            attempt: state.attempt_count,
                            kind: AttemptKind::GenerationFailed,
                            diagnostic: Some(diagnostic.clone()),
                            duration_ms: elapsed_ms(attempt_started),
                        };
                        on_event(&AttemptEvent::Finished(&record));
                        history.push(record);
                        state.record_failure(diagnostic, settings.max_attempts);
                    }
                    Err(err) => {
                        return Err(err).with_context(|| {
                            format!("generate program (attempt {})", state.attempt_count)
                        });
                    }
                }
            }
            Phase::Persist => {
                let path = parts
                    .store
                    .save(&task.target, &state.generated_source)
                    .context("persist generated program")?;
                on_event(&AttemptEvent::Saved {
                    attempt: state.attempt_count,
                    path: &path,
                });
                state.phase = Phase::ExecuteAndValidate;
            }
            Phase::ExecuteAndValidate => {
                let artifact = parts.store.load(&task.target)?;
                let evaluation = evaluate(
                    parts.executor,
                    &artifact,
                    &task.document_path,
                    &prepared.expected,
                    settings.numeric_tolerance,
                )?;
                let record = AttemptRecord {
                    attempt: state.attempt_count,
                    kind: evaluation.kind,
                    diagnostic: evaluation.diagnostic.clone(),
                    duration_ms: elapsed_ms(attempt_started),
                };
                on_event(&AttemptEvent::Finished(&record));
                history.push(record);
                match evaluation.diagnostic {
                    None => state.phase = Phase::Done(Terminal::Success),
                    Some(diagnostic) => {
                        info!(attempt = state.attempt_count, %diagnostic, "attempt failed");
                        state.record_failure(diagnostic, settings.max_attempts);
                    }
                }
            }
            Phase::Done(terminal) => {
                info!(?terminal, attempts = state.attempt_count, "run finished");
                let last_error = match terminal {
                    Terminal::Success => None,
                    Terminal::Failure => state.prior_error().map(str::to_string),
                };
                return Ok(RunOutcome {
                    target: task.target.clone(),
                    terminal,
                    attempts: state.attempt_count,
                    max_attempts: settings.max_attempts,
                    last_error,
                    history,
                });
            }
        }
    }
}

/// Execute and validate the stored artifact without generating a new one.
#[instrument(skip_all, fields(target_id = %task.target))]
pub fn check_artifact<E: Executor + ?Sized>(
    task: &TaskSpec,
    prepared: &PreparedTask,
    store: &ArtifactStore,
    executor: &E,
    numeric_tolerance: Option<f64>,
) -> Result<Evaluation> {
    let artifact = store
        .load(&task.target)
        .context("no stored program to check")?;
    evaluate(
        executor,
        &artifact,
        &task.document_path,
        &prepared.expected,
        numeric_tolerance,
    )
}

fn evaluate<E: Executor + ?Sized>(
    executor: &E,
    artifact: &Artifact,
    document: &Path,
    expected: &Table,
    numeric_tolerance: Option<f64>,
) -> Result<Evaluation> {
    let evaluation = match executor.execute(artifact, document)? {
        ExecutionOutcome::Failed(failure) => Evaluation {
            kind: AttemptKind::ExecutionFailed,
            diagnostic: Some(failure.message),
        },
        ExecutionOutcome::Table(produced) => {
            match validate(&produced, expected, numeric_tolerance) {
                Verdict::Match => Evaluation {
                    kind: AttemptKind::Match,
                    diagnostic: None,
                },
                Verdict::Mismatch(diagnostic) => Evaluation {
                    kind: AttemptKind::Mismatch,
                    diagnostic: Some(diagnostic),
                },
            }
        }
    };
    debug!(kind = ?evaluation.kind, "artifact evaluated");
    Ok(evaluation)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
