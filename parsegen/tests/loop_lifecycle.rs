//! Loop-level tests driving `run_loop` through the real artifact store and a
//! subprocess executor.
//!
//! Generated "programs" are shell scripts run with `sh <artifact>`, so each
//! attempt really is persisted, reloaded from disk and executed in a child.

use parsegen::core::state::Terminal;
use parsegen::core::table::Table;
use parsegen::core::validator::MISMATCH_DIAGNOSTIC;
use parsegen::generator::Generator;
use parsegen::io::config::ExecutionConfig;
use parsegen::io::executor::SubprocessExecutor;
use parsegen::orchestrator::{AttemptEvent, AttemptKind, Components, LoopSettings, run_loop};
use parsegen::test_support::{ScriptedModel, TestWorkspace, demo_table};

fn shell_executor() -> SubprocessExecutor {
    SubprocessExecutor::new(&ExecutionConfig {
        command: vec!["sh".to_string(), "{artifact}".to_string()],
        timeout_secs: 10,
        ..ExecutionConfig::default()
    })
}

/// Shell program that prints `table` in the executor's JSON wire form.
fn printing(table: &Table) -> String {
    let json = serde_json::to_string(table).expect("json");
    format!("```sh\ncat <<'JSON'\n{json}\nJSON\n```")
}

fn failing(message: &str) -> String {
    format!("```sh\necho \"{message}\" >&2\nexit 1\n```")
}

fn first_rows(table: &Table, rows: usize) -> Table {
    let mut short = table.clone();
    for column in &mut short.columns {
        column.cells.truncate(rows);
    }
    short
}

/// Missing entry point, then a short table, then the exact table.
///
/// Verifies three generation calls, per-attempt feedback, and that only the
/// final program is left on disk.
#[test]
fn demo_converges_after_crash_and_short_table() {
    let ws = TestWorkspace::new("demo", &demo_table()).expect("workspace");
    let task = ws.task().expect("task");
    let prepared = ws.prepare(&task).expect("prepare");
    let store = ws.store();
    let generator = Generator::new(ws.config());
    let executor = shell_executor();
    let model = ScriptedModel::new(vec![
        Ok(failing(
            "AttributeError: program does not define a callable 'parse'",
        )),
        Ok(printing(&first_rows(&demo_table(), 4))),
        Ok(printing(&demo_table())),
    ]);
    let parts = Components {
        generator: &generator,
        client: &model,
        store: &store,
        executor: &executor,
    };
    let mut started = Vec::new();

    let outcome = run_loop(&task, &prepared, &parts, LoopSettings::default(), |event| {
        if let AttemptEvent::Started { attempt, .. } = event {
            started.push(*attempt);
        }
    })
    .expect("run");

    assert_eq!(outcome.terminal, Terminal::Success);
    assert_eq!(started, vec![1, 2, 3]);
    let kinds: Vec<AttemptKind> = outcome.history.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            AttemptKind::ExecutionFailed,
            AttemptKind::Mismatch,
            AttemptKind::Match
        ]
    );

    let prompts = model.prompts();
    assert!(prompts[1].contains("does not define a callable 'parse'"));
    assert!(prompts[2].contains(MISMATCH_DIAGNOSTIC));
    assert!(!prompts[2].contains("does not define a callable"));

    let stored = store.load("demo").expect("artifact");
    assert!(stored.source.starts_with("cat <<'JSON'"));
    assert_eq!(stored.path, task.artifact_path);
}

#[test]
fn all_mismatches_end_in_failure_after_three_calls() {
    let ws = TestWorkspace::new("demo", &demo_table()).expect("workspace");
    let task = ws.task().expect("task");
    let prepared = ws.prepare(&task).expect("prepare");
    let store = ws.store();
    let generator = Generator::new(ws.config());
    let executor = shell_executor();
    let short = printing(&first_rows(&demo_table(), 2));
    let model = ScriptedModel::new(vec![
        Ok(short.clone()),
        Ok(short.clone()),
        Ok(short.clone()),
        Ok(short),
    ]);
    let parts = Components {
        generator: &generator,
        client: &model,
        store: &store,
        executor: &executor,
    };

    let outcome =
        run_loop(&task, &prepared, &parts, LoopSettings::default(), |_| {}).expect("run");

    assert_eq!(outcome.terminal, Terminal::Failure);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(model.prompts().len(), 3);
    let last_error = outcome.last_error.expect("last error");
    assert!(last_error.starts_with(MISMATCH_DIAGNOSTIC));
    assert!(last_error.contains("got 2 rows, expected 5"));
}

#[test]
fn configured_budget_bounds_generation_calls() {
    let ws = TestWorkspace::new("demo", &demo_table()).expect("workspace");
    let task = ws.task().expect("task");
    let prepared = ws.prepare(&task).expect("prepare");
    let store = ws.store();
    let generator = Generator::new(ws.config());
    let executor = shell_executor();
    let model = ScriptedModel::new(
        (0..10)
            .map(|i| Ok(failing(&format!("RuntimeError: {i}"))))
            .collect(),
    );
    let parts = Components {
        generator: &generator,
        client: &model,
        store: &store,
        executor: &executor,
    };
    let settings = LoopSettings {
        max_attempts: 5,
        ..LoopSettings::default()
    };

    let outcome = run_loop(&task, &prepared, &parts, settings, |_| {}).expect("run");

    assert_eq!(outcome.attempts, 5);
    assert_eq!(model.prompts().len(), 5);
    assert_eq!(outcome.last_error.as_deref(), Some("RuntimeError: 4"));
}
