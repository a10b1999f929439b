//! `parsegen`: generate and verify a table extraction program for one target.
//!
//! Reads `data/<target>/<target> sample.pdf` and `data/<target>/result.csv`, loops
//! until a generated program reproduces the CSV, and leaves the program at
//! `custom_parsers/<target>_parser.py`.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use parsegen::exit_codes;
use parsegen::generator::Generator;
use parsegen::io::artifact_store::ArtifactStore;
use parsegen::io::config::{ParsegenConfig, load_config};
use parsegen::io::executor::SubprocessExecutor;
use parsegen::io::model::build_client;
use parsegen::io::report::write_report;
use parsegen::logging;
use parsegen::orchestrator::{
    AttemptEvent, AttemptKind, AttemptRecord, Components, LoopSettings, check_artifact, run_loop,
};
use parsegen::task::{TaskSpec, prepare};

#[derive(Parser, Debug)]
#[command(
    name = "parsegen",
    version,
    about = "Generate a program that extracts a document's table, retrying until it matches"
)]
struct Cli {
    /// Target identifier; selects `data/<target>/` and names the generated program.
    #[arg(short, long)]
    target: String,

    /// Project root holding `data/` and `custom_parsers/`.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Config file [default: <root>/.parsegen/config.toml].
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run and validate the stored program without generating a new one.
    #[arg(long)]
    check_only: bool,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("resolve root {}", cli.root.display()))?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| root.join(".parsegen").join("config.toml"));
    let config = load_config(&config_path)?;
    let task = TaskSpec::from_target(&root, &cli.target, &config)?;
    println!("Target: {}", task.target);
    println!("PDF path: {}", task.document_path.display());

    if cli.check_only {
        return cmd_check(&root, &task, &config);
    }
    cmd_generate(&root, &task, &config)
}

fn cmd_generate(root: &Path, task: &TaskSpec, config: &ParsegenConfig) -> Result<i32> {
    // Credential problems surface before any attempt is counted.
    let client = build_client(&config.generator)?;
    let prepared = prepare(task, config)?;
    let generator = Generator::new(config);
    let store = artifact_store(root, config);
    let executor = SubprocessExecutor::new(&config.execution).with_workdir(root);
    let parts = Components {
        generator: &generator,
        client: client.as_ref(),
        store: &store,
        executor: &executor,
    };

    let outcome = run_loop(
        task,
        &prepared,
        &parts,
        LoopSettings::from_config(config),
        print_event,
    )?;
    write_report(&task.report_path, &outcome)?;

    if outcome.succeeded() {
        println!("Parser saved to {}", task.artifact_path.display());
        Ok(exit_codes::OK)
    } else {
        println!("Failed after {} attempts", outcome.attempts);
        Ok(exit_codes::EXHAUSTED)
    }
}

fn cmd_check(root: &Path, task: &TaskSpec, config: &ParsegenConfig) -> Result<i32> {
    let prepared = prepare(task, config)?;
    let store = artifact_store(root, config);
    let executor = SubprocessExecutor::new(&config.execution).with_workdir(root);
    let evaluation = check_artifact(
        task,
        &prepared,
        &store,
        &executor,
        config.numeric_tolerance,
    )?;
    print_result(evaluation.kind, evaluation.diagnostic.as_deref());
    Ok(if evaluation.passed() {
        exit_codes::OK
    } else {
        exit_codes::EXHAUSTED
    })
}

fn artifact_store(root: &Path, config: &ParsegenConfig) -> ArtifactStore {
    ArtifactStore::new(
        root.join(&config.artifact.dir),
        config.artifact.extension.clone(),
    )
}

fn print_event(event: &AttemptEvent<'_>) {
    match event {
        AttemptEvent::Started { attempt, .. } => {
            println!("Attempt {attempt} to generate parser...");
        }
        AttemptEvent::Saved { path, .. } => println!("Saved parser to {}", path.display()),
        AttemptEvent::Finished(AttemptRecord {
            kind, diagnostic, ..
        }) => print_result(*kind, diagnostic.as_deref()),
    }
}

fn print_result(kind: AttemptKind, diagnostic: Option<&str>) {
    let diagnostic = diagnostic.unwrap_or_default();
    match kind {
        AttemptKind::Match => println!("Success! Parser works perfectly!"),
        AttemptKind::Mismatch => println!("{diagnostic}"),
        AttemptKind::ExecutionFailed | AttemptKind::GenerationFailed => {
            println!("Error: {diagnostic}");
        }
    }
}
