//! Self-correcting generator of table extraction programs.
//!
//! Given a sample document and the table it should yield, the crate asks a
//! generative model for an extraction program, runs it, compares its output to
//! the expected table, and feeds any failure back into the next attempt until the
//! program matches or the attempt budget is spent. The architecture keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (table equality, validation, fence
//!   stripping, the attempt state machine). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, child processes, the model
//!   service). Isolated behind traits to enable fakes in tests.
//!
//! Orchestration modules ([`task`], [`generator`], [`orchestrator`]) coordinate
//! core logic with I/O to implement the CLI.

pub mod core;
pub mod exit_codes;
pub mod generator;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
