//! Stable exit codes for the `parsegen` CLI.

/// The program matched the reference table.
pub const OK: i32 = 0;
/// Setup failed (invalid target, config, missing inputs or credential) or a fatal
/// error aborted the run.
pub const INVALID: i32 = 1;
/// Every attempt failed, or `--check-only` found the stored program wrong.
pub const EXHAUSTED: i32 = 2;
