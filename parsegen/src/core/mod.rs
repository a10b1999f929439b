//! Deterministic, pure logic shared by the generation loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod fences;
pub mod state;
pub mod table;
pub mod target;
pub mod validator;
