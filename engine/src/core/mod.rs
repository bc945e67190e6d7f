//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! tables, rule sets, and attempt results and return deterministic outputs
//! suitable for tests.

pub mod classify;
pub mod feedback;
pub mod rules;
pub mod schema;
pub mod state;
pub mod summary;
pub mod table;
pub mod types;
pub mod validator;
