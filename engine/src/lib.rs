//! Self-healing code generation for data classification.
//!
//! Turns a data schema and an ordered rule set into classification code,
//! runs each candidate in isolation, validates what it produced, and feeds
//! failures back to the generator until a candidate passes or the attempt
//! budget runs out. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state machine, validation,
//!   feedback, classification rules, summaries). No I/O, fully testable in
//!   isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, processes, the
//!   generator backends). Isolated behind traits to enable fakes in tests.
//!
//! Orchestration modules ([`compile`], [`runtime`]) coordinate core logic with
//! I/O to implement CLI commands.

pub mod compile;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
