//! I/O helpers for engine commands.

pub mod artifact;
pub mod attempt_log;
pub mod config;
pub mod context;
pub mod executor;
pub mod fs_util;
pub mod generator;
pub mod process;
pub mod prompt;
pub mod rules_store;
pub mod script;
pub mod table_io;
pub mod verified_store;
