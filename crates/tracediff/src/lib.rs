//! Differential trace oracle for EVM implementations.
//!
//! Runs several independently-implemented EVM binaries against the same
//! state test, rewrites each one's JSON opcode trace into a single canonical
//! schema and compares the canonical streams line by line. A divergence
//! between two conforming interpreters points at a consensus bug in one of
//! them.

pub mod canonical;
pub mod compare;
pub mod config;
pub mod evms;
pub mod opcodes;
pub mod report;
pub mod runner;
pub mod schema;

#[cfg(test)]
mod tests;
