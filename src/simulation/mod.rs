//! Synthetic ledgers for demos, benchmarks and the `generate` command.

pub mod generator;

pub use generator::{generate_snapshot, LedgerProfile};
