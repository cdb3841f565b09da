//! Git CLI wrapper for MergeMiner.
//!
//! All repository access goes through [`GitRunner`]; no other module invokes
//! git directly, so every mutation site is auditable.

pub mod parser;
pub mod runner;

pub use runner::{CommandOutput, GitRunner};
