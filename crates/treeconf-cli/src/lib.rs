//! treeconf CLI library
//!
//! Exposes the CLI entry point so other binaries can embed it.

mod cli;

pub use cli::run;
