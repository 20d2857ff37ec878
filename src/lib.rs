//! Object File Dependency Analyzer.
//!
//! This library provides the core components of the `nmdep` tool.
//! It is organized into several modules:
//! - `config`: CLI configuration.
//! - `scan`: symbol listing scanner.
//! - `graph`: the symbol/object database.
//! - `walk`: dependency traversal.
//! - `link`: link set construction and teardown.
//! - `report`: trace reports and the linker script emitter.
//! - `interactive`: the query REPL.

pub mod config;
pub mod graph;
pub mod interactive;
pub mod link;
pub mod report;
pub mod scan;
pub mod walk;
