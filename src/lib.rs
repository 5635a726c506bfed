//! QLE - Query lineage and artifact catalog for ad hoc analytical SQL
//!
//! This library records every statement run through it and keeps:
//! - A ledger of executions (text, time, runtime, row count or failure)
//! - The tables each successful statement reads
//! - Derivation edges between statements
//! - Pinned artifacts: statements materialized as tables
//!
//! The catalog lives in SQLite, next to the data the statements query.

pub mod catalog;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod extract;
pub mod format;
pub mod lineage;
pub mod server;
pub mod session;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use lineage::Lineage;
