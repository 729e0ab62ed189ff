//! Backup and restore orchestration engine.
//!
//! Snapshots named data-store files and file trees into a single
//! verifiable archive, tracks every operation as a durable job record, and
//! reconstructs the original data with conflict-safe overwrite semantics.
//! The HTTP surface that triggers jobs lives elsewhere; this crate is the
//! engine it calls into.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
