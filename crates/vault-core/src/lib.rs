//! Core types and algorithms for the HR vault import pipeline.
//!
//! This crate is deliberately free of database and runtime dependencies.
//! It parses vault documents, reconciles reference identities, orders
//! departments and decides primary contracts and managers. Storage backends
//! (e.g. `vault-store-sqlite`) drive these pieces inside their transactions.

pub mod collect;
pub mod document;
pub mod error;
pub mod identity;
pub mod manager;
pub mod model;
pub mod primary;
pub mod report;
pub mod store;
pub mod topo;

pub use error::{Error, Result};
