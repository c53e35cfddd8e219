//! atlas-inventory: SQLite store for discovered hosts and containers.
//!
//! This crate is the single mutation point for the inventory tables.
//! All reads and writes flow through `InventoryStore` so that upserts are
//! always keyed by the natural key and every statement is parameterized.

pub mod client;
pub mod mutations;
pub mod queries;
pub mod schema;

pub use client::{InventoryStore, StoreConfig, StoreError};
