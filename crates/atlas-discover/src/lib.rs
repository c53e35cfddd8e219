//! atlas-discover: discovery and reconciliation engine for the Atlas
//! inventory.
//!
//! Sweeps local networks with nmap and inspects Docker containers, fans the
//! probes out with bounded concurrency, and reconciles the results into the
//! SQLite inventory on a schedule.

pub mod config;
pub mod docker;
pub mod egress;
pub mod error;
pub mod fanout;
pub mod interfaces;
pub mod names;
pub mod nmap_xml;
pub mod orchestrator;
pub mod probe;
mod process;
pub mod reconcile;
pub mod scanner;
pub mod scheduler;

pub use error::{DiscoverError, Result};
pub use orchestrator::{Probes, ScanMode, ScanOrchestrator, ScanReport};
pub use scheduler::ScanScheduler;
