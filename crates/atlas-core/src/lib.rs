//! atlas-core: Shared types and error handling for the Atlas network scanner.
//!
//! This crate provides the foundational types used across all Atlas components:
//! - Probe output (`Facts`, `PortObservation`) and scan targets
//! - Persisted inventory rows and their natural keys
//! - Reconciliation scopes and inventory domains
//! - Scheduler state

pub mod error;
pub mod types;

pub use error::CoreError;
pub use types::{
    ContainerKey, ExternalNetworkRecord, Facts, HostKey, InventoryDomain, InventoryRecord,
    NetworkInterface, NetworkTarget, OnlineStatus, PortObservation, PortState, SchedulerState,
    Scope,
};
