//! Inventory schema creation.
//!
//! Every statement is idempotent so `initialize_schema` can run on each
//! startup. The reconciler relies on the unique indexes below: upserts are
//! `ON CONFLICT` against them.

use crate::client::{InventoryStore, StoreError};

/// Default scheduler interval seeded into a fresh database.
pub const DEFAULT_SCAN_INTERVAL_MINUTES: u32 = 60;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS hosts (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        ip             TEXT NOT NULL,
        name           TEXT NOT NULL DEFAULT 'NoName',
        os_details     TEXT NOT NULL DEFAULT 'Unknown',
        mac_address    TEXT NOT NULL DEFAULT 'Unknown',
        open_ports     TEXT NOT NULL DEFAULT 'Unknown',
        next_hop       TEXT NOT NULL DEFAULT '',
        network_name   TEXT NOT NULL DEFAULT '',
        interface_name TEXT NOT NULL DEFAULT '',
        last_seen      TEXT NOT NULL,
        online_status  TEXT NOT NULL DEFAULT 'online'
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_hosts_ip_interface ON hosts(ip, interface_name)",
    r#"
    CREATE TABLE IF NOT EXISTS docker_hosts (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        container_id    TEXT NOT NULL,
        network_name    TEXT NOT NULL DEFAULT '',
        ip              TEXT NOT NULL DEFAULT '',
        name            TEXT NOT NULL DEFAULT 'NoName',
        os_details      TEXT NOT NULL DEFAULT 'Unknown',
        mac_address     TEXT NOT NULL DEFAULT 'Unknown',
        open_ports      TEXT NOT NULL DEFAULT 'Unknown',
        next_hop        TEXT NOT NULL DEFAULT '',
        container_state TEXT,
        last_seen       TEXT NOT NULL,
        online_status   TEXT NOT NULL DEFAULT 'online'
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_docker_hosts_container ON docker_hosts(container_id, network_name)",
    r#"
    CREATE TABLE IF NOT EXISTS external_networks (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        public_ip TEXT NOT NULL UNIQUE,
        provider  TEXT,
        location  TEXT,
        last_seen TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scheduler_config (
        id                    INTEGER PRIMARY KEY CHECK (id = 1),
        scan_interval_minutes INTEGER NOT NULL,
        enabled               INTEGER NOT NULL DEFAULT 1,
        last_run              TEXT,
        updated_at            TEXT
    )
    "#,
];

impl InventoryStore {
    /// Create the inventory tables and seed the scheduler configuration row.
    pub async fn initialize_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(self.pool()).await?;
        }

        sqlx::query(
            "INSERT OR IGNORE INTO scheduler_config (id, scan_interval_minutes, enabled)
             VALUES (1, ?1, 1)",
        )
        .bind(i64::from(DEFAULT_SCAN_INTERVAL_MINUTES))
        .execute(self.pool())
        .await?;

        tracing::debug!("Inventory schema initialized");
        Ok(())
    }
}
