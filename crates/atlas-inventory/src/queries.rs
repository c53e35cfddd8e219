//! Read operations for the inventory tables.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use atlas_core::{ExternalNetworkRecord, InventoryRecord, OnlineStatus, SchedulerState};

use crate::client::{InventoryStore, StoreError};

const HOST_COLUMNS: &str = "id, ip, name, os_details, mac_address, open_ports, next_hop, \
                            network_name, interface_name, last_seen, online_status";

const CONTAINER_COLUMNS: &str = "id, container_id, container_state, ip, name, os_details, \
                                 mac_address, open_ports, next_hop, network_name, last_seen, \
                                 online_status";

impl InventoryStore {
    /// List every LAN host row, ordered by address then interface.
    pub async fn list_hosts(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts ORDER BY ip, interface_name");
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        rows.iter().map(host_from_row).collect()
    }

    /// Fetch one LAN host by its natural key.
    pub async fn get_host(
        &self,
        address: &str,
        interface_name: &str,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE ip = ?1 AND interface_name = ?2");
        let row = sqlx::query(&sql)
            .bind(address)
            .bind(interface_name)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(host_from_row).transpose()
    }

    /// List every container row, ordered by container id then network.
    pub async fn list_containers(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let sql = format!(
            "SELECT {CONTAINER_COLUMNS} FROM docker_hosts ORDER BY container_id, network_name"
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        rows.iter().map(container_from_row).collect()
    }

    /// List every recorded egress IP.
    pub async fn list_external_networks(&self) -> Result<Vec<ExternalNetworkRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT public_ip, provider, location, last_seen FROM external_networks
             ORDER BY public_ip",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<ExternalNetworkRecord, StoreError> {
                Ok(ExternalNetworkRecord {
                    public_ip: row.try_get("public_ip")?,
                    provider: row.try_get("provider")?,
                    location: row.try_get("location")?,
                    last_seen: row.try_get("last_seen")?,
                })
            })
            .collect()
    }

    /// Read the scheduler configuration row.
    pub async fn scheduler_state(&self) -> Result<SchedulerState, StoreError> {
        let row = sqlx::query(
            "SELECT scan_interval_minutes, enabled, last_run FROM scheduler_config WHERE id = 1",
        )
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| StoreError::NotFound("scheduler_config row".to_string()))?;

        let minutes: i64 = row.try_get("scan_interval_minutes")?;
        let scan_interval_minutes = u32::try_from(minutes)
            .map_err(|_| StoreError::InvalidValue(format!("scan interval {minutes}")))?;
        let last_run: Option<DateTime<Utc>> = row.try_get("last_run")?;

        Ok(SchedulerState {
            scan_interval_minutes,
            enabled: row.try_get("enabled")?,
            last_run,
        })
    }
}

fn parse_status(row: &SqliteRow) -> Result<OnlineStatus, StoreError> {
    let raw: String = row.try_get("online_status")?;
    raw.parse()
        .map_err(|e: atlas_core::CoreError| StoreError::InvalidValue(e.to_string()))
}

fn host_from_row(row: &SqliteRow) -> Result<InventoryRecord, StoreError> {
    Ok(InventoryRecord {
        id: row.try_get("id")?,
        address: row.try_get("ip")?,
        display_name: row.try_get("name")?,
        os_details: row.try_get("os_details")?,
        mac_address: row.try_get("mac_address")?,
        open_ports: row.try_get("open_ports")?,
        next_hop: row.try_get("next_hop")?,
        network_name: row.try_get("network_name")?,
        interface_name: row.try_get("interface_name")?,
        container_id: None,
        container_state: None,
        online_status: parse_status(row)?,
        last_seen: row.try_get("last_seen")?,
    })
}

fn container_from_row(row: &SqliteRow) -> Result<InventoryRecord, StoreError> {
    Ok(InventoryRecord {
        id: row.try_get("id")?,
        address: row.try_get("ip")?,
        display_name: row.try_get("name")?,
        os_details: row.try_get("os_details")?,
        mac_address: row.try_get("mac_address")?,
        open_ports: row.try_get("open_ports")?,
        next_hop: row.try_get("next_hop")?,
        network_name: row.try_get("network_name")?,
        interface_name: String::new(),
        container_id: Some(row.try_get("container_id")?),
        container_state: row.try_get("container_state")?,
        online_status: parse_status(row)?,
        last_seen: row.try_get("last_seen")?,
    })
}
