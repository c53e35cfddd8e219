//! Write operations for the inventory tables.
//!
//! All row writes use `INSERT .. ON CONFLICT DO UPDATE` (upsert) semantics
//! against the natural-key indexes so re-discovery is idempotent. Columns a
//! probe did not observe are bound as NULL and keep their stored value.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use atlas_core::types::NO_NAME;
use atlas_core::{ContainerKey, Facts, Scope};

use crate::client::{InventoryStore, StoreError};

impl InventoryStore {
    // ── LAN Hosts ────────────────────────────────────────────────

    /// Mark every LAN host within `scope` offline in a single statement.
    ///
    /// Returns the number of rows touched. An empty interface list touches
    /// nothing; `Scope::AllExcept` names containers and is rejected.
    pub async fn mark_hosts_offline(&self, scope: &Scope) -> Result<u64, StoreError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("UPDATE hosts SET online_status = 'offline'");

        match scope {
            Scope::All => {}
            Scope::Interface(name) => {
                builder.push(" WHERE interface_name = ");
                builder.push_bind(name.as_str());
            }
            Scope::Interfaces(names) if names.is_empty() => return Ok(0),
            Scope::Interfaces(names) => {
                builder.push(" WHERE interface_name IN (");
                let mut list = builder.separated(", ");
                for name in names {
                    list.push_bind(name.as_str());
                }
                list.push_unseparated(")");
            }
            Scope::AllExcept(_) => {
                return Err(StoreError::InvalidValue(
                    "container scope used to mark LAN hosts offline".to_string(),
                ))
            }
        }

        let result = builder.build().execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    /// Upsert a LAN host keyed by `(ip, interface_name)` and mark it online.
    pub async fn upsert_host(&self, facts: &Facts, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO hosts (ip, name, os_details, mac_address, open_ports, next_hop,
                                network_name, interface_name, last_seen, online_status)
             VALUES (?1, ?2, COALESCE(?3, 'Unknown'), COALESCE(?4, 'Unknown'),
                     COALESCE(?5, 'Unknown'), COALESCE(?6, ''), ?7, ?8, ?9, 'online')
             ON CONFLICT(ip, interface_name) DO UPDATE SET
               name = COALESCE(NULLIF(?2, ?10), hosts.name),
               os_details = COALESCE(?3, hosts.os_details),
               mac_address = COALESCE(?4, hosts.mac_address),
               open_ports = COALESCE(?5, hosts.open_ports),
               next_hop = COALESCE(?6, hosts.next_hop),
               network_name = excluded.network_name,
               last_seen = excluded.last_seen,
               online_status = 'online'",
        )
        .bind(facts.address.as_str())
        .bind(facts.display_name.as_str())
        .bind(facts.os_details.as_deref())
        .bind(facts.mac_address.as_deref())
        .bind(facts.ports_column())
        .bind(facts.next_hop.as_deref())
        .bind(facts.network_name.as_str())
        .bind(facts.interface_name.as_str())
        .bind(now)
        .bind(NO_NAME)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    // ── Containers ───────────────────────────────────────────────

    /// Upsert one container network attachment keyed by
    /// `(container_id, network_name)`.
    ///
    /// The online status comes from the container's runtime state.
    pub async fn upsert_container(
        &self,
        facts: &Facts,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let container_id = facts.container_id.as_deref().ok_or_else(|| {
            StoreError::InvalidValue(format!(
                "container facts for '{}' carry no container id",
                facts.display_name
            ))
        })?;

        sqlx::query(
            "INSERT INTO docker_hosts (container_id, network_name, ip, name, os_details,
                                       mac_address, open_ports, next_hop, container_state,
                                       last_seen, online_status)
             VALUES (?1, ?2, ?3, ?4, COALESCE(?5, 'Unknown'), COALESCE(?6, 'Unknown'),
                     COALESCE(?7, 'Unknown'), COALESCE(?8, ''), ?9, ?10, ?11)
             ON CONFLICT(container_id, network_name) DO UPDATE SET
               ip = excluded.ip,
               name = excluded.name,
               os_details = COALESCE(?5, docker_hosts.os_details),
               mac_address = COALESCE(?6, docker_hosts.mac_address),
               open_ports = COALESCE(?7, docker_hosts.open_ports),
               next_hop = COALESCE(?8, docker_hosts.next_hop),
               container_state = excluded.container_state,
               last_seen = excluded.last_seen,
               online_status = excluded.online_status",
        )
        .bind(container_id)
        .bind(facts.network_name.as_str())
        .bind(facts.address.as_str())
        .bind(facts.display_name.as_str())
        .bind(facts.os_details.as_deref())
        .bind(facts.mac_address.as_deref())
        .bind(facts.ports_column())
        .bind(facts.next_hop.as_deref())
        .bind(facts.container_state.as_deref())
        .bind(now)
        .bind(facts.observed_status().as_str())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Delete container rows whose key is not in `live`, sparing every row
    /// of the containers listed in `retained_ids`.
    ///
    /// An empty `live` set deletes nothing: a pass that confirmed no keys is
    /// never allowed to empty the table.
    pub async fn delete_vanished_containers(
        &self,
        live: &[ContainerKey],
        retained_ids: &[String],
    ) -> Result<u64, StoreError> {
        if live.is_empty() {
            tracing::warn!("No live container keys supplied, skipping deletion");
            return Ok(0);
        }

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("DELETE FROM docker_hosts WHERE (container_id, network_name) NOT IN (");
        builder.push_values(live, |mut row, key| {
            row.push_bind(key.container_id.as_str())
                .push_bind(key.network_name.as_str());
        });
        builder.push(")");

        if !retained_ids.is_empty() {
            builder.push(" AND container_id NOT IN (");
            let mut list = builder.separated(", ");
            for id in retained_ids {
                list.push_bind(id.as_str());
            }
            list.push_unseparated(")");
        }

        let result = builder.build().execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    // ── External Networks ────────────────────────────────────────

    /// Record an egress-IP observation: insert if absent, always refresh
    /// `last_seen`.
    pub async fn upsert_external_network(
        &self,
        public_ip: &str,
        provider: Option<&str>,
        location: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO external_networks (public_ip, provider, location, last_seen)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(public_ip) DO UPDATE SET
               provider = COALESCE(excluded.provider, external_networks.provider),
               location = COALESCE(excluded.location, external_networks.location),
               last_seen = excluded.last_seen",
        )
        .bind(public_ip)
        .bind(provider)
        .bind(location)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    // ── Scheduler ────────────────────────────────────────────────

    /// Overwrite the scheduler interval and enable flag.
    pub async fn update_scheduler_config(
        &self,
        interval_minutes: u32,
        enabled: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO scheduler_config (id, scan_interval_minutes, enabled, updated_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
               scan_interval_minutes = excluded.scan_interval_minutes,
               enabled = excluded.enabled,
               updated_at = excluded.updated_at",
        )
        .bind(i64::from(interval_minutes))
        .bind(enabled)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Persist the completion time of a scheduler cycle.
    pub async fn record_scheduler_run(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE scheduler_config SET last_run = ?1 WHERE id = 1")
            .bind(at)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("scheduler_config row".to_string()));
        }
        Ok(())
    }
}
