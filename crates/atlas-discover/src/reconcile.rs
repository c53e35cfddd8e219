//! Inventory reconciliation.
//!
//! Applies one completed fan-out's facts to the inventory table of a
//! domain. The pass is not transactional as a whole: each row is its own
//! statement and the next pass repairs anything a crash left behind.

use chrono::Utc;

use atlas_core::{ContainerKey, Facts, InventoryDomain, Scope};
use atlas_inventory::InventoryStore;

use crate::error::Result;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub marked_offline: u64,
    pub upserted: usize,
    pub failed: usize,
    pub deleted: u64,
}

impl ReconcileSummary {
    /// Fold another pass into this one.
    pub fn absorb(&mut self, other: &ReconcileSummary) {
        self.marked_offline += other.marked_offline;
        self.upserted += other.upserted;
        self.failed += other.failed;
        self.deleted += other.deleted;
    }
}

/// Merge `facts` into the `domain` table.
///
/// LAN hosts inside `scope` are marked offline before any upsert, so rows
/// not reconfirmed end the pass offline. Container rows absent from `facts`
/// are deleted, except those of containers `scope` excludes
/// (`Scope::AllExcept` of container ids). Upserts apply in order, so a
/// later fact for the same key wins.
///
/// Only an unreachable store fails the call; row errors are logged and
/// counted.
pub async fn reconcile(
    store: &InventoryStore,
    domain: InventoryDomain,
    scope: &Scope,
    facts: &[Facts],
) -> Result<ReconcileSummary> {
    store.ping().await?;

    let mut summary = ReconcileSummary::default();
    let now = Utc::now();

    if domain.marks_offline_first() {
        summary.marked_offline = store.mark_hosts_offline(scope).await?;
        tracing::debug!(domain = %domain, scope = ?scope, rows = summary.marked_offline, "Marked offline");
    }

    for fact in facts {
        let written = match domain {
            InventoryDomain::LanHosts => store.upsert_host(fact, now).await,
            InventoryDomain::ContainerHosts => store.upsert_container(fact, now).await,
        };
        match written {
            Ok(()) => summary.upserted += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(
                    domain = %domain,
                    address = %fact.address,
                    container_id = fact.container_id.as_deref().unwrap_or(""),
                    error = %e,
                    "Upsert failed"
                );
            }
        }
    }

    if domain.deletes_vanished() {
        summary.deleted = delete_vanished(store, scope, facts).await;
    }

    tracing::info!(
        domain = %domain,
        marked_offline = summary.marked_offline,
        upserted = summary.upserted,
        failed = summary.failed,
        deleted = summary.deleted,
        "Reconciliation complete"
    );
    Ok(summary)
}

async fn delete_vanished(store: &InventoryStore, scope: &Scope, facts: &[Facts]) -> u64 {
    let live: Vec<ContainerKey> = facts.iter().filter_map(Facts::container_key).collect();
    if live.is_empty() {
        tracing::info!("No container facts this pass, skipping deletion");
        return 0;
    }

    let retained: &[String] = match scope {
        Scope::AllExcept(ids) => ids,
        Scope::All | Scope::Interface(_) | Scope::Interfaces(_) => &[],
    };

    match store.delete_vanished_containers(&live, retained).await {
        Ok(deleted) => deleted,
        Err(e) => {
            tracing::warn!(error = %e, "Deleting vanished containers failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use atlas_core::OnlineStatus;

    use super::*;

    async fn fresh_store() -> InventoryStore {
        let store = InventoryStore::connect_in_memory().await.unwrap();
        store.initialize_schema().await.unwrap();
        store
    }

    fn host_with_os(address: &str, os: &str) -> Facts {
        Facts {
            os_details: Some(os.to_string()),
            ..Facts::host(address, "eth0", "LAN")
        }
    }

    #[tokio::test]
    async fn test_later_fact_for_same_key_wins() {
        let store = fresh_store().await;
        let facts = vec![
            host_with_os("10.0.0.5", "first"),
            host_with_os("10.0.0.5", "second"),
        ];

        let summary = reconcile(&store, InventoryDomain::LanHosts, &Scope::All, &facts)
            .await
            .unwrap();
        assert_eq!(summary.upserted, 2);
        assert_eq!(summary.failed, 0);

        let rows = store.list_hosts().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].os_details, "second");
        assert_eq!(rows[0].online_status, OnlineStatus::Online);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_a_setup_error() {
        let store = fresh_store().await;
        store.close().await;

        let err = reconcile(
            &store,
            InventoryDomain::LanHosts,
            &Scope::All,
            &[Facts::host("10.0.0.5", "eth0", "LAN")],
        )
        .await
        .unwrap_err();
        assert!(err.is_setup());
    }

    #[tokio::test]
    async fn test_row_errors_are_counted_not_fatal() {
        let store = fresh_store().await;
        let mut orphan = Facts::container("abc", "running", "bridge");
        orphan.container_id = None;
        let facts = vec![orphan, Facts::container("def", "running", "bridge")];

        let summary = reconcile(
            &store,
            InventoryDomain::ContainerHosts,
            &Scope::AllExcept(Vec::new()),
            &facts,
        )
        .await
        .unwrap();
        assert_eq!(summary.upserted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.list_containers().await.unwrap().len(), 1);
    }

    #[test]
    fn test_summary_absorb() {
        let mut total = ReconcileSummary {
            marked_offline: 2,
            upserted: 3,
            failed: 0,
            deleted: 0,
        };
        total.absorb(&ReconcileSummary {
            marked_offline: 1,
            upserted: 4,
            failed: 1,
            deleted: 2,
        });
        assert_eq!(
            total,
            ReconcileSummary {
                marked_offline: 3,
                upserted: 7,
                failed: 1,
                deleted: 2,
            }
        );
    }
}
