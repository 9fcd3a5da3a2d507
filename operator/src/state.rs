//! The ephemeral, per-process caches described in spec.md §3, bundled onto
//! one non-global value per the re-architecture note in spec.md §9.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::model::ClusterKey;

/// `VersionCache` — skips deep re-reconciliation when a cluster's spec has
/// not changed since the last sweep.
#[derive(Debug, Default)]
pub struct VersionCache(Mutex<HashMap<ClusterKey, String>>);

impl VersionCache {
    #[must_use]
    pub fn is_current(&self, key: &ClusterKey, resource_version: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(key)
            .is_some_and(|seen| seen == resource_version)
    }

    pub fn record(&self, key: ClusterKey, resource_version: String) {
        let _prev = self
            .0
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(key, resource_version);
    }

    /// Drops every cluster not present in `live_keys`, called after a
    /// garbage sweep so a recreated cluster with the same name is treated
    /// as unseen.
    pub fn retain_only(&self, live_keys: &HashSet<ClusterKey>) {
        self.0
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .retain(|key, _| live_keys.contains(key));
    }
}

/// `BackupBookkeeping` — last successful backup timestamp per cluster.
#[derive(Debug, Default)]
pub struct BackupBookkeeping(Mutex<HashMap<ClusterKey, DateTime<Utc>>>);

impl BackupBookkeeping {
    #[must_use]
    pub fn last(&self, key: &ClusterKey) -> Option<DateTime<Utc>> {
        self.0.lock().unwrap_or_else(|poison| poison.into_inner()).get(key).copied()
    }

    pub fn record(&self, key: ClusterKey, at: DateTime<Utc>) {
        let _prev = self
            .0
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(key, at);
    }
}

/// `RestoreLedger` — clusters whose one-shot restore has already fired in
/// this process.
#[derive(Debug, Default)]
pub struct RestoreLedger(Mutex<HashSet<ClusterKey>>);

impl RestoreLedger {
    /// Atomically checks whether `key` has already fired and, if not, marks
    /// it as fired. Returns `true` when this call is the one that claims it.
    #[must_use]
    pub fn claim(&self, key: &ClusterKey) -> bool {
        let mut guard = self.0.lock().unwrap_or_else(|poison| poison.into_inner());
        if guard.contains(key) {
            false
        } else {
            let _inserted = guard.insert(key.clone());
            true
        }
    }
}

/// Last replica-set config `version` applied per cluster, used to bump the
/// version on `Reconfigure` (resolution of the Open Question in spec.md §9).
#[derive(Debug, Default)]
pub struct ReplicaSetVersions(Mutex<HashMap<ClusterKey, u32>>);

impl ReplicaSetVersions {
    #[must_use]
    pub fn current(&self, key: &ClusterKey) -> u32 {
        self.0
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(key)
            .copied()
            .unwrap_or(1)
    }

    pub fn record(&self, key: ClusterKey, version: u32) {
        let _prev = self
            .0
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(key, version);
    }
}

/// Bundle of all ephemeral caches, owned by the supervisor and shared with
/// both workers via `Arc`.
#[derive(Debug, Default)]
pub struct Caches {
    pub versions: VersionCache,
    pub backups: BackupBookkeeping,
    pub restores: RestoreLedger,
    pub replica_set_versions: ReplicaSetVersions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_ledger_fires_once() {
        let ledger = RestoreLedger::default();
        let key = ("mongo-cluster".to_owned(), "default".to_owned());
        assert!(ledger.claim(&key));
        assert!(!ledger.claim(&key));
    }

    #[test]
    fn version_cache_round_trips() {
        let cache = VersionCache::default();
        let key = ("mongo-cluster".to_owned(), "default".to_owned());
        assert!(!cache.is_current(&key, "1"));
        cache.record(key.clone(), "1".to_owned());
        assert!(cache.is_current(&key, "1"));
        assert!(!cache.is_current(&key, "2"));
    }
}
