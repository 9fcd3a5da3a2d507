//! C9: the periodic sweep and garbage sweep, plus the per-cluster
//! reconciliation path shared with the event-driven watch variant
//! (spec.md §4.5).

use std::collections::HashSet;

use tracing::{error, info, warn};

use crate::crd::MongoClusterConfiguration;
use crate::k8s_gateway::Event;
use crate::model::{parse_cluster_spec, ClusterSpec};
use crate::operator_state::OperatorState;

/// `Sweep()`: lists every cluster resource, reconciles each in the fixed
/// order spec.md §4.5 requires, then unconditionally ticks the backup
/// scheduler. A single cluster's failure is logged and does not abort the
/// sweep.
pub async fn sweep(state: &OperatorState) {
    let resources = match state.k8s.list::<MongoClusterConfiguration>("").await {
        Ok(items) => items,
        Err(err) => {
            error!(%err, "failed to list cluster resources, skipping this sweep");
            return;
        }
    };

    let mut live_keys = HashSet::new();
    for resource in &resources {
        let spec = match parse_cluster_spec(resource) {
            Ok(spec) => spec,
            Err(err) => {
                warn!(%err, "skipping malformed cluster resource");
                continue;
            }
        };
        live_keys.insert(spec.key());
        reconcile_cluster(state, &spec, false).await;
    }
    state.caches.versions.retain_only(&live_keys);
}

/// `GarbageSweep()`: runs `CleanOrphans` on every reconciler, order not
/// observable.
pub async fn garbage_sweep(state: &OperatorState) {
    for reconciler in &state.reconcilers {
        if let Err(err) = reconciler.clean_orphans(&state.k8s).await {
            error!(kind = reconciler.kind(), %err, "garbage sweep failed for reconciler");
        }
    }
}

/// One cluster's reconciliation path, shared by the periodic sweep (`force =
/// false`, version-cache-gated) and the watch-driven variant (`force =
/// true`, always re-reconciles sub-resources).
pub async fn reconcile_cluster(state: &OperatorState, spec: &ClusterSpec, force: bool) {
    let key = spec.key();
    let up_to_date = !force && state.caches.versions.is_current(&key, &spec.resource_version);

    'reconcile: {
        if !up_to_date {
            for reconciler in &state.reconcilers {
                if let Err(err) = reconciler.reconcile(&state.k8s, spec).await {
                    error!(
                        cluster = %spec.name, namespace = %spec.namespace, kind = reconciler.kind(), %err,
                        "sub-resource reconciliation failed, aborting this cluster's sweep"
                    );
                    break 'reconcile;
                }
            }
        }

        if let Err(err) = state.replicaset.check_or_create(spec, &state.caches.replica_set_versions).await {
            error!(cluster = %spec.name, namespace = %spec.namespace, %err, "replica-set check/create failed");
            break 'reconcile;
        }

        if !up_to_date {
            if let Err(err) = state.replicaset.create_users_if_needed(&state.k8s, spec).await {
                error!(cluster = %spec.name, namespace = %spec.namespace, %err, "admin user creation failed");
                break 'reconcile;
            }
            state.caches.versions.record(key, spec.resource_version.clone());
        }
    }

    // spec.md §4.5 step 3: the backup tick runs unconditionally, even if
    // sub-resource reconciliation or the replica-set driver failed above.
    if let Err(err) = state.backup.backup_if_needed(spec, &state.caches.backups).await {
        error!(cluster = %spec.name, namespace = %spec.namespace, %err, "backup tick failed");
    }
}

/// Drains every pending `ReplicaSetEvent` published by the driver's
/// event-listener threads, invoking the restore/initiate hand-off exactly
/// once per message (spec.md §9's message-passing re-architecture).
pub async fn drain_replica_set_events(state: &OperatorState) {
    while let Ok(event) = state.events_rx.try_recv() {
        let key = match &event {
            crate::mongo_gateway::ReplicaSetEvent::TopologyReady(key)
            | crate::mongo_gateway::ReplicaSetEvent::AllHostsReady(key) => key.clone(),
        };
        let spec = match crate::replicaset::resolve_spec(&state.k8s, &key).await {
            Ok(Some(spec)) => spec,
            Ok(None) => {
                info!(cluster = %key.0, namespace = %key.1, "replica-set event for a cluster no longer observable, dropping");
                continue;
            }
            Err(err) => {
                error!(cluster = %key.0, namespace = %key.1, %err, "failed to resolve cluster spec for replica-set event");
                continue;
            }
        };

        match event {
            crate::mongo_gateway::ReplicaSetEvent::TopologyReady(_) => {
                if let Err(err) = state.restore.restore_if_needed(&spec, &state.caches.restores).await {
                    error!(cluster = %spec.name, namespace = %spec.namespace, %err, "restore hand-off failed");
                }
            }
            crate::mongo_gateway::ReplicaSetEvent::AllHostsReady(_) => {
                if let Err(err) = state.replicaset.initiate_on_heartbeat(&spec, &state.caches.replica_set_versions).await {
                    error!(cluster = %spec.name, namespace = %spec.namespace, %err, "heartbeat-driven initiate failed");
                }
            }
        }
    }
}

/// The event-driven watch variant: ADDED/MODIFIED force-reconcile the
/// affected cluster; DELETED triggers a full garbage sweep, since the
/// deleted object no longer carries enough information to target a single
/// reconciler (spec.md §4.5).
pub async fn handle_watch_event(state: &OperatorState, event: Event<MongoClusterConfiguration>) {
    match event {
        Event::Added(resource) | Event::Modified(resource) => match parse_cluster_spec(&resource) {
            Ok(spec) => reconcile_cluster(state, &spec, true).await,
            Err(err) => warn!(%err, "dropping malformed cluster resource from watch event"),
        },
        Event::Deleted(resource) => {
            info!(cluster = resource.metadata.name.as_deref().unwrap_or("<unknown>"), "cluster resource deleted, running garbage sweep");
            garbage_sweep(state).await;
        }
    }
}
