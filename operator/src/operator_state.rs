//! The single non-global value holding every gateway and ephemeral cache
//! (spec.md §9's re-architecture note), constructed once at startup and
//! shared by both supervisor workers behind an `Arc`.

use crate::k8s_gateway::K8sGateway;
use crate::mongo_gateway::{MongoGateway, ReplicaSetEvent};
use crate::reconcilers::{AdminSecretReconciler, ServiceReconciler, SubResourceReconciler, WorkloadReconciler};
use crate::replicaset::ReplicaSetDriver;
use crate::state::Caches;
use crate::storage_gateway::StorageGateway;
use crate::backup::BackupCoordinator;
use crate::restore::RestoreCoordinator;

pub struct OperatorState {
    pub k8s: K8sGateway,
    pub caches: Caches,
    pub reconcilers: Vec<Box<dyn SubResourceReconciler>>,
    pub replicaset: ReplicaSetDriver,
    pub backup: BackupCoordinator,
    pub restore: RestoreCoordinator,
    pub events_rx: flume::Receiver<ReplicaSetEvent>,
}

impl OperatorState {
    #[must_use]
    pub fn new(k8s: K8sGateway) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        let mongo = MongoGateway::new(events_tx);
        let storage = StorageGateway::new(k8s.clone());

        Self {
            k8s,
            caches: Caches::default(),
            reconcilers: vec![
                Box::new(ServiceReconciler),
                Box::new(WorkloadReconciler),
                Box::new(AdminSecretReconciler),
            ],
            replicaset: ReplicaSetDriver::new(mongo),
            backup: BackupCoordinator::new(storage.clone()),
            restore: RestoreCoordinator::new(storage),
            events_rx,
        }
    }
}
