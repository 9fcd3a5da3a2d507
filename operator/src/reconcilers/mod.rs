//! C5: one reconciler per owned sub-resource kind. Each owns idempotent
//! create-or-update (`reconcile`) and orphan cleanup (`clean_orphans`)
//! against a single `ClusterSpec`, per spec.md §4.4.

mod admin_secret;
mod service;
mod workload;

pub use admin_secret::AdminSecretReconciler;
pub use service::ServiceReconciler;
pub use workload::WorkloadReconciler;

use std::fmt::Debug;

use k8s_openapi::Resource as K8sResource;
use kube::api::ResourceExt;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::crd::MongoClusterConfiguration;
use crate::error::ReconcileError;
use crate::k8s_gateway::K8sGateway;
use crate::model::ClusterSpec;
use operator_api::labels::OwnerLabels;

/// One sub-resource reconciler, dispatched in the fixed order spec.md §4.5
/// requires (`Service -> Workload -> AdminSecret`).
#[async_trait::async_trait]
pub trait SubResourceReconciler: Send + Sync {
    /// Kind name, used only for logging.
    fn kind(&self) -> &'static str;

    async fn reconcile(&self, k8s: &K8sGateway, spec: &ClusterSpec) -> Result<(), ReconcileError>;

    async fn clean_orphans(&self, k8s: &K8sGateway) -> Result<(), ReconcileError>;
}

/// `Reconcile(spec)` steps 1-3 of spec.md §4.4, generic over the owned
/// resource kind: get, then create-or-update, then log the observed
/// resource version. Step 4 (non-404 aborts only this cluster) falls out of
/// `?` propagation at the call site.
pub(crate) async fn get_then_upsert<K>(k8s: &K8sGateway, name: &str, desired: &K) -> Result<(), ReconcileError>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + K8sResource + Clone + DeserializeOwned + Debug + Serialize,
    <K as Resource>::DynamicType: Default,
{
    let observed = match k8s.get::<K>(name).await? {
        Some(_) => k8s.update(name, desired).await?,
        None => match k8s.create(desired).await? {
            Some(created) => created,
            None => return Ok(()),
        },
    };
    debug!(name, version = ?observed.resource_version(), kind = K::KIND, "reconciled sub-resource");
    Ok(())
}

/// `CleanOrphans()` steps 1-3 of spec.md §4.4: list every labeled resource,
/// derive its owning cluster name, delete it if that cluster is no longer
/// observable.
pub(crate) async fn clean_orphans_of<K>(
    k8s: &K8sGateway,
    cluster_name_of: impl Fn(&str) -> String,
) -> Result<(), ReconcileError>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    let items = k8s.list::<K>(&OwnerLabels::operator_selector()).await?;
    for item in items {
        let Some(resource_name) = item.meta().name.clone() else {
            continue;
        };
        let cluster_name = cluster_name_of(&resource_name);
        let owner = k8s.get::<MongoClusterConfiguration>(&cluster_name).await?;
        if owner.is_none() {
            debug!(resource_name, cluster_name, "deleting orphaned sub-resource");
            k8s.delete::<K>(&resource_name).await?;
        }
    }
    Ok(())
}
