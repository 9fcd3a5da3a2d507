//! Ordered, stable-identity stateful workload running the Mongo image
//! (spec.md §4.4). One pod per replica, each with its own persistent volume
//! claim templated from the cluster's storage sizing.

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ObjectFieldSelector, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, ResourceRequirements, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

use crate::error::ReconcileError;
use crate::k8s_gateway::K8sGateway;
use crate::model::ClusterSpec;
use operator_api::consts::{MONGO_IMAGE, MONGO_PORT};
use operator_api::labels::OwnerLabels;

use super::{clean_orphans_of, get_then_upsert, SubResourceReconciler};

const MONGO_CONTAINER_NAME: &str = "mongodb";

pub struct WorkloadReconciler;

impl WorkloadReconciler {
    fn mongod_command(spec: &ClusterSpec) -> Vec<String> {
        let mut command = vec![
            "mongod".to_owned(),
            "--replSet".to_owned(),
            spec.name.clone(),
            "--bind_ip".to_owned(),
            "0.0.0.0".to_owned(),
            "--smallfiles".to_owned(),
            "--noprealloc".to_owned(),
        ];
        if let Some(cache_size) = &spec.container.wired_tiger_cache_size {
            command.push("--wiredTigerCacheSizeGB".to_owned());
            command.push(cache_size.clone());
        }
        command
    }

    fn desired(spec: &ClusterSpec) -> StatefulSet {
        let labels = OwnerLabels::new(&spec.name).to_map();

        let mut resource_limits = BTreeMap::new();
        let _ = resource_limits.insert("cpu".to_owned(), Quantity(spec.container.cpu_limit.clone()));
        let _ = resource_limits.insert("memory".to_owned(), Quantity(spec.container.memory_limit.clone()));
        let mut resource_requests = BTreeMap::new();
        let _ = resource_requests.insert("cpu".to_owned(), Quantity(spec.container.cpu_request.clone()));
        let _ = resource_requests.insert("memory".to_owned(), Quantity(spec.container.memory_request.clone()));

        let container = Container {
            name: MONGO_CONTAINER_NAME.to_owned(),
            image: Some(MONGO_IMAGE.to_owned()),
            command: Some(Self::mongod_command(spec)),
            env: Some(vec![EnvVar {
                name: "POD_IP".to_owned(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        api_version: Some("v1".to_owned()),
                        field_path: "status.podIP".to_owned(),
                    }),
                    ..EnvVarSource::default()
                }),
                ..EnvVar::default()
            }]),
            ports: Some(vec![ContainerPort {
                name: Some(MONGO_CONTAINER_NAME.to_owned()),
                container_port: MONGO_PORT,
                protocol: Some("TCP".to_owned()),
                ..ContainerPort::default()
            }]),
            volume_mounts: Some(vec![VolumeMount {
                name: spec.storage.name.clone(),
                mount_path: spec.storage.mount_path.clone(),
                ..VolumeMount::default()
            }]),
            resources: Some(ResourceRequirements {
                limits: Some(resource_limits),
                requests: Some(resource_requests),
                ..ResourceRequirements::default()
            }),
            ..Container::default()
        };

        let volume_claim_template = PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(spec.storage.name.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_owned()]),
                storage_class_name: spec.storage.class_name.clone(),
                resources: Some(ResourceRequirements {
                    requests: Some(BTreeMap::from([("storage".to_owned(), Quantity(spec.storage.size.clone()))])),
                    ..ResourceRequirements::default()
                }),
                ..PersistentVolumeClaimSpec::default()
            }),
            ..PersistentVolumeClaim::default()
        };

        StatefulSet {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                namespace: Some(spec.namespace.clone()),
                labels: Some(labels.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(spec.replicas),
                service_name: spec.name.clone(),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    match_expressions: None,
                },
                volume_claim_templates: Some(vec![volume_claim_template]),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        ..PodSpec::default()
                    }),
                },
                ..StatefulSetSpec::default()
            }),
            ..StatefulSet::default()
        }
    }
}

#[async_trait::async_trait]
impl SubResourceReconciler for WorkloadReconciler {
    fn kind(&self) -> &'static str {
        "StatefulSet"
    }

    async fn reconcile(&self, k8s: &K8sGateway, spec: &ClusterSpec) -> Result<(), ReconcileError> {
        get_then_upsert::<StatefulSet>(k8s, &spec.name, &Self::desired(spec)).await
    }

    async fn clean_orphans(&self, k8s: &K8sGateway) -> Result<(), ReconcileError> {
        clean_orphans_of::<StatefulSet>(k8s, |resource_name| resource_name.to_owned()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContainerSizing, StorageSizing};

    fn sample_spec() -> ClusterSpec {
        ClusterSpec {
            name: "mongo-cluster".to_owned(),
            namespace: "default".to_owned(),
            resource_version: "1".to_owned(),
            replicas: 3,
            container: ContainerSizing {
                cpu_limit: "100m".to_owned(),
                cpu_request: "100m".to_owned(),
                memory_limit: "64Mi".to_owned(),
                memory_request: "64Mi".to_owned(),
                wired_tiger_cache_size: Some("2".to_owned()),
            },
            storage: StorageSizing {
                name: "mongo-storage".to_owned(),
                size: "30Gi".to_owned(),
                mount_path: "/data/db".to_owned(),
                class_name: None,
            },
            backup: None,
        }
    }

    #[test]
    fn mongod_command_includes_wired_tiger_flag_when_set() {
        let command = WorkloadReconciler::mongod_command(&sample_spec());
        assert!(command.contains(&"--wiredTigerCacheSizeGB".to_owned()));
        assert!(command.contains(&"2".to_owned()));
    }

    #[test]
    fn desired_statefulset_uses_configured_replica_count() {
        let statefulset = WorkloadReconciler::desired(&sample_spec());
        assert_eq!(statefulset.spec.unwrap().replicas, Some(3));
    }
}
