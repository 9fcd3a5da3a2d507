//! Headless service exposing port 27017, one A record per pod (spec.md §4.4).

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::error::ReconcileError;
use crate::k8s_gateway::K8sGateway;
use crate::model::ClusterSpec;
use operator_api::consts::MONGO_PORT;
use operator_api::labels::OwnerLabels;

use super::{clean_orphans_of, get_then_upsert, SubResourceReconciler};

pub struct ServiceReconciler;

impl ServiceReconciler {
    fn desired(spec: &ClusterSpec) -> Service {
        let labels = OwnerLabels::new(&spec.name).to_map();
        Service {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                namespace: Some(spec.namespace.clone()),
                labels: Some(labels.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceSpec {
                // the literal string "None", not an absent field: an absent
                // `clusterIP` gets one allocated, which would not be headless.
                cluster_ip: Some("None".to_owned()),
                selector: Some(labels),
                ports: Some(vec![ServicePort {
                    name: Some("mongod".to_owned()),
                    port: MONGO_PORT,
                    protocol: Some("TCP".to_owned()),
                    ..ServicePort::default()
                }]),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        }
    }
}

#[async_trait::async_trait]
impl SubResourceReconciler for ServiceReconciler {
    fn kind(&self) -> &'static str {
        "Service"
    }

    async fn reconcile(&self, k8s: &K8sGateway, spec: &ClusterSpec) -> Result<(), ReconcileError> {
        get_then_upsert::<Service>(k8s, &spec.name, &Self::desired(spec)).await
    }

    async fn clean_orphans(&self, k8s: &K8sGateway) -> Result<(), ReconcileError> {
        clean_orphans_of::<Service>(k8s, |resource_name| resource_name.to_owned()).await
    }
}
