//! Root credential, generated once on cluster creation (spec.md §4.4,
//! resolving the open question on regeneration: update is a no-op so a
//! restart never invalidates an already-distributed password).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::ResourceExt;
use rand::RngCore;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ReconcileError;
use crate::k8s_gateway::K8sGateway;
use crate::model::ClusterSpec;
use operator_api::consts::ADMIN_SECRET_SUFFIX;
use operator_api::labels::OwnerLabels;

use super::{clean_orphans_of, SubResourceReconciler};

const ADMIN_USERNAME: &str = "root";
const PASSWORD_BYTES: usize = 33;

pub struct AdminSecretReconciler;

impl AdminSecretReconciler {
    fn secret_name(cluster_name: &str) -> String {
        format!("{cluster_name}{ADMIN_SECRET_SUFFIX}")
    }

    fn generate_password() -> String {
        let mut bytes = [0u8; PASSWORD_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        BASE64.encode(bytes)
    }

    fn desired(spec: &ClusterSpec) -> Secret {
        let labels = OwnerLabels::new(&spec.name).to_map();
        let mut string_data = BTreeMap::new();
        let _ = string_data.insert("username".to_owned(), ADMIN_USERNAME.to_owned());
        let _ = string_data.insert("password".to_owned(), Self::generate_password());

        Secret {
            metadata: ObjectMeta {
                name: Some(Self::secret_name(&spec.name)),
                namespace: Some(spec.namespace.clone()),
                labels: Some(labels),
                ..ObjectMeta::default()
            },
            string_data: Some(string_data),
            ..Secret::default()
        }
    }
}

#[async_trait::async_trait]
impl SubResourceReconciler for AdminSecretReconciler {
    fn kind(&self) -> &'static str {
        "Secret"
    }

    /// Unlike the other sub-resources, an existing secret is left untouched:
    /// the password is generated once, at creation, and never rewritten.
    async fn reconcile(&self, k8s: &K8sGateway, spec: &ClusterSpec) -> Result<(), ReconcileError> {
        let name = Self::secret_name(&spec.name);
        if k8s.get::<Secret>(&name).await?.is_some() {
            debug!(name, "admin secret already exists, leaving password untouched");
            return Ok(());
        }
        match k8s.create(&Self::desired(spec)).await? {
            Some(created) => {
                debug!(name = ?created.meta().name, "created admin secret");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn clean_orphans(&self, k8s: &K8sGateway) -> Result<(), ReconcileError> {
        clean_orphans_of::<Secret>(k8s, |resource_name| {
            resource_name.strip_suffix(ADMIN_SECRET_SUFFIX).unwrap_or(resource_name).to_owned()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_name_appends_suffix() {
        assert_eq!(AdminSecretReconciler::secret_name("mongo-cluster"), "mongo-cluster-admin-credentials");
    }

    #[test]
    fn generated_passwords_are_not_repeated() {
        let first = AdminSecretReconciler::generate_password();
        let second = AdminSecretReconciler::generate_password();
        assert_ne!(first, second);
    }
}
