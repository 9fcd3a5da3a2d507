//! C4: upload/download/list of backup archives in a remote bucket, using
//! credentials recovered from a Kubernetes secret.
//!
//! Grounded in the original `BackupHelper`/`RestoreHelper`'s GCS client
//! usage; reimplemented against `object_store` (the crate the pack reaches
//! for when talking to cloud object storage) instead of a bespoke GCS SDK
//! binding.

use chrono::{DateTime, Utc};
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::info;

use crate::error::StorageError;
use crate::k8s_gateway::K8sGateway;
use crate::model::SecretRef;

/// A backup object discovered under a prefix, with its creation time.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// C4. Stateless beyond whatever connection pooling `object_store` itself
/// holds; credentials are resolved fresh on every call since each cluster
/// may reference a different secret.
#[derive(Debug, Clone)]
pub struct StorageGateway {
    k8s: K8sGateway,
}

impl StorageGateway {
    #[must_use]
    pub fn new(k8s: K8sGateway) -> Self {
        Self { k8s }
    }

    /// Recovers a GCS service-account descriptor from `secret_ref`,
    /// base64-decoding the referenced key the way `BackupHelper._getCredentials`
    /// does.
    async fn resolve_store(&self, bucket: &str, secret_ref: &SecretRef) -> Result<impl ObjectStore, StorageError> {
        use k8s_openapi::api::core::v1::Secret;

        let secret = self
            .k8s
            .get::<Secret>(&secret_ref.name)
            .await
            .map_err(|err| StorageError::Credentials(err.to_string()))?
            .ok_or_else(|| StorageError::Credentials(format!("secret {} not found", secret_ref.name)))?;

        let encoded = secret
            .data
            .as_ref()
            .and_then(|data| data.get(&secret_ref.key))
            .ok_or_else(|| StorageError::Credentials(format!("key {} missing on secret {}", secret_ref.key, secret_ref.name)))?;

        // `k8s_openapi::ByteString` already base64-decodes secret values on
        // deserialization, so `encoded.0` is the raw service-account JSON
        // (spec.md §4.3: "recovered by base64-decoding a field").
        let service_account_json =
            String::from_utf8(encoded.0.clone()).map_err(|err| StorageError::Credentials(err.to_string()))?;

        GoogleCloudStorageBuilder::new()
            .with_bucket_name(bucket)
            .with_service_account_key(service_account_json)
            .build()
            .map_err(StorageError::Store)
    }

    /// Uploads `local_path` to `<bucket>/<prefix>/<basename>`.
    pub async fn upload(
        &self,
        bucket: &str,
        prefix: &str,
        secret_ref: &SecretRef,
        local_path: &std::path::Path,
    ) -> Result<(), StorageError> {
        let store = self.resolve_store(bucket, secret_ref).await?;
        let basename = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StorageError::Credentials("backup file has no basename".to_owned()))?;
        let object_path = ObjectPath::from(format!("{prefix}/{basename}"));

        let bytes = tokio::fs::read(local_path).await?;
        store.put(&object_path, PutPayload::from(bytes)).await?;
        info!(%bucket, key = %object_path, "backup uploaded");
        Ok(())
    }

    /// Downloads `<bucket>/<prefix>/<object_name>` to `local_path`.
    pub async fn download(
        &self,
        bucket: &str,
        prefix: &str,
        secret_ref: &SecretRef,
        object_name: &str,
        local_path: &std::path::Path,
    ) -> Result<(), StorageError> {
        let store = self.resolve_store(bucket, secret_ref).await?;
        let object_path = ObjectPath::from(format!("{prefix}/{object_name}"));
        let bytes = store.get(&object_path).await?.bytes().await?;
        tokio::fs::write(local_path, bytes).await?;
        info!(%bucket, key = %object_path, path = %local_path.display(), "backup downloaded");
        Ok(())
    }

    /// Lists objects under `<bucket>/<prefix>/`, returning `(name, creation-time)`
    /// pairs with the prefix stripped, mirroring `RestoreHelper._lastBackupFile`.
    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        secret_ref: &SecretRef,
    ) -> Result<Vec<ObjectSummary>, StorageError> {
        use futures::TryStreamExt;

        let store = self.resolve_store(bucket, secret_ref).await?;
        let list_prefix = ObjectPath::from(prefix);
        let meta: Vec<_> = store.list(Some(&list_prefix)).try_collect().await?;

        let prefix_with_slash = format!("{prefix}/");
        Ok(meta
            .into_iter()
            .map(|m| ObjectSummary {
                name: m.location.to_string().trim_start_matches(&prefix_with_slash).to_owned(),
                created_at: m.last_modified,
            })
            .collect())
    }

    /// The object with the most recent creation time, or `NoObjectsFound`.
    pub async fn latest(&self, bucket: &str, prefix: &str, secret_ref: &SecretRef) -> Result<String, StorageError> {
        let objects = self.list(bucket, prefix, secret_ref).await?;
        objects
            .into_iter()
            .max_by_key(|o| o.created_at)
            .map(|o| o.name)
            .ok_or(StorageError::NoObjectsFound)
    }
}
