//! C2: typed create/get/update/delete/list/watch operations against the
//! Kubernetes API server, plus the CRD-registration bootstrap.
//!
//! 404 is a first-class value here, not an error: every call site that can
//! meaningfully observe "does not exist" returns `Option<K>` instead of
//! propagating a `NotFound`. `AlreadyExists` on create is absorbed the same
//! way — the caller sees it on the next sweep instead.

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use futures::{Stream, StreamExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams, WatchParams};
use kube::core::WatchEvent;
use kube::runtime::wait::{await_condition, conditions};
use kube::{Api, Client, CustomResourceExt, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::crd::MongoClusterConfiguration;
use crate::error::K8sGatewayError;

/// Field manager name stamped on every server-side-apply patch this
/// operator issues.
pub const FIELD_MANAGER: &str = "mongodb-operator";

const CRD_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(20);
/// CRD-registration retry budget (spec.md §7: 3×5s for `TransientRemote`).
const CRD_REGISTER_RETRIES: u32 = 3;
const CRD_REGISTER_BACKOFF: Duration = Duration::from_secs(5);

/// A change observed on a watched resource type.
#[derive(Debug)]
pub enum Event<K> {
    Added(K),
    Modified(K),
    Deleted(K),
}

/// Typed gateway to one Kubernetes namespace. Stateless beyond the
/// connection pool held by the inner `Client`.
#[derive(Debug, Clone)]
pub struct K8sGateway {
    client: Client,
    namespace: String,
}

impl K8sGateway {
    #[must_use]
    pub fn new(client: Client, namespace: String) -> Self {
        Self { client, namespace }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// `Get(name, namespace) → Object | NotFound`
    pub async fn get<K>(&self, name: &str) -> Result<Option<K>, K8sGatewayError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        match self.api::<K>().get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// `List(labelSelector) → [Object]`
    pub async fn list<K>(&self, label_selector: &str) -> Result<Vec<K>, K8sGatewayError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let params = ListParams::default().labels(label_selector);
        Ok(self.api::<K>().list(&params).await?.items)
    }

    /// `Create(desired) → Object`; a 409 conflict is absorbed and `None` is
    /// returned — the next sweep observes the object via `get`/`update`.
    pub async fn create<K>(&self, desired: &K) -> Result<Option<K>, K8sGatewayError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Serialize,
        <K as Resource>::DynamicType: Default,
    {
        match self.api::<K>().create(&PostParams::default(), desired).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(err)) if err.code == 409 => {
                debug!("create raced with an existing object, deferring to next sweep");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// `Update(name, namespace, desired) → Object` — a server-side-apply
    /// patch, idempotent by construction.
    pub async fn update<K>(&self, name: &str, desired: &K) -> Result<K, K8sGatewayError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Serialize,
        <K as Resource>::DynamicType: Default,
    {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        Ok(self.api::<K>().patch(name, &params, &Patch::Apply(desired)).await?)
    }

    /// `Delete(name, namespace) → Status`; a missing object is a no-op.
    pub async fn delete<K>(&self, name: &str) -> Result<(), K8sGatewayError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        match self.api::<K>().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// `Watch(resourceVersion) → stream of events` with a bounded read
    /// timeout; on timeout the stream ends cleanly rather than erroring.
    pub async fn watch<K>(
        &self,
        resource_version: &str,
        timeout: Duration,
    ) -> Result<impl Stream<Item = Result<Event<K>, K8sGatewayError>>, K8sGatewayError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let params = WatchParams::default().timeout(timeout.as_secs().try_into().unwrap_or(5));
        let stream = self.api::<K>().watch(&params, resource_version).await?;
        Ok(stream.map(|item| match item {
            Ok(WatchEvent::Added(obj)) => Ok(Event::Added(obj)),
            Ok(WatchEvent::Modified(obj)) => Ok(Event::Modified(obj)),
            Ok(WatchEvent::Deleted(obj)) => Ok(Event::Deleted(obj)),
            Ok(WatchEvent::Bookmark(_)) => Err(K8sGatewayError::MissingField("non-bookmark event")),
            Ok(WatchEvent::Error(status)) => {
                warn!("watch stream reported an error event: {status:?}");
                Err(K8sGatewayError::MissingField("well-formed watch event"))
            }
            Err(err) => Err(err.into()),
        }))
    }
}

/// Registers the `MongoClusterConfiguration` CRD at startup if it is
/// absent, retrying with fixed back-off until the API server accepts list
/// calls (initial listings may transiently 404 while the definition is
/// propagating).
pub async fn prepare_crd(client: &Client) -> anyhow::Result<()> {
    let crd_api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let definition = MongoClusterConfiguration::crd();

    let mut attempt = 0;
    loop {
        match crd_api.list(&ListParams::default()).await {
            Ok(crds) => {
                let existing: HashMap<_, _> = crds
                    .items
                    .into_iter()
                    .filter_map(|crd| crd.metadata.name.map(|name| (name, ())))
                    .collect();
                if existing.contains_key(MongoClusterConfiguration::crd_name()) {
                    debug!("found MongoClusterConfiguration CRD already registered");
                } else {
                    debug!("registering MongoClusterConfiguration CRD");
                    let _created = crd_api.create(&PostParams::default(), &definition).await?;
                }
                break;
            }
            Err(err) if attempt < CRD_REGISTER_RETRIES => {
                attempt += 1;
                warn!("crd list failed (attempt {attempt}/{CRD_REGISTER_RETRIES}): {err}");
                tokio::time::sleep(CRD_REGISTER_BACKOFF).await;
            }
            Err(err) => return Err(err.into()),
        }
    }

    let establish = await_condition(
        crd_api,
        MongoClusterConfiguration::crd_name(),
        conditions::is_crd_established(),
    );
    let _crd = tokio::time::timeout(CRD_ESTABLISH_TIMEOUT, establish).await??;
    debug!("MongoClusterConfiguration crd established");
    Ok(())
}
