//! C6: the replica-set state machine (spec.md §4.6) — status probe,
//! initiate, reconfigure, admin-user creation — plus the entry points the
//! main sweep loop calls after draining driver event-listener messages.

use std::time::Duration;

use bson::Document;
use k8s_openapi::api::core::v1::Secret;
use tracing::{info, warn};

use crate::error::{MongoError, MongoStatusError, ReconcileError};
use crate::k8s_gateway::K8sGateway;
use crate::model::{ClusterKey, ClusterSpec};
use crate::mongo_gateway::{MongoGateway, ReplicaSetConfig};
use crate::state::ReplicaSetVersions;

/// spec.md §4.6: `CreateUsersIfNeeded` retries on `"not master"` after a wait.
const USER_CREATE_RETRIES: u32 = 4;
const USER_CREATE_WAIT: Duration = Duration::from_secs(15);

/// The four states of spec.md §4.6's table, as observed from one `Status()`
/// call.
#[derive(Debug, PartialEq, Eq)]
enum ReplicaSetState {
    Uninitialized,
    Healthy,
    Drifted { observed_members: i32 },
}

pub struct ReplicaSetDriver {
    mongo: MongoGateway,
}

impl ReplicaSetDriver {
    #[must_use]
    pub fn new(mongo: MongoGateway) -> Self {
        Self { mongo }
    }

    /// Drives the cluster towards the `Healthy` state: initiates an
    /// uninitialized replica set, reconfigures a drifted one, does nothing
    /// for a healthy one. Any other response is fatal for this sweep.
    pub async fn check_or_create(&self, spec: &ClusterSpec, versions: &ReplicaSetVersions) -> Result<(), ReconcileError> {
        match self.mongo.status(spec).await {
            Err(MongoStatusError::NoReplsetConfigReceived) => {
                info!(cluster = %spec.name, namespace = %spec.namespace, "replica set uninitialized, initiating");
                let config = ReplicaSetConfig::for_cluster(spec, 1);
                self.mongo.initiate(spec, &config).await?;
                versions.record(spec.key(), 1);
                Ok(())
            }
            Err(other) => Err(MongoError::Status(other).into()),
            Ok(doc) => match classify_state(&doc, spec.replicas)? {
                ReplicaSetState::Healthy => Ok(()),
                ReplicaSetState::Uninitialized => {
                    // `ok=1` with no members reported is treated the same as
                    // the explicit NoReplsetConfigReceived error: initiate.
                    let config = ReplicaSetConfig::for_cluster(spec, 1);
                    self.mongo.initiate(spec, &config).await?;
                    versions.record(spec.key(), 1);
                    Ok(())
                }
                ReplicaSetState::Drifted { observed_members } => {
                    let next_version = versions.current(&spec.key()) + 1;
                    info!(
                        cluster = %spec.name, namespace = %spec.namespace,
                        observed_members, expected = spec.replicas, next_version,
                        "replica set drifted, reconfiguring"
                    );
                    let config = ReplicaSetConfig::for_cluster(spec, next_version as i32);
                    self.mongo.reconfigure(spec, &config).await?;
                    versions.record(spec.key(), next_version);
                    Ok(())
                }
            },
        }
    }

    /// Same state-machine transition, driven by the heartbeat listener's
    /// `AllHostsReady` hand-off rather than the periodic sweep. Delegates to
    /// `check_or_create` so there is a single definitive initiate/reconfigure
    /// decision point.
    pub async fn initiate_on_heartbeat(&self, spec: &ClusterSpec, versions: &ReplicaSetVersions) -> Result<(), ReconcileError> {
        self.check_or_create(spec, versions).await
    }

    /// `CreateUsersIfNeeded(spec)`: reads the admin secret and calls
    /// `CreateUser`, retrying on a transient `"not master"` response.
    pub async fn create_users_if_needed(&self, k8s: &K8sGateway, spec: &ClusterSpec) -> Result<(), ReconcileError> {
        let secret_name = format!("{}{}", spec.name, operator_api::consts::ADMIN_SECRET_SUFFIX);
        let secret = k8s
            .get::<Secret>(&secret_name)
            .await?
            .ok_or_else(|| ReconcileError::InvalidSpec(crate::error::InvalidSpecError::MissingField("admin secret")))?;
        let (username, password) = decode_credentials(&secret)?;

        let mut attempt = 0;
        loop {
            match self.mongo.create_user(spec, &username, &password).await {
                Ok(()) => return Ok(()),
                Err(MongoError::Status(MongoStatusError::NotMaster)) if attempt < USER_CREATE_RETRIES => {
                    attempt += 1;
                    warn!(cluster = %spec.name, attempt, "create_user hit a non-primary member, retrying");
                    tokio::time::sleep(USER_CREATE_WAIT).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn classify_state(doc: &Document, expected_replicas: i32) -> Result<ReplicaSetState, ReconcileError> {
    let ok = doc
        .get_f64("ok")
        .map(|v| v == 1.0)
        .or_else(|_| doc.get_i32("ok").map(|v| v == 1))
        .unwrap_or(false);
    if !ok {
        return Err(ReconcileError::from(MongoError::UnexpectedResponse(doc.to_string())));
    }

    match doc.get_array("members") {
        Ok(members) => {
            if members.len() as i32 == expected_replicas {
                Ok(ReplicaSetState::Healthy)
            } else {
                Ok(ReplicaSetState::Drifted {
                    observed_members: members.len() as i32,
                })
            }
        }
        Err(_) => Ok(ReplicaSetState::Uninitialized),
    }
}

fn decode_credentials(secret: &Secret) -> Result<(String, String), ReconcileError> {
    let data = secret
        .data
        .as_ref()
        .ok_or_else(|| ReconcileError::InvalidSpec(crate::error::InvalidSpecError::MissingField("admin secret data")))?;
    let username = data
        .get("username")
        .and_then(|v| String::from_utf8(v.0.clone()).ok())
        .ok_or_else(|| ReconcileError::InvalidSpec(crate::error::InvalidSpecError::MissingField("admin secret username")))?;
    let password = data
        .get("password")
        .and_then(|v| String::from_utf8(v.0.clone()).ok())
        .ok_or_else(|| ReconcileError::InvalidSpec(crate::error::InvalidSpecError::MissingField("admin secret password")))?;
    Ok((username, password))
}

/// `ClusterKey`-addressed wrapper used by the main loop when handling
/// driver event-listener messages, which only carry the key (spec.md §9's
/// message-passing re-architecture), not a full `ClusterSpec`.
pub async fn resolve_spec(k8s: &K8sGateway, key: &ClusterKey) -> Result<Option<ClusterSpec>, ReconcileError> {
    use crate::crd::MongoClusterConfiguration;
    use crate::model::parse_cluster_spec;

    match k8s.get::<MongoClusterConfiguration>(&key.0).await? {
        Some(resource) => Ok(Some(parse_cluster_spec(&resource)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_healthy_when_member_count_matches() {
        let doc = bson::doc! { "ok": 1.0, "members": [{"_id": 0}, {"_id": 1}, {"_id": 2}] };
        assert_eq!(classify_state(&doc, 3).unwrap(), ReplicaSetState::Healthy);
    }

    #[test]
    fn classify_drifted_when_member_count_differs() {
        let doc = bson::doc! { "ok": 1.0, "members": [{"_id": 0}, {"_id": 1}, {"_id": 2}] };
        assert_eq!(
            classify_state(&doc, 4).unwrap(),
            ReplicaSetState::Drifted { observed_members: 3 }
        );
    }

    #[test]
    fn classify_fails_on_not_ok() {
        let doc = bson::doc! { "ok": 0.0, "errmsg": "boom" };
        assert!(classify_state(&doc, 3).is_err());
    }
}
