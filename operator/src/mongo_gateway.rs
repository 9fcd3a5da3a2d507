//! C3: typed admin commands against a replica set via a pooled driver
//! client, plus the topology/heartbeat event listeners that hand off to the
//! restore coordinator and the replica-set driver (spec.md §4.6).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bson::{doc, Document};
use mongodb::event::command::{CommandEventHandler, CommandFailedEvent, CommandSucceededEvent};
use mongodb::event::sdam::{
    SdamEventHandler, ServerDescriptionChangedEvent, ServerHeartbeatSucceededEvent,
    TopologyDescriptionChangedEvent,
};
use mongodb::options::{ClientOptions, ServerAddress};
use mongodb::sdam::TopologyType;
use mongodb::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{MongoError, MongoStatusError};
use crate::model::{member_hostname, ClusterKey, ClusterSpec};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(60);
/// spec.md §4.2: admin commands are retried up to 4 times, 15s apart.
const COMMAND_RETRIES: u32 = 4;
const COMMAND_RETRY_WAIT: Duration = Duration::from_secs(15);

/// Replica-set reconfig document sent to Mongo (spec.md §6 wire format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaSetConfig {
    #[serde(rename = "_id")]
    pub id: String,
    pub version: i32,
    pub members: Vec<ReplicaSetMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaSetMember {
    #[serde(rename = "_id")]
    pub id: i32,
    pub host: String,
}

impl ReplicaSetConfig {
    #[must_use]
    pub fn for_cluster(cluster: &ClusterSpec, version: i32) -> Self {
        let members = (0..cluster.replicas)
            .map(|ordinal| ReplicaSetMember {
                id: ordinal,
                host: cluster.member_hostname(ordinal),
            })
            .collect();
        Self {
            id: cluster.name.clone(),
            version,
            members,
        }
    }
}

/// Messages produced by driver-owned event-listener threads, consumed by
/// the main sweep loop (spec.md §9's re-architecture note: no mutation from
/// listener callbacks, only message passing).
#[derive(Debug, Clone)]
pub enum ReplicaSetEvent {
    /// The topology acquired a writable server: fires the restore one-shot.
    TopologyReady(ClusterKey),
    /// All configured hosts have reported a successful heartbeat: fires
    /// `Initiate`.
    AllHostsReady(ClusterKey),
}

/// Process-wide `replica-set-name → connected client` map plus the event
/// channel listeners publish onto.
pub struct MongoGateway {
    clients: Mutex<HashMap<ClusterKey, Client>>,
    events_tx: flume::Sender<ReplicaSetEvent>,
}

impl MongoGateway {
    #[must_use]
    pub fn new(events_tx: flume::Sender<ReplicaSetEvent>) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            events_tx,
        }
    }

    /// Read-mostly lookup: first use populates under lock, subsequent uses
    /// clone the already-pooled client without taking the lock again.
    fn pooled_client(&self, cluster: &ClusterSpec) -> Result<Client, MongoError> {
        let key = cluster.key();
        {
            let guard = self.clients.lock().unwrap_or_else(|poison| poison.into_inner());
            if let Some(client) = guard.get(&key) {
                return Ok(client.clone());
            }
        }
        let client = self.build_pooled_client(cluster)?;
        let mut guard = self.clients.lock().unwrap_or_else(|poison| poison.into_inner());
        Ok(guard.entry(key).or_insert(client).clone())
    }

    fn build_pooled_client(&self, cluster: &ClusterSpec) -> Result<Client, MongoError> {
        let hosts = (0..cluster.replicas)
            .map(|ordinal| server_address(&cluster.member_hostname(ordinal)))
            .collect();

        let listeners = ClusterListeners::new(cluster.key(), cluster.replicas, self.events_tx.clone());

        let options = ClientOptions::builder()
            .hosts(hosts)
            .connect_timeout(CONNECT_TIMEOUT)
            .server_selection_timeout(SERVER_SELECTION_TIMEOUT)
            .repl_set_name(cluster.name.clone())
            .command_event_handler(listeners.command_logger())
            .sdam_event_handler(listeners.sdam_handler())
            .build();

        Ok(Client::with_options(options)?)
    }

    /// A one-off, non-pooled client talking directly to a single member,
    /// used only for the initial `Initiate` (spec.md §4.6: "against a direct
    /// client to member 0, not the pooled replica-set client").
    fn direct_client(host: &str) -> Result<Client, MongoError> {
        let options = ClientOptions::builder()
            .hosts(vec![server_address(host)])
            .direct_connection(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .server_selection_timeout(SERVER_SELECTION_TIMEOUT)
            .build();
        Ok(Client::with_options(options)?)
    }

    /// `Status()` — the replica-set status document.
    pub async fn status(&self, cluster: &ClusterSpec) -> Result<Document, MongoStatusError> {
        let client = self.pooled_client(cluster).map_err(|err| MongoStatusError::Other(err.to_string()))?;
        self.run_admin_command(&client, doc! { "replSetGetStatus": 1 })
            .await
            .map_err(classify_run_error)
    }

    /// `Initiate(config)` against a direct client to member 0.
    pub async fn initiate(&self, cluster: &ClusterSpec, config: &ReplicaSetConfig) -> Result<(), MongoError> {
        let host = cluster.member_hostname(0);
        let client = Self::direct_client(&host)?;
        let cmd = doc! { "replSetInitiate": bson::to_bson(config)? };
        let _doc = self.run_admin_command(&client, cmd).await?;
        Ok(())
    }

    /// `Reconfigure(config)` against the pooled client.
    pub async fn reconfigure(&self, cluster: &ClusterSpec, config: &ReplicaSetConfig) -> Result<(), MongoError> {
        let client = self.pooled_client(cluster)?;
        let cmd = doc! { "replSetReconfig": bson::to_bson(config)? };
        let _doc = self.run_admin_command(&client, cmd).await?;
        Ok(())
    }

    /// `CreateUser(username, {pwd, roles:[{role:"root", db:"admin"}]})`.
    pub async fn create_user(
        &self,
        cluster: &ClusterSpec,
        username: &str,
        password: &str,
    ) -> Result<(), MongoError> {
        let client = self.pooled_client(cluster)?;
        let cmd = doc! {
            "createUser": username,
            "pwd": password,
            "roles": [{ "role": "root", "db": "admin" }],
        };
        match self.run_admin_command(&client, cmd).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let classified = classify_run_error(err);
                if classified == MongoStatusError::UserAlreadyExists {
                    Ok(())
                } else {
                    Err(MongoError::Status(classified))
                }
            }
        }
    }

    /// Runs one admin command with the spec.md §4.2 retry policy: up to 4
    /// retries, 15s apart, on transient connection failure; non-transient
    /// errors propagate immediately.
    async fn run_admin_command(&self, client: &Client, cmd: Document) -> Result<Document, MongoError> {
        let mut attempt = 0;
        loop {
            match client.database("admin").run_command(cmd.clone(), None).await {
                Ok(doc) => return Ok(doc),
                Err(err) if err.is_network_error() && attempt < COMMAND_RETRIES => {
                    attempt += 1;
                    warn!("transient mongo error (attempt {attempt}/{COMMAND_RETRIES}): {err}");
                    tokio::time::sleep(COMMAND_RETRY_WAIT).await;
                }
                Err(err) if attempt >= COMMAND_RETRIES => {
                    return Err(MongoError::RetriesExhausted(COMMAND_RETRIES));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn server_address(host: &str) -> ServerAddress {
    ServerAddress::Tcp {
        host: host.to_owned(),
        port: Some(operator_api::consts::MONGO_PORT as u16),
    }
}

fn classify_run_error(err: MongoError) -> MongoStatusError {
    MongoStatusError::classify(&err.to_string())
}

/// Bundle of the four event listeners spec.md §4.2 requires per pooled
/// client: a command logger, a server logger, a topology listener, and a
/// heartbeat listener. The driver's public API exposes one handler slot per
/// event family, so the server/topology/heartbeat listeners are composed
/// behind a single `SdamEventHandler` implementation that dispatches to
/// each in turn.
struct ClusterListeners {
    command_logger: Arc<CommandLogger>,
    sdam: Arc<CompositeSdamHandler>,
}

impl ClusterListeners {
    fn new(cluster: ClusterKey, expected_members: i32, events_tx: flume::Sender<ReplicaSetEvent>) -> Self {
        Self {
            command_logger: Arc::new(CommandLogger { cluster: cluster.clone() }),
            sdam: Arc::new(CompositeSdamHandler {
                server_logger: ServerLogger { cluster: cluster.clone() },
                topology_listener: TopologyListener {
                    cluster: cluster.clone(),
                    events_tx: events_tx.clone(),
                    fired: Mutex::new(false),
                },
                heartbeat_listener: HeartbeatListener {
                    cluster,
                    expected_members,
                    events_tx,
                    state: Mutex::new(HeartbeatState::default()),
                },
            }),
        }
    }

    fn command_logger(&self) -> Arc<dyn CommandEventHandler> {
        self.command_logger.clone()
    }

    fn sdam_handler(&self) -> Arc<dyn SdamEventHandler> {
        self.sdam.clone()
    }
}

/// Logs slow or failed admin commands.
struct CommandLogger {
    cluster: ClusterKey,
}

impl CommandEventHandler for CommandLogger {
    fn handle_command_succeeded_event(&self, event: CommandSucceededEvent) {
        debug!(cluster = %self.cluster.0, namespace = %self.cluster.1, command = %event.command_name, duration = ?event.duration, "mongo command succeeded");
    }

    fn handle_command_failed_event(&self, event: CommandFailedEvent) {
        warn!(cluster = %self.cluster.0, namespace = %self.cluster.1, command = %event.command_name, failure = %event.failure, "mongo command failed");
    }
}

/// Logs server description changes (role flips, becoming unreachable).
struct ServerLogger {
    cluster: ClusterKey,
}

impl ServerLogger {
    fn on_server_changed(&self, address: &str, description: &str) {
        debug!(cluster = %self.cluster.0, namespace = %self.cluster.1, %address, %description, "server description changed");
    }
}

/// Hands off to the restore coordinator the first time the topology gains a
/// writable server.
struct TopologyListener {
    cluster: ClusterKey,
    events_tx: flume::Sender<ReplicaSetEvent>,
    fired: Mutex<bool>,
}

impl TopologyListener {
    fn on_topology_changed(&self, has_writable_server: bool) {
        if !has_writable_server {
            return;
        }
        let mut fired = self.fired.lock().unwrap_or_else(|poison| poison.into_inner());
        if *fired {
            return;
        }
        *fired = true;
        if let Err(err) = self.events_tx.send(ReplicaSetEvent::TopologyReady(self.cluster.clone())) {
            error!("failed to publish topology-ready event: {err}");
        }
    }
}

#[derive(Default)]
struct HeartbeatState {
    successes: std::collections::HashSet<String>,
    earliest_host: Option<String>,
    fired: bool,
}

/// Fires `Initiate` once every expected member has reported a successful
/// heartbeat, as observed by the earliest-registered host's event (spec.md
/// §4.6: "fires at most once per listener instance").
struct HeartbeatListener {
    cluster: ClusterKey,
    expected_members: i32,
    events_tx: flume::Sender<ReplicaSetEvent>,
    state: Mutex<HeartbeatState>,
}

impl HeartbeatListener {
    fn on_heartbeat_succeeded(&self, host: String) {
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        if state.fired {
            return;
        }
        if state.earliest_host.is_none() {
            state.earliest_host = Some(host.clone());
        }
        let _inserted = state.successes.insert(host.clone());

        let all_ready = state.successes.len() >= self.expected_members.max(0) as usize;
        let is_earliest = state.earliest_host.as_deref() == Some(host.as_str());
        if all_ready && is_earliest {
            state.fired = true;
            if let Err(err) = self.events_tx.send(ReplicaSetEvent::AllHostsReady(self.cluster.clone())) {
                error!("failed to publish all-hosts-ready event: {err}");
            }
        }
    }
}

/// Dispatches SDAM events to the three listeners that share the driver's
/// single `sdam_event_handler` slot.
struct CompositeSdamHandler {
    server_logger: ServerLogger,
    topology_listener: TopologyListener,
    heartbeat_listener: HeartbeatListener,
}

impl SdamEventHandler for CompositeSdamHandler {
    fn handle_topology_description_changed_event(&self, event: TopologyDescriptionChangedEvent) {
        let has_writable_server = matches!(
            event.new_description.topology_type(),
            TopologyType::Single | TopologyType::ReplicaSetWithPrimary
        );
        debug!(cluster = %self.server_logger.cluster.0, "topology description changed");
        self.topology_listener.on_topology_changed(has_writable_server);
    }

    fn handle_server_heartbeat_succeeded_event(&self, event: ServerHeartbeatSucceededEvent) {
        self.heartbeat_listener.on_heartbeat_succeeded(event.server_address.to_string());
    }

    fn handle_server_description_changed_event(&self, event: ServerDescriptionChangedEvent) {
        self.server_logger.on_server_changed(
            &event.address.to_string(),
            &format!("{:?}", event.new_description.server_type()),
        );
    }
}
