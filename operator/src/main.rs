//! C0: process bootstrap. Reads configuration from the environment,
//! installs structured logging, registers the custom resource definition,
//! and hands off to the supervisor.

mod backup;
mod config;
mod crd;
mod error;
mod k8s_gateway;
mod model;
mod mongo_gateway;
mod operator_state;
mod reconcile;
mod reconcilers;
mod replicaset;
mod restore;
mod state;
mod storage_gateway;
mod supervisor;

use std::sync::Arc;

use kube::Client;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use operator_state::OperatorState;
use supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(&config);

    info!(namespace = %config.namespace, "starting mongodb-operator");

    let client = Client::try_default().await?;
    k8s_gateway::prepare_crd(&client).await?;

    let gateway = k8s_gateway::K8sGateway::new(client, config.namespace.clone());
    let state = Arc::new(OperatorState::new(gateway));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor = Supervisor::new(state, config);
    let supervisor_task = tokio::spawn(supervisor.run(shutdown_rx));

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to install ctrl-c handler");
    }
    info!("received shutdown signal");
    let _ = shutdown_tx.send(true);

    supervisor_task.await?;
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.logging_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
