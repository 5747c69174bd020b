//! machine-health-operator: MachineHealthCheck controller binary
//!
//! Runs the reconciliation controller alongside the health, metrics and
//! diagnostics server until a shutdown signal arrives.

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use machine_health_k8s::config::{LogFormat, OperatorConfig};
use machine_health_k8s::controller::{run_controller, ControllerState, Metrics, Store};
use machine_health_k8s::error::{Error, Result};
use machine_health_k8s::rest_api::run_server;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = OperatorConfig::parse();
    init_tracing(config.log_format);

    info!(
        namespace = ?config.namespace,
        listen_addr = %config.listen_addr,
        "Starting machine-health-operator"
    );

    let client = Client::try_default().await.map_err(Error::KubeError)?;
    let listen_addr = config.listen_addr;
    let state = Arc::new(ControllerState {
        store: Store::kube(client.clone()),
        metrics: Arc::new(Metrics::new()),
        config,
    });

    tokio::select! {
        res = run_controller(client, state.clone()) => {
            if let Err(e) = &res {
                error!("Controller exited with error: {}", e);
            }
            res?;
            info!("Controller stopped, shutting down");
        }
        res = run_server(state, listen_addr) => {
            if let Err(e) = &res {
                error!("REST API server exited with error: {}", e);
            }
            res?;
        }
    }

    Ok(())
}
