//! # Calculator Demo
//!
//! Wires a calculator client and two servers onto one in-memory bus, runs a
//! handful of fan-out requests, then shuts everything down.
//!
//! Logging and bus settings come from the environment (`APPLETS_LOG_LEVEL`,
//! `APPLETS_JSON_LOGS`, `APPLETS_FAN_IN_TIMEOUT_MS`, ...).

use std::sync::Arc;

use anyhow::{Context, Result};
use applet_bus::{BusConfig, ChannelError, FanInError, FanOutRequest, InMemoryMessageBroker};
use applet_telemetry::{init_logging, TelemetryConfig};
use applet_tests::calculator::{
    calculator_contract, calculator_serializer, client_id, server_id, spawn_calculator,
    CalcOperation, CalcRequest,
};
use applet_types::AppContract;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SERVERS: usize = 2;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&TelemetryConfig::from_env()).context("logging setup failed")?;

    let contract: Arc<dyn AppContract> =
        Arc::new(calculator_contract().context("calculator contract is invalid")?);
    let serializer = Arc::new(calculator_serializer().context("payload registry is invalid")?);
    let broker = InMemoryMessageBroker::new(contract, serializer, BusConfig::from_env())
        .context("bus configuration is invalid")?;

    let cancel = CancellationToken::new();
    let servers = (0..SERVERS)
        .map(|_| {
            broker
                .create_channel(&server_id())
                .map(|channel| spawn_calculator(channel, cancel.clone()))
        })
        .collect::<Result<Vec<_>, _>>()
        .context("failed to open a server channel")?;
    let client = broker
        .create_channel(&client_id())
        .context("failed to open the client channel")?;

    let requests = [
        CalcRequest::new(1.0, 2.0, CalcOperation::Add),
        CalcRequest::new(10.0, 4.0, CalcOperation::Subtract),
        CalcRequest::new(6.0, 7.0, CalcOperation::Multiply),
        CalcRequest::new(1.0, 0.0, CalcOperation::Divide),
    ];
    for request in &requests {
        match request.aggregate(&client, &cancel).await {
            Ok(response) => info!(?request, result = response.result, "Calculated"),
            Err(FanInError::BadFanOutRequest(reply)) => {
                let reason = reply.text().await.unwrap_or_default();
                warn!(?request, %reason, "Request rejected");
            }
            Err(err) => return Err(err).context("fan-out request failed"),
        }
    }

    info!(
        published = broker.transport().published(),
        "Demo finished, shutting down"
    );
    client.dispose();
    cancel.cancel();
    for server in servers {
        match server.await? {
            Ok(()) | Err(ChannelError::Cancelled) => {}
            Err(err) => warn!(error = %err, "Calculator server stopped with an error"),
        }
    }
    Ok(())
}
