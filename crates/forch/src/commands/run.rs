//! Long-running orchestrator.

use tracing::{info, warn};

use forch_core::{CoreError, DevicePlacement, MacAddress};

use crate::config::Session;
use crate::error::CliError;

pub async fn handle(session: &Session) -> Result<(), CliError> {
    let engine = session.engine();
    engine.set_placement_callback(log_placement);

    let orchestrator = session.orchestrator(engine);
    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received"),
            Err(e) => warn!(error = %e, "cannot listen for interrupt"),
        }
        cancel.cancel();
    });

    info!(
        event_sock = %session.config.ingest.socket_path.display(),
        varz = %session.config.varz_url,
        "starting orchestrator"
    );
    orchestrator.run().await.map_err(|e| classify(session, e))
}

fn log_placement(mac: Option<&MacAddress>, placement: &DevicePlacement) {
    let mac = mac.map_or("-", MacAddress::as_str);
    info!(
        mac,
        switch = %placement.switch,
        port = placement.port,
        connected = placement.connected,
        "device placement"
    );
}

fn classify(session: &Session, err: CoreError) -> CliError {
    let socket_lost = matches!(
        &err,
        CoreError::Api(api) if api.is_channel_lost() || api.is_connect_failure()
    );
    if socket_lost {
        return CliError::EventSocket {
            path: session.config.ingest.socket_path.display().to_string(),
            source: err,
        };
    }
    match err {
        CoreError::Api(_) | CoreError::MissingMetric { .. } | CoreError::InvalidSample { .. } => {
            CliError::VarzUnavailable {
                url: session.config.varz_url.to_string(),
                source: err,
            }
        }
        other => CliError::Core(other),
    }
}
