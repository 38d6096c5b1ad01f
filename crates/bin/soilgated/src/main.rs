//! # soilgated — soil moisture gateway daemon
//!
//! Composition root that wires the serial input and the WebSocket endpoint
//! together and runs the gateway until it is told to stop.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialise logging
//! - Construct the serial device and the axum endpoint (adapters)
//! - Hand both to the lifecycle coordinator
//! - Route SIGINT/SIGTERM and panics into a single shutdown request
//! - Map the shutdown reason to the process exit code
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no gateway logic belongs here.

mod config;

use std::process::ExitCode;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use soilgate_adapter_http_axum::AxumEndpoint;
use soilgate_adapter_serial::SerialDevice;
use soilgate_app::coordinator::{Coordinator, RunningGateway};
use soilgate_app::shutdown::ShutdownHandle;
use soilgate_domain::lifecycle::ShutdownReason;

use crate::config::Config;

/// Exit code when startup fails (bad config, device unavailable, bind error).
const EXIT_STARTUP_FAILED: u8 = 2;
/// Exit code when the gateway stopped because of a fault or a panic.
const EXIT_FAULT: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("soilgated: {:#}", anyhow::Error::from(err));
            return ExitCode::from(EXIT_STARTUP_FAILED);
        }
    };
    init_tracing(&config.logging.filter);

    let coordinator = Coordinator::new(config.coordinator_config());
    let shutdown = coordinator.shutdown_handle();
    install_panic_hook(shutdown.clone());
    tokio::spawn(listen_for_signals(shutdown));

    let running = match start(&config, coordinator).await {
        Ok(running) => running,
        Err(err) => {
            tracing::error!("gateway failed to start: {err:#}");
            return ExitCode::from(EXIT_STARTUP_FAILED);
        }
    };

    let reason = running.wait().await;
    tracing::info!(%reason, "gateway stopped");
    exit_code(&reason)
}

async fn start(config: &Config, coordinator: Coordinator) -> anyhow::Result<RunningGateway> {
    let device = SerialDevice::new(config.serial.device.clone());
    let endpoint = AxumEndpoint::new(config.bind_addr(), config.session_config());
    coordinator
        .start(&device, endpoint)
        .await
        .with_context(|| format!("serial {} / listener {}", device.config().path, config.bind_addr()))
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("soilgated: invalid log filter {filter:?} ({err}), falling back to info");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn install_panic_hook(shutdown: ShutdownHandle) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        previous(info);
        shutdown.request(ShutdownReason::Panic(info.to_string()));
    }));
}

async fn listen_for_signals(shutdown: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!(%err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let name = tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    };
    shutdown.request(ShutdownReason::Signal(name.to_string()));
}

fn exit_code(reason: &ShutdownReason) -> ExitCode {
    match reason {
        ShutdownReason::Signal(_) => ExitCode::SUCCESS,
        ShutdownReason::StartupFailed(_) => ExitCode::from(EXIT_STARTUP_FAILED),
        ShutdownReason::DeviceFault(_)
        | ShutdownReason::EndpointFault(_)
        | ShutdownReason::Panic(_) => ExitCode::from(EXIT_FAULT),
    }
}
