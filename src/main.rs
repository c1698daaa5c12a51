//! pmsm-webhook - sidecar and management port injection for Kubernetes.
//!
//! This is the main entry point that:
//! - Parses command line arguments and loads the config file
//! - Initializes structured logging
//! - Builds the trust store and TLS configuration
//! - Starts the health server and the webhook server

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use clap::Parser;
use tokio::signal;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use pmsm_webhook::config::LogFormat;
use pmsm_webhook::health::{HEALTH_PORT, HealthState, run_health_server};
use pmsm_webhook::tls::server_config;
use pmsm_webhook::{
    Config, TrustStore, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WebhookState, run_webhook_server,
};

/// Longest wait for in-flight admission requests during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

/// Mutating admission webhook for sidecar and management port injection
#[derive(Parser, Debug)]
#[command(name = "pmsm-webhook", version, about)]
struct Args {
    /// Webhook configuration file (JSON)
    #[arg(long, env = "PMSM_CONFIG", default_value = "config.json")]
    configfile: PathBuf,

    /// CA bundle used to verify client certificates
    #[arg(long, env = "PMSM_CACERT", default_value = "/ca/tls.crt")]
    cacert: PathBuf,

    /// Webhook TLS certificate (PEM)
    #[arg(long, env = "PMSM_TLS_CERT", default_value = WEBHOOK_CERT_PATH)]
    tls_cert: PathBuf,

    /// Webhook TLS private key (PEM)
    #[arg(long, env = "PMSM_TLS_KEY", default_value = WEBHOOK_KEY_PATH)]
    tls_key: PathBuf,

    /// Port for health probes and metrics
    #[arg(long, env = "PMSM_HEALTH_PORT", default_value_t = HEALTH_PORT)]
    health_port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::load(&args.configfile)?;

    // Initialize tracing subscriber
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("pmsm_webhook=info".parse()?);
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    info!(
        config = %args.configfile.display(),
        restrict_to_namespace = config.restrict_certificates_to_namespace,
        cluster_domain = config.cluster_domain(),
        "Starting pmsm-webhook"
    );

    let trust_store = TrustStore::load(&args.cacert).unwrap_or_else(|e| {
        warn!(error = %e, "CA bundle unavailable, client certificates will not be verified");
        TrustStore::empty()
    });
    let tls_config = server_config(&args.tls_cert, &args.tls_key, &trust_store)?;

    let health_state = Arc::new(HealthState::new());
    let state = Arc::new(WebhookState::new(Arc::new(config), health_state.clone()));
    let handle = Handle::new();

    let mut health_task = tokio::spawn(run_health_server(health_state.clone(), args.health_port));
    let mut webhook_task = tokio::spawn(run_webhook_server(state, tls_config, handle.clone()));

    tokio::select! {
        result = &mut webhook_task => return server_exited("webhook", result),
        result = &mut health_task => return server_exited("health", result),
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Stop receiving new admission requests
            health_state.set_ready(false).await;

            info!(
                "Waiting up to {}s for in-flight admission requests to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)));
        }
    }

    let result = webhook_task.await;
    health_task.abort();
    match result {
        Ok(Ok(())) => {}
        other => return server_exited("webhook", other),
    }

    info!("Webhook stopped");
    Ok(())
}

/// Turn a finished server task into the process result.
///
/// Servers only return on their own when something went wrong, so an
/// unexpected clean exit is an error too.
fn server_exited<E>(
    server: &'static str,
    result: Result<Result<(), E>, JoinError>,
) -> Result<(), Box<dyn std::error::Error>>
where
    E: std::error::Error + 'static,
{
    match result {
        Ok(Ok(())) => {
            error!(server, "Server stopped unexpectedly");
            Err(format!("{server} server stopped unexpectedly").into())
        }
        Ok(Err(e)) => {
            error!(server, error = %e, "Server failed");
            Err(e.into())
        }
        Err(e) => {
            error!(server, error = %e, "Server task panicked");
            Err(e.into())
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
