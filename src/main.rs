//! aim server
//!
//! Startup order: configuration, tracing, browser backend, session services,
//! reaper, HTTP API. On SIGINT/SIGTERM the API drains, the reaper is
//! cancelled and the shared browser is closed.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aim::agent::{DevboxAgent, RemoteBrowserAgent};
use aim::api::{self, AppState};
use aim::{
    telemetry, BrowserSessions, CodebaseSessions, DevToolsBrowser, HttpReadinessProbe, Reaper,
    ServerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ServerConfig::from_env()?;
    telemetry::init_tracing("aim", config.otlp_endpoint.as_deref(), config.log_json)?;

    let backend = Arc::new(DevToolsBrowser::new(config.devtools_url.clone()));
    let browser = Arc::new(BrowserSessions::new(backend));
    let codebase = Arc::new(CodebaseSessions::new(Arc::new(HttpReadinessProbe::new(
        config.health_timeout,
    ))));

    let cancel = CancellationToken::new();
    let reaper = Arc::new(Reaper::new(
        Arc::clone(&browser),
        Arc::clone(&codebase),
        config.reaper(),
    ));
    let reaper_handle = reaper.spawn(cancel.clone());

    let state: AppState<DevToolsBrowser> = AppState {
        browser: Arc::clone(&browser),
        codebase,
        browser_agent: Arc::new(RemoteBrowserAgent::new(
            config.browser_agent_url.clone(),
            config.agent_timeout,
        )),
        codebase_agent: Arc::new(DevboxAgent::new(config.agent_timeout)),
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        addr = %config.bind_addr,
        devtools = %config.devtools_url,
        "aim API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Err(e) = reaper_handle.await {
        warn!(error = %e, "Reaper task ended abnormally");
    }

    match browser.shutdown().await {
        Ok(message) => info!("{}", message),
        Err(e) => error!(error = %e, "Browser shutdown failed"),
    }

    telemetry::shutdown_tracing();
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
