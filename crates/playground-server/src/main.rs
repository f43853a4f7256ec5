use std::sync::Arc;

use playground_server::agent::{AgentBackend, CommandAgent};
use playground_server::config::Settings;
use playground_server::registry::SessionRegistry;
use playground_server::AppState;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting playground relay");

    let settings = Settings::new().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let backend: Option<Arc<dyn AgentBackend>> = match CommandAgent::from_settings(&settings.agent)
    {
        Ok(agent) => {
            info!(
                cli_path = ?settings.agent.cli_path,
                cwd = ?settings.agent.cwd,
                "agent initialized"
            );
            Some(Arc::new(agent))
        }
        Err(e) => {
            warn!(error = %e, "agent not initialized, sessions cannot be created");
            None
        }
    };

    let sessions = Arc::new(SessionRegistry::new(backend, &settings.events));
    let state = AppState::new(sessions.clone());

    let addr = settings.server.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Starting server on http://{}", addr);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
    };

    if let Err(e) = playground_server::serve(listener, state, shutdown).await {
        error!(error = %e, "server error");
    }

    info!(count = sessions.session_count().await, "destroying sessions");
    sessions.destroy_all().await;

    Ok(())
}
