pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod registry;

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::api::{sessions, status};
use crate::registry::SessionRegistry;

pub use crate::error::{RelayError, Result};

// ============================================================================
// Session registry wrapper
// ============================================================================

/// Session registry wrapper for state extraction
#[derive(Clone)]
pub struct Sessions(pub Arc<SessionRegistry>);

impl Deref for Sessions {
    type Target = SessionRegistry;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// Application state
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }
}

// Allow extracting Sessions from AppState
impl FromRef<AppState> for Sessions {
    fn from_ref(state: &AppState) -> Self {
        Sessions(state.sessions.clone())
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/api", get(status::health_check))
        .route("/api/status", get(status::get_status))
        // Session routes
        .route("/api/sessions", post(sessions::create_session))
        .route("/api/sessions/:session_id", delete(sessions::delete_session))
        .route("/api/sessions/:session_id/send", post(sessions::send_message))
        .route("/api/sessions/:session_id/events", get(sessions::get_events))
        .route("/api/sessions/:session_id/messages", get(sessions::get_messages))
        .with_state(state)
}

/// Serve the relay on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
