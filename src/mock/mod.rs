//! In-process stand-ins for the user and email services, so a run can be
//! exercised without the real targets.

pub mod auth;
pub mod email;
pub mod timing;

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware as axum_mw,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::Credentials;

// ─── Shared state ────────────────────────────────────────────────

/// Registered accounts and issued tokens.
#[derive(Default)]
pub struct MockState {
    /// email → password
    users: Mutex<HashMap<String, String>>,
    /// token → email
    tokens: Mutex<HashMap<String, String>>,
}

impl MockState {
    /// State with the admin account already registered.
    pub fn seeded(admin: &Credentials) -> Self {
        let state = Self::default();
        state
            .users
            .lock()
            .insert(admin.email.clone(), admin.password.clone());
        state
    }

    /// Email of the account owning the bearer token in `headers`.
    pub fn bearer_owner(&self, headers: &HeaderMap) -> Option<String> {
        let token = headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        self.tokens.lock().get(token).cloned()
    }
}

// ─── Error type ──────────────────────────────────────────────────

#[derive(Debug)]
pub enum MockError {
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = serde_json::json!({
            "message": message,
            "statusCode": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

// ─── Router ──────────────────────────────────────────────────────

/// Both services on one router; point `host` and `auth_host` at the same
/// address.
pub fn router(state: Arc<MockState>) -> Router {
    Router::new()
        // ── User service ────────────────────────────────────────
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/users/profile", get(auth::profile))
        // ── Email service ───────────────────────────────────────
        .route("/email/grafananotif", post(email::grafana_notification))
        .route("/email/workflow/success", post(email::workflow_success))
        .route("/email/workflow/error", post(email::workflow_error))
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serve the mock targets on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<MockState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock targets listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
