//! HTTP control surface.
//!
//! A thin axum router over [`ControlHandle`]: liveness, policy status and
//! message injection through the live upstream connection.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use warden_core::{control::ControlHandle, domain::ConversationId};

/// Build the application router.
pub fn build_router(control: ControlHandle) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/send", post(send))
        .with_state(control)
}

/// Bind `0.0.0.0:<port>` and serve until `shutdown` fires.
pub async fn serve(
    port: u16,
    control: ControlHandle,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 API running on port {port}");

    axum::serve(listener, build_router(control))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn root() -> &'static str {
    "✅ Bot API Running!"
}

async fn status(State(control): State<ControlHandle>) -> impl IntoResponse {
    Json(control.status())
}

#[derive(Debug, Default, Deserialize)]
struct SendRequest {
    #[serde(rename = "threadID")]
    thread_id: Option<serde_json::Value>,
    message: Option<String>,
}

impl SendRequest {
    /// Thread ids arrive as JSON strings or numbers.
    fn conversation(&self) -> Option<ConversationId> {
        let id = match self.thread_id.as_ref()? {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!id.is_empty()).then(|| ConversationId(id))
    }

    fn text(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.is_empty())
    }
}

async fn send(State(control): State<ControlHandle>, body: Bytes) -> (StatusCode, String) {
    if control.current_client().is_none() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "❌ Bot not logged in yet".to_string(),
        );
    }

    // A missing or unparseable body is reported the same way as missing fields.
    let req: SendRequest = serde_json::from_slice(&body).unwrap_or_default();
    let (Some(conversation), Some(text)) = (req.conversation(), req.text()) else {
        return (
            StatusCode::BAD_REQUEST,
            "❌ threadID & message required".to_string(),
        );
    };

    match control.send_message(&conversation, text).await {
        Ok(()) => {
            info!("📤 API message sent to {conversation}");
            (StatusCode::OK, format!("✅ Message sent to {conversation}"))
        }
        Err(e) => {
            error!("❌ API send failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("❌ Failed: {e}"),
            )
        }
    }
}
