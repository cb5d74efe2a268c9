//! HTTP / WebSocket server
//!
//! Routes:
//! - `POST /token?username=<name>` → `{"access_token": ..., "token_type": "bearer"}`
//! - `GET  /chat?token=<token>` → WebSocket chat session
//! - `GET  /health` → `{"status": "ok", "documents": <corpus size>}`

use std::{error::Error, sync::Arc};

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    api::ResponseGenerator,
    auth::TokenService,
    errors::{BoxError, TokenError},
    session::{Incoming, Session, Transport},
};

/// Process-wide, read-only state shared by every request and session.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub generator: Arc<ResponseGenerator>,
}

#[derive(Debug, Deserialize)]
pub struct TokenParams {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    pub token: Option<String>,
}

/// Error body: `{"detail": ...}`.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "detail": self.1 }))).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::EmptySubject => ApiError(StatusCode::BAD_REQUEST, e.to_string()),
            TokenError::ExpiryOutOfRange | TokenError::Signing(_) => {
                warn!("Token signing failed: {}", e);
                ApiError(StatusCode::INTERNAL_SERVER_ERROR, "could not issue token".into())
            }
        }
    }
}

async fn issue_token(
    State(state): State<AppState>,
    Query(params): Query<TokenParams>,
) -> Result<Json<TokenResponse>, ApiError> {
    let access_token = state.tokens.issue(&params.username)?;
    info!("Issued token for {}", params.username);
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

async fn chat_socket(
    ws: WebSocketUpgrade,
    Query(params): Query<ChatParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| {
        let span = info_span!("session", user = tracing::field::Empty);
        async move {
            let mut session = Session::new(
                WebSocketTransport(socket),
                state.tokens.clone(),
                state.generator.clone(),
            );
            let summary = session.run(params.token.as_deref()).await;
            debug!("Session finished: {:?}", summary);
        }
        .instrument(span)
    })
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "documents": state.generator.knowledge().len(),
    }))
}

/// [`Transport`] over an axum WebSocket. Binary, ping and pong frames are skipped.
pub struct WebSocketTransport(pub WebSocket);

#[async_trait]
impl Transport for WebSocketTransport {
    async fn recv(&mut self) -> Result<Incoming, BoxError> {
        loop {
            match self.0.recv().await {
                Some(Ok(Message::Text(text))) => return Ok(Incoming::Text(text)),
                Some(Ok(Message::Close(_))) | None => return Ok(Incoming::Disconnected),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), BoxError> {
        self.0.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BoxError> {
        self.0.send(Message::Close(None)).await?;
        Ok(())
    }
}

/// CORS for the configured browser origins. Unparseable origins are skipped.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Build the application router.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/token", post(issue_token))
        .route("/chat", get(chat_socket))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(router: Router, addr: &str) -> Result<(), Box<dyn Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("API server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  POST /token?username=<name>  - Issue an access token");
    info!("  GET  /chat?token=<token>     - WebSocket chat session");
    info!("  GET  /health                 - Health check");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
