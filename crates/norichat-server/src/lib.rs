//! Route assembly for the NoriChat server.
//!
//! Exposed as a library so integration tests can spawn the exact production
//! router against a throwaway database.

use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use norichat_api::auth::{self, AppState};
use norichat_api::middleware::{require_auth, JwtSecret};
use norichat_api::{channels, messages, servers};
use norichat_gateway::connection;
use norichat_gateway::registry::Registry;

/// Inbound WebSocket messages (and frames) are capped at 64 KiB; anything
/// larger closes the connection.
const MAX_WS_MESSAGE_BYTES: usize = 64 * 1024;

/// WebSocket subprotocol advertised on upgrade.
const WS_SUBPROTOCOL: &str = "norichat";

#[derive(Clone)]
pub struct ServerState {
    pub app: AppState,
    pub registry: Registry,
    pub jwt_secret: Arc<str>,
}

impl ServerState {
    pub fn new(app: AppState, registry: Registry) -> Self {
        let jwt_secret = Arc::from(app.jwt_secret.as_str());
        Self {
            app,
            registry,
            jwt_secret,
        }
    }
}

/// Build the full router: public auth endpoints, bearer-protected directory
/// and history endpoints, and the WebSocket gateway, all on one port.
pub fn app(state: ServerState) -> Router {
    let public_routes = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .with_state(state.app.clone());

    let protected_routes = Router::new()
        .route("/api/servers", get(servers::list_servers))
        .route(
            "/api/channels",
            get(channels::list_channels).post(channels::create_channel),
        )
        .route("/api/members", get(servers::list_members))
        .route("/api/messages", get(messages::get_messages))
        .layer(middleware::from_fn(require_auth))
        .with_state(state.app.clone());

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state.clone());

    // The original API answered every origin; same here.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(Extension(JwtSecret(state.jwt_secret.clone())))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.protocols([WS_SUBPROTOCOL])
        .max_frame_size(MAX_WS_MESSAGE_BYTES)
        .max_message_size(MAX_WS_MESSAGE_BYTES)
        .on_upgrade(move |socket| {
            connection::handle_socket(
                socket,
                state.registry,
                state.app.db.clone(),
                state.jwt_secret,
            )
        })
}
