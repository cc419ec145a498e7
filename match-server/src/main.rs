mod board;
mod config;
mod connection;
mod engine;
mod game_match;
mod line_generator;
mod outbox;
mod registry;
mod session;

use crate::config::{CONFIG_PATH_VARIABLE, DEFAULT_CONFIG_PATH, load_config};
use crate::connection::websocket;
use crate::engine::{EngineHandle, Event, spawn_engine};
use crate::registry::Registry;
use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use tokio::sync::oneshot;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
/// Activates tracing, loads the config, starts the engine that owns all matches, then sets up
/// the routing system to serve the web sockets, the match listing and the static client files.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true) // Module path (e.g. match_server::engine)
                .with_thread_ids(true) // Thread-ID (helpful for Tokio)
                .with_thread_names(true), // Thread-Name
        )
        .init();

    let config_path =
        std::env::var(CONFIG_PATH_VARIABLE).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    let config = match load_config(&config_path).await {
        Ok(config) => config,
        Err(message) => {
            tracing::error!(message, "Initial load error.");
            panic!("Initial load error: {}", message);
        }
    };

    let registry = Registry::new(config.timings(), StdRng::from_os_rng());
    let engine = spawn_engine(registry);

    let index = Path::new(&config.static_dir).join("index.html");
    let app = Router::new()
        .route("/enlist", get(enlist_handler))
        .route("/ws", get(websocket_handler))
        .with_state(engine)
        .fallback_service(ServeDir::new(&config.static_dir).not_found_service(ServeFile::new(index)));

    let address = config.socket_address();
    let listener = tokio::net::TcpListener::bind(&address).await.unwrap();
    tracing::info!(%address, "Match server listening.");

    axum::serve(listener, app).await.unwrap();
}

/// Generates a list with the current matches, their status and their pending obstacles.
async fn enlist_handler(State(engine): State<EngineHandle>) -> String {
    let (reply, answer) = oneshot::channel();
    if engine.send(Event::Enlist { reply }).await.is_err() {
        return "Engine stopped.".into();
    }
    answer.await.unwrap_or_else(|_| "Engine stopped.".into())
}

/// This function gets immediately called and upgrades the web response to a web socket.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(engine): State<EngineHandle>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| websocket(socket, engine))
}
