//! Liveness endpoint for hosting platforms that probe over HTTP.
//!
//! `GET /` answers `200 Bot is alive!`. Nothing else is routed. The server
//! runs as a task on the bot's runtime; it shares no state with the bot.

use axum::Router;
use axum::routing::get;
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub const ALIVE: &str = "Bot is alive!";

pub fn router() -> Router {
    Router::new().route("/", get(|| async { ALIVE }))
}

/// Bind on all interfaces.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    axum::serve(listener, router()).await
}
