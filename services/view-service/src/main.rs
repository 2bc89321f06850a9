mod app;
mod config;
#[cfg(test)]
mod fake_hub;
mod handlers;
mod hub;
mod models;
mod service;
mod sessions;
mod settings;
mod state;
mod view;

use nbview_common::{bind_listener, env_or, init_tracing, shutdown_signal};
use std::net::SocketAddr;

use crate::config::ServiceConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let _guards = init_tracing("view-service");

    let port = env_or("PORT", 8080u16);
    // Hub endpoints are required; there is nothing to serve without them.
    let config = ServiceConfig::from_env().expect("service config");
    tracing::info!(
        hub = %config.hub.base_url,
        workspace = %config.workspace_url,
        formats = ?config.formats,
        admin_guard = config.admin_token.is_some(),
        "starting view service"
    );

    let state = AppState::new(config).expect("hub client");
    let app = app::build_router(state);
    let listener = bind_listener(port).await.expect("bind listener");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("serve");
}
