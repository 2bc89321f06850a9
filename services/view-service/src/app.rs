use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    get_settings, healthz, list_sessions, open_view, post_settings, readyz, release_session,
    render_view, restart_hub, view_info,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/view/info", get(view_info))
        .route("/v1/view/render", post(render_view))
        .route("/v1/view/open", get(open_view))
        .route("/v1/admin/settings", get(get_settings).post(post_settings))
        .route("/v1/admin/restart", post(restart_hub))
        .route("/v1/admin/sessions", get(list_sessions))
        .route("/v1/admin/sessions/:identity", delete(release_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
