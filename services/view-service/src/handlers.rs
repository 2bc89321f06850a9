use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use std::{collections::HashMap, net::SocketAddr};

use crate::models::{OpenQuery, RenderRequest};
use crate::service::{self, ServiceError, ViewOutcome};
use crate::state::AppState;
use crate::view;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz() -> StatusCode {
    StatusCode::OK
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub async fn view_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(view::info(&state.config.formats))
}

pub async fn render_view(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<RenderRequest>,
) -> Response {
    let client = service::client_info(&state.config, &headers, peer);
    match service::open_notebook(&state, &client, &payload).await {
        Ok(outcome) => {
            let body = outcome.into_render(&state.config.home_url);
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub async fn open_view(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<OpenQuery>,
) -> Response {
    let client = service::client_info(&state.config, &headers, peer);
    let request = RenderRequest::from(query);
    match service::open_notebook(&state, &client, &request).await {
        Ok(ViewOutcome::Ready { file, .. }) => Redirect::to(&file.notebook_url).into_response(),
        Ok(outcome) => {
            let body = outcome.into_render(&state.config.home_url);
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub async fn get_settings(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(err) = service::check_admin(&state, &headers) {
        return err.into_response();
    }
    Json(service::admin_settings(&state, None).await).into_response()
}

pub async fn post_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    if let Err(err) = service::check_admin(&state, &headers) {
        return err.into_response();
    }
    Json(service::admin_settings(&state, Some(&fields)).await).into_response()
}

pub async fn restart_hub(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(err) = service::check_admin(&state, &headers) {
        return err.into_response();
    }
    match service::restart_hub(&state).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn list_sessions(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(err) = service::check_admin(&state, &headers) {
        return err.into_response();
    }
    Json(service::list_sessions(&state).await).into_response()
}

pub async fn release_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(identity): Path<String>,
) -> Response {
    if let Err(err) = service::check_admin(&state, &headers) {
        return err.into_response();
    }
    Json(service::release_session(&state, &identity).await).into_response()
}
