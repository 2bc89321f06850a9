use axum::http::{header::USER_AGENT, HeaderMap, StatusCode};
use std::{collections::HashMap, net::SocketAddr, time::UNIX_EPOCH};

use crate::config::ServiceConfig;
use crate::hub::HubError;
use crate::models::{
    ErrorResponse, NbFile, Notice, ReleaseResponse, RenderRequest, RenderResponse,
    RestartResponse, SessionEntry, SessionsResponse, SettingsResponse,
};
use crate::sessions::fingerprint_of;
use crate::settings::{
    apply_local, validate, CurrentSettings, SettingsForm, SettingsOutcome, ACTION_DEFAULT_SETUP,
    FIELD_ACTION,
};
use crate::state::AppState;
use crate::view::{
    can_view, notebook_filename, NotebookFile, HUB_UNAVAILABLE_NOTICE, NO_USERS_NOTICE,
    NO_USERS_TEMPLATE, VIEW_TEMPLATE,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const REASON_POOL_EXHAUSTED: &str = "pool_exhausted";
pub const REASON_HUB_UNAVAILABLE: &str = "hub_unavailable";

pub struct ServiceError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ServiceError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code,
                message: message.into(),
            },
        }
    }
}

/// The visiting client as seen by the fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

pub fn client_info(config: &ServiceConfig, headers: &HeaderMap, peer: SocketAddr) -> ClientInfo {
    // Any client can send the header; only a configured proxy is believed.
    let forwarded = if config.trusted_proxies.contains(&peer.ip()) {
        forwarded_for(headers)
    } else {
        None
    };
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    ClientInfo {
        ip: forwarded.unwrap_or_else(|| peer.ip().to_string()),
        user_agent,
    }
}

/// First hop of `X-Forwarded-For`, the address the proxy saw.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn check_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ServiceError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided == Some(expected) {
        return Ok(());
    }
    tracing::warn!("admin request without valid token");
    Err(ServiceError::new(
        StatusCode::FORBIDDEN,
        "not_authorized",
        "Need to be system administrator to administer.",
    ))
}

#[derive(Debug)]
pub enum ViewOutcome {
    Ready {
        identity: String,
        file: NotebookFile,
        reused: bool,
    },
    NoUsers {
        reason: &'static str,
    },
}

impl ViewOutcome {
    pub fn into_render(self, home_url: &str) -> RenderResponse {
        match self {
            ViewOutcome::Ready {
                identity,
                file,
                reused,
            } => RenderResponse {
                template: VIEW_TEMPLATE,
                nb_file: NbFile::File(file),
                identity: Some(identity),
                reused_session: reused,
                reason: None,
                notice: None,
                home_url: None,
            },
            ViewOutcome::NoUsers { reason } => {
                // Only an exhausted pool is worth waiting for.
                let notice = if reason == REASON_POOL_EXHAUSTED {
                    Notice::notice(NO_USERS_NOTICE)
                } else {
                    Notice::error(HUB_UNAVAILABLE_NOTICE)
                };
                RenderResponse {
                    template: NO_USERS_TEMPLATE,
                    nb_file: NbFile::Error("ERROR"),
                    identity: None,
                    reused_session: false,
                    reason: Some(reason),
                    notice: Some(notice),
                    home_url: Some(home_url.to_string()),
                }
            }
        }
    }
}

/// Finds or leases a hub user for this client and puts the notebook in its
/// workspace.
pub async fn open_notebook(
    state: &AppState,
    client: &ClientInfo,
    request: &RenderRequest,
) -> Result<ViewOutcome, ServiceError> {
    let resource = &request.resource;
    if !can_view(resource.format.as_deref(), &state.config.formats) {
        return Err(ServiceError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_format",
            format!(
                "resource format {:?} cannot be viewed as a notebook",
                resource.format.as_deref().unwrap_or_default()
            ),
        ));
    }

    let source = request
        .jupyternotebook_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .or(resource.url.as_deref())
        .ok_or_else(|| {
            ServiceError::new(StatusCode::BAD_REQUEST, "missing_url", "resource has no url")
        })?;
    let filename = notebook_filename(source).ok_or_else(|| {
        ServiceError::new(
            StatusCode::BAD_REQUEST,
            "invalid_notebook",
            "notebook filename is not allowed",
        )
    })?;

    let fingerprint = fingerprint_of(&client.ip, &client.user_agent);
    tracing::info!(fingerprint = %fingerprint, "notebook view requested");

    let (identity, reused) = match state.sessions.lookup(&fingerprint).await {
        Some(identity) => (identity, true),
        None => match state.hub.lease_identity().await {
            Ok(identity) => {
                state.sessions.assign(&identity, &fingerprint).await;
                tracing::debug!(identity = %identity, "new user assigned");
                (identity, false)
            }
            Err(err) => {
                let reason = match err {
                    HubError::PoolExhausted => REASON_POOL_EXHAUSTED,
                    _ => REASON_HUB_UNAVAILABLE,
                };
                tracing::warn!(
                    error = %err,
                    hub_reason = err.reason(),
                    reason,
                    "no hub user for viewer"
                );
                return Ok(ViewOutcome::NoUsers { reason });
            }
        },
    };

    // A failed copy leaves earlier copies usable, so the view still renders.
    if let Err(err) = state.hub.copy_notebook(&identity, &filename).await {
        tracing::error!(
            identity = %identity,
            notebook = %filename,
            error = %err,
            "notebook copy failed"
        );
    }

    let file = NotebookFile::new(
        filename,
        resource,
        &state.config.notebooks_path,
        &state.config.workspace_url,
        &identity,
    );
    let sessions = state.sessions.len().await;
    tracing::info!(
        identity = %identity,
        reused,
        notebook_url = %file.notebook_url,
        sessions,
        "notebook view ready"
    );
    Ok(ViewOutcome::Ready {
        identity,
        file,
        reused,
    })
}

/// GET passes no fields and only reads the current values.
pub async fn admin_settings(
    state: &AppState,
    fields: Option<&HashMap<String, String>>,
) -> SettingsResponse {
    let fields = match fields {
        Some(fields)
            if fields.get(FIELD_ACTION).map(String::as_str) == Some(ACTION_DEFAULT_SETUP) =>
        {
            fields
        }
        _ => return settings_response(None, None),
    };

    let settings = match validate(&SettingsForm::from_fields(fields)) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::info!(error = %err, "settings form rejected");
            return settings_response(
                Some("invalid"),
                Some(Notice::error(format!("Invalid input: {err}"))),
            );
        }
    };

    let updates = settings.env_updates();
    let local_ok = apply_local(&updates).is_ok();
    let remote_ok = state.hub.update_env(&settings.as_map()).await.is_ok();
    let outcome = SettingsOutcome::from_results(local_ok, remote_ok);
    tracing::info!(
        local_ok,
        remote_ok,
        outcome = outcome.as_str(),
        "settings update applied"
    );

    let notice = match outcome {
        SettingsOutcome::Updated => {
            // The hub recycles its users on reconfiguration.
            let dropped = state.sessions.clear().await;
            tracing::info!(dropped, "session assignments cleared");
            Notice::success(outcome.message())
        }
        SettingsOutcome::RemoteFailed | SettingsOutcome::Failed => Notice::error(outcome.message()),
    };
    settings_response(Some(outcome.as_str()), Some(notice))
}

fn settings_response(outcome: Option<&'static str>, notice: Option<Notice>) -> SettingsResponse {
    SettingsResponse {
        status: "ok",
        outcome,
        notice,
        settings: CurrentSettings::from_env(),
    }
}

pub async fn restart_hub(state: &AppState) -> Result<RestartResponse, ServiceError> {
    state.hub.restart().await.map_err(|err| {
        ServiceError::new(
            StatusCode::BAD_GATEWAY,
            "hub_restart_failed",
            err.to_string(),
        )
    })?;
    Ok(RestartResponse { status: "ok" })
}

pub async fn list_sessions(state: &AppState) -> SessionsResponse {
    let sessions: Vec<SessionEntry> = state
        .sessions
        .snapshot()
        .await
        .into_iter()
        .map(|assignment| SessionEntry {
            assigned_at_secs: assignment
                .assigned_at
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            identity: assignment.identity,
            fingerprint: assignment.fingerprint,
        })
        .collect();
    SessionsResponse {
        count: sessions.len(),
        sessions,
    }
}

pub async fn release_session(state: &AppState, identity: &str) -> ReleaseResponse {
    let released = state.sessions.release(identity).await;
    tracing::info!(identity, released, "session release requested");
    ReleaseResponse {
        status: "ok",
        released,
    }
}
