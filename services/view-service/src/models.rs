use serde::{Deserialize, Serialize};

use crate::settings::CurrentSettings;
use crate::view::NotebookFile;

#[derive(Deserialize, Default, Clone, Debug)]
pub struct ResourceRef {
    pub id: Option<String>,
    pub url: Option<String>,
    pub format: Option<String>,
    pub last_modified: Option<String>,
    pub url_type: Option<String>,
}

#[derive(Deserialize, Default, Debug)]
pub struct RenderRequest {
    pub resource: ResourceRef,
    /// Per-view URL override; wins over the resource URL.
    pub jupyternotebook_url: Option<String>,
}

/// Query form of [`RenderRequest`] for the redirecting endpoint.
#[derive(Deserialize, Default, Debug)]
pub struct OpenQuery {
    pub resource_id: Option<String>,
    pub url: Option<String>,
    pub format: Option<String>,
    pub last_modified: Option<String>,
    pub url_type: Option<String>,
    pub jupyternotebook_url: Option<String>,
}

impl From<OpenQuery> for RenderRequest {
    fn from(query: OpenQuery) -> Self {
        Self {
            resource: ResourceRef {
                id: query.resource_id,
                url: query.url,
                format: query.format,
                last_modified: query.last_modified,
                url_type: query.url_type,
            },
            jupyternotebook_url: query.jupyternotebook_url,
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct Notice {
    pub category: &'static str,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            category: "success",
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            category: "error",
            message: message.into(),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            category: "notice",
            message: message.into(),
        }
    }
}

/// `nb_file` is the notebook descriptor, or the literal `"ERROR"` when no
/// hub user could be leased.
#[derive(Serialize, Debug)]
#[serde(untagged)]
pub enum NbFile {
    File(NotebookFile),
    Error(&'static str),
}

#[derive(Serialize, Debug)]
pub struct RenderResponse {
    pub template: &'static str,
    pub nb_file: NbFile,
    pub identity: Option<String>,
    pub reused_session: bool,
    pub reason: Option<&'static str>,
    pub notice: Option<Notice>,
    pub home_url: Option<String>,
}

#[derive(Serialize)]
pub struct SettingsResponse {
    pub status: &'static str,
    pub outcome: Option<&'static str>,
    pub notice: Option<Notice>,
    pub settings: CurrentSettings,
}

#[derive(Serialize)]
pub struct RestartResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct SessionEntry {
    pub identity: String,
    pub fingerprint: String,
    pub assigned_at_secs: u64,
}

#[derive(Serialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionEntry>,
}

#[derive(Serialize)]
pub struct ReleaseResponse {
    pub status: &'static str,
    pub released: bool,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}
