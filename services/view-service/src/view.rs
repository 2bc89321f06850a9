use serde::Serialize;
use std::path::Path;
use urlencoding::{decode, encode};

use crate::models::ResourceRef;

pub const VIEW_TEMPLATE: &str = "jupyternotebook_view.html";
pub const NO_USERS_TEMPLATE: &str = "jupyterhub_no_users.html";
pub const NO_USERS_NOTICE: &str =
    "Sorry, there is not more free JupyterHub user, wait few minutes please.";
pub const HUB_UNAVAILABLE_NOTICE: &str =
    "JupyterHub is currently unavailable, please try again later.";

#[derive(Serialize)]
pub struct ViewInfo {
    pub name: &'static str,
    pub title: &'static str,
    pub icon: &'static str,
    pub iframed: bool,
    pub always_available: bool,
    pub default_title: &'static str,
    pub formats: Vec<String>,
}

pub fn info(formats: &[String]) -> ViewInfo {
    ViewInfo {
        name: "jupyternotebook",
        title: "Jupyternotebook",
        icon: "video-camera",
        iframed: false,
        always_available: false,
        default_title: "Jupyternotebook",
        formats: formats.to_vec(),
    }
}

pub fn can_view(format: Option<&str>, formats: &[String]) -> bool {
    let format = format.unwrap_or_default().trim().to_ascii_lowercase();
    formats.iter().any(|allowed| *allowed == format)
}

fn is_safe_filename(name: &str) -> bool {
    // Reject paths or traversal attempts.
    if name.trim().is_empty() || name.contains("..") || name.contains(['/', '\\']) {
        return false;
    }
    name.chars().all(|c| {
        c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ' | '(' | ')')
    })
}

/// Last path segment of a resource URL, ignoring query and fragment. The
/// segment is percent-decoded before it is checked.
pub fn notebook_filename(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    let name = decode(segment).ok()?;
    if is_safe_filename(&name) {
        Some(name.into_owned())
    } else {
        None
    }
}

pub fn workspace_url(base: &str, identity: &str) -> String {
    format!("{base}user/{identity}/notebooks/")
}

/// A notebook resource as shown to one leased hub user.
#[derive(Serialize, Clone, Debug)]
pub struct NotebookFile {
    pub filename: String,
    pub resource_id: Option<String>,
    pub last_modified: Option<String>,
    pub url_type: Option<String>,
    pub local_path: String,
    pub workspace_url: String,
    pub notebook_url: String,
}

impl NotebookFile {
    pub fn new(
        filename: String,
        resource: &ResourceRef,
        notebooks_path: &Path,
        workspace_base: &str,
        identity: &str,
    ) -> Self {
        let workspace_url = workspace_url(workspace_base, identity);
        Self {
            local_path: notebooks_path.join(&filename).display().to_string(),
            notebook_url: format!("{workspace_url}{}", encode(&filename)),
            workspace_url,
            resource_id: resource.id.clone(),
            last_modified: resource.last_modified.clone(),
            url_type: resource.url_type.clone(),
            filename,
        }
    }
}
