use nbview_common::{env_list, env_opt, env_or};
use std::{net::IpAddr, path::PathBuf, time::Duration};

#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Control API base, without trailing slash.
    pub base_url: String,
    pub api_key: Option<String>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub hub: HubConfig,
    /// Viewer-facing hub URL, always ending in `/`.
    pub workspace_url: String,
    pub notebooks_path: PathBuf,
    pub formats: Vec<String>,
    pub home_url: String,
    /// Peers whose `X-Forwarded-For` header is believed. Empty means the
    /// header is ignored and the socket address is used.
    pub trusted_proxies: Vec<IpAddr>,
    pub admin_token: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, String> {
        let base_url = env_opt("CKAN_API_JUPYTERHUB")
            .ok_or_else(|| "CKAN_API_JUPYTERHUB is required".to_string())?;
        let workspace_url = env_opt("CKAN_JUPYTERNOTEBOOK_URL")
            .ok_or_else(|| "CKAN_JUPYTERNOTEBOOK_URL is required".to_string())?;

        let hub = HubConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: env_opt("JUPYTERHUB_API_TOKEN"),
            read_timeout: Duration::from_secs(env_or("HUB_READ_TIMEOUT_SECS", 10u64)),
            write_timeout: Duration::from_secs(env_or("HUB_WRITE_TIMEOUT_SECS", 30u64)),
        };

        Ok(Self {
            hub,
            workspace_url: with_trailing_slash(&workspace_url),
            notebooks_path: PathBuf::from(
                env_opt("CKAN_JUPYTERNOTEBOOKS_PATH")
                    .unwrap_or_else(|| "/var/lib/ckan/notebook".to_string()),
            ),
            formats: env_list("NBVIEW_FORMATS", &["ipynb"]),
            home_url: env_opt("NBVIEW_HOME_URL").unwrap_or_else(|| "/".to_string()),
            trusted_proxies: parse_proxies(&env_list("NBVIEW_TRUSTED_PROXIES", &[])),
            admin_token: env_opt("NBVIEW_ADMIN_TOKEN"),
        })
    }
}

fn parse_proxies(entries: &[String]) -> Vec<IpAddr> {
    entries
        .iter()
        .filter_map(|entry| match entry.parse::<IpAddr>() {
            Ok(addr) => Some(addr),
            Err(_) => {
                tracing::warn!(entry = %entry, "ignoring invalid trusted proxy address");
                None
            }
        })
        .collect()
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}
