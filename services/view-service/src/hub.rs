use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::{collections::BTreeMap, fmt};

use crate::config::HubConfig;

const API_KEY_HEADER: &str = "X-API-Key";

/// Why a hub call did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub enum HubError {
    /// `/get_user` answered 503: every pooled user is taken.
    PoolExhausted,
    Status(u16),
    /// 200 with `success: false`.
    Rejected(String),
    Transport(String),
    Malformed(String),
}

impl HubError {
    pub fn reason(&self) -> &'static str {
        match self {
            HubError::PoolExhausted => "pool_exhausted",
            HubError::Status(_) => "hub_status",
            HubError::Rejected(_) => "hub_rejected",
            HubError::Transport(_) => "hub_unreachable",
            HubError::Malformed(_) => "hub_malformed",
        }
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::PoolExhausted => write!(f, "no free users available"),
            HubError::Status(code) => write!(f, "hub answered with status {code}"),
            HubError::Rejected(message) => write!(f, "hub rejected request: {message}"),
            HubError::Transport(message) => write!(f, "hub unreachable: {message}"),
            HubError::Malformed(message) => write!(f, "malformed hub response: {message}"),
        }
    }
}

impl std::error::Error for HubError {}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct LeasedUser {
    username: Option<String>,
}

#[derive(Deserialize, Default)]
struct UpdatedEnv {
    #[serde(default)]
    updated: Vec<String>,
}

/// Client for the hub control API (`CKAN_API_JUPYTERHUB`).
#[derive(Clone)]
pub struct HubClient {
    http: Client,
    config: HubConfig,
}

impl HubClient {
    pub fn new(config: HubConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(CONTENT_TYPE, "application/json");
        match self.config.api_key.as_deref() {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.with_headers(self.http.get(self.url(path)))
            .timeout(self.config.read_timeout)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.with_headers(self.http.post(self.url(path)))
            .timeout(self.config.write_timeout)
    }

    /// Sends the request and unwraps the `{success, data, error}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Option<T>, HubError> {
        let response = request.send().await.map_err(|err| {
            tracing::error!(operation, error = %err, "hub request failed");
            HubError::Transport(err.to_string())
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            if status == StatusCode::SERVICE_UNAVAILABLE {
                tracing::warn!(operation, status = status.as_u16(), "hub unavailable");
            } else {
                tracing::error!(operation, status = status.as_u16(), "hub request rejected");
            }
            return Err(HubError::Status(status.as_u16()));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|err| {
            tracing::error!(operation, error = %err, "hub response undecodable");
            HubError::Malformed(err.to_string())
        })?;
        if !envelope.success {
            let message = envelope
                .error
                .unwrap_or_else(|| "unknown error".to_string());
            tracing::error!(operation, error = %message, "hub reported failure");
            return Err(HubError::Rejected(message));
        }
        Ok(envelope.data)
    }

    /// Leases a free user from the hub pool.
    pub async fn lease_identity(&self) -> Result<String, HubError> {
        let data: Option<LeasedUser> = match self.call("get_user", self.get("get_user")).await {
            Ok(data) => data,
            Err(HubError::Status(503)) => return Err(HubError::PoolExhausted),
            Err(err) => return Err(err),
        };
        let username = data
            .and_then(|user| user.username)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                tracing::error!("hub lease response without username");
                HubError::Malformed("missing username".to_string())
            })?;
        tracing::info!(identity = %username, "leased hub user");
        Ok(username)
    }

    /// Copies `notebook_name` into the user's workspace; the hub overwrites
    /// any earlier copy.
    pub async fn copy_notebook(&self, identity: &str, notebook_name: &str) -> Result<(), HubError> {
        let body = serde_json::json!({
            "username": identity,
            "notebook_name": notebook_name,
        });
        self.call::<serde_json::Value>("copy_notebook", self.post("copy_notebook").json(&body))
            .await?;
        tracing::info!(identity, notebook = notebook_name, "notebook copied");
        Ok(())
    }

    /// Pushes the resource-limit variables as one batch. Returns the names the
    /// hub reports as updated.
    pub async fn update_env(
        &self,
        settings: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, HubError> {
        let data: Option<UpdatedEnv> = self
            .call("update_env", self.post("update_env").json(settings))
            .await?;
        let updated = data.unwrap_or_default().updated;
        tracing::info!(updated = ?updated, "hub variables updated");
        Ok(updated)
    }

    pub async fn restart(&self) -> Result<(), HubError> {
        self.call::<serde_json::Value>("restart_jupyterhub", self.post("restart_jupyterhub"))
            .await?;
        tracing::info!("hub restart successful");
        Ok(())
    }
}
