use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::hub::HubClient;
use crate::sessions::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub hub: HubClient,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Result<Self, reqwest::Error> {
        let hub = HubClient::new(config.hub.clone())?;
        Ok(Self {
            config: Arc::new(config),
            hub,
            sessions: Arc::new(SessionStore::new()),
        })
    }
}
