//! Shared application state.

use std::sync::Arc;

use fanout_hub::{ConnectionManager, HubError};

use crate::config::ServerConfig;

/// State shared by every route.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Connection manager.
    pub manager: Arc<ConnectionManager>,

    /// Channel used by `GET /ws`.
    pub default_channel: Arc<str>,
}

impl AppState {
    /// Creates state around an existing manager.
    #[must_use]
    pub fn new(manager: Arc<ConnectionManager>, default_channel: impl Into<Arc<str>>) -> Self {
        Self {
            manager,
            default_channel: default_channel.into(),
        }
    }

    /// Builds a fresh manager from the server configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub configuration is invalid.
    pub fn from_config(config: &ServerConfig) -> Result<Self, HubError> {
        let manager = ConnectionManager::new(config.hub.clone())?;
        Ok(Self::new(Arc::new(manager), config.default_channel.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_from_config() {
        let state = AppState::from_config(&ServerConfig::default()).expect("state");
        assert_eq!(&*state.default_channel, "metrics");
        assert_eq!(state.manager.channels().await, vec!["alerts", "metrics"]);
        assert!(!state.manager.is_running().await);
    }
}
