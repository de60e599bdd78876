//! Server runner.

use std::future::Future;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::routes::router;
use crate::state::AppState;

/// HTTP and WebSocket server.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Creates a new server.
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Runs the server until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or serving fails.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(shutdown_signal()).await
    }

    /// Runs the server until `signal` resolves, then stops the hub.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or serving fails.
    pub async fn run_until<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.addr()).await?;
        self.serve(listener, signal).await
    }

    /// Serves on an already bound listener until `signal` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub is already stopped or serving fails.
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let manager = self.state.manager.clone();
        manager.start().await?;

        info!(addr = %listener.local_addr()?, "Fanout server listening");

        let app = router(self.state);
        let hub = manager.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                info!("Shutdown signal received");
                hub.stop().await;
            })
            .await?;

        // No-op when the signal already stopped the hub.
        manager.stop().await;
        info!("Fanout server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn test_serve_stops_hub_on_signal() {
        let state = AppState::from_config(&ServerConfig::default()).expect("state");
        let manager = state.manager.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let (tx, rx) = oneshot::channel::<()>();

        let server = Server::new(ServerConfig::new("127.0.0.1", 0), state);
        let handle = tokio::spawn(server.serve(listener, async move {
            let _ = rx.await;
        }));

        tokio::task::yield_now().await;
        let _ = tx.send(());
        tokio_test::assert_ok!(handle.await.expect("join"));

        assert!(!manager.is_running().await);
        assert!(manager.start().await.is_err());
    }

    #[tokio::test]
    async fn test_serve_rejects_stopped_hub() {
        let state = AppState::from_config(&ServerConfig::default()).expect("state");
        state.manager.stop().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");

        let result = Server::new(ServerConfig::default(), state)
            .serve(listener, std::future::pending::<()>())
            .await;
        assert!(matches!(result, Err(ServerError::Hub(_))));
    }
}
