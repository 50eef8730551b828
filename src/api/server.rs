//! HTTP server lifecycle
//!
//! [`serve`] binds the configured address and runs the router until the
//! shutdown future resolves.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::http::create_router;
use super::state::AppState;
use crate::event_store::StoreConfig;

/// Environment variable overriding the listen address
pub const BIND_ADDR_ENV: &str = "ERRORSTACK_BIND_ADDR";

const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
    5000,
);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let bind_addr = match lookup(BIND_ADDR_ENV) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(key = BIND_ADDR_ENV, value = %raw, "Invalid bind address, using default");
                DEFAULT_BIND_ADDR
            }),
            None => DEFAULT_BIND_ADDR,
        };

        Self {
            bind_addr,
            store: StoreConfig::from_lookup(lookup),
        }
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("serve error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind_addr,
            source,
        })?;
    serve_on(listener, state, shutdown).await
}

/// Serve on an already-bound listener
pub async fn serve_on(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let addr = listener.local_addr()?;
    info!(%addr, "Errorstack server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Errorstack server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_overrides() {
        let config = ServerConfig::from_lookup(|_: &str| None);
        assert_eq!(config.bind_addr, "127.0.0.1:5000".parse::<SocketAddr>().unwrap());

        let config = ServerConfig::from_lookup(|key: &str| match key {
            BIND_ADDR_ENV => Some("0.0.0.0:8080".to_string()),
            _ => None,
        });
        assert_eq!(config.bind_addr.port(), 8080);

        let config = ServerConfig::from_lookup(|key: &str| match key {
            BIND_ADDR_ENV => Some("not an address".to_string()),
            _ => None,
        });
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let state = Arc::new(AppState::default());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(serve_on(listener, state, async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        assert!(server.await.unwrap().is_ok());
    }
}
