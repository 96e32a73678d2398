//! TCP listener setup.
//!
//! # Responsibilities
//! - Resolve the configured address and port
//! - Bind before anything that needs the real local address (port 0)
//! - Hand the bound socket to the HTTP server

use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The configured address is not an IP address.
    Address(String),
    /// Failed to bind to address.
    Bind(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Address(addr) => write!(f, "Invalid listener address: {}", addr),
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bound listener and the address it actually listens on.
#[derive(Debug)]
pub struct Listener {
    /// The bound socket.
    inner: TcpListener,
    /// Address reported by the OS after binding.
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let ip: IpAddr = config
            .address
            .parse()
            .map_err(|_| ListenerError::Address(config.address.clone()))?;

        let inner = TcpListener::bind(SocketAddr::new(ip, config.port))
            .await
            .map_err(ListenerError::Bind)?;

        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// Get the address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Consume the wrapper and return the bound socket.
    pub fn into_inner(self) -> TcpListener {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn port_zero_reports_the_real_port() {
        let listener = Listener::bind(&ListenerConfig {
            address: "127.0.0.1".into(),
            port: 0,
        })
        .await
        .unwrap();

        assert_ne!(listener.local_addr().port(), 0);
        assert!(listener.local_addr().ip().is_loopback());
    }

    #[tokio::test]
    async fn rejects_host_names() {
        let err = Listener::bind(&ListenerConfig {
            address: "localhost".into(),
            port: 0,
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ListenerError::Address(_)));
    }
}
