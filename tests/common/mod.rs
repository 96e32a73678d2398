//! Shared utilities for end-to-end tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use rpc_gateway::config::{ListenerConfig, TimeoutOverride};
use rpc_gateway::{ComponentFactory, Gateway, GatewayConfig, Shutdown};
use tempfile::TempDir;

pub const INDEX_HTML: &str = "<!doctype html><html><body>console</body></html>";

/// A gateway serving on an ephemeral loopback port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub assets: TempDir,
    serving: tokio::task::JoinHandle<Result<(), rpc_gateway::StartupError>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to stop.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(20), self.serving)
            .await
            .expect("gateway did not stop in time")
            .expect("serve task panicked");
        assert!(result.is_ok(), "serve failed: {result:?}");
    }
}

/// Configuration bound to 127.0.0.1:0 with the null metrics reporter.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.server.listener = ListenerConfig {
        address: "127.0.0.1".into(),
        port: 0,
    };
    config
}

pub fn timeout_override(service: &str, method: &str, timeout_ms: u64) -> TimeoutOverride {
    TimeoutOverride {
        service: service.into(),
        method: method.into(),
        timeout_ms,
    }
}

fn asset_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), INDEX_HTML).unwrap();
    std::fs::write(dir.path().join("favicon.ico"), "icon").unwrap();
    dir
}

/// Build and start a gateway with a temporary single-page app directory.
pub async fn start_gateway(config: GatewayConfig, factory: ComponentFactory) -> TestGateway {
    let assets = asset_dir();
    let gateway = Gateway::build(config, factory, Some(assets.path().to_path_buf()))
        .await
        .expect("gateway should build");

    let addr = gateway.local_addr();
    let shutdown = gateway.shutdown_handle();
    let serving = tokio::spawn(gateway.serve());

    TestGateway {
        addr,
        shutdown,
        assets,
        serving,
    }
}
