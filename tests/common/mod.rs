//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use recording_proxy::config::ProxyConfig;
use recording_proxy::lifecycle::startup::{self, StartupError};
use recording_proxy::lifecycle::Shutdown;
use recording_proxy::store::MemoryStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

/// Serve `router` as an origin on an ephemeral port.
pub async fn spawn_origin(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A proxy persisting into a [`MemoryStore`].
pub struct TestProxy {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), StartupError>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the recorder to drain.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("proxy did not shut down")
            .unwrap()
            .unwrap();
    }
}

/// Proxy forwarding to `origin` with default settings.
pub async fn spawn_proxy(origin: SocketAddr) -> TestProxy {
    spawn_proxy_with(origin, |_| {}).await
}

/// Proxy forwarding to `origin`, after `configure` adjusted the config.
pub async fn spawn_proxy_with<F>(origin: SocketAddr, configure: F) -> TestProxy
where
    F: FnOnce(&mut ProxyConfig),
{
    let mut config = ProxyConfig::default();
    config.target.host = origin.to_string();
    config.recorder.pod = "pod-test".to_string();
    config.recorder.service = "orders".to_string();
    configure(&mut config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store = Arc::new(MemoryStore::new());
    let shutdown = Shutdown::new();

    let handle = {
        let store = store.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { startup::serve(&config, store, listener, &shutdown).await })
    };

    TestProxy {
        addr,
        store,
        shutdown,
        handle,
    }
}

/// Client that never goes through a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
}
