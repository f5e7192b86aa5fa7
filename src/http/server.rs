//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the outbound client and the shared handler state
//! - Route every method and path to the forwarding handler
//! - Serve until the shutdown signal, then drain in-flight exchanges

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::routing::any;
use axum::Router;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::http::capture::CaptureBody;
use crate::http::forward::proxy_handler;
use crate::http::request::{Target, TargetError};
use crate::recording::{ExchangeSink, Sinks};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, CaptureBody<Body>>,
    pub target: Target,
    pub sinks: Sinks,
    pub upstream_timeout: Option<Duration>,
}

/// HTTP server for the recording proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a server forwarding to the configured target and handing
    /// completed exchanges to `sinks`, in order.
    pub fn new(
        config: &ProxyConfig,
        sinks: Vec<Arc<dyn ExchangeSink>>,
    ) -> Result<Self, TargetError> {
        let target = Target::new(&config.target.scheme, &config.target.host)?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        tracing::info!(
            target = %target.authority(),
            sinks = sinks.len(),
            upstream_timeout_secs = ?config.timeouts.upstream_secs,
            "Forwarding configured"
        );

        let state = AppState {
            client,
            target,
            sinks: Arc::from(sinks),
            upstream_timeout: config.timeouts.upstream_secs.map(Duration::from_secs),
        };

        Ok(Self {
            router: Self::build_router(state),
        })
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
