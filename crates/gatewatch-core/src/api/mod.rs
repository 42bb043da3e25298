//! Read-only HTTP API over the monitor's latest state

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::alerting::Monitor;
use crate::error::{Error, Result};

/// HTTP API server
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            state: AppState { monitor },
        }
    }

    /// Bind `addr` without serving yet
    pub async fn bind(self, addr: &str) -> Result<BoundServer> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::internal(format!("cannot bind {addr}: {e}")))?;

        info!("HTTP server listening on {}", listener.local_addr()?);

        Ok(BoundServer {
            listener,
            state: self.state,
        })
    }
}

/// A server holding its listening socket
pub struct BoundServer {
    listener: TcpListener,
    state: AppState,
}

impl BoundServer {
    /// Address actually bound, useful with port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve requests until the task is dropped
    pub async fn serve(self) -> Result<()> {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = create_router(self.state)
            .layer(TraceLayer::new_for_http())
            .layer(cors);

        axum::serve(self.listener, app)
            .await
            .map_err(|e| Error::internal(e.to_string()))?;

        Ok(())
    }
}
