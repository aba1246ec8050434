//! Server Implementation
//!
//! HTTP 服务器启动和管理

use std::net::SocketAddr;
use std::time::Duration;

use crate::core::{Config, Result, ServerState};

/// HTTP Server
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Create server with existing state
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    /// 启动 HTTP 服务，直到收到 Ctrl+C
    pub async fn run(&self) -> Result<()> {
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        };
        self.run_until(shutdown).await
    }

    /// 启动 HTTP 服务，`shutdown` 完成后优雅退出
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config).await?,
        };

        let tasks = state.start_background_tasks();
        let app = crate::api::build_app(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Fiscal server listening on {}", addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        tasks
            .shutdown(Duration::from_millis(self.config.shutdown_timeout_ms))
            .await;

        served?;
        Ok(())
    }
}
