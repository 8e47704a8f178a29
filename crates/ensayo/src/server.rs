//! Static file server for the project under test.
//!
//! [`StaticServerLauncher::start`] binds the listener before returning, so the
//! server accepts connections by the time the caller gets a handle back.

use crate::result::{EnsayoError, EnsayoResult};
use crate::settings::ProjectSettings;
use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

/// Where and what to serve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port; 0 picks a free port
    pub port: u16,
    /// Directory served at `/`
    pub directory: PathBuf,
    /// Log every request
    pub verbose: bool,
}

impl ServerConfig {
    /// Server config from project settings
    #[must_use]
    pub fn from_settings(settings: &ProjectSettings, verbose: bool) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            directory: settings.serve_dir(),
            verbose,
        }
    }

    /// `host:port` to bind
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Starts a server
#[async_trait]
pub trait ServerLauncher: Send + Sync + fmt::Debug {
    /// Start serving; returns once the server accepts connections
    async fn start(&self, config: &ServerConfig) -> EnsayoResult<Box<dyn RunningServer>>;
}

/// A server that is accepting connections
#[async_trait]
pub trait RunningServer: Send + Sync + fmt::Debug {
    /// URL tests navigate against
    fn base_url(&self) -> String;

    /// Stop accepting connections and wait for in-flight requests
    async fn stop(self: Box<Self>) -> EnsayoResult<()>;
}

/// Launches the axum static server
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticServerLauncher;

#[async_trait]
impl ServerLauncher for StaticServerLauncher {
    async fn start(&self, config: &ServerConfig) -> EnsayoResult<Box<dyn RunningServer>> {
        Ok(Box::new(StaticServer::start(config).await?))
    }
}

/// Build the static router for `config`
pub fn router(config: &ServerConfig) -> Router {
    let files = ServeDir::new(&config.directory).append_index_html_on_directories(true);
    let app = Router::new()
        .fallback_service(files)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ));

    if config.verbose {
        app.layer(middleware::from_fn(log_request))
    } else {
        app
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/// Running axum server
pub struct StaticServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl fmt::Debug for StaticServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticServer")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl StaticServer {
    /// Bind and start serving in a background task
    pub async fn start(config: &ServerConfig) -> EnsayoResult<Self> {
        let bind = config.bind_addr();
        let server_error = |e: std::io::Error| EnsayoError::ServerStart {
            addr: bind.clone(),
            message: e.to_string(),
        };

        if !config.directory.is_dir() {
            tracing::warn!(dir = %config.directory.display(), "serve directory does not exist");
        }

        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .map_err(server_error)?;
        let addr = listener.local_addr().map_err(server_error)?;

        let app = router(config);
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
        });

        tracing::info!(
            url = %format!("http://{addr}"),
            dir = %config.directory.display(),
            "server listening"
        );
        Ok(Self {
            addr,
            shutdown: Some(tx),
            task,
        })
    }

    /// Bound address
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl RunningServer for StaticServer {
    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    async fn stop(mut self: Box<Self>) -> EnsayoResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match (&mut self.task).await {
            Ok(result) => result?,
            Err(e) => tracing::warn!(error = %e, "server task ended abnormally"),
        }
        tracing::info!(addr = %self.addr, "server stopped");
        Ok(())
    }
}
