//! HTTP server.

use crate::auth::AuthManager;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::http::HttpService;
use crate::metrics::Metrics;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taxii_protocol::Codec;
use taxii_storage::{MemoryStore, Persistence};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// How often expired tokens are dropped.
const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Where received content is persisted on shutdown.
    pub snapshot_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: 1000,
            snapshot_path: None,
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
}

/// TAXII HTTP server.
pub struct Server {
    config: ServerConfig,
    service: Arc<HttpService>,
    store: Arc<MemoryStore>,
    auth: Arc<AuthManager>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a server from its parts.
    pub fn new(
        config: ServerConfig,
        service: HttpService,
        store: Arc<MemoryStore>,
        auth: Arc<AuthManager>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            service: Arc::new(service),
            store,
            auth,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Builds storage, auth, metrics and the dispatcher from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let store = Arc::new(MemoryStore::new());
        store.create_services_from_object(config.services.clone())?;
        for collection in &config.collections {
            store.create_collection(collection.clone())?;
        }
        if let Some(ref path) = config.storage.snapshot_path {
            if !store.load_snapshot(path)? {
                tracing::info!("No snapshot at {}, starting empty", path.display());
            }
        }

        let auth = Arc::new(AuthManager::from_config(&config.auth));
        let metrics = if config.metrics.enabled {
            Some(Arc::new(Metrics::new()?))
        } else {
            None
        };

        let codec = Codec::with_versions(&config.protocol.versions);
        let mut dispatcher = Dispatcher::new(store.clone(), auth.clone(), codec)
            .with_domain(config.network.domain.clone())
            .with_xml_validation(config.protocol.xml_validation);
        if let Some(ref metrics) = metrics {
            dispatcher = dispatcher.with_metrics(metrics.clone());
        }

        let mut service = HttpService::new(
            Arc::new(dispatcher),
            auth.clone(),
            config.network.max_body_bytes,
        );
        if let Some(metrics) = metrics {
            service = service.with_metrics(metrics);
        }

        tracing::info!(
            "Loaded {} services, {} collections, {} accounts",
            store.services().len(),
            config.collections.len(),
            auth.account_count()
        );

        let server_config = ServerConfig {
            bind_addr: config.network.bind_addr,
            max_connections: config.network.max_connections,
            snapshot_path: config.storage.snapshot_path.clone(),
        };
        Ok(Self::new(server_config, service, store, auth))
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut purge = tokio::time::interval(TOKEN_PURGE_INTERVAL);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let service = self.service.clone();
                            let stats = self.stats.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                tracing::debug!("Client connected: {}", addr);
                                let io = TokioIo::new(stream);
                                let svc = service_fn(move |req| {
                                    let service = service.clone();
                                    async move { service.handle(req).await }
                                });
                                let conn = http1::Builder::new().serve_connection(io, svc);
                                tokio::pin!(conn);

                                let result = tokio::select! {
                                    result = conn.as_mut() => result,
                                    _ = conn_shutdown.recv() => {
                                        conn.as_mut().graceful_shutdown();
                                        conn.as_mut().await
                                    }
                                };
                                if let Err(e) = result {
                                    tracing::debug!("Connection {} error: {}", addr, e);
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::debug!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = purge.tick() => {
                    let purged = self.auth.purge_expired();
                    if purged > 0 {
                        tracing::debug!("Purged {} expired tokens", purged);
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Writes received content to the configured snapshot path, if any.
    pub fn save_snapshot(&self) -> Result<(), ServerError> {
        if let Some(ref path) = self.config.snapshot_path {
            self.store.save_snapshot(path)?;
        }
        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
