//! `DuelroomServer` builder and server loop.
//!
//! This is the entry point for running the real-time server. It ties the
//! layers together: transport → protocol → session/room → engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use duelroom_protocol::{Codec, JsonCodec};
use duelroom_room::RoomStore;
use duelroom_session::IdentityVerifier;
use duelroom_sweep::SweepConfig;
use duelroom_transport::{Transport, WebSocketTransport};
use tokio::sync::watch;

use crate::handler::handle_connection;
use crate::sweep::spawn_sweeper;
use crate::{Engine, EngineConfig, ServerError};

/// Builder for configuring and starting a duelroom server.
///
/// # Example
///
/// ```rust,ignore
/// use duelroom::prelude::*;
///
/// let server = DuelroomServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(Arc::new(my_verifier), Arc::new(MemoryRoomStore::new()))
///     .await?;
/// server.run().await
/// ```
pub struct DuelroomServerBuilder {
    bind_addr: String,
    config: EngineConfig,
}

impl DuelroomServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: EngineConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Replaces the whole engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how long a silent connection survives.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Sets the liveness sweep schedule.
    pub fn sweep(mut self, sweep: SweepConfig) -> Self {
        self.config.sweep = sweep;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<V, S>(
        self,
        verifier: Arc<V>,
        store: Arc<S>,
    ) -> Result<DuelroomServer<V, S, JsonCodec>, ServerError>
    where
        V: IdentityVerifier,
        S: RoomStore,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let engine = Arc::new(Engine::new(verifier, store, JsonCodec, self.config));
        Ok(DuelroomServer { transport, engine })
    }
}

impl Default for DuelroomServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound duelroom server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct DuelroomServer<V: IdentityVerifier, S: RoomStore, C: Codec> {
    transport: WebSocketTransport,
    engine: Arc<Engine<V, S, C>>,
}

impl<V, S, C> DuelroomServer<V, S, C>
where
    V: IdentityVerifier,
    S: RoomStore,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The shared engine, for in-process inspection.
    pub fn engine(&self) -> &Arc<Engine<V, S, C>> {
        &self.engine
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop and the sweeper until `signal` resolves, then
    /// stops the sweeper and closes every session.
    pub async fn run_until(mut self, signal: impl Future<Output = ()>) -> Result<(), ServerError> {
        let addr = self.local_addr().map_err(duelroom_transport::TransportError::AcceptFailed)?;
        tracing::info!(%addr, "duelroom server running");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = spawn_sweeper(
            Arc::clone(&self.engine),
            self.engine.config().sweep.clone(),
            shutdown_rx,
        );

        tokio::pin!(signal);
        loop {
            tokio::select! {
                () = &mut signal => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let engine = Arc::clone(&self.engine);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, engine).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutting down");
        let _ = shutdown_tx.send(true);
        if sweeper.await.is_err() {
            tracing::warn!("sweeper task panicked");
        }
        self.engine.shutdown().await;
        Ok(())
    }
}
