//! Per-connection tasks.
//!
//! Each accepted socket gets two tasks:
//!   - the reader (this function) reads frames in arrival order and hands
//!     each to the engine, one at a time
//!   - the writer drains the session's outbox into the socket
//!
//! When the writer can no longer send it exits and drops the outbox
//! receiver, which is how the rest of the server learns the socket is dead.
//! When the outbox is dropped from the other side the writer closes the
//! socket, which ends the reader.

use std::sync::Arc;

use duelroom_protocol::Codec;
use duelroom_room::RoomStore;
use duelroom_session::{Frame, IdentityVerifier, SessionId};
use duelroom_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::{Engine, ServerError};

/// Disconnects the session when the handler exits, even by panic.
///
/// `Drop` is synchronous, so the fallback path spawns the async cleanup.
/// The normal path calls [`SessionGuard::disconnect`] and awaits it inline.
struct SessionGuard<V: IdentityVerifier, S: RoomStore, C: Codec> {
    session: SessionId,
    engine: Option<Arc<Engine<V, S, C>>>,
}

impl<V: IdentityVerifier, S: RoomStore, C: Codec> SessionGuard<V, S, C> {
    async fn disconnect(mut self) {
        if let Some(engine) = self.engine.take() {
            engine.disconnect(self.session).await;
        }
    }
}

impl<V: IdentityVerifier, S: RoomStore, C: Codec> Drop for SessionGuard<V, S, C> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            let session = self.session;
            tokio::spawn(async move {
                engine.disconnect(session).await;
            });
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<V, S, C>(
    conn: WebSocketConnection,
    engine: Arc<Engine<V, S, C>>,
) -> Result<(), ServerError>
where
    V: IdentityVerifier,
    S: RoomStore,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();

    let (outbox, mut inbox) = mpsc::unbounded_channel::<Frame>();
    let session = engine.connect(outbox).await;
    let guard = SessionGuard {
        session,
        engine: Some(Arc::clone(&engine)),
    };
    tracing::debug!(%conn_id, %session, "connection opened");

    let writer = tokio::spawn({
        let conn = Arc::clone(&conn);
        async move {
            while let Some(frame) = inbox.recv().await {
                if let Err(e) = conn.send(&frame).await {
                    tracing::debug!(%session, error = %e, "send failed, closing outbox");
                    break;
                }
            }
            // Outbox gone (disconnect or shutdown) or the socket broke.
            // Closing here also wakes a reader parked in `recv`.
            if let Err(e) = conn.close().await {
                tracing::trace!(%session, error = %e, "close after writer exit");
            }
        }
    });

    let idle = engine.config().idle_timeout;
    loop {
        let next = if idle.is_zero() {
            Ok(conn.recv().await)
        } else {
            tokio::time::timeout(idle, conn.recv()).await
        };
        let data = match next {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%session, "connection closed by peer");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%session, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%session, "connection idle, dropping");
                break;
            }
        };
        engine.handle_frame(session, &data).await;
    }

    // Removing the session drops the last outbox sender, so the writer
    // flushes what is queued and stops.
    guard.disconnect().await;
    if writer.await.is_err() {
        tracing::warn!(%session, "writer task panicked");
    }
    Ok(())
}
