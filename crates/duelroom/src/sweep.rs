//! The liveness sweep.
//!
//! Sessions whose socket died without a clean close (the writer task hit a
//! send error and dropped its receiver) linger in the registry and the
//! membership index until something notices. This pass notices: it reaps
//! closed sessions, prunes index entries pointing at sessions that are dead
//! or gone, and drops rooms left empty. The durable room is never touched.

use std::collections::HashMap;
use std::sync::Arc;

use duelroom_protocol::{Codec, ServerEvent};
use duelroom_room::RoomStore;
use duelroom_session::IdentityVerifier;
use duelroom_sweep::{SweepConfig, SweepScheduler};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::Engine;

/// Counts from one liveness sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions_reaped: usize,
    pub members_reaped: usize,
    pub rooms_dropped: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.sessions_reaped == 0 && self.members_reaped == 0 && self.rooms_dropped == 0
    }
}

impl<V, S, C> Engine<V, S, C>
where
    V: IdentityVerifier,
    S: RoomStore,
    C: Codec,
{
    /// Runs one liveness sweep. Remaining members of a room are told about
    /// each member the sweep removed.
    pub async fn sweep(&self) -> SweepReport {
        let (reaped, retained) = {
            let mut sessions = self.sessions.lock().await;
            let mut rooms = self.rooms.lock().await;
            let reaped = sessions.reap_dead();
            let retained = rooms.retain_live(|id| sessions.is_live(id));
            (reaped, retained)
        };

        // Every index entry points at a registered session (join, leave and
        // disconnect update both tables under both locks), so each pruned
        // member was reaped just now and its name is here.
        let usernames: HashMap<_, _> = reaped
            .iter()
            .filter_map(|s| s.identity.as_ref())
            .map(|i| (i.user_id, i.username.clone()))
            .collect();
        for (code, user_id, role) in &retained.removed {
            if retained.rooms_dropped.contains(code) {
                continue;
            }
            let Some(username) = usernames.get(user_id) else {
                tracing::warn!(room_code = %code, %user_id, "pruned member has no reaped session");
                continue;
            };
            let event = ServerEvent::MemberLeft {
                user_id: *user_id,
                username: username.clone(),
                role: *role,
            };
            if let Err(e) = self.broadcast_to_room(code, &event, None).await {
                tracing::warn!(room_code = %code, error = %e, "member-left broadcast failed");
            }
        }

        let report = SweepReport {
            sessions_reaped: reaped.len(),
            members_reaped: retained.removed.len(),
            rooms_dropped: retained.rooms_dropped.len(),
        };
        if report.is_empty() {
            tracing::debug!("liveness sweep found nothing");
        } else {
            tracing::info!(
                sessions = report.sessions_reaped,
                members = report.members_reaped,
                rooms = report.rooms_dropped,
                "liveness sweep"
            );
        }
        report
    }
}

/// Spawns the periodic sweep task. It stops when `shutdown` flips to `true`
/// or its sender is dropped.
pub fn spawn_sweeper<V, S, C>(
    engine: Arc<Engine<V, S, C>>,
    config: SweepConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    V: IdentityVerifier,
    S: RoomStore,
    C: Codec,
{
    tokio::spawn(async move {
        let mut scheduler = SweepScheduler::new(config);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                tick = scheduler.wait_for_sweep() => {
                    tracing::trace!(sweep = tick.sweep, "running liveness sweep");
                    engine.sweep().await;
                }
            }
        }
        tracing::debug!("sweeper stopped");
    })
}
