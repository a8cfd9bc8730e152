//! Development server.
//!
//! Accepts `"<user id>:<display name>"` as an auth token and keeps rooms in
//! memory. Production deployments embed the library with their own
//! verifier and store instead.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin duelroom-server
//! cargo run --bin duelroom-server -- --bind 0.0.0.0:9000 --demo-host 1
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use duelroom::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "duelroom-server")]
#[command(about = "Real-time room sync server for AI coding duels", long_about = None)]
struct Args {
    /// Address to bind the WebSocket listener to
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Seconds between liveness sweeps (0 disables sweeping)
    #[arg(long, default_value_t = 300)]
    sweep_interval_secs: u64,

    /// Seconds a connection may stay silent before it is dropped (0, the
    /// default, keeps silent connections open)
    #[arg(long, default_value_t = 0)]
    idle_timeout_secs: u64,

    /// Default log level; `RUST_LOG` overrides it
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Create a waiting room hosted by this user id at startup
    #[arg(long)]
    demo_host: Option<u64>,
}

/// Accepts `"<id>:<name>"` tokens. Every login stays valid.
struct DevVerifier;

impl IdentityVerifier for DevVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, SessionError> {
        let (id, name) = credential
            .split_once(':')
            .ok_or_else(|| SessionError::InvalidCredential("expected <id>:<name>".into()))?;
        let id: u64 = id
            .trim()
            .parse()
            .map_err(|_| SessionError::InvalidCredential("user id must be a number".into()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidCredential("name is empty".into()));
        }
        Ok(Identity::new(UserId(id), name))
    }

    async fn is_session_valid(&self, _user_id: UserId) -> bool {
        true
    }
}

fn setup_logger(default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("duelroom={default_log_level},duelroom_server={default_log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let args = Args::parse();
    setup_logger(&args.log_level);

    let verifier = Arc::new(DevVerifier);
    let store = Arc::new(MemoryRoomStore::new());

    if let Some(host) = args.demo_host {
        let lobby = Lobby::new(Arc::clone(&store), Arc::clone(&verifier), LobbyConfig::default());
        let room = lobby.create_room(UserId(host), "demo").await?;
        tracing::info!(room_code = %room.code, %host, "demo room ready");
    }

    let sweep = if args.sweep_interval_secs == 0 {
        SweepConfig::disabled()
    } else {
        SweepConfig::with_interval(Duration::from_secs(args.sweep_interval_secs))
    };

    let server = DuelroomServerBuilder::new()
        .bind(&args.bind)
        .idle_timeout(Duration::from_secs(args.idle_timeout_secs))
        .sweep(sweep)
        .build(verifier, store)
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
