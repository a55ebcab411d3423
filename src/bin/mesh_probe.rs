//! Mesh probe binary entry point
//!
//! Joins a room with synthetic media and logs every session state change.
//! Useful for exercising a signaling server, filling a room with extra
//! participants, or watching mesh topology changes from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Join the default room on ws://localhost:8088/signaling
//! cargo run --bin mesh_probe
//!
//! # Join a specific room on a specific server
//! CLASSMESH_SIGNALING_URL="ws://signal.example.com/signaling" \
//! CLASSMESH_ROOM="lecture-42" \
//! CLASSMESH_DISPLAY_NAME="probe-1" \
//! cargo run --bin mesh_probe
//!
//! # Audio-only probe
//! CLASSMESH_VIDEO=false cargo run --bin mesh_probe
//! ```
//!
//! # Environment Variables
//!
//! - `CLASSMESH_SIGNALING_URL`: Signaling WebSocket URL (default: `ws://localhost:8088/signaling`)
//! - `CLASSMESH_ROOM`: Room to join (default: `probe-room`)
//! - `CLASSMESH_USER_ID`: Fixed participant ID (default: random)
//! - `CLASSMESH_DISPLAY_NAME`: Display name announced to the room
//! - `CLASSMESH_STUN`: Comma-separated STUN server URLs
//! - `CLASSMESH_TURN_URL` / `CLASSMESH_TURN_USERNAME` / `CLASSMESH_TURN_CREDENTIAL`: TURN server
//! - `CLASSMESH_AUDIO` / `CLASSMESH_VIDEO`: Request those media kinds (default: `true`)
//! - `CLASSMESH_MAX_PEERS`: Peer connection cap (default: `10`)
//! - `RUST_LOG`: Logging level (default: `info`)

use classmesh::{RoomSession, RtcTransportFactory, SessionConfig, SyntheticCapture};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Set up Ctrl+C handler before anything else
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        let was_already_set = shutdown_flag_handler.swap(true, Ordering::SeqCst);
        if was_already_set {
            eprintln!("Shutdown already in progress, forcing immediate exit");
            std::process::exit(0);
        }
        eprintln!("Ctrl+C received, leaving room...");

        // Watchdog in case teardown hangs
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(3));
            eprintln!("Graceful shutdown timeout (3s), forcing exit");
            std::process::exit(0);
        });
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(shutdown_flag))
}

async fn async_main(shutdown_flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Mesh probe starting");

    let mut config = SessionConfig::from_env();
    if config.room_id.is_empty() {
        config.room_id = "probe-room".to_string();
    }
    info!(
        signaling_url = %config.signaling_url,
        room = %config.room_id,
        audio = config.audio,
        video = config.video,
        max_peers = config.max_peers,
        "Configuration loaded"
    );

    let session = RoomSession::join(
        config,
        Arc::new(SyntheticCapture::new()),
        Arc::new(RtcTransportFactory::new()),
    )
    .await?;
    info!(
        user_id = %session.local_id(),
        room = %session.room_id(),
        "Joined room. Press Ctrl+C to leave."
    );

    let mut states = session.subscribe();
    loop {
        if shutdown_flag.load(Ordering::SeqCst) {
            break;
        }
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow().clone();
                info!(
                    status = ?state.status,
                    participants = state.participants.len(),
                    remote_streams = state.remote_streams.len(),
                    screen_sharing = state.media.screen_sharing,
                    "Session state changed"
                );
                for participant in &state.participants {
                    info!(peer_id = %participant.id, name = %participant.name, "In room");
                }
                if let Some(error) = &state.error {
                    warn!(error = %error, "Session error recorded");
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }

    info!("Shutdown signal received, leaving room");
    session.leave().await;
    info!("Left room cleanly");

    Ok(())
}

fn init_tracing() {
    // EnvFilter for RUST_LOG support
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
