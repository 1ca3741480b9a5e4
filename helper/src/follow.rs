//! Headless follower: mirrors a server's surface state onto simulated
//! surfaces, with the clock synced to the server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, Stream, StreamExt};
use ss_common::{ClockOffset, EngineConfig, InstantClock, SyncedClock, TimeSyncConfig, WallClock};
use ss_surface::{Orchestrator, SimulatedSurface, Surface};
use ss_timesync::{TimeSyncClient, TimeSyncRequest, TimeSyncResponse};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::protocol::{ClientMessage, ServerMessage};

/// Follower configuration
pub struct FollowConfig {
    pub url: String,
    /// Added to the local clock, to exercise clock sync against a server on
    /// the same machine
    pub clock_skew_ms: f64,
    /// How often clip status is logged and a keepalive ping sent
    pub status_interval: Duration,
    pub engine: EngineConfig,
    pub timesync: TimeSyncConfig,
}

/// Connect and follow until the server goes away or Ctrl-C.
pub async fn run(config: FollowConfig) -> Result<()> {
    let (ws, _) = tokio_tungstenite::connect_async(config.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", config.url))?;
    info!("Connected to {}", config.url);

    let local: Arc<dyn WallClock> = Arc::new(InstantClock::new(
        ss_common::SystemClock.now_ms() + config.clock_skew_ms,
    ));
    let sim = SimulatedSurface::new(local.clone());

    let (write, read) = ws.split();
    tokio::select! {
        result = follow(write, read, &config, sim, local) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    }
}

/// Drive clock sync and the orchestrator over an established connection.
pub async fn follow<W, R>(
    mut write: W,
    mut read: R,
    config: &FollowConfig,
    sim: SimulatedSurface,
    local: Arc<dyn WallClock>,
) -> Result<()>
where
    W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    R: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let offset = ClockOffset::new();
    let clock = SyncedClock::new(local.clone(), offset.clone());
    let mut orchestrator = Orchestrator::new(Arc::new(sim.clone()), clock, config.engine.clone());

    let (outbound, mut requests) = mpsc::unbounded_channel::<TimeSyncRequest>();
    let (timesync, sync_task) = TimeSyncClient::spawn(config.timesync.clone(), local, offset, outbound);

    let mut status = tokio::time::interval(config.status_interval);
    let mut ping_id = 0u64;

    let result: Result<()> = loop {
        tokio::select! {
            Some(request) = requests.recv() => {
                if let Err(e) = send(&mut write, &ClientMessage::from(request)).await {
                    break Err(e);
                }
            }

            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => break Err(e.into()),
                    None => {
                        info!("Server closed the connection");
                        break Ok(());
                    }
                };

                match msg {
                    Message::Text(text) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::Timesync(response)) => {
                            timesync.receive(&TimeSyncResponse { timesync: response });
                        }
                        Ok(ServerMessage::SurfaceState(state)) => match state.validate() {
                            Ok(()) => {
                                orchestrator.apply_state(&state);
                            }
                            Err(e) => warn!("Ignoring surface state: {}", e),
                        },
                        Ok(ServerMessage::Pong { id }) => debug!("Pong {}", id),
                        Ok(ServerMessage::Error { code, message }) => {
                            warn!("Server error {}: {}", code, message);
                        }
                        Err(e) => warn!("Unparseable server message: {}", e),
                    },
                    Message::Ping(data) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            break Err(e.into());
                        }
                    }
                    Message::Close(_) => {
                        info!("Server closed the connection");
                        break Ok(());
                    }
                    _ => {}
                }
            }

            _ = status.tick() => {
                log_status(&orchestrator, &sim, &timesync);
                ping_id += 1;
                if let Err(e) = send(&mut write, &ClientMessage::Ping { id: ping_id }).await {
                    break Err(e);
                }
            }
        }
    };

    timesync.destroy();
    sync_task.abort();
    orchestrator.clear();
    result
}

async fn send<W>(write: &mut W, msg: &ClientMessage) -> Result<()>
where
    W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(msg)?;
    write.send(Message::Text(json)).await?;
    Ok(())
}

fn log_status(orchestrator: &Orchestrator, sim: &SimulatedSurface, timesync: &TimeSyncClient) {
    let now_ms = orchestrator.clock().now_ms();
    info!(
        clips = orchestrator.len(),
        elements = sim.element_count(),
        offset_ms = timesync.offset().get(),
        "Follower status"
    );
    for clip_id in orchestrator.clip_ids() {
        let Some(handle) = orchestrator.handle(clip_id) else {
            debug!(clip = %clip_id, "Inactive");
            continue;
        };
        if let Ok(snapshot) = sim.snapshot(handle) {
            info!(
                clip = %clip_id,
                handle = %handle,
                position_ms = snapshot.position_ms,
                rate = snapshot.playback_rate,
                paused = snapshot.paused,
                looping = snapshot.looping,
                timeline_ms = now_ms,
                "Clip status"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::serve;
    use crate::session::AppState;
    use ss_timeline_eval::{ClipState, Fit, ImageClip, Keyframe, KeyframeEffect, SurfaceState};
    use ss_timesync::TimeSyncServer;
    use tokio::net::TcpListener;

    fn config(url: String) -> FollowConfig {
        FollowConfig {
            url,
            clock_skew_ms: 0.0,
            status_interval: Duration::from_secs(60),
            engine: EngineConfig::default(),
            timesync: TimeSyncConfig {
                interval_ms: 60_000,
                sample_size: 2,
                probe_timeout_ms: 1_000,
            },
        }
    }

    #[tokio::test]
    async fn follower_mirrors_server_state() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Server clock runs ten seconds ahead of the follower's
        let server_clock = Arc::new(InstantClock::new(ss_common::SystemClock.now_ms() + 10_000.0));
        let initial = SurfaceState::new().with_clip(
            "logo",
            ClipState::Image(ImageClip {
                file: "logo.png".into(),
                fit: Fit::Contain,
                keyframes: vec![Keyframe::new(0, KeyframeEffect::new().set("opacity", 0.5))],
            }),
        );
        let state = Arc::new(AppState::new(initial, TimeSyncServer::new(server_clock)));
        tokio::spawn(serve(listener, state, Vec::new()));

        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr)).await.unwrap();
        let (write, read) = ws.split();
        let local: Arc<dyn WallClock> = Arc::new(InstantClock::from_system());
        let sim = SimulatedSurface::new(local.clone());
        let config = config(format!("ws://{}", addr));

        let watcher = sim.clone();
        let following = follow(write, read, &config, sim, local);
        let observed = async {
            for _ in 0..200 {
                if let Some(handle) = watcher.handle_of("logo") {
                    return Some(watcher.snapshot(handle).unwrap());
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            None
        };

        tokio::select! {
            result = following => panic!("follower stopped early: {:?}", result),
            snapshot = observed => {
                let snapshot = snapshot.expect("logo element never appeared");
                assert_eq!(snapshot.source, "logo.png");
                assert_eq!(snapshot.opacity, 0.5);
            }
        }
    }
}
