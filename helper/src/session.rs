//! Shared server state and per-connection sessions

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use ss_timeline_eval::SurfaceState;
use ss_timesync::{TimeSyncRequest, TimeSyncServer};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::protocol::{error_codes, ClientMessage, ServerMessage};

/// Buffered state updates per subscriber before it starts lagging
const UPDATE_CAPACITY: usize = 16;

/// Shared application state
pub struct AppState {
    surface_state: RwLock<SurfaceState>,
    updates: broadcast::Sender<SurfaceState>,
    pub timesync: TimeSyncServer,
}

impl AppState {
    pub fn new(initial: SurfaceState, timesync: TimeSyncServer) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            surface_state: RwLock::new(initial),
            updates,
            timesync,
        }
    }

    pub fn surface_state(&self) -> SurfaceState {
        self.surface_state.read().clone()
    }

    /// Store a new surface state and push it to every subscriber.
    pub fn publish(&self, state: SurfaceState) {
        *self.surface_state.write() = state.clone();
        // No subscribers is fine
        let receivers = self.updates.send(state).unwrap_or(0);
        debug!("Surface state published to {} connection(s)", receivers);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceState> {
        self.updates.subscribe()
    }
}

/// Per-connection session
pub struct Session {
    state: Arc<AppState>,
    addr: SocketAddr,
    probes_answered: u64,
}

impl Session {
    pub fn new(state: Arc<AppState>, addr: SocketAddr) -> Self {
        Self {
            state,
            addr,
            probes_answered: 0,
        }
    }

    /// The state a client is sent right after connecting
    pub fn greeting(&self) -> ServerMessage {
        ServerMessage::SurfaceState(self.state.surface_state())
    }

    pub fn probes_answered(&self) -> u64 {
        self.probes_answered
    }

    /// Handle a message, return the direct reply if there is one.
    ///
    /// A published state is not answered directly: it reaches this client
    /// through the broadcast like every other.
    pub fn handle_message(&mut self, msg: ClientMessage) -> Option<ServerMessage> {
        match msg {
            ClientMessage::Timesync(probe) => {
                self.probes_answered += 1;
                let response = self.state.timesync.respond(&TimeSyncRequest { timesync: probe });
                Some(response.into())
            }

            ClientMessage::SurfaceState(surface_state) => {
                if let Err(e) = surface_state.validate() {
                    warn!("Rejected surface state from {}: {}", self.addr, e);
                    return Some(ServerMessage::error(error_codes::INVALID_STATE, e.to_string()));
                }
                info!("Surface state with {} clip(s) published by {}", surface_state.len(), self.addr);
                self.state.publish(surface_state);
                None
            }

            ClientMessage::Ping { id } => Some(ServerMessage::Pong { id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss_common::InstantClock;
    use ss_timeline_eval::{ClipState, Fit, ImageClip, Keyframe, KeyframeEffect};
    use ss_timesync::ProbeRequest;

    fn image_state(keyframes: Vec<Keyframe>) -> SurfaceState {
        SurfaceState::new().with_clip(
            "logo",
            ClipState::Image(ImageClip {
                file: "logo.png".into(),
                fit: Fit::Contain,
                keyframes,
            }),
        )
    }

    fn session() -> (Arc<AppState>, Session) {
        let timesync = TimeSyncServer::new(Arc::new(InstantClock::new(42_000.0)));
        let state = Arc::new(AppState::new(SurfaceState::new(), timesync));
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        (state.clone(), Session::new(state, addr))
    }

    #[tokio::test(start_paused = true)]
    async fn answers_probe_with_server_clock() {
        let (_, mut session) = session();
        let reply = session.handle_message(ClientMessage::Timesync(ProbeRequest { id: 7 }));
        match reply {
            Some(ServerMessage::Timesync(response)) => {
                assert_eq!(response.id, 7);
                assert_eq!(response.now, 42_000);
            }
            other => panic!("expected timesync answer, got {:?}", other),
        }
        assert_eq!(session.probes_answered(), 1);
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let (_, mut session) = session();
        assert_eq!(
            session.handle_message(ClientMessage::Ping { id: 5 }),
            Some(ServerMessage::Pong { id: 5 })
        );
    }

    #[tokio::test]
    async fn published_state_is_stored_and_broadcast() {
        let (state, mut session) = session();
        let mut updates = state.subscribe();
        let published = image_state(vec![Keyframe::new(0, KeyframeEffect::new())]);

        assert_eq!(session.handle_message(ClientMessage::SurfaceState(published.clone())), None);
        assert_eq!(state.surface_state(), published);
        assert_eq!(updates.recv().await.unwrap(), published);
        assert_eq!(session.greeting(), ServerMessage::SurfaceState(published));
    }

    #[tokio::test]
    async fn clip_without_keyframes_is_rejected() {
        let (state, mut session) = session();
        let reply = session.handle_message(ClientMessage::SurfaceState(image_state(Vec::new())));
        assert!(matches!(
            reply,
            Some(ServerMessage::Error { ref code, .. }) if code == error_codes::INVALID_STATE
        ));
        assert!(state.surface_state().is_empty());
    }
}
