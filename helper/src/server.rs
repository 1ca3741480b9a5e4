//! WebSocket server implementation

use anyhow::Result;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::protocol::{error_codes, ClientMessage, ServerMessage};
use crate::session::{AppState, Session};

/// Server configuration
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

type WsWriter = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Bind and run the WebSocket server
pub async fn run(config: ServerConfig, state: Arc<AppState>) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("WebSocket server listening on ws://{}", addr);

    serve(listener, state, config.allowed_origins).await
}

/// Accept connections on an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>, allowed_origins: Vec<String>) -> Result<()> {
    let allowed_origins = Arc::new(allowed_origins);

    while let Ok((stream, addr)) = listener.accept().await {
        let state = state.clone();
        let allowed_origins = allowed_origins.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, state, allowed_origins).await {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }

    Ok(())
}

/// Whether an Origin header value is localhost or explicitly allowed
fn origin_allowed(origin: &str, allowed_origins: &[String]) -> bool {
    origin.starts_with("http://localhost")
        || origin.starts_with("http://127.0.0.1")
        || origin.starts_with("https://localhost")
        || origin.starts_with("https://127.0.0.1")
        || allowed_origins.iter().any(|o| o == origin)
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<AppState>,
    allowed_origins: Arc<Vec<String>>,
) -> Result<()> {
    info!("New connection from {}", addr);

    let ws = tokio_tungstenite::accept_hdr_async(stream, |request: &http::Request<()>, response| {
        if let Some(origin) = request.headers().get("Origin") {
            let origin_str = origin.to_str().unwrap_or("");
            if !origin_allowed(origin_str, &allowed_origins) {
                // Not enforced
                warn!("Connection from unlisted origin: {}", origin_str);
            }
        }

        Ok(response)
    })
    .await?;

    handle_websocket(ws, addr, state).await
}

async fn send(write: &mut WsWriter, msg: &ServerMessage) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    write.send(Message::Text(json)).await?;
    Ok(())
}

/// Handle WebSocket messages
async fn handle_websocket(ws: WebSocketStream<TcpStream>, addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let (mut write, mut read) = ws.split();
    let mut updates = state.subscribe();
    let mut session = Session::new(state, addr);

    send(&mut write, &session.greeting()).await?;

    loop {
        tokio::select! {
            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        let msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                send(&mut write, &ServerMessage::error(error_codes::PARSE_ERROR, e.to_string())).await?;
                                continue;
                            }
                        };

                        if let Some(reply) = session.handle_message(msg) {
                            send(&mut write, &reply).await?;
                        }
                    }

                    Message::Binary(_) => {
                        warn!("Received unexpected binary data from {}", addr);
                        send(&mut write, &ServerMessage::error(error_codes::UNEXPECTED_BINARY, "binary messages are not supported")).await?;
                    }

                    Message::Ping(data) => {
                        write.send(Message::Pong(data)).await?;
                    }

                    Message::Pong(_) => {}

                    Message::Close(_) => {
                        info!("Client {} disconnected", addr);
                        break;
                    }

                    Message::Frame(_) => {}
                }
            }

            update = updates.recv() => {
                match update {
                    Ok(surface_state) => {
                        send(&mut write, &ServerMessage::SurfaceState(surface_state)).await?;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Only the latest state matters
                        debug!("{} skipped {} state update(s)", addr, skipped);
                        send(&mut write, &session.greeting()).await?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Connection closed: {} ({} probe(s) answered)", addr, session.probes_answered());
    Ok(())
}
