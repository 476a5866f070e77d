//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::error::GameError;
use crate::game::r#match::{MatchMode, PlayerId};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Identity from an earlier connection, used to resume a paused match
    pub player_id: Option<Uuid>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let player_id = query.player_id.unwrap_or_else(Uuid::new_v4);
    debug!(player_id = %player_id, resumed = query.player_id.is_some(), "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, player_id, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, player_id: PlayerId, state: AppState) {
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    let (connection_id, outbound_rx) = state.connections.register(player_id);

    run_session(player_id, &state, ws_sink, ws_stream, outbound_rx).await;

    // A newer socket for the same player owns the session from here on
    if state.connections.unregister(player_id, connection_id) {
        state.matchmaking.leave_queue(player_id);
        state.games.disconnect(player_id);
    } else {
        debug!(player_id = %player_id, "Superseded connection closed");
    }

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: PlayerId,
    state: &AppState,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    let rate_limiter = PlayerRateLimiter::new();

    // Spawn writer task: outbound channel -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> game actions
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        if let Err(e) = dispatch(state, player_id, client_msg) {
                            warn!(player_id = %player_id, code = e.code(), "Rejected client action");
                            state.connections.send_to(
                                player_id,
                                ServerMsg::Error {
                                    code: e.code().to_string(),
                                    message: e.to_string(),
                                },
                            );
                        }
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Route one client action. Errors go back to this client only.
fn dispatch(state: &AppState, player_id: PlayerId, msg: ClientMsg) -> Result<(), GameError> {
    match msg {
        ClientMsg::StartGame { mode } | ClientMsg::Rematch { mode } => {
            start_or_queue(state, player_id, mode)
        }
        ClientMsg::JoinMatchmaking => state.matchmaking.join_queue(player_id).map(|_| ()),
        ClientMsg::LeaveMatchmaking => {
            if !state.matchmaking.leave_queue(player_id) {
                // Acknowledge anyway so the client can leave its waiting screen
                state.connections.send_to(player_id, ServerMsg::LeftQueue);
            }
            Ok(())
        }
        ClientMsg::UpdatePosition {
            direction,
            slot_hint,
        } => match state.games.update_position(player_id, direction, slot_hint) {
            // Moves racing a teardown are dropped quietly
            Err(GameError::NotInMatch | GameError::MatchNotFound(_)) => {
                debug!(player_id = %player_id, "Move without a match ignored");
                Ok(())
            }
            other => other,
        },
        ClientMsg::ReconnectToGame => state.games.reconnect(player_id).map(|_| ()),
        ClientMsg::AcceptMatch { match_id } => state.games.accept_match(player_id, match_id),
        ClientMsg::DeclineMatch { match_id } => {
            if let Some(other) = state.games.decline_match(player_id, match_id)? {
                if let Err(e) = state.matchmaking.join_queue(other) {
                    warn!(player_id = %other, code = e.code(), "Could not requeue after decline");
                }
            }
            Ok(())
        }
        ClientMsg::Ping { t } => {
            state.connections.send_to(player_id, ServerMsg::Pong { t });
            Ok(())
        }
    }
}

fn start_or_queue(state: &AppState, player_id: PlayerId, mode: MatchMode) -> Result<(), GameError> {
    if mode == MatchMode::RemoteMultiplayer {
        return state.matchmaking.join_queue(player_id).map(|_| ());
    }

    state.matchmaking.leave_queue(player_id);
    state.games.start_game(player_id, mode).map(|_| ())
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
