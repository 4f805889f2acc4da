use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use ridematch_core::matching::MatchError;
use ridematch_sdk::objects::RideResponse;
use ridematch_sdk::objects::ws::{WsCloseCode, WsServerMessage};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::state::AppState;

/// `GET /rides/{ride_id}/ws`: WebSocket ride status stream.
///
/// The first frame is always the current status; the connection is
/// closed after a terminal status (`Assigned`, `Expired`, `Cancelled`).
pub(super) async fn ride_status_ws(
    state: State<AppState>,
    Path(ride_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let app_state = state.0.clone();
    ws.on_upgrade(move |socket| handle_ride_ws(socket, app_state, ride_id))
}

enum Snapshot {
    Ride(RideResponse),
    NotFound,
    Failed,
}

async fn current(state: &AppState, ride_id: Uuid) -> Snapshot {
    match state.engine.ride_view(ride_id).await {
        Ok((ride, assignment)) => Snapshot::Ride(ride.to_response(assignment.map(|a| a.driver_id))),
        Err(MatchError::RideNotFound(_)) => Snapshot::NotFound,
        Err(e) => {
            tracing::error!(error = %e, %ride_id, "WS: failed to read ride");
            Snapshot::Failed
        }
    }
}

/// Send the ride's status. Returns `false` once the stream should end.
async fn push(socket: &mut WebSocket, ride: RideResponse) -> bool {
    let terminal = ride.status.is_terminal();
    if send_json(socket, &WsServerMessage::StatusUpdate { ride }).await.is_err() {
        return false;
    }
    if terminal {
        let _ = socket.send(Message::Close(None)).await;
        return false;
    }
    true
}

async fn close_with_error(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = send_json(
        socket,
        &WsServerMessage::Error {
            code,
            reason: reason.to_string(),
        },
    )
    .await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

/// Background task that drives a single WebSocket connection.
async fn handle_ride_ws(mut socket: WebSocket, state: AppState, ride_id: Uuid) {
    // Subscribe before the first read so a change racing with it is still
    // in the receiver's buffer.
    let mut status_rx = state.engine.events().subscribe_status();

    match current(&state, ride_id).await {
        Snapshot::Ride(ride) => {
            if !push(&mut socket, ride).await {
                return;
            }
        }
        Snapshot::NotFound => {
            close_with_error(&mut socket, WsCloseCode::RIDE_NOT_FOUND, "ride not found").await;
            return;
        }
        Snapshot::Failed => {
            close_with_error(&mut socket, WsCloseCode::INTERNAL_ERROR, "internal error").await;
            return;
        }
    }

    loop {
        tokio::select! {
            result = status_rx.recv() => {
                match result {
                    Ok(update) if update.ride_id == ride_id => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(
                            %ride_id,
                            skipped = n,
                            "WS: status receiver lagged, checking current status"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
                match current(&state, ride_id).await {
                    Snapshot::Ride(ride) => {
                        if !push(&mut socket, ride).await {
                            return;
                        }
                    }
                    Snapshot::NotFound | Snapshot::Failed => break,
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let text = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(text.into()))
        .await
        .map_err(|_| ())
}
