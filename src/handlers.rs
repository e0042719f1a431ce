// handlers.rs

use crate::{
    error::AppError,
    models::{AppState, BroadcastResponse, CommandRequest, DeviceSnapshot, WsMessage},
    telemetry,
};
use axum::{
    Json,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use futures_util::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/devices",
    responses((status = 200, description = "Status of every projector", body = [DeviceSnapshot]))
)]
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceSnapshot>> {
    Json(state.fleet.snapshot())
}

#[utoipa::path(
    post,
    path = "/api/devices/{name}/commands",
    params(("name" = String, Path, description = "Configured device name")),
    request_body = CommandRequest,
    responses(
        (status = 202, description = "Command queued"),
        (status = 404, description = "Unknown device")
    )
)]
pub async fn send_command(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<CommandRequest>,
) -> Result<StatusCode, AppError> {
    state.fleet.enqueue(&name, request.command)?;
    info!(device = %name, command = %request.command, "Command queued");
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    post,
    path = "/api/commands",
    request_body = CommandRequest,
    responses((status = 202, description = "Command queued on every projector", body = BroadcastResponse))
)]
pub async fn broadcast_command(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CommandRequest>,
) -> (StatusCode, Json<BroadcastResponse>) {
    let enqueued = state.fleet.broadcast(request.command);
    (StatusCode::ACCEPTED, Json(BroadcastResponse { enqueued }))
}

pub async fn handle_client_ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!("Client connection attempt");
    ws.on_upgrade(|socket| handle_client(socket, state))
}

async fn send_message<S>(sender: &mut S, msg: &WsMessage) -> Result<(), AppError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let text = serde_json::to_string(msg).map_err(anyhow::Error::from)?;
    sender
        .send(Message::Text(text.into()))
        .await
        .map_err(anyhow::Error::from)?;
    Ok(())
}

/// Decodes one client frame into a reply, if any.
fn handle_client_text(state: &AppState, text: &str) -> Option<WsMessage> {
    match serde_json::from_str::<WsMessage>(text) {
        Ok(WsMessage::Command {
            device: Some(name),
            command,
        }) => match state.fleet.enqueue(&name, command) {
            Ok(()) => None,
            Err(e) => Some(WsMessage::Error {
                message: e.to_string(),
                code: e.status_code().as_u16(),
            }),
        },
        Ok(WsMessage::Command {
            device: None,
            command,
        }) => {
            state.fleet.broadcast(command);
            None
        }
        Ok(_) => Some(WsMessage::Error {
            message: "Unsupported message".into(),
            code: 400,
        }),
        Err(e) => Some(WsMessage::Error {
            message: format!("Invalid message format: {e}"),
            code: 400,
        }),
    }
}

async fn handle_client(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let client_id = Uuid::new_v4();
    state.clients.insert(client_id, Utc::now());
    telemetry::set_ws_clients(state.clients.len());
    info!(%client_id, "Client connected");

    // Subscribe before the snapshot so no update falls in between.
    let mut events = state.fleet.subscribe();
    let snapshot = WsMessage::Snapshot {
        devices: state.fleet.snapshot(),
    };

    if let Err(e) = send_message(&mut sender, &snapshot).await {
        error!(%client_id, error = %e, "Failed to send snapshot");
        cleanup_client_connection(client_id, &state);
        return;
    }

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<WsMessage>();

    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                event = events.recv() => match event {
                    Ok(changed) => WsMessage::from(changed),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%client_id, skipped, "Client lagging, status updates skipped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(msg) => msg,
                    None => break,
                },
            };
            if send_message(&mut sender, &msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let state = Arc::clone(&state);
        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => {
                        if let Some(reply) = handle_client_text(&state, text.as_str()) {
                            if reply_tx.send(reply).is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    };

    cleanup_client_connection(client_id, &state);
}

/// Forgets the client and returns how long it stayed connected.
fn cleanup_client_connection(client_id: Uuid, state: &AppState) -> Option<chrono::Duration> {
    let connected_for = state
        .clients
        .remove(&client_id)
        .map(|(_, since)| Utc::now() - since);
    telemetry::set_ws_clients(state.clients.len());
    info!(
        %client_id,
        connected_secs = connected_for.map(|d| d.num_seconds()),
        "Client disconnected"
    );
    connected_for
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        commands::Command,
        devices::{Credentials, mock::MockConnector},
        fleet::Fleet,
        models::DeviceConfig,
        worker::DEFAULT_POLL_INTERVAL,
    };

    fn state() -> Arc<AppState> {
        let fleet = Fleet::new(
            vec![DeviceConfig {
                name: "Center".into(),
                address: "proj2.local".into(),
            }],
            Arc::new(MockConnector::new()),
            Credentials::new("admin"),
            DEFAULT_POLL_INTERVAL,
        );
        Arc::new(AppState::new(Arc::new(fleet)))
    }

    #[tokio::test]
    async fn unknown_device_command_is_not_found() {
        let state = state();
        let err = send_command(
            State(Arc::clone(&state)),
            Path("Balcony".to_string()),
            Json(CommandRequest {
                command: Command::PowerOn,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn broadcast_reports_enqueue_count() {
        let state = state();
        let (status, Json(body)) = broadcast_command(
            State(state),
            Json(CommandRequest {
                command: Command::ShutterOff,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.enqueued, 1);
    }

    #[test]
    fn cleanup_reports_connection_length() {
        let state = state();
        let client_id = Uuid::new_v4();
        state
            .clients
            .insert(client_id, Utc::now() - chrono::Duration::seconds(90));

        let connected_for = cleanup_client_connection(client_id, &state).unwrap();
        assert!(connected_for >= chrono::Duration::seconds(90));
        assert!(state.clients.is_empty());
        assert!(cleanup_client_connection(client_id, &state).is_none());
    }

    #[tokio::test]
    async fn ws_frames_route_commands_and_report_errors() {
        let state = state();
        assert!(
            handle_client_text(
                &state,
                r#"{"type":"command","device":"Center","command":"power_off"}"#
            )
            .is_none()
        );
        assert!(handle_client_text(&state, r#"{"type":"command","command":"power_on"}"#).is_none());

        match handle_client_text(
            &state,
            r#"{"type":"command","device":"Balcony","command":"power_on"}"#,
        ) {
            Some(WsMessage::Error { code, .. }) => assert_eq!(code, 404),
            other => panic!("unexpected reply {other:?}"),
        }
        match handle_client_text(&state, "not json") {
            Some(WsMessage::Error { code, .. }) => assert_eq!(code, 400),
            other => panic!("unexpected reply {other:?}"),
        }
    }
}
