use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    conversation::ChatViewModel,
    error::{AppError, Result},
    middleware::AuthUser,
    state::AppState,
    websocket::{
        session::ChatSession,
        types::{ClientMessage, ErrorPayload, UserStatusPayload, WsMessage},
    },
};

/// WebSocket upgrade handler
#[utoipa::path(
    get,
    path = "/api/ws",
    tag = "websocket",
    params(
        ("access_token" = Option<String>, Query, description = "Token for clients that cannot set headers")
    ),
    responses(
        (status = 101, description = "Switching to the chat protocol"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
    let (presence_tx, mut presence_rx) = mpsc::unbounded_channel::<WsMessage>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let (connection_id, came_online) = state.presence.connect(user_id, presence_tx);
    if came_online {
        state.presence.broadcast(WsMessage::UserStatus(UserStatusPayload {
            user_id,
            is_online: true,
        }));
    }

    // Socket writer
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    let view = ChatViewModel::new(state.conversation(user_id));
    let mut session = ChatSession::new(view, state.presence.clone(), out_tx.clone());
    session.open(event_tx).await;

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = process_client_message(&text, &state, &mut session).await {
                        tracing::error!("Error processing message: {:?}", e);
                        let _ = out_tx.send(WsMessage::Error(ErrorPayload {
                            message: e.to_string(),
                        }));
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            Some(event) = event_rx.recv() => session.on_event(event),
            Some(frame) = presence_rx.recv() => session.on_presence(frame),
            _ = &mut send_task => break,
        }
    }

    session.close();
    send_task.abort();

    if state.presence.disconnect(&user_id, connection_id) {
        state.presence.broadcast(WsMessage::UserStatus(UserStatusPayload {
            user_id,
            is_online: false,
        }));
    }

    tracing::info!("WebSocket connection closed for user {}", user_id);
}

async fn process_client_message(text: &str, state: &AppState, session: &mut ChatSession) -> Result<()> {
    let frame: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid message format: {}", e)))?;

    if let ClientMessage::SendMessage { receiver_id, .. } = &frame {
        if !state.directory_service.exists(*receiver_id).await? {
            return Err(AppError::NotFound("Receiver not found".to_string()));
        }
    }

    session.handle(frame).await
}
