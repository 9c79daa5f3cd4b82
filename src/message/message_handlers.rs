use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    Json,
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use tokio::sync::mpsc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    conversation::{adapter::attachment_visible_to, guess_content_type, ConversationEvent},
    error::{AppError, Result},
    message::{
        message_dto::{AttachmentQuery, ConversationSummary, MarkReadResponse, SendMessageRequest},
        message_models::{AttachmentRef, AttachmentUpload, ConversationKey, Message},
    },
    middleware::AuthUser,
    state::AppState,
    websocket::types::{ChatMessagePayload, HistoryPayload, MessageReadPayload, WsMessage},
};

/// The viewer's full message history, oldest first
#[utoipa::path(
    get,
    path = "/api/messages",
    tag = "messages",
    responses(
        (status = 200, description = "Ordered history", body = HistoryPayload),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Messages could not be fetched")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let adapter = state.conversation(user_id);
    let messages = adapter.load_history().await?;

    Ok(Json(HistoryPayload {
        messages,
        unread_count: adapter.unread_count(),
    }))
}

/// One summary per counterpart, most recent first
#[utoipa::path(
    get,
    path = "/api/messages/conversations",
    tag = "messages",
    responses(
        (status = 200, description = "Conversation summaries", body = Vec<ConversationSummary>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let adapter = state.conversation(user_id);
    adapter.load_history().await?;

    Ok(Json(adapter.conversations()))
}

/// Send a message to another participant
#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Receiver not found"),
        (status = 503, description = "Message could not be stored")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    if !state.directory_service.exists(payload.receiver_id).await? {
        return Err(AppError::NotFound("Receiver not found".to_string()));
    }
    if let Some(attachment) = &payload.attachment {
        if !attachment_visible_to(&attachment.path, user_id) {
            return Err(AppError::Authorization(
                "Attachment belongs to another conversation".to_string(),
            ));
        }
    }

    let adapter = state.conversation(user_id);
    let message = adapter
        .send(
            payload.receiver_id,
            &payload.content,
            payload.category,
            payload.attachment.as_ref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Mark a received message as read
#[utoipa::path(
    patch,
    path = "/api/messages/{id}/read",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Message ID")
    ),
    responses(
        (status = 200, description = "Message marked as read"),
        (status = 403, description = "Not the receiver"),
        (status = 404, description = "Message not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_message_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let adapter = state.conversation(user_id);

    // Only a real change is announced to the sender's open sessions.
    if let Some(message) = adapter.mark_read(message_id).await? {
        state.presence.send_to_user(
            &message.sender_id,
            WsMessage::MessageRead(MessageReadPayload {
                message_id,
                read_by: user_id,
            }),
        );
    }

    Ok(StatusCode::OK)
}

/// Mark everything received from one counterpart as read
#[utoipa::path(
    patch,
    path = "/api/messages/conversations/{id}/read",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Counterpart ID")
    ),
    responses(
        (status = 200, description = "Messages marked as read", body = MarkReadResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(counterpart_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let updated = state
        .conversation(user_id)
        .mark_conversation_read(counterpart_id)
        .await?;

    Ok(Json(MarkReadResponse { updated }))
}

/// Upload a file for a conversation. The raw request body is the file.
#[utoipa::path(
    post,
    path = "/api/messages/attachments/{counterpart_id}",
    tag = "messages",
    params(
        ("counterpart_id" = Uuid, Path, description = "Conversation counterpart"),
        ("file_name" = String, Query, description = "Original file name")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Attachment stored", body = AttachmentRef),
        (status = 400, description = "Invalid file"),
        (status = 503, description = "Storage unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upload_attachment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(counterpart_id): Path<Uuid>,
    Query(query): Query<AttachmentQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| *value != "application/octet-stream")
        .map(str::to_string);

    let attachment = state
        .conversation(user_id)
        .attach_file(
            ConversationKey::new(user_id, counterpart_id),
            AttachmentUpload {
                file_name: query.file_name,
                content_type,
                bytes: body.to_vec(),
            },
        )
        .await?;

    tracing::info!("Stored attachment {} ({} bytes)", attachment.path, attachment.size);
    Ok((StatusCode::CREATED, Json(attachment)))
}

/// Download an attachment of one of the viewer's conversations
#[utoipa::path(
    get,
    path = "/api/messages/files/{path}",
    tag = "messages",
    params(
        ("path" = String, Path, description = "Attachment path")
    ),
    responses(
        (status = 200, description = "File contents"),
        (status = 403, description = "Attachment belongs to another conversation"),
        (status = 404, description = "Attachment not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn download_attachment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(path): Path<String>,
) -> Result<impl IntoResponse> {
    let path = path.trim_start_matches('/');
    let bytes = state.conversation(user_id).fetch_attachment(path).await?;

    let file_name = path.rsplit('/').next().unwrap_or(path);
    let content_type = guess_content_type(file_name).unwrap_or("application/octet-stream");

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    ))
}

fn sse_event(event: ConversationEvent) -> Event {
    match event {
        ConversationEvent::Inserted { message, position } => {
            let frame = WsMessage::ChatMessage(ChatMessagePayload { message, position });
            match serde_json::to_string(&frame) {
                Ok(json) => Event::default().event("chat_message").data(json),
                Err(e) => Event::default().event("error").data(e.to_string()),
            }
        }
        ConversationEvent::ConnectionLost { reason } => {
            Event::default().event("connection_lost").data(reason)
        }
    }
}

/// Live stream of messages sent to or by the viewer (SSE)
#[utoipa::path(
    get,
    path = "/api/messages/stream",
    tag = "messages",
    responses(
        (status = 200, description = "Message stream established"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn message_stream(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let adapter = state.conversation(user_id);
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = adapter.subscribe(tx).await;
    tracing::debug!("SSE stream {} opened for {}", subscription.id(), user_id);

    // The stream owns the adapter and subscription, so the insert channel
    // closes when the client goes away.
    let stream = stream::unfold(
        (rx, adapter, subscription),
        |(mut rx, adapter, subscription)| async move {
            let event = rx.recv().await?;
            Some((Ok::<_, Infallible>(sse_event(event)), (rx, adapter, subscription)))
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default())
}

