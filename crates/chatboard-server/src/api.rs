//! HTTP surface: history reads, revocation, uploads, notifications, and
//! the profile/background extras, plus the `/ws` realtime endpoint.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderMap, Method};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use chatboard_shared::constants::{NOTIFICATION_BACKLOG_LIMIT, TEMP_FILE_TTL_DAYS};
use chatboard_shared::models::{Message, Notification, User, UserStatus};
use chatboard_shared::protocol::{ProfileUpdate, ServerEvent};

use crate::error::ServerError;
use crate::gateway::{self, client_ip};
use crate::media::{self, UploadKind};
use crate::pipeline;
use crate::state::AppState;
use crate::notify;

/// Slack on top of the largest per-route cap for multipart framing and the
/// accompanying text fields.  The per-kind cap check inside the handler is
/// the deciding limit.
const UPLOAD_BODY_SLACK: usize = 2 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let upload_limit = |kind: UploadKind| DefaultBodyLimit::max(kind.max_bytes() + UPLOAD_BODY_SLACK);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(gateway::ws_handler))
        .route("/api/messages", get(list_messages))
        .route("/api/months", get(list_months))
        .route("/api/user", post(register_user))
        .route("/api/message/:id/revoke", post(revoke_message))
        .route(
            "/api/upload/temp",
            post(upload_image).layer(upload_limit(UploadKind::Image)),
        )
        .route(
            "/api/upload/video",
            post(upload_video).layer(upload_limit(UploadKind::Video)),
        )
        .route(
            "/api/upload/voice",
            post(upload_voice).layer(upload_limit(UploadKind::Voice)),
        )
        .route("/api/notifications/:username", get(list_notifications))
        .route("/api/notification/:id/read", post(mark_notification_read))
        .route("/api/notification/send", post(send_notification))
        .route("/api/background", get(get_background))
        .route(
            "/api/background/upload",
            post(upload_background).layer(DefaultBodyLimit::max(12 * 1024 * 1024)),
        )
        .route("/api/background/remove", delete(remove_background))
        .route("/api/profile/:username", get(get_profile).put(update_profile))
        .route("/api/users", get(list_users))
        .nest_service("/temp", ServeDir::new(state.temp_store.dir()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ─── Messages ───

#[derive(Deserialize)]
struct MessagesQuery {
    month: Option<String>,
}

async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let db = state.db.lock().await;
    let messages = db.list_messages(query.month.as_deref())?;
    Ok(Json(messages))
}

async fn list_months(State(state): State<AppState>) -> Result<Json<Vec<String>>, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_months()?))
}

#[derive(Deserialize)]
struct RegisterUserRequest {
    username: String,
}

async fn register_user(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<RegisterUserRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let ip = client_ip(&headers, peer);
    pipeline::register_user(&state, &req.username, &ip).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
struct RevokeRequest {
    username: String,
}

async fn revoke_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<RevokeRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    pipeline::revoke(&state, id, &req.username).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// ─── Uploads ───

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    filename: String,
    url: String,
    expires_at: DateTime<Utc>,
    expiry_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<i64>,
}

struct UploadFields {
    data: Option<Bytes>,
    file_name: String,
    content_type: String,
    username: String,
    duration: Option<i64>,
}

async fn read_upload_fields(mut multipart: Multipart) -> Result<UploadFields, ServerError> {
    let mut fields = UploadFields {
        data: None,
        file_name: "upload".to_string(),
        content_type: "application/octet-stream".to_string(),
        username: String::new(),
        duration: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                if let Some(name) = field.file_name() {
                    fields.file_name = name.to_string();
                }
                if let Some(mime) = field.content_type() {
                    fields.content_type = mime.to_string();
                }
                fields.data = Some(field.bytes().await.map_err(|e| {
                    ServerError::Validation(format!("Failed to read upload: {e}"))
                })?);
            }
            "username" => {
                fields.username = field
                    .text()
                    .await
                    .map_err(|e| ServerError::Validation(format!("Failed to read field: {e}")))?;
            }
            "duration" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ServerError::Validation(format!("Failed to read field: {e}")))?;
                fields.duration = raw.trim().parse().ok();
            }
            _ => {}
        }
    }

    Ok(fields)
}

async fn handle_upload(
    state: AppState,
    multipart: Multipart,
    kind: UploadKind,
) -> Result<UploadResponse, ServerError> {
    let fields = read_upload_fields(multipart).await?;

    let data = fields
        .data
        .ok_or_else(|| ServerError::Validation("No file uploaded".into()))?;
    if fields.username.trim().is_empty() {
        return Err(ServerError::Validation("username required".into()));
    }

    // Mime family and size cap, checked before anything is written.
    media::check_upload(kind, &fields.content_type, data.len())?;

    let filename = state.temp_store.store(&fields.file_name, &data).await?;
    let record = media::register_upload(
        &state,
        filename,
        fields.file_name,
        fields.content_type,
        data.len() as i64,
        fields.username,
    )
    .await?;

    info!(
        file = %record.filename,
        size = record.size,
        by = %record.uploaded_by,
        "upload registered"
    );

    Ok(UploadResponse {
        url: media::blob_url(&record.filename),
        filename: record.filename,
        expires_at: record.expires_at,
        expiry_days: TEMP_FILE_TTL_DAYS,
        size: match kind {
            UploadKind::Image => None,
            UploadKind::Video | UploadKind::Voice => Some(record.size),
        },
        duration: match kind {
            UploadKind::Voice => Some(fields.duration.unwrap_or(0)),
            _ => None,
        },
    })
}

async fn upload_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    Ok(Json(handle_upload(state, multipart, UploadKind::Image).await?))
}

async fn upload_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    Ok(Json(handle_upload(state, multipart, UploadKind::Video).await?))
}

async fn upload_voice(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    Ok(Json(handle_upload(state, multipart, UploadKind::Voice).await?))
}

// ─── Notifications ───

async fn list_notifications(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<Notification>>, ServerError> {
    let db = state.db.lock().await;
    let backlog = db.notifications_for(&username, NOTIFICATION_BACKLOG_LIMIT)?;
    Ok(Json(backlog))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ServerError> {
    notify::mark_read(&state, id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

fn default_notification_kind() -> String {
    "info".to_string()
}

#[derive(Deserialize)]
struct SendNotificationRequest {
    username: String,
    message: String,
    #[serde(rename = "type", default = "default_notification_kind")]
    kind: String,
}

async fn send_notification(
    State(state): State<AppState>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let notification =
        notify::send_notification(&state, &req.username, &req.message, &req.kind).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "notificationId": notification.id,
    })))
}

// ─── Board background ───

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackgroundUpload {
    image_data: String,
}

async fn upload_background(
    State(state): State<AppState>,
    Json(req): Json<BackgroundUpload>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if req.image_data.is_empty() {
        return Err(ServerError::Validation("No image data provided".into()));
    }

    tokio::fs::write(&state.config.background_path, &req.image_data)
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to save background: {e}")))?;

    state
        .presence
        .broadcast(&ServerEvent::BackgroundUpdated {
            image_data: req.image_data,
        })
        .await;

    Ok(Json(serde_json::json!({ "success": true })))
}

async fn remove_background(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    match tokio::fs::remove_file(&state.config.background_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(ServerError::Internal(format!(
                "Failed to delete background: {e}"
            )))
        }
    }

    state.presence.broadcast(&ServerEvent::BackgroundRemoved).await;

    Ok(Json(serde_json::json!({ "success": true })))
}

async fn get_background(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let image_data = tokio::fs::read_to_string(&state.config.background_path)
        .await
        .ok();
    Ok(Json(serde_json::json!({ "imageData": image_data })))
}

// ─── Profiles ───

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(flatten)]
    user: User,
    message_count: i64,
}

async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<ProfileResponse>, ServerError> {
    let db = state.db.lock().await;
    let user = db.get_user(&username).map_err(|e| match e {
        chatboard_store::StoreError::NotFound => ServerError::NotFound("User not found".into()),
        other => ServerError::Store(other),
    })?;
    let message_count = db.message_count(&username)?;
    Ok(Json(ProfileResponse { user, message_count }))
}

#[derive(Deserialize)]
struct ProfileUpdateRequest {
    avatar: Option<String>,
    bio: Option<String>,
    #[serde(default)]
    status: UserStatus,
}

async fn update_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let updated = {
        let db = state.db.lock().await;
        db.update_profile(
            &username,
            req.avatar.as_deref(),
            req.bio.as_deref(),
            req.status,
        )?
    };
    if !updated {
        return Err(ServerError::NotFound("User not found".into()));
    }

    state
        .presence
        .broadcast(&ServerEvent::ProfileUpdated(ProfileUpdate {
            username,
            avatar: req.avatar,
            bio: req.bio,
            status: req.status,
        }))
        .await;

    Ok(Json(serde_json::json!({ "success": true })))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_users()?))
}

// ─── Serving ───

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
