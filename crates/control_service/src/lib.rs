use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::{DateTime, Utc};
use datastore::{Repository, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use video_service::{EngagementCoordinator, ServiceError};

/// Request body for creating a new channel
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelRequest {
    pub id: String,
    pub username: String,
    pub avatar: Option<String>,
    #[serde(default)]
    pub subscribers: u64,
}

/// Request body for creating a new video.
///
/// Counters are stored as given, so fixtures can start out of sync with
/// the reaction sets.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideoRequest {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub url: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub dislikes: u64,
    pub thumbnail: Option<String>,
    pub duration: u32,
    #[serde(default)]
    pub views: u64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Request body for creating a new comment.
///
/// The parent is not checked, which allows seeding malformed trees.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub id: String,
    pub channel_id: String,
    pub video_id: String,
    pub body: String,
    pub parent_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Response for successful creation
#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub success: bool,
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Clone)]
pub struct ControlState {
    pub repo: Arc<dyn Repository>,
    pub engagement: Arc<EngagementCoordinator>,
}

fn store_error(err: StoreError) -> Response {
    let status = match &err {
        StoreError::Missing { .. } => StatusCode::NOT_FOUND,
        StoreError::Duplicate { .. } => StatusCode::CONFLICT,
        StoreError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(error = %err, status_code = %status, "control request failed");
    let response = ErrorResponse {
        success: false,
        error: err.to_string(),
    };
    (status, Json(response)).into_response()
}

fn created(message: String) -> Response {
    let response = CreateResponse {
        success: true,
        message,
    };
    (StatusCode::CREATED, Json(response)).into_response()
}

/// Handler for creating a new channel
async fn create_channel(
    State(state): State<ControlState>,
    Json(request): Json<CreateChannelRequest>,
) -> Response {
    let channel = domain::Channel {
        id: request.id.clone(),
        username: request.username,
        avatar: request.avatar,
        subscribers: request.subscribers,
        liked: Vec::new(),
        disliked: Vec::new(),
        videos: Vec::new(),
    };

    match state.repo.insert_channel(channel).await {
        Ok(()) => created(format!("Channel '{}' created successfully", request.id)),
        Err(err) => store_error(err),
    }
}

/// Handler for creating a new video
async fn create_video(
    State(state): State<ControlState>,
    Json(request): Json<CreateVideoRequest>,
) -> Response {
    let created_at = request.created_at.unwrap_or_else(Utc::now);
    let video = domain::Video {
        id: request.id.clone(),
        title: request.title,
        url: request.url,
        category: request.category,
        description: request.description,
        likes: request.likes,
        dislikes: request.dislikes,
        thumbnail: request.thumbnail,
        channel_id: request.channel_id,
        duration: request.duration,
        views: request.views,
        created_at,
        updated_at: created_at,
    };

    match state.repo.insert_video(video).await {
        Ok(()) => created(format!("Video '{}' created successfully", request.id)),
        Err(err) => store_error(err),
    }
}

/// Handler for creating a new comment
async fn create_comment(
    State(state): State<ControlState>,
    Json(request): Json<CreateCommentRequest>,
) -> Response {
    let comment = domain::Comment {
        id: request.id.clone(),
        channel_id: request.channel_id,
        video_id: request.video_id,
        body: request.body,
        likes: 0,
        dislikes: 0,
        parent_id: request.parent_id,
        created_at: request.created_at.unwrap_or_else(Utc::now),
    };

    match state.repo.insert_comment(comment).await {
        Ok(()) => created(format!("Comment '{}' created successfully", request.id)),
        Err(err) => store_error(err),
    }
}

/// Handler recomputing one video's counters from the reaction sets
async fn reconcile_video(
    State(state): State<ControlState>,
    Path(video_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.engagement.reconcile(&video_id).await?))
}

/// Handler reconciling every video queued after a failed toggle
async fn repair_pending(State(state): State<ControlState>) -> impl IntoResponse {
    Json(state.engagement.repair_pending().await)
}

/// Create the router for the control API
pub fn create_router(repo: Arc<dyn Repository>, engagement: Arc<EngagementCoordinator>) -> Router {
    Router::new()
        .route("/channels", post(create_channel))
        .route("/videos", post(create_video))
        .route("/comments", post(create_comment))
        .route("/maintenance/reconcile/{video_id}", post(reconcile_video))
        .route("/maintenance/repair", post(repair_pending))
        .with_state(ControlState { repo, engagement })
}
