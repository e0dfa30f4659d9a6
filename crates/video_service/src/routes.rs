use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::IntoResponse,
    routing::{get, put},
};
use datastore::Repository;
use domain::{NewComment, NewVideo, VideoPatch};
use rand::rngs::StdRng;
use serde::Deserialize;

use crate::catalog::{Catalog, DEFAULT_PER_PAGE};
use crate::engagement::{EngagementCoordinator, ReactionPolicy};
use crate::error::ServiceError;

/// Header carrying the authenticated channel id, set by the gateway in front
/// of this service
pub const CHANNEL_HEADER: &str = "x-channel-id";

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub engagement: Arc<EngagementCoordinator>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repository>, policy: ReactionPolicy, rng: StdRng) -> Self {
        Self {
            catalog: Arc::new(Catalog::new(repo.clone(), rng)),
            engagement: Arc::new(EngagementCoordinator::new(repo, policy)),
        }
    }
}

/// The channel acting on a request
#[derive(Debug, Clone)]
pub struct ActingChannel(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ActingChannel {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CHANNEL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| ActingChannel(value.to_string()))
            .ok_or(ServiceError::Unauthenticated)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub per_page: Option<usize>,
    #[serde(default)]
    pub comment_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SampleParams {
    pub tag: String,
    #[serde(default)]
    pub size: Option<usize>,
}

async fn list_videos(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state
        .catalog
        .list(
            params.page.unwrap_or(1),
            params.per_page.unwrap_or(DEFAULT_PER_PAGE),
            params.comment_limit.unwrap_or(0),
        )
        .await?;
    Ok(Json(page))
}

async fn random_videos(
    State(state): State<AppState>,
    Query(params): Query<SampleParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let videos = state
        .catalog
        .sample_by_tag(&params.tag, params.size.unwrap_or(1))
        .await?;
    Ok(Json(videos))
}

async fn show_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.catalog.show(&id).await?))
}

async fn comment_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.catalog.comment_tree(&id).await?))
}

async fn add_comment(
    State(state): State<AppState>,
    ActingChannel(channel_id): ActingChannel,
    Path(id): Path<String>,
    Json(request): Json<NewComment>,
) -> Result<impl IntoResponse, ServiceError> {
    let comment = state.catalog.add_comment(&channel_id, &id, request).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn toggle_like(
    State(state): State<AppState>,
    ActingChannel(channel_id): ActingChannel,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.engagement.toggle_like(&channel_id, &id).await?))
}

async fn toggle_dislike(
    State(state): State<AppState>,
    ActingChannel(channel_id): ActingChannel,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.engagement.toggle_dislike(&channel_id, &id).await?))
}

async fn create_video(
    State(state): State<AppState>,
    ActingChannel(channel_id): ActingChannel,
    Json(request): Json<NewVideo>,
) -> Result<impl IntoResponse, ServiceError> {
    let video = state.catalog.create_video(&channel_id, request).await?;
    Ok((StatusCode::CREATED, Json(video)))
}

async fn update_video(
    State(state): State<AppState>,
    ActingChannel(channel_id): ActingChannel,
    Path(id): Path<String>,
    Json(patch): Json<VideoPatch>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(
        state.catalog.update_video(&channel_id, &id, patch).await?,
    ))
}

async fn delete_video(
    State(state): State<AppState>,
    ActingChannel(channel_id): ActingChannel,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.catalog.delete_video(&channel_id, &id).await?))
}

/// Create the router for the public video API
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/videos", get(list_videos).post(create_video))
        .route("/videos/random", get(random_videos))
        .route(
            "/videos/{id}",
            get(show_video).patch(update_video).delete(delete_video),
        )
        .route("/videos/{id}/comments", get(comment_tree).post(add_comment))
        .route("/videos/{id}/like", put(toggle_like))
        .route("/videos/{id}/dislike", put(toggle_dislike))
        .with_state(state)
}
