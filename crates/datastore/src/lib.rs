use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Channel, Comment, Reaction, ToggleAction, Video, VideoPatch};
use serde::Serialize;

mod fixtures;
mod memory;

pub use memory::InMemoryRepository;

/// Errors raised by a storage backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} '{id}' does not exist")]
    Missing { entity: &'static str, id: String },

    #[error("{entity} '{id}' already exists")]
    Duplicate { entity: &'static str, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn missing(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Missing {
            entity,
            id: id.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of an atomic counter adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterUpdate {
    /// Counter value after the adjustment
    pub value: u64,
    /// True when a decrement hit the zero floor and was not applied
    pub saturated: bool,
}

/// Counters of a video before and after a recount from the reaction sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRecount {
    pub likes_before: u64,
    pub likes_after: u64,
    pub dislikes_before: u64,
    pub dislikes_after: u64,
}

/// What a cascading video deletion removed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDeletion {
    pub video: Video,
    pub comments_removed: usize,
    /// Number of (channel, reaction) memberships purged
    pub reactions_removed: usize,
}

/// Repository trait for data access abstraction
/// This allows switching between different storage backends (in-memory, filesystem, database)
///
/// Every method is a single atomic operation against the backend. Nothing here
/// spans several calls, so multi-step flows must rely on the conditional
/// mutations (`add_reaction`, `remove_reaction`, `adjust_video_counter`)
/// reporting whether they changed state.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Get a video by ID
    async fn get_video(&self, id: &str) -> StoreResult<Option<Video>>;

    async fn video_exists(&self, id: &str) -> StoreResult<bool>;

    /// Get a page of videos, newest first
    async fn list_videos(&self, offset: usize, limit: usize) -> StoreResult<Vec<Video>>;

    /// Get all videos carrying a category tag
    async fn videos_by_category(&self, category: &str) -> StoreResult<Vec<Video>>;

    /// Cheap estimate of the number of stored videos
    async fn estimated_video_count(&self) -> StoreResult<u64>;

    /// Add a video and append it to its owner's video list.
    /// Fails with `Missing` when the owning channel is absent.
    async fn insert_video(&self, video: Video) -> StoreResult<()>;

    /// Apply a patch, returning the updated video or `None` when absent
    async fn update_video(
        &self,
        id: &str,
        patch: VideoPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Video>>;

    /// Increment the view count, returning the updated video
    async fn record_view(&self, id: &str) -> StoreResult<Option<Video>>;

    /// Delete a video together with its comments, its entry in the owner's
    /// video list and every reaction referencing it
    async fn delete_video(&self, id: &str) -> StoreResult<Option<VideoDeletion>>;

    /// Atomically move one reaction counter by one. Decrements never go
    /// below zero.
    async fn adjust_video_counter(
        &self,
        id: &str,
        reaction: Reaction,
        action: ToggleAction,
    ) -> StoreResult<CounterUpdate>;

    /// Recount both reaction counters from the channels' reaction sets and
    /// store the result, as one operation. No reaction change may land
    /// between the count and the write. Returns `None` when the video is absent.
    async fn reconcile_counters(&self, id: &str) -> StoreResult<Option<CounterRecount>>;

    /// Get a channel by ID
    async fn get_channel(&self, id: &str) -> StoreResult<Option<Channel>>;

    async fn insert_channel(&self, channel: Channel) -> StoreResult<()>;

    /// Add `video_id` to a reaction set if absent. Returns whether the set changed.
    /// Fails with `Missing` when the channel or the video is absent.
    async fn add_reaction(
        &self,
        channel_id: &str,
        reaction: Reaction,
        video_id: &str,
    ) -> StoreResult<bool>;

    /// Remove `video_id` from a reaction set if present. Returns whether the set changed.
    async fn remove_reaction(
        &self,
        channel_id: &str,
        reaction: Reaction,
        video_id: &str,
    ) -> StoreResult<bool>;

    /// Number of channels whose reaction set holds `video_id`
    async fn count_reactions(&self, video_id: &str, reaction: Reaction) -> StoreResult<u64>;

    async fn get_comment(&self, id: &str) -> StoreResult<Option<Comment>>;

    /// Get comments for a video in insertion order
    async fn get_comments(&self, video_id: &str) -> StoreResult<Vec<Comment>>;

    /// Add a comment. Fails with `Missing` when the video is absent.
    async fn insert_comment(&self, comment: Comment) -> StoreResult<()>;
}
