#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use datastore::{
    CounterRecount, CounterUpdate, InMemoryRepository, Repository, StoreError, StoreResult, VideoDeletion,
};
use domain::{Channel, Comment, Reaction, ToggleAction, Video, VideoPatch};
use tokio::sync::Barrier;

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
}

pub fn channel(id: &str) -> Channel {
    Channel {
        id: id.to_string(),
        username: id.to_lowercase(),
        avatar: None,
        subscribers: 0,
        liked: vec![],
        disliked: vec![],
        videos: vec![],
    }
}

pub fn video(id: &str, owner: &str, likes: u64) -> Video {
    Video {
        id: id.to_string(),
        title: format!("Video {id}"),
        url: format!("media/{id}.mp4"),
        category: "music".to_string(),
        description: String::new(),
        likes,
        dislikes: 0,
        thumbnail: None,
        channel_id: owner.to_string(),
        duration: 90,
        views: 0,
        created_at: fixed_time(),
        updated_at: fixed_time(),
    }
}

pub fn comment(id: &str, video_id: &str, parent: Option<&str>) -> Comment {
    Comment {
        id: id.to_string(),
        channel_id: "C1".to_string(),
        video_id: video_id.to_string(),
        body: format!("comment {id}"),
        likes: 0,
        dislikes: 0,
        parent_id: parent.map(str::to_string),
        created_at: fixed_time(),
    }
}

/// Store with channel `C1`, owner channel `OWNER` and video `V1` (5 likes)
pub async fn seeded_store() -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.insert_channel(channel("C1")).await.unwrap();
    repo.insert_channel(channel("OWNER")).await.unwrap();
    repo.insert_video(video("V1", "OWNER", 5)).await.unwrap();
    repo
}

/// Store operations a [`ScriptedRepository`] can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    VideoExists,
    GetChannel,
    AddReaction,
    RemoveReaction,
    AdjustCounter,
}

/// Wraps the in-memory store to force interleavings and failures.
///
/// * `channel_barrier`: every `get_channel` waits on the barrier after
///   reading, so concurrent toggles all observe the same snapshot.
/// * `fail_on`: the listed operation returns `Unavailable`.
/// * `delete_after`: once the listed operation returns, the video it
///   touched is deleted.
pub struct ScriptedRepository {
    pub inner: InMemoryRepository,
    channel_barrier: Option<Barrier>,
    fail_on: Option<Op>,
    delete_after: Option<Op>,
    pub calls: AtomicUsize,
}

impl ScriptedRepository {
    pub fn new(inner: InMemoryRepository) -> Self {
        Self {
            inner,
            channel_barrier: None,
            fail_on: None,
            delete_after: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_channel_barrier(mut self, parties: usize) -> Self {
        self.channel_barrier = Some(Barrier::new(parties));
        self
    }

    /// Join the channel barrier from outside, releasing toggles parked on it
    pub async fn release_channel_reads(&self) {
        if let Some(barrier) = &self.channel_barrier {
            barrier.wait().await;
        }
    }

    pub fn deleting_video_after(mut self, op: Op) -> Self {
        self.delete_after = Some(op);
        self
    }

    pub fn failing_on(mut self, op: Op) -> Self {
        self.fail_on = Some(op);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn check(&self, op: Op) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(op) {
            return Err(StoreError::Unavailable(format!("injected failure on {op:?}")));
        }
        Ok(())
    }

    async fn after(&self, op: Op, video_id: &str) {
        if self.delete_after == Some(op) {
            self.inner.delete_video(video_id).await.unwrap();
        }
    }
}

#[async_trait]
impl Repository for ScriptedRepository {
    async fn get_video(&self, id: &str) -> StoreResult<Option<Video>> {
        self.inner.get_video(id).await
    }

    async fn video_exists(&self, id: &str) -> StoreResult<bool> {
        self.check(Op::VideoExists)?;
        let exists = self.inner.video_exists(id).await;
        self.after(Op::VideoExists, id).await;
        exists
    }

    async fn list_videos(&self, offset: usize, limit: usize) -> StoreResult<Vec<Video>> {
        self.inner.list_videos(offset, limit).await
    }

    async fn videos_by_category(&self, category: &str) -> StoreResult<Vec<Video>> {
        self.inner.videos_by_category(category).await
    }

    async fn estimated_video_count(&self) -> StoreResult<u64> {
        self.inner.estimated_video_count().await
    }

    async fn insert_video(&self, video: Video) -> StoreResult<()> {
        self.inner.insert_video(video).await
    }

    async fn update_video(
        &self,
        id: &str,
        patch: VideoPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Video>> {
        self.inner.update_video(id, patch, now).await
    }

    async fn record_view(&self, id: &str) -> StoreResult<Option<Video>> {
        self.inner.record_view(id).await
    }

    async fn delete_video(&self, id: &str) -> StoreResult<Option<VideoDeletion>> {
        self.inner.delete_video(id).await
    }

    async fn adjust_video_counter(
        &self,
        id: &str,
        reaction: Reaction,
        action: ToggleAction,
    ) -> StoreResult<CounterUpdate> {
        self.check(Op::AdjustCounter)?;
        self.inner.adjust_video_counter(id, reaction, action).await
    }

    async fn reconcile_counters(&self, id: &str) -> StoreResult<Option<CounterRecount>> {
        self.inner.reconcile_counters(id).await
    }

    async fn get_channel(&self, id: &str) -> StoreResult<Option<Channel>> {
        self.check(Op::GetChannel)?;
        let channel = self.inner.get_channel(id).await?;
        if let Some(barrier) = &self.channel_barrier {
            barrier.wait().await;
        }
        Ok(channel)
    }

    async fn insert_channel(&self, channel: Channel) -> StoreResult<()> {
        self.inner.insert_channel(channel).await
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        reaction: Reaction,
        video_id: &str,
    ) -> StoreResult<bool> {
        self.check(Op::AddReaction)?;
        let added = self.inner.add_reaction(channel_id, reaction, video_id).await;
        self.after(Op::AddReaction, video_id).await;
        added
    }

    async fn remove_reaction(
        &self,
        channel_id: &str,
        reaction: Reaction,
        video_id: &str,
    ) -> StoreResult<bool> {
        self.check(Op::RemoveReaction)?;
        self.inner
            .remove_reaction(channel_id, reaction, video_id)
            .await
    }

    async fn count_reactions(&self, video_id: &str, reaction: Reaction) -> StoreResult<u64> {
        self.inner.count_reactions(video_id, reaction).await
    }

    async fn get_comment(&self, id: &str) -> StoreResult<Option<Comment>> {
        self.inner.get_comment(id).await
    }

    async fn get_comments(&self, video_id: &str) -> StoreResult<Vec<Comment>> {
        self.inner.get_comments(video_id).await
    }

    async fn insert_comment(&self, comment: Comment) -> StoreResult<()> {
        self.inner.insert_comment(comment).await
    }
}
