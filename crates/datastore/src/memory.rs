use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Channel, Comment, Reaction, ToggleAction, Video, VideoPatch};

use crate::{CounterRecount, CounterUpdate, Repository, StoreError, StoreResult, VideoDeletion};

/// In-memory implementation of the Repository trait
///
/// Collections sit behind independent locks. Operations touching several of
/// them always lock in the order videos, channels, comments.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    videos: Arc<RwLock<HashMap<String, Video>>>,
    channels: Arc<RwLock<HashMap<String, Channel>>>,
    comments: Arc<RwLock<HashMap<String, Vec<Comment>>>>,
}

fn read<'a, T>(lock: &'a RwLock<T>, name: &str) -> StoreResult<RwLockReadGuard<'a, T>> {
    lock.read()
        .map_err(|_| StoreError::Unavailable(format!("read lock on {name} poisoned")))
}

fn write<'a, T>(lock: &'a RwLock<T>, name: &str) -> StoreResult<RwLockWriteGuard<'a, T>> {
    lock.write()
        .map_err(|_| StoreError::Unavailable(format!("write lock on {name} poisoned")))
}

fn reaction_set(channel: &mut Channel, reaction: Reaction) -> &mut Vec<String> {
    match reaction {
        Reaction::Like => &mut channel.liked,
        Reaction::Dislike => &mut channel.disliked,
    }
}

impl InMemoryRepository {
    /// Create an empty in-memory repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_video(&self, id: &str) -> StoreResult<Option<Video>> {
        Ok(read(&self.videos, "videos")?.get(id).cloned())
    }

    async fn video_exists(&self, id: &str) -> StoreResult<bool> {
        Ok(read(&self.videos, "videos")?.contains_key(id))
    }

    async fn list_videos(&self, offset: usize, limit: usize) -> StoreResult<Vec<Video>> {
        let videos = read(&self.videos, "videos")?;
        let mut all: Vec<&Video> = videos.values().collect();
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(all
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn videos_by_category(&self, category: &str) -> StoreResult<Vec<Video>> {
        let videos = read(&self.videos, "videos")?;
        let mut matching: Vec<Video> = videos
            .values()
            .filter(|video| video.category == category)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn estimated_video_count(&self) -> StoreResult<u64> {
        Ok(read(&self.videos, "videos")?.len() as u64)
    }

    async fn insert_video(&self, video: Video) -> StoreResult<()> {
        let mut videos = write(&self.videos, "videos")?;
        let mut channels = write(&self.channels, "channels")?;

        if videos.contains_key(&video.id) {
            return Err(StoreError::Duplicate {
                entity: "video",
                id: video.id,
            });
        }
        let owner = channels
            .get_mut(&video.channel_id)
            .ok_or_else(|| StoreError::missing("channel", video.channel_id.clone()))?;
        if !owner.videos.contains(&video.id) {
            owner.videos.push(video.id.clone());
        }
        videos.insert(video.id.clone(), video);
        Ok(())
    }

    async fn update_video(
        &self,
        id: &str,
        patch: VideoPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Video>> {
        let mut videos = write(&self.videos, "videos")?;
        let Some(video) = videos.get_mut(id) else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            video.title = title;
        }
        if let Some(url) = patch.url {
            video.url = url;
        }
        if let Some(description) = patch.description {
            video.description = description;
        }
        if let Some(category) = patch.category {
            video.category = category;
        }
        if let Some(thumbnail) = patch.thumbnail {
            video.thumbnail = Some(thumbnail);
        }
        video.updated_at = now;
        Ok(Some(video.clone()))
    }

    async fn record_view(&self, id: &str) -> StoreResult<Option<Video>> {
        let mut videos = write(&self.videos, "videos")?;
        Ok(videos.get_mut(id).map(|video| {
            video.views = video.views.saturating_add(1);
            video.clone()
        }))
    }

    async fn delete_video(&self, id: &str) -> StoreResult<Option<VideoDeletion>> {
        let mut videos = write(&self.videos, "videos")?;
        let mut channels = write(&self.channels, "channels")?;
        let mut comments = write(&self.comments, "comments")?;

        let Some(video) = videos.remove(id) else {
            return Ok(None);
        };

        let mut reactions_removed = 0;
        for channel in channels.values_mut() {
            channel.videos.retain(|owned| owned != id);
            for reaction in [Reaction::Like, Reaction::Dislike] {
                let set = reaction_set(channel, reaction);
                let before = set.len();
                set.retain(|video_id| video_id != id);
                reactions_removed += before - set.len();
            }
        }

        let comments_removed = comments.remove(id).map(|list| list.len()).unwrap_or(0);

        Ok(Some(VideoDeletion {
            video,
            comments_removed,
            reactions_removed,
        }))
    }

    async fn adjust_video_counter(
        &self,
        id: &str,
        reaction: Reaction,
        action: ToggleAction,
    ) -> StoreResult<CounterUpdate> {
        let mut videos = write(&self.videos, "videos")?;
        let video = videos
            .get_mut(id)
            .ok_or_else(|| StoreError::missing("video", id))?;
        let counter = match reaction {
            Reaction::Like => &mut video.likes,
            Reaction::Dislike => &mut video.dislikes,
        };
        let saturated = match action {
            ToggleAction::Increment => {
                *counter = counter.saturating_add(1);
                false
            }
            ToggleAction::Decrement => match counter.checked_sub(1) {
                Some(value) => {
                    *counter = value;
                    false
                }
                None => true,
            },
        };
        Ok(CounterUpdate {
            value: *counter,
            saturated,
        })
    }

    async fn reconcile_counters(&self, id: &str) -> StoreResult<Option<CounterRecount>> {
        let mut videos = write(&self.videos, "videos")?;
        let channels = read(&self.channels, "channels")?;

        let Some(video) = videos.get_mut(id) else {
            return Ok(None);
        };
        let count = |reaction: Reaction| {
            channels
                .values()
                .filter(|channel| channel.has_reacted(reaction, id))
                .count() as u64
        };
        let recount = CounterRecount {
            likes_before: video.counter(Reaction::Like),
            likes_after: count(Reaction::Like),
            dislikes_before: video.counter(Reaction::Dislike),
            dislikes_after: count(Reaction::Dislike),
        };
        video.likes = recount.likes_after;
        video.dislikes = recount.dislikes_after;
        Ok(Some(recount))
    }

    async fn get_channel(&self, id: &str) -> StoreResult<Option<Channel>> {
        Ok(read(&self.channels, "channels")?.get(id).cloned())
    }

    async fn insert_channel(&self, channel: Channel) -> StoreResult<()> {
        let mut channels = write(&self.channels, "channels")?;
        if channels.contains_key(&channel.id) {
            return Err(StoreError::Duplicate {
                entity: "channel",
                id: channel.id,
            });
        }
        channels.insert(channel.id.clone(), channel);
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        reaction: Reaction,
        video_id: &str,
    ) -> StoreResult<bool> {
        // Videos before channels, held until the set is updated
        let videos = read(&self.videos, "videos")?;
        let mut channels = write(&self.channels, "channels")?;
        if !videos.contains_key(video_id) {
            return Err(StoreError::missing("video", video_id));
        }
        let channel = channels
            .get_mut(channel_id)
            .ok_or_else(|| StoreError::missing("channel", channel_id))?;
        let set = reaction_set(channel, reaction);
        if set.iter().any(|id| id == video_id) {
            return Ok(false);
        }
        set.push(video_id.to_string());
        Ok(true)
    }

    async fn remove_reaction(
        &self,
        channel_id: &str,
        reaction: Reaction,
        video_id: &str,
    ) -> StoreResult<bool> {
        let mut channels = write(&self.channels, "channels")?;
        let channel = channels
            .get_mut(channel_id)
            .ok_or_else(|| StoreError::missing("channel", channel_id))?;
        let set = reaction_set(channel, reaction);
        let before = set.len();
        set.retain(|id| id != video_id);
        Ok(set.len() != before)
    }

    async fn count_reactions(&self, video_id: &str, reaction: Reaction) -> StoreResult<u64> {
        let channels = read(&self.channels, "channels")?;
        Ok(channels
            .values()
            .filter(|channel| channel.has_reacted(reaction, video_id))
            .count() as u64)
    }

    async fn get_comment(&self, id: &str) -> StoreResult<Option<Comment>> {
        let comments = read(&self.comments, "comments")?;
        Ok(comments
            .values()
            .flat_map(|list| list.iter())
            .find(|comment| comment.id == id)
            .cloned())
    }

    async fn get_comments(&self, video_id: &str) -> StoreResult<Vec<Comment>> {
        Ok(read(&self.comments, "comments")?
            .get(video_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_comment(&self, comment: Comment) -> StoreResult<()> {
        let videos = read(&self.videos, "videos")?;
        if !videos.contains_key(&comment.video_id) {
            return Err(StoreError::missing("video", comment.video_id));
        }
        let mut comments = write(&self.comments, "comments")?;
        if comments
            .values()
            .flat_map(|list| list.iter())
            .any(|existing| existing.id == comment.id)
        {
            return Err(StoreError::Duplicate {
                entity: "comment",
                id: comment.id,
            });
        }
        comments
            .entry(comment.video_id.clone())
            .or_default()
            .push(comment);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    fn channel(id: &str) -> Channel {
        Channel {
            id: id.to_string(),
            username: format!("user-{id}"),
            avatar: None,
            subscribers: 0,
            liked: vec![],
            disliked: vec![],
            videos: vec![],
        }
    }

    fn video(id: &str, owner: &str) -> Video {
        Video {
            id: id.to_string(),
            title: format!("Video {id}"),
            url: format!("https://cdn.example/{id}.mp4"),
            category: "music".to_string(),
            description: String::new(),
            likes: 0,
            dislikes: 0,
            thumbnail: None,
            channel_id: owner.to_string(),
            duration: 120,
            views: 0,
            created_at: fixed_time(),
            updated_at: fixed_time(),
        }
    }

    fn comment(id: &str, video_id: &str, parent: Option<&str>) -> Comment {
        Comment {
            id: id.to_string(),
            channel_id: "c1".to_string(),
            video_id: video_id.to_string(),
            body: "nice".to_string(),
            likes: 0,
            dislikes: 0,
            parent_id: parent.map(str::to_string),
            created_at: fixed_time(),
        }
    }

    async fn repo_with_video() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.insert_channel(channel("c1")).await.unwrap();
        repo.insert_video(video("v1", "c1")).await.unwrap();
        repo
    }

    #[tokio::test]
    async fn insert_video_attaches_to_owner() {
        let repo = repo_with_video().await;
        let owner = repo.get_channel("c1").await.unwrap().unwrap();
        assert_eq!(owner.videos, vec!["v1".to_string()]);
    }

    #[tokio::test]
    async fn insert_video_requires_owner() {
        let repo = InMemoryRepository::new();
        let err = repo.insert_video(video("v1", "ghost")).await.unwrap_err();
        assert_eq!(err, StoreError::missing("channel", "ghost"));
        assert!(!repo.video_exists("v1").await.unwrap());
    }

    #[tokio::test]
    async fn add_reaction_is_conditional() {
        let repo = repo_with_video().await;
        assert!(repo.add_reaction("c1", Reaction::Like, "v1").await.unwrap());
        assert!(!repo.add_reaction("c1", Reaction::Like, "v1").await.unwrap());
        let channel = repo.get_channel("c1").await.unwrap().unwrap();
        assert_eq!(channel.liked, vec!["v1".to_string()]);

        assert!(repo.remove_reaction("c1", Reaction::Like, "v1").await.unwrap());
        assert!(!repo.remove_reaction("c1", Reaction::Like, "v1").await.unwrap());
    }

    #[tokio::test]
    async fn reaction_on_unknown_channel_is_missing() {
        let repo = repo_with_video().await;
        let err = repo
            .add_reaction("nobody", Reaction::Like, "v1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { entity: "channel", .. }));
    }

    #[tokio::test]
    async fn reaction_on_deleted_video_is_missing() {
        let repo = repo_with_video().await;
        repo.delete_video("v1").await.unwrap();

        let err = repo
            .add_reaction("c1", Reaction::Like, "v1")
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::missing("video", "v1"));
        assert!(repo.get_channel("c1").await.unwrap().unwrap().liked.is_empty());
    }

    #[tokio::test]
    async fn reconcile_counters_recounts_from_sets() {
        let repo = repo_with_video().await;
        repo.insert_channel(channel("c2")).await.unwrap();
        repo.add_reaction("c1", Reaction::Like, "v1").await.unwrap();
        repo.add_reaction("c2", Reaction::Dislike, "v1").await.unwrap();
        repo.adjust_video_counter("v1", Reaction::Like, ToggleAction::Increment)
            .await
            .unwrap();
        repo.adjust_video_counter("v1", Reaction::Like, ToggleAction::Increment)
            .await
            .unwrap();

        let recount = repo.reconcile_counters("v1").await.unwrap().unwrap();
        assert_eq!(
            recount,
            CounterRecount {
                likes_before: 2,
                likes_after: 1,
                dislikes_before: 0,
                dislikes_after: 1,
            }
        );
        let video = repo.get_video("v1").await.unwrap().unwrap();
        assert_eq!((video.likes, video.dislikes), (1, 1));
        assert!(repo.reconcile_counters("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn counter_decrement_saturates_at_zero() {
        let repo = repo_with_video().await;
        let update = repo
            .adjust_video_counter("v1", Reaction::Dislike, ToggleAction::Decrement)
            .await
            .unwrap();
        assert_eq!(
            update,
            CounterUpdate {
                value: 0,
                saturated: true
            }
        );

        let update = repo
            .adjust_video_counter("v1", Reaction::Dislike, ToggleAction::Increment)
            .await
            .unwrap();
        assert_eq!(update.value, 1);
        assert!(!update.saturated);
    }

    #[tokio::test]
    async fn delete_video_cascades() {
        let repo = repo_with_video().await;
        repo.insert_channel(channel("c2")).await.unwrap();
        repo.add_reaction("c1", Reaction::Like, "v1").await.unwrap();
        repo.add_reaction("c2", Reaction::Dislike, "v1").await.unwrap();
        repo.insert_comment(comment("k1", "v1", None)).await.unwrap();
        repo.insert_comment(comment("k2", "v1", Some("k1")))
            .await
            .unwrap();

        let deletion = repo.delete_video("v1").await.unwrap().unwrap();
        assert_eq!(deletion.video, video("v1", "c1"));
        assert_eq!(deletion.comments_removed, 2);
        assert_eq!(deletion.reactions_removed, 2);

        assert!(repo.get_comments("v1").await.unwrap().is_empty());
        let c1 = repo.get_channel("c1").await.unwrap().unwrap();
        assert!(c1.videos.is_empty());
        assert!(c1.liked.is_empty());
        let c2 = repo.get_channel("c2").await.unwrap().unwrap();
        assert!(c2.disliked.is_empty());

        assert!(repo.delete_video("v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn comments_keep_insertion_order() {
        let repo = repo_with_video().await;
        for id in ["b", "a", "c"] {
            repo.insert_comment(comment(id, "v1", None)).await.unwrap();
        }
        let ids: Vec<String> = repo
            .get_comments("v1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(repo.get_comment("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn comment_requires_video() {
        let repo = repo_with_video().await;
        let err = repo
            .insert_comment(comment("k1", "missing", None))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::missing("video", "missing"));
    }

    #[tokio::test]
    async fn list_videos_is_newest_first() {
        let repo = repo_with_video().await;
        let mut newer = video("v2", "c1");
        newer.created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        repo.insert_video(newer).await.unwrap();

        let page = repo.list_videos(0, 10).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v2", "v1"]);
        assert_eq!(repo.list_videos(1, 10).await.unwrap().len(), 1);
        assert_eq!(repo.estimated_video_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn count_reactions_counts_channels() {
        let repo = repo_with_video().await;
        repo.insert_channel(channel("c2")).await.unwrap();
        repo.add_reaction("c1", Reaction::Like, "v1").await.unwrap();
        repo.add_reaction("c2", Reaction::Like, "v1").await.unwrap();
        assert_eq!(repo.count_reactions("v1", Reaction::Like).await.unwrap(), 2);
        assert_eq!(
            repo.count_reactions("v1", Reaction::Dislike).await.unwrap(),
            0
        );
    }
}
