use chrono::{Duration, TimeZone, Utc};
use domain::{CATEGORIES, Channel, Comment, Reaction, Video};
use fake::Fake;
use fake::faker::internet::en::Username;
use fake::faker::lorem::en::{Paragraph, Sentence};
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::{InMemoryRepository, Repository, StoreResult};

const DEMO_CHANNELS: usize = 6;
const DEMO_VIDEOS: usize = 12;

impl InMemoryRepository {
    /// Create a repository populated with generated demo data.
    ///
    /// Reactions are applied through the same conditional operations the
    /// service uses and counters are derived from them, so the data starts
    /// out consistent.
    pub async fn with_demo_data<R: Rng + ?Sized>(rng: &mut R) -> StoreResult<Self> {
        let repo = Self::new();
        // Fixed point in time for consistent dummy data
        let fixed_time = Utc
            .with_ymd_and_hms(2023, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();

        let mut channel_ids = Vec::with_capacity(DEMO_CHANNELS);
        for i in 0..DEMO_CHANNELS {
            let channel = Channel {
                id: format!("channel-{i}"),
                username: Username().fake_with_rng(rng),
                avatar: Some(format!("avatars/channel-{i}.png")),
                subscribers: rng.random_range(0..10_000),
                liked: vec![],
                disliked: vec![],
                videos: vec![],
            };
            channel_ids.push(channel.id.clone());
            repo.insert_channel(channel).await?;
        }

        for i in 0..DEMO_VIDEOS {
            let owner = &channel_ids[i % channel_ids.len()];
            let created_at = fixed_time + Duration::hours(i as i64);
            let category = CATEGORIES.choose(rng).copied().unwrap_or(CATEGORIES[0]);
            let video = Video {
                id: format!("video-{i}"),
                title: Sentence(2..6).fake_with_rng(rng),
                url: format!("media/video-{i}.mp4"),
                category: category.to_string(),
                description: Paragraph(1..3).fake_with_rng(rng),
                likes: 0,
                dislikes: 0,
                thumbnail: Some(format!("thumbnails/video-{i}.jpg")),
                channel_id: owner.clone(),
                duration: rng.random_range(30..3_600),
                views: rng.random_range(0..100_000),
                created_at,
                updated_at: created_at,
            };
            let video_id = video.id.clone();
            repo.insert_video(video).await?;

            let mut roots: Vec<String> = Vec::new();
            for j in 0..rng.random_range(0..6) {
                // Roughly a third of the comments are replies to an earlier root
                let parent_id = if !roots.is_empty() && rng.random_bool(0.35) {
                    roots.choose(rng).cloned()
                } else {
                    None
                };
                let comment = Comment {
                    id: format!("{video_id}-comment-{j}"),
                    channel_id: channel_ids[rng.random_range(0..channel_ids.len())].clone(),
                    video_id: video_id.clone(),
                    body: Sentence(3..12).fake_with_rng(rng),
                    likes: rng.random_range(0..50),
                    dislikes: rng.random_range(0..5),
                    parent_id: parent_id.clone(),
                    created_at: created_at + Duration::minutes(j as i64 + 1),
                };
                if parent_id.is_none() {
                    roots.push(comment.id.clone());
                }
                repo.insert_comment(comment).await?;
            }

            for channel_id in &channel_ids {
                let reaction = match rng.random_range(0..4) {
                    0 | 1 => Reaction::Like,
                    2 => Reaction::Dislike,
                    _ => continue,
                };
                repo.add_reaction(channel_id, reaction, &video_id).await?;
            }
            repo.reconcile_counters(&video_id).await?;
        }

        tracing::info!(
            channels = DEMO_CHANNELS,
            videos = DEMO_VIDEOS,
            "populated in-memory store with demo data"
        );
        Ok(repo)
    }
}
