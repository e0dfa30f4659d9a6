use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use datastore::{Repository, VideoDeletion};
use domain::{CATEGORIES, Comment, NewComment, NewVideo, Video, VideoPatch};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde::Serialize;

use crate::error::{FieldError, ServiceError, ServiceResult, Step, StoreResultExt};
use crate::hierarchy::{CommentTree, build_comment_tree};

pub const DEFAULT_PER_PAGE: usize = 10;
pub const MAX_PER_PAGE: usize = 100;
pub const MAX_COMMENT_LIMIT: usize = 100;
pub const MAX_SAMPLE_SIZE: usize = 50;

const MAX_TITLE_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 5_000;
const MAX_COMMENT_LEN: usize = 2_000;
/// Range used when a new video does not state its duration (seconds)
const GENERATED_DURATION: std::ops::RangeInclusive<u32> = 60..=1_200;

/// A video with the first comments attached, as returned by listings
#[derive(Debug, Clone, Serialize)]
pub struct ListedVideo {
    #[serde(flatten)]
    pub video: Video,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPage {
    pub page: usize,
    pub total_pages: u64,
    pub items: Vec<ListedVideo>,
}

/// Video listing, lookup and CRUD on top of a [`Repository`].
///
/// Random choices (sampling, generated category and duration) are drawn from
/// the injected generator so they can be replayed in tests.
pub struct Catalog {
    repo: Arc<dyn Repository>,
    rng: Mutex<StdRng>,
}

impl Catalog {
    pub fn new(repo: Arc<dyn Repository>, rng: StdRng) -> Self {
        Self {
            repo,
            rng: Mutex::new(rng),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    /// One page of videos, newest first.
    ///
    /// `page` is clamped to at least 1 and `per_page` to `1..=MAX_PER_PAGE`.
    /// `total_pages` is the estimated count divided by `per_page`, rounded down.
    pub async fn list(
        &self,
        page: usize,
        per_page: usize,
        comment_limit: usize,
    ) -> ServiceResult<VideoPage> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let comment_limit = comment_limit.min(MAX_COMMENT_LIMIT);

        let total = self.repo.estimated_video_count().await.at(Step::Read)?;
        let offset = (page - 1).saturating_mul(per_page);
        let videos = self.repo.list_videos(offset, per_page).await.at(Step::Read)?;

        let mut items = Vec::with_capacity(videos.len());
        for video in videos {
            let comments = if comment_limit == 0 {
                Vec::new()
            } else {
                let mut comments = self.repo.get_comments(&video.id).await.at(Step::Read)?;
                comments.truncate(comment_limit);
                comments
            };
            items.push(ListedVideo { video, comments });
        }

        Ok(VideoPage {
            page,
            total_pages: total / per_page as u64,
            items,
        })
    }

    /// Up to `size` random videos tagged with `tag`
    pub async fn sample_by_tag(&self, tag: &str, size: usize) -> ServiceResult<Vec<Video>> {
        let size = size.clamp(1, MAX_SAMPLE_SIZE);
        let candidates = self.repo.videos_by_category(tag).await.at(Step::Read)?;
        Ok(self.with_rng(|rng| {
            candidates
                .choose_multiple(rng, size)
                .cloned()
                .collect()
        }))
    }

    /// Fetch a video and count the view
    pub async fn show(&self, video_id: &str) -> ServiceResult<Video> {
        self.repo
            .record_view(video_id)
            .await
            .at(Step::Write)?
            .ok_or_else(|| ServiceError::not_found("video", video_id))
    }

    pub async fn comment_tree(&self, video_id: &str) -> ServiceResult<CommentTree> {
        if !self.repo.video_exists(video_id).await.at(Step::LookupVideo)? {
            return Err(ServiceError::not_found("video", video_id));
        }
        let comments = self.repo.get_comments(video_id).await.at(Step::Read)?;
        let tree = build_comment_tree(comments);
        for orphan in &tree.orphans {
            tracing::warn!(
                video_id,
                comment_id = %orphan.comment_id,
                parent_id = %orphan.parent_id,
                reason = ?orphan.reason,
                "orphaned reply left out of comment tree"
            );
        }
        Ok(tree)
    }

    pub async fn create_video(&self, owner_id: &str, input: NewVideo) -> ServiceResult<Video> {
        let mut errors = Vec::new();
        check_title(&input.title, &mut errors);
        check_url(&input.url, &mut errors);
        check_description(&input.description, &mut errors);
        if let Some(category) = &input.category {
            check_category(category, &mut errors);
        }
        if input.duration == Some(0) {
            errors.push(FieldError::new("duration", "must be positive"));
        }
        if !errors.is_empty() {
            return Err(ServiceError::Validation(errors));
        }

        if self
            .repo
            .get_channel(owner_id)
            .await
            .at(Step::LookupChannel)?
            .is_none()
        {
            return Err(ServiceError::not_found("channel", owner_id));
        }

        let (category, duration) = self.with_rng(|rng| {
            let category = input.category.clone().unwrap_or_else(|| {
                CATEGORIES
                    .choose(rng)
                    .copied()
                    .unwrap_or(CATEGORIES[0])
                    .to_string()
            });
            let duration = input
                .duration
                .unwrap_or_else(|| rng.random_range(GENERATED_DURATION));
            (category, duration)
        });

        let now = Utc::now();
        let video = Video {
            id: uuid::Uuid::new_v4().to_string(),
            title: input.title.trim().to_string(),
            url: input.url.trim().to_string(),
            category,
            description: input.description,
            likes: 0,
            dislikes: 0,
            thumbnail: input.thumbnail,
            channel_id: owner_id.to_string(),
            duration,
            views: 0,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert_video(video.clone()).await.at(Step::Write)?;

        tracing::info!(video_id = %video.id, channel_id = owner_id, "video created");
        Ok(video)
    }

    /// Update a video owned by `owner_id`. Videos owned by someone else are
    /// reported as not found.
    pub async fn update_video(
        &self,
        owner_id: &str,
        video_id: &str,
        patch: VideoPatch,
    ) -> ServiceResult<Video> {
        let mut errors = Vec::new();
        if patch.is_empty() {
            errors.push(FieldError::new("body", "no fields to update"));
        }
        if let Some(title) = &patch.title {
            check_title(title, &mut errors);
        }
        if let Some(url) = &patch.url {
            check_url(url, &mut errors);
        }
        if let Some(description) = &patch.description {
            check_description(description, &mut errors);
        }
        if let Some(category) = &patch.category {
            check_category(category, &mut errors);
        }
        if !errors.is_empty() {
            return Err(ServiceError::Validation(errors));
        }

        self.owned_video(owner_id, video_id).await?;
        let patch = VideoPatch {
            title: patch.title.map(|t| t.trim().to_string()),
            url: patch.url.map(|u| u.trim().to_string()),
            ..patch
        };
        let video = self
            .repo
            .update_video(video_id, patch, Utc::now())
            .await
            .at(Step::Write)?
            .ok_or_else(|| ServiceError::not_found("video", video_id))?;

        tracing::info!(video_id, channel_id = owner_id, "video updated");
        Ok(video)
    }

    /// Delete a video owned by `owner_id` with its comments and reactions
    pub async fn delete_video(&self, owner_id: &str, video_id: &str) -> ServiceResult<VideoDeletion> {
        self.owned_video(owner_id, video_id).await?;
        let deletion = self
            .repo
            .delete_video(video_id)
            .await
            .at(Step::Write)?
            .ok_or_else(|| ServiceError::not_found("video", video_id))?;

        tracing::info!(
            video_id,
            channel_id = owner_id,
            comments_removed = deletion.comments_removed,
            reactions_removed = deletion.reactions_removed,
            "video deleted"
        );
        Ok(deletion)
    }

    /// Post a comment or a reply. Replies must target a top-level comment of
    /// the same video.
    pub async fn add_comment(
        &self,
        author_id: &str,
        video_id: &str,
        input: NewComment,
    ) -> ServiceResult<Comment> {
        let body = input.body.trim();
        if body.is_empty() {
            return Err(ServiceError::invalid("body", "must not be empty"));
        }
        if body.chars().count() > MAX_COMMENT_LEN {
            return Err(ServiceError::invalid(
                "body",
                format!("must be at most {MAX_COMMENT_LEN} characters"),
            ));
        }

        if !self.repo.video_exists(video_id).await.at(Step::LookupVideo)? {
            return Err(ServiceError::not_found("video", video_id));
        }
        if self
            .repo
            .get_channel(author_id)
            .await
            .at(Step::LookupChannel)?
            .is_none()
        {
            return Err(ServiceError::not_found("channel", author_id));
        }

        if let Some(parent_id) = &input.parent_id {
            match self.repo.get_comment(parent_id).await.at(Step::Read)? {
                None => return Err(ServiceError::invalid("parentId", "unknown comment")),
                Some(parent) if parent.video_id != video_id => {
                    return Err(ServiceError::invalid(
                        "parentId",
                        "comment belongs to another video",
                    ));
                }
                Some(parent) if parent.is_reply() => {
                    return Err(ServiceError::invalid(
                        "parentId",
                        "replies can only target top-level comments",
                    ));
                }
                Some(_) => {}
            }
        }

        let comment = Comment {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: author_id.to_string(),
            video_id: video_id.to_string(),
            body: body.to_string(),
            likes: 0,
            dislikes: 0,
            parent_id: input.parent_id,
            created_at: Utc::now(),
        };
        self.repo.insert_comment(comment.clone()).await.at(Step::Write)?;
        Ok(comment)
    }

    async fn owned_video(&self, owner_id: &str, video_id: &str) -> ServiceResult<Video> {
        match self.repo.get_video(video_id).await.at(Step::LookupVideo)? {
            Some(video) if video.channel_id == owner_id => Ok(video),
            _ => Err(ServiceError::not_found("video", video_id)),
        }
    }
}

fn check_title(title: &str, errors: &mut Vec<FieldError>) {
    let title = title.trim();
    if title.is_empty() {
        errors.push(FieldError::new("title", "must not be empty"));
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.push(FieldError::new(
            "title",
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
}

fn check_url(url: &str, errors: &mut Vec<FieldError>) {
    if url.trim().is_empty() {
        errors.push(FieldError::new("url", "must not be empty"));
    }
}

fn check_description(description: &str, errors: &mut Vec<FieldError>) {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        errors.push(FieldError::new(
            "description",
            format!("must be at most {MAX_DESCRIPTION_LEN} characters"),
        ));
    }
}

fn check_category(category: &str, errors: &mut Vec<FieldError>) {
    if !CATEGORIES.contains(&category) {
        errors.push(FieldError::new(
            "category",
            format!("must be one of {}", CATEGORIES.join(", ")),
        ));
    }
}
