use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category tags a video may carry
pub const CATEGORIES: &[&str] = &[
    "music",
    "gaming",
    "news",
    "sports",
    "education",
    "comedy",
    "travel",
];

/// Represents a video resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub title: String,
    pub url: String,
    pub category: String,
    pub description: String,
    /// Number of channels whose `liked` set holds this video
    pub likes: u64,
    /// Number of channels whose `disliked` set holds this video
    pub dislikes: u64,
    pub thumbnail: Option<String>,
    pub channel_id: String,
    /// Duration in seconds
    pub duration: u32,
    pub views: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    /// Current counter value for one reaction kind
    pub fn counter(&self, reaction: Reaction) -> u64 {
        match reaction {
            Reaction::Like => self.likes,
            Reaction::Dislike => self.dislikes,
        }
    }
}

/// Represents a comment left on a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub channel_id: String,
    pub video_id: String,
    pub body: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub dislikes: u64,
    /// Absent for top-level comments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// Represents a channel (the acting identity of every request)
///
/// `liked` and `disliked` hold video ids with set semantics: the store never
/// inserts an id twice, and insertion order is kept for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub username: String,
    pub avatar: Option<String>,
    #[serde(default)]
    pub subscribers: u64,
    #[serde(default)]
    pub liked: Vec<String>,
    #[serde(default)]
    pub disliked: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
}

impl Channel {
    /// The reaction set for one reaction kind
    pub fn reactions(&self, reaction: Reaction) -> &[String] {
        match reaction {
            Reaction::Like => &self.liked,
            Reaction::Dislike => &self.disliked,
        }
    }

    pub fn has_reacted(&self, reaction: Reaction, video_id: &str) -> bool {
        self.reactions(reaction).iter().any(|id| id == video_id)
    }
}

/// A like or a dislike applied by one channel to one video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    pub fn opposite(self) -> Self {
        match self {
            Reaction::Like => Reaction::Dislike,
            Reaction::Dislike => Reaction::Like,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Reaction::Like => "like",
            Reaction::Dislike => "dislike",
        }
    }
}

impl std::fmt::Display for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction a toggle moved the counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    Increment,
    Decrement,
}

/// Result of a like/dislike toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub action: ToggleAction,
}

/// A top-level comment with the ids of its direct replies.
/// Built per read, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

/// Input for creating a video
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVideo {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<u32>,
}

/// Partial update of a video; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPatch {
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
}

impl VideoPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.url.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.thumbnail.is_none()
    }
}

/// Input for posting a comment
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub body: String,
    pub parent_id: Option<String>,
}
