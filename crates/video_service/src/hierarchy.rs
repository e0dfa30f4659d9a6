//! Two-level comment tree reconstruction.
//!
//! Comments are stored flat with an optional parent id. Reads regroup them
//! into top-level comments carrying the ids of their direct replies. Replies
//! whose parent cannot be found among the top-level comments are set aside as
//! orphans instead of failing the read.

use std::collections::{HashMap, HashSet};

use domain::{Comment, CommentNode};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OrphanReason {
    /// No comment with the declared parent id is present
    MissingParent,
    /// The declared parent exists but is itself a reply
    ParentIsReply,
}

/// A reply that could not be attached to any top-level comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Orphan {
    pub comment_id: String,
    pub parent_id: String,
    pub reason: OrphanReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommentTree {
    pub roots: Vec<CommentNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orphans: Vec<Orphan>,
}

/// Group a flat list of comments into top-level comments and their replies.
///
/// Roots keep their first-seen order and children keep input order. A root id
/// seen twice is only emitted once. Never fails; anomalies end up in
/// [`CommentTree::orphans`].
pub fn build_comment_tree(comments: impl IntoIterator<Item = Comment>) -> CommentTree {
    let mut roots: Vec<CommentNode> = Vec::new();
    let mut root_index: HashMap<String, usize> = HashMap::new();
    let mut replies: Vec<(Comment, String)> = Vec::new();

    for comment in comments {
        match comment.parent_id.clone() {
            None => {
                if root_index.contains_key(&comment.id) {
                    continue;
                }
                root_index.insert(comment.id.clone(), roots.len());
                roots.push(CommentNode {
                    comment,
                    children: Vec::new(),
                });
            }
            Some(parent_id) => replies.push((comment, parent_id)),
        }
    }

    let reply_ids: HashSet<&str> = replies.iter().map(|(reply, _)| reply.id.as_str()).collect();
    let mut orphans = Vec::new();
    let mut attached: Vec<(usize, String)> = Vec::with_capacity(replies.len());

    for (reply, parent_id) in &replies {
        match root_index.get(parent_id) {
            Some(&position) => attached.push((position, reply.id.clone())),
            None => {
                let reason = if reply_ids.contains(parent_id.as_str()) {
                    OrphanReason::ParentIsReply
                } else {
                    OrphanReason::MissingParent
                };
                orphans.push(Orphan {
                    comment_id: reply.id.clone(),
                    parent_id: parent_id.clone(),
                    reason,
                });
            }
        }
    }

    for (position, reply_id) in attached {
        roots[position].children.push(reply_id);
    }

    CommentTree { roots, orphans }
}
