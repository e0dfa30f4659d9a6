//! Like/dislike toggling.
//!
//! A channel's reaction sets are the source of truth; the per-video counters
//! are derived from them. The two live in separate documents and no
//! transaction spans them, so every toggle goes through conditional store
//! operations and a counter only moves after the store confirmed that the
//! membership actually changed. Anything that may have left a counter off is
//! queued for [`EngagementCoordinator::repair_pending`].
//!
//! Toggles on one video run concurrently with each other. Reconciling that
//! video waits until no toggle is between its membership write and its
//! counter step, and holds new toggles off while it recounts.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use datastore::{Repository, StoreError};
use domain::{Reaction, ToggleAction, ToggleOutcome};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{ServiceError, ServiceResult, Step, StoreResultExt};

/// How a new reaction interacts with the opposite one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionPolicy {
    /// Adding a like clears an existing dislike and vice versa
    #[default]
    Exclusive,
    /// Likes and dislikes are toggled independently; keeping them exclusive
    /// is left to the caller
    Independent,
}

impl FromStr for ReactionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclusive" => Ok(ReactionPolicy::Exclusive),
            "independent" => Ok(ReactionPolicy::Independent),
            other => Err(format!(
                "unknown reaction policy '{other}', expected 'exclusive' or 'independent'"
            )),
        }
    }
}

/// Counters of one video before and after reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub video_id: String,
    pub likes_before: u64,
    pub likes_after: u64,
    pub dislikes_before: u64,
    pub dislikes_after: u64,
}

impl ReconcileReport {
    pub fn drifted(&self) -> bool {
        self.likes_before != self.likes_after || self.dislikes_before != self.dislikes_after
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairSummary {
    pub reconciled: Vec<ReconcileReport>,
    /// Queued videos that no longer exist
    pub missing: Vec<String>,
    /// Videos that failed again and stay queued
    pub failed: Vec<String>,
}

pub struct EngagementCoordinator {
    repo: Arc<dyn Repository>,
    policy: ReactionPolicy,
    pending: Mutex<BTreeSet<String>>,
    /// Per-video gate: toggles share it, reconciliation takes it exclusively
    gates: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl EngagementCoordinator {
    pub fn new(repo: Arc<dyn Repository>, policy: ReactionPolicy) -> Self {
        Self {
            repo,
            policy,
            pending: Mutex::new(BTreeSet::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> ReactionPolicy {
        self.policy
    }

    pub async fn toggle_like(
        &self,
        channel_id: &str,
        video_id: &str,
    ) -> ServiceResult<ToggleOutcome> {
        self.toggle(channel_id, video_id, Reaction::Like).await
    }

    pub async fn toggle_dislike(
        &self,
        channel_id: &str,
        video_id: &str,
    ) -> ServiceResult<ToggleOutcome> {
        self.toggle(channel_id, video_id, Reaction::Dislike).await
    }

    /// Flip `reaction` for (channel, video).
    ///
    /// Fails with `NotFound` before touching anything when the video or the
    /// channel is absent, and with `ConflictRace` when a concurrent toggle
    /// already produced the membership change this call decided on.
    pub async fn toggle(
        &self,
        channel_id: &str,
        video_id: &str,
        reaction: Reaction,
    ) -> ServiceResult<ToggleOutcome> {
        if !self.repo.video_exists(video_id).await.at(Step::LookupVideo)? {
            return Err(ServiceError::not_found("video", video_id));
        }
        let gate = self.gate(video_id);
        let _in_flight = gate.read().await;
        let channel = self
            .repo
            .get_channel(channel_id)
            .await
            .at(Step::LookupChannel)?
            .ok_or_else(|| ServiceError::not_found("channel", channel_id))?;

        let action = if channel.has_reacted(reaction, video_id) {
            self.retract(channel_id, video_id, reaction).await?
        } else {
            self.apply(channel_id, video_id, reaction).await?
        };

        tracing::info!(
            channel_id,
            video_id,
            %reaction,
            action = ?action,
            "reaction toggled"
        );
        Ok(ToggleOutcome { action })
    }

    async fn apply(
        &self,
        channel_id: &str,
        video_id: &str,
        reaction: Reaction,
    ) -> ServiceResult<ToggleAction> {
        let changed = self
            .repo
            .add_reaction(channel_id, reaction, video_id)
            .await
            .at(Step::UpdateMembership)?;
        if !changed {
            return Err(self.conflict(channel_id, video_id, reaction));
        }

        if let Err(err) = self
            .adjust(video_id, reaction, ToggleAction::Increment, Step::AdjustCounter)
            .await
        {
            if matches!(
                err,
                ServiceError::Store {
                    source: StoreError::Missing { .. },
                    ..
                }
            ) {
                self.undo_add(channel_id, video_id, reaction).await;
            }
            return Err(err);
        }

        if self.policy == ReactionPolicy::Exclusive {
            let opposite = reaction.opposite();
            let cleared = self
                .repo
                .remove_reaction(channel_id, opposite, video_id)
                .await
                .at(Step::ClearOpposite)
                .inspect_err(|_| self.queue_repair(video_id))?;
            if cleared {
                self.adjust(
                    video_id,
                    opposite,
                    ToggleAction::Decrement,
                    Step::AdjustOppositeCounter,
                )
                .await?;
            }
        }

        Ok(ToggleAction::Increment)
    }

    async fn retract(
        &self,
        channel_id: &str,
        video_id: &str,
        reaction: Reaction,
    ) -> ServiceResult<ToggleAction> {
        let changed = self
            .repo
            .remove_reaction(channel_id, reaction, video_id)
            .await
            .at(Step::UpdateMembership)?;
        if !changed {
            return Err(self.conflict(channel_id, video_id, reaction));
        }

        self.adjust(video_id, reaction, ToggleAction::Decrement, Step::AdjustCounter)
            .await?;
        Ok(ToggleAction::Decrement)
    }

    /// Take back a reaction whose video vanished before its counter moved
    async fn undo_add(&self, channel_id: &str, video_id: &str, reaction: Reaction) {
        match self.repo.remove_reaction(channel_id, reaction, video_id).await {
            Ok(removed) => {
                tracing::warn!(channel_id, video_id, %reaction, removed, "video deleted mid-toggle, reaction withdrawn");
            }
            Err(err) => {
                tracing::error!(channel_id, video_id, %reaction, error = %err, "failed to withdraw reaction on deleted video");
            }
        }
    }

    /// Move a counter after a confirmed membership change. Any failure or a
    /// decrement hitting zero queues the video for repair.
    async fn adjust(
        &self,
        video_id: &str,
        reaction: Reaction,
        action: ToggleAction,
        step: Step,
    ) -> ServiceResult<()> {
        let update = self
            .repo
            .adjust_video_counter(video_id, reaction, action)
            .await
            .at(step)
            .inspect_err(|err| {
                tracing::error!(
                    video_id,
                    %reaction,
                    %step,
                    drift = step.leaves_drift(),
                    error = %err,
                    "counter update failed after membership change"
                );
                self.queue_repair(video_id);
            })?;

        tracing::debug!(video_id, %reaction, value = update.value, "counter adjusted");
        if update.saturated {
            tracing::warn!(video_id, %reaction, "counter already at zero, queued for reconciliation");
            self.queue_repair(video_id);
        }
        Ok(())
    }

    fn conflict(&self, channel_id: &str, video_id: &str, reaction: Reaction) -> ServiceError {
        tracing::warn!(
            channel_id,
            video_id,
            %reaction,
            "reaction set changed underneath toggle, counter left untouched"
        );
        ServiceError::ConflictRace {
            channel_id: channel_id.to_string(),
            video_id: video_id.to_string(),
        }
    }

    fn gate(&self, video_id: &str) -> Arc<RwLock<()>> {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(video_id.to_string())
            .or_default()
            .clone()
    }

    fn queue_repair(&self, video_id: &str) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(video_id.to_string());
    }

    /// Videos waiting for reconciliation
    pub fn pending_repairs(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Recompute a video's counters from the reaction sets referencing it.
    ///
    /// Waits for toggles in flight on the video, then recounts atomically in
    /// the store.
    pub async fn reconcile(&self, video_id: &str) -> ServiceResult<ReconcileReport> {
        let gate = self.gate(video_id);
        let _exclusive = gate.write().await;

        let was_pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(video_id);

        let recount = match self.repo.reconcile_counters(video_id).await {
            Ok(Some(recount)) => recount,
            Ok(None) => return Err(ServiceError::not_found("video", video_id)),
            Err(err) => {
                if was_pending {
                    self.queue_repair(video_id);
                }
                return Err(ServiceError::Store {
                    step: Step::Reconcile,
                    source: err,
                });
            }
        };

        let report = ReconcileReport {
            video_id: video_id.to_string(),
            likes_before: recount.likes_before,
            likes_after: recount.likes_after,
            dislikes_before: recount.dislikes_before,
            dislikes_after: recount.dislikes_after,
        };
        if report.drifted() {
            tracing::warn!(
                video_id,
                likes_before = report.likes_before,
                likes_after = report.likes_after,
                dislikes_before = report.dislikes_before,
                dislikes_after = report.dislikes_after,
                "repaired counter drift"
            );
        }
        Ok(report)
    }

    /// Reconcile every queued video
    pub async fn repair_pending(&self) -> RepairSummary {
        let mut summary = RepairSummary::default();
        for video_id in self.pending_repairs() {
            match self.reconcile(&video_id).await {
                Ok(report) => summary.reconciled.push(report),
                Err(ServiceError::NotFound(_)) => {
                    summary.missing.push(video_id);
                }
                Err(err) => {
                    tracing::error!(video_id, error = %err, "reconciliation failed");
                    summary.failed.push(video_id);
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use datastore::InMemoryRepository;
    use domain::{Channel, Video};

    fn channel(id: &str) -> Channel {
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

    fn video(id: &str, owner: &str, likes: u64) -> Video {
        let at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        Video {
            id: id.to_string(),
            title: "clip".to_string(),
            url: "media/clip.mp4".to_string(),
            category: "music".to_string(),
            description: String::new(),
            likes,
            dislikes: 0,
            thumbnail: None,
            channel_id: owner.to_string(),
            duration: 90,
            views: 0,
            created_at: at,
            updated_at: at,
        }
    }

    async fn setup(policy: ReactionPolicy) -> (Arc<InMemoryRepository>, EngagementCoordinator) {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_channel(channel("C1")).await.unwrap();
        repo.insert_channel(channel("OWNER")).await.unwrap();
        repo.insert_video(video("V1", "OWNER", 5)).await.unwrap();
        let coordinator = EngagementCoordinator::new(repo.clone(), policy);
        (repo, coordinator)
    }

    #[tokio::test]
    async fn like_then_unlike_restores_state() {
        let (repo, coordinator) = setup(ReactionPolicy::Exclusive).await;

        let first = coordinator.toggle_like("C1", "V1").await.unwrap();
        assert_eq!(first.action, ToggleAction::Increment);
        assert_eq!(repo.get_video("V1").await.unwrap().unwrap().likes, 6);
        assert_eq!(
            repo.get_channel("C1").await.unwrap().unwrap().liked,
            vec!["V1".to_string()]
        );

        let second = coordinator.toggle_like("C1", "V1").await.unwrap();
        assert_eq!(second.action, ToggleAction::Decrement);
        assert_eq!(repo.get_video("V1").await.unwrap().unwrap().likes, 5);
        assert!(repo.get_channel("C1").await.unwrap().unwrap().liked.is_empty());
    }

    #[tokio::test]
    async fn missing_video_is_not_found_and_channel_untouched() {
        let (repo, coordinator) = setup(ReactionPolicy::Exclusive).await;
        let before = repo.get_channel("C1").await.unwrap().unwrap();

        let err = coordinator.toggle_like("C1", "nope").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(repo.get_channel("C1").await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn missing_channel_is_not_found() {
        let (repo, coordinator) = setup(ReactionPolicy::Exclusive).await;
        let err = coordinator.toggle_dislike("ghost", "V1").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(repo.get_video("V1").await.unwrap().unwrap().dislikes, 0);
    }

    #[tokio::test]
    async fn exclusive_policy_clears_opposite_reaction() {
        let (repo, coordinator) = setup(ReactionPolicy::Exclusive).await;

        coordinator.toggle_dislike("C1", "V1").await.unwrap();
        let outcome = coordinator.toggle_like("C1", "V1").await.unwrap();
        assert_eq!(outcome.action, ToggleAction::Increment);

        let channel = repo.get_channel("C1").await.unwrap().unwrap();
        assert_eq!(channel.liked, vec!["V1".to_string()]);
        assert!(channel.disliked.is_empty());
        let video = repo.get_video("V1").await.unwrap().unwrap();
        assert_eq!((video.likes, video.dislikes), (6, 0));
    }

    #[tokio::test]
    async fn independent_policy_keeps_both_reactions() {
        let (repo, coordinator) = setup(ReactionPolicy::Independent).await;

        coordinator.toggle_dislike("C1", "V1").await.unwrap();
        coordinator.toggle_like("C1", "V1").await.unwrap();

        let channel = repo.get_channel("C1").await.unwrap().unwrap();
        assert_eq!(channel.liked, vec!["V1".to_string()]);
        assert_eq!(channel.disliked, vec!["V1".to_string()]);
        let video = repo.get_video("V1").await.unwrap().unwrap();
        assert_eq!((video.likes, video.dislikes), (6, 1));
    }

    #[tokio::test]
    async fn reconcile_repairs_drift() {
        let (repo, coordinator) = setup(ReactionPolicy::Exclusive).await;
        coordinator.toggle_like("C1", "V1").await.unwrap();

        // The fixture's 5 likes have no backing reaction sets
        let report = coordinator.reconcile("V1").await.unwrap();
        assert!(report.drifted());
        assert_eq!(report.likes_before, 6);
        assert_eq!(report.likes_after, 1);
        assert_eq!(repo.get_video("V1").await.unwrap().unwrap().likes, 1);

        let again = coordinator.reconcile("V1").await.unwrap();
        assert!(!again.drifted());
    }

    #[tokio::test]
    async fn saturated_decrement_is_queued_for_repair() {
        let (repo, coordinator) = setup(ReactionPolicy::Exclusive).await;
        repo.add_reaction("C1", Reaction::Dislike, "V1").await.unwrap();

        let outcome = coordinator.toggle_dislike("C1", "V1").await.unwrap();
        assert_eq!(outcome.action, ToggleAction::Decrement);
        assert_eq!(coordinator.pending_repairs(), vec!["V1".to_string()]);

        let summary = coordinator.repair_pending().await;
        assert_eq!(summary.reconciled.len(), 1);
        assert!(coordinator.pending_repairs().is_empty());
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!(
            "Exclusive".parse::<ReactionPolicy>(),
            Ok(ReactionPolicy::Exclusive)
        );
        assert_eq!(
            " independent ".parse::<ReactionPolicy>(),
            Ok(ReactionPolicy::Independent)
        );
        assert!("both".parse::<ReactionPolicy>().is_err());
    }
}
