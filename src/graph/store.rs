//! In-memory entity graph store.
//!
//! [`GraphStore`] holds the replica's authoritative snapshot of posts,
//! comments and vote slots. Writers apply whole [`MutationBatch`]es under a
//! single write lock; readers clone an `Arc` of the current
//! [`GraphSnapshot`] and are never blocked. Every successful apply swaps in
//! a fresh snapshot and bumps a store-wide version counter published through
//! a `watch` channel.
//!
//! ## Indexing Strategy
//!
//! For efficient queries, each snapshot maintains secondary indexes:
//! - `post_order`: `(created_at, id)` pairs kept sorted for ordered listings
//! - `post_comments`: post id → comment ids for O(1) comment listing
//! - `target_votes`: target id → vote slot ids for O(1) tally reads
//!
//! These indexes are maintained when operations are staged.
//!
//! ## Vote slots
//!
//! Votes are stored as last-writer-wins slots keyed by their derived id:
//! either an active vote or a tombstone left by a retraction. A slot write
//! wins when its `(timestamp, rank)` pair is greater than the current one,
//! with rank ordering `Tombstone > Down > Up` as the deterministic tiebreak
//! for equal logical timestamps. Replaying an identical write compares equal
//! and leaves the slot untouched, which is what makes batch replay harmless.

use crate::constants::MAX_BATCH_OPS;
use crate::error::{AgoraError, Result};
use crate::graph::entity::{Comment, Post, UserId, Vote, VoteTarget, VoteTombstone, VoteType};
use crate::graph::id::{current_timestamp_millis, EntityId};
use crate::graph::op::{MutationBatch, Op};
use crate::graph::validation::validate_op;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::debug;

/// One last-writer-wins register: the current state of the vote a single
/// user holds on a single target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum VoteSlot {
    Active(Vote),
    Tombstone(VoteTombstone),
}

impl VoteSlot {
    fn id(&self) -> &EntityId {
        match self {
            VoteSlot::Active(vote) => &vote.id,
            VoteSlot::Tombstone(tombstone) => &tombstone.id,
        }
    }

    fn target(&self) -> &VoteTarget {
        match self {
            VoteSlot::Active(vote) => &vote.target,
            VoteSlot::Tombstone(tombstone) => &tombstone.target,
        }
    }

    fn updated_at(&self) -> u64 {
        match self {
            VoteSlot::Active(vote) => vote.cast_at,
            VoteSlot::Tombstone(tombstone) => tombstone.retracted_at,
        }
    }

    /// Equal-timestamp tiebreak rank. Total and replica-independent.
    fn rank(&self) -> u8 {
        match self {
            VoteSlot::Active(vote) => match vote.vote_type {
                VoteType::Up => 0,
                VoteType::Down => 1,
            },
            VoteSlot::Tombstone(_) => 2,
        }
    }

    fn active(&self) -> Option<&Vote> {
        match self {
            VoteSlot::Active(vote) => Some(vote),
            VoteSlot::Tombstone(_) => None,
        }
    }
}

/// An immutable view of the graph at one version.
///
/// Snapshots are shared behind `Arc`; a reader holding an old snapshot keeps
/// observing the old state while writers move the store forward.
#[derive(Clone, Debug, Default)]
pub struct GraphSnapshot {
    version: u64,
    posts: HashMap<EntityId, Post>,
    comments: HashMap<EntityId, Comment>,
    slots: HashMap<EntityId, VoteSlot>,
    /// `(created_at, id)` pairs, sorted ascending.
    post_order: Vec<(u64, EntityId)>,
    /// Post id → comment ids in arrival order; readers sort for display.
    post_comments: HashMap<EntityId, Vec<EntityId>>,
    /// Target id → vote slot ids.
    target_votes: HashMap<EntityId, Vec<EntityId>>,
}

impl GraphSnapshot {
    /// The store version this snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Looks up a post by id.
    pub fn post(&self, id: &EntityId) -> Option<&Post> {
        self.posts.get(id)
    }

    /// Looks up a comment by id.
    pub fn comment(&self, id: &EntityId) -> Option<&Comment> {
        self.comments.get(id)
    }

    /// Returns true if the target of a vote resolves in this snapshot.
    pub fn contains_target(&self, target: &VoteTarget) -> bool {
        match target {
            VoteTarget::Post(id) => self.posts.contains_key(id),
            VoteTarget::Comment(id) => self.comments.contains_key(id),
        }
    }

    /// Number of posts in the graph.
    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    /// Number of comments in the graph.
    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    /// Posts ordered by `(created_at, id)` ascending.
    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.post_order
            .iter()
            .filter_map(|(_, id)| self.posts.get(id))
    }

    /// The comments belonging to one post, cloned out of the snapshot in
    /// arrival order. Returns an empty vec for an unknown post.
    pub fn comments_for_post(&self, post_id: &EntityId) -> Vec<Comment> {
        self.post_comments
            .get(post_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.comments.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The active votes on one target. Tombstoned slots are invisible.
    pub fn votes_for_target(&self, target_id: &EntityId) -> Vec<&Vote> {
        self.target_votes
            .get(target_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.slots.get(id).and_then(VoteSlot::active))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The active vote `voter` holds on `target`, if any. O(1) via the
    /// derived vote identity.
    pub fn vote_by(&self, voter: &UserId, target: &VoteTarget) -> Option<&Vote> {
        self.slots
            .get(&Vote::derived_id(voter, target))
            .and_then(VoteSlot::active)
    }

    /// Net score of a target: count of up votes minus count of down votes.
    pub fn vote_score(&self, target_id: &EntityId) -> i64 {
        crate::ledger::vote_score(self.votes_for_target(target_id).into_iter())
    }

    /// Stages one validated operation into this (cloned, not yet published)
    /// snapshot.
    fn stage(&mut self, op: &Op) -> Result<()> {
        match op {
            Op::CreatePost(post) => self.stage_post(post),
            Op::CreateComment(comment) => self.stage_comment(comment),
            Op::PutVote(vote) => {
                self.merge_slot(VoteSlot::Active(vote.clone()));
                Ok(())
            }
            Op::RetractVote(tombstone) => {
                self.merge_slot(VoteSlot::Tombstone(tombstone.clone()));
                Ok(())
            }
        }
    }

    fn stage_post(&mut self, post: &Post) -> Result<()> {
        match self.posts.get(&post.id) {
            // Content addressing makes a replayed create byte-identical.
            Some(existing) if existing == post => Ok(()),
            Some(_) => Err(AgoraError::validation(format!(
                "Post id collision with different content: {}",
                post.id
            ))),
            None => {
                let key = (post.created_at, post.id);
                let pos = self.post_order.partition_point(|entry| *entry < key);
                self.post_order.insert(pos, key);
                self.posts.insert(post.id, post.clone());
                Ok(())
            }
        }
    }

    fn stage_comment(&mut self, comment: &Comment) -> Result<()> {
        match self.comments.get(&comment.id) {
            Some(existing) if existing == comment => Ok(()),
            Some(_) => Err(AgoraError::validation(format!(
                "Comment id collision with different content: {}",
                comment.id
            ))),
            None => {
                self.post_comments
                    .entry(comment.post_id)
                    .or_default()
                    .push(comment.id);
                self.comments.insert(comment.id, comment.clone());
                Ok(())
            }
        }
    }

    /// Last-writer-wins merge of a vote slot write.
    fn merge_slot(&mut self, incoming: VoteSlot) {
        let id = *incoming.id();
        if let Some(existing) = self.slots.get(&id) {
            let existing_key = (existing.updated_at(), existing.rank());
            let incoming_key = (incoming.updated_at(), incoming.rank());
            if incoming_key <= existing_key {
                // Stale or replayed write; the current state stands.
                return;
            }
        } else {
            self.target_votes
                .entry(*incoming.target().id())
                .or_default()
                .push(id);
        }
        self.slots.insert(id, incoming);
    }
}

/// The replica-local store: one writer at a time, lock-free readers via
/// copy-on-write snapshots, and a watch channel carrying the version
/// counter.
pub struct GraphStore {
    current: RwLock<Arc<GraphSnapshot>>,
    version_tx: watch::Sender<u64>,
}

impl GraphStore {
    /// Creates an empty store at version 0.
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            current: RwLock::new(Arc::new(GraphSnapshot::default())),
            version_tx,
        }
    }

    /// Returns the current snapshot. Cheap (`Arc` clone), never blocks on
    /// writers beyond the brief pointer swap.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        self.current
            .read()
            .expect("graph store lock poisoned")
            .clone()
    }

    /// The current store version. Starts at 0, bumps by one per applied
    /// batch.
    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Subscribes to version bumps.
    pub fn watch_version(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    /// Applies a mutation batch atomically.
    ///
    /// Every operation is validated and staged against a private clone of
    /// the current snapshot; the first failure aborts the whole batch with
    /// no visible effect. On success the new snapshot is published and the
    /// new version returned.
    ///
    /// # Errors
    /// - `Validation` if the batch is empty or oversized, or any op
    ///   violates an entity or link invariant
    /// - `NotFound` if any op references an id absent from the graph
    pub fn apply(&self, batch: &MutationBatch) -> Result<u64> {
        if batch.is_empty() {
            return Err(AgoraError::validation("Mutation batch is empty"));
        }
        if batch.len() > MAX_BATCH_OPS {
            return Err(AgoraError::validation(format!(
                "Mutation batch exceeds {} operations",
                MAX_BATCH_OPS
            )));
        }

        let mut guard = self.current.write().expect("graph store lock poisoned");
        let mut staged = GraphSnapshot::clone(&guard);
        let now_ms = current_timestamp_millis();

        for op in batch.ops() {
            validate_op(&staged, op, now_ms)?;
            staged.stage(op)?;
        }

        staged.version = guard.version() + 1;
        let version = staged.version;
        *guard = Arc::new(staged);
        drop(guard);

        self.version_tx.send_replace(version);
        debug!(version, ops = batch.len(), "applied mutation batch");
        Ok(version)
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
