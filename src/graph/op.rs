//! Mutation operations and batches.
//!
//! A [`MutationBatch`] is the unit of atomicity: the store applies all of a
//! batch's operations or none of them, and the transport propagates whole
//! batches between replicas. Composite creations (a comment together with
//! its post, say) belong in one batch so no reader ever observes half of
//! them.

use crate::graph::entity::{Comment, Post, Vote, VoteTombstone};
use crate::graph::id::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single operation against the entity graph.
///
/// Posts and comments only ever appear in `Create` form. Votes are the one
/// entity with update/delete transitions: `PutVote` writes a vote slot
/// (create or direction switch) and `RetractVote` tombstones it, both merged
/// last-writer-wins at apply time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    CreatePost(Post),
    CreateComment(Comment),
    PutVote(Vote),
    RetractVote(VoteTombstone),
}

impl Op {
    /// Returns the id of the entity this operation touches.
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Op::CreatePost(post) => &post.id,
            Op::CreateComment(comment) => &comment.id,
            Op::PutVote(vote) => &vote.id,
            Op::RetractVote(tombstone) => &tombstone.id,
        }
    }

    /// Returns the timestamp carried by this operation.
    pub fn timestamp(&self) -> u64 {
        match self {
            Op::CreatePost(post) => post.created_at,
            Op::CreateComment(comment) => comment.created_at,
            Op::PutVote(vote) => vote.cast_at,
            Op::RetractVote(tombstone) => tombstone.retracted_at,
        }
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::CreatePost(post) => write!(f, "CreatePost({})", post.id),
            Op::CreateComment(comment) => write!(f, "CreateComment({})", comment.id),
            Op::PutVote(vote) => write!(f, "PutVote({}, {})", vote.id, vote.vote_type),
            Op::RetractVote(tombstone) => write!(f, "RetractVote({})", tombstone.id),
        }
    }
}

/// An ordered list of operations applied as one atomic unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationBatch {
    pub ops: Vec<Op>,
}

impl MutationBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a batch holding a single operation.
    pub fn single(op: Op) -> Self {
        Self { ops: vec![op] }
    }

    /// Appends an operation to the batch.
    pub fn push(&mut self, op: Op) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Returns the number of operations in the batch.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterates over the operations in order.
    pub fn ops(&self) -> impl Iterator<Item = &Op> {
        self.ops.iter()
    }

    /// Returns the largest timestamp carried by any operation, used to
    /// advance the logical clock when a remote batch arrives.
    pub fn max_timestamp(&self) -> u64 {
        self.ops.iter().map(Op::timestamp).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::entity::{Post, UserId, Vote, VoteTarget, VoteType};

    #[test]
    fn test_batch_building() {
        let post = Post::with_timestamp("T", "B", UserId::new("a1"), 1720000000000).unwrap();
        let vote = Vote::new(
            VoteTarget::Post(post.id),
            UserId::new("a1"),
            VoteType::Up,
            1720000000001,
        )
        .unwrap();

        let mut batch = MutationBatch::new();
        assert!(batch.is_empty());
        batch.push(Op::CreatePost(post)).push(Op::PutVote(vote));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.max_timestamp(), 1720000000001);
    }

    #[test]
    fn test_batch_serde_roundtrip() {
        let post = Post::with_timestamp("T", "B", UserId::new("a1"), 1720000000000).unwrap();
        let batch = MutationBatch::single(Op::CreatePost(post));
        let json = serde_json::to_string(&batch).unwrap();
        let back: MutationBatch = serde_json::from_str(&json).unwrap();
        assert_eq!(batch, back);
    }
}
