//! Validation rules for mutation operations.
//!
//! Every operation is validated against the staged snapshot before it is
//! applied:
//! - Id integrity (content hash / derived hash recomputation)
//! - Content size and author checks (remote entities bypass the validating
//!   constructors, so limits are re-checked here)
//! - Link resolution (comment → post, vote → target)
//! - Same-post parent rule and ancestor-cycle rejection for comments
//! - Timestamp sanity checks
//!
//! Validation runs op by op as the batch stages, so an op may reference an
//! entity created earlier in the same batch. A failing op rejects the whole
//! batch.

use crate::constants::{
    MAX_AUTHOR_ID_SIZE, MAX_CLOCK_SKEW_MS, MAX_COMMENT_BODY_SIZE, MAX_POST_BODY_SIZE,
    MAX_TITLE_SIZE, MIN_VALID_TIMESTAMP_MS,
};
use crate::error::{AgoraError, Result};
use crate::graph::entity::{Comment, Post, UserId, Vote, VoteTarget, VoteTombstone};
use crate::graph::op::Op;
use crate::graph::store::GraphSnapshot;
use std::collections::HashSet;

/// Validates one operation against the staged snapshot.
pub(crate) fn validate_op(staged: &GraphSnapshot, op: &Op, now_ms: u64) -> Result<()> {
    match op {
        Op::CreatePost(post) => validate_post(post, now_ms),
        Op::CreateComment(comment) => validate_comment(staged, comment, now_ms),
        Op::PutVote(vote) => validate_vote(staged, vote, now_ms),
        Op::RetractVote(tombstone) => validate_tombstone(staged, tombstone, now_ms),
    }
}

fn validate_post(post: &Post, now_ms: u64) -> Result<()> {
    validate_author(&post.author)?;
    if post.title.trim().is_empty() {
        return Err(AgoraError::validation("Post title cannot be empty"));
    }
    if post.title.len() > MAX_TITLE_SIZE {
        return Err(AgoraError::validation(format!(
            "Post title exceeds maximum size of {} bytes",
            MAX_TITLE_SIZE
        )));
    }
    if post.body.is_empty() {
        return Err(AgoraError::validation("Post body cannot be empty"));
    }
    if post.body.len() > MAX_POST_BODY_SIZE {
        return Err(AgoraError::validation(format!(
            "Post body exceeds maximum size of {} bytes",
            MAX_POST_BODY_SIZE
        )));
    }
    validate_timestamp("Post", post.created_at, now_ms)?;

    if post.expected_id()? != post.id {
        return Err(AgoraError::validation(format!(
            "Post id does not match its content: {}",
            post.id
        )));
    }
    Ok(())
}

fn validate_comment(staged: &GraphSnapshot, comment: &Comment, now_ms: u64) -> Result<()> {
    validate_author(&comment.author)?;
    if comment.body.is_empty() {
        return Err(AgoraError::validation("Comment body cannot be empty"));
    }
    if comment.body.len() > MAX_COMMENT_BODY_SIZE {
        return Err(AgoraError::validation(format!(
            "Comment body exceeds maximum size of {} bytes",
            MAX_COMMENT_BODY_SIZE
        )));
    }
    validate_timestamp("Comment", comment.created_at, now_ms)?;

    if comment.expected_id()? != comment.id {
        return Err(AgoraError::validation(format!(
            "Comment id does not match its content: {}",
            comment.id
        )));
    }

    if staged.post(&comment.post_id).is_none() {
        return Err(AgoraError::not_found(format!(
            "Post {} referenced by comment {}",
            comment.post_id, comment.id
        )));
    }

    if let Some(parent_id) = &comment.parent_id {
        if *parent_id == comment.id {
            return Err(AgoraError::validation(format!(
                "Comment {} declares itself as its parent",
                comment.id
            )));
        }
        // A parent this replica has never seen is legal (it may live on
        // another replica); the tree reconstructor surfaces the comment as
        // an orphan root. A parent that does resolve must belong to the
        // same post and must not close a cycle.
        if let Some(parent) = staged.comment(parent_id) {
            if parent.post_id != comment.post_id {
                return Err(AgoraError::validation(format!(
                    "Comment {} has a parent belonging to a different post",
                    comment.id
                )));
            }
            ensure_acyclic(staged, comment)?;
        }
    }
    Ok(())
}

fn validate_vote(staged: &GraphSnapshot, vote: &Vote, now_ms: u64) -> Result<()> {
    validate_author(&vote.voter)?;
    validate_timestamp("Vote", vote.cast_at, now_ms)?;
    if Vote::derived_id(&vote.voter, &vote.target) != vote.id {
        return Err(AgoraError::validation(format!(
            "Vote id does not match its voter/target pair: {}",
            vote.id
        )));
    }
    validate_target(staged, &vote.target)
}

fn validate_tombstone(staged: &GraphSnapshot, tombstone: &VoteTombstone, now_ms: u64) -> Result<()> {
    validate_author(&tombstone.voter)?;
    validate_timestamp("Vote retraction", tombstone.retracted_at, now_ms)?;
    if Vote::derived_id(&tombstone.voter, &tombstone.target) != tombstone.id {
        return Err(AgoraError::validation(format!(
            "Vote retraction id does not match its voter/target pair: {}",
            tombstone.id
        )));
    }
    validate_target(staged, &tombstone.target)
}

fn validate_target(staged: &GraphSnapshot, target: &VoteTarget) -> Result<()> {
    if !staged.contains_target(target) {
        return Err(AgoraError::not_found(format!(
            "Vote target {} {}",
            target.kind(),
            target.id()
        )));
    }
    Ok(())
}

fn validate_author(author: &UserId) -> Result<()> {
    if author.as_str().trim().is_empty() {
        return Err(AgoraError::validation("Author identity cannot be blank"));
    }
    if author.as_str().len() > MAX_AUTHOR_ID_SIZE {
        return Err(AgoraError::validation(format!(
            "Author identity exceeds maximum size of {} bytes",
            MAX_AUTHOR_ID_SIZE
        )));
    }
    Ok(())
}

fn validate_timestamp(what: &str, timestamp_ms: u64, now_ms: u64) -> Result<()> {
    if timestamp_ms < MIN_VALID_TIMESTAMP_MS {
        return Err(AgoraError::validation(format!(
            "{} timestamp is unreasonably old or invalid",
            what
        )));
    }
    if timestamp_ms > now_ms + MAX_CLOCK_SKEW_MS {
        return Err(AgoraError::validation(format!(
            "{} timestamp is too far in the future",
            what
        )));
    }
    Ok(())
}

/// Walks the staged ancestor chain of `comment` and rejects any cycle.
///
/// The walk is iterative with a visited set, so an adversarial chain can
/// neither overflow the stack nor loop forever. The chain legitimately ends
/// at a root comment or at a parent this replica has not seen yet.
pub(crate) fn ensure_acyclic(staged: &GraphSnapshot, comment: &Comment) -> Result<()> {
    let mut visited = HashSet::new();
    visited.insert(comment.id);
    let mut cursor = comment.parent_id;

    while let Some(parent_id) = cursor {
        if !visited.insert(parent_id) {
            return Err(AgoraError::validation(format!(
                "Comment {} would close a parent cycle",
                comment.id
            )));
        }
        cursor = match staged.comment(&parent_id) {
            Some(parent) => parent.parent_id,
            None => None,
        };
    }
    Ok(())
}
