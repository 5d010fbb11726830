//! Domain entities of the discussion graph.
//!
//! Three entity kinds exist: [`Post`], [`Comment`] and [`Vote`]. Posts and
//! comments are append-only: created once, never edited or deleted. Votes
//! are last-writer-wins registers whose transitions are planned by the vote
//! ledger.
//!
//! A vote's target is a [`VoteTarget`] enum, so a vote refers to exactly one
//! post or exactly one comment; a dual or missing link is unrepresentable.

use crate::constants::{
    MAX_AUTHOR_ID_SIZE, MAX_COMMENT_BODY_SIZE, MAX_POST_BODY_SIZE, MAX_TITLE_SIZE,
};
use crate::error::{AgoraError, Result};
use crate::graph::id::{current_timestamp_millis, EntityId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable anonymous identity of a device, as issued by the identity source.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps an identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type discriminator for graph entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// A top-level post.
    Post,
    /// A comment on a post, optionally replying to another comment.
    Comment,
    /// An up/down vote on a post or comment.
    Vote,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Post => write!(f, "Post"),
            EntityKind::Comment => write!(f, "Comment"),
            EntityKind::Vote => write!(f, "Vote"),
        }
    }
}

/// Direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    /// Returns the opposite direction.
    pub fn flipped(self) -> Self {
        match self {
            VoteType::Up => VoteType::Down,
            VoteType::Down => VoteType::Up,
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteType::Up => write!(f, "up"),
            VoteType::Down => write!(f, "down"),
        }
    }
}

/// The post or comment a vote refers to. Exactly one, by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteTarget {
    Post(EntityId),
    Comment(EntityId),
}

impl VoteTarget {
    /// Returns the target entity id.
    pub fn id(&self) -> &EntityId {
        match self {
            VoteTarget::Post(id) | VoteTarget::Comment(id) => id,
        }
    }

    /// Returns the kind of the target entity.
    pub fn kind(&self) -> EntityKind {
        match self {
            VoteTarget::Post(_) => EntityKind::Post,
            VoteTarget::Comment(_) => EntityKind::Comment,
        }
    }

    fn kind_tag(&self) -> &'static [u8] {
        match self {
            VoteTarget::Post(_) => b"post",
            VoteTarget::Comment(_) => b"comment",
        }
    }
}

/// The creation content a post id is computed over.
#[derive(Serialize)]
struct PostSeed<'a> {
    kind: EntityKind,
    title: &'a str,
    body: &'a str,
    author: &'a str,
    created_at: u64,
}

/// A top-level post. Immutable after creation; never deleted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Content-derived identifier.
    pub id: EntityId,
    pub title: String,
    pub body: String,
    /// Anonymous identity of the author.
    pub author: UserId,
    /// Creation timestamp in milliseconds, used for ordering.
    pub created_at: u64,
}

impl fmt::Debug for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Post")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("body_len", &self.body.len())
            .field("author", &self.author)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl Post {
    /// Creates a new post stamped with the current wall-clock time.
    pub fn new(title: impl Into<String>, body: impl Into<String>, author: UserId) -> Result<Self> {
        Self::with_timestamp(title, body, author, current_timestamp_millis())
    }

    /// Creates a new post with an explicit creation timestamp.
    ///
    /// # Errors
    /// Returns a validation error if the title is empty or oversized, the
    /// body is empty or oversized, or the author identity is blank.
    pub fn with_timestamp(
        title: impl Into<String>,
        body: impl Into<String>,
        author: UserId,
        created_at: u64,
    ) -> Result<Self> {
        let title = title.into();
        let body = body.into();
        validate_author(&author)?;
        if title.trim().is_empty() {
            return Err(AgoraError::validation("Post title cannot be empty"));
        }
        if title.len() > MAX_TITLE_SIZE {
            return Err(AgoraError::validation(format!(
                "Post title exceeds maximum size of {} bytes",
                MAX_TITLE_SIZE
            )));
        }
        if body.is_empty() {
            return Err(AgoraError::validation("Post body cannot be empty"));
        }
        if body.len() > MAX_POST_BODY_SIZE {
            return Err(AgoraError::validation(format!(
                "Post body exceeds maximum size of {} bytes",
                MAX_POST_BODY_SIZE
            )));
        }

        let id = EntityId::compute(&PostSeed {
            kind: EntityKind::Post,
            title: &title,
            body: &body,
            author: author.as_str(),
            created_at,
        })?;

        Ok(Self {
            id,
            title,
            body,
            author,
            created_at,
        })
    }

    /// Recomputes the id this post's content should carry.
    pub(crate) fn expected_id(&self) -> Result<EntityId> {
        EntityId::compute(&PostSeed {
            kind: EntityKind::Post,
            title: &self.title,
            body: &self.body,
            author: self.author.as_str(),
            created_at: self.created_at,
        })
    }
}

/// The creation content a comment id is computed over.
#[derive(Serialize)]
struct CommentSeed<'a> {
    kind: EntityKind,
    post_id: &'a EntityId,
    parent_id: &'a Option<EntityId>,
    body: &'a str,
    author: &'a str,
    created_at: u64,
}

/// A comment on a post. Belongs to exactly one post; an absent `parent_id`
/// makes it a root comment.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Content-derived identifier.
    pub id: EntityId,
    /// The post this comment belongs to.
    pub post_id: EntityId,
    /// The comment this one replies to, if any. A parent that does not
    /// resolve on this replica is legal; the tree reconstructor surfaces
    /// such comments as roots.
    pub parent_id: Option<EntityId>,
    pub body: String,
    pub author: UserId,
    /// Creation timestamp in milliseconds, used for sibling ordering.
    pub created_at: u64,
}

impl fmt::Debug for Comment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comment")
            .field("id", &self.id)
            .field("post_id", &self.post_id)
            .field("has_parent", &self.parent_id.is_some())
            .field("body_len", &self.body.len())
            .field("author", &self.author)
            .finish()
    }
}

impl Comment {
    /// Creates a new comment stamped with the current wall-clock time.
    pub fn new(
        post_id: EntityId,
        parent_id: Option<EntityId>,
        body: impl Into<String>,
        author: UserId,
    ) -> Result<Self> {
        Self::with_timestamp(post_id, parent_id, body, author, current_timestamp_millis())
    }

    /// Creates a new comment with an explicit creation timestamp.
    ///
    /// # Errors
    /// Returns a validation error if the body is empty or oversized or the
    /// author identity is blank. Parent/post link integrity is checked at
    /// apply time, against the graph.
    pub fn with_timestamp(
        post_id: EntityId,
        parent_id: Option<EntityId>,
        body: impl Into<String>,
        author: UserId,
        created_at: u64,
    ) -> Result<Self> {
        let body = body.into();
        validate_author(&author)?;
        if body.is_empty() {
            return Err(AgoraError::validation("Comment body cannot be empty"));
        }
        if body.len() > MAX_COMMENT_BODY_SIZE {
            return Err(AgoraError::validation(format!(
                "Comment body exceeds maximum size of {} bytes",
                MAX_COMMENT_BODY_SIZE
            )));
        }

        let id = EntityId::compute(&CommentSeed {
            kind: EntityKind::Comment,
            post_id: &post_id,
            parent_id: &parent_id,
            body: &body,
            author: author.as_str(),
            created_at,
        })?;

        Ok(Self {
            id,
            post_id,
            parent_id,
            body,
            author,
            created_at,
        })
    }

    /// Recomputes the id this comment's content should carry.
    pub(crate) fn expected_id(&self) -> Result<EntityId> {
        EntityId::compute(&CommentSeed {
            kind: EntityKind::Comment,
            post_id: &self.post_id,
            parent_id: &self.parent_id,
            body: &self.body,
            author: self.author.as_str(),
            created_at: self.created_at,
        })
    }
}

/// An up/down vote by one user on one target.
///
/// The id is derived from `(voter, target)`, not from the vote's content:
/// the vote one user casts on one target has the same identity on every
/// replica, and direction switches keep that identity. `cast_at` is the
/// logical timestamp of the latest transition and drives last-writer-wins
/// merging.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Derived identifier, stable across direction switches.
    pub id: EntityId,
    pub target: VoteTarget,
    pub voter: UserId,
    pub vote_type: VoteType,
    /// Logical timestamp of the latest transition.
    pub cast_at: u64,
}

impl fmt::Debug for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vote")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("voter", &self.voter)
            .field("vote_type", &self.vote_type)
            .field("cast_at", &self.cast_at)
            .finish()
    }
}

impl Vote {
    /// Derives the replica-independent id of the vote `voter` holds on
    /// `target`. Covers the (voter, target id, target kind) triple.
    pub fn derived_id(voter: &UserId, target: &VoteTarget) -> EntityId {
        EntityId::derive(
            "agora.vote",
            &[
                voter.as_str().as_bytes(),
                target.kind_tag(),
                target.id().as_bytes(),
            ],
        )
    }

    /// Creates a new vote.
    ///
    /// # Errors
    /// Returns a validation error if the voter identity is blank.
    pub fn new(target: VoteTarget, voter: UserId, vote_type: VoteType, cast_at: u64) -> Result<Self> {
        validate_author(&voter)?;
        let id = Self::derived_id(&voter, &target);
        Ok(Self {
            id,
            target,
            voter,
            vote_type,
            cast_at,
        })
    }

    /// Returns this vote recast in a new direction. Identity and target
    /// link are unchanged; only the direction and timestamp move.
    pub fn recast(&self, vote_type: VoteType, cast_at: u64) -> Self {
        Self {
            vote_type,
            cast_at,
            ..self.clone()
        }
    }
}

/// Retraction record for a vote. Kept in the store so a stale remote write
/// cannot resurrect a vote the user has taken back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTombstone {
    /// The derived id of the retracted vote.
    pub id: EntityId,
    pub target: VoteTarget,
    pub voter: UserId,
    /// Logical timestamp of the retraction.
    pub retracted_at: u64,
}

impl VoteTombstone {
    /// Builds the tombstone retracting `vote`.
    pub fn for_vote(vote: &Vote, retracted_at: u64) -> Self {
        Self {
            id: vote.id,
            target: vote.target,
            voter: vote.voter.clone(),
            retracted_at,
        }
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn test_post_creation_and_id_integrity() {
        let post = Post::with_timestamp("Title", "Body", user("a1"), 1720000000000).unwrap();
        assert_eq!(post.expected_id().unwrap(), post.id);
        assert_eq!(post.title, "Title");
    }

    #[test]
    fn test_post_id_depends_on_content() {
        let a = Post::with_timestamp("T", "B", user("a1"), 1720000000000).unwrap();
        let b = Post::with_timestamp("T", "B2", user("a1"), 1720000000000).unwrap();
        let c = Post::with_timestamp("T", "B", user("a1"), 1720000000001).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_post_validation() {
        assert!(Post::new("", "body", user("a1")).is_err());
        assert!(Post::new("title", "", user("a1")).is_err());
        assert!(Post::new("title", "body", user("  ")).is_err());
        assert!(Post::new("t".repeat(MAX_TITLE_SIZE + 1), "body", user("a1")).is_err());
    }

    #[test]
    fn test_comment_creation() {
        let post = Post::new("T", "B", user("a1")).unwrap();
        let root = Comment::new(post.id, None, "first", user("a2")).unwrap();
        let reply = Comment::new(post.id, Some(root.id), "second", user("a1")).unwrap();
        assert_eq!(root.parent_id, None);
        assert_eq!(reply.parent_id, Some(root.id));
        assert_eq!(reply.expected_id().unwrap(), reply.id);
    }

    #[test]
    fn test_comment_validation() {
        let post_id = EntityId::derive("test", &[b"p"]);
        assert!(Comment::new(post_id, None, "", user("a1")).is_err());
        assert!(Comment::new(post_id, None, "x".repeat(MAX_COMMENT_BODY_SIZE + 1), user("a1"))
            .is_err());
    }

    #[test]
    fn test_vote_identity_is_derived() {
        let target = VoteTarget::Post(EntityId::derive("test", &[b"p1"]));
        let up = Vote::new(target, user("u1"), VoteType::Up, 1000).unwrap();
        let down = Vote::new(target, user("u1"), VoteType::Down, 2000).unwrap();
        assert_eq!(up.id, down.id, "Same voter/target must share identity");

        let other_user = Vote::new(target, user("u2"), VoteType::Up, 1000).unwrap();
        assert_ne!(up.id, other_user.id);

        let comment_target = VoteTarget::Comment(*target.id());
        let comment_vote = Vote::new(comment_target, user("u1"), VoteType::Up, 1000).unwrap();
        assert_ne!(up.id, comment_vote.id, "Target kind is part of the identity");
    }

    #[test]
    fn test_vote_recast_keeps_identity() {
        let target = VoteTarget::Post(EntityId::derive("test", &[b"p1"]));
        let vote = Vote::new(target, user("u1"), VoteType::Up, 1000).unwrap();
        let switched = vote.recast(VoteType::Down, 2000);
        assert_eq!(vote.id, switched.id);
        assert_eq!(vote.target, switched.target);
        assert_eq!(switched.vote_type, VoteType::Down);
        assert_eq!(switched.cast_at, 2000);
    }

    #[test]
    fn test_vote_type_flipped() {
        assert_eq!(VoteType::Up.flipped(), VoteType::Down);
        assert_eq!(VoteType::Down.flipped(), VoteType::Up);
    }
}
