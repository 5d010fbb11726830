//! Live-updating read model over the entity graph.
//!
//! A [`QueryDescriptor`] names a read (the post feed, or one post by id),
//! and the computed result expands the linked graph around each post: vote
//! tallies, the viewing user's own vote, and the nested comment forest with
//! per-comment tallies. Results are pure functions of one snapshot; nothing
//! derived is ever stored.
//!
//! [`ReactiveView`] keeps the registry of active queries. After every
//! successful apply the owning replica calls [`ReactiveView::refresh`]
//! synchronously, so subscribers never observe a state older than the
//! version bump that triggered the recomputation. Each subscription is a
//! `watch` channel delivering [`QueryState`]; dropping the [`QueryStream`]
//! unsubscribes, and the registry prunes closed channels on the next
//! refresh.

use crate::error::{AgoraError, Result};
use crate::graph::entity::{Comment, Post, UserId, VoteType};
use crate::graph::id::EntityId;
use crate::graph::store::GraphSnapshot;
use crate::ledger;
use crate::tree::{self, SiblingOrder};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

/// Ordering of the post feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PostOrder {
    /// Creation timestamp descending (the feed default).
    #[default]
    NewestFirst,
    /// Creation timestamp ascending.
    OldestFirst,
}

/// A declarative description of one live query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryDescriptor {
    /// All posts in the given order, each with nested comments and votes.
    Posts { order: PostOrder },
    /// One post by id, with nested comments and votes.
    PostById { id: EntityId },
}

impl QueryDescriptor {
    /// The post feed, newest first.
    pub fn posts() -> Self {
        Self::Posts {
            order: PostOrder::default(),
        }
    }

    /// One post by exact id match.
    pub fn post(id: EntityId) -> Self {
        Self::PostById { id }
    }
}

/// A post expanded with its derived values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostView {
    pub post: Post,
    /// Up votes minus down votes.
    pub score: i64,
    /// The viewing user's own vote, if any.
    pub viewer_vote: Option<VoteType>,
    /// Total number of comments on the post, at any depth.
    pub comment_count: usize,
    /// The reply forest, oldest siblings first.
    pub comments: Vec<CommentView>,
}

/// A comment node expanded with its derived values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentView {
    pub comment: Comment,
    pub score: i64,
    pub viewer_vote: Option<VoteType>,
    /// True when the declared parent is absent and the comment was promoted
    /// to a root.
    pub is_orphan: bool,
    pub replies: Vec<CommentView>,
}

/// The data carried by a successful query computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryResult {
    Posts(Vec<PostView>),
    Post(Box<PostView>),
}

impl QueryResult {
    /// The post list, if this is a feed result.
    pub fn as_posts(&self) -> Option<&[PostView]> {
        match self {
            QueryResult::Posts(views) => Some(views),
            QueryResult::Post(_) => None,
        }
    }

    /// The single post, if this is a by-id result.
    pub fn as_post(&self) -> Option<&PostView> {
        match self {
            QueryResult::Post(view) => Some(view),
            QueryResult::Posts(_) => None,
        }
    }
}

/// The state of one subscription at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryState {
    /// No result computed yet.
    Loading,
    /// The underlying operation failed; human-readable message.
    Error(String),
    /// The computed result for the current store version.
    Data(QueryResult),
}

impl QueryState {
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }

    pub fn data(&self) -> Option<&QueryResult> {
        match self {
            QueryState::Data(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryState::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Computes a query result from one snapshot, for one viewing user.
pub fn compute_query(
    snapshot: &GraphSnapshot,
    descriptor: &QueryDescriptor,
    viewer: &UserId,
) -> Result<QueryResult> {
    match descriptor {
        QueryDescriptor::Posts { order } => {
            let mut views: Vec<PostView> = snapshot
                .posts()
                .map(|post| build_post_view(snapshot, post, viewer))
                .collect();
            if *order == PostOrder::NewestFirst {
                views.reverse();
            }
            Ok(QueryResult::Posts(views))
        }
        QueryDescriptor::PostById { id } => match snapshot.post(id) {
            Some(post) => Ok(QueryResult::Post(Box::new(build_post_view(
                snapshot, post, viewer,
            )))),
            None => Err(AgoraError::not_found(format!("Post {}", id))),
        },
    }
}

fn build_post_view(snapshot: &GraphSnapshot, post: &Post, viewer: &UserId) -> PostView {
    let votes = snapshot.votes_for_target(&post.id);
    let score = ledger::vote_score(votes.iter().copied());
    let viewer_vote =
        ledger::current_user_vote(votes.iter().copied(), viewer).map(|vote| vote.vote_type);

    let comments = snapshot.comments_for_post(&post.id);
    let comment_count = comments.len();
    let (roots, children) = tree::partition(comments, SiblingOrder::OldestFirst);
    let forest = tree::assemble(roots, children, &mut |comment, is_orphan, replies| {
        let votes = snapshot.votes_for_target(&comment.id);
        let score = ledger::vote_score(votes.iter().copied());
        let viewer_vote =
            ledger::current_user_vote(votes.iter().copied(), viewer).map(|vote| vote.vote_type);
        CommentView {
            comment,
            score,
            viewer_vote,
            is_orphan,
            replies,
        }
    });

    PostView {
        post: post.clone(),
        score,
        viewer_vote,
        comment_count,
        comments: forest,
    }
}

struct ActiveQuery {
    descriptor: QueryDescriptor,
    viewer: UserId,
    tx: watch::Sender<QueryState>,
}

/// A live subscription handle. Dropping it unsubscribes; no further states
/// are delivered and the registry forgets the query on its next refresh.
#[derive(Debug)]
pub struct QueryStream {
    rx: watch::Receiver<QueryState>,
}

impl QueryStream {
    /// The most recently delivered state.
    pub fn current(&self) -> QueryState {
        self.rx.borrow().clone()
    }

    /// The most recent state, marking it seen for [`Self::has_changed`].
    pub fn latest(&mut self) -> QueryState {
        self.rx.borrow_and_update().clone()
    }

    /// True if a state newer than the last seen one has been delivered.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Waits until a new state is delivered.
    ///
    /// # Errors
    /// Returns a sync error if the owning view has gone away.
    pub async fn changed(&mut self) -> Result<()> {
        self.rx
            .changed()
            .await
            .map_err(|_| AgoraError::sync("Query subscription closed"))
    }
}

/// The registry of active queries for one replica.
#[derive(Default)]
pub struct ReactiveView {
    queries: Mutex<Vec<ActiveQuery>>,
}

impl ReactiveView {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live query and returns its stream.
    ///
    /// The channel starts at [`QueryState::Loading`]; the first computed
    /// state is delivered synchronously before this returns.
    pub fn subscribe(
        &self,
        descriptor: QueryDescriptor,
        viewer: UserId,
        snapshot: &GraphSnapshot,
    ) -> QueryStream {
        let (tx, rx) = watch::channel(QueryState::Loading);
        tx.send_replace(state_for(snapshot, &descriptor, &viewer));
        self.queries
            .lock()
            .expect("reactive view lock poisoned")
            .push(ActiveQuery {
                descriptor,
                viewer,
                tx,
            });
        QueryStream { rx }
    }

    /// Recomputes every active query against `snapshot` and delivers the new
    /// states. Queries whose subscribers are gone are pruned first.
    pub fn refresh(&self, snapshot: &GraphSnapshot) {
        let mut queries = self.queries.lock().expect("reactive view lock poisoned");
        let before = queries.len();
        queries.retain(|query| !query.tx.is_closed());
        if queries.len() < before {
            debug!(pruned = before - queries.len(), "pruned closed query subscriptions");
        }
        for query in queries.iter() {
            query
                .tx
                .send_replace(state_for(snapshot, &query.descriptor, &query.viewer));
        }
    }

    /// Pushes an error state to every active query, e.g. after a transport
    /// failure. The next refresh recomputes data states.
    pub fn broadcast_error(&self, message: &str) {
        let queries = self.queries.lock().expect("reactive view lock poisoned");
        for query in queries.iter() {
            query.tx.send_replace(QueryState::Error(message.to_string()));
        }
    }

    /// Number of currently registered queries.
    pub fn active_queries(&self) -> usize {
        self.queries
            .lock()
            .expect("reactive view lock poisoned")
            .len()
    }
}

fn state_for(snapshot: &GraphSnapshot, descriptor: &QueryDescriptor, viewer: &UserId) -> QueryState {
    match compute_query(snapshot, descriptor, viewer) {
        Ok(result) => QueryState::Data(result),
        Err(err) => QueryState::Error(err.to_string()),
    }
}
