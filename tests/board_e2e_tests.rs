//! End-to-end tests for the discussion-graph engine.
//!
//! These tests drive complete workflows through a single replica (posting,
//! commenting, voting, live queries) and assert the derived values the
//! presentation layer would render.

use agora::{
    EntityId, FixedIdentity, QueryDescriptor, QueryState, Replica, VoteTarget, VoteTransition,
    VoteType,
};
use std::sync::Arc;

/// Helper to create a detached replica for a fixed user.
fn replica_for(user: &str) -> Replica {
    Replica::detached(Arc::new(FixedIdentity::new(user)))
}

// =============================================================================
// Vote Toggle Workflow
// =============================================================================

/// The full toggle sequence on one post by its own author:
/// score 0 / no vote → up (1) → toggle off (0) → down (-1).
#[test]
fn test_vote_toggle_sequence_on_post() {
    let replica = replica_for("a1");
    let user = replica.identity();

    // =========================================================================
    // Step 1: Create the post; no votes yet
    // =========================================================================
    let post_id = replica.create_post("T", "B").unwrap();
    let target = VoteTarget::Post(post_id);

    let snapshot = replica.snapshot();
    assert_eq!(snapshot.vote_score(&post_id), 0);
    assert!(snapshot.vote_by(&user, &target).is_none());

    // =========================================================================
    // Step 2: Up-vote
    // =========================================================================
    let transition = replica.cast_vote(target, VoteType::Up).unwrap();
    assert_eq!(transition, VoteTransition::Cast(VoteType::Up));

    let snapshot = replica.snapshot();
    assert_eq!(snapshot.vote_score(&post_id), 1);
    assert_eq!(
        snapshot.vote_by(&user, &target).map(|v| v.vote_type),
        Some(VoteType::Up)
    );

    // =========================================================================
    // Step 3: Up-vote again, which toggles off
    // =========================================================================
    let transition = replica.cast_vote(target, VoteType::Up).unwrap();
    assert_eq!(transition, VoteTransition::Retract(VoteType::Up));

    let snapshot = replica.snapshot();
    assert_eq!(snapshot.vote_score(&post_id), 0);
    assert!(snapshot.vote_by(&user, &target).is_none());

    // =========================================================================
    // Step 4: Down-vote
    // =========================================================================
    let transition = replica.cast_vote(target, VoteType::Down).unwrap();
    assert_eq!(transition, VoteTransition::Cast(VoteType::Down));

    let snapshot = replica.snapshot();
    assert_eq!(snapshot.vote_score(&post_id), -1);
    assert_eq!(
        snapshot.vote_by(&user, &target).map(|v| v.vote_type),
        Some(VoteType::Down)
    );
}

/// At most one vote entity ever exists per (user, target), whatever the
/// toggle sequence.
#[test]
fn test_single_vote_entity_through_arbitrary_sequences() {
    let replica = replica_for("a1");
    let post_id = replica.create_post("T", "B").unwrap();
    let target = VoteTarget::Post(post_id);

    let sequence = [
        VoteType::Up,
        VoteType::Down,
        VoteType::Down,
        VoteType::Up,
        VoteType::Up,
        VoteType::Down,
    ];
    for vote_type in sequence {
        replica.cast_vote(target, vote_type).unwrap();
        let snapshot = replica.snapshot();
        assert!(
            snapshot.votes_for_target(&post_id).len() <= 1,
            "never more than one active vote"
        );
    }

    // Net effect of the sequence above: up, switch down, retract, up,
    // retract, down.
    assert_eq!(replica.snapshot().vote_score(&post_id), -1);
}

// =============================================================================
// Comment Tree Workflow
// =============================================================================

/// C1 root, C2 under C1, C3 with a missing parent: the reconstructed tree
/// has roots {C1, C3} and C1's children = {C2}.
#[test]
fn test_orphan_comment_surfaces_as_root() {
    let replica = replica_for("a1");
    let post_id = replica.create_post("T", "B").unwrap();

    let c1 = replica.create_comment(post_id, None, "C1").unwrap();
    let c2 = replica.create_comment(post_id, Some(c1), "C2").unwrap();
    let missing = EntityId::derive("test", &[b"missing-id"]);
    let c3 = replica.create_comment(post_id, Some(missing), "C3").unwrap();

    let result = replica.query_once(&QueryDescriptor::post(post_id)).unwrap();
    let view = result.as_post().unwrap();

    assert_eq!(view.comment_count, 3);
    let root_ids: Vec<EntityId> = view.comments.iter().map(|n| n.comment.id).collect();
    assert_eq!(root_ids, vec![c1, c3]);
    assert!(!view.comments[0].is_orphan);
    assert!(view.comments[1].is_orphan);

    assert_eq!(view.comments[0].replies.len(), 1);
    assert_eq!(view.comments[0].replies[0].comment.id, c2);
    assert!(view.comments[1].replies.is_empty());
}

/// Multiple users replying at depth; sibling order is oldest first and
/// tallies attach to the right nodes.
#[test]
fn test_nested_discussion_with_comment_votes() {
    let replica = replica_for("op");
    let post_id = replica.create_post("Discussion", "Body").unwrap();

    let c1 = replica.create_comment(post_id, None, "first").unwrap();
    let c2 = replica.create_comment(post_id, None, "second").unwrap();
    let c1a = replica.create_comment(post_id, Some(c1), "reply to first").unwrap();
    let c1b = replica
        .create_comment(post_id, Some(c1), "another reply")
        .unwrap();

    replica
        .cast_vote(VoteTarget::Comment(c1), VoteType::Up)
        .unwrap();
    replica
        .cast_vote(VoteTarget::Comment(c1a), VoteType::Down)
        .unwrap();

    let result = replica.query_once(&QueryDescriptor::post(post_id)).unwrap();
    let view = result.as_post().unwrap();

    assert_eq!(view.comment_count, 4);
    assert_eq!(view.comments.len(), 2);
    assert_eq!(view.comments[0].comment.id, c1);
    assert_eq!(view.comments[1].comment.id, c2);

    let first = &view.comments[0];
    assert_eq!(first.score, 1);
    assert_eq!(first.viewer_vote, Some(VoteType::Up));
    assert_eq!(first.replies.len(), 2);
    assert_eq!(first.replies[0].comment.id, c1a);
    assert_eq!(first.replies[1].comment.id, c1b);
    assert_eq!(first.replies[0].score, -1);
}

// =============================================================================
// Live Query Workflow
// =============================================================================

/// A feed subscription follows every mutation without manual refresh, and
/// a dropped subscription stops being served.
#[test]
fn test_live_feed_subscription() {
    let replica = replica_for("a1");
    let mut feed = replica.subscribe(QueryDescriptor::posts());

    // Initial state: computed synchronously at subscribe time.
    let state = feed.latest();
    assert_eq!(state.data().unwrap().as_posts().unwrap().len(), 0);

    let post_id = replica.create_post("T", "B").unwrap();
    let state = feed.latest();
    let posts = state.data().unwrap().as_posts().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].post.title, "T");
    assert_eq!(posts[0].score, 0);

    replica
        .cast_vote(VoteTarget::Post(post_id), VoteType::Up)
        .unwrap();
    let state = feed.latest();
    assert_eq!(state.data().unwrap().as_posts().unwrap()[0].score, 1);

    drop(feed);
    replica.create_post("T2", "B2").unwrap();
    assert_eq!(replica.view().active_queries(), 0);
}

/// A by-id subscription for a post that does not exist reports an error
/// state, then recovers once the post arrives.
#[test]
fn test_by_id_subscription_error_then_data() {
    use agora::{MutationBatch, Op, Post};

    let replica = replica_for("a1");
    let post = Post::new("T", "B", replica.identity()).unwrap();

    let mut stream = replica.subscribe(QueryDescriptor::post(post.id));
    assert!(matches!(stream.latest(), QueryState::Error(_)));

    replica
        .transact(MutationBatch::single(Op::CreatePost(post.clone())))
        .unwrap();
    let state = stream.latest();
    let view = state.data().unwrap().as_post().unwrap();
    assert_eq!(view.post.title, "T");
    assert_eq!(view.score, 0);
}

/// Feed ordering: newest first, ties broken stably.
#[test]
fn test_feed_is_newest_first() {
    let replica = replica_for("a1");
    replica.create_post("first", "b").unwrap();
    replica.create_post("second", "b").unwrap();
    replica.create_post("third", "b").unwrap();

    let result = replica.query_once(&QueryDescriptor::posts()).unwrap();
    let titles: Vec<&str> = result
        .as_posts()
        .unwrap()
        .iter()
        .map(|v| v.post.title.as_str())
        .collect();
    assert_eq!(titles, vec!["third", "second", "first"]);
}

// =============================================================================
// Complete Board Workflow
// =============================================================================

/// Complete workflow on one replica: post, nested comments, votes, and the
/// derived view a renderer would consume.
#[test]
fn test_complete_board_workflow() {
    let alice = replica_for("alice");

    // =========================================================================
    // Step 1: Alice posts and starts the discussion
    // =========================================================================
    let post_id = alice.create_post("Welcome", "Say hi").unwrap();
    let c1 = alice.create_comment(post_id, None, "First comment").unwrap();
    alice.create_comment(post_id, Some(c1), "Replying to myself").unwrap();

    // =========================================================================
    // Step 2: Alice votes on her own post and comment
    // =========================================================================
    alice
        .cast_vote(VoteTarget::Post(post_id), VoteType::Up)
        .unwrap();
    alice
        .cast_vote(VoteTarget::Comment(c1), VoteType::Up)
        .unwrap();

    // =========================================================================
    // Step 3: Derived values are consistent from the replica's queries
    // =========================================================================
    let result = alice.query_once(&QueryDescriptor::post(post_id)).unwrap();
    let view = result.as_post().unwrap();
    assert_eq!(view.score, 1);
    assert_eq!(view.viewer_vote, Some(VoteType::Up));
    assert_eq!(view.comment_count, 2);
    assert_eq!(view.comments.len(), 1);
    assert_eq!(view.comments[0].score, 1);
    assert_eq!(view.comments[0].replies.len(), 1);

    // =========================================================================
    // Step 4: Store versioning moved once per transaction
    // =========================================================================
    // 1 post + 2 comments + 2 votes = 5 applied batches.
    assert_eq!(alice.store().version(), 5);
}
