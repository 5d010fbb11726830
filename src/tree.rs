//! Comment tree reconstruction.
//!
//! Turns the flat set of comments belonging to one post into an ordered
//! forest of replies. The reconstruction is total: every comment appears
//! exactly once. A comment whose declared parent is absent from the set is
//! surfaced as a root (never silently dropped), flagged as an orphan so the
//! presentation layer can tell it apart from a true root.
//!
//! Assembly uses an explicit frame stack instead of recursion, so reply
//! chains of arbitrary depth reconstruct without exhausting the call stack.
//! The same applies to cyclic parent assignments: apply-time validation
//! rejects them, but if one ever reached this module its comments would be
//! flattened into orphan roots rather than looping or disappearing.

use crate::graph::entity::Comment;
use crate::graph::id::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Ordering of comments within one sibling group.
///
/// Both orderings tiebreak on id, so sibling order is stable and identical
/// on every replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SiblingOrder {
    /// Creation timestamp ascending.
    #[default]
    OldestFirst,
    /// Creation timestamp descending.
    NewestFirst,
}

/// One node of the reconstructed forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    pub comment: Comment,
    /// True when the declared parent was absent and the comment was
    /// promoted to a root.
    pub is_orphan: bool,
    pub replies: Vec<CommentNode>,
}

/// Reconstructs the reply forest for one post's comments.
pub fn build_forest(comments: Vec<Comment>, order: SiblingOrder) -> Vec<CommentNode> {
    let (roots, children) = partition(comments, order);
    assemble(roots, children, &mut |comment, is_orphan, replies| {
        CommentNode {
            comment,
            is_orphan,
            replies,
        }
    })
}

/// Splits comments into ordered roots and ordered sibling groups keyed by
/// parent id. Roots carry an orphan flag: true when a parent was declared
/// but is not present in the set.
pub(crate) fn partition(
    comments: Vec<Comment>,
    order: SiblingOrder,
) -> (Vec<(Comment, bool)>, HashMap<EntityId, Vec<Comment>>) {
    let present: HashSet<EntityId> = comments.iter().map(|c| c.id).collect();
    let mut roots: Vec<(Comment, bool)> = Vec::new();
    let mut children: HashMap<EntityId, Vec<Comment>> = HashMap::new();

    for comment in comments {
        match comment.parent_id {
            Some(parent_id) if parent_id != comment.id && present.contains(&parent_id) => {
                children.entry(parent_id).or_default().push(comment);
            }
            Some(_) => roots.push((comment, true)),
            None => roots.push((comment, false)),
        }
    }

    sort_siblings_flagged(&mut roots, order);
    for group in children.values_mut() {
        sort_siblings(group, order);
    }
    (roots, children)
}

fn sort_siblings(group: &mut [Comment], order: SiblingOrder) {
    match order {
        SiblingOrder::OldestFirst => group.sort_by_key(|c| (c.created_at, c.id)),
        SiblingOrder::NewestFirst => {
            group.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)))
        }
    }
}

fn sort_siblings_flagged(group: &mut [(Comment, bool)], order: SiblingOrder) {
    match order {
        SiblingOrder::OldestFirst => group.sort_by_key(|(c, _)| (c.created_at, c.id)),
        SiblingOrder::NewestFirst => group.sort_by(|(a, _), (b, _)| {
            (b.created_at, b.id).cmp(&(a.created_at, a.id))
        }),
    }
}

/// Assembles the forest bottom-up with an explicit frame stack.
///
/// Generic over the node type so the reactive view can build decorated
/// nodes (scores, viewer vote) from the same single algorithm. Each comment
/// is consumed exactly once; sibling groups left unconsumed after all roots
/// are assembled (detached by a parent cycle) are flattened into orphan
/// leaf roots.
pub(crate) fn assemble<N, F>(
    roots: Vec<(Comment, bool)>,
    mut children: HashMap<EntityId, Vec<Comment>>,
    make: &mut F,
) -> Vec<N>
where
    F: FnMut(Comment, bool, Vec<N>) -> N,
{
    struct Frame<N> {
        comment: Comment,
        is_orphan: bool,
        pending: std::vec::IntoIter<Comment>,
        built: Vec<N>,
    }

    let mut out: Vec<N> = Vec::with_capacity(roots.len());

    for (root, is_orphan) in roots {
        let kids = children.remove(&root.id).unwrap_or_default();
        let mut stack = vec![Frame {
            comment: root,
            is_orphan,
            pending: kids.into_iter(),
            built: Vec::new(),
        }];

        while let Some(frame) = stack.last_mut() {
            if let Some(child) = frame.pending.next() {
                let kids = children.remove(&child.id).unwrap_or_default();
                stack.push(Frame {
                    comment: child,
                    is_orphan: false,
                    pending: kids.into_iter(),
                    built: Vec::new(),
                });
            } else if let Some(done) = stack.pop() {
                let node = make(done.comment, done.is_orphan, done.built);
                match stack.last_mut() {
                    Some(parent) => parent.built.push(node),
                    None => out.push(node),
                }
            }
        }
    }

    if !children.is_empty() {
        let mut leftover: Vec<Comment> = children.into_values().flatten().collect();
        warn!(
            count = leftover.len(),
            "comments unreachable from any root; surfacing as orphan roots"
        );
        leftover.sort_by_key(|c| (c.created_at, c.id));
        for comment in leftover {
            out.push(make(comment, true, Vec::new()));
        }
    }

    out
}
