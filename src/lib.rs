//! # agora - replicated discussion-graph engine
//!
//! A threaded discussion board core: posts, nested comments and up/down
//! votes, replicated across many concurrent anonymous clients and kept live
//! without manual refresh. This crate is the data engine only; rendering,
//! the wire transport and identity persistence are external collaborators
//! behind traits.
//!
//! ## Architecture
//!
//! ```text
//! caller action
//!     └── Replica::transact ── MutationBatch (atomic)
//!             └── GraphStore ── snapshot swap, version bump
//!                     └── ReactiveView ── recompute live queries
//!                             └── QueryStream subscribers
//!             └── SyncTransport ── committed envelope to other replicas
//! ```
//!
//! Remote envelopes enter through [`Replica::ingest_remote`] and take the
//! same store → view path.
//!
//! ## Convergence
//!
//! Replicas exchange whole mutation batches with no ordering guarantee
//! beyond eventual delivery. Convergence is by construction rather than by
//! coordination:
//! - posts and comments are content-addressed, so replayed or concurrently
//!   duplicated creates collapse into one entity;
//! - the vote a user holds on a target has a *derived* identity
//!   (hash of voter and target), so concurrent first votes from two devices
//!   race into the same slot instead of duplicating;
//! - vote slots merge last-writer-wins on a logical timestamp with a
//!   replica-independent tiebreak, and retractions leave tombstones so
//!   stale writes cannot resurrect them.
//!
//! ## Example
//!
//! ```rust
//! use agora::{Replica, DeviceIdentity, QueryDescriptor, VoteTarget, VoteType};
//! use std::sync::Arc;
//!
//! # fn main() -> agora::Result<()> {
//! let replica = Replica::detached(Arc::new(DeviceIdentity::generate()));
//!
//! let post_id = replica.create_post("Hello", "First post")?;
//! replica.create_comment(post_id, None, "Nice to be here")?;
//! replica.cast_vote(VoteTarget::Post(post_id), VoteType::Up)?;
//!
//! let result = replica.query_once(&QueryDescriptor::post(post_id))?;
//! let view = result.as_post().expect("by-id query returns one post");
//! assert_eq!(view.score, 1);
//! assert_eq!(view.comment_count, 1);
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod error;
pub mod graph;
pub mod identity;
pub mod ledger;
pub mod replica;
pub mod sync;
pub mod tree;
pub mod view;

pub use error::{AgoraError, Result};
pub use graph::{
    Comment, EntityId, EntityKind, GraphSnapshot, GraphStore, MutationBatch, Op, Post, UserId,
    Vote, VoteTarget, VoteTombstone, VoteType,
};
pub use identity::{DeviceIdentity, FixedIdentity, IdentitySource};
pub use ledger::{current_user_vote, plan_vote, vote_score, VoteTransition};
pub use replica::Replica;
pub use sync::{LocalHub, LogicalClock, MutationEnvelope, NullTransport, ReplicaId, SyncTransport};
pub use tree::{build_forest, CommentNode, SiblingOrder};
pub use view::{
    CommentView, PostOrder, PostView, QueryDescriptor, QueryResult, QueryState, QueryStream,
    ReactiveView,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
