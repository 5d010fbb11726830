//! The replicated discussion graph: entities, mutations, and the store.
//!
//! All content forms a relational graph of three entity kinds:
//!
//! ```text
//! Post
//!   └── Comment (optional parent Comment, forest per post)
//! Post | Comment
//!   └── Vote (one per user per target, up or down)
//! ```
//!
//! ## Rebuildability
//!
//! Every derived value (vote tallies, the viewer's own vote, comment trees,
//! ordered listings) is recomputed deterministically from the graph, never
//! stored. Given the same set of applied batches, every replica derives the
//! same values: posts and comments are content-addressed so replayed creates
//! collapse, and vote slots merge last-writer-wins under a replica-
//! independent ordering.

pub mod entity;
pub mod id;
pub mod op;
pub mod store;
pub mod validation;

pub use entity::{Comment, EntityKind, Post, UserId, Vote, VoteTarget, VoteTombstone, VoteType};
pub use id::{current_timestamp_millis, EntityId, ENTITY_ID_SIZE};
pub use op::{MutationBatch, Op};
pub use store::{GraphSnapshot, GraphStore};
