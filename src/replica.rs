//! One client's replica: store, ledger, view and transport wired together.
//!
//! The replica is the mutation transactor of the system. A caller action
//! becomes a [`MutationBatch`] that is applied atomically and optimistically
//! to the local [`GraphStore`], the reactive view recomputes synchronously,
//! and only then is the committed envelope handed to the sync transport.
//! Remote envelopes re-enter through [`Replica::ingest_remote`] and take the
//! same path.
//!
//! Envelopes may arrive in any order. One that references ids this replica
//! has not seen yet is parked in a bounded queue and retried after every
//! later successful ingest; since creates are idempotent and vote slots
//! merge last-writer-wins, replaying an envelope is harmless.

use crate::constants::MAX_PENDING_ENVELOPES;
use crate::error::{AgoraError, Result};
use crate::graph::entity::{Comment, Post, UserId, Vote, VoteTarget, VoteType};
use crate::graph::id::EntityId;
use crate::graph::op::{MutationBatch, Op};
use crate::graph::store::{GraphSnapshot, GraphStore};
use crate::identity::IdentitySource;
use crate::ledger::{self, VoteTransition};
use crate::sync::{LogicalClock, MutationEnvelope, NullTransport, ReplicaId, SyncTransport};
use crate::view::{QueryDescriptor, QueryResult, QueryStream, ReactiveView};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// One client's local replica of the discussion graph.
pub struct Replica {
    id: ReplicaId,
    identity: Arc<dyn IdentitySource>,
    store: GraphStore,
    view: ReactiveView,
    transport: Arc<dyn SyncTransport>,
    clock: LogicalClock,
    seq: AtomicU64,
    pending: Mutex<Vec<MutationEnvelope>>,
}

impl Replica {
    /// Creates a replica with a generated id.
    pub fn new(identity: Arc<dyn IdentitySource>, transport: Arc<dyn SyncTransport>) -> Self {
        Self::with_id(ReplicaId::generate(), identity, transport)
    }

    /// Creates a replica with an explicit id, for tests and simulations.
    pub fn with_id(
        id: ReplicaId,
        identity: Arc<dyn IdentitySource>,
        transport: Arc<dyn SyncTransport>,
    ) -> Self {
        Self {
            id,
            identity,
            store: GraphStore::new(),
            view: ReactiveView::new(),
            transport,
            clock: LogicalClock::new(),
            seq: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Creates a replica without a transport (envelopes are discarded).
    pub fn detached(identity: Arc<dyn IdentitySource>) -> Self {
        Self::new(identity, Arc::new(NullTransport))
    }

    pub fn id(&self) -> &ReplicaId {
        &self.id
    }

    /// The stable identity of this device.
    pub fn identity(&self) -> UserId {
        self.identity.current_identity()
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn view(&self) -> &ReactiveView {
        &self.view
    }

    /// The current graph snapshot.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        self.store.snapshot()
    }

    /// Creates a post authored by this device and returns its id.
    pub fn create_post(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<EntityId> {
        let post = Post::with_timestamp(title, body, self.identity(), self.clock.tick())?;
        let id = post.id;
        self.transact(MutationBatch::single(Op::CreatePost(post)))?;
        Ok(id)
    }

    /// Creates a comment authored by this device and returns its id.
    ///
    /// `parent_id` may name a comment this replica has not seen; the comment
    /// is then surfaced as an orphan root until (unless) the parent arrives.
    pub fn create_comment(
        &self,
        post_id: EntityId,
        parent_id: Option<EntityId>,
        body: impl Into<String>,
    ) -> Result<EntityId> {
        let comment =
            Comment::with_timestamp(post_id, parent_id, body, self.identity(), self.clock.tick())?;
        let id = comment.id;
        self.transact(MutationBatch::single(Op::CreateComment(comment)))?;
        Ok(id)
    }

    /// Casts a vote by this device on `target`, conditioned on the vote
    /// currently observed in this replica's snapshot.
    pub fn cast_vote(&self, target: VoteTarget, vote_type: VoteType) -> Result<VoteTransition> {
        let observed = self.snapshot().vote_by(&self.identity(), &target).cloned();
        self.cast_vote_observed(target, vote_type, observed)
    }

    /// Casts a vote conditioned on an explicitly observed prior vote.
    ///
    /// This is the replay-safe primitive: a caller re-submitting a cached
    /// command passes the vote it observed at planning time, and the
    /// resulting operation merges idempotently instead of double-toggling.
    pub fn cast_vote_observed(
        &self,
        target: VoteTarget,
        vote_type: VoteType,
        observed: Option<Vote>,
    ) -> Result<VoteTransition> {
        let voter = self.identity();
        let (op, transition) = ledger::plan_vote(
            observed.as_ref(),
            &target,
            &voter,
            vote_type,
            self.clock.tick(),
        )?;
        self.transact(MutationBatch::single(op))?;
        Ok(transition)
    }

    /// Applies a batch atomically to the local store, refreshes the view,
    /// and forwards the committed envelope to the transport.
    ///
    /// # Errors
    /// - `Validation` / `NotFound`: the batch was rejected; nothing changed.
    /// - `Sync`: the local commit stands, but the transport refused the
    ///   envelope; the error is also broadcast to active subscriptions.
    pub fn transact(&self, batch: MutationBatch) -> Result<u64> {
        let version = self.store.apply(&batch)?;
        self.view.refresh(&self.store.snapshot());

        let envelope =
            MutationEnvelope::new(self.id.clone(), self.seq.fetch_add(1, Ordering::SeqCst), batch);
        if let Err(err) = self.transport.publish(envelope) {
            warn!(error = %err, "transport refused committed envelope");
            self.view.broadcast_error(&err.to_string());
            return Err(err);
        }
        Ok(version)
    }

    /// Ingests an envelope delivered by the sync transport.
    ///
    /// An envelope whose references do not resolve yet is parked and retried
    /// after later ingests. Any other failure rejects the envelope.
    pub fn ingest_remote(&self, envelope: MutationEnvelope) -> Result<()> {
        self.clock.observe(envelope.max_timestamp());

        match self.store.apply(&envelope.batch) {
            Ok(_) => {
                self.drain_parked();
                self.view.refresh(&self.store.snapshot());
                Ok(())
            }
            Err(AgoraError::NotFound(reason)) => self.park(envelope, &reason),
            Err(err) => Err(err),
        }
    }

    /// Number of envelopes currently parked.
    pub fn parked_envelopes(&self) -> usize {
        self.pending
            .lock()
            .expect("pending queue lock poisoned")
            .len()
    }

    /// One-shot computation of a query against the current snapshot.
    pub fn query_once(&self, descriptor: &QueryDescriptor) -> Result<QueryResult> {
        crate::view::compute_query(&self.store.snapshot(), descriptor, &self.identity())
    }

    /// Registers a live query for this device and returns its stream.
    pub fn subscribe(&self, descriptor: QueryDescriptor) -> QueryStream {
        self.view
            .subscribe(descriptor, self.identity(), &self.store.snapshot())
    }

    fn park(&self, envelope: MutationEnvelope, reason: &str) -> Result<()> {
        let mut pending = self.pending.lock().expect("pending queue lock poisoned");
        if pending.len() >= MAX_PENDING_ENVELOPES {
            return Err(AgoraError::sync(format!(
                "Pending envelope queue is full ({} envelopes)",
                pending.len()
            )));
        }
        debug!(origin = %envelope.origin, seq = envelope.seq, reason, "parked envelope");
        pending.push(envelope);
        Ok(())
    }

    /// Retries parked envelopes until none of them makes progress.
    fn drain_parked(&self) {
        loop {
            let parked = {
                let mut pending = self.pending.lock().expect("pending queue lock poisoned");
                std::mem::take(&mut *pending)
            };
            if parked.is_empty() {
                return;
            }

            let mut progressed = false;
            let mut still_parked = Vec::new();
            for envelope in parked {
                match self.store.apply(&envelope.batch) {
                    Ok(_) => progressed = true,
                    Err(AgoraError::NotFound(_)) => still_parked.push(envelope),
                    Err(err) => {
                        warn!(
                            origin = %envelope.origin,
                            seq = envelope.seq,
                            error = %err,
                            "dropping parked envelope that failed validation"
                        );
                    }
                }
            }

            let exhausted = still_parked.is_empty();
            self.pending
                .lock()
                .expect("pending queue lock poisoned")
                .extend(still_parked);
            if !progressed || exhausted {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::FixedIdentity;
    use crate::view::QueryState;

    fn replica(user: &str) -> Replica {
        Replica::detached(Arc::new(FixedIdentity::new(user)))
    }

    #[test]
    fn test_create_post_and_comment() {
        let replica = replica("a1");
        let post_id = replica.create_post("Title", "Body").unwrap();
        let comment_id = replica.create_comment(post_id, None, "First!").unwrap();
        let reply_id = replica
            .create_comment(post_id, Some(comment_id), "Reply")
            .unwrap();

        let snapshot = replica.snapshot();
        assert_eq!(snapshot.post_count(), 1);
        assert_eq!(snapshot.comment_count(), 2);
        assert_eq!(
            snapshot.comment(&reply_id).unwrap().parent_id,
            Some(comment_id)
        );
    }

    #[test]
    fn test_cast_vote_transitions() {
        let replica = replica("a1");
        let post_id = replica.create_post("T", "B").unwrap();
        let target = VoteTarget::Post(post_id);

        let t = replica.cast_vote(target, VoteType::Up).unwrap();
        assert_eq!(t, VoteTransition::Cast(VoteType::Up));
        assert_eq!(replica.snapshot().vote_score(&post_id), 1);

        let t = replica.cast_vote(target, VoteType::Down).unwrap();
        assert_eq!(
            t,
            VoteTransition::Switch {
                from: VoteType::Up,
                to: VoteType::Down
            }
        );
        assert_eq!(replica.snapshot().vote_score(&post_id), -1);

        let t = replica.cast_vote(target, VoteType::Down).unwrap();
        assert_eq!(t, VoteTransition::Retract(VoteType::Down));
        assert_eq!(replica.snapshot().vote_score(&post_id), 0);
    }

    #[test]
    fn test_replayed_observed_command_is_idempotent() {
        let replica = replica("a1");
        let post_id = replica.create_post("T", "B").unwrap();
        let target = VoteTarget::Post(post_id);

        // First cast, observed state: no vote.
        replica
            .cast_vote_observed(target, VoteType::Up, None)
            .unwrap();
        assert_eq!(replica.snapshot().vote_score(&post_id), 1);

        // The cached command replays with the same observed state: the
        // planned op merges to the same slot instead of toggling off.
        replica
            .cast_vote_observed(target, VoteType::Up, None)
            .unwrap();
        assert_eq!(replica.snapshot().vote_score(&post_id), 1);
        assert_eq!(
            replica
                .snapshot()
                .vote_by(&replica.identity(), &target)
                .map(|v| v.vote_type),
            Some(VoteType::Up)
        );
    }

    #[test]
    fn test_subscription_follows_transactions() {
        let replica = replica("a1");
        let mut stream = replica.subscribe(QueryDescriptor::posts());
        assert_eq!(
            stream
                .latest()
                .data()
                .unwrap()
                .as_posts()
                .unwrap()
                .len(),
            0
        );

        replica.create_post("T", "B").unwrap();
        let state = stream.latest();
        assert_eq!(state.data().unwrap().as_posts().unwrap().len(), 1);
    }

    #[test]
    fn test_failing_transport_reports_sync_error() {
        struct RefusingTransport;
        impl SyncTransport for RefusingTransport {
            fn publish(&self, _envelope: MutationEnvelope) -> Result<()> {
                Err(AgoraError::sync("relay unreachable"))
            }
        }

        let replica = Replica::new(
            Arc::new(FixedIdentity::new("a1")),
            Arc::new(RefusingTransport),
        );
        let stream = replica.subscribe(QueryDescriptor::posts());

        let err = replica.create_post("T", "B").unwrap_err();
        assert!(matches!(err, AgoraError::Sync(_)));
        // Local commit stands; error is surfaced to subscribers.
        assert_eq!(replica.snapshot().post_count(), 1);
        assert!(matches!(stream.current(), QueryState::Error(_)));
    }
}
