//! The vote ledger: toggle state machine and tally derivations.
//!
//! Per (user, target) pair the ledger is a three-state machine over
//! no-vote, upvoted and downvoted, with the transitions:
//!
//! ```text
//! no-vote   --up-->   upvoted     upvoted   --up-->   no-vote
//! no-vote   --down--> downvoted   downvoted --down--> no-vote
//! upvoted   --down--> downvoted   downvoted --up-->   upvoted
//! ```
//!
//! [`plan_vote`] turns an intended cast into the store operation realizing
//! the transition. The plan is conditioned on the vote the caller *observed*,
//! not on whatever the store holds at apply time: replaying an identical
//! planned operation merges to the same slot state instead of double-
//! toggling, which is what makes cached command replay safe.

use crate::error::{AgoraError, Result};
use crate::graph::entity::{UserId, Vote, VoteTarget, VoteTombstone, VoteType};
use crate::graph::op::Op;

/// The transition a planned cast performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTransition {
    /// no-vote → voted
    Cast(VoteType),
    /// voted → voted in the opposite direction, same identity
    Switch { from: VoteType, to: VoteType },
    /// voted → no-vote (same direction cast again)
    Retract(VoteType),
}

/// Plans the store operation for one cast, conditioned on the observed
/// prior vote.
///
/// - No observed vote: create a vote in the requested direction.
/// - Observed vote in the same direction: retract it (toggle off).
/// - Observed vote in the opposite direction: switch it in place, keeping
///   identity and target link.
///
/// # Errors
/// Returns a validation error if the observed vote does not belong to the
/// given (voter, target) pair, or the voter identity is blank.
pub fn plan_vote(
    observed: Option<&Vote>,
    target: &VoteTarget,
    voter: &UserId,
    vote_type: VoteType,
    at: u64,
) -> Result<(Op, VoteTransition)> {
    match observed {
        None => {
            let vote = Vote::new(*target, voter.clone(), vote_type, at)?;
            Ok((Op::PutVote(vote), VoteTransition::Cast(vote_type)))
        }
        Some(prev) => {
            if prev.id != Vote::derived_id(voter, target) {
                return Err(AgoraError::validation(
                    "Observed vote does not belong to this voter/target pair",
                ));
            }
            if prev.vote_type == vote_type {
                let tombstone = VoteTombstone::for_vote(prev, at);
                Ok((Op::RetractVote(tombstone), VoteTransition::Retract(vote_type)))
            } else {
                let switched = prev.recast(vote_type, at);
                Ok((
                    Op::PutVote(switched),
                    VoteTransition::Switch {
                        from: prev.vote_type,
                        to: vote_type,
                    },
                ))
            }
        }
    }
}

/// Net score of a set of votes: count of up votes minus count of down votes.
pub fn vote_score<'a, I>(votes: I) -> i64
where
    I: IntoIterator<Item = &'a Vote>,
{
    votes
        .into_iter()
        .map(|vote| match vote.vote_type {
            VoteType::Up => 1,
            VoteType::Down => -1,
        })
        .sum()
}

/// The vote authored by `user` among `votes`, if any. At most one exists by
/// the derived-identity invariant.
pub fn current_user_vote<'a, I>(votes: I, user: &UserId) -> Option<&'a Vote>
where
    I: IntoIterator<Item = &'a Vote>,
{
    votes.into_iter().find(|vote| &vote.voter == user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::id::EntityId;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn target() -> VoteTarget {
        VoteTarget::Post(EntityId::derive("test", &[b"p1"]))
    }

    #[test]
    fn test_cast_from_no_vote() {
        let (op, transition) =
            plan_vote(None, &target(), &user("u1"), VoteType::Up, 1000).unwrap();
        assert_eq!(transition, VoteTransition::Cast(VoteType::Up));
        match op {
            Op::PutVote(vote) => {
                assert_eq!(vote.vote_type, VoteType::Up);
                assert_eq!(vote.cast_at, 1000);
            }
            other => panic!("expected PutVote, got {:?}", other),
        }
    }

    #[test]
    fn test_same_direction_retracts() {
        let existing = Vote::new(target(), user("u1"), VoteType::Up, 1000).unwrap();
        let (op, transition) =
            plan_vote(Some(&existing), &target(), &user("u1"), VoteType::Up, 2000).unwrap();
        assert_eq!(transition, VoteTransition::Retract(VoteType::Up));
        match op {
            Op::RetractVote(tombstone) => {
                assert_eq!(tombstone.id, existing.id);
                assert_eq!(tombstone.retracted_at, 2000);
            }
            other => panic!("expected RetractVote, got {:?}", other),
        }
    }

    #[test]
    fn test_opposite_direction_switches_in_place() {
        let existing = Vote::new(target(), user("u1"), VoteType::Up, 1000).unwrap();
        let (op, transition) =
            plan_vote(Some(&existing), &target(), &user("u1"), VoteType::Down, 2000).unwrap();
        assert_eq!(
            transition,
            VoteTransition::Switch {
                from: VoteType::Up,
                to: VoteType::Down
            }
        );
        match op {
            Op::PutVote(vote) => {
                assert_eq!(vote.id, existing.id, "Switch keeps identity");
                assert_eq!(vote.vote_type, VoteType::Down);
            }
            other => panic!("expected PutVote, got {:?}", other),
        }
    }

    #[test]
    fn test_all_six_transitions() {
        let cases = [
            (None, VoteType::Up, VoteTransition::Cast(VoteType::Up)),
            (None, VoteType::Down, VoteTransition::Cast(VoteType::Down)),
            (
                Some(VoteType::Up),
                VoteType::Up,
                VoteTransition::Retract(VoteType::Up),
            ),
            (
                Some(VoteType::Up),
                VoteType::Down,
                VoteTransition::Switch {
                    from: VoteType::Up,
                    to: VoteType::Down,
                },
            ),
            (
                Some(VoteType::Down),
                VoteType::Down,
                VoteTransition::Retract(VoteType::Down),
            ),
            (
                Some(VoteType::Down),
                VoteType::Up,
                VoteTransition::Switch {
                    from: VoteType::Down,
                    to: VoteType::Up,
                },
            ),
        ];

        for (prior, cast, expected) in cases {
            let observed = prior.map(|vt| Vote::new(target(), user("u1"), vt, 1000).unwrap());
            let (_, transition) =
                plan_vote(observed.as_ref(), &target(), &user("u1"), cast, 2000).unwrap();
            assert_eq!(transition, expected);
        }
    }

    #[test]
    fn test_foreign_observed_vote_rejected() {
        let foreign = Vote::new(target(), user("u2"), VoteType::Up, 1000).unwrap();
        let err =
            plan_vote(Some(&foreign), &target(), &user("u1"), VoteType::Up, 2000).unwrap_err();
        assert!(matches!(err, AgoraError::Validation(_)));
    }

    #[test]
    fn test_vote_score_and_current_user_vote() {
        let votes = vec![
            Vote::new(target(), user("u1"), VoteType::Up, 1000).unwrap(),
            Vote::new(target(), user("u2"), VoteType::Up, 1001).unwrap(),
            Vote::new(target(), user("u3"), VoteType::Down, 1002).unwrap(),
        ];
        assert_eq!(vote_score(votes.iter()), 1);
        assert_eq!(
            current_user_vote(votes.iter(), &user("u3")).map(|v| v.vote_type),
            Some(VoteType::Down)
        );
        assert!(current_user_vote(votes.iter(), &user("u4")).is_none());

        let empty: Vec<Vote> = Vec::new();
        assert_eq!(vote_score(empty.iter()), 0);
    }
}
