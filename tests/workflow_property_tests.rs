//! Property-based tests for the workflow invariants
//!
//! Random sequences of workflow calls, most of which are refused, are applied
//! to a fresh database. Whatever the sequence, the ledger and the records must
//! stay consistent with each other after every step:
//!
//! 1. at most one ACTIVE registration per player, and the index agrees with it
//! 2. at most one PENDING transfer per player
//! 3. an appeal exists only for a transfer that was rejected; it is APPROVED
//!    exactly when the appeal ended UPHELD or FEDERATION_APPROVED
//! 4. every APPROVED transfer's destination appears in the player's history
mod common;

use common::*;
use proptest::prelude::*;
use transfer_appeal::{
    appeal::AppealStatus,
    policy::Actor,
    query::{AppealQuery, TransferQuery},
    transfer::{TransferStatus, TransferSubmission},
};

const PLAYERS: [&str; 2] = [PLAYER_P, PLAYER_Q];
const CLUBS: [&str; 3] = [CLUB_A, CLUB_B, CLUB_C];

#[derive(Debug, Clone)]
enum Op {
    Submit { player: usize, to: usize, by: usize },
    Approve(usize),
    Reject(usize),
    Cancel(usize),
    Appeal(usize),
    Uphold { appeal: usize, federation: bool },
    Dismiss(usize),
    Withdraw(usize),
    FederationReview { appeal: usize, approved: bool },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..PLAYERS.len(), 0..CLUBS.len(), 0..CLUBS.len())
            .prop_map(|(player, to, by)| Op::Submit { player, to, by }),
        2 => any::<usize>().prop_map(Op::Approve),
        2 => any::<usize>().prop_map(Op::Reject),
        1 => any::<usize>().prop_map(Op::Cancel),
        2 => any::<usize>().prop_map(Op::Appeal),
        2 => (any::<usize>(), any::<bool>())
            .prop_map(|(appeal, federation)| Op::Uphold { appeal, federation }),
        1 => any::<usize>().prop_map(Op::Dismiss),
        1 => any::<usize>().prop_map(Op::Withdraw),
        2 => (any::<usize>(), any::<bool>())
            .prop_map(|(appeal, approved)| Op::FederationReview { appeal, approved }),
    ]
}

fn pick(ids: &[String], n: usize) -> Option<&str> {
    if ids.is_empty() {
        return None;
    }
    Some(ids[n % ids.len()].as_str())
}

/// Applies one operation; refusals are expected and ignored.
fn apply(fx: &Fixture, op: &Op, transfers: &mut Vec<String>, appeals: &mut Vec<String>) {
    let reviewer = national_admin();
    match op {
        Op::Submit { player, to, by } => {
            let submission = TransferSubmission::new(PLAYERS[*player], CLUBS[*to]);
            if let Ok(t) = fx.facade.submit_transfer(&club_admin(CLUBS[*by]), &submission) {
                transfers.push(t.id);
            }
        }
        Op::Approve(n) => {
            if let Some(id) = pick(transfers, *n) {
                let _ = fx.facade.approve_transfer(&reviewer, id);
            }
        }
        Op::Reject(n) => {
            if let Some(id) = pick(transfers, *n) {
                let _ = fx.facade.reject_transfer(&reviewer, id, "property");
            }
        }
        Op::Cancel(n) => {
            if let Some(id) = pick(transfers, *n) {
                let _ = fx.facade.cancel_transfer(&reviewer, id);
            }
        }
        Op::Appeal(n) => {
            if let Some(id) = pick(transfers, *n) {
                if let Ok(transfer) = fx.facade.transfer(id) {
                    let submitter = club_admin(&transfer.from_club);
                    if let Ok(appeal) = fx.facade.create_appeal(&submitter, id, "property", None) {
                        appeals.push(appeal.id);
                    }
                }
            }
        }
        Op::Uphold { appeal, federation } => {
            if let Some(id) = pick(appeals, *appeal) {
                let _ = fx.facade.uphold_appeal(&reviewer, id, "", *federation);
            }
        }
        Op::Dismiss(n) => {
            if let Some(id) = pick(appeals, *n) {
                let _ = fx.facade.dismiss_appeal(&reviewer, id, "");
            }
        }
        Op::Withdraw(n) => {
            if let Some(id) = pick(appeals, *n) {
                if let Ok(appeal) = fx.facade.appeal(id) {
                    let transfer = fx.facade.transfer(&appeal.transfer_id).ok();
                    let club = transfer.map(|t| t.from_club).unwrap_or_default();
                    let submitter = Actor::club_admin(appeal.submitted_by, club);
                    let _ = fx.facade.withdraw_appeal(&submitter, id);
                }
            }
        }
        Op::FederationReview { appeal, approved } => {
            if let Some(id) = pick(appeals, *appeal) {
                let _ = fx
                    .facade
                    .federation_review(&federation_reviewer(), id, *approved, "");
            }
        }
    }
}

fn check_invariants(fx: &Fixture) -> Result<(), TestCaseError> {
    for player in PLAYERS {
        let history = fx.facade.registration_history(player).unwrap();
        let active: Vec<_> = history.iter().filter(|r| r.is_active()).collect();
        prop_assert_eq!(active.len(), 1, "player {} active records", player);

        let indexed = fx.facade.active_registration(player).unwrap();
        prop_assert_eq!(indexed.as_ref(), Some(active[0]));

        let pending = fx
            .facade
            .list_transfers(&TransferQuery::new().player(player).status(TransferStatus::Pending))
            .unwrap();
        prop_assert!(pending.len() <= 1, "player {} pending transfers", player);

        let approved = fx
            .facade
            .list_transfers(&TransferQuery::new().player(player).status(TransferStatus::Approved))
            .unwrap();
        for transfer in approved {
            prop_assert!(history.iter().any(|r| r.club_id == transfer.to_club));
        }
    }

    for appeal in fx.facade.list_appeals(&AppealQuery::new()).unwrap() {
        let transfer = fx.facade.transfer(&appeal.transfer_id).unwrap();
        let expected = match appeal.status {
            AppealStatus::Upheld | AppealStatus::FederationApproved => TransferStatus::Approved,
            _ => TransferStatus::Rejected,
        };
        prop_assert_eq!(transfer.status, expected, "appeal {:?}", appeal.status);
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: every observable state reached by any call sequence satisfies the invariants
    #[test]
    fn prop_invariants_hold_after_every_step(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let fx = fixture().unwrap();
        let mut transfers = vec![];
        let mut appeals = vec![];

        for op in &ops {
            apply(&fx, op, &mut transfers, &mut appeals);
            check_invariants(&fx)?;
        }
    }

    /// Property: an appeal can be created at most once per transfer
    #[test]
    fn prop_single_appeal_per_transfer(attempts in 2usize..6) {
        let fx = fixture().unwrap();
        let admin_a = club_admin(CLUB_A);
        let transfer = fx
            .facade
            .submit_transfer(&admin_a, &TransferSubmission::new(PLAYER_P, CLUB_B))
            .unwrap();
        fx.facade.reject_transfer(&national_admin(), &transfer.id, "no").unwrap();

        let created = (0..attempts)
            .filter(|_| fx.facade.create_appeal(&admin_a, &transfer.id, "again", None).is_ok())
            .count();

        prop_assert_eq!(created, 1);
    }
}
