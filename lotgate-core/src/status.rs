//! Lot status derivation.
//!
//! A lot's visible status is a function of its open issues and checkpoints,
//! never an independently-settable field. The API layer calls this inside
//! the same transaction as every triggering transition and writes the result
//! to the lot row, so dashboards can query the stored column without
//! re-deriving it.

use crate::LotStatus;

/// Derive the visible status of a lot.
///
/// Priority: any open (non-closed) issue forces `IssueRaised`, overriding
/// checkpoint state; otherwise any live checkpoint forces `OnHold`;
/// otherwise the lot reverts to its stored resting status. The derivation
/// never advances a lot to `Completed` - that transition has its own
/// explicit trigger outside this engine, so a blocked resting status is
/// normalized to `InProgress`.
pub fn derive_lot_status(
    open_issue_count: i64,
    open_checkpoint_count: i64,
    resting_status: LotStatus,
) -> LotStatus {
    if open_issue_count > 0 {
        LotStatus::IssueRaised
    } else if open_checkpoint_count > 0 {
        LotStatus::OnHold
    } else if resting_status.is_blocked() {
        // A blocked value can never be a resting status; guard against a
        // corrupted stored column rather than echoing it back.
        LotStatus::InProgress
    } else {
        resting_status
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_issue_overrides_checkpoint() {
        assert_eq!(
            derive_lot_status(1, 5, LotStatus::InProgress),
            LotStatus::IssueRaised
        );
        assert_eq!(
            derive_lot_status(2, 0, LotStatus::NotStarted),
            LotStatus::IssueRaised
        );
    }

    #[test]
    fn test_checkpoint_holds_when_no_issue() {
        assert_eq!(
            derive_lot_status(0, 1, LotStatus::InProgress),
            LotStatus::OnHold
        );
    }

    #[test]
    fn test_reverts_to_resting_status() {
        assert_eq!(
            derive_lot_status(0, 0, LotStatus::InProgress),
            LotStatus::InProgress
        );
        assert_eq!(
            derive_lot_status(0, 0, LotStatus::NotStarted),
            LotStatus::NotStarted
        );
        // Never silently advances to Completed unless that IS the resting
        // status set by its own explicit trigger.
        assert_eq!(
            derive_lot_status(0, 0, LotStatus::Completed),
            LotStatus::Completed
        );
    }

    #[test]
    fn test_corrupt_blocked_resting_status_normalized() {
        assert_eq!(
            derive_lot_status(0, 0, LotStatus::IssueRaised),
            LotStatus::InProgress
        );
        assert_eq!(derive_lot_status(0, 0, LotStatus::OnHold), LotStatus::InProgress);
    }

    proptest! {
        /// status is IssueRaised iff at least one open issue exists; else
        /// OnHold iff at least one open checkpoint exists; else never blocked.
        #[test]
        fn prop_derivation_matches_spec(
            issues in 0i64..100,
            checkpoints in 0i64..100,
            resting in prop_oneof![
                Just(LotStatus::NotStarted),
                Just(LotStatus::InProgress),
                Just(LotStatus::Completed),
            ],
        ) {
            let derived = derive_lot_status(issues, checkpoints, resting);
            if issues > 0 {
                prop_assert_eq!(derived, LotStatus::IssueRaised);
            } else if checkpoints > 0 {
                prop_assert_eq!(derived, LotStatus::OnHold);
            } else {
                prop_assert_eq!(derived, resting);
                prop_assert!(!derived.is_blocked());
            }
        }

        /// Raising then clearing the only blocker always restores the
        /// original resting status.
        #[test]
        fn prop_block_then_clear_roundtrips(
            resting in prop_oneof![
                Just(LotStatus::NotStarted),
                Just(LotStatus::InProgress),
                Just(LotStatus::Completed),
            ],
        ) {
            let blocked = derive_lot_status(1, 0, resting);
            prop_assert_eq!(blocked, LotStatus::IssueRaised);
            let cleared = derive_lot_status(0, 0, resting);
            prop_assert_eq!(cleared, resting);
        }
    }
}
