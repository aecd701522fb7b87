//! Condition evaluation: pool snapshot + clock -> at most one action.
//!
//! The three rules are mutually exclusive by construction and checked in
//! priority order. An overdue pool where everyone paid gets its payout
//! immediately instead of lingering in reminder state; an overdue pool with
//! missing payments is reported as stalled, not nagged - reminders are
//! strictly pre-deadline.

pub mod dedup;
pub mod executor;

use crate::registry::PoolSnapshot;
use alloy::primitives::{Address, U256};
use std::time::Duration;

pub use executor::DecisionEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "HIGH"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::Low => write!(f, "LOW"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Deadline reached and everyone paid: trigger the distribution.
    PayoutReady { pot_amount: U256 },
    /// Inside the reminder window with payments still missing.
    ReminderDue {
        missing: Vec<Address>,
        amount: U256,
        due: u64,
    },
    /// Past the deadline with payments still missing.
    Stalled {
        hours_overdue: f64,
        missing: Vec<Address>,
    },
}

impl Condition {
    pub fn kind(&self) -> &'static str {
        match self {
            Condition::PayoutReady { .. } => "PAYOUT_READY",
            Condition::ReminderDue { .. } => "REMINDER_DUE",
            Condition::Stalled { .. } => "POOL_STALLED",
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Condition::PayoutReady { .. } => Priority::High,
            Condition::ReminderDue { .. } => Priority::Medium,
            Condition::Stalled { .. } => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionableCondition {
    pub pool: Address,
    pub condition: Condition,
}

/// Classify one snapshot at time `now` (unix seconds). Deterministic, no IO.
/// Returns `None` for inactive pools and pools with nothing due.
pub fn evaluate(
    snapshot: &PoolSnapshot,
    now: u64,
    reminder_window: Duration,
) -> Option<ActionableCondition> {
    if !snapshot.is_active {
        return None;
    }

    let missing = snapshot.missing_contributors();
    let due = snapshot.next_payout_time;

    let condition = if now >= due && missing.is_empty() {
        Condition::PayoutReady {
            pot_amount: snapshot.pot_amount(),
        }
    } else if now < due && now >= due.saturating_sub(reminder_window.as_secs()) {
        if missing.is_empty() {
            return None;
        }
        Condition::ReminderDue {
            missing,
            amount: snapshot.contribution_amount,
            due,
        }
    } else if now > due && !missing.is_empty() {
        Condition::Stalled {
            hours_overdue: (now - due) as f64 / 3600.0,
            missing,
        }
    } else {
        return None;
    };

    Some(ActionableCondition {
        pool: snapshot.address,
        condition,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const HOUR: u64 = 3600;
    const NOW: u64 = 1_700_000_000;

    fn addr(n: u8) -> Address {
        Address::with_last_byte(n)
    }

    fn snapshot(
        members: &[(Address, bool)],
        next_payout_time: u64,
        is_active: bool,
    ) -> PoolSnapshot {
        let amount = U256::from(10u64);
        PoolSnapshot {
            address: addr(1),
            current_round: 1,
            next_payout_time,
            contribution_amount: amount,
            cycle_duration: 7 * 24 * HOUR,
            max_members: members.len() as u64,
            members: members.iter().map(|(m, _)| *m).collect(),
            contributions_this_cycle: members
                .iter()
                .filter(|(_, paid)| *paid)
                .map(|(m, _)| (*m, amount))
                .collect(),
            has_received_payout: HashMap::new(),
            is_active,
            last_checked: NOW,
        }
    }

    fn window() -> Duration {
        Duration::from_secs(24 * HOUR)
    }

    #[test]
    fn payout_ready_when_due_and_fully_funded() {
        let snap = snapshot(
            &[(addr(10), true), (addr(11), true), (addr(12), true)],
            NOW - 1,
            true,
        );
        let action = evaluate(&snap, NOW, window()).unwrap();
        assert_eq!(
            action.condition,
            Condition::PayoutReady {
                pot_amount: U256::from(30u64)
            }
        );
        assert_eq!(action.condition.priority(), Priority::High);
    }

    #[test]
    fn reminder_inside_window_with_missing_member() {
        let snap = snapshot(&[(addr(10), true), (addr(11), false)], NOW + 23 * HOUR, true);
        let action = evaluate(&snap, NOW, window()).unwrap();
        match action.condition {
            Condition::ReminderDue { missing, amount, due } => {
                assert_eq!(missing, vec![addr(11)]);
                assert_eq!(amount, U256::from(10u64));
                assert_eq!(due, NOW + 23 * HOUR);
            }
            other => panic!("expected ReminderDue, got {other:?}"),
        }
    }

    #[test]
    fn stalled_when_overdue_with_missing_member() {
        let snap = snapshot(&[(addr(10), true), (addr(11), false)], NOW - HOUR, true);
        let action = evaluate(&snap, NOW, window()).unwrap();
        match action.condition {
            Condition::Stalled {
                hours_overdue,
                missing,
            } => {
                assert!((hours_overdue - 1.0).abs() < f64::EPSILON);
                assert_eq!(missing, vec![addr(11)]);
            }
            other => panic!("expected Stalled, got {other:?}"),
        }
    }

    #[test]
    fn overdue_but_fully_funded_pays_out_instead_of_stalling() {
        let snap = snapshot(&[(addr(10), true), (addr(11), true)], NOW - 2 * HOUR, true);
        let action = evaluate(&snap, NOW, window()).unwrap();
        assert!(matches!(action.condition, Condition::PayoutReady { .. }));
    }

    #[test]
    fn reminder_window_fully_funded_yields_nothing() {
        // Not due yet and nobody is missing: nothing to do.
        let snap = snapshot(&[(addr(10), true)], NOW + 23 * HOUR, true);
        assert!(evaluate(&snap, NOW, window()).is_none());
    }

    #[test]
    fn far_from_deadline_yields_nothing() {
        let snap = snapshot(&[(addr(10), false)], NOW + 48 * HOUR, true);
        assert!(evaluate(&snap, NOW, window()).is_none());
    }

    #[test]
    fn inactive_pool_is_skipped() {
        let snap = snapshot(&[(addr(10), true)], NOW - 1, false);
        assert!(evaluate(&snap, NOW, window()).is_none());
    }

    #[test]
    fn at_most_one_condition_across_the_clock() {
        // Sweep `now` across the whole timeline around the deadline and
        // confirm the evaluator never has more than one answer (it returns
        // an Option, so the real check is that each phase maps to the
        // expected single variant with no overlap at the boundaries).
        let due = NOW;
        let snap = snapshot(&[(addr(10), true), (addr(11), false)], due, true);
        for offset in [-30 * HOUR as i64, -(HOUR as i64), 0, HOUR as i64] {
            let t = (due as i64 + offset) as u64;
            let result = evaluate(&snap, t, window());
            match offset {
                o if o < -(24 * HOUR as i64) => assert!(result.is_none()),
                o if o < 0 => assert!(matches!(
                    result.unwrap().condition,
                    Condition::ReminderDue { .. }
                )),
                // At t == due with a missing member: not ready, not a
                // reminder (window is strictly pre-deadline), not yet
                // stalled (strictly past due).
                0 => assert!(result.is_none()),
                _ => assert!(matches!(result.unwrap().condition, Condition::Stalled { .. })),
            }
        }
    }
}
