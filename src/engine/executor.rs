//! Decision engine: turn actionable conditions into transactions and
//! notifications, at most once per pool per day.
//!
//! Dedup keys are marked only after a dispatch attempt completes - success
//! or a recognized on-chain failure. A transport-level failure leaves the
//! key unmarked so the next sweep may try again the same day. One pool's
//! failure never blocks the rest of the batch.

use crate::chain::{ChainGateway, GatewayError};
use crate::engine::dedup::DedupLedger;
use crate::engine::{ActionableCondition, Condition};
use crate::notify::Notifier;
use crate::retry::{with_backoff, RetryPolicy};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Whether a dispatch attempt ran to completion (and must not be retried
/// today) or died early enough that a same-day retry is correct.
enum Attempt {
    Completed,
    Incomplete,
}

pub struct DecisionEngine {
    gateway: Arc<dyn ChainGateway>,
    notifier: Arc<dyn Notifier>,
    ledger: DedupLedger,
    retry: RetryPolicy,
}

impl DecisionEngine {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            notifier,
            ledger: DedupLedger::new(),
            retry,
        }
    }

    /// Process one batch of conditions.
    pub async fn process(&mut self, conditions: Vec<ActionableCondition>) {
        self.process_at(conditions, Utc::now()).await;
    }

    /// Clock-injected variant backing [`Self::process`].
    pub async fn process_at(&mut self, conditions: Vec<ActionableCondition>, now: DateTime<Utc>) {
        if conditions.is_empty() {
            return;
        }
        info!(count = conditions.len(), "processing actionable conditions");

        for action in conditions {
            let kind = action.condition.kind();
            let key = DedupLedger::key(kind, action.pool, now);

            if self.ledger.is_marked(&key, now) {
                debug!(pool = %action.pool, kind = kind, "already handled today, skipping");
                continue;
            }

            info!(
                pool = %action.pool,
                kind = kind,
                priority = %action.condition.priority(),
                "dispatching"
            );

            match self.dispatch(action.pool, &action.condition).await {
                Attempt::Completed => self.ledger.mark(key, now),
                Attempt::Incomplete => {
                    debug!(pool = %action.pool, kind = kind, "attempt incomplete, eligible for same-day retry");
                }
            }
        }
    }

    async fn dispatch(&self, pool: Address, condition: &Condition) -> Attempt {
        match condition {
            Condition::PayoutReady { pot_amount } => self.trigger_payout(pool, *pot_amount).await,
            Condition::ReminderDue { missing, amount, due } => {
                for member in missing {
                    self.notifier.send_reminder(*member, pool, *amount, *due).await;
                }
                info!(pool = %pool, reminders = missing.len(), "reminders sent");
                Attempt::Completed
            }
            Condition::Stalled {
                hours_overdue,
                missing,
            } => {
                self.notifier
                    .alert_stalled(pool, *hours_overdue, missing.clone())
                    .await;
                Attempt::Completed
            }
        }
    }

    async fn trigger_payout(&self, pool: Address, pot_amount: alloy::primitives::U256) -> Attempt {
        info!(pool = %pool, pot = %pot_amount, "triggering payout");

        let result = with_backoff(&self.retry, "distributePot", || {
            self.gateway.distribute_pot(pool)
        })
        .await;

        match result {
            Ok(receipt) => {
                info!(
                    pool = %pool,
                    tx = %receipt.tx_hash,
                    gas_used = receipt.gas_used,
                    "payout confirmed"
                );
                self.notifier
                    .notify_payout(
                        pool,
                        receipt.recipient,
                        receipt.amount.unwrap_or(pot_amount),
                        receipt.tx_hash,
                    )
                    .await;
                Attempt::Completed
            }
            // A revert or a failing estimate is a real on-chain answer:
            // the condition re-derives from fresh state next cycle, and
            // tomorrow's key allows a new attempt. No same-day churn.
            Err(e @ (GatewayError::Reverted(_) | GatewayError::GasEstimation(_))) => {
                warn!(pool = %pool, error = %e, "payout rejected on-chain");
                self.notifier
                    .log_warning(
                        "payout attempt rejected on-chain",
                        json!({ "pool": pool.to_string(), "error": e.to_string() }),
                    )
                    .await;
                Attempt::Completed
            }
            Err(e) => {
                error!(pool = %pool, error = %e, "payout submission failed");
                Attempt::Incomplete
            }
        }
    }
}
