//! Block-checkpointed event ingestion.
//!
//! The scanner advances a single cursor over the chain: each poll computes
//! the next safe `[from, to]` window, pulls factory and pool logs for it,
//! and only commits the cursor once the whole window processed cleanly.
//! A failed window is retried wholesale next cycle - log queries are
//! range-pure reads, so reprocessing is harmless.

use crate::chain::{ChainGateway, GatewayError, PoolEvent};
use crate::registry::PoolRegistry;
use crate::retry::{with_backoff, RetryPolicy};

use alloy::primitives::Address;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The "last confirmed block processed" cursor.
///
/// Initialized to the chain height at startup: the agent deliberately does
/// not replay history older than its own start.
#[derive(Debug)]
pub struct Checkpoint {
    last_block: u64,
    /// Blocks held back from the tip; log-serving nodes can trail the
    /// height-reporting ones.
    lag: u64,
    /// Upper bound on window size, so catch-up after downtime stays cheap.
    max_range: u64,
}

impl Checkpoint {
    pub fn new(start_height: u64, lag: u64, max_range: u64) -> Self {
        Self {
            last_block: start_height,
            lag,
            max_range: max_range.max(1),
        }
    }

    pub fn last_block(&self) -> u64 {
        self.last_block
    }

    /// The next scan window, or `None` when no confirmed blocks are due.
    pub fn next_window(&self, current_height: u64) -> Option<(u64, u64)> {
        let from = self.last_block + 1;
        let safe_tip = current_height.saturating_sub(self.lag);
        let to = safe_tip.min(from + self.max_range - 1);
        if to < from {
            return None;
        }
        Some((from, to))
    }

    /// Advance the cursor after a fully processed window.
    pub fn commit(&mut self, to_block: u64) {
        debug_assert!(to_block >= self.last_block);
        self.last_block = to_block;
    }
}

pub struct EventScanner {
    gateway: Arc<dyn ChainGateway>,
    registry: Arc<PoolRegistry>,
    checkpoint: Checkpoint,
    retry: RetryPolicy,
}

impl EventScanner {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        registry: Arc<PoolRegistry>,
        checkpoint: Checkpoint,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            registry,
            checkpoint,
            retry,
        }
    }

    pub fn last_block(&self) -> u64 {
        self.checkpoint.last_block()
    }

    /// One poll cycle. The cursor advances only when the whole window
    /// processed without error, so events are delivered at least once.
    pub async fn poll(&mut self) -> Result<(), GatewayError> {
        let height =
            with_backoff(&self.retry, "eth_blockNumber", || self.gateway.current_height()).await?;

        let Some((from, to)) = self.checkpoint.next_window(height) else {
            return Ok(());
        };

        self.scan_window(from, to).await?;
        self.checkpoint.commit(to);
        debug!(from = from, to = to, "scan window committed");
        Ok(())
    }

    async fn scan_window(&self, from: u64, to: u64) -> Result<(), GatewayError> {
        // Factory first: pools created inside this window get registered and
        // their own events land in later windows.
        let created = with_backoff(&self.retry, "factory logs", || {
            self.gateway.created_pools(from, to)
        })
        .await?;

        for creation in created {
            info!(
                pool = %creation.pool,
                creator = %creation.creator,
                block = creation.block_number,
                tx = %creation.tx_hash,
                "new pool created"
            );
            // A pool that never registers never gets its logs queried, so a
            // failed registration fails the whole window; the creation log
            // is re-read when the window is retried.
            if let Err(e) = self.registry.register(creation.pool).await {
                warn!(pool = %creation.pool, error = %e, "failed to register discovered pool");
                return Err(e);
            }
        }

        // Pool events: log them and refresh the pools they touched so the
        // next sweep evaluates fresh state.
        let mut touched: HashSet<Address> = HashSet::new();
        for pool in self.registry.addresses() {
            let events = with_backoff(&self.retry, "pool logs", || {
                self.gateway.pool_events(pool, from, to)
            })
            .await?;

            for event in &events {
                log_pool_event(pool, event);
            }
            if !events.is_empty() {
                touched.insert(pool);
            }
        }

        for pool in touched {
            if let Err(e) = self.registry.refresh(pool).await {
                warn!(pool = %pool, error = %e, "post-event refresh failed");
            }
        }

        Ok(())
    }
}

fn log_pool_event(pool: Address, event: &PoolEvent) {
    match event {
        PoolEvent::MemberJoined {
            member,
            block_number,
            tx_hash,
        } => {
            info!(pool = %pool, member = %member, block = block_number, tx = %tx_hash, "member joined");
        }
        PoolEvent::ContributionMade {
            member,
            amount,
            round,
            block_number,
            tx_hash,
        } => {
            info!(
                pool = %pool,
                member = %member,
                amount = %amount,
                round = round,
                block = block_number,
                tx = %tx_hash,
                "contribution made"
            );
        }
        PoolEvent::PayoutDistributed {
            recipient,
            amount,
            round,
            block_number,
            tx_hash,
        } => {
            info!(
                pool = %pool,
                recipient = %recipient,
                amount = %amount,
                round = round,
                block = block_number,
                tx = %tx_hash,
                "payout distributed"
            );
        }
    }
}
