//! Pool registry and per-pool state cache.
//!
//! Holds one [`PoolSnapshot`] per known pool, rebuilt from chain reads.
//! Refreshes replace the snapshot wholesale so readers never see a mix of
//! old and new fields. A failed refresh keeps the previous snapshot
//! (stale-but-present); snapshots are never dropped while the process runs.

use crate::chain::{ChainGateway, GatewayError};
use crate::retry::{with_backoff, RetryPolicy};

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

/// Everything the agent knows about one pool, as of `last_checked`.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub address: Address,
    pub current_round: u64,
    /// Unix seconds of the next payout deadline.
    pub next_payout_time: u64,
    /// Per-member contribution in the token's smallest unit.
    pub contribution_amount: U256,
    pub cycle_duration: u64,
    pub max_members: u64,
    /// Join-order member list. Append-only until the pool completes.
    pub members: Vec<Address>,
    /// Members who have paid this round, re-derived on every refresh.
    pub contributions_this_cycle: HashMap<Address, U256>,
    pub has_received_payout: HashMap<Address, bool>,
    /// False once the pool completes; never flips back.
    pub is_active: bool,
    /// Unix seconds of the last successful refresh.
    pub last_checked: u64,
}

impl PoolSnapshot {
    /// Members who have not yet contributed this round, in join order.
    pub fn missing_contributors(&self) -> Vec<Address> {
        self.members
            .iter()
            .filter(|m| !self.contributions_this_cycle.contains_key(*m))
            .copied()
            .collect()
    }

    /// Full pot for the current round.
    pub fn pot_amount(&self) -> U256 {
        self.contribution_amount * U256::from(self.members.len())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub refreshed: usize,
    pub failed: usize,
}

pub struct PoolRegistry {
    gateway: Arc<dyn ChainGateway>,
    pools: DashMap<Address, PoolSnapshot>,
    retry: RetryPolicy,
    refresh_timeout: Duration,
    max_concurrent: usize,
    page_size: u64,
}

impl PoolRegistry {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        retry: RetryPolicy,
        refresh_timeout: Duration,
        max_concurrent: usize,
        page_size: u64,
    ) -> Self {
        Self {
            gateway,
            pools: DashMap::new(),
            retry,
            refresh_timeout,
            max_concurrent: max_concurrent.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn contains(&self, address: Address) -> bool {
        self.pools.contains_key(&address)
    }

    pub fn snapshot(&self, address: Address) -> Option<PoolSnapshot> {
        self.pools.get(&address).map(|entry| entry.clone())
    }

    pub fn snapshots(&self) -> Vec<PoolSnapshot> {
        self.pools.iter().map(|entry| entry.clone()).collect()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.pools.iter().map(|entry| *entry.key()).collect()
    }

    /// Register a pool: no-op if already known, otherwise do an initial
    /// refresh so a snapshot exists before the next sweep.
    pub async fn register(&self, address: Address) -> Result<(), GatewayError> {
        if self.pools.contains_key(&address) {
            return Ok(());
        }
        self.refresh(address).await?;
        info!(pool = %address, total = self.pools.len(), "pool registered");
        Ok(())
    }

    /// Enumerate pools the factory already created, page by page, and
    /// register each one. Called once at startup.
    pub async fn load_existing(&self) -> Result<usize, GatewayError> {
        let total = with_backoff(&self.retry, "poolCount", || self.gateway.pool_count()).await?;
        if total == 0 {
            info!("no existing pools in factory");
            return Ok(0);
        }

        let mut loaded = 0usize;
        let mut offset = 0u64;
        while offset < total {
            let page = with_backoff(&self.retry, "getPools", || {
                self.gateway.pools_page(offset, self.page_size)
            })
            .await?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as u64;

            for address in page {
                match self.register(address).await {
                    Ok(()) => loaded += 1,
                    // One unreadable pool must not block startup; it will be
                    // retried by later sweeps once registered via events.
                    Err(e) => error!(pool = %address, error = %e, "failed to load pool"),
                }
            }
        }

        info!(loaded = loaded, total = total, "existing pools loaded");
        Ok(loaded)
    }

    /// Read the full pool state and atomically replace the cached snapshot.
    pub async fn refresh(&self, address: Address) -> Result<PoolSnapshot, GatewayError> {
        let info = with_backoff(&self.retry, "getPoolInfo", || {
            self.gateway.pool_info(address)
        })
        .await?;

        let members = with_backoff(&self.retry, "getMembers", || {
            self.gateway.members(address)
        })
        .await?;

        let mut contributions_this_cycle = HashMap::new();
        let mut has_received_payout = HashMap::new();
        for member in &members {
            let status = with_backoff(&self.retry, "getMemberStatus", || {
                self.gateway.member_status(address, *member)
            })
            .await?;
            if status.contributed_this_round {
                contributions_this_cycle.insert(*member, info.contribution_amount);
            }
            has_received_payout.insert(*member, status.received_payout);
        }

        let snapshot = PoolSnapshot {
            address,
            current_round: info.current_round,
            next_payout_time: info.next_payout_time,
            contribution_amount: info.contribution_amount,
            cycle_duration: info.cycle_duration,
            max_members: info.max_members,
            members,
            contributions_this_cycle,
            has_received_payout,
            is_active: info.is_active,
            last_checked: unix_now(),
        };

        if let Some(previous) = self.pools.get(&address) {
            // The deadline moves forward as rounds complete; a move backwards
            // on an active pool means the node served inconsistent state.
            if previous.is_active && snapshot.next_payout_time < previous.next_payout_time {
                warn!(
                    pool = %address,
                    previous = previous.next_payout_time,
                    current = snapshot.next_payout_time,
                    "next payout time moved backwards"
                );
            }
        }

        self.pools.insert(address, snapshot.clone());
        Ok(snapshot)
    }

    /// Refresh every registered pool with bounded concurrency. Failures are
    /// isolated per pool: the stale snapshot stays and the sweep continues.
    pub async fn sweep_all(&self) -> SweepStats {
        let addresses = self.addresses();
        let stats = stream::iter(addresses)
            .map(|address| async move {
                match tokio::time::timeout(self.refresh_timeout, self.refresh(address)).await {
                    Ok(Ok(_)) => true,
                    Ok(Err(e)) => {
                        error!(pool = %address, error = %e, "pool refresh failed");
                        false
                    }
                    Err(_) => {
                        error!(
                            pool = %address,
                            timeout_secs = self.refresh_timeout.as_secs(),
                            "pool refresh timed out"
                        );
                        false
                    }
                }
            })
            .buffer_unordered(self.max_concurrent)
            .fold(SweepStats::default(), |mut stats, ok| async move {
                if ok {
                    stats.refreshed += 1;
                } else {
                    stats.failed += 1;
                }
                stats
            })
            .await;

        if stats.failed > 0 {
            warn!(
                refreshed = stats.refreshed,
                failed = stats.failed,
                "sweep finished with failures"
            );
        }
        stats
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
