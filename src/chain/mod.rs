//! Chain gateway: the agent's only window onto the ledger.
//!
//! The core depends on the [`ChainGateway`] trait, not on a transport.
//! `RpcGateway` is the production implementation over an alloy HTTP
//! provider; tests use the in-crate mock.

pub mod abi;
pub mod gateway;

use crate::retry::Retryable;
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

pub use gateway::RpcGateway;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transient transport/node failure. Safe to retry.
    #[error("rpc error: {0}")]
    Rpc(String),
    /// The operator account's transaction sequence number was stale.
    #[error("nonce expired: {0}")]
    NonceExpired(String),
    /// The operator account cannot fund the transaction.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    /// Gas estimation failed - the call would revert, retrying is pointless.
    #[error("gas estimation failed: {0}")]
    GasEstimation(String),
    /// The transaction was mined but reverted on-chain.
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Retryable for GatewayError {
    fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Rpc(_))
    }
}

/// A pool discovered through a factory `PoolCreated` log.
#[derive(Debug, Clone)]
pub struct PoolCreated {
    pub pool: Address,
    pub creator: Address,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// Events a pool contract emits inside a scan window.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    MemberJoined {
        member: Address,
        block_number: u64,
        tx_hash: B256,
    },
    ContributionMade {
        member: Address,
        amount: U256,
        round: u64,
        block_number: u64,
        tx_hash: B256,
    },
    PayoutDistributed {
        recipient: Address,
        amount: U256,
        round: u64,
        block_number: u64,
        tx_hash: B256,
    },
}

/// Static configuration plus dynamic round state, read in one batch.
#[derive(Debug, Clone)]
pub struct PoolInfo {
    pub contribution_amount: U256,
    pub cycle_duration: u64,
    pub max_members: u64,
    pub current_round: u64,
    pub next_payout_time: u64,
    pub is_active: bool,
}

/// Per-member view for the current round.
#[derive(Debug, Clone, Copy)]
pub struct MemberStatus {
    pub contributed_this_round: bool,
    pub total_contributed: U256,
    pub received_payout: bool,
}

/// Outcome of a confirmed `distributePot` transaction. Recipient and amount
/// are parsed from the receipt logs when present (best-effort).
#[derive(Debug, Clone)]
pub struct PayoutReceipt {
    pub tx_hash: B256,
    pub gas_used: u64,
    pub recipient: Option<Address>,
    pub amount: Option<U256>,
}

/// Read/write surface against the remote node. Log queries are range-pure
/// reads: re-running the same `[from, to]` range returns the same logs.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn current_height(&self) -> Result<u64, GatewayError>;

    /// Factory `PoolCreated` logs in `[from, to]` (inclusive).
    async fn created_pools(&self, from: u64, to: u64) -> Result<Vec<PoolCreated>, GatewayError>;

    /// Membership/contribution/payout logs for one pool in `[from, to]`.
    async fn pool_events(
        &self,
        pool: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<PoolEvent>, GatewayError>;

    /// Total pools the factory has created.
    async fn pool_count(&self) -> Result<u64, GatewayError>;

    /// One page of pool addresses from the factory enumeration.
    async fn pools_page(&self, offset: u64, limit: u64) -> Result<Vec<Address>, GatewayError>;

    async fn pool_info(&self, pool: Address) -> Result<PoolInfo, GatewayError>;

    async fn members(&self, pool: Address) -> Result<Vec<Address>, GatewayError>;

    async fn member_status(
        &self,
        pool: Address,
        member: Address,
    ) -> Result<MemberStatus, GatewayError>;

    /// Estimate gas (with safety buffer), submit `distributePot` signed by
    /// the operator key, and wait for one confirmation.
    async fn distribute_pot(&self, pool: Address) -> Result<PayoutReceipt, GatewayError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scriptable in-memory gateway for registry/scanner/engine tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct MockPool {
        pub info: PoolInfo,
        pub members: Vec<Address>,
        pub statuses: HashMap<Address, MemberStatus>,
    }

    #[derive(Default)]
    pub struct MockGateway {
        pub height: AtomicU64,
        pub pools: Mutex<HashMap<Address, MockPool>>,
        pub factory_order: Mutex<Vec<Address>>,
        /// (block, created) pairs returned by `created_pools` when in range.
        pub creation_log: Mutex<Vec<(u64, PoolCreated)>>,
        /// Pools whose reads fail with a transient error.
        pub failing_pools: Mutex<Vec<Address>>,
        /// When true, `pool_events` fails for every pool.
        pub fail_pool_events: Mutex<bool>,
        /// Scripted outcomes for `distribute_pot`, popped front-first.
        pub distribute_results: Mutex<Vec<Result<PayoutReceipt, GatewayError>>>,
        pub distribute_calls: AtomicU64,
    }

    impl MockGateway {
        pub fn new(height: u64) -> Self {
            let gw = Self::default();
            gw.height.store(height, Ordering::SeqCst);
            gw
        }

        pub fn add_pool(&self, address: Address, pool: MockPool) {
            self.factory_order.lock().unwrap().push(address);
            self.pools.lock().unwrap().insert(address, pool);
        }

        pub fn fail_pool(&self, address: Address) {
            self.failing_pools.lock().unwrap().push(address);
        }

        fn check_pool(&self, pool: Address) -> Result<MockPool, GatewayError> {
            if self.failing_pools.lock().unwrap().contains(&pool) {
                return Err(GatewayError::Rpc("mock: pool read failure".into()));
            }
            self.pools
                .lock()
                .unwrap()
                .get(&pool)
                .cloned()
                .ok_or_else(|| GatewayError::Rpc("mock: unknown pool".into()))
        }
    }

    #[async_trait]
    impl ChainGateway for MockGateway {
        async fn current_height(&self) -> Result<u64, GatewayError> {
            Ok(self.height.load(Ordering::SeqCst))
        }

        async fn created_pools(
            &self,
            from: u64,
            to: u64,
        ) -> Result<Vec<PoolCreated>, GatewayError> {
            Ok(self
                .creation_log
                .lock()
                .unwrap()
                .iter()
                .filter(|(block, _)| *block >= from && *block <= to)
                .map(|(_, created)| created.clone())
                .collect())
        }

        async fn pool_events(
            &self,
            _pool: Address,
            _from: u64,
            _to: u64,
        ) -> Result<Vec<PoolEvent>, GatewayError> {
            if *self.fail_pool_events.lock().unwrap() {
                return Err(GatewayError::Rpc("mock: log query failure".into()));
            }
            Ok(Vec::new())
        }

        async fn pool_count(&self) -> Result<u64, GatewayError> {
            Ok(self.factory_order.lock().unwrap().len() as u64)
        }

        async fn pools_page(
            &self,
            offset: u64,
            limit: u64,
        ) -> Result<Vec<Address>, GatewayError> {
            let order = self.factory_order.lock().unwrap();
            Ok(order
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .copied()
                .collect())
        }

        async fn pool_info(&self, pool: Address) -> Result<PoolInfo, GatewayError> {
            Ok(self.check_pool(pool)?.info)
        }

        async fn members(&self, pool: Address) -> Result<Vec<Address>, GatewayError> {
            Ok(self.check_pool(pool)?.members)
        }

        async fn member_status(
            &self,
            pool: Address,
            member: Address,
        ) -> Result<MemberStatus, GatewayError> {
            self.check_pool(pool)?
                .statuses
                .get(&member)
                .copied()
                .ok_or_else(|| GatewayError::Rpc("mock: unknown member".into()))
        }

        async fn distribute_pot(&self, _pool: Address) -> Result<PayoutReceipt, GatewayError> {
            self.distribute_calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.distribute_results.lock().unwrap();
            if results.is_empty() {
                return Ok(PayoutReceipt {
                    tx_hash: B256::ZERO,
                    gas_used: 0,
                    recipient: None,
                    amount: None,
                });
            }
            results.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rpc_errors_retry() {
        assert!(GatewayError::Rpc("timeout".into()).is_retryable());
        assert!(!GatewayError::NonceExpired("n".into()).is_retryable());
        assert!(!GatewayError::InsufficientFunds("f".into()).is_retryable());
        assert!(!GatewayError::GasEstimation("g".into()).is_retryable());
        assert!(!GatewayError::Reverted("r".into()).is_retryable());
    }
}
