//! alloy-backed [`ChainGateway`] implementation.
//!
//! One HTTP provider with the operator key installed as a wallet filler.
//! Log queries are plain `eth_getLogs` range reads; the only write is
//! `distributePot`, gas-estimated with a 20% buffer and confirmed once.

use crate::chain::abi::{SusuFactory, SusuPool};
use crate::chain::{
    ChainGateway, GatewayError, MemberStatus, PayoutReceipt, PoolCreated, PoolEvent, PoolInfo,
};

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use tracing::{debug, info};

/// Gas limit buffer applied on top of the estimate, in percent.
const GAS_BUFFER_PCT: u64 = 20;

pub struct RpcGateway {
    provider: DynProvider,
    factory: Address,
}

impl RpcGateway {
    /// Connect to the node and install the operator signer. Failure here is
    /// fatal to the agent - there is nothing to do without chain access.
    pub fn connect(
        rpc_url: &str,
        private_key: &str,
        factory: Address,
    ) -> Result<Self, GatewayError> {
        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|e| GatewayError::InvalidInput(format!("rpc url: {e}")))?;

        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| GatewayError::InvalidInput(format!("operator key: {e}")))?;
        let operator = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(url)
            .erased();

        info!(operator = %operator, factory = %factory, "chain gateway ready");

        Ok(Self { provider, factory })
    }

    fn pool_contract(&self, pool: Address) -> SusuPool::SusuPoolInstance<DynProvider> {
        SusuPool::new(pool, self.provider.clone())
    }

    fn factory_contract(&self) -> SusuFactory::SusuFactoryInstance<DynProvider> {
        SusuFactory::new(self.factory, self.provider.clone())
    }
}

/// Sort a provider/submission error into the gateway taxonomy. The node
/// reports nonce and balance problems only as message text, so this matches
/// on the text the same way the RPC client libraries do.
fn classify(context: &str, err: impl std::fmt::Display) -> GatewayError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("nonce") {
        GatewayError::NonceExpired(msg)
    } else if lower.contains("insufficient funds") {
        GatewayError::InsufficientFunds(msg)
    } else if lower.contains("revert") {
        GatewayError::Reverted(msg)
    } else {
        GatewayError::Rpc(format!("{context}: {msg}"))
    }
}

fn to_u64(value: U256) -> u64 {
    value.try_into().unwrap_or(u64::MAX)
}

fn log_position(log: &Log) -> (u64, alloy::primitives::B256) {
    (
        log.block_number.unwrap_or_default(),
        log.transaction_hash.unwrap_or_default(),
    )
}

#[async_trait]
impl ChainGateway for RpcGateway {
    async fn current_height(&self) -> Result<u64, GatewayError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| classify("eth_blockNumber", e))
    }

    async fn created_pools(&self, from: u64, to: u64) -> Result<Vec<PoolCreated>, GatewayError> {
        let filter = Filter::new()
            .address(self.factory)
            .event_signature(SusuFactory::PoolCreated::SIGNATURE_HASH)
            .from_block(from)
            .to_block(to);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| classify("factory getLogs", e))?;

        let mut created = Vec::with_capacity(logs.len());
        for log in &logs {
            let decoded = log
                .log_decode::<SusuFactory::PoolCreated>()
                .map_err(|e| GatewayError::Rpc(format!("decode PoolCreated: {e}")))?;
            let (block_number, tx_hash) = log_position(log);
            created.push(PoolCreated {
                pool: decoded.inner.data.pool,
                creator: decoded.inner.data.creator,
                block_number,
                tx_hash,
            });
        }
        Ok(created)
    }

    async fn pool_events(
        &self,
        pool: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<PoolEvent>, GatewayError> {
        let filter = Filter::new()
            .address(pool)
            .event_signature(vec![
                SusuPool::MemberJoined::SIGNATURE_HASH,
                SusuPool::ContributionMade::SIGNATURE_HASH,
                SusuPool::PayoutDistributed::SIGNATURE_HASH,
            ])
            .from_block(from)
            .to_block(to);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| classify("pool getLogs", e))?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            let Some(topic0) = log.topic0() else {
                continue;
            };
            let (block_number, tx_hash) = log_position(log);

            match *topic0 {
                t if t == SusuPool::MemberJoined::SIGNATURE_HASH => {
                    let decoded = log
                        .log_decode::<SusuPool::MemberJoined>()
                        .map_err(|e| GatewayError::Rpc(format!("decode MemberJoined: {e}")))?;
                    events.push(PoolEvent::MemberJoined {
                        member: decoded.inner.data.member,
                        block_number,
                        tx_hash,
                    });
                }
                t if t == SusuPool::ContributionMade::SIGNATURE_HASH => {
                    let decoded = log
                        .log_decode::<SusuPool::ContributionMade>()
                        .map_err(|e| GatewayError::Rpc(format!("decode ContributionMade: {e}")))?;
                    events.push(PoolEvent::ContributionMade {
                        member: decoded.inner.data.member,
                        amount: decoded.inner.data.amount,
                        round: to_u64(decoded.inner.data.round),
                        block_number,
                        tx_hash,
                    });
                }
                t if t == SusuPool::PayoutDistributed::SIGNATURE_HASH => {
                    let decoded = log
                        .log_decode::<SusuPool::PayoutDistributed>()
                        .map_err(|e| GatewayError::Rpc(format!("decode PayoutDistributed: {e}")))?;
                    events.push(PoolEvent::PayoutDistributed {
                        recipient: decoded.inner.data.recipient,
                        amount: decoded.inner.data.amount,
                        round: to_u64(decoded.inner.data.round),
                        block_number,
                        tx_hash,
                    });
                }
                _ => {
                    debug!(topic = %topic0, pool = %pool, "unrecognised pool event topic");
                }
            }
        }
        Ok(events)
    }

    async fn pool_count(&self) -> Result<u64, GatewayError> {
        let count = self
            .factory_contract()
            .poolCount()
            .call()
            .await
            .map_err(|e| classify("poolCount", e))?;
        Ok(to_u64(count))
    }

    async fn pools_page(&self, offset: u64, limit: u64) -> Result<Vec<Address>, GatewayError> {
        self.factory_contract()
            .getPools(U256::from(offset), U256::from(limit))
            .call()
            .await
            .map_err(|e| classify("getPools", e))
    }

    async fn pool_info(&self, pool: Address) -> Result<PoolInfo, GatewayError> {
        let contract = self.pool_contract(pool);

        let info = contract
            .getPoolInfo()
            .call()
            .await
            .map_err(|e| classify("getPoolInfo", e))?;
        let max_members = contract
            .maxMembers()
            .call()
            .await
            .map_err(|e| classify("maxMembers", e))?;

        Ok(PoolInfo {
            contribution_amount: info.contributionAmount,
            cycle_duration: to_u64(info.cycleDuration),
            max_members: to_u64(max_members),
            current_round: to_u64(info.currentRound),
            next_payout_time: to_u64(info.nextPayoutTime),
            is_active: info.isActive,
        })
    }

    async fn members(&self, pool: Address) -> Result<Vec<Address>, GatewayError> {
        self.pool_contract(pool)
            .getMembers()
            .call()
            .await
            .map_err(|e| classify("getMembers", e))
    }

    async fn member_status(
        &self,
        pool: Address,
        member: Address,
    ) -> Result<MemberStatus, GatewayError> {
        let status = self
            .pool_contract(pool)
            .getMemberStatus(member)
            .call()
            .await
            .map_err(|e| classify("getMemberStatus", e))?;

        Ok(MemberStatus {
            contributed_this_round: status.contributedThisRound,
            total_contributed: status.totalContributed,
            received_payout: status.receivedPayout,
        })
    }

    async fn distribute_pot(&self, pool: Address) -> Result<PayoutReceipt, GatewayError> {
        let contract = self.pool_contract(pool);
        let call = contract.distributePot();

        // A failed estimate means the call would revert (not everyone paid,
        // payout not due, ...). Submitting anyway would only burn gas.
        let estimate = call
            .estimate_gas()
            .await
            .map_err(|e| GatewayError::GasEstimation(e.to_string()))?;
        let gas_limit = estimate.saturating_mul(100 + GAS_BUFFER_PCT) / 100;

        debug!(pool = %pool, estimate = estimate, gas_limit = gas_limit, "submitting distributePot");

        let pending = call
            .gas(gas_limit)
            .send()
            .await
            .map_err(|e| classify("distributePot send", e))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| classify("distributePot confirmation", e))?;

        if !receipt.status() {
            return Err(GatewayError::Reverted(format!(
                "distributePot reverted in tx {}",
                receipt.transaction_hash
            )));
        }

        // Best-effort: pull recipient and amount out of the receipt logs.
        let mut recipient = None;
        let mut amount = None;
        for log in receipt.logs() {
            if let Ok(decoded) = log.log_decode::<SusuPool::PayoutDistributed>() {
                recipient = Some(decoded.inner.data.recipient);
                amount = Some(decoded.inner.data.amount);
            }
        }

        Ok(PayoutReceipt {
            tx_hash: receipt.transaction_hash,
            gas_used: receipt.gas_used,
            recipient,
            amount,
        })
    }
}
