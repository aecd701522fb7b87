//! Outbound notifications.
//!
//! Notifications are best-effort: delivery failures are logged and
//! swallowed so they never stall payout execution or the sweep loop. The
//! [`LogNotifier`] is the default sink; [`WebhookNotifier`] additionally
//! POSTs each message as JSON to a configured endpoint.

use alloy::primitives::{utils::format_units, Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Contribution reminder for one member, sent inside the pre-deadline
    /// window.
    async fn send_reminder(&self, member: Address, pool: Address, amount: U256, due: u64);

    /// A payout transaction confirmed on-chain.
    async fn notify_payout(
        &self,
        pool: Address,
        recipient: Option<Address>,
        amount: U256,
        tx_hash: B256,
    );

    /// A pool is past its deadline with contributions still missing.
    async fn alert_stalled(&self, pool: Address, hours_overdue: f64, missing: Vec<Address>);

    /// Operator-facing warning with structured context.
    async fn log_warning(&self, message: &str, metadata: Value);
}

/// Token amounts assume 18 decimals for display; raw values stay in logs.
fn display_amount(amount: U256) -> String {
    format_units(amount, 18).unwrap_or_else(|_| amount.to_string())
}

fn display_due(due: u64) -> String {
    DateTime::<Utc>::from_timestamp(due as i64, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| due.to_string())
}

/// Writes every notification to the structured log. Always available, even
/// with no webhook configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_reminder(&self, member: Address, pool: Address, amount: U256, due: u64) {
        info!(
            member = %member,
            pool = %pool,
            amount = %display_amount(amount),
            due = %display_due(due),
            "reminder: contribution due"
        );
    }

    async fn notify_payout(
        &self,
        pool: Address,
        recipient: Option<Address>,
        amount: U256,
        tx_hash: B256,
    ) {
        let recipient = recipient.map(|r| r.to_string()).unwrap_or_else(|| "unknown".into());
        info!(
            pool = %pool,
            recipient = %recipient,
            amount = %display_amount(amount),
            tx = %tx_hash,
            "payout distributed"
        );
    }

    async fn alert_stalled(&self, pool: Address, hours_overdue: f64, missing: Vec<Address>) {
        warn!(
            pool = %pool,
            hours_overdue = hours_overdue,
            missing = missing.len(),
            "pool stalled past deadline"
        );
    }

    async fn log_warning(&self, message: &str, metadata: Value) {
        warn!(metadata = %metadata, "{message}");
    }
}

/// Posts each notification to a webhook, falling back to the log on any
/// delivery failure.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    log: LogNotifier,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Self {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "webhook client build failed, falling back to default client without timeout");
                reqwest::Client::new()
            }
        };
        Self {
            client,
            url,
            log: LogNotifier,
        }
    }

    async fn post(&self, payload: Value) {
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                error!(status = %response.status(), "webhook rejected notification");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "webhook delivery failed");
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_reminder(&self, member: Address, pool: Address, amount: U256, due: u64) {
        self.log.send_reminder(member, pool, amount, due).await;
        self.post(json!({
            "type": "REMINDER",
            "member": member.to_string(),
            "pool": pool.to_string(),
            "amount": display_amount(amount),
            "due": display_due(due),
        }))
        .await;
    }

    async fn notify_payout(
        &self,
        pool: Address,
        recipient: Option<Address>,
        amount: U256,
        tx_hash: B256,
    ) {
        self.log.notify_payout(pool, recipient, amount, tx_hash).await;
        self.post(json!({
            "type": "PAYOUT",
            "pool": pool.to_string(),
            "recipient": recipient.map(|r| r.to_string()),
            "amount": display_amount(amount),
            "tx_hash": tx_hash.to_string(),
        }))
        .await;
    }

    async fn alert_stalled(&self, pool: Address, hours_overdue: f64, missing: Vec<Address>) {
        self.log
            .alert_stalled(pool, hours_overdue, missing.clone())
            .await;
        self.post(json!({
            "type": "STALLED",
            "pool": pool.to_string(),
            "hours_overdue": format!("{hours_overdue:.1}"),
            "missing": missing.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
        }))
        .await;
    }

    async fn log_warning(&self, message: &str, metadata: Value) {
        self.log.log_warning(message, metadata.clone()).await;
        self.post(json!({
            "type": "WARNING",
            "message": message,
            "metadata": metadata,
        }))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_render_in_whole_tokens() {
        let one_token = U256::from(10u64).pow(U256::from(18u64));
        assert_eq!(display_amount(one_token), "1.000000000000000000");
    }

    #[test]
    fn due_renders_as_rfc3339() {
        assert_eq!(display_due(1_700_000_000), "2023-11-14T22:13:20+00:00");
    }
}
