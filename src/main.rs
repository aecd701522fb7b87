use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use susu_agent::chain::gateway::RpcGateway;
use susu_agent::chain::ChainGateway;
use susu_agent::config::Config;
use susu_agent::engine::{evaluate, ActionableCondition, DecisionEngine};
use susu_agent::notify::{LogNotifier, Notifier, WebhookNotifier};
use susu_agent::registry::{unix_now, PoolRegistry};
use susu_agent::retry::RetryPolicy;
use susu_agent::scan::{Checkpoint, EventScanner};

const CONFIG_FILE: &str = "susu-agent.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = if Path::new(CONFIG_FILE).exists() {
        Config::load(Path::new(CONFIG_FILE)).context("loading config file")?
    } else {
        Config::from_env()
    };
    config.validate().context("validating config")?;

    init_tracing(&config);
    info!(
        rpc = %config.chain.rpc_url,
        factory = %config.chain.factory_address,
        "starting susu agent"
    );

    let factory = config
        .chain
        .factory_address
        .parse()
        .context("parsing factory address")?;
    let gateway: Arc<dyn ChainGateway> = Arc::new(
        RpcGateway::connect(&config.chain.rpc_url, &config.chain.private_key, factory)
            .context("connecting chain gateway")?,
    );

    let retry = RetryPolicy::with_attempts(config.agent.max_retry_attempts);
    let registry = Arc::new(PoolRegistry::new(
        gateway.clone(),
        retry.clone(),
        Duration::from_secs(config.agent.refresh_timeout_secs),
        config.agent.max_concurrent_refreshes,
        config.agent.page_size,
    ));

    let notifier: Arc<dyn Notifier> = if config.notify.webhook_url.is_empty() {
        Arc::new(LogNotifier)
    } else {
        info!(url = %config.notify.webhook_url, "webhook notifications enabled");
        Arc::new(WebhookNotifier::new(
            config.notify.webhook_url.clone(),
            Duration::from_secs(config.notify.timeout_secs),
        ))
    };

    // New pools from here on arrive via factory events; everything older is
    // picked up by the startup enumeration below.
    let start_height = gateway
        .current_height()
        .await
        .context("reading chain height")?;
    let mut scanner = EventScanner::new(
        gateway.clone(),
        registry.clone(),
        Checkpoint::new(
            start_height,
            config.chain.confirmation_lag,
            config.chain.max_scan_range,
        ),
        retry.clone(),
    );
    info!(height = start_height, "checkpoint initialized");

    let mut engine = DecisionEngine::new(gateway, notifier, retry);

    match registry.load_existing().await {
        Ok(loaded) => info!(pools = loaded, "startup enumeration complete"),
        // The agent can still run on event-discovered pools.
        Err(e) => error!(error = %e, "startup enumeration failed"),
    }

    let reminder_window = Duration::from_secs(config.agent.reminder_hours_before * 3600);
    run_sweep(&registry, &mut engine, reminder_window).await;

    let mut poll_tick =
        tokio::time::interval(Duration::from_secs(config.chain.poll_interval_secs.max(1)));
    poll_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut sweep_tick = tokio::time::interval(Duration::from_secs(
        config.agent.scan_interval_minutes.max(1) * 60,
    ));
    sweep_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    sweep_tick.tick().await; // first sweep already ran

    // Single driver task: polls and sweeps never overlap, so the checkpoint
    // and dedup ledger need no cross-task coordination.
    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                if let Err(e) = scanner.poll().await {
                    warn!(error = %e, last_block = scanner.last_block(), "poll failed, window will be retried");
                }
            }
            _ = sweep_tick.tick() => {
                run_sweep(&registry, &mut engine, reminder_window).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(last_block = scanner.last_block(), "shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

/// One full decision cycle: refresh every pool, classify each snapshot,
/// dispatch whatever came out.
async fn run_sweep(
    registry: &Arc<PoolRegistry>,
    engine: &mut DecisionEngine,
    reminder_window: Duration,
) {
    let stats = registry.sweep_all().await;
    info!(
        refreshed = stats.refreshed,
        failed = stats.failed,
        "sweep complete"
    );

    let now = unix_now();
    let conditions: Vec<ActionableCondition> = registry
        .snapshots()
        .iter()
        .filter_map(|snapshot| evaluate(snapshot, now, reminder_window))
        .collect();

    engine.process(conditions).await;
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
