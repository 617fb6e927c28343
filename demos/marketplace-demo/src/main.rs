//! Fulfillment and settlement walkthrough.
//!
//! Drives one customer, one vendor, one pickup agent and one admin through
//! checkout, pickup, a refund and the payout rules, then prints the metrics
//! the store recorded.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info cargo run -p marketplace-demo
//! ```

use anyhow::{Context, bail, ensure};
use marketplace_core::payout::PayoutDecision;
use marketplace_core::returns::{ReturnDecision, ReturnReason};
use marketplace_core::{FulfillmentStatus, MarketplaceError, Money, OrderId};
use marketplace_fulfillment::analytics::Period;
use marketplace_fulfillment::orders::{OrderLine, OrderView, PlaceOrder};
use marketplace_fulfillment::{LedgerEnvironment, MarketplaceConfig};
use marketplace_runtime::metrics::MetricsExporter;
use marketplace_runtime::{MarketplaceStore, RetryPolicy, retry_on_conflict, telemetry};
use marketplace_testing::fixtures::{bank, line};
use marketplace_testing::{Cast, InMemoryEventStore};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MarketplaceConfig::from_env().context("loading configuration")?;
    telemetry::init(&config)?;
    let mut exporter = MetricsExporter::new();
    exporter.install()?;

    info!("=== Marketplace fulfillment & settlement demo ===");

    let store = Arc::new(MarketplaceStore::new(
        Arc::new(InMemoryEventStore::new()),
        LedgerEnvironment::production(config),
    ));
    let cast = Cast::new();

    commission_is_frozen(&store, &cast).await?;
    refund_is_deducted_once(&store, &cast).await?;
    payouts_respect_the_balance(&store, &Cast::new()).await?;
    racing_payouts(&store, &Cast::new()).await?;

    let risk = store.vendor_risk(Period::Month).await;
    for vendor in &risk {
        info!(
            vendor = %vendor.vendor_id,
            score = vendor.score,
            level = %vendor.level,
            "Vendor risk"
        );
    }

    if let Some(rendered) = exporter.render() {
        println!("{rendered}");
    }
    Ok(())
}

async fn deliver(
    store: &MarketplaceStore,
    cast: &Cast,
    lines: Vec<OrderLine>,
) -> anyhow::Result<OrderView> {
    let view = store
        .place_order(
            cast.customer,
            PlaceOrder {
                order_id: OrderId::new(),
                agent_id: cast.agent.user_id,
                lines,
                discount: Money::ZERO,
                tax: Money::ZERO,
                shipping: Money::ZERO,
                coupon: None,
                expected_total: None,
            },
        )
        .await?;
    let order_id = view.order.id;
    for (from, to) in [
        (FulfillmentStatus::Pending, FulfillmentStatus::Processing),
        (FulfillmentStatus::Processing, FulfillmentStatus::ReadyForPickup),
    ] {
        for item in &view.items {
            store.advance_item_status(cast.vendor, item.id, from, to).await?;
        }
    }
    let code = store.issue_pickup_code(cast.agent, order_id).await?;
    Ok(store
        .verify_and_consume_code(cast.agent, order_id, code.as_str())
        .await?)
}

/// Two units at 10.00 with a 10% commission net the vendor 18.00.
async fn commission_is_frozen(store: &MarketplaceStore, cast: &Cast) -> anyhow::Result<()> {
    deliver(store, cast, vec![line(cast.vendor.user_id, 2, 1000, 10)]).await?;
    let balance = store.vendor_balance(cast.vendor.user_id).await;
    info!(net = %balance.net, "Delivered 2 x 10.00 at 10% commission");
    ensure!(balance.net == Money::from_cents(1800), "expected 18.00, got {}", balance.net);
    Ok(())
}

/// A 5.00 refund approved once and completed twice is deducted once.
async fn refund_is_deducted_once(store: &MarketplaceStore, cast: &Cast) -> anyhow::Result<()> {
    let vendor = cast.vendor.user_id;
    let before = store.vendor_balance(vendor).await.net;
    let view = deliver(store, cast, vec![line(vendor, 2, 1000, 10)]).await?;

    let request = store
        .request_return(
            cast.customer,
            view.items[0].id,
            ReturnReason::Damaged,
            "Box was crushed",
            Money::from_cents(500),
        )
        .await?;
    store
        .decide_return(cast.vendor, request.id, ReturnDecision::Approve, None)
        .await?;
    store.complete_return(cast.admin, request.id).await?;
    match store.complete_return(cast.admin, request.id).await {
        Err(MarketplaceError::PreconditionFailed(reason)) => {
            info!(%reason, "Second completion rejected");
        },
        other => bail!("second completion should be rejected, got {other:?}"),
    }

    let contribution = store.vendor_balance(vendor).await.net - before;
    info!(%contribution, "Refunded 5.00 on an 18.00 line");
    ensure!(contribution == Money::from_cents(1300), "expected 13.00, got {contribution}");
    Ok(())
}

/// 50.00 available: 60.00 is refused, 30.00 is held, a second 30.00 sees
/// only 20.00 left.
async fn payouts_respect_the_balance(store: &MarketplaceStore, cast: &Cast) -> anyhow::Result<()> {
    let vendor = cast.vendor.user_id;
    deliver(store, cast, vec![line(vendor, 5, 1000, 0)]).await?;

    match store.request_payout(cast.vendor, Money::from_cents(6000), bank()).await {
        Err(MarketplaceError::InsufficientBalance { available, .. }) => {
            info!(%available, "60.00 payout refused");
        },
        other => bail!("expected insufficient balance, got {other:?}"),
    }

    let held = store.request_payout(cast.vendor, Money::from_cents(3000), bank()).await?;
    info!(reference = %held.reference, status = %held.status, "30.00 payout requested");

    match store.request_payout(cast.vendor, Money::from_cents(3000), bank()).await {
        Err(MarketplaceError::InsufficientBalance { available, .. }) => {
            ensure!(available == Money::from_cents(2000), "expected 20.00 left, got {available}");
            info!(%available, "Second 30.00 payout refused");
        },
        other => bail!("expected insufficient balance, got {other:?}"),
    }

    store.mark_payout_processing(cast.admin, held.id).await?;
    let paid = store
        .decide_payout(cast.admin, held.id, PayoutDecision::Approve, None)
        .await?;
    info!(status = %paid.status, "Payout sent");
    Ok(())
}

/// Two concurrent 30.00 requests against 50.00: exactly one is held.
async fn racing_payouts(store: &Arc<MarketplaceStore>, cast: &Cast) -> anyhow::Result<()> {
    deliver(store, cast, vec![line(cast.vendor.user_id, 5, 1000, 0)]).await?;

    let policy = RetryPolicy::from_config(&store.environment().config);
    let requests = (0..2).map(|_| {
        let store = Arc::clone(store);
        let policy = policy.clone();
        let vendor = cast.vendor;
        tokio::spawn(async move {
            retry_on_conflict(policy, || {
                store.request_payout(vendor, Money::from_cents(3000), bank())
            })
            .await
        })
    });
    let mut accepted = 0;
    for result in futures::future::join_all(requests).await {
        match result? {
            Ok(_) => accepted += 1,
            Err(error) => info!(code = error.code(), %error, "Racing payout refused"),
        }
    }
    ensure!(accepted == 1, "expected one accepted payout, got {accepted}");

    let balance = store.vendor_balance(cast.vendor.user_id).await;
    info!(held = %balance.held, available = %balance.available, "After the race");
    Ok(())
}
