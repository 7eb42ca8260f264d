mod common;

use beacon_core::Beacon;
use beacon_core::prelude::{Amount, Side};
use common::{MockLedgerClient, SingleLedgerRegistry, test_config, token, user};
use std::sync::Arc;

const BASE_T: u64 = 100_000_000;
const DAY_NS: u64 = 24 * 60 * 60 * 1_000_000_000;

async fn setup_with_ttls(order_ttl_ns: u64, delist_ttl_ns: u64) -> (Beacon, Arc<MockLedgerClient>, beacon_core::prelude::TokenId, beacon_core::prelude::TokenId) {
    let payment = token(1);
    let traded = token(2);
    let ledger = Arc::new(MockLedgerClient::new("TKN", 8, Amount::ZERO));
    let registry = Arc::new(SingleLedgerRegistry(ledger.clone()));
    let mut config = test_config(payment);
    config.listing_price_payment = 0;
    config.order_ttl_ns = order_ttl_ns;
    config.delist_ttl_ns = delist_ttl_ns;
    let beacon = Beacon::new(config, registry);
    beacon.list_token(user(1), traded, 0).await.unwrap();
    (beacon, ledger, payment, traded)
}

#[tokio::test]
async fn janitor_closes_orders_older_than_order_ttl_and_unlocks_funds() {
    let (beacon, ledger, payment, traded) = setup_with_ttls(DAY_NS, 100 * DAY_NS).await;
    let buyer = user(10);

    ledger.fund_subaccount(buyer, Amount::from(1_000u64));
    beacon.deposit_liquidity(buyer, payment).await.unwrap();
    beacon.trade(buyer, traded, Amount::from(100u64), Amount::from(1_000_000_000u64), Side::Buy, 0).await.unwrap();

    assert_eq!(beacon.orders(traded, Side::Buy).await.len(), 1);

    let report = beacon.janitor_tick(2 * DAY_NS, 100).await.unwrap();
    assert_eq!(report.orders_closed, 1);
    assert!(beacon.orders(traded, Side::Buy).await.is_empty());

    let rows = beacon.token_balances(buyer).await;
    let (_, row) = rows.iter().find(|(t, _)| *t == payment).unwrap();
    assert_eq!(row.liquid, Amount::from(1_000u64));
    assert_eq!(row.locked, Amount::ZERO);
}

#[tokio::test]
async fn janitor_leaves_fresh_orders_untouched() {
    let (beacon, ledger, payment, traded) = setup_with_ttls(DAY_NS, 100 * DAY_NS).await;
    let buyer = user(11);

    ledger.fund_subaccount(buyer, Amount::from(1_000u64));
    beacon.deposit_liquidity(buyer, payment).await.unwrap();
    beacon.trade(buyer, traded, Amount::from(100u64), Amount::from(1_000_000_000u64), Side::Buy, DAY_NS).await.unwrap();

    let report = beacon.janitor_tick(DAY_NS + 1, 100).await.unwrap();
    assert_eq!(report.orders_closed, 0);
    assert_eq!(beacon.orders(traded, Side::Buy).await.len(), 1);
}

#[tokio::test]
async fn janitor_delists_a_token_with_no_activity_and_no_open_orders() {
    let (beacon, _ledger, _payment, traded) = setup_with_ttls(100 * DAY_NS, DAY_NS).await;

    let report = beacon.janitor_tick(2 * DAY_NS, 100).await.unwrap();
    assert_eq!(report.tokens_delisted, 1);
    assert!(!beacon.tokens().await.contains_key(&traded));
}

#[tokio::test]
async fn janitor_does_not_delist_a_token_with_open_orders() {
    let (beacon, ledger, payment, traded) = setup_with_ttls(100 * DAY_NS, DAY_NS).await;
    let buyer = user(12);

    ledger.fund_subaccount(buyer, Amount::from(1_000u64));
    beacon.deposit_liquidity(buyer, payment).await.unwrap();
    beacon.trade(buyer, traded, Amount::from(100u64), Amount::from(1_000_000_000u64), Side::Buy, 0).await.unwrap();

    let report = beacon.janitor_tick(2 * DAY_NS, 100).await.unwrap();
    assert_eq!(report.tokens_delisted, 0);
    assert!(beacon.tokens().await.contains_key(&traded));
}

#[tokio::test]
async fn janitor_batch_bounds_how_many_orders_close_in_one_tick() {
    let (beacon, ledger, payment, traded) = setup_with_ttls(DAY_NS, 100 * DAY_NS).await;

    for n in 0..5u8 {
        let buyer = user(20 + n);
        ledger.fund_subaccount(buyer, Amount::from(1_000u64));
        beacon.deposit_liquidity(buyer, payment).await.unwrap();
        beacon
            .trade(buyer, traded, Amount::from(10u64), Amount::from(1_000_000_000u64 + n as u64), Side::Buy, 0)
            .await
            .unwrap();
    }

    let report = beacon.janitor_tick(2 * DAY_NS, 2).await.unwrap();
    assert_eq!(report.orders_closed, 2);
    assert_eq!(beacon.orders(traded, Side::Buy).await.len(), 3);
}
