mod common;

use beacon_core::prelude::{Book, BookKey, Order, Side};
use common::{token, user};
use crypto_bigint::U256;

#[test]
fn massive_order_insertion() {
    let mut book = Book::new();
    for i in 0..100_000u64 {
        book.insert(Order::new(
            user((i % 250) as u8),
            Side::Buy,
            token(1),
            U256::from(1000 - (i % 1000)),
            U256::from(10u64),
            1000 + i,
            20,
        ));
    }
    assert_eq!(book.iter(Side::Buy).count(), 100_000);
}

#[test]
fn massive_order_cancellation() {
    let mut book = Book::new();
    let mut keys: Vec<BookKey> = Vec::with_capacity(50_000);
    for i in 0..50_000u64 {
        let order = Order::new(
            user((i % 250) as u8),
            Side::Sell,
            token(1),
            U256::from(1000 + (i % 500)),
            U256::from(10u64),
            2000 + i,
            20,
        );
        keys.push(order.book_key());
        book.insert(order);
    }

    for key in keys.iter().step_by(2) {
        assert!(book.cancel(Side::Sell, key).is_some());
    }

    assert_eq!(book.iter(Side::Sell).count(), 25_000);
}

#[test]
fn best_price_updates_correctly_through_heavy_churn() {
    let mut book = Book::new();
    for i in 0..10_000u64 {
        book.insert(Order::new(
            user((i % 250) as u8),
            Side::Sell,
            token(1),
            U256::from(10_000 - i),
            U256::from(1u64),
            i,
            20,
        ));
    }
    // The lowest price inserted (i = 9999) is the best ask.
    assert_eq!(book.best(Side::Sell).unwrap().price, U256::from(1u64));
}
