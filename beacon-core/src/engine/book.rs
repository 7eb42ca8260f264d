use crate::prelude::{Amount, BookKey, EngineError, Order, Price, Side, TokenId, UserId};
use std::collections::{BTreeMap, HashMap};

/// One traded token's two sides. `BookKey`'s `Ord` impl already encodes the
/// side-dependent priority (§4.C), so each side is a plain ordered map —
/// there is exactly one writer (the matcher, per §5), so no lock-free
/// structure is needed the way the teacher's concurrently-matched
/// `crossbeam_skiplist::SkipList` was.
#[derive(Debug, Default, Clone)]
pub struct Book {
    buys: BTreeMap<BookKey, Order>,
    sells: BTreeMap<BookKey, Order>,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    fn side_map(&self, side: Side) -> &BTreeMap<BookKey, Order> {
        match side {
            Side::Buy => &self.buys,
            Side::Sell => &self.sells,
        }
    }

    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<BookKey, Order> {
        match side {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        }
    }

    /// Inserts a resting maker order. O(log n).
    pub fn insert(&mut self, order: Order) {
        let key = order.book_key();
        self.side_map_mut(order.side).insert(key, order);
    }

    /// Removes the order at `key`, if present. Idempotent: removing an
    /// absent key is a no-op, per §5's `close_order` idempotence.
    pub fn cancel(&mut self, side: Side, key: &BookKey) -> Option<Order> {
        self.side_map_mut(side).remove(key)
    }

    /// The best (highest-priority) resting order on `side`, if any.
    pub fn best(&self, side: Side) -> Option<&Order> {
        self.side_map(side).values().next()
    }

    /// All resting orders on `side`, best-first.
    pub fn iter(&self, side: Side) -> impl Iterator<Item = &Order> {
        self.side_map(side).values()
    }

    /// Keys of orders older than `cutoff_ns` on both sides, for the janitor
    /// sweep.
    pub fn expired(&self, cutoff_ns: u64) -> Vec<BookKey> {
        self.buys
            .keys()
            .chain(self.sells.keys())
            .filter(|key| key.timestamp_ns < cutoff_ns)
            .copied()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty()
    }

    /// Walks the opposite side of `taker_side` in priority order, yielding
    /// the keys of maker orders that cross `limit_price` (`None` for a
    /// market order, which crosses any resting price) and skipping the
    /// taker's own resting orders (self-trade prohibition, §4.C).
    ///
    /// Mirrors the teacher's `walking_book_maker` callback-walk, generalized
    /// from an `FnMut` visitor into an owned `Vec` snapshot of matchable
    /// keys: the matcher mutates and sometimes removes entries while
    /// iterating, and `BTreeMap` (unlike the teacher's lock-free skip list)
    /// cannot have entries removed mid-iteration without invalidating the
    /// borrow.
    pub fn matchable_keys(&self, taker_side: Side, taker: UserId, limit_price: Option<Price>) -> Vec<BookKey> {
        let opposite = taker_side.opposite();
        self.side_map(opposite)
            .keys()
            .take_while(|key| match limit_price {
                None => true,
                Some(limit) => match opposite {
                    Side::Buy => key.price >= limit,
                    Side::Sell => key.price <= limit,
                },
            })
            .filter(|key| key.owner != taker)
            .copied()
            .collect()
    }

    pub fn get(&self, side: Side, key: &BookKey) -> Option<&Order> {
        self.side_map(side).get(key)
    }
}

/// Registry of one `Book` per listed token.
#[derive(Debug, Default)]
pub struct Books {
    books: HashMap<TokenId, Book>,
}

impl Books {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, token: TokenId) {
        self.books.entry(token).or_insert_with(Book::new);
    }

    pub fn remove(&mut self, token: TokenId) {
        self.books.remove(&token);
    }

    pub fn get(&self, token: TokenId) -> Option<&Book> {
        self.books.get(&token)
    }

    pub fn get_mut(&mut self, token: TokenId) -> Option<&mut Book> {
        self.books.get_mut(&token)
    }

    pub fn require(&self, token: TokenId) -> Result<&Book, EngineError> {
        self.books
            .get(&token)
            .ok_or_else(|| EngineError::validation(format!("token {token} is not listed")))
    }

    pub fn require_mut(&mut self, token: TokenId) -> Result<&mut Book, EngineError> {
        self.books
            .get_mut(&token)
            .ok_or_else(|| EngineError::validation(format!("token {token} is not listed")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TokenId, &Book)> {
        self.books.iter()
    }

    pub fn contains(&self, token: TokenId) -> bool {
        self.books.contains_key(&token)
    }
}

/// The amount a resting order holds locked, in the token its lock is
/// denominated in (the traded token for a sell, the payment token for a
/// buy). Component H's per-order invariant checks (§8, properties 2 and 3)
/// read this to cross-check `VirtualBalances`.
pub fn required_lock_of(order: &Order, payment_base: Amount) -> (TokenId, Amount) {
    match order.side {
        Side::Sell => (order.token, order.amount_remaining()),
        Side::Buy => {
            let locked = crate::prelude::mul_div_ceil(order.amount_remaining(), order.price, payment_base)
                .expect("resting buy order's locked amount was checked to fit in U256 at insertion time");
            (order.token, locked)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::Order;
    use crypto_bigint::U256;

    fn user(n: u8) -> UserId {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        UserId::new(bytes)
    }

    fn token() -> TokenId {
        TokenId::new([7u8; 32])
    }

    fn order(owner_n: u8, side: Side, price: u64, amount: u64, ts: u64) -> Order {
        Order::new(user(owner_n), side, token(), U256::from(price), U256::from(amount), ts, 20)
    }

    #[test]
    fn best_sell_is_lowest_price() {
        let mut book = Book::new();
        book.insert(order(1, Side::Sell, 110, 10, 1000));
        book.insert(order(2, Side::Sell, 100, 10, 1001));
        assert_eq!(book.best(Side::Sell).unwrap().price, U256::from(100u64));
    }

    #[test]
    fn best_buy_is_highest_price() {
        let mut book = Book::new();
        book.insert(order(1, Side::Buy, 90, 10, 1000));
        book.insert(order(2, Side::Buy, 100, 10, 1001));
        assert_eq!(book.best(Side::Buy).unwrap().price, U256::from(100u64));
    }

    #[test]
    fn fifo_within_same_price() {
        let mut book = Book::new();
        book.insert(order(1, Side::Sell, 100, 10, 1005));
        book.insert(order(2, Side::Sell, 100, 10, 1000));
        assert_eq!(book.best(Side::Sell).unwrap().owner, user(2));
    }

    #[test]
    fn matchable_keys_excludes_self_trade_and_stops_at_limit() {
        let mut book = Book::new();
        book.insert(order(1, Side::Sell, 100, 10, 1000)); // taker's own order
        book.insert(order(2, Side::Sell, 105, 10, 1001));
        book.insert(order(3, Side::Sell, 120, 10, 1002)); // beyond limit

        let keys = book.matchable_keys(Side::Buy, user(1), Some(U256::from(110u64)));
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].owner, user(2));
    }

    #[test]
    fn market_order_limit_price_none_crosses_everything() {
        let mut book = Book::new();
        book.insert(order(2, Side::Sell, 100, 10, 1000));
        book.insert(order(3, Side::Sell, 99999, 10, 1001));
        let keys = book.matchable_keys(Side::Buy, user(1), None);
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn cancel_is_idempotent_on_absent_key() {
        let mut book = Book::new();
        let o = order(1, Side::Buy, 100, 10, 1000);
        let key = o.book_key();
        assert!(book.cancel(Side::Buy, &key).is_none());
        book.insert(o);
        assert!(book.cancel(Side::Buy, &key).is_some());
        assert!(book.cancel(Side::Buy, &key).is_none());
    }
}
