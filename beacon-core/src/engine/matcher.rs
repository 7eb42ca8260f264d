use crate::prelude::{
    Amount, Books, EngineError, ListingError, Order, OrderExecution, Price, Principal, Side, TokenId, TokenRecord,
    Trade, UserId, VirtualBalances, base_of, fee_round_half_down, invariants, mul_div_ceil, mul_div_floor,
};
use std::collections::BTreeMap;
use tracing::instrument;

/// The single atomic entry point of the engine (§4.D). Everything it touches
/// — `VirtualBalances`, the traded token's `Book`, the token's
/// `last_activity_ns` — is mutated in place and, on any failure, rolled back
/// to the snapshot taken at entry: no partial trade is ever observable.
///
/// Grounded on the teacher's `DefaultMatchingEngine::match_limit_order` /
/// `match_market_order`: the `walking_book_maker` callback walk generalizes
/// into the `for key in matchable_keys` loop below, and
/// `process_order_pair`'s maker/taker bookkeeping generalizes into the
/// per-fill settlement.
#[instrument(skip(balances, books, records), fields(%token, %caller))]
pub fn trade(
    balances: &mut VirtualBalances,
    books: &mut Books,
    records: &mut BTreeMap<TokenId, TokenRecord>,
    payment_token: TokenId,
    fee_bps: u16,
    caller: UserId,
    token: TokenId,
    amount: Amount,
    price: Price,
    side: Side,
    now_ns: u64,
) -> Result<(OrderExecution, Vec<Trade>), EngineError> {
    if amount == Amount::ZERO {
        return Err(EngineError::validation("amount must be greater than zero"));
    }
    let record = records.get(&token).ok_or(ListingError::NotListed)?;
    let base_t = base_of(record.decimals);
    let is_market = price == Price::ZERO;
    let lock_token = match side {
        Side::Buy => payment_token,
        Side::Sell => token,
    };

    // Snapshot everything this call can touch, for rollback on invariant failure.
    let balances_snapshot = balances.clone();
    let book_snapshot = books.get(token).cloned().unwrap_or_default();
    let record_snapshot = record.clone();

    let result = run_trade(
        balances, books, records, payment_token, fee_bps, caller, token, amount, price, side, now_ns, base_t,
        is_market, lock_token,
    );

    let (execution, trades) = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            *balances = balances_snapshot;
            if let Some(book) = books.get_mut(token) {
                *book = book_snapshot;
            }
            records.insert(token, record_snapshot);
            return Err(err);
        }
    };

    if let Err(err) = invariants::verify(balances, books, records) {
        *balances = balances_snapshot;
        if let Some(book) = books.get_mut(token) {
            *book = book_snapshot;
        }
        records.insert(token, record_snapshot);
        return Err(err);
    }

    Ok((execution, trades))
}

#[allow(clippy::too_many_arguments)]
fn run_trade(
    balances: &mut VirtualBalances,
    books: &mut Books,
    records: &mut BTreeMap<TokenId, TokenRecord>,
    payment_token: TokenId,
    fee_bps: u16,
    caller: UserId,
    token: TokenId,
    amount: Amount,
    price: Price,
    side: Side,
    now_ns: u64,
    base_t: Amount,
    is_market: bool,
    lock_token: TokenId,
) -> Result<(OrderExecution, Vec<Trade>), EngineError> {
    // Step 1: required_lock.
    let lock_amount = match (side, is_market) {
        (Side::Sell, _) => amount,
        (Side::Buy, false) => mul_div_ceil(amount, price, base_t)
            .ok_or_else(|| EngineError::validation("amount * price overflows while computing required lock"))?,
        (Side::Buy, true) => {
            let (liquid, _locked) = balances.read(caller, payment_token);
            if liquid == Amount::ZERO {
                return Err(EngineError::insufficient_liquidity(
                    "no liquid payment-token balance available for market buy",
                ));
            }
            liquid
        }
    };
    balances.lock(caller, lock_token, lock_amount)?;

    // Step 2: walk the opposite side.
    let limit_price = if is_market { None } else { Some(price) };
    let matchable = books.require(token)?.matchable_keys(side, caller, limit_price);

    let mut remaining = amount;
    let mut locked_consumed = Amount::ZERO;
    let mut trades = Vec::new();

    for key in matchable {
        if remaining == Amount::ZERO {
            break;
        }
        let book = books.require_mut(token)?;
        let maker_remaining = match book.get(key.side, &key) {
            Some(order) => order.amount_remaining(),
            None => continue,
        };

        let mut fill = if remaining < maker_remaining { remaining } else { maker_remaining };
        let mut gross_payment = mul_div_floor(fill, key.price, base_t)
            .ok_or_else(|| EngineError::validation("fill * maker price overflows computing gross payment"))?;

        // A market buy's lock is its whole liquid balance, not a price-derived
        // bound, so unlike a limit buy it can run out of locked funds mid-walk.
        // Clamp the fill to what remains lockable and stop once nothing more
        // is affordable, rather than overdrawing the taker's lock.
        if is_market && side == Side::Buy {
            let lock_remaining = lock_amount - locked_consumed;
            if lock_remaining == Amount::ZERO {
                break;
            }
            if gross_payment > lock_remaining {
                fill = mul_div_floor(lock_remaining, base_t, key.price)
                    .ok_or_else(|| EngineError::validation("lock_remaining * base overflows clamping market fill"))?;
                if fill > maker_remaining {
                    fill = maker_remaining;
                }
                if fill == Amount::ZERO {
                    break;
                }
                gross_payment = mul_div_floor(fill, key.price, base_t)
                    .ok_or_else(|| EngineError::validation("fill * maker price overflows computing gross payment"))?;
                if gross_payment == Amount::ZERO || gross_payment > lock_remaining {
                    break;
                }
            }
        }

        if gross_payment == Amount::ZERO {
            return Err(EngineError::validation("fill produces zero payment; increase amount or price"));
        }
        let taker_fee = fee_round_half_down(gross_payment, fee_bps);
        let maker_fee = fee_round_half_down(gross_payment, fee_bps);

        settle_fill(balances, side, caller, key.owner, token, payment_token, fill, gross_payment, taker_fee, maker_fee);

        match side {
            Side::Buy => locked_consumed += gross_payment,
            Side::Sell => locked_consumed += fill,
        }

        let maker_order = book.get(key.side, &key).expect("maker order present from matchable_keys snapshot");
        maker_order.reduce(fill);
        let maker_exhausted = maker_order.amount_remaining() == Amount::ZERO;
        if maker_exhausted {
            book.cancel(key.side, &key);
        }

        trades.push(Trade {
            token,
            maker: key.owner,
            taker: caller,
            side_of_taker: side,
            amount: fill,
            price: key.price,
            timestamp_ns: now_ns,
            taker_fee,
            maker_fee,
        });

        remaining -= fill;
    }

    if let Some(record) = records.get_mut(&token) {
        record.last_activity_ns = now_ns;
    }

    // Step 3: residual handling.
    let filled = amount - remaining;
    let held = lock_amount - locked_consumed;
    let execution = if remaining != Amount::ZERO && !is_market {
        // Limit order with leftover: keep exactly what the resting order still
        // needs locked, release any rounding slack, post the remainder.
        let order = Order::new(caller, side, token, price, remaining, now_ns, fee_bps);
        let (_, required) = crate::prelude::required_lock_of(&order, base_t);
        if held > required {
            balances.unlock(caller, lock_token, held - required);
        }
        books.require_mut(token)?.insert(order);
        OrderExecution::FilledAndOrderCreated(filled)
    } else {
        if held != Amount::ZERO {
            balances.unlock(caller, lock_token, held);
        }
        OrderExecution::Filled(filled)
    };

    Ok((execution, trades))
}

#[allow(clippy::too_many_arguments)]
fn settle_fill(
    balances: &mut VirtualBalances,
    taker_side: Side,
    taker: UserId,
    maker: UserId,
    token: TokenId,
    payment_token: TokenId,
    fill: Amount,
    gross_payment: Amount,
    taker_fee: Amount,
    maker_fee: Amount,
) {
    // The traded-token leg passes through untouched, so it settles via the
    // plain locked->liquid transfer; the payment-token leg carves out
    // taker_fee + maker_fee for FEE_ACCOUNT before crediting the rest, so it
    // can't go through the same single-recipient helper.
    let fee_total = taker_fee + maker_fee;
    match taker_side {
        Side::Buy => {
            balances.debit_locked(taker, payment_token, gross_payment);
            balances.credit_liquid(maker, payment_token, gross_payment - fee_total);
            balances.settle(maker, taker, token, fill);
        }
        Side::Sell => {
            balances.settle(taker, maker, token, fill);
            balances.debit_locked(maker, payment_token, gross_payment);
            balances.credit_liquid(taker, payment_token, gross_payment - fee_total);
        }
    }
    balances.credit_liquid(Principal::FEE_ACCOUNT, payment_token, fee_total);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_bigint::U256;

    fn user(n: u8) -> UserId {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        UserId::new(bytes)
    }

    fn token() -> TokenId {
        TokenId::new([3u8; 32])
    }

    fn setup() -> (VirtualBalances, Books, BTreeMap<TokenId, TokenRecord>) {
        let balances = VirtualBalances::new();
        let mut books = Books::new();
        books.create(token());
        let mut records = BTreeMap::new();
        records.insert(
            token(),
            TokenRecord {
                id: token(),
                symbol: "TKN".into(),
                decimals: 8,
                ledger_transfer_fee: Amount::ZERO,
                logo: String::new(),
                listed_at: 0,
                last_activity_ns: 0,
                custody_observed: Amount::ZERO,
            },
        );
        (balances, books, records)
    }

    #[test]
    fn resting_sell_filled_exactly_by_incoming_buy() {
        let (mut balances, mut books, mut records) = setup();
        let payment = TokenId::new([5u8; 32]);
        let base_t = base_of(8);
        let maker = user(1);
        let taker = user(2);

        balances.credit_liquid(maker, token(), base_t); // 1 full unit to sell
        balances.lock(maker, token(), base_t).unwrap();
        books
            .get_mut(token())
            .unwrap()
            .insert(Order::new(maker, Side::Sell, token(), U256::from(100u64), base_t, 1, 20));
        records.get_mut(&token()).unwrap().custody_observed = base_t;

        balances.credit_liquid(taker, payment, U256::from(100u64));

        let (execution, trades) = trade(
            &mut balances,
            &mut books,
            &mut records,
            payment,
            20,
            taker,
            token(),
            base_t,
            U256::from(100u64),
            Side::Buy,
            1000,
        )
        .unwrap();

        assert_eq!(execution, OrderExecution::Filled(base_t));
        assert_eq!(trades.len(), 1);
        assert!(books.get(token()).unwrap().is_empty());
        let (taker_liquid_token, _) = balances.read(taker, token());
        assert_eq!(taker_liquid_token, base_t);
    }

    #[test]
    fn unlisted_token_is_rejected() {
        let (mut balances, mut books, mut records) = setup();
        let other = TokenId::new([99u8; 32]);
        let result = trade(
            &mut balances,
            &mut books,
            &mut records,
            Principal::FEE_ACCOUNT,
            20,
            user(1),
            other,
            U256::from(1u64),
            U256::from(1u64),
            Side::Buy,
            0,
        );
        assert!(matches!(result, Err(EngineError::Listing(ListingError::NotListed))));
    }

    #[test]
    fn zero_amount_is_rejected() {
        let (mut balances, mut books, mut records) = setup();
        let result = trade(
            &mut balances,
            &mut books,
            &mut records,
            Principal::FEE_ACCOUNT,
            20,
            user(1),
            token(),
            Amount::ZERO,
            U256::from(1u64),
            Side::Buy,
            0,
        );
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }
}
