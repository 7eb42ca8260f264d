use crypto_bigint::{CheckedAdd, CheckedMul, NonZero, U256, U512, Zero};
use mimalloc::MiMalloc;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeAs, SerializeAs, serde_as};
use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

/// Global allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Amount is the type used for token quantities, in the token's smallest unit.
/// Arithmetic over amounts is always exact; no floating point appears anywhere
/// in the engine.
pub type Amount = U256;

/// Price is the payment-token cost, in smallest units, of `BASE(t)` units of
/// the traded token. `Price::ZERO` denotes a market order.
pub type Price = U256;

/// Side indicates the direction of an order.
#[derive(PartialEq, Eq, Default, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum Side {
    /// Buy means the user wants to acquire the traded token, paying in the payment token.
    #[default]
    Buy,
    /// Sell means the user wants to dispose of the traded token, receiving the payment token.
    Sell,
}

impl Side {
    /// The side a resting maker order must be on to match an incoming order of `self`.
    #[inline(always)]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Principal is an opaque 32-byte identifier. Both token identities (one per
/// external fungible ledger) and user identities reuse this shape, following
/// the same "principal" convention a fungible-ledger canister uses for
/// accounts and callers alike.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Principal(pub [u8; 32]);

impl Principal {
    /// The distinguished virtual user that accumulates collected fees.
    pub const FEE_ACCOUNT: Principal = Principal([0xffu8; 32]);

    /// The distinguished virtual user representing the contract's own main
    /// account on each external ledger — the destination of every
    /// `deposit_liquidity` transfer-in.
    pub const CUSTODY_ACCOUNT: Principal = Principal([0xfeu8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Principal(bytes)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", hex::encode(self.0))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Principal {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Principal(bytes))
    }
}

/// TokenId identifies one external ledger's asset.
pub type TokenId = Principal;

/// UserId identifies a caller of the exchange.
pub type UserId = Principal;

/// Serializes a [`crypto_bigint::U256`] as a decimal string, the way
/// on-chain fungible-ledger wire formats represent unbounded integers.
/// Grounded on `gnosis-solvers`' `util::serialize::u256::U256` adapter.
#[derive(Debug)]
pub struct AmountAsDecimalString;

impl SerializeAs<Amount> for AmountAsDecimalString {
    fn serialize_as<S: serde::Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }
}

impl<'de> DeserializeAs<'de, Amount> for AmountAsDecimalString {
    fn deserialize_as<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut value = Amount::ZERO;
        let ten = Amount::from(10u64);
        for c in s.chars() {
            let digit = c
                .to_digit(10)
                .ok_or_else(|| serde::de::Error::custom("invalid decimal digit"))?;
            value = value
                .checked_mul(&ten)
                .into_option()
                .ok_or_else(|| serde::de::Error::custom("amount overflow"))?;
            value = value
                .checked_add(&Amount::from(digit as u64))
                .into_option()
                .ok_or_else(|| serde::de::Error::custom("amount overflow"))?;
        }
        Ok(value)
    }
}

/// Returns `10^decimals` as an [`Amount`], i.e. `BASE(t)` for a token with
/// `decimals` smallest-unit digits.
pub fn base_of(decimals: u32) -> Amount {
    let mut value = Amount::from(1u64);
    let ten = Amount::from(10u64);
    for _ in 0..decimals {
        value = value
            .checked_mul(&ten)
            .into_option()
            .expect("decimals <= 24 never overflows U256");
    }
    value
}

/// Zero-extends a `U256` into a `U512`, so a full-precision widening
/// multiply can never lose bits regardless of the truncating semantics of
/// same-width multiplication. Grounded on the teacher's
/// `slippage_bound_price` widen/multiply/divide/narrow technique
/// (`engine/types.rs` in `apex-core`).
fn widen(x: U256) -> U512 {
    let mut words = [0u64; 8];
    words[..4].copy_from_slice(&x.to_words());
    U512::from_words(words)
}

/// Narrows a `U512` back into a `U256`, returning `None` if the high half is
/// non-zero (the value does not fit).
fn narrow(x: U512) -> Option<Amount> {
    let (lo, hi) = x.split();
    if hi.is_zero().into() { Some(lo) } else { None }
}

/// `floor(amount * price / base)`, widened so the intermediate product can
/// never overflow.
pub fn mul_div_floor(amount: Amount, price: Price, base: Amount) -> Option<Amount> {
    let product = widen(amount).checked_mul(&widen(price)).into_option()?;
    let base_nz = NonZero::new(widen(base)).into_option()?;
    let (quotient, _remainder) = product.div_rem(&base_nz);
    narrow(quotient)
}

/// `ceil(amount * price / base)`.
pub fn mul_div_ceil(amount: Amount, price: Price, base: Amount) -> Option<Amount> {
    let product = widen(amount).checked_mul(&widen(price)).into_option()?;
    let base_nz = NonZero::new(widen(base)).into_option()?;
    let (quotient, remainder) = product.div_rem(&base_nz);
    let quotient = if remainder.is_zero().into() {
        quotient
    } else {
        quotient.checked_add(&U512::from(1u64)).into_option()?
    };
    narrow(quotient)
}

/// Applies `FEE_BPS` to a gross payment, rounding to the nearest unit with
/// ties rounded down (`round_half_down`), per the rounding policy in §4.D.
pub fn fee_round_half_down(gross: Amount, fee_bps: u16) -> Amount {
    let numerator = widen(gross)
        .checked_mul(&U512::from(fee_bps as u64))
        .expect("fee_bps * gross fits in U512");
    let doubled = numerator
        .checked_mul(&U512::from(2u64))
        .expect("doubling for half-down rounding fits in U512");
    // floor(2 * gross * fee_bps / 10_000), then halved with floor division,
    // implements round-half-down (an exact tie rounds to the lower unit).
    let (double_quotient, _) = doubled.div_rem(&NonZero::new(U512::from(20_000u64)).unwrap());
    let (quotient, _) = double_quotient.div_rem(&NonZero::new(U512::from(2u64)).unwrap());
    narrow(quotient).expect("fee is always <= gross, which fits in U256")
}

/// Key under which an order sits in a per-token, per-side ordered book.
///
/// Ordering semantics (grounded on `apex-core`'s `BookKey`/`Ord` impl,
/// generalized with an explicit `owner` tiebreak per spec's "within
/// identical timestamp, break by owner" rule):
/// - Buy: higher price first, then earlier timestamp, then owner.
/// - Sell: lower price first, then earlier timestamp, then owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookKey {
    pub price: Price,
    pub timestamp_ns: u64,
    pub owner: UserId,
    pub side: Side,
}

impl Ord for BookKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let price_order = match self.side {
            Side::Buy => self.price.cmp(&other.price).reverse(),
            Side::Sell => self.price.cmp(&other.price),
        };
        price_order
            .then(self.timestamp_ns.cmp(&other.timestamp_ns))
            .then(self.owner.cmp(&other.owner))
    }
}

impl PartialOrd for BookKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A resting maker order. Only limit orders ever reach the book (`price >
/// 0`); market orders are matched and discarded within a single `trade()`
/// call and never constructed as an `Order`.
#[derive(Debug, Clone)]
pub struct Order {
    pub owner: UserId,
    pub side: Side,
    pub token: TokenId,
    pub price: Price,
    pub timestamp_ns: u64,
    /// Remaining unfilled quantity. Mutated only by the matching engine,
    /// which holds exclusive access to the whole engine for the duration of
    /// one `trade()` call (§5) — a plain `Cell` is enough; there is no
    /// concurrent access to guard against the way the teacher's multi-
    /// threaded matching engine needed `UnsafeCell` + atomics for.
    pub amount_remaining: Cell<Amount>,
    /// `FEE_BPS` in effect when this order was created, so a later config
    /// change never retroactively changes a resting order's economics.
    pub fee_bps_snapshot: u16,
}

impl Order {
    pub fn new(
        owner: UserId,
        side: Side,
        token: TokenId,
        price: Price,
        amount: Amount,
        timestamp_ns: u64,
        fee_bps_snapshot: u16,
    ) -> Self {
        Self {
            owner,
            side,
            token,
            price,
            timestamp_ns,
            amount_remaining: Cell::new(amount),
            fee_bps_snapshot,
        }
    }

    #[inline(always)]
    pub fn book_key(&self) -> BookKey {
        BookKey {
            price: self.price,
            timestamp_ns: self.timestamp_ns,
            owner: self.owner,
            side: self.side,
        }
    }

    #[inline(always)]
    pub fn amount_remaining(&self) -> Amount {
        self.amount_remaining.get()
    }

    #[inline(always)]
    pub(crate) fn reduce(&self, filled: Amount) {
        self.amount_remaining.set(self.amount_remaining.get() - filled);
    }
}

/// TradeRole mirrors the resting/incoming distinction of a fill.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TradeRole {
    Maker,
    Taker,
}

/// Archived record of one atomic fill between a resting maker order and the
/// incoming taker order.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub token: TokenId,
    pub maker: UserId,
    pub taker: UserId,
    pub side_of_taker: Side,
    #[serde_as(as = "AmountAsDecimalString")]
    pub amount: Amount,
    #[serde_as(as = "AmountAsDecimalString")]
    pub price: Amount,
    pub timestamp_ns: u64,
    #[serde_as(as = "AmountAsDecimalString")]
    pub taker_fee: Amount,
    #[serde_as(as = "AmountAsDecimalString")]
    pub maker_fee: Amount,
}

/// Metadata and lifecycle state of one listed token.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: TokenId,
    pub symbol: String,
    pub decimals: u32,
    pub ledger_transfer_fee: Amount,
    pub logo: String,
    pub listed_at: u64,
    pub last_activity_ns: u64,
    /// The engine's last-observed custody of this token at its external
    /// ledger: the running total of what `deposit_liquidity`/`withdraw`
    /// have moved in and out of the contract's main account. Component H
    /// checks this against `VirtualBalances::total_escrowed` after every
    /// mutation (§4.B, §4.H).
    pub custody_observed: Amount,
}

/// A (liquid, locked) balance row for one (user, token) pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceRow {
    pub liquid: Amount,
    pub locked: Amount,
}

/// Outcome of a `trade()` call, per the §6 RPC surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderExecution {
    /// Fully consumed by the book; no resting order remains.
    Filled(Amount),
    /// Partially filled; the remainder now rests in the book.
    FilledAndOrderCreated(Amount),
}

/// The last trade observed for a token, used by the `prices()` query.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastTrade {
    #[serde_as(as = "AmountAsDecimalString")]
    pub price: Amount,
    pub timestamp_ns: u64,
}

/// Process-wide statistics exposed by the `data()` query.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStats {
    pub fee_bps: u16,
    #[serde_as(as = "AmountAsDecimalString")]
    pub volume_day: Amount,
    pub trades_day: u64,
    #[serde_as(as = "AmountAsDecimalString")]
    pub payment_token_locked: Amount,
    pub tokens_listed: u64,
    pub active_traders: u64,
}
