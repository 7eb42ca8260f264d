use crate::prelude::{
    Amount, Books, EngineError, LedgerClient, ListingError, Principal, TokenId, TokenRecord, VirtualBalances,
    invariants,
};
use crate::EngineState;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::instrument;

/// `list_token` (§4.F). Fetches metadata from the ledger (the call's
/// suspension point), then commits atomically: charge the listing fee,
/// insert the `TokenRecord`, create its empty `Book`. Any failure along the
/// way — unknown ledger, fee transfer failure, duplicate listing — leaves
/// no partial state (no `TokenRecord`, no `Book`).
#[instrument(skip(state, ledger), fields(%token, %caller))]
pub async fn list_token(
    state: &Mutex<EngineState>,
    ledger: &dyn LedgerClient,
    caller: Principal,
    token: TokenId,
    now_ns: u64,
) -> Result<(), EngineError> {
    {
        let guard = state.lock().await;
        if guard.records.contains_key(&token) {
            return Err(ListingError::AlreadyListed.into());
        }
    }

    let metadata = ledger.metadata(token).await?;

    let mut guard = state.lock().await;
    if guard.records.contains_key(&token) {
        return Err(ListingError::AlreadyListed.into());
    }

    let payment_token = guard.config.payment_token.ok_or_else(|| {
        EngineError::validation("payment_token must be configured via set_payment_token before listing")
    })?;
    let listing_fee = guard.config.listing_price_payment_amount();
    let balances_snapshot = guard.balances.clone();
    charge_listing_fee(&mut guard.balances, caller, payment_token, listing_fee)?;

    guard.books.create(token);
    guard.records.insert(
        token,
        TokenRecord {
            id: token,
            symbol: metadata.symbol,
            decimals: metadata.decimals,
            ledger_transfer_fee: metadata.transfer_fee,
            logo: metadata.logo,
            listed_at: now_ns,
            last_activity_ns: now_ns,
            custody_observed: Amount::ZERO,
        },
    );

    if let Err(err) = invariants::verify(&guard.balances, &guard.books, &guard.records) {
        guard.balances = balances_snapshot;
        guard.books.remove(token);
        guard.records.remove(&token);
        return Err(err);
    }
    Ok(())
}

fn charge_listing_fee(
    balances: &mut VirtualBalances,
    caller: Principal,
    payment_token: TokenId,
    fee: Amount,
) -> Result<(), EngineError> {
    balances.debit_liquid(caller, payment_token, fee)?;
    balances.credit_liquid(Principal::FEE_ACCOUNT, payment_token, fee);
    Ok(())
}

/// Delists a token that has had no activity and no open orders for
/// `delist_ttl_ns` (§4.G). Returns `Ok(false)` if the token isn't yet
/// eligible, `Ok(true)` if it was removed.
pub fn delist_if_inactive(
    books: &mut Books,
    records: &mut BTreeMap<TokenId, TokenRecord>,
    token: TokenId,
    now_ns: u64,
    delist_ttl_ns: u64,
) -> bool {
    let Some(record) = records.get(&token) else { return false };
    let inactive_long_enough = now_ns.saturating_sub(record.last_activity_ns) >= delist_ttl_ns;
    let has_open_orders = books.get(token).is_some_and(|b| !b.is_empty());
    if inactive_long_enough && !has_open_orders {
        books.remove(token);
        records.remove(&token);
        true
    } else {
        false
    }
}
