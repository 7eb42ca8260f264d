use crate::prelude::{Amount, Books, EngineError, Side, TokenId, TokenRecord, VirtualBalances, required_lock_of};
use std::collections::BTreeMap;

/// Component H: post-mutation checks run after every state transition
/// (`trade`, `deposit_liquidity`, `withdraw`, `list_token`, `close_order`,
/// every Janitor sweep). A failure here means the whole transition is
/// reverted to its pre-mutation snapshot by the caller (§4.D step 4, §4.H).
///
/// Two properties are checked, both derived directly from §3's data model
/// invariants rather than invented:
/// - custody conservation: `sum(liquid + locked)` over all users of a
///   listed token equals the engine's last-observed ledger custody of it.
/// - lock backing: every resting order's required lock is fully backed by
///   its owner's locked balance in the order's lock-denominated token.
pub fn verify(
    balances: &VirtualBalances,
    books: &Books,
    records: &BTreeMap<TokenId, TokenRecord>,
) -> Result<(), EngineError> {
    verify_custody_conservation(balances, records)?;
    verify_lock_backing(balances, books, records)
}

fn verify_custody_conservation(
    balances: &VirtualBalances,
    records: &BTreeMap<TokenId, TokenRecord>,
) -> Result<(), EngineError> {
    for record in records.values() {
        let escrowed = balances.total_escrowed(record.id);
        if escrowed != record.custody_observed {
            return Err(EngineError::invariant(format!(
                "token {} escrowed {} != observed custody {}",
                record.id, escrowed, record.custody_observed
            )));
        }
    }
    Ok(())
}

fn verify_lock_backing(
    balances: &VirtualBalances,
    books: &Books,
    records: &BTreeMap<TokenId, TokenRecord>,
) -> Result<(), EngineError> {
    // (owner, denominated-in token) -> sum of required locks across resting orders.
    let mut required: BTreeMap<(crate::prelude::UserId, TokenId), Amount> = BTreeMap::new();

    for (token, book) in books.iter() {
        let record = records
            .get(token)
            .ok_or_else(|| EngineError::invariant(format!("book exists for unlisted token {token}")))?;
        let payment_base = crate::prelude::base_of(record.decimals);
        for side in [Side::Buy, Side::Sell] {
            for order in book.iter(side) {
                let (denom, lock) = required_lock_of(order, payment_base);
                *required.entry((order.owner, denom)).or_insert(Amount::ZERO) += lock;
            }
        }
    }

    for ((owner, token), expected_locked) in &required {
        let (_, locked) = balances.read(*owner, *token);
        if locked < *expected_locked {
            return Err(EngineError::invariant(format!(
                "owner {owner} locked {locked} < required order lock {expected_locked} for token {token}"
            )));
        }
    }

    Ok(())
}
