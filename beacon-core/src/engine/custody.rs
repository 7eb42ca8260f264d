use crate::prelude::{Amount, EngineError, LedgerClient, ListingError, Principal, TokenId, UserId, invariants};
use crate::EngineState;
use tokio::sync::Mutex;
use tracing::instrument;

/// `deposit_liquidity` (§4.E). The only suspension point is the single
/// `balance_of` + `transfer_from` pair against `ledger`; the engine mutex is
/// released for the whole `.await` and reacquired only to commit or to log
/// a reconciliation warning, per §5's suspension discipline.
#[instrument(skip(state, ledger), fields(%token, %caller))]
pub async fn deposit_liquidity(
    state: &Mutex<EngineState>,
    ledger: &dyn LedgerClient,
    caller: UserId,
    token: TokenId,
) -> Result<(), EngineError> {
    let ledger_transfer_fee = {
        let guard = state.lock().await;
        guard.records.get(&token).ok_or(ListingError::NotListed)?.ledger_transfer_fee
    };

    let actual = ledger.balance_of(caller).await?;
    let usable = if actual > ledger_transfer_fee { actual - ledger_transfer_fee } else { Amount::ZERO };
    if usable == Amount::ZERO {
        return Ok(());
    }

    ledger.transfer_from(caller, Principal::CUSTODY_ACCOUNT, usable).await?;

    let mut guard = state.lock().await;
    guard.balances.credit_liquid(caller, token, usable);
    if let Some(record) = guard.records.get_mut(&token) {
        record.custody_observed += usable;
    }
    if let Err(err) = invariants::verify(&guard.balances, &guard.books, &guard.records) {
        tracing::error!(%token, %caller, %err, "invariant violated after deposit; token flagged for reconciliation");
    }
    Ok(())
}

/// `withdraw` (§4.E). The liquid debit commits before the ledger call so
/// that no other caller can observe or spend the withdrawn funds during the
/// suspension; a failed transfer re-credits the full amount.
#[instrument(skip(state, ledger), fields(%token, %caller))]
pub async fn withdraw(
    state: &Mutex<EngineState>,
    ledger: &dyn LedgerClient,
    caller: UserId,
    token: TokenId,
) -> Result<Amount, EngineError> {
    let (amount, ledger_transfer_fee) = {
        let mut guard = state.lock().await;
        let fee = guard.records.get(&token).ok_or(ListingError::NotListed)?.ledger_transfer_fee;
        let (liquid, _locked) = guard.balances.read(caller, token);
        if liquid <= fee {
            return Err(EngineError::insufficient_liquidity(
                "liquid balance does not exceed the ledger's transfer fee",
            ));
        }
        guard.balances.debit_liquid(caller, token, liquid)?;
        (liquid, fee)
    };

    let net = amount - ledger_transfer_fee;
    match ledger.transfer(caller, net, ledger_transfer_fee).await {
        Ok(()) => {
            let mut guard = state.lock().await;
            if let Some(record) = guard.records.get_mut(&token) {
                record.custody_observed -= amount;
            }
            if let Err(err) = invariants::verify(&guard.balances, &guard.books, &guard.records) {
                tracing::error!(%token, %caller, %err, "invariant violated after withdraw; token flagged for reconciliation");
            }
            Ok(net)
        }
        Err(err) => {
            let mut guard = state.lock().await;
            guard.balances.credit_liquid(caller, token, amount);
            Err(EngineError::from(err))
        }
    }
}
