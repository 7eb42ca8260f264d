//! BEACON: a virtual-balance, price-time-priority exchange engine over
//! externally-custodied fungible tokens. `Beacon` owns every piece of
//! mutable state behind one `tokio::sync::Mutex` and exposes the external
//! RPC surface as async methods; internally, almost nothing is actually
//! async — only the two `LedgerClient` calls made by custody operations
//! ever suspend (§5).

mod engine;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

pub use engine::prelude;
use engine::prelude::*;

/// Every piece of state the engine owns (§3's "Ownership" section),
/// bundled so a single `tokio::sync::Mutex` can guard all of it at once.
#[derive(Debug)]
pub struct EngineState {
    pub(crate) balances: VirtualBalances,
    pub(crate) books: Books,
    pub(crate) records: BTreeMap<TokenId, TokenRecord>,
    pub(crate) archive: ArchiveRing,
    pub(crate) logs: LogRing,
    pub(crate) last_trades: BTreeMap<TokenId, LastTrade>,
    pub(crate) config: Config,
}

impl EngineState {
    pub fn new(config: Config) -> Self {
        Self {
            balances: VirtualBalances::new(),
            books: Books::new(),
            records: BTreeMap::new(),
            archive: ArchiveRing::new(),
            logs: LogRing::new(config.log_ring),
            last_trades: BTreeMap::new(),
            config,
        }
    }
}

/// The root engine object. One instance per exchange; holds the exclusive
/// lock every mutating entry point acquires for its duration, per §5.
pub struct Beacon {
    state: Mutex<EngineState>,
    ledgers: Arc<dyn LedgerRegistry>,
    syncer: Arc<dyn EngineSyncer>,
}

impl Beacon {
    pub fn new(config: Config, ledgers: Arc<dyn LedgerRegistry>) -> Self {
        Self { state: Mutex::new(EngineState::new(config)), ledgers, syncer: Arc::new(NoopEngineSyncer) }
    }

    pub fn with_syncer(config: Config, ledgers: Arc<dyn LedgerRegistry>, syncer: Arc<dyn EngineSyncer>) -> Self {
        Self { state: Mutex::new(EngineState::new(config)), ledgers, syncer }
    }

    fn ledger_for(&self, token: TokenId) -> Result<Arc<dyn LedgerClient>, EngineError> {
        self.ledgers
            .client_for(token)
            .ok_or_else(|| EngineError::validation(format!("no ledger registered for token {token}")))
    }

    /// `list_token(token_id) -> Result<(), string>` (§6), adapted to a
    /// typed `EngineError` — the string encoding is the out-of-scope wire
    /// transport's concern, not this crate's.
    pub async fn list_token(&self, caller: UserId, token: TokenId, now_ns: u64) -> Result<(), EngineError> {
        let ledger = self.ledger_for(token)?;
        tokens::list_token(&self.state, ledger.as_ref(), caller, token, now_ns).await?;
        self.syncer.listed(token);
        Ok(())
    }

    /// `deposit_liquidity(token_id) -> Result<(), string>`.
    pub async fn deposit_liquidity(&self, caller: UserId, token: TokenId) -> Result<(), EngineError> {
        let ledger = self.ledger_for(token)?;
        custody::deposit_liquidity(&self.state, ledger.as_ref(), caller, token).await?;
        let (liquid, _) = self.state.lock().await.balances.read(caller, token);
        self.syncer.deposited(caller, token, liquid);
        Ok(())
    }

    /// `withdraw(token_id) -> Result<nat, string>`.
    pub async fn withdraw(&self, caller: UserId, token: TokenId) -> Result<Amount, EngineError> {
        let ledger = self.ledger_for(token)?;
        let amount = custody::withdraw(&self.state, ledger.as_ref(), caller, token).await?;
        self.syncer.withdrawn(caller, token, amount);
        Ok(amount)
    }

    /// `trade(token_id, amount, price, side) -> OrderExecution`.
    pub async fn trade(
        &self,
        caller: UserId,
        token: TokenId,
        amount: Amount,
        price: Price,
        side: Side,
        now_ns: u64,
    ) -> Result<OrderExecution, EngineError> {
        let mut guard = self.state.lock().await;
        let EngineState { balances, books, records, config, last_trades, archive, .. } = &mut *guard;
        let (execution, trades) =
            matcher::trade(balances, books, records, config.payment_token.ok_or_else(|| {
                EngineError::validation("payment_token must be configured via set_payment_token before trading")
            })?, config.fee_bps, caller, token, amount, price, side, now_ns)?;

        for trade in &trades {
            last_trades.insert(trade.token, LastTrade { price: trade.price, timestamp_ns: trade.timestamp_ns });
            archive.push(trade.clone());
        }

        let posted_order = if matches!(execution, OrderExecution::FilledAndOrderCreated(_)) {
            let key = BookKey { price, timestamp_ns: now_ns, owner: caller, side };
            books.get(token).and_then(|b| b.get(side, &key)).cloned()
        } else {
            None
        };

        drop(guard);
        if !trades.is_empty() {
            self.syncer.matched(&trades);
        }
        if let Some(order) = &posted_order {
            self.syncer.order_inserted(order);
        }
        Ok(execution)
    }

    /// `close_order(token_id, side, amount, price, timestamp_ns) -> ()`,
    /// idempotent per §5's "cancelling an absent order is a no-op".
    pub async fn close_order(&self, caller: UserId, token: TokenId, side: Side, price: Price, timestamp_ns: u64) {
        let mut guard = self.state.lock().await;
        let key = BookKey { price, timestamp_ns, owner: caller, side };
        let Some(book) = guard.books.get_mut(token) else { return };
        let Some(order) = book.cancel(side, &key) else { return };
        let base_t = guard.records.get(&token).map(|r| base_of(r.decimals)).unwrap_or(Amount::ZERO);
        let (lock_denom, lock_amount) = required_lock_of(&order, base_t);
        let balances_snapshot = guard.balances.clone();
        guard.balances.unlock(caller, lock_denom, lock_amount);

        if let Err(err) = invariants::verify(&guard.balances, &guard.books, &guard.records) {
            tracing::error!(%token, %caller, %err, "invariant violated after close_order; cancellation reverted");
            guard.balances = balances_snapshot;
            if let Some(book) = guard.books.get_mut(token) {
                book.insert(order);
            }
            return;
        }
        drop(guard);
        self.syncer.order_removed(&order);
    }

    /// `close_all_orders() -> ()` for `caller`.
    pub async fn close_all_orders(&self, caller: UserId) {
        let mut guard = self.state.lock().await;
        let balances_snapshot = guard.balances.clone();
        let tokens: Vec<_> = guard.books.iter().map(|(id, _)| *id).collect();
        let mut removed = Vec::new();
        for token in tokens {
            let base_t = guard.records.get(&token).map(|r| base_of(r.decimals)).unwrap_or(Amount::ZERO);
            let Some(book) = guard.books.get_mut(token) else { continue };
            let keys: Vec<_> = [Side::Buy, Side::Sell]
                .into_iter()
                .flat_map(|side| book.iter(side).filter(|o| o.owner == caller).map(|o| o.book_key()).collect::<Vec<_>>())
                .collect();
            for key in keys {
                if let Some(order) = book.cancel(key.side, &key) {
                    let (lock_denom, lock_amount) = required_lock_of(&order, base_t);
                    guard.balances.unlock(caller, lock_denom, lock_amount);
                    removed.push(order);
                }
            }
        }

        if let Err(err) = invariants::verify(&guard.balances, &guard.books, &guard.records) {
            tracing::error!(%caller, %err, "invariant violated after close_all_orders; cancellations reverted");
            guard.balances = balances_snapshot;
            for order in removed {
                if let Some(book) = guard.books.get_mut(order.token) {
                    book.insert(order);
                }
            }
            return;
        }
        drop(guard);
        for order in &removed {
            self.syncer.order_removed(order);
        }
    }

    /// `orders(token_id, side) -> [Order]` (query).
    pub async fn orders(&self, token: TokenId, side: Side) -> Vec<Order> {
        let guard = self.state.lock().await;
        guard.books.get(token).map(|b| b.iter(side).cloned().collect()).unwrap_or_default()
    }

    /// `executed_orders(token_id) -> [Order]` (query, reverse-chronological).
    pub async fn executed_orders(&self, token: TokenId) -> Vec<Trade> {
        self.state.lock().await.archive.for_token(token)
    }

    /// `prices() -> {token_id -> LastTrade}` (query).
    pub async fn prices(&self) -> BTreeMap<TokenId, LastTrade> {
        self.state.lock().await.last_trades.clone()
    }

    /// `tokens() -> {token_id -> Metadata}` (query).
    pub async fn tokens(&self) -> BTreeMap<TokenId, TokenRecord> {
        self.state.lock().await.records.clone()
    }

    /// `token_balances() -> {token_id -> (liquid, locked)}` (query, for caller).
    pub async fn token_balances(&self, caller: UserId) -> Vec<(TokenId, BalanceRow)> {
        self.state.lock().await.balances.balances_of(caller)
    }

    /// `data() -> AggregateStats` (query).
    pub async fn data(&self, now_ns: u64) -> AggregateStats {
        let guard = self.state.lock().await;
        let day_ns = 24 * 60 * 60 * 1_000_000_000u64;
        let cutoff = now_ns.saturating_sub(day_ns);
        let mut volume_day = Amount::ZERO;
        let mut trades_day = 0u64;
        let mut active = std::collections::BTreeSet::new();
        // Scan the archive for the trailing day window; the archive itself
        // is already bounded by `archive_ttl_ns`, so this never scans more
        // than one TTL window's worth of history.
        for token_trades in guard.records.keys().map(|t| guard.archive.for_token(*t)) {
            for trade in token_trades.iter().filter(|t| t.timestamp_ns >= cutoff) {
                volume_day += trade.amount;
                trades_day += 1;
                active.insert(trade.maker);
                active.insert(trade.taker);
            }
        }
        let payment_token_locked = guard
            .config
            .payment_token
            .map(|pt| {
                guard
                    .balances
                    .iter()
                    .filter(|((_, t), _)| *t == pt)
                    .fold(Amount::ZERO, |acc, (_, row)| acc + row.locked)
            })
            .unwrap_or(Amount::ZERO);

        AggregateStats {
            fee_bps: guard.config.fee_bps,
            volume_day,
            trades_day,
            payment_token_locked,
            tokens_listed: guard.records.len() as u64,
            active_traders: active.len() as u64,
        }
    }

    /// `set_payment_token(principal)` — one-shot admin configuration.
    pub async fn set_payment_token(&self, token: TokenId) -> Result<(), EngineError> {
        let mut guard = self.state.lock().await;
        if guard.config.payment_token.is_some() {
            return Err(EngineError::validation("payment_token is already configured"));
        }
        guard.config.payment_token = Some(token);
        Ok(())
    }

    /// `set_revenue_account(principal)` — one-shot admin configuration.
    pub async fn set_revenue_account(&self, account: UserId) -> Result<(), EngineError> {
        let mut guard = self.state.lock().await;
        if guard.config.revenue_account.is_some() {
            return Err(EngineError::validation("revenue_account is already configured"));
        }
        guard.config.revenue_account = Some(account);
        Ok(())
    }

    /// Runs one bounded Janitor sweep (§4.G). The calling process owns the
    /// scheduling cadence (e.g. a `tokio::time::interval` loop); this crate
    /// only exposes the tick itself.
    pub async fn janitor_tick(&self, now_ns: u64, batch: usize) -> Result<JanitorReport, EngineError> {
        let mut guard = self.state.lock().await;
        janitor::tick(&mut guard, now_ns, batch)
    }
}
