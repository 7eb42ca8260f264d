use crate::prelude::{Amount, BalanceRow, EngineError, TokenId, UserId};
use std::collections::BTreeMap;

/// Per-(user, token) liquid and locked amounts. Owns every escrowed amount
/// in the exchange; the matcher holds exclusive mutation rights on it for
/// the duration of one `trade()` call (§3 Ownership, §5).
///
/// Single-owner, single-threaded: mutations never race, so a plain
/// `BTreeMap` is enough — unlike the teacher's lock-free `flurry::HashMap`,
/// which existed to let multiple matching threads touch the book
/// concurrently. BEACON's concurrency model (§5) explicitly rules that out.
#[derive(Debug, Default, Clone)]
pub struct VirtualBalances {
    rows: BTreeMap<(UserId, TokenId), BalanceRow>,
}

impl VirtualBalances {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, user: UserId, token: TokenId) -> BalanceRow {
        self.rows.get(&(user, token)).copied().unwrap_or_default()
    }

    fn row_mut(&mut self, user: UserId, token: TokenId) -> &mut BalanceRow {
        self.rows.entry((user, token)).or_default()
    }

    /// Returns `(liquid, locked)` for `(user, token)`.
    pub fn read(&self, user: UserId, token: TokenId) -> (Amount, Amount) {
        let row = self.row(user, token);
        (row.liquid, row.locked)
    }

    /// Credits `delta` to `user`'s liquid balance of `token`.
    pub fn credit_liquid(&mut self, user: UserId, token: TokenId, delta: Amount) {
        self.row_mut(user, token).liquid += delta;
    }

    /// Debits `delta` from `user`'s liquid balance of `token`. Fails if the
    /// liquid balance is insufficient.
    pub fn debit_liquid(&mut self, user: UserId, token: TokenId, delta: Amount) -> Result<(), EngineError> {
        let row = self.row_mut(user, token);
        if row.liquid < delta {
            return Err(EngineError::insufficient_liquidity(format!(
                "liquid {} < requested debit {}",
                row.liquid, delta
            )));
        }
        row.liquid -= delta;
        Ok(())
    }

    /// Moves `delta` from `user`'s liquid balance into their locked
    /// balance, atomically. Fails if liquid is insufficient.
    pub fn lock(&mut self, user: UserId, token: TokenId, delta: Amount) -> Result<(), EngineError> {
        let row = self.row_mut(user, token);
        if row.liquid < delta {
            return Err(EngineError::insufficient_liquidity(format!(
                "liquid {} < requested lock {}",
                row.liquid, delta
            )));
        }
        row.liquid -= delta;
        row.locked += delta;
        Ok(())
    }

    /// Reverses `lock`: moves `delta` from locked back to liquid.
    pub fn unlock(&mut self, user: UserId, token: TokenId, delta: Amount) {
        let row = self.row_mut(user, token);
        debug_assert!(row.locked >= delta, "unlock amount exceeds locked balance");
        row.locked -= delta;
        row.liquid += delta;
    }

    /// Moves `delta` from `from`'s locked balance of `token` into `to`'s
    /// liquid balance of `token`. Used to settle one side of a fill.
    pub fn settle(&mut self, from: UserId, to: UserId, token: TokenId, delta: Amount) {
        {
            let from_row = self.row_mut(from, token);
            debug_assert!(from_row.locked >= delta, "settle amount exceeds locked balance");
            from_row.locked -= delta;
        }
        self.row_mut(to, token).liquid += delta;
    }

    /// Debits `delta` from `user`'s locked balance of `token` without
    /// crediting anyone — the caller is responsible for crediting the
    /// corresponding amount(s) elsewhere (used when a fill's debit and
    /// credit legs differ by a fee split across two parties).
    pub fn debit_locked(&mut self, user: UserId, token: TokenId, delta: Amount) {
        let row = self.row_mut(user, token);
        debug_assert!(row.locked >= delta, "debit_locked amount exceeds locked balance");
        row.locked -= delta;
    }

    /// Sum of `liquid + locked` across every user, for one token —
    /// component H's conservation check reads this.
    pub fn total_escrowed(&self, token: TokenId) -> Amount {
        self.rows
            .iter()
            .filter(|((_, t), _)| *t == token)
            .fold(Amount::ZERO, |acc, (_, row)| acc + row.liquid + row.locked)
    }

    /// Every `(user, token)` pair with a non-default row, for invariant
    /// sweeps and queries.
    pub fn iter(&self) -> impl Iterator<Item = (&(UserId, TokenId), &BalanceRow)> {
        self.rows.iter()
    }

    /// All tokens a given user holds any balance in, for `token_balances()`.
    pub fn balances_of(&self, user: UserId) -> Vec<(TokenId, BalanceRow)> {
        self.rows
            .iter()
            .filter(|((u, _), _)| *u == user)
            .map(|((_, t), row)| (*t, *row))
            .collect()
    }
}
