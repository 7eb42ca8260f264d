use async_trait::async_trait;
use beacon_core::prelude::{Amount, Config, LedgerClient, LedgerError, LedgerMetadata, LedgerRegistry, TokenId, UserId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// In-memory stand-in for one external fungible-ledger contract. Grounded
/// on the teacher's `EmptyOrderBookSyncer` no-op pattern, generalized into a
/// stateful fake since `LedgerClient` calls are genuinely observable here
/// (deposit/withdraw tests assert on them).
pub struct MockLedgerClient {
    pub metadata: LedgerMetadata,
    balances: Mutex<BTreeMap<UserId, Amount>>,
    pub fail_transfers: Mutex<bool>,
}

impl MockLedgerClient {
    pub fn new(symbol: &str, decimals: u32, transfer_fee: Amount) -> Self {
        Self {
            metadata: LedgerMetadata { symbol: symbol.into(), decimals, transfer_fee, logo: String::new() },
            balances: Mutex::new(BTreeMap::new()),
            fail_transfers: Mutex::new(false),
        }
    }

    /// Simulates `user` holding `amount` in their deposit subaccount, ready
    /// to be picked up by `deposit_liquidity`.
    pub fn fund_subaccount(&self, user: UserId, amount: Amount) {
        self.balances.lock().unwrap().insert(user, amount);
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn balance_of(&self, owner: UserId) -> Result<Amount, LedgerError> {
        Ok(*self.balances.lock().unwrap().get(&owner).unwrap_or(&Amount::ZERO))
    }

    async fn transfer(&self, _to: UserId, _amount: Amount, _fee: Amount) -> Result<(), LedgerError> {
        if *self.fail_transfers.lock().unwrap() {
            return Err(LedgerError::Transport("simulated outage".into()));
        }
        Ok(())
    }

    async fn transfer_from(&self, from: UserId, _to: UserId, amount: Amount) -> Result<(), LedgerError> {
        if *self.fail_transfers.lock().unwrap() {
            return Err(LedgerError::Transport("simulated outage".into()));
        }
        let mut balances = self.balances.lock().unwrap();
        let entry = balances.entry(from).or_insert(Amount::ZERO);
        if *entry < amount {
            return Err(LedgerError::Ledger("insufficient subaccount balance".into()));
        }
        *entry -= amount;
        Ok(())
    }

    async fn metadata(&self, _token: TokenId) -> Result<LedgerMetadata, LedgerError> {
        Ok(self.metadata.clone())
    }
}

/// Registry that maps every token to the same `MockLedgerClient`, for tests
/// that only exercise one traded token plus the payment token.
pub struct SingleLedgerRegistry(pub Arc<dyn LedgerClient>);

impl LedgerRegistry for SingleLedgerRegistry {
    fn client_for(&self, _token: TokenId) -> Option<Arc<dyn LedgerClient>> {
        Some(self.0.clone())
    }
}

pub fn user(n: u8) -> UserId {
    let mut bytes = [0u8; 32];
    bytes[0] = n;
    UserId::new(bytes)
}

pub fn token(n: u8) -> TokenId {
    let mut bytes = [0u8; 32];
    bytes[1] = n;
    TokenId::new(bytes)
}

pub fn test_config(payment_token: TokenId) -> Config {
    let mut config = Config::default();
    config.payment_token = Some(payment_token);
    config.fee_bps = 20;
    config
}
