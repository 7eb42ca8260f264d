use crate::prelude::{Amount, LedgerError, TokenId, UserId};
use async_trait::async_trait;

/// Metadata an external ledger reports about its token, fetched once at
/// listing time.
#[derive(Debug, Clone)]
pub struct LedgerMetadata {
    pub symbol: String,
    pub decimals: u32,
    pub transfer_fee: Amount,
    pub logo: String,
}

/// Thin request/response client over one external fungible-ledger contract.
/// This is the engine's only suspension boundary (§5): every other
/// operation in the crate runs to completion without ever crossing into
/// async code. The trait is stateless — callers reason about idempotency by
/// re-reading balances, not by tracking client-side state.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Reads the balance of an account on this ledger.
    async fn balance_of(&self, owner: UserId) -> Result<Amount, LedgerError>;

    /// Transfers `amount` from the contract's main account to `to`, paying
    /// `fee` in the ledger's native fee mechanism.
    async fn transfer(&self, to: UserId, amount: Amount, fee: Amount) -> Result<(), LedgerError>;

    /// Transfers `amount` from `from` (a subaccount the contract controls)
    /// into the contract's main account.
    async fn transfer_from(&self, from: UserId, to: UserId, amount: Amount) -> Result<(), LedgerError>;

    /// Fetches this ledger's token metadata (symbol, decimals, transfer
    /// fee, logo), used once by `list_token`.
    async fn metadata(&self, token: TokenId) -> Result<LedgerMetadata, LedgerError>;
}

/// Resolves the `LedgerClient` to use for a given token. Listing a new
/// token asks the registry for a client before anything else; `Beacon`
/// holds one registry for its whole lifetime.
pub trait LedgerRegistry: Send + Sync {
    fn client_for(&self, token: TokenId) -> Option<std::sync::Arc<dyn LedgerClient>>;
}
