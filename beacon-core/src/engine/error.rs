use thiserror::Error;

/// Transport- or ledger-level failure from one `LedgerClient` call.
/// Distinguishes a failure crossing the system boundary (`Transport`) from
/// one the ledger itself reported (`Ledger`), per §7.3.
#[derive(Debug, Error, Clone)]
pub enum LedgerError {
    #[error("transport error talking to ledger: {0}")]
    Transport(String),
    #[error("ledger rejected the call: {0}")]
    Ledger(String),
}

/// Listing lifecycle errors, per §7.5.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ListingError {
    #[error("token is not listed")]
    NotListed,
    #[error("token is already listed")]
    AlreadyListed,
}

/// The full error taxonomy surfaced by the engine's mutating entry points.
/// Every variant maps to a §7 error kind; the `Display` impl is the stable,
/// human-readable message clients may show but must not parse for control
/// flow.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad argument: unknown token, zero amount, non-multiple amount, and
    /// similar. Rejected before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Liquid balance too low for the requested lock. Rejected before any
    /// mutation.
    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    /// An external `LedgerClient` call failed; any local state staged for
    /// the call is rolled back.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A post-mutation invariant check (component H) failed; the whole
    /// operation is reverted to its pre-mutation snapshot.
    #[error("invariant violated, operation reverted: {0}")]
    InvariantViolation(String),

    /// Listing lifecycle error.
    #[error(transparent)]
    Listing(#[from] ListingError),

    /// The operation exceeded its execution budget; the pre-operation
    /// snapshot is restored.
    #[error("resource budget exceeded: {0}")]
    ResourceExhausted(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn insufficient_liquidity(msg: impl Into<String>) -> Self {
        EngineError::InsufficientLiquidity(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        EngineError::InvariantViolation(msg.into())
    }
}
