use crate::prelude::{Amount, TokenId, UserId};
use serde::{Deserialize, Serialize};

const NANOS_PER_DAY: u64 = 24 * 60 * 60 * 1_000_000_000;

/// Process-wide configuration constants, per §6. Loadable from TOML the way
/// `gnosis-solvers`' `infra/config/dex/*/file.rs` modules load solver
/// configuration, or constructed directly with sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fee applied per fill, per side, in basis points. Default 20 (0.20%).
    pub fee_bps: u16,
    /// Listing fee charged from the caller's payment-token liquid balance,
    /// in payment-token smallest units.
    pub listing_price_payment: u128,
    /// Resting orders older than this are swept by the janitor.
    pub order_ttl_ns: u64,
    /// Archived trades older than this are dropped by the janitor.
    pub archive_ttl_ns: u64,
    /// Tokens with no activity and no open orders for this long are delisted.
    pub delist_ttl_ns: u64,
    /// Maximum number of in-memory structured log entries retained.
    pub log_ring: usize,
    /// The single quote asset. `None` until `set_payment_token` is called.
    pub payment_token: Option<TokenId>,
    /// Destination account for collected fees. `None` until
    /// `set_revenue_account` is called.
    pub revenue_account: Option<UserId>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fee_bps: 20,
            listing_price_payment: 100,
            order_ttl_ns: 90 * NANOS_PER_DAY,
            archive_ttl_ns: 180 * NANOS_PER_DAY,
            delist_ttl_ns: 180 * NANOS_PER_DAY,
            log_ring: 10_000,
            payment_token: None,
            revenue_account: None,
        }
    }
}

impl Config {
    /// Parses a `Config` from a TOML document, falling back to defaults for
    /// any field the document omits.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Reads and parses a `Config` from a TOML file on disk.
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&contents)?)
    }

    /// The listing fee, as an [`Amount`].
    pub fn listing_price_payment_amount(&self) -> Amount {
        Amount::from_u128(self.listing_price_payment)
    }
}
