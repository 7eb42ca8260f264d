use beacon_core::prelude::{Amount, Principal, TokenId, UserId};

pub fn user(n: u64) -> UserId {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&n.to_le_bytes());
    Principal::new(bytes)
}

pub fn token(n: u64) -> TokenId {
    let mut bytes = [0u8; 32];
    bytes[8..16].copy_from_slice(&n.to_le_bytes());
    Principal::new(bytes)
}

pub fn amount(v: u64) -> Amount {
    Amount::from(v)
}
