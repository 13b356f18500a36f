//! Top-holder records per (token, chain).

use crate::ChainId;
use serde::{Deserialize, Serialize};

/// Most recent top-holder set for one token on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderRecord {
    /// Token contract address, lowercase hex.
    pub token_address: String,
    pub chain_id: ChainId,
    pub symbol: String,
    /// Holder wallets, largest first.
    pub holder_addresses: Vec<String>,
}

impl HolderRecord {
    /// Create a record, normalizing the token address.
    pub fn new(
        token_address: &str,
        chain_id: ChainId,
        symbol: impl Into<String>,
        holder_addresses: Vec<String>,
    ) -> Self {
        Self {
            token_address: normalize_address(token_address),
            chain_id,
            symbol: symbol.into(),
            holder_addresses,
        }
    }
}

/// Normalize a hex address for use as a key: trimmed, lowercase.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address(" 0xAbCdEF "), "0xabcdef");
    }

    #[test]
    fn test_holder_record_new_normalizes_token() {
        let record = HolderRecord::new("0xABC", ChainId::ETHEREUM, "FOO", vec![]);
        assert_eq!(record.token_address, "0xabc");
        assert_eq!(record.symbol, "FOO");
    }
}
