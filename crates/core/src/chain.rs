//! Chain registry: chain names, numeric chain ids and block explorers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric EVM chain identifier (EIP-155).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Ethereum mainnet.
    pub const ETHEREUM: ChainId = ChainId(1);

    /// Get the raw numeric id.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        ChainId(id)
    }
}

/// Supported EVM chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    Ethereum,
    Optimism,
    Bsc,
    Gnosis,
    Polygon,
    ZkSync,
    Base,
    Arbitrum,
    Avalanche,
    Linea,
    Blast,
    Scroll,
}

impl Chain {
    /// Resolve a chain from its numeric id.
    pub fn from_id(id: ChainId) -> Option<Self> {
        match id.0 {
            1 => Some(Chain::Ethereum),
            10 => Some(Chain::Optimism),
            56 => Some(Chain::Bsc),
            100 => Some(Chain::Gnosis),
            137 => Some(Chain::Polygon),
            324 => Some(Chain::ZkSync),
            8453 => Some(Chain::Base),
            42161 => Some(Chain::Arbitrum),
            43114 => Some(Chain::Avalanche),
            59144 => Some(Chain::Linea),
            81457 => Some(Chain::Blast),
            534352 => Some(Chain::Scroll),
            _ => None,
        }
    }

    /// Resolve a chain from a human-entered name.
    ///
    /// Matching is case-insensitive and accepts the usual short aliases.
    /// Unknown names are unsupported: there is no fallback chain.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "ethereum" | "eth" | "mainnet" | "ethereum mainnet" => Some(Chain::Ethereum),
            "optimism" | "op" | "op mainnet" => Some(Chain::Optimism),
            "bsc" | "bnb" | "bnb chain" | "bnb smart chain" | "binance smart chain" => {
                Some(Chain::Bsc)
            }
            "gnosis" | "xdai" => Some(Chain::Gnosis),
            "polygon" | "matic" | "polygon pos" => Some(Chain::Polygon),
            "zksync" | "zksync era" => Some(Chain::ZkSync),
            "base" => Some(Chain::Base),
            "arbitrum" | "arb" | "arbitrum one" => Some(Chain::Arbitrum),
            "avalanche" | "avax" | "avalanche c-chain" => Some(Chain::Avalanche),
            "linea" => Some(Chain::Linea),
            "blast" => Some(Chain::Blast),
            "scroll" => Some(Chain::Scroll),
            _ => None,
        }
    }

    /// Numeric chain id.
    pub fn id(self) -> ChainId {
        ChainId(match self {
            Chain::Ethereum => 1,
            Chain::Optimism => 10,
            Chain::Bsc => 56,
            Chain::Gnosis => 100,
            Chain::Polygon => 137,
            Chain::ZkSync => 324,
            Chain::Base => 8453,
            Chain::Arbitrum => 42161,
            Chain::Avalanche => 43114,
            Chain::Linea => 59144,
            Chain::Blast => 81457,
            Chain::Scroll => 534352,
        })
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Chain::Ethereum => "Ethereum",
            Chain::Optimism => "Optimism",
            Chain::Bsc => "BSC",
            Chain::Gnosis => "Gnosis",
            Chain::Polygon => "Polygon",
            Chain::ZkSync => "zkSync",
            Chain::Base => "Base",
            Chain::Arbitrum => "Arbitrum",
            Chain::Avalanche => "Avalanche",
            Chain::Linea => "Linea",
            Chain::Blast => "Blast",
            Chain::Scroll => "Scroll",
        }
    }

    /// Block explorer name and base URL.
    pub fn explorer(self) -> (&'static str, &'static str) {
        match self {
            Chain::Ethereum => ("Etherscan", "https://etherscan.io"),
            Chain::Optimism => ("Optimistic Etherscan", "https://optimistic.etherscan.io"),
            Chain::Bsc => ("BscScan", "https://bscscan.com"),
            Chain::Gnosis => ("GnosisScan", "https://gnosisscan.io"),
            Chain::Polygon => ("PolygonScan", "https://polygonscan.com"),
            Chain::ZkSync => ("zkSync Explorer", "https://explorer.zksync.io"),
            Chain::Base => ("BaseScan", "https://basescan.org"),
            Chain::Arbitrum => ("Arbiscan", "https://arbiscan.io"),
            Chain::Avalanche => ("SnowTrace", "https://snowtrace.io"),
            Chain::Linea => ("LineaScan", "https://lineascan.build"),
            Chain::Blast => ("BlastScan", "https://blastscan.io"),
            Chain::Scroll => ("ScrollScan", "https://scrollscan.com"),
        }
    }

    /// All supported chains.
    pub fn all() -> &'static [Chain] {
        &[
            Chain::Ethereum,
            Chain::Optimism,
            Chain::Bsc,
            Chain::Gnosis,
            Chain::Polygon,
            Chain::ZkSync,
            Chain::Base,
            Chain::Arbitrum,
            Chain::Avalanche,
            Chain::Linea,
            Chain::Blast,
            Chain::Scroll,
        ]
    }
}

/// Resolve a chain name to its id. `None` means unsupported.
pub fn resolve_chain_name(name: &str) -> Option<ChainId> {
    Chain::from_name(name).map(Chain::id)
}

/// Explorer used for a chain id, falling back to Ethereum for unknown ids.
pub fn explorer_for(chain_id: ChainId) -> (&'static str, &'static str) {
    Chain::from_id(chain_id).unwrap_or(Chain::Ethereum).explorer()
}

/// Transaction link on the chain's block explorer.
pub fn explorer_tx_url(chain_id: ChainId, tx_hash: &str) -> String {
    let (_, base) = explorer_for(chain_id);
    format!("{}/tx/{}", base, tx_hash)
}
