//! Token universe: the ERC20 tokens whose whales are tracked.

use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TokenListError {
    #[error("Failed to read token list: {0}")]
    Csv(#[from] csv::Error),
}

/// One row of the token universe file (`symbol,address,chain`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenListing {
    pub symbol: String,
    pub address: String,
    /// Chain name, resolved through the chain registry.
    pub chain: String,
}

/// Load the token universe from a CSV file with a header row.
pub fn load_token_universe(path: impl AsRef<Path>) -> Result<Vec<TokenListing>, TokenListError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let tokens = read_rows(reader)?;
    info!(path = %path.display(), tokens = tokens.len(), "Loaded token universe");
    Ok(tokens)
}

/// Parse the token universe from any reader.
pub fn parse_token_universe<R: Read>(input: R) -> Result<Vec<TokenListing>, TokenListError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    read_rows(reader)
}

fn read_rows<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<TokenListing>, TokenListError> {
    let mut tokens = Vec::new();
    for row in reader.deserialize::<TokenListing>() {
        let token = row?;
        if token.address.is_empty() || token.chain.is_empty() {
            warn!(symbol = %token.symbol, "Skipping token row without address or chain");
            continue;
        }
        tokens.push(token);
    }
    Ok(tokens)
}
