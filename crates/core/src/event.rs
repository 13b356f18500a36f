//! Balance-change events and the typed decode of inbound webhook payloads.
//!
//! Upstream payloads are decoded element by element. A malformed element is
//! rejected on its own; missing optional fields are filled from an explicit
//! default policy (see [`DefaultApplied`]) instead of failing the batch.

use crate::ChainId;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Decimals assumed when the asset omits them.
pub const DEFAULT_DECIMALS: u32 = 18;

/// Largest usable `asset.decimals`. A 256-bit amount has at most 78 digits.
pub const MAX_DECIMALS: u32 = 77;

/// Symbol used when the asset omits it.
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Header carrying the chain id of an inbound balance batch.
pub const CHAIN_ID_HEADER: &str = "x-chain-id";

/// Direction of a balance change relative to the watched wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Only the exact value `"in"` is inbound; everything else is outbound.
    pub fn parse(value: &str) -> Self {
        if value == "in" {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// Token metadata attached to a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub symbol: CompactString,
    pub decimals: u32,
}

/// One balance change for a watched wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChangeEvent {
    pub transaction_hash: String,
    pub direction: Direction,
    /// Signed raw integer amount in token base units, as a decimal string.
    pub amount_delta: String,
    pub value_delta_usd: f64,
    pub asset: AssetInfo,
    /// Watched wallet the change belongs to.
    pub subscribed_address: String,
}

/// A default substituted for a missing or unusable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefaultApplied {
    /// `asset.decimals` missing or above [`MAX_DECIMALS`]: [`DEFAULT_DECIMALS`].
    Decimals,
    /// `asset.symbol` missing: [`UNKNOWN_SYMBOL`].
    Symbol,
    /// `direction` missing: outbound.
    Direction,
    /// `amount_delta` missing or not numeric: `"0"`.
    AmountDelta,
    /// `value_delta_usd` missing or not numeric: `0.0`.
    ValueDeltaUsd,
    /// `subscribed_address` missing: empty string.
    SubscribedAddress,
}

/// Why an element of an inbound batch was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The element is not a JSON object.
    NotAnObject,
    /// No transaction hash, so the change cannot be deduplicated.
    MissingTransactionHash,
}

/// Permissive wire shape of a balance change.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawBalanceChange {
    pub transaction_hash: Option<Value>,
    pub direction: Option<Value>,
    pub amount_delta: Option<Value>,
    pub value_delta_usd: Option<Value>,
    pub asset: Option<Value>,
    pub subscribed_address: Option<Value>,
}

/// Result of decoding one element.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub event: BalanceChangeEvent,
    pub defaults: Vec<DefaultApplied>,
}

impl Decoded {
    /// True if every field was present and usable.
    pub fn is_complete(&self) -> bool {
        self.defaults.is_empty()
    }
}

/// Result of decoding a whole batch.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub events: Vec<BalanceChangeEvent>,
    pub rejected: Vec<(usize, RejectReason)>,
    /// Number of events that needed at least one default.
    pub defaulted: usize,
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_as_decimal_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            let digits = s.strip_prefix('-').or_else(|| s.strip_prefix('+')).unwrap_or(s);
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
                Some(s.to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}

fn value_as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|d| u32::try_from(d).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

impl RawBalanceChange {
    /// Decode into a fully populated event, applying the default policy.
    pub fn decode(self) -> Result<Decoded, RejectReason> {
        let transaction_hash = self
            .transaction_hash
            .as_ref()
            .and_then(value_as_string)
            .filter(|h| !h.is_empty())
            .ok_or(RejectReason::MissingTransactionHash)?;

        let mut defaults = Vec::new();

        let direction = match self.direction.as_ref().and_then(Value::as_str) {
            Some(d) => Direction::parse(d),
            None => {
                defaults.push(DefaultApplied::Direction);
                Direction::Out
            }
        };

        let amount_delta = match self.amount_delta.as_ref().and_then(value_as_decimal_string) {
            Some(a) => a,
            None => {
                defaults.push(DefaultApplied::AmountDelta);
                "0".to_string()
            }
        };

        let value_delta_usd = match self.value_delta_usd.as_ref().and_then(value_as_f64) {
            Some(v) if v.is_finite() => v,
            _ => {
                defaults.push(DefaultApplied::ValueDeltaUsd);
                0.0
            }
        };

        let asset = self.asset.unwrap_or(Value::Null);
        let symbol = match asset
            .get("symbol")
            .and_then(value_as_string)
            .filter(|s| !s.is_empty())
        {
            Some(s) => CompactString::new(s),
            None => {
                defaults.push(DefaultApplied::Symbol);
                CompactString::new(UNKNOWN_SYMBOL)
            }
        };
        let decimals = match asset
            .get("decimals")
            .and_then(value_as_u32)
            .filter(|&d| d <= MAX_DECIMALS)
        {
            Some(d) => d,
            None => {
                defaults.push(DefaultApplied::Decimals);
                DEFAULT_DECIMALS
            }
        };

        let subscribed_address = match self.subscribed_address.as_ref().and_then(value_as_string) {
            Some(a) => a,
            None => {
                defaults.push(DefaultApplied::SubscribedAddress);
                String::new()
            }
        };

        Ok(Decoded {
            event: BalanceChangeEvent {
                transaction_hash,
                direction,
                amount_delta,
                value_delta_usd,
                asset: AssetInfo { symbol, decimals },
                subscribed_address,
            },
            defaults,
        })
    }
}

/// Decode a single JSON element.
pub fn decode_event(value: Value) -> Result<Decoded, RejectReason> {
    if !value.is_object() {
        return Err(RejectReason::NotAnObject);
    }
    // Every field is an optional `Value`, so any object deserializes.
    let raw: RawBalanceChange =
        serde_json::from_value(value).map_err(|_| RejectReason::NotAnObject)?;
    raw.decode()
}

/// Decode a batch element by element.
pub fn decode_batch(values: Vec<Value>) -> DecodedBatch {
    let mut batch = DecodedBatch::default();
    for (index, value) in values.into_iter().enumerate() {
        match decode_event(value) {
            Ok(decoded) => {
                if !decoded.is_complete() {
                    warn!(
                        index,
                        tx = %decoded.event.transaction_hash,
                        defaults = ?decoded.defaults,
                        "Balance change decoded with defaults"
                    );
                    batch.defaulted += 1;
                }
                batch.events.push(decoded.event);
            }
            Err(reason) => {
                warn!(index, reason = ?reason, "Rejected balance change");
                batch.rejected.push((index, reason));
            }
        }
    }
    batch
}

/// Resolve the chain id header of an inbound batch.
///
/// Returns the chain id and whether the Ethereum default was used because
/// the header was missing or not a number.
pub fn resolve_chain_header(header: Option<&str>) -> (ChainId, bool) {
    match header.and_then(|h| h.trim().parse::<u64>().ok()) {
        Some(id) => (ChainId(id), false),
        None => (ChainId::ETHEREUM, true),
    }
}
