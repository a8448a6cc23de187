//! Venue error taxonomy
//!
//! Raw `errno`/`errmsg` pairs and transport failures are classified exactly
//! once, here. Everything above the client matches on structured kinds and
//! never sniffs strings.

use thiserror::Error;

/// `errno` for insufficient balance.
pub const ERRNO_INSUFFICIENT_BALANCE: i64 = 10207;
/// `errno` for a region-blocked account. Fatal for the engine instance.
pub const ERRNO_REGION_BLOCKED: i64 = 10403;

#[derive(Error, Debug, Clone)]
pub enum VenueError {
    #[error("insufficient balance (available: {available:?})")]
    InsufficientBalance { available: Option<f64> },

    #[error("account is region blocked")]
    RegionBlocked,

    #[error("price out of band: {0}")]
    PriceOutOfBand(String),

    #[error("order size below minimum (required: {required:?})")]
    SizeBelowMin { required: Option<f64> },

    #[error("market closed or resolved")]
    MarketClosed,

    #[error("not found: {0}")]
    NotFound(String),

    /// Settlement call failed upstream but the venue reports a transaction
    /// hash, meaning it landed on chain. Treated as success by callers.
    #[error("delayed success, tx hash {hash}")]
    DelayedSuccess { hash: String },

    /// Transient transport failure (timeout, reset, 5xx). Retryable.
    #[error("network error: {0}")]
    Network(String),

    #[error("venue error {errno}: {errmsg}")]
    Api { errno: i64, errmsg: String },
}

pub type Result<T> = std::result::Result<T, VenueError>;

impl VenueError {
    /// Only transient network faults are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VenueError::Network(_))
    }

    /// Errors that should stop the whole engine instance for this account.
    pub fn is_fatal_for_account(&self) -> bool {
        matches!(self, VenueError::RegionBlocked)
    }

    /// Classify a non-zero envelope into a structured kind.
    pub fn classify(errno: i64, errmsg: &str) -> VenueError {
        match errno {
            ERRNO_INSUFFICIENT_BALANCE => VenueError::InsufficientBalance {
                available: parse_available(errmsg),
            },
            ERRNO_REGION_BLOCKED => VenueError::RegionBlocked,
            _ => classify_message(errno, errmsg),
        }
    }

    /// Normalize a raw error string (e.g. an exception body) that may carry
    /// a delayed-success transaction hash.
    pub fn from_error_text(text: &str) -> VenueError {
        if let Some(hash) = extract_tx_hash(text) {
            return VenueError::DelayedSuccess { hash };
        }
        classify_message(0, text)
    }
}

fn classify_message(errno: i64, errmsg: &str) -> VenueError {
    let lower = errmsg.to_lowercase();

    if let Some(hash) = extract_tx_hash(errmsg) {
        return VenueError::DelayedSuccess { hash };
    }
    if lower.contains("insufficient") || lower.contains("only") && lower.contains("available") {
        return VenueError::InsufficientBalance {
            available: parse_available(errmsg),
        };
    }
    if lower.contains("region") || lower.contains("country") || lower.contains("restricted") {
        return VenueError::RegionBlocked;
    }
    if lower.contains("below the minimum") || lower.contains("minimum required") {
        return VenueError::SizeBelowMin {
            required: parse_minimum_required(errmsg),
        };
    }
    if lower.contains("market") && (lower.contains("closed") || lower.contains("resolved")) {
        return VenueError::MarketClosed;
    }
    if lower.contains("not found") {
        return VenueError::NotFound(errmsg.to_string());
    }
    if lower.contains("price") && (lower.contains("invalid") || lower.contains("range") || lower.contains("band")) {
        return VenueError::PriceOutOfBand(errmsg.to_string());
    }
    if lower.contains("timeout") || lower.contains("timed out") || lower.contains("connection") {
        return VenueError::Network(errmsg.to_string());
    }
    VenueError::Api {
        errno,
        errmsg: errmsg.to_string(),
    }
}

/// Extract the hash from a "Transaction hash: 0x..." fragment.
fn extract_tx_hash(text: &str) -> Option<String> {
    let idx = text.find("Transaction hash:")?;
    let rest = text[idx + "Transaction hash:".len()..].trim_start();
    let hash: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == 'x')
        .collect();
    if hash.starts_with("0x") && hash.len() > 2 {
        Some(hash)
    } else {
        None
    }
}

/// Parse "only 12.34 available" style balance hints.
fn parse_available(errmsg: &str) -> Option<f64> {
    let lower = errmsg.to_lowercase();
    let idx = lower.find("only")?;
    let rest = &lower[idx + 4..];
    let number: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}

/// Parse "below the minimum required value of 1.00" style hints.
fn parse_minimum_required(errmsg: &str) -> Option<f64> {
    let lower = errmsg.to_lowercase();
    let idx = lower.find("value of")?;
    let rest = &lower[idx + "value of".len()..];
    let number: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}

/// Map an HTTP status to a venue error. Gateway failures are retryable.
pub fn error_from_status(status: u16, body: &str) -> VenueError {
    match status {
        502 | 503 | 504 => VenueError::Network(format!("HTTP {status}")),
        404 => VenueError::NotFound(format!("HTTP 404: {body}")),
        _ => VenueError::Api {
            errno: status as i64,
            errmsg: body.to_string(),
        },
    }
}
