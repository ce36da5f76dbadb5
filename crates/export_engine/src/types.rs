use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fan_out::Cancelled;

/// Error returned by [`crate::ApiClient`] calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: FailureKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<Cancelled> for ApiError {
    fn from(err: Cancelled) -> Self {
        ApiError::new(FailureKind::Cancelled, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    ClientSetup,
    HttpStatus(u16),
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Decode,
    Cancelled,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::ClientSetup => write!(f, "client setup failed"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Decode => write!(f, "invalid response body"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// Wire shape shared by every paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Listing<T> {
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub url: String,
    /// Canonical URL of the traded instrument.
    pub instrument: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub state: String,
    pub quantity: String,
    #[serde(default)]
    pub cumulative_quantity: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub average_price: Option<String>,
    #[serde(default)]
    pub fees: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub url: String,
    /// Canonical URL of the held instrument.
    pub instrument: String,
    pub quantity: String,
    pub average_buy_price: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: String,
    pub url: String,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub simple_name: Option<String>,
    /// Canonical URL of the listing market.
    pub market: String,
    #[serde(default)]
    pub country: String,
}

impl Instrument {
    /// Short display name, falling back to the full legal name.
    pub fn display_name(&self) -> &str {
        self.simple_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub url: String,
    pub mic: String,
    pub acronym: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub timezone: String,
}
