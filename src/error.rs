//! Error taxonomy for the register core.
//!
//! Validation rejections inside the cart and payment session are not errors:
//! those operations are no-ops that report `false`. Everything that crosses
//! the store, the network or the commit pipeline surfaces as a [`PosError`].

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PosError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("cart is empty")]
    EmptyCart,

    #[error("payment incomplete: {remaining} remaining")]
    PaymentIncomplete { remaining: Decimal },

    #[error("a checkout is already in flight for draft {draft_id}")]
    CheckoutInProgress { draft_id: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("remote store rejected request (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("order {order_id} was created remotely but {stage} failed: {message}")]
    PartialCommit {
        order_id: String,
        stage: CommitStage,
        message: String,
    },

    #[error("local store: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("local store lock poisoned")]
    StorePoisoned,

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration: {0}")]
    Config(String),
}

/// Remote write stage reached by an online commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    Header,
    Items,
    Payments,
}

impl std::fmt::Display for CommitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CommitStage::Header => "order header",
            CommitStage::Items => "order items",
            CommitStage::Payments => "payments",
        })
    }
}

impl PosError {
    /// Errors that mean "the remote store could not be reached", as opposed
    /// to the store answering with a rejection.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, PosError::Network(_) | PosError::Timeout(_))
            || matches!(self, PosError::Remote { status, .. } if *status >= 500)
    }
}

impl From<reqwest::Error> for PosError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return PosError::Timeout(0);
        }
        if let Some(status) = err.status() {
            return PosError::Remote {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        PosError::Network(err.to_string())
    }
}

pub type PosResult<T> = Result<T, PosError>;
