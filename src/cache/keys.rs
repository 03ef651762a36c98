//! Fixed cache keys for the payment session

use std::fmt;

pub const VERSION: &str = "v1";
pub const NAMESPACE: &str = "multipay";

/// The three values the session mirrors into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKey {
    /// Serialized review rows.
    BatchData,
    /// References confirmed on the first screen.
    ValidTransactionIds,
    /// References handed to payment initialization.
    TransactionReferences,
}

impl SessionKey {
    pub fn name(&self) -> &'static str {
        match self {
            SessionKey::BatchData => "batch_data",
            SessionKey::ValidTransactionIds => "valid_transaction_ids",
            SessionKey::TransactionReferences => "transaction_references",
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", VERSION, NAMESPACE, self.name())
    }
}
