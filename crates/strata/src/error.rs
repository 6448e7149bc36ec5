//! Error types for Strata

use thiserror::Error;

use crate::tiers::TierKind;

/// Main error type for Strata operations
#[derive(Error, Debug)]
pub enum StrataError {
    /// A tier could not be reached or rejected the call
    #[error("{tier} tier unavailable: {message}")]
    TierUnavailable { tier: TierKind, message: String },

    /// A tier call exceeded its per-call timeout
    #[error("{tier} tier timed out after {timeout_ms}ms")]
    Timeout { tier: TierKind, timeout_ms: u64 },

    /// Unparseable candidate or legacy data
    #[error("Malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    /// The archive write succeeded but one or more derived writes did not
    #[error("Partial write for {conversation_id}: {failed:?} failed")]
    PartialWrite {
        conversation_id: String,
        failed: Vec<TierKind>,
    },

    /// The operation cannot continue at all (source unreadable, archive gone)
    #[error("Systemic failure: {0}")]
    Systemic(String),

    /// Read-back after a write did not show the expected record
    #[error("Verification failed for {id}: {message}")]
    Verification { id: String, message: String },

    /// Summarizer / topic extraction errors
    #[error("Summarizer error: {0}")]
    Summarizer(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied something unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StrataError {
    pub fn unavailable(tier: TierKind, message: impl Into<String>) -> Self {
        Self::TierUnavailable {
            tier,
            message: message.into(),
        }
    }

    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Tier-level failures the manager degrades around instead of raising.
    pub fn is_degradable(&self) -> bool {
        matches!(self, Self::TierUnavailable { .. } | Self::Timeout { .. })
    }

    /// The tier this error originated from, if any
    pub fn tier(&self) -> Option<TierKind> {
        match self {
            Self::TierUnavailable { tier, .. } | Self::Timeout { tier, .. } => Some(*tier),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;
