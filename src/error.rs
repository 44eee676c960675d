// ⚠️ Error taxonomy for the group ledger core
//
// Every failure is one of four kinds so callers can tell "bad input"
// from "stale reference" from "state conflict" from "storage trouble".

use crate::identity::StableId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// ENTITY KIND (what a reference points at)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Category,
    Group,
    Expense,
    Split,
    Notification,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Category => "category",
            EntityKind::Group => "group",
            EntityKind::Expense => "expense",
            EntityKind::Split => "split",
            EntityKind::Notification => "notification",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ERROR KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller-supplied data violates a precondition
    Validation,
    /// A referenced entity does not exist
    Reference,
    /// A state transition is not allowed from the current state
    Conflict,
    /// Persistence layer failure
    Storage,
}

// ============================================================================
// LEDGER ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("cannot split an expense across an empty member set")]
    EmptyMemberSet,

    #[error("payer {0} is not a member of the group")]
    PayerNotMember(StableId),

    #[error("split does not reconcile: {0}")]
    SplitMismatch(String),

    #[error("invalid {field}: {message}")]
    InvalidInput { field: &'static str, message: String },

    #[error("{kind} not found: {id}")]
    ReferenceNotFound { kind: EntityKind, id: String },

    #[error("unknown id {0}")]
    NotFound(StableId),

    #[error("split {0} is already settled")]
    AlreadySettled(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub fn reference(kind: EntityKind, id: impl Into<String>) -> Self {
        LedgerError::ReferenceNotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        LedgerError::InvalidInput {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::EmptyMemberSet
            | LedgerError::PayerNotMember(_)
            | LedgerError::SplitMismatch(_)
            | LedgerError::InvalidInput { .. } => ErrorKind::Validation,
            LedgerError::ReferenceNotFound { .. } | LedgerError::NotFound(_) => {
                ErrorKind::Reference
            }
            LedgerError::AlreadySettled(_) => ErrorKind::Conflict,
            LedgerError::Database(_)
            | LedgerError::Storage(_)
            | LedgerError::Serialization(_) => ErrorKind::Storage,
        }
    }
}
