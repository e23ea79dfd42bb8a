//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, lifecycle violations). Infrastructure concerns belong elsewhere.
///
/// Lifecycle violations carry enough context (document id, current status,
/// attempted change) to be actionable by whoever receives them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A monetary or numeric input is malformed or out of its domain
    /// (negative quantity, unsupported VAT rate, ...).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A mutation or deletion was attempted on a document that left draft.
    #[error("document {document_id} is immutable in status '{status}': {attempted}")]
    ImmutableDocument {
        document_id: String,
        status: String,
        attempted: String,
    },

    /// A status change that is not part of the lifecycle table.
    #[error("invalid transition for document {document_id}: {from} -> {to}")]
    InvalidTransition {
        document_id: String,
        from: String,
        to: String,
    },

    /// Two writers tried to claim the same document number.
    #[error("sequence conflict: {0}")]
    SequenceConflict(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn immutable(
        document_id: impl ToString,
        status: impl ToString,
        attempted: impl Into<String>,
    ) -> Self {
        Self::ImmutableDocument {
            document_id: document_id.to_string(),
            status: status.to_string(),
            attempted: attempted.into(),
        }
    }

    pub fn invalid_transition(
        document_id: impl ToString,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            document_id: document_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn sequence_conflict(msg: impl Into<String>) -> Self {
        Self::SequenceConflict(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
