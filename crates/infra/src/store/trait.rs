use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use facturo_core::{AggregateRoot, DomainError, ExpectedVersion, TenantId};
use facturo_events::EventEnvelope;
use facturo_invoicing::{Document, DocumentEvent, DocumentId, DocumentKind, DocumentStatus};

/// Infrastructure-level store errors.
///
/// Guard violations and number collisions stay typed `DomainError`s inside
/// `Domain`, so callers see the document id, status and attempted change.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Optimistic concurrency failure (stale document version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// A stored body could not be encoded or decoded.
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// The backend failed (connection, pool, unexpected SQL error).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Another document committed the same number first.
    pub fn is_sequence_conflict(&self) -> bool {
        matches!(self, StoreError::Domain(DomainError::SequenceConflict(_)))
    }
}

/// Listing filter. Unset fields match everything.
///
/// `year` matches the year of the document number, so unnumbered drafts
/// never match a year filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    pub kind: Option<DocumentKind>,
    pub status: Option<DocumentStatus>,
    pub year: Option<i32>,
}

impl DocumentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.kind.is_none_or(|k| document.kind() == k)
            && self.status.is_none_or(|s| document.status() == s)
            && self
                .year
                .is_none_or(|y| document.number().is_some_and(|n| n.year() == y))
    }
}

/// Tenant-scoped document persistence.
///
/// Every implementation must:
/// - run `facturo_invoicing::guard` before writing, so a finalized document
///   cannot be corrupted or deleted whichever code path calls the store;
/// - reject a second document holding the same `(tenant, number)` with
///   `DomainError::SequenceConflict`;
/// - reject a second credit note against the same original with
///   `DomainError::Conflict`;
/// - append the saved events to the document's audit trail in the same
///   unit of work as the document itself.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Option<Document>, StoreError>;

    /// Persist `document` (already evolved by `events`).
    ///
    /// `expected_version` is the version the caller loaded (`NoRecord` for a
    /// new document).
    async fn save(
        &self,
        document: &Document,
        events: &[DocumentEvent],
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Remove a draft. Non-draft documents are refused by the guard.
    async fn delete(&self, tenant_id: TenantId, document_id: DocumentId) -> Result<(), StoreError>;

    /// Documents of a tenant, numbered ones first in number order.
    async fn list(
        &self,
        tenant_id: TenantId,
        filter: DocumentFilter,
    ) -> Result<Vec<Document>, StoreError>;

    /// Highest committed sequence for `prefix`/`year`, `None` when the year
    /// has no numbered document yet.
    async fn highest_sequence(
        &self,
        tenant_id: TenantId,
        prefix: &str,
        year: i32,
    ) -> Result<Option<u32>, StoreError>;

    async fn find_credit_note_for(
        &self,
        tenant_id: TenantId,
        original: DocumentId,
    ) -> Result<Option<Document>, StoreError>;

    /// The append-only audit trail of a document, oldest first.
    async fn events(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<EventEnvelope>, StoreError>;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn load(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        (**self).load(tenant_id, document_id).await
    }

    async fn save(
        &self,
        document: &Document,
        events: &[DocumentEvent],
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).save(document, events, expected_version).await
    }

    async fn delete(&self, tenant_id: TenantId, document_id: DocumentId) -> Result<(), StoreError> {
        (**self).delete(tenant_id, document_id).await
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        filter: DocumentFilter,
    ) -> Result<Vec<Document>, StoreError> {
        (**self).list(tenant_id, filter).await
    }

    async fn highest_sequence(
        &self,
        tenant_id: TenantId,
        prefix: &str,
        year: i32,
    ) -> Result<Option<u32>, StoreError> {
        (**self).highest_sequence(tenant_id, prefix, year).await
    }

    async fn find_credit_note_for(
        &self,
        tenant_id: TenantId,
        original: DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        (**self).find_credit_note_for(tenant_id, original).await
    }

    async fn events(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        (**self).events(tenant_id, document_id).await
    }
}

/// The tenant a document is saved under.
pub(crate) fn owning_tenant(document: &Document) -> Result<TenantId, StoreError> {
    document.tenant_id().ok_or_else(|| {
        StoreError::Domain(DomainError::invariant(format!(
            "document {} has no tenant",
            document.id_typed()
        )))
    })
}

/// Wrap `events` produced on top of version `base` into envelopes.
pub(crate) fn envelopes(
    tenant_id: TenantId,
    document: &Document,
    events: &[DocumentEvent],
    base: u64,
) -> Result<Vec<EventEnvelope>, StoreError> {
    let expected = base + events.len() as u64;
    if expected != document.version() {
        return Err(StoreError::Domain(DomainError::invariant(format!(
            "document {} is at version {} but {} events were saved on top of {base}",
            document.id_typed(),
            document.version(),
            events.len()
        ))));
    }

    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            EventEnvelope::from_typed(
                tenant_id,
                document.id_typed().0,
                facturo_invoicing::AGGREGATE_TYPE,
                base + i as u64 + 1,
                event,
            )
            .map_err(StoreError::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_conflicts_are_recognised() {
        let err = StoreError::from(DomainError::sequence_conflict("INV-2026-001 taken"));
        assert!(err.is_sequence_conflict());
        assert!(!StoreError::Concurrency("stale".into()).is_sequence_conflict());
        assert_eq!(err.to_string(), "sequence conflict: INV-2026-001 taken");
    }
}
