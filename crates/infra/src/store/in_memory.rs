use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use facturo_core::{AggregateRoot, DomainError, ExpectedVersion, TenantId};
use facturo_events::EventEnvelope;
use facturo_invoicing::{
    guard, Document, DocumentEvent, DocumentId, DocumentNumber, NumberingScheme,
};

use super::r#trait::{envelopes, owning_tenant, DocumentFilter, DocumentStore, StoreError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct DocumentKey {
    tenant_id: TenantId,
    document_id: DocumentId,
}

#[derive(Debug)]
struct Entry {
    document: Document,
    trail: Vec<EventEnvelope>,
}

/// In-memory document store.
///
/// Intended for tests/dev. A single write lock covers the guard, the
/// numbering and uniqueness checks and the write, which makes every save
/// atomic.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentKey, Entry>>,
    numbering: NumberingScheme,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store accepting numbers of `numbering` instead of the default scheme.
    pub fn with_numbering(numbering: NumberingScheme) -> Self {
        Self {
            documents: RwLock::default(),
            numbering,
        }
    }

    fn key(tenant_id: TenantId, document_id: DocumentId) -> DocumentKey {
        DocumentKey {
            tenant_id,
            document_id,
        }
    }

    fn poisoned<T>(_: T) -> StoreError {
        StoreError::Backend("lock poisoned".to_string())
    }
}

fn highest_committed(
    documents: &HashMap<DocumentKey, Entry>,
    tenant_id: TenantId,
    prefix: &str,
    year: i32,
) -> Option<u32> {
    documents
        .iter()
        .filter(|(k, _)| k.tenant_id == tenant_id)
        .filter_map(|(_, entry)| entry.document.number())
        .filter(|n| n.prefix() == prefix && n.year() == year)
        .map(DocumentNumber::sequence)
        .max()
}

/// Number and credit-note uniqueness against the other documents of the tenant.
fn ensure_unique(
    documents: &HashMap<DocumentKey, Entry>,
    key: DocumentKey,
    next: &Document,
) -> Result<(), StoreError> {
    let siblings = documents
        .iter()
        .filter(|(k, _)| k.tenant_id == key.tenant_id && k.document_id != key.document_id)
        .map(|(_, entry)| &entry.document);

    for other in siblings {
        if let (Some(mine), Some(theirs)) = (next.number(), other.number()) {
            if mine.slot() == theirs.slot() {
                return Err(DomainError::sequence_conflict(format!(
                    "number {mine} is already held by document {}",
                    other.id_typed()
                ))
                .into());
            }
        }
        if let (Some(mine), Some(theirs)) = (next.credit_note_of(), other.credit_note_of()) {
            if mine.document_id == theirs.document_id {
                return Err(DomainError::conflict(format!(
                    "document {} already has credit note {}",
                    mine.document_id,
                    other.id_typed()
                ))
                .into());
            }
        }
    }
    Ok(())
}

fn listing_order(document: &Document) -> (bool, String, i32, u32) {
    match document.number() {
        Some(n) => (false, n.prefix().to_string(), n.year(), n.sequence()),
        None => (true, String::new(), 0, 0),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().map_err(Self::poisoned)?;
        Ok(documents
            .get(&Self::key(tenant_id, document_id))
            .map(|entry| entry.document.clone()))
    }

    async fn save(
        &self,
        document: &Document,
        events: &[DocumentEvent],
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let tenant_id = owning_tenant(document)?;
        let key = Self::key(tenant_id, document.id_typed());

        let mut documents = self.documents.write().map_err(Self::poisoned)?;

        let current = documents.get(&key).map(|entry| &entry.document);
        let current_version = current.map(AggregateRoot::version);
        if !expected_version.matches(current_version) {
            return Err(StoreError::Concurrency(format!(
                "document {}: expected {expected_version:?}, found {current_version:?}",
                key.document_id
            )));
        }
        match current {
            None => guard::verify_insert(document)?,
            Some(previous) => guard::verify_update(previous, document)?,
        }
        if let Some(number) = guard::assigned_number(current, document) {
            let highest = highest_committed(&documents, tenant_id, number.prefix(), number.year());
            guard::verify_assigned_number(document, &self.numbering, highest)?;
        }
        ensure_unique(&documents, key, document)?;

        let trail = envelopes(tenant_id, document, events, current_version.unwrap_or(0))?;
        let entry = documents.entry(key).or_insert_with(|| Entry {
            document: document.clone(),
            trail: Vec::new(),
        });
        entry.document = document.clone();
        entry.trail.extend(trail);
        Ok(())
    }

    async fn delete(&self, tenant_id: TenantId, document_id: DocumentId) -> Result<(), StoreError> {
        let key = Self::key(tenant_id, document_id);
        let mut documents = self.documents.write().map_err(Self::poisoned)?;
        let entry = documents.get(&key).ok_or(DomainError::NotFound)?;
        guard::verify_delete(&entry.document)?;
        documents.remove(&key);
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        filter: DocumentFilter,
    ) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().map_err(Self::poisoned)?;
        let mut out: Vec<Document> = documents
            .iter()
            .filter(|(k, entry)| k.tenant_id == tenant_id && filter.matches(&entry.document))
            .map(|(_, entry)| entry.document.clone())
            .collect();
        out.sort_by_key(listing_order);
        Ok(out)
    }

    async fn highest_sequence(
        &self,
        tenant_id: TenantId,
        prefix: &str,
        year: i32,
    ) -> Result<Option<u32>, StoreError> {
        let documents = self.documents.read().map_err(Self::poisoned)?;
        Ok(highest_committed(&documents, tenant_id, prefix, year))
    }

    async fn find_credit_note_for(
        &self,
        tenant_id: TenantId,
        original: DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().map_err(Self::poisoned)?;
        Ok(documents
            .iter()
            .filter(|(k, _)| k.tenant_id == tenant_id)
            .map(|(_, entry)| &entry.document)
            .find(|d| d.credit_note_of().is_some_and(|of| of.document_id == original))
            .cloned())
    }

    async fn events(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let documents = self.documents.read().map_err(Self::poisoned)?;
        Ok(documents
            .get(&Self::key(tenant_id, document_id))
            .map(|entry| entry.trail.clone())
            .unwrap_or_default())
    }
}
