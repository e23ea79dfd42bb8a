//! Document unit of work: load, decide, persist.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the document from the store (tenant-scoped)
//!   ↓
//! 2. Handle the command (pure decision logic, produces events)
//!   ↓
//! 3. Save state + events (guard, optimistic concurrency, uniqueness)
//! ```
//!
//! Finalization adds number allocation around step 2: the next number is
//! read from the store, and a `SequenceConflict` at step 3 restarts the
//! whole unit of work with a fresh allocation.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use facturo_audit::{AuditExport, ExportPeriod};
use facturo_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion, TenantId};
use facturo_events::EventEnvelope;
use facturo_invoicing::{
    Cancel, CreateDraft, CreditNoteRequest, Document, DocumentCommand, DocumentId, Finalize,
    LineItemId, MarkPaid, MarkSent, RecordArchive,
};
use facturo_parties::{Client, SellerProfile};
use facturo_vat::{CountryVatConfig, VatScenario, VatScenarioResolver};

use crate::config::EngineConfig;
use crate::store::{DocumentFilter, DocumentStore, StoreError};

/// Service-level errors.
///
/// Domain failures (including guard violations raised inside a store) are
/// surfaced as `Domain`; only genuine infrastructure failures are `Store`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(e) => ServiceError::Domain(e),
            other => ServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Invoicing operations for one seller (tenant).
pub struct DocumentService<S> {
    store: S,
    vat: Arc<dyn CountryVatConfig>,
    seller: SellerProfile,
    config: EngineConfig,
}

impl<S> DocumentService<S>
where
    S: DocumentStore,
{
    pub fn new(
        store: S,
        vat: Arc<dyn CountryVatConfig>,
        seller: SellerProfile,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            vat,
            seller,
            config,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.seller.tenant_id
    }

    pub fn seller(&self) -> &SellerProfile {
        &self.seller
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolve_scenario(&self, client: &Client) -> ServiceResult<VatScenario> {
        self.ensure_own_client(client)?;
        Ok(VatScenarioResolver::new(&*self.vat).resolve_for_client(&self.seller, client)?)
    }

    /// New invoice draft for `client`, scoped to the VAT scenario of the pair.
    #[instrument(
        skip(self, client),
        fields(tenant_id = %self.tenant_id(), client_id = %client.id.0),
        err
    )]
    pub async fn create_invoice(
        &self,
        client: &Client,
        occurred_at: DateTime<Utc>,
    ) -> ServiceResult<Document> {
        let scenario = self.resolve_scenario(client)?;
        let command = CreateDraft::invoice(
            self.tenant_id(),
            DocumentId::new(AggregateId::new()),
            Some(client.id),
            &scenario,
            occurred_at,
        )?;
        let document = self.execute(DocumentCommand::CreateDraft(command)).await?;
        info!(
            document_id = %document.id_typed(),
            scenario = %scenario.key,
            "invoice draft created"
        );
        Ok(document)
    }

    pub async fn load(&self, document_id: DocumentId) -> ServiceResult<Document> {
        self.store
            .load(self.tenant_id(), document_id)
            .await?
            .ok_or(ServiceError::Domain(DomainError::NotFound))
    }

    /// Run one command against its document and persist the outcome.
    ///
    /// A command that decides no events (moving the first item up) saves
    /// nothing and returns the document unchanged.
    #[instrument(
        skip(self, command),
        fields(tenant_id = %self.tenant_id(), document_id = %command.document_id()),
        err
    )]
    pub async fn execute(&self, command: DocumentCommand) -> ServiceResult<Document> {
        if command.tenant_id() != self.tenant_id() {
            return Err(DomainError::validation(format!(
                "command for tenant {} sent to tenant {}",
                command.tenant_id(),
                self.tenant_id()
            ))
            .into());
        }

        let (mut document, expected_version) = match &command {
            DocumentCommand::CreateDraft(c) => {
                (Document::empty(c.document_id), ExpectedVersion::NoRecord)
            }
            other => {
                let document = self.load(other.document_id()).await?;
                let version = document.version();
                (document, ExpectedVersion::Exact(version))
            }
        };

        let events = document.execute(&command)?;
        if events.is_empty() {
            return Ok(document);
        }
        self.store.save(&document, &events, expected_version).await?;
        Ok(document)
    }

    /// Allocate the next number and finalize, retrying on sequence conflicts.
    ///
    /// Number, snapshots and status are saved together; a losing attempt
    /// leaves nothing behind.
    #[instrument(
        skip(self, buyer),
        fields(tenant_id = %self.tenant_id(), document_id = %document_id),
        err
    )]
    pub async fn finalize(
        &self,
        document_id: DocumentId,
        buyer: &Client,
        today: NaiveDate,
        occurred_at: DateTime<Utc>,
    ) -> ServiceResult<Document> {
        let max_attempts = self.config.finalize_max_retries.max(1);

        for attempt in 1..=max_attempts {
            let mut document = self.load(document_id).await?;
            let kind = document.kind();
            let prefix = self.config.numbering.prefix_for(kind);
            let highest = self
                .store
                .highest_sequence(self.tenant_id(), prefix, today.year())
                .await?;
            let number = self.config.numbering.next_after(kind, today.year(), highest)?;

            let command = DocumentCommand::Finalize(Finalize {
                tenant_id: self.tenant_id(),
                document_id,
                number: number.clone(),
                seller: self.seller.clone(),
                buyer: buyer.clone(),
                today,
                payment_terms_days: self.config.payment_terms_days,
                occurred_at,
            });
            let expected_version = ExpectedVersion::Exact(document.version());
            let events = document.execute(&command)?;

            match self.store.save(&document, &events, expected_version).await {
                Ok(()) => {
                    info!(%number, attempt, "document finalized");
                    return Ok(document);
                }
                Err(err) if err.is_sequence_conflict() => {
                    warn!(%number, attempt, error = %err, "number taken concurrently, retrying");
                    tokio::task::yield_now().await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(DomainError::sequence_conflict(format!(
            "could not allocate a number for document {document_id} after {max_attempts} attempts"
        ))
        .into())
    }

    pub async fn mark_sent(
        &self,
        document_id: DocumentId,
        occurred_at: DateTime<Utc>,
    ) -> ServiceResult<Document> {
        let document = self
            .execute(DocumentCommand::MarkSent(MarkSent {
                tenant_id: self.tenant_id(),
                document_id,
                occurred_at,
            }))
            .await?;
        info!(%document_id, "document marked as sent");
        Ok(document)
    }

    pub async fn mark_paid(
        &self,
        document_id: DocumentId,
        occurred_at: DateTime<Utc>,
    ) -> ServiceResult<Document> {
        let document = self
            .execute(DocumentCommand::MarkPaid(MarkPaid {
                tenant_id: self.tenant_id(),
                document_id,
                occurred_at,
            }))
            .await?;
        info!(%document_id, "document marked as paid");
        Ok(document)
    }

    pub async fn cancel(
        &self,
        document_id: DocumentId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> ServiceResult<Document> {
        let document = self
            .execute(DocumentCommand::Cancel(Cancel {
                tenant_id: self.tenant_id(),
                document_id,
                reason,
                occurred_at,
            }))
            .await?;
        info!(%document_id, "document cancelled");
        Ok(document)
    }

    /// Record the checksum the storage collaborator computed for the
    /// rendered artifact.
    pub async fn record_archive(
        &self,
        document_id: DocumentId,
        checksum: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> ServiceResult<Document> {
        self.execute(DocumentCommand::RecordArchive(RecordArchive {
            tenant_id: self.tenant_id(),
            document_id,
            checksum: checksum.into(),
            occurred_at,
        }))
        .await
    }

    /// Credit note draft against a finalized invoice.
    ///
    /// `items` selects a subset of the original's items; `None` credits all
    /// of them. An invoice can be credited at most once.
    #[instrument(
        skip(self, items, reason),
        fields(tenant_id = %self.tenant_id(), original = %original_id),
        err
    )]
    pub async fn create_credit_note(
        &self,
        original_id: DocumentId,
        items: Option<Vec<LineItemId>>,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> ServiceResult<Document> {
        let original = self.load(original_id).await?;
        let already_credited = self
            .store
            .find_credit_note_for(self.tenant_id(), original_id)
            .await?
            .is_some();

        let mut request = CreditNoteRequest::full(&original, already_credited);
        if let Some(items) = items {
            request = request.with_items(items);
        }
        if let Some(reason) = reason {
            request = request.with_reason(reason);
        }
        let command = request.into_command(DocumentId::new(AggregateId::new()), occurred_at)?;

        let credit_note = self.execute(DocumentCommand::CreateDraft(command)).await?;
        info!(credit_note_id = %credit_note.id_typed(), "credit note draft created");
        Ok(credit_note)
    }

    #[instrument(skip(self), fields(tenant_id = %self.tenant_id()), err)]
    pub async fn delete(&self, document_id: DocumentId) -> ServiceResult<()> {
        self.store.delete(self.tenant_id(), document_id).await?;
        Ok(())
    }

    pub async fn list(&self, filter: DocumentFilter) -> ServiceResult<Vec<Document>> {
        Ok(self.store.list(self.tenant_id(), filter).await?)
    }

    /// Audit trail of a document, oldest event first.
    pub async fn history(&self, document_id: DocumentId) -> ServiceResult<Vec<EventEnvelope>> {
        Ok(self.store.events(self.tenant_id(), document_id).await?)
    }

    /// Export bundle for one calendar year.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id()), err)]
    pub async fn audit_export(&self, year: i32, anonymize: bool) -> ServiceResult<AuditExport> {
        let documents = self.list(DocumentFilter::year(year)).await?;
        let export = AuditExport::build(ExportPeriod::calendar_year(year), &documents, anonymize)?;
        if !export.is_certifiable() {
            warn!(year, "audit export has sequence integrity issues");
        }
        Ok(export)
    }

    fn ensure_own_client(&self, client: &Client) -> ServiceResult<()> {
        if client.tenant_id == self.tenant_id() {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "client {} belongs to another tenant",
                client.id.0
            ))
            .into())
        }
    }
}
