use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use facturo_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, TenantId, VatRate};
use facturo_events::Event;
use facturo_parties::{Client, ClientId, SellerProfile};
use facturo_vat::{ScenarioKey, VatMentionSelection, VatScenario};

use crate::currency::Currency;
use crate::lifecycle::{ensure_draft, ensure_transition, DocumentStatus};
use crate::line_item::{LineItem, LineItemId, LineItemInput};
use crate::numbering::DocumentNumber;
use crate::snapshot::{
    prefer_snapshot, BuyerSnapshot, PartySnapshots, PartyView, SellerSnapshot, SnapshotManager,
};
use crate::totals::{DocumentTotals, DocumentTotalsAggregator};

/// Aggregate type recorded on every event envelope of a document.
pub const AGGREGATE_TYPE: &str = "invoicing.document";

/// Document identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub AggregateId);

impl DocumentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    CreditNote,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::CreditNote => "credit_note",
        }
    }

    /// Negative unit prices are a property of the document type.
    pub fn allows_negative_prices(&self) -> bool {
        matches!(self, DocumentKind::CreditNote)
    }
}

impl core::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Back-reference from a credit note to the invoice it corrects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteOf {
    pub document_id: DocumentId,
    pub number: DocumentNumber,
}

/// Archival metadata handed over by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub checksum: String,
    pub archived_at: DateTime<Utc>,
}

/// The VAT scenario a draft was set up for and the rates it offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateScope {
    pub scenario: ScenarioKey,
    pub rates: Vec<VatRate>,
}

impl RateScope {
    pub fn new(scenario: ScenarioKey, rates: impl IntoIterator<Item = VatRate>) -> DomainResult<Self> {
        let mut unique: Vec<VatRate> = Vec::new();
        for rate in rates {
            if !unique.contains(&rate) {
                unique.push(rate);
            }
        }
        if unique.is_empty() {
            return Err(DomainError::validation("a document needs at least one VAT rate option"));
        }
        Ok(Self {
            scenario,
            rates: unique,
        })
    }

    pub fn from_scenario(scenario: &VatScenario) -> DomainResult<Self> {
        Self::new(scenario.key, scenario.allowed_rates())
    }

    pub fn allows(&self, rate: VatRate) -> bool {
        self.rates.contains(&rate)
    }
}

/// Editable header fields of a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftHeader {
    pub client_id: Option<ClientId>,
    pub currency: Currency,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub subject: Option<String>,
    pub notes: Option<String>,
    pub vat_mention: VatMentionSelection,
}

impl DraftHeader {
    pub fn new(client_id: Option<ClientId>, vat_mention: VatMentionSelection) -> Self {
        Self {
            client_id,
            currency: Currency::default(),
            issue_date: None,
            due_date: None,
            subject: None,
            notes: None,
            vat_mention,
        }
    }

    fn validate(&self) -> DomainResult<()> {
        if let (Some(issue), Some(due)) = (self.issue_date, self.due_date) {
            if due < issue {
                return Err(DomainError::validation(format!(
                    "due date {due} is before issue date {issue}"
                )));
            }
        }
        Ok(())
    }
}

/// Aggregate root: an invoice or a credit note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    tenant_id: Option<TenantId>,
    kind: DocumentKind,
    status: DocumentStatus,
    number: Option<DocumentNumber>,
    header: DraftHeader,
    rate_scope: Option<RateScope>,
    credit_note_of: Option<CreditNoteOf>,
    items: Vec<LineItem>,
    totals: DocumentTotals,
    snapshots: Option<PartySnapshots>,
    finalized_at: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    archive: Option<ArchiveRecord>,
    version: u64,
    created: bool,
}

impl Document {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DocumentId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: DocumentKind::Invoice,
            status: DocumentStatus::Draft,
            number: None,
            header: DraftHeader::new(None, VatMentionSelection::default()),
            rate_scope: None,
            credit_note_of: None,
            items: Vec::new(),
            totals: DocumentTotals::default(),
            snapshots: None,
            finalized_at: None,
            sent_at: None,
            paid_at: None,
            archive: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DocumentId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    pub fn is_draft(&self) -> bool {
        self.status.is_draft()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn number(&self) -> Option<&DocumentNumber> {
        self.number.as_ref()
    }

    pub fn header(&self) -> &DraftHeader {
        &self.header
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.header.client_id
    }

    pub fn currency(&self) -> &Currency {
        &self.header.currency
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.header.issue_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.header.due_date
    }

    pub fn vat_mention(&self) -> &VatMentionSelection {
        &self.header.vat_mention
    }

    pub fn rate_scope(&self) -> Option<&RateScope> {
        self.rate_scope.as_ref()
    }

    pub fn credit_note_of(&self) -> Option<&CreditNoteOf> {
        self.credit_note_of.as_ref()
    }

    /// Items in display order.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn item(&self, item_id: LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn snapshots(&self) -> Option<&PartySnapshots> {
        self.snapshots.as_ref()
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn archive(&self) -> Option<&ArchiveRecord> {
        self.archive.as_ref()
    }

    /// Seller data for display. Live data is only read while this is a draft.
    pub fn seller_view<'a>(&'a self, live: &SellerProfile) -> PartyView<'a, SellerSnapshot> {
        prefer_snapshot(
            self.snapshots.as_ref().map(PartySnapshots::seller),
            live,
            SellerSnapshot::capture,
        )
    }

    /// Buyer data for display. Live data is only read while this is a draft.
    pub fn buyer_view<'a>(&'a self, live: &Client) -> PartyView<'a, BuyerSnapshot> {
        prefer_snapshot(
            self.snapshots.as_ref().map(PartySnapshots::buyer),
            live,
            BuyerSnapshot::capture,
        )
    }

    /// Invariant: only drafts may be deleted.
    pub fn ensure_deletable(&self) -> DomainResult<()> {
        ensure_draft(self.id, self.status, "delete document")
    }
}

impl AggregateRoot for Document {
    type Id = DocumentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// A line a draft is created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftItem {
    pub item_id: LineItemId,
    pub item: LineItemInput,
}

impl DraftItem {
    pub fn new(item: LineItemInput) -> Self {
        Self {
            item_id: LineItemId::new(),
            item,
        }
    }
}

/// Command: CreateDraft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDraft {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub kind: DocumentKind,
    pub header: DraftHeader,
    pub rate_scope: RateScope,
    pub credit_note_of: Option<CreditNoteOf>,
    /// Items the draft starts with (credit notes copy theirs from the original).
    pub items: Vec<DraftItem>,
    pub occurred_at: DateTime<Utc>,
}

impl CreateDraft {
    /// An empty invoice draft set up for `scenario`.
    pub fn invoice(
        tenant_id: TenantId,
        document_id: DocumentId,
        client_id: Option<ClientId>,
        scenario: &VatScenario,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            tenant_id,
            document_id,
            kind: DocumentKind::Invoice,
            header: DraftHeader::new(client_id, scenario.default_mention()),
            rate_scope: RateScope::from_scenario(scenario)?,
            credit_note_of: None,
            items: Vec::new(),
            occurred_at,
        })
    }
}

/// Command: UpdateDraft. Replaces the header; optionally re-scopes the rates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDraft {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub header: DraftHeader,
    pub rate_scope: Option<RateScope>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub item_id: LineItemId,
    pub item: LineItemInput,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItem {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub item_id: LineItemId,
    pub item: LineItemInput,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub item_id: LineItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReorderItems. `order` must be a permutation of the current items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderItems {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub order: Vec<LineItemId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

/// Command: MoveItem. Swaps an item with its neighbour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveItem {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub item_id: LineItemId,
    pub direction: MoveDirection,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Finalize.
///
/// `number` is allocated by the caller; the store rejects it unless it is the
/// next number of the document kind's sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finalize {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub number: DocumentNumber,
    pub seller: SellerProfile,
    pub buyer: Client,
    pub today: NaiveDate,
    pub payment_terms_days: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSent {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPaid {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordArchive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordArchive {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub checksum: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentCommand {
    CreateDraft(CreateDraft),
    UpdateDraft(UpdateDraft),
    AddItem(AddItem),
    UpdateItem(UpdateItem),
    RemoveItem(RemoveItem),
    ReorderItems(ReorderItems),
    MoveItem(MoveItem),
    Finalize(Finalize),
    MarkSent(MarkSent),
    MarkPaid(MarkPaid),
    Cancel(Cancel),
    RecordArchive(RecordArchive),
}

impl DocumentCommand {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            DocumentCommand::CreateDraft(c) => c.tenant_id,
            DocumentCommand::UpdateDraft(c) => c.tenant_id,
            DocumentCommand::AddItem(c) => c.tenant_id,
            DocumentCommand::UpdateItem(c) => c.tenant_id,
            DocumentCommand::RemoveItem(c) => c.tenant_id,
            DocumentCommand::ReorderItems(c) => c.tenant_id,
            DocumentCommand::MoveItem(c) => c.tenant_id,
            DocumentCommand::Finalize(c) => c.tenant_id,
            DocumentCommand::MarkSent(c) => c.tenant_id,
            DocumentCommand::MarkPaid(c) => c.tenant_id,
            DocumentCommand::Cancel(c) => c.tenant_id,
            DocumentCommand::RecordArchive(c) => c.tenant_id,
        }
    }

    pub fn document_id(&self) -> DocumentId {
        match self {
            DocumentCommand::CreateDraft(c) => c.document_id,
            DocumentCommand::UpdateDraft(c) => c.document_id,
            DocumentCommand::AddItem(c) => c.document_id,
            DocumentCommand::UpdateItem(c) => c.document_id,
            DocumentCommand::RemoveItem(c) => c.document_id,
            DocumentCommand::ReorderItems(c) => c.document_id,
            DocumentCommand::MoveItem(c) => c.document_id,
            DocumentCommand::Finalize(c) => c.document_id,
            DocumentCommand::MarkSent(c) => c.document_id,
            DocumentCommand::MarkPaid(c) => c.document_id,
            DocumentCommand::Cancel(c) => c.document_id,
            DocumentCommand::RecordArchive(c) => c.document_id,
        }
    }
}

/// Event: DocumentCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCreated {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub kind: DocumentKind,
    pub header: DraftHeader,
    pub rate_scope: RateScope,
    pub credit_note_of: Option<CreditNoteOf>,
    pub items: Vec<LineItem>,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DraftUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftUpdated {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub header: DraftHeader,
    pub rate_scope: RateScope,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub item: LineItem,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdated {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub item: LineItem,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRemoved. Remaining positions are compacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoved {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub item_id: LineItemId,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemsReordered. Position-only; carries no totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsReordered {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub order: Vec<LineItemId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DocumentFinalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFinalized {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub number: DocumentNumber,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub snapshots: PartySnapshots,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DocumentSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSent {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DocumentPaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPaid {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DocumentCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCancelled {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ArchiveRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecorded {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub archive: ArchiveRecord,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentEvent {
    DocumentCreated(DocumentCreated),
    DraftUpdated(DraftUpdated),
    ItemAdded(ItemAdded),
    ItemUpdated(ItemUpdated),
    ItemRemoved(ItemRemoved),
    ItemsReordered(ItemsReordered),
    DocumentFinalized(DocumentFinalized),
    DocumentSent(DocumentSent),
    DocumentPaid(DocumentPaid),
    DocumentCancelled(DocumentCancelled),
    ArchiveRecorded(ArchiveRecorded),
}

impl Event for DocumentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DocumentEvent::DocumentCreated(_) => "invoicing.document.created",
            DocumentEvent::DraftUpdated(_) => "invoicing.document.draft_updated",
            DocumentEvent::ItemAdded(_) => "invoicing.document.item_added",
            DocumentEvent::ItemUpdated(_) => "invoicing.document.item_updated",
            DocumentEvent::ItemRemoved(_) => "invoicing.document.item_removed",
            DocumentEvent::ItemsReordered(_) => "invoicing.document.items_reordered",
            DocumentEvent::DocumentFinalized(_) => "invoicing.document.finalized",
            DocumentEvent::DocumentSent(_) => "invoicing.document.sent",
            DocumentEvent::DocumentPaid(_) => "invoicing.document.paid",
            DocumentEvent::DocumentCancelled(_) => "invoicing.document.cancelled",
            DocumentEvent::ArchiveRecorded(_) => "invoicing.document.archive_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DocumentEvent::DocumentCreated(e) => e.occurred_at,
            DocumentEvent::DraftUpdated(e) => e.occurred_at,
            DocumentEvent::ItemAdded(e) => e.occurred_at,
            DocumentEvent::ItemUpdated(e) => e.occurred_at,
            DocumentEvent::ItemRemoved(e) => e.occurred_at,
            DocumentEvent::ItemsReordered(e) => e.occurred_at,
            DocumentEvent::DocumentFinalized(e) => e.occurred_at,
            DocumentEvent::DocumentSent(e) => e.occurred_at,
            DocumentEvent::DocumentPaid(e) => e.occurred_at,
            DocumentEvent::DocumentCancelled(e) => e.occurred_at,
            DocumentEvent::ArchiveRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Document {
    type Command = DocumentCommand;
    type Event = DocumentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DocumentEvent::DocumentCreated(e) => {
                self.id = e.document_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.status = DocumentStatus::Draft;
                self.header = e.header.clone();
                self.rate_scope = Some(e.rate_scope.clone());
                self.credit_note_of = e.credit_note_of.clone();
                self.items = e.items.clone();
                self.totals = e.totals.clone();
                self.created = true;
            }
            DocumentEvent::DraftUpdated(e) => {
                self.header = e.header.clone();
                self.rate_scope = Some(e.rate_scope.clone());
            }
            DocumentEvent::ItemAdded(e) => {
                self.items.push(e.item.clone());
                self.totals = e.totals.clone();
            }
            DocumentEvent::ItemUpdated(e) => {
                if let Some(slot) = self.items.iter_mut().find(|i| i.id == e.item.id) {
                    *slot = e.item.clone();
                }
                self.totals = e.totals.clone();
            }
            DocumentEvent::ItemRemoved(e) => {
                self.items.retain(|i| i.id != e.item_id);
                renumber(&mut self.items);
                self.totals = e.totals.clone();
            }
            DocumentEvent::ItemsReordered(e) => {
                for (index, item_id) in e.order.iter().enumerate() {
                    if let Some(item) = self.items.iter_mut().find(|i| i.id == *item_id) {
                        item.position = index as u32 + 1;
                    }
                }
                self.items.sort_by_key(|i| i.position);
            }
            DocumentEvent::DocumentFinalized(e) => {
                self.number = Some(e.number.clone());
                self.header.issue_date = Some(e.issue_date);
                self.header.due_date = Some(e.due_date);
                self.snapshots = Some(e.snapshots.clone());
                self.finalized_at = Some(e.occurred_at);
                self.status = DocumentStatus::Finalized;
            }
            DocumentEvent::DocumentSent(e) => {
                self.sent_at = Some(e.occurred_at);
                self.status = DocumentStatus::Sent;
            }
            DocumentEvent::DocumentPaid(e) => {
                self.paid_at = Some(e.occurred_at);
                self.status = DocumentStatus::Paid;
            }
            DocumentEvent::DocumentCancelled(_) => {
                self.status = DocumentStatus::Cancelled;
            }
            DocumentEvent::ArchiveRecorded(e) => {
                self.archive = Some(e.archive.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DocumentCommand::CreateDraft(cmd) => self.handle_create(cmd),
            DocumentCommand::UpdateDraft(cmd) => self.handle_update_draft(cmd),
            DocumentCommand::AddItem(cmd) => self.handle_add_item(cmd),
            DocumentCommand::UpdateItem(cmd) => self.handle_update_item(cmd),
            DocumentCommand::RemoveItem(cmd) => self.handle_remove_item(cmd),
            DocumentCommand::ReorderItems(cmd) => self.handle_reorder(cmd),
            DocumentCommand::MoveItem(cmd) => self.handle_move(cmd),
            DocumentCommand::Finalize(cmd) => self.handle_finalize(cmd),
            DocumentCommand::MarkSent(cmd) => self.handle_mark_sent(cmd),
            DocumentCommand::MarkPaid(cmd) => self.handle_mark_paid(cmd),
            DocumentCommand::Cancel(cmd) => self.handle_cancel(cmd),
            DocumentCommand::RecordArchive(cmd) => self.handle_record_archive(cmd),
        }
    }
}

fn renumber(items: &mut [LineItem]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.position = index as u32 + 1;
    }
}

impl Document {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_document_id(&self, document_id: DocumentId) -> Result<(), DomainError> {
        if self.id != document_id {
            return Err(DomainError::invariant("document_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self, tenant_id: TenantId, document_id: DocumentId) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_document_id(document_id)
    }

    /// Existence checks plus the draft-only content guard.
    fn ensure_editable(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        attempted: &str,
    ) -> DomainResult<&RateScope> {
        self.ensure_exists(tenant_id, document_id)?;
        ensure_draft(self.id, self.status, attempted)?;
        self.rate_scope
            .as_ref()
            .ok_or_else(|| DomainError::invariant("draft without rate options"))
    }

    fn build_item(
        kind: DocumentKind,
        scope: &RateScope,
        item_id: LineItemId,
        input: &LineItemInput,
        position: u32,
    ) -> DomainResult<LineItem> {
        if !scope.allows(input.vat_rate) {
            return Err(DomainError::invalid_amount(format!(
                "VAT rate {} is not offered for this document ({})",
                input.vat_rate, scope.scenario
            )));
        }
        LineItem::build(item_id, input, position, kind.allows_negative_prices())
    }

    fn handle_create(&self, cmd: &CreateDraft) -> Result<Vec<DocumentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("document already exists"));
        }

        match (cmd.kind, &cmd.credit_note_of) {
            (DocumentKind::CreditNote, None) => {
                return Err(DomainError::validation(
                    "a credit note must reference the invoice it corrects",
                ));
            }
            (DocumentKind::Invoice, Some(_)) => {
                return Err(DomainError::validation(
                    "only credit notes reference an original invoice",
                ));
            }
            _ => {}
        }

        cmd.header.validate()?;

        let items = cmd
            .items
            .iter()
            .enumerate()
            .map(|(index, draft_item)| {
                Self::build_item(
                    cmd.kind,
                    &cmd.rate_scope,
                    draft_item.item_id,
                    &draft_item.item,
                    index as u32 + 1,
                )
            })
            .collect::<DomainResult<Vec<_>>>()?;
        let totals = DocumentTotalsAggregator::aggregate(&items)?;

        Ok(vec![DocumentEvent::DocumentCreated(DocumentCreated {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            kind: cmd.kind,
            header: cmd.header.clone(),
            rate_scope: cmd.rate_scope.clone(),
            credit_note_of: cmd.credit_note_of.clone(),
            items,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_draft(&self, cmd: &UpdateDraft) -> Result<Vec<DocumentEvent>, DomainError> {
        let current = self.ensure_editable(cmd.tenant_id, cmd.document_id, "update draft")?;
        cmd.header.validate()?;

        let rate_scope = cmd.rate_scope.clone().unwrap_or_else(|| current.clone());
        if let Some(item) = self.items.iter().find(|i| !rate_scope.allows(i.vat_rate)) {
            return Err(DomainError::invalid_amount(format!(
                "item '{}' uses VAT rate {} which the new scenario {} does not offer",
                item.title, item.vat_rate, rate_scope.scenario
            )));
        }

        Ok(vec![DocumentEvent::DraftUpdated(DraftUpdated {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            header: cmd.header.clone(),
            rate_scope,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> Result<Vec<DocumentEvent>, DomainError> {
        let scope = self.ensure_editable(cmd.tenant_id, cmd.document_id, "add item")?;
        if self.item(cmd.item_id).is_some() {
            return Err(DomainError::conflict(format!("item {} already exists", cmd.item_id)));
        }

        let position = self.items.len() as u32 + 1;
        let item = Self::build_item(self.kind, scope, cmd.item_id, &cmd.item, position)?;

        let mut items = self.items.clone();
        items.push(item.clone());
        let totals = DocumentTotalsAggregator::aggregate(&items)?;

        Ok(vec![DocumentEvent::ItemAdded(ItemAdded {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            item,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_item(&self, cmd: &UpdateItem) -> Result<Vec<DocumentEvent>, DomainError> {
        let scope = self.ensure_editable(cmd.tenant_id, cmd.document_id, "update item")?;
        let existing = self.item(cmd.item_id).ok_or_else(DomainError::not_found)?;

        let item = Self::build_item(self.kind, scope, cmd.item_id, &cmd.item, existing.position)?;

        let items: Vec<LineItem> = self
            .items
            .iter()
            .map(|i| if i.id == item.id { item.clone() } else { i.clone() })
            .collect();
        let totals = DocumentTotalsAggregator::aggregate(&items)?;

        Ok(vec![DocumentEvent::ItemUpdated(ItemUpdated {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            item,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveItem) -> Result<Vec<DocumentEvent>, DomainError> {
        self.ensure_editable(cmd.tenant_id, cmd.document_id, "remove item")?;
        if self.item(cmd.item_id).is_none() {
            return Err(DomainError::not_found());
        }

        let remaining: Vec<LineItem> = self
            .items
            .iter()
            .filter(|i| i.id != cmd.item_id)
            .cloned()
            .collect();
        let totals = DocumentTotalsAggregator::aggregate(&remaining)?;

        Ok(vec![DocumentEvent::ItemRemoved(ItemRemoved {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            item_id: cmd.item_id,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reorder(&self, cmd: &ReorderItems) -> Result<Vec<DocumentEvent>, DomainError> {
        self.ensure_editable(cmd.tenant_id, cmd.document_id, "reorder items")?;

        let mut requested = cmd.order.clone();
        requested.sort();
        requested.dedup();
        let mut current: Vec<LineItemId> = self.items.iter().map(|i| i.id).collect();
        current.sort();
        if requested.len() != cmd.order.len() || requested != current {
            return Err(DomainError::validation(
                "reorder must list every item of the document exactly once",
            ));
        }

        Ok(vec![DocumentEvent::ItemsReordered(ItemsReordered {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            order: cmd.order.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_move(&self, cmd: &MoveItem) -> Result<Vec<DocumentEvent>, DomainError> {
        self.ensure_editable(cmd.tenant_id, cmd.document_id, "move item")?;

        let index = self
            .items
            .iter()
            .position(|i| i.id == cmd.item_id)
            .ok_or_else(DomainError::not_found)?;
        let neighbour = match cmd.direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => Some(index + 1).filter(|n| *n < self.items.len()),
        };

        // Already at the edge.
        let Some(neighbour) = neighbour else {
            return Ok(Vec::new());
        };

        let mut order: Vec<LineItemId> = self.items.iter().map(|i| i.id).collect();
        order.swap(index, neighbour);

        Ok(vec![DocumentEvent::ItemsReordered(ItemsReordered {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            order,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finalize(&self, cmd: &Finalize) -> Result<Vec<DocumentEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.document_id)?;
        ensure_transition(self.id, self.status, DocumentStatus::Finalized)?;

        if self.items.is_empty() {
            return Err(DomainError::validation(
                "cannot finalize a document without line items",
            ));
        }
        if cmd.seller.tenant_id != cmd.tenant_id || cmd.buyer.tenant_id != cmd.tenant_id {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        match self.header.client_id {
            None => {
                return Err(DomainError::validation(
                    "a client must be assigned before finalization",
                ));
            }
            Some(client_id) if client_id != cmd.buyer.id => {
                return Err(DomainError::validation(
                    "buyer does not match the document's client",
                ));
            }
            Some(_) => {}
        }
        if cmd.number.year() != cmd.today.year() {
            return Err(DomainError::validation(format!(
                "number {} does not belong to the current year {}",
                cmd.number,
                cmd.today.year()
            )));
        }

        let issue_date = self.header.issue_date.unwrap_or(cmd.today);
        let due_date = match self.header.due_date {
            Some(due) => due,
            None => issue_date
                .checked_add_days(Days::new(u64::from(cmd.payment_terms_days)))
                .ok_or_else(|| DomainError::validation("due date out of range"))?,
        };
        if due_date < issue_date {
            return Err(DomainError::validation(format!(
                "due date {due_date} is before issue date {issue_date}"
            )));
        }

        let snapshots = SnapshotManager::freeze(&cmd.seller, &cmd.buyer, cmd.occurred_at);

        Ok(vec![DocumentEvent::DocumentFinalized(DocumentFinalized {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            number: cmd.number.clone(),
            issue_date,
            due_date,
            snapshots,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_sent(&self, cmd: &MarkSent) -> Result<Vec<DocumentEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.document_id)?;
        ensure_transition(self.id, self.status, DocumentStatus::Sent)?;

        Ok(vec![DocumentEvent::DocumentSent(DocumentSent {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(&self, cmd: &MarkPaid) -> Result<Vec<DocumentEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.document_id)?;
        ensure_transition(self.id, self.status, DocumentStatus::Paid)?;

        Ok(vec![DocumentEvent::DocumentPaid(DocumentPaid {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> Result<Vec<DocumentEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.document_id)?;
        ensure_transition(self.id, self.status, DocumentStatus::Cancelled)?;

        Ok(vec![DocumentEvent::DocumentCancelled(DocumentCancelled {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_archive(&self, cmd: &RecordArchive) -> Result<Vec<DocumentEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.document_id)?;

        if self.is_draft() {
            return Err(DomainError::validation(
                "archive metadata can only be recorded on a finalized document",
            ));
        }
        if self.archive.is_some() {
            return Err(DomainError::immutable(
                self.id,
                self.status,
                "archive metadata already recorded",
            ));
        }
        let checksum = cmd.checksum.trim();
        if checksum.is_empty() {
            return Err(DomainError::validation("archive checksum cannot be empty"));
        }

        Ok(vec![DocumentEvent::ArchiveRecorded(ArchiveRecorded {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            archive: ArchiveRecord {
                checksum: checksum.to_string(),
                archived_at: cmd.occurred_at,
            },
            occurred_at: cmd.occurred_at,
        })])
    }
}
