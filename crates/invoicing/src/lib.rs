//! Invoicing domain module (event-sourced).
//!
//! Invoices and credit notes: line items and their derived totals, the
//! draft → finalized → sent/paid/cancelled lifecycle, numbering, party
//! snapshots and the guard every store runs before writing. Pure domain
//! logic with no IO.

pub mod credit_note;
pub mod currency;
pub mod document;
pub mod guard;
pub mod lifecycle;
pub mod line_item;
pub mod numbering;
pub mod snapshot;
pub mod totals;

#[cfg(test)]
pub(crate) mod fixtures;

pub use credit_note::{CreditNoteRequest, CreditSelection};
pub use currency::Currency;
pub use document::{
    AddItem, ArchiveRecord, ArchiveRecorded, Cancel, CreateDraft, CreditNoteOf, Document,
    DocumentCancelled, DocumentCommand, DocumentCreated, DocumentEvent, DocumentFinalized,
    DocumentId, DocumentKind, DocumentPaid, DocumentSent, DraftHeader, DraftItem, DraftUpdated,
    Finalize, ItemAdded, ItemRemoved, ItemUpdated, ItemsReordered, MarkPaid, MarkSent,
    MoveDirection, MoveItem, RateScope, RecordArchive, RemoveItem, ReorderItems, UpdateDraft,
    UpdateItem, AGGREGATE_TYPE,
};
pub use lifecycle::{allowed_targets, can_transition, DocumentStatus};
pub use line_item::{LineItem, LineItemCalculator, LineItemId, LineItemInput, LineTotals};
pub use numbering::{DocumentNumber, NumberingScheme};
pub use snapshot::{BuyerSnapshot, PartySnapshots, PartyView, SellerSnapshot, SnapshotManager};
pub use totals::{DocumentTotals, DocumentTotalsAggregator, VatBreakdownLine};
