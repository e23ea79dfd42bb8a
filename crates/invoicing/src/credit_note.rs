//! Building credit-note drafts from finalized invoices.

use chrono::{DateTime, Utc};

use facturo_core::{DomainError, DomainResult};

use crate::document::{
    CreateDraft, CreditNoteOf, Document, DocumentId, DocumentKind, DraftHeader, DraftItem,
};
use crate::lifecycle::DocumentStatus;
use crate::line_item::{LineItemId, LineItemInput};

/// Which items of the original a credit note covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditSelection {
    All,
    Items(Vec<LineItemId>),
}

/// Request to credit (part of) a finalized invoice.
///
/// `already_credited` is supplied by whoever holds the store: the aggregate
/// cannot see other documents.
#[derive(Debug, Clone)]
pub struct CreditNoteRequest<'a> {
    pub original: &'a Document,
    pub already_credited: bool,
    pub selection: CreditSelection,
    pub reason: Option<String>,
}

impl<'a> CreditNoteRequest<'a> {
    pub fn full(original: &'a Document, already_credited: bool) -> Self {
        Self {
            original,
            already_credited,
            selection: CreditSelection::All,
            reason: None,
        }
    }

    pub fn with_items(mut self, item_ids: Vec<LineItemId>) -> Self {
        self.selection = CreditSelection::Items(item_ids);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Check eligibility and produce the draft-creation command.
    ///
    /// Selected items are copied with their unit price negated; currency,
    /// VAT mention, client and rate options come from the original.
    pub fn into_command(
        self,
        credit_note_id: DocumentId,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<CreateDraft> {
        let original = self.original;

        if original.kind() == DocumentKind::CreditNote {
            return Err(DomainError::validation(format!(
                "document {} is a credit note and cannot be credited",
                original.id_typed()
            )));
        }
        if !matches!(
            original.status(),
            DocumentStatus::Finalized | DocumentStatus::Sent | DocumentStatus::Paid
        ) {
            return Err(DomainError::validation(format!(
                "only finalized invoices can be credited (document {} is {})",
                original.id_typed(),
                original.status()
            )));
        }
        if self.already_credited {
            return Err(DomainError::conflict(format!(
                "document {} already has a credit note",
                original.id_typed()
            )));
        }

        let number = original
            .number()
            .cloned()
            .ok_or_else(|| DomainError::invariant("finalized document without a number"))?;
        let tenant_id = original
            .tenant_id()
            .ok_or_else(|| DomainError::invariant("document without tenant"))?;
        let rate_scope = original
            .rate_scope()
            .cloned()
            .ok_or_else(|| DomainError::invariant("document without rate options"))?;

        let selected = match &self.selection {
            CreditSelection::All => original.items().to_vec(),
            CreditSelection::Items(ids) => {
                if ids.is_empty() {
                    return Err(DomainError::validation(
                        "a credit note must cover at least one item",
                    ));
                }
                // Keep the original's display order.
                let mut picked = Vec::with_capacity(ids.len());
                for id in ids {
                    if original.item(*id).is_none() {
                        return Err(DomainError::validation(format!(
                            "item {id} does not belong to document {}",
                            original.id_typed()
                        )));
                    }
                }
                for item in original.items() {
                    if ids.contains(&item.id) {
                        picked.push(item.clone());
                    }
                }
                picked
            }
        };

        let items = selected
            .iter()
            .map(|item| {
                DraftItem::new(LineItemInput {
                    unit_price: item.unit_price.negate(),
                    ..item.input()
                })
            })
            .collect();

        let source = original.header();
        let header = DraftHeader {
            client_id: source.client_id,
            currency: source.currency.clone(),
            issue_date: None,
            due_date: None,
            subject: Some(format!("Credit note for {number}")),
            notes: self.reason.clone(),
            vat_mention: source.vat_mention.clone(),
        };

        Ok(CreateDraft {
            tenant_id,
            document_id: credit_note_id,
            kind: DocumentKind::CreditNote,
            header,
            rate_scope,
            credit_note_of: Some(CreditNoteOf {
                document_id: original.id_typed(),
                number,
            }),
            items,
            occurred_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentCommand;
    use crate::fixtures;
    use facturo_core::{Aggregate, AggregateId, MoneyMath};

    fn new_id() -> DocumentId {
        DocumentId::new(AggregateId::new())
    }

    fn create(cmd: CreateDraft) -> Document {
        let mut credit_note = Document::empty(cmd.document_id);
        credit_note
            .execute(&DocumentCommand::CreateDraft(cmd))
            .unwrap();
        credit_note
    }

    #[test]
    fn full_credit_note_negates_every_line() {
        let parties = fixtures::parties();
        let original = fixtures::finalized_invoice(&parties, "INV-2026-004");

        let cmd = CreditNoteRequest::full(&original, false)
            .with_reason("returned goods")
            .into_command(new_id(), Utc::now())
            .unwrap();
        let credit_note = create(cmd);

        assert_eq!(credit_note.kind(), DocumentKind::CreditNote);
        assert!(credit_note.is_draft());
        assert_eq!(credit_note.totals().total_ttc, original.totals().total_ttc.negate());
        assert_eq!(credit_note.totals().total_ttc.to_string(), "-196.1000");
        let back = credit_note.credit_note_of().unwrap();
        assert_eq!(back.document_id, original.id_typed());
        assert_eq!(back.number.to_string(), "INV-2026-004");
        assert_eq!(credit_note.currency(), original.currency());
        assert_eq!(credit_note.header().notes.as_deref(), Some("returned goods"));
        assert!(credit_note.items().iter().all(|i| !i.quantity.value().is_sign_negative()));
    }

    #[test]
    fn partial_credit_note_covers_the_selected_items_only() {
        let parties = fixtures::parties();
        let original = fixtures::finalized_invoice(&parties, "INV-2026-005");
        let selected: Vec<LineItemId> = original.items()[1..].iter().map(|i| i.id).collect();

        let cmd = CreditNoteRequest::full(&original, false)
            .with_items(selected.clone())
            .into_command(new_id(), Utc::now())
            .unwrap();
        let credit_note = create(cmd);

        let expected = MoneyMath::sum(
            original
                .items()
                .iter()
                .filter(|i| selected.contains(&i.id))
                .map(|i| i.total_ttc()),
        )
        .unwrap();
        assert_eq!(credit_note.items().len(), 2);
        assert_eq!(credit_note.totals().total_ttc, expected.negate());
        assert!(credit_note.totals().total_ht.is_negative());
        assert_eq!(credit_note.items()[0].title, "Hosting");
    }

    #[test]
    fn drafts_credit_notes_and_credited_invoices_are_refused() {
        let parties = fixtures::parties();

        let draft = fixtures::draft(&parties, vec![fixtures::input("A", "10", 17)]);
        let err = CreditNoteRequest::full(&draft, false)
            .into_command(new_id(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let original = fixtures::finalized_invoice(&parties, "INV-2026-006");
        let err = CreditNoteRequest::full(&original, true)
            .into_command(new_id(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let mut credit_note = create(
            CreditNoteRequest::full(&original, false)
                .into_command(new_id(), Utc::now())
                .unwrap(),
        );
        fixtures::finalize(&parties, &mut credit_note, "CN-2026-001");
        let err = CreditNoteRequest::full(&credit_note, false)
            .into_command(new_id(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unknown_or_empty_selection_is_rejected() {
        let parties = fixtures::parties();
        let original = fixtures::finalized_invoice(&parties, "INV-2026-007");

        for selection in [vec![], vec![LineItemId::new()]] {
            let err = CreditNoteRequest::full(&original, false)
                .with_items(selection)
                .into_command(new_id(), Utc::now())
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }
}
