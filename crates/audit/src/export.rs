//! The audit export bundle handed to file exporters (CSV/JSON/XML).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use facturo_core::{DomainError, DomainResult, Money, MoneyMath};
use facturo_invoicing::{
    BuyerSnapshot, Currency, Document, DocumentId, DocumentKind, DocumentStatus,
    DocumentTotalsAggregator, LineItem, SellerSnapshot, VatBreakdownLine,
};

use crate::anonymize::Anonymizer;
use crate::sequence::{IncompleteSequence, SequenceIntegrityValidator, SequenceValidation};

/// Calendar year covered by an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPeriod {
    pub year: i32,
}

impl ExportPeriod {
    pub fn calendar_year(year: i32) -> Self {
        Self { year }
    }

    /// Documents belong to the year their number was issued in.
    pub fn covers(&self, document: &Document) -> bool {
        !document.is_draft() && document.number().is_some_and(|n| n.year() == self.year)
    }
}

/// One finalized document as exported; party data comes from its snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedDocument {
    pub document_id: DocumentId,
    pub kind: DocumentKind,
    pub number: String,
    pub status: DocumentStatus,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub currency: Currency,
    pub credit_note_of: Option<String>,
    pub seller: SellerSnapshot,
    pub buyer: BuyerSnapshot,
    pub items: Vec<LineItem>,
    pub total_ht: Money,
    pub total_vat: Money,
    pub total_ttc: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTotals {
    pub document_count: usize,
    pub total_ht: Money,
    pub total_vat: Money,
    pub total_ttc: Money,
}

/// Validation of one document type's numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceReport {
    pub kind: DocumentKind,
    pub validation: SequenceValidation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditExport {
    pub period: ExportPeriod,
    pub anonymized: bool,
    /// Sorted by kind, then number.
    pub documents: Vec<ExportedDocument>,
    /// Sums over non-cancelled documents; credit notes count negatively.
    pub totals: ExportTotals,
    pub vat_breakdown: Vec<VatBreakdownLine>,
    pub sequence_validation: Vec<SequenceReport>,
}

impl AuditExport {
    pub fn build(period: ExportPeriod, documents: &[Document], anonymize: bool) -> DomainResult<Self> {
        let mut covered: Vec<&Document> = documents.iter().filter(|d| period.covers(d)).collect();
        covered.sort_by_key(|d| {
            (
                d.kind() == DocumentKind::CreditNote,
                d.number().map(|n| (n.prefix().to_string(), n.sequence())),
            )
        });

        let sequence_validation = [DocumentKind::Invoice, DocumentKind::CreditNote]
            .into_iter()
            .map(|kind| {
                let of_kind: Vec<Document> = covered
                    .iter()
                    .filter(|d| d.kind() == kind)
                    .map(|d| (*d).clone())
                    .collect();
                SequenceReport {
                    kind,
                    validation: SequenceIntegrityValidator::validate(&of_kind),
                }
            })
            .collect();

        let mut anonymizer = Anonymizer::new();
        let mut exported = Vec::with_capacity(covered.len());
        for document in &covered {
            exported.push(export_document(document, anonymize.then_some(&mut anonymizer))?);
        }

        let counted: Vec<&&Document> = covered
            .iter()
            .filter(|d| d.status() != DocumentStatus::Cancelled)
            .collect();
        let totals = ExportTotals {
            document_count: exported.len(),
            total_ht: MoneyMath::sum(counted.iter().map(|d| d.totals().total_ht))?,
            total_vat: MoneyMath::sum(counted.iter().map(|d| d.totals().total_vat))?,
            total_ttc: MoneyMath::sum(counted.iter().map(|d| d.totals().total_ttc))?,
        };
        let vat_breakdown = DocumentTotalsAggregator::merge_breakdowns(
            counted.iter().map(|d| d.totals().vat_breakdown.as_slice()),
        )?;

        Ok(Self {
            period,
            anonymized: anonymize,
            documents: exported,
            totals,
            vat_breakdown,
            sequence_validation,
        })
    }

    /// Complete only when every numbering sequence is valid.
    pub fn is_certifiable(&self) -> bool {
        self.sequence_validation.iter().all(|r| r.validation.valid)
    }

    pub fn certify(&self) -> Result<(), IncompleteSequence> {
        let problems: Vec<String> = self
            .sequence_validation
            .iter()
            .flat_map(|r| r.validation.gaps.iter().chain(&r.validation.issues).cloned())
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(IncompleteSequence { problems })
        }
    }
}

fn export_document(
    document: &Document,
    anonymizer: Option<&mut Anonymizer>,
) -> DomainResult<ExportedDocument> {
    let snapshots = document.snapshots().ok_or_else(|| {
        DomainError::invariant(format!(
            "finalized document {} has no snapshots",
            document.id_typed()
        ))
    })?;
    let number = document
        .number()
        .map(ToString::to_string)
        .ok_or_else(|| DomainError::invariant("exported document without a number"))?;

    let buyer = match anonymizer {
        Some(anonymizer) => anonymizer.anonymize(snapshots.buyer()),
        None => snapshots.buyer().clone(),
    };
    let totals = document.totals();

    Ok(ExportedDocument {
        document_id: document.id_typed(),
        kind: document.kind(),
        number,
        status: document.status(),
        issue_date: document.issue_date(),
        due_date: document.due_date(),
        currency: document.currency().clone(),
        credit_note_of: document.credit_note_of().map(|c| c.number.to_string()),
        seller: snapshots.seller().clone(),
        buyer,
        items: document.items().to_vec(),
        total_ht: totals.total_ht,
        total_vat: totals.total_vat,
        total_ttc: totals.total_ttc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use facturo_core::{Aggregate, AggregateId, Quantity, TenantId, VatRate};
    use facturo_invoicing::{
        Cancel, CreateDraft, CreditNoteRequest, DocumentCommand, DocumentNumber, DraftHeader,
        DraftItem, Finalize, LineItemInput, RateScope,
    };
    use facturo_parties::{Address, BuyerType, Client, ClientId, CountryCode, SellerProfile, VatRegime};
    use facturo_vat::{ScenarioKey, VatMentionSelection};

    struct Books {
        tenant_id: TenantId,
        seller: SellerProfile,
        clients: Vec<Client>,
    }

    fn books() -> Books {
        let tenant_id = TenantId::new();
        let lu = CountryCode::new("LU").unwrap();
        let seller = SellerProfile::new(
            tenant_id,
            "Atelier Moselle SARL",
            Address::new("12 rue Principale", "5401", "Ahn", lu.clone()),
            VatRegime::Assujetti,
            Some("LU12345678".into()),
        )
        .unwrap();
        let clients = ["Garage Weber", "Café Central"]
            .into_iter()
            .map(|name| {
                Client::new(
                    ClientId::new(AggregateId::new()),
                    tenant_id,
                    name,
                    Address::new("1 Grand-Rue", "1660", "Luxembourg", lu.clone()),
                    BuyerType::B2b,
                    None,
                )
                .unwrap()
            })
            .collect();
        Books {
            tenant_id,
            seller,
            clients,
        }
    }

    fn issue(books: &Books, client: usize, number: &str, price: &str) -> Document {
        let document_id = DocumentId::new(AggregateId::new());
        let client = &books.clients[client];
        let mut document = Document::empty(document_id);
        document
            .execute(&DocumentCommand::CreateDraft(CreateDraft {
                tenant_id: books.tenant_id,
                document_id,
                kind: DocumentKind::Invoice,
                header: DraftHeader::new(Some(client.id), VatMentionSelection::default()),
                rate_scope: RateScope::new(ScenarioKey::Domestic, [VatRate::percent(17).unwrap()]).unwrap(),
                credit_note_of: None,
                items: vec![DraftItem::new(LineItemInput::new(
                    "Service",
                    Quantity::one(),
                    Money::parse(price).unwrap(),
                    VatRate::percent(17).unwrap(),
                ))],
                occurred_at: Utc::now(),
            }))
            .unwrap();
        finalize(books, &mut document, client, number);
        document
    }

    fn finalize(books: &Books, document: &mut Document, client: &Client, number: &str) {
        let number = DocumentNumber::parse(number).unwrap();
        document
            .execute(&DocumentCommand::Finalize(Finalize {
                tenant_id: books.tenant_id,
                document_id: document.id_typed(),
                today: NaiveDate::from_ymd_opt(number.year(), 6, 1).unwrap(),
                number,
                seller: books.seller.clone(),
                buyer: client.clone(),
                payment_terms_days: 30,
                occurred_at: Utc::now(),
            }))
            .unwrap();
    }

    #[test]
    fn export_covers_the_year_and_validates_each_type() {
        let books = books();
        let first = issue(&books, 0, "INV-2026-001", "100");
        let second = issue(&books, 1, "INV-2026-002", "50");
        let last_year = issue(&books, 0, "INV-2025-014", "999");

        let mut credit_note = Document::empty(DocumentId::new(AggregateId::new()));
        credit_note
            .execute(&DocumentCommand::CreateDraft(
                CreditNoteRequest::full(&second, false)
                    .into_command(credit_note.id_typed(), Utc::now())
                    .unwrap(),
            ))
            .unwrap();
        finalize(&books, &mut credit_note, &books.clients[1], "CN-2026-001");

        let draft = Document::empty(DocumentId::new(AggregateId::new()));
        let all = vec![credit_note, second, draft, last_year, first];

        let export = AuditExport::build(ExportPeriod::calendar_year(2026), &all, false).unwrap();

        let numbers: Vec<&str> = export.documents.iter().map(|d| d.number.as_str()).collect();
        assert_eq!(numbers, ["INV-2026-001", "INV-2026-002", "CN-2026-001"]);
        assert!(export.is_certifiable());
        assert!(export.certify().is_ok());
        assert_eq!(export.sequence_validation.len(), 2);

        // 117.00 + 58.50 - 58.50
        assert_eq!(export.totals.total_ttc.to_string(), "117.0000");
        assert_eq!(export.vat_breakdown.len(), 1);
        assert_eq!(export.vat_breakdown[0].vat.to_string(), "17.0000");
        assert_eq!(export.documents[2].credit_note_of.as_deref(), Some("INV-2026-002"));
    }

    #[test]
    fn gaps_block_certification() {
        let books = books();
        let all = vec![
            issue(&books, 0, "INV-2026-001", "10"),
            issue(&books, 0, "INV-2026-003", "10"),
        ];
        let export = AuditExport::build(ExportPeriod::calendar_year(2026), &all, false).unwrap();
        assert!(!export.is_certifiable());
        let err = export.certify().unwrap_err();
        assert_eq!(err.problems, ["missing number: INV-2026-002"]);
    }

    #[test]
    fn anonymized_export_uses_ordinals_in_number_order() {
        let books = books();
        let all = vec![
            issue(&books, 1, "INV-2026-002", "10"),
            issue(&books, 0, "INV-2026-003", "10"),
            issue(&books, 1, "INV-2026-001", "10"),
        ];
        let export = AuditExport::build(ExportPeriod::calendar_year(2026), &all, true).unwrap();
        let names: Vec<&str> = export.documents.iter().map(|d| d.buyer.name.as_str()).collect();
        assert_eq!(names, ["Client #1", "Client #1", "Client #2"]);
        assert!(export.documents.iter().all(|d| d.buyer.vat_number.is_none()));
        assert_eq!(export.documents[0].seller.legal_name, "Atelier Moselle SARL");
    }

    #[test]
    fn cancelled_documents_keep_their_number_but_not_their_amounts() {
        let books = books();
        let kept = issue(&books, 0, "INV-2026-001", "100");
        let mut cancelled = issue(&books, 1, "INV-2026-002", "50");
        cancelled
            .execute(&DocumentCommand::Cancel(Cancel {
                tenant_id: books.tenant_id,
                document_id: cancelled.id_typed(),
                reason: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();

        let export =
            AuditExport::build(ExportPeriod::calendar_year(2026), &[kept, cancelled], false).unwrap();
        assert!(export.is_certifiable());
        assert_eq!(export.totals.document_count, 2);
        assert_eq!(export.totals.total_ht.to_string(), "100.0000");
    }

    #[test]
    fn bundle_serializes_for_exporters() {
        let books = books();
        let all = vec![issue(&books, 0, "INV-2026-001", "100")];
        let export = AuditExport::build(ExportPeriod::calendar_year(2026), &all, false).unwrap();
        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["documents"][0]["number"], "INV-2026-001");
        assert_eq!(json["sequence_validation"][0]["validation"]["valid"], true);
    }
}
