//! Shared builders for unit tests.

use chrono::{NaiveDate, Utc};

use facturo_core::{Aggregate, AggregateId, Money, Quantity, TenantId, VatRate};
use facturo_parties::{Address, BuyerType, Client, ClientId, CountryCode, SellerProfile, VatRegime};
use facturo_vat::{ScenarioKey, VatMentionSelection};

use crate::document::{
    CreateDraft, Document, DocumentCommand, DocumentId, DocumentKind, DraftHeader, DraftItem,
    Finalize, RateScope,
};
use crate::line_item::LineItemInput;
use crate::numbering::DocumentNumber;

pub(crate) struct Parties {
    pub tenant_id: TenantId,
    pub seller: SellerProfile,
    pub client: Client,
}

pub(crate) fn parties() -> Parties {
    let tenant_id = TenantId::new();
    let seller = SellerProfile::new(
        tenant_id,
        "Atelier Moselle SARL",
        Address::new("12 rue Principale", "5401", "Ahn", CountryCode::new("LU").unwrap()),
        VatRegime::Assujetti,
        Some("LU12345678".into()),
    )
    .unwrap();
    let client = Client::new(
        ClientId::new(AggregateId::new()),
        tenant_id,
        "Garage Weber",
        Address::new("4 route d'Arlon", "8009", "Strassen", CountryCode::new("LU").unwrap()),
        BuyerType::B2b,
        Some("LU87654321".into()),
    )
    .unwrap();
    Parties {
        tenant_id,
        seller,
        client,
    }
}

pub(crate) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
}

pub(crate) fn lu_scope() -> RateScope {
    RateScope::new(
        ScenarioKey::Domestic,
        [17u8, 14, 8, 3, 0].map(|r| VatRate::percent(r).unwrap()),
    )
    .unwrap()
}

pub(crate) fn input(title: &str, price: &str, rate: u8) -> LineItemInput {
    LineItemInput::new(
        title,
        Quantity::one(),
        Money::parse(price).unwrap(),
        VatRate::percent(rate).unwrap(),
    )
}

pub(crate) fn draft(parties: &Parties, items: Vec<LineItemInput>) -> Document {
    let document_id = DocumentId::new(AggregateId::new());
    let mut document = Document::empty(document_id);
    document
        .execute(&DocumentCommand::CreateDraft(CreateDraft {
            tenant_id: parties.tenant_id,
            document_id,
            kind: DocumentKind::Invoice,
            header: DraftHeader::new(Some(parties.client.id), VatMentionSelection::default()),
            rate_scope: lu_scope(),
            credit_note_of: None,
            items: items.into_iter().map(DraftItem::new).collect(),
            occurred_at: Utc::now(),
        }))
        .unwrap();
    document
}

pub(crate) fn finalize(parties: &Parties, document: &mut Document, number: &str) {
    document
        .execute(&DocumentCommand::Finalize(Finalize {
            tenant_id: parties.tenant_id,
            document_id: document.id_typed(),
            number: DocumentNumber::parse(number).unwrap(),
            seller: parties.seller.clone(),
            buyer: parties.client.clone(),
            today: today(),
            payment_terms_days: 30,
            occurred_at: Utc::now(),
        }))
        .unwrap();
}

pub(crate) fn finalized_invoice(parties: &Parties, number: &str) -> Document {
    let mut document = draft(
        parties,
        vec![
            input("Design", "100", 17),
            input("Hosting", "50", 17),
            input("Books", "20", 3),
        ],
    );
    finalize(parties, &mut document, number);
    document
}
