//! Frozen copies of the seller and buyer taken at finalization.
//!
//! Snapshots are flat value types with no identifier of the live rows they
//! were copied from, so nothing can follow them back to a `Client` or a
//! `SellerProfile` that has since been edited.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use facturo_core::{DomainError, DomainResult, ValueObject};
use facturo_parties::{BuyerType, Client, SellerProfile, VatRegime};

/// Seller data as printed on a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerSnapshot {
    pub legal_name: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub vat_regime: VatRegime,
    pub vat_number: Option<String>,
    pub registration_number: Option<String>,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub bank_name: Option<String>,
    pub peppol_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ValueObject for SellerSnapshot {}

impl SellerSnapshot {
    /// Copy the current seller profile.
    pub fn capture(seller: &SellerProfile) -> Self {
        let bank = seller.bank.as_ref();
        Self {
            legal_name: seller.legal_name.clone(),
            address_line1: seller.address.line1.clone(),
            address_line2: seller.address.line2.clone(),
            postal_code: seller.address.postal_code.clone(),
            city: seller.address.city.clone(),
            country: seller.country().to_string(),
            vat_regime: seller.vat_regime,
            vat_number: seller.vat_number.clone(),
            registration_number: seller.registration_number.clone(),
            iban: bank.map(|b| b.iban.clone()),
            bic: bank.and_then(|b| b.bic.clone()),
            bank_name: bank.and_then(|b| b.bank_name.clone()),
            peppol_id: seller.peppol_id.clone(),
            email: seller.contact.email.clone(),
            phone: seller.contact.phone.clone(),
        }
    }
}

/// Buyer data as printed on a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerSnapshot {
    pub name: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub buyer_type: BuyerType,
    pub vat_number: Option<String>,
    pub peppol_id: Option<String>,
    pub email: Option<String>,
}

impl ValueObject for BuyerSnapshot {}

impl BuyerSnapshot {
    /// Copy the current client.
    pub fn capture(client: &Client) -> Self {
        Self {
            name: client.name.clone(),
            address_line1: client.address.line1.clone(),
            address_line2: client.address.line2.clone(),
            postal_code: client.address.postal_code.clone(),
            city: client.address.city.clone(),
            country: client.country().to_string(),
            buyer_type: client.buyer_type,
            vat_number: client.vat_number.clone(),
            peppol_id: client.peppol_id.clone(),
            email: client.contact.email.clone(),
        }
    }
}

/// The seller/buyer pair frozen on a finalized document.
///
/// Only `SnapshotManager::freeze` builds one; after that it is read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySnapshots {
    seller: SellerSnapshot,
    buyer: BuyerSnapshot,
    frozen_at: DateTime<Utc>,
}

impl ValueObject for PartySnapshots {}

impl PartySnapshots {
    pub fn seller(&self) -> &SellerSnapshot {
        &self.seller
    }

    pub fn buyer(&self) -> &BuyerSnapshot {
        &self.buyer
    }

    pub fn frozen_at(&self) -> DateTime<Utc> {
        self.frozen_at
    }

    /// Opaque blobs for storage: `(seller, buyer)`.
    pub fn to_blobs(&self) -> DomainResult<(JsonValue, JsonValue)> {
        let seller = serde_json::to_value(&self.seller)
            .map_err(|e| DomainError::invariant(format!("seller snapshot serialization: {e}")))?;
        let buyer = serde_json::to_value(&self.buyer)
            .map_err(|e| DomainError::invariant(format!("buyer snapshot serialization: {e}")))?;
        Ok((seller, buyer))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotManager;

impl SnapshotManager {
    /// Freeze both parties. Called once, when a draft is finalized.
    pub fn freeze(seller: &SellerProfile, buyer: &Client, at: DateTime<Utc>) -> PartySnapshots {
        PartySnapshots {
            seller: SellerSnapshot::capture(seller),
            buyer: BuyerSnapshot::capture(buyer),
            frozen_at: at,
        }
    }
}

/// Party data as a reader sees it: borrowed from the snapshot, or owned when
/// captured from live data.
pub type PartyView<'a, T> = Cow<'a, T>;

/// Party data for display: the frozen copy once it exists, the live data
/// (captured on the fly) while the document is a draft.
pub fn prefer_snapshot<'a, T, L>(
    frozen: Option<&'a T>,
    live: &L,
    capture: impl FnOnce(&L) -> T,
) -> PartyView<'a, T>
where
    T: Clone,
{
    match frozen {
        Some(snapshot) => Cow::Borrowed(snapshot),
        None => Cow::Owned(capture(live)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facturo_core::{AggregateId, TenantId};
    use facturo_parties::{Address, BankDetails, ClientId, CountryCode};

    fn seller() -> SellerProfile {
        SellerProfile::new(
            TenantId::new(),
            "Atelier Moselle SARL",
            Address::new("12 rue Principale", "5401", "Ahn", CountryCode::new("LU").unwrap()),
            VatRegime::Assujetti,
            Some("LU12345678".into()),
        )
        .unwrap()
        .with_bank(BankDetails {
            iban: "LU280019400644750000".into(),
            bic: Some("BCEELULL".into()),
            bank_name: None,
        })
    }

    fn client() -> Client {
        Client::new(
            ClientId::new(AggregateId::new()),
            TenantId::new(),
            "Boulangerie Dupont",
            Address::new("3 place Stanislas", "54000", "Nancy", CountryCode::new("FR").unwrap()),
            BuyerType::B2b,
            Some("FR40303265045".into()),
        )
        .unwrap()
    }

    #[test]
    fn freeze_copies_flat_party_data() {
        let snapshots = SnapshotManager::freeze(&seller(), &client(), Utc::now());
        assert_eq!(snapshots.seller().legal_name, "Atelier Moselle SARL");
        assert_eq!(snapshots.seller().iban.as_deref(), Some("LU280019400644750000"));
        assert_eq!(snapshots.buyer().country, "FR");
        assert_eq!(snapshots.buyer().vat_number.as_deref(), Some("FR40303265045"));
    }

    #[test]
    fn later_edits_of_live_rows_do_not_reach_the_snapshot() {
        let mut live = client();
        let snapshots = SnapshotManager::freeze(&seller(), &live, Utc::now());
        live.name = "Renamed".into();
        live.vat_number = None;

        let view = prefer_snapshot(Some(snapshots.buyer()), &live, BuyerSnapshot::capture);
        assert_eq!(view.name, "Boulangerie Dupont");
        assert!(matches!(view, Cow::Borrowed(_)));
    }

    #[test]
    fn draft_view_reads_live_data() {
        let live = client();
        let view = prefer_snapshot(None, &live, BuyerSnapshot::capture);
        assert_eq!(view.name, live.name);
    }

    #[test]
    fn blobs_are_flat_objects_without_live_identifiers() {
        let snapshots = SnapshotManager::freeze(&seller(), &client(), Utc::now());
        let (seller_blob, buyer_blob) = snapshots.to_blobs().unwrap();
        let buyer = buyer_blob.as_object().unwrap();
        assert!(buyer.values().all(|v| !v.is_object() && !v.is_array()));
        assert!(!buyer.contains_key("id"));
        assert_eq!(seller_blob["vat_regime"], "assujetti");
    }
}
