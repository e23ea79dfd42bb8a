use std::collections::HashMap;

use facturo_invoicing::BuyerSnapshot;

/// Replaces identifying buyer data with `Client #<ordinal>`.
///
/// Ordinals are handed out in first-seen order, so feeding documents sorted
/// by number gives a stable numbering for a given export.
#[derive(Debug, Default)]
pub struct Anonymizer {
    ordinals: HashMap<BuyerKey, usize>,
}

/// What makes two snapshots "the same buyer" inside one export.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BuyerKey {
    name: String,
    vat_number: Option<String>,
    country: String,
    postal_code: String,
}

impl BuyerKey {
    fn of(buyer: &BuyerSnapshot) -> Self {
        Self {
            name: buyer.name.trim().to_lowercase(),
            vat_number: buyer.vat_number.clone(),
            country: buyer.country.clone(),
            postal_code: buyer.postal_code.clone(),
        }
    }
}

impl Anonymizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pseudonym(&mut self, buyer: &BuyerSnapshot) -> String {
        let next = self.ordinals.len() + 1;
        let ordinal = *self.ordinals.entry(BuyerKey::of(buyer)).or_insert(next);
        format!("Client #{ordinal}")
    }

    /// Copy of `buyer` without identifying fields. Country and buyer type
    /// stay, they drive the VAT treatment.
    pub fn anonymize(&mut self, buyer: &BuyerSnapshot) -> BuyerSnapshot {
        BuyerSnapshot {
            name: self.pseudonym(buyer),
            address_line1: String::new(),
            address_line2: None,
            postal_code: String::new(),
            city: String::new(),
            country: buyer.country.clone(),
            buyer_type: buyer.buyer_type,
            vat_number: None,
            peppol_id: None,
            email: None,
        }
    }

    pub fn distinct_buyers(&self) -> usize {
        self.ordinals.len()
    }
}
