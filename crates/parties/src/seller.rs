use serde::{Deserialize, Serialize};

use facturo_core::{DomainError, TenantId, ValueObject};

use crate::party::{Address, ContactInfo, CountryCode, non_blank};

/// Fiscal regime of the seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VatRegime {
    /// VAT-exempt small business below the franchise threshold.
    Franchise,
    /// VAT-registered business.
    Assujetti,
}

/// Bank coordinates printed on documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub iban: String,
    pub bic: Option<String>,
    pub bank_name: Option<String>,
}

/// The business's own fiscal identity (one per tenant).
///
/// Passed explicitly to scenario resolution and snapshot freezing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerProfile {
    pub tenant_id: TenantId,
    pub legal_name: String,
    pub address: Address,
    pub vat_regime: VatRegime,
    pub vat_number: Option<String>,
    /// National business registration number (RCS, SIREN, ...).
    pub registration_number: Option<String>,
    pub bank: Option<BankDetails>,
    /// E-invoicing network endpoint (e.g. `0184:LU12345678`).
    pub peppol_id: Option<String>,
    pub contact: ContactInfo,
}

impl ValueObject for SellerProfile {}

impl SellerProfile {
    pub fn new(
        tenant_id: TenantId,
        legal_name: impl Into<String>,
        address: Address,
        vat_regime: VatRegime,
        vat_number: Option<String>,
    ) -> Result<Self, DomainError> {
        let legal_name = legal_name.into();
        if legal_name.trim().is_empty() {
            return Err(DomainError::validation("seller legal name cannot be empty"));
        }
        let vat_number = non_blank(vat_number);
        if vat_regime == VatRegime::Assujetti && vat_number.is_none() {
            return Err(DomainError::validation(
                "a VAT-registered seller must have a VAT number",
            ));
        }
        Ok(Self {
            tenant_id,
            legal_name: legal_name.trim().to_string(),
            address,
            vat_regime,
            vat_number,
            registration_number: None,
            bank: None,
            peppol_id: None,
            contact: ContactInfo::default(),
        })
    }

    pub fn with_bank(mut self, bank: BankDetails) -> Self {
        self.bank = Some(bank);
        self
    }

    pub fn with_peppol_id(mut self, peppol_id: impl Into<String>) -> Self {
        self.peppol_id = non_blank(Some(peppol_id.into()));
        self
    }

    pub fn country(&self) -> &CountryCode {
        &self.address.country
    }

    pub fn is_franchise(&self) -> bool {
        self.vat_regime == VatRegime::Franchise
    }
}
