use serde::{Deserialize, Serialize};

use facturo_core::{AggregateId, DomainError, Entity, TenantId};

use crate::party::{Address, ContactInfo, CountryCode, non_blank};

/// Client identifier (tenant-scoped via `tenant_id`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub AggregateId);

impl ClientId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Whether the buyer is a business or a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuyerType {
    B2b,
    B2c,
}

/// The buyer party, as currently stored.
///
/// Drafts read this live; finalized documents only ever see the frozen
/// buyer snapshot taken from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub tenant_id: TenantId,
    pub name: String,
    pub address: Address,
    pub buyer_type: BuyerType,
    pub vat_number: Option<String>,
    /// E-invoicing network endpoint (e.g. `0184:LU12345678`).
    pub peppol_id: Option<String>,
    pub contact: ContactInfo,
}

impl Client {
    pub fn new(
        id: ClientId,
        tenant_id: TenantId,
        name: impl Into<String>,
        address: Address,
        buyer_type: BuyerType,
        vat_number: Option<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("client name cannot be empty"));
        }
        Ok(Self {
            id,
            tenant_id,
            name: name.trim().to_string(),
            address,
            buyer_type,
            vat_number: non_blank(vat_number),
            peppol_id: None,
            contact: ContactInfo::default(),
        })
    }

    pub fn with_peppol_id(mut self, peppol_id: impl Into<String>) -> Self {
        self.peppol_id = non_blank(Some(peppol_id.into()));
        self
    }

    pub fn country(&self) -> &CountryCode {
        &self.address.country
    }

    pub fn has_vat_number(&self) -> bool {
        self.vat_number.is_some()
    }
}

impl Entity for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
