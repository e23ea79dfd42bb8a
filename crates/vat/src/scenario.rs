//! VAT scenario resolution.
//!
//! Rules, first match wins:
//!
//! 1. franchise seller -> `FRANCHISE` (0 % only, country franchise mention)
//! 2. VAT-registered seller, EU business buyer in another member state with a
//!    VAT number -> `B2B_INTRA_EU` (reverse charge, 0 % suggested)
//! 3. VAT-registered seller, buyer outside the EU -> `EXPORT` (0 % suggested)
//! 4. anything else -> `DOMESTIC` for business buyers, `B2C` for consumers,
//!    no mention, standard rate suggested
//!
//! Resolution is a pure function of the seller, the buyer and the country
//! table.

use core::fmt;

use serde::{Deserialize, Serialize};

use facturo_core::{DomainResult, ValueObject, VatRate};
use facturo_parties::{BuyerType, Client, CountryCode, SellerProfile};

use crate::mention::{VatMention, VatMentionSelection};
use crate::rates::{CountryVatConfig, CountryVatTable};

/// Scenario identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioKey {
    Franchise,
    B2bIntraEu,
    Export,
    Domestic,
    B2c,
}

impl ScenarioKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioKey::Franchise => "FRANCHISE",
            ScenarioKey::B2bIntraEu => "B2B_INTRA_EU",
            ScenarioKey::Export => "EXPORT",
            ScenarioKey::Domestic => "DOMESTIC",
            ScenarioKey::B2c => "B2C",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScenarioKey::Franchise => "VAT franchise",
            ScenarioKey::B2bIntraEu => "Intra-EU B2B (reverse charge)",
            ScenarioKey::Export => "Export outside the EU",
            ScenarioKey::Domestic => "Domestic",
            ScenarioKey::B2c => "Sale to consumer",
        }
    }

    /// Mention a new document defaults to under this scenario.
    pub fn default_mention(&self) -> VatMention {
        match self {
            ScenarioKey::Franchise => VatMention::Franchise,
            ScenarioKey::B2bIntraEu => VatMention::IntraEuReverseCharge,
            ScenarioKey::Export => VatMention::Export,
            ScenarioKey::Domestic | ScenarioKey::B2c => VatMention::None,
        }
    }

    fn pins_zero_rate(&self) -> bool {
        matches!(self, ScenarioKey::B2bIntraEu | ScenarioKey::Export)
    }
}

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rate the caller may offer for line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatRateOption {
    pub rate: VatRate,
    pub label: String,
}

/// What the resolver needs to know about the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerProfile {
    pub country: CountryCode,
    pub buyer_type: BuyerType,
    pub has_vat_number: bool,
}

impl ValueObject for BuyerProfile {}

impl From<&Client> for BuyerProfile {
    fn from(client: &Client) -> Self {
        Self {
            country: client.country().clone(),
            buyer_type: client.buyer_type,
            has_vat_number: client.has_vat_number(),
        }
    }
}

/// The VAT treatment of one seller/buyer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatScenario {
    pub key: ScenarioKey,
    pub label: String,
    pub required_mention: Option<String>,
    pub suggested_rate: VatRate,
    pub rate_options: Vec<VatRateOption>,
}

impl ValueObject for VatScenario {}

impl VatScenario {
    pub fn suggested_rate(&self) -> VatRate {
        self.suggested_rate
    }

    pub fn default_mention(&self) -> VatMentionSelection {
        VatMentionSelection::new(self.key.default_mention())
    }

    pub fn allowed_rates(&self) -> Vec<VatRate> {
        self.rate_options.iter().map(|o| o.rate).collect()
    }

    pub fn allows(&self, rate: VatRate) -> bool {
        self.rate_options.iter().any(|o| o.rate == rate)
    }
}

/// Resolves VAT scenarios against a country configuration.
pub struct VatScenarioResolver<'a, C: ?Sized> {
    config: &'a C,
}

impl<'a, C> VatScenarioResolver<'a, C>
where
    C: CountryVatConfig + ?Sized,
{
    pub fn new(config: &'a C) -> Self {
        Self { config }
    }

    pub fn resolve(&self, seller: &SellerProfile, buyer: &BuyerProfile) -> DomainResult<VatScenario> {
        let table = self.config.require(seller.country())?;
        let key = classify(seller, buyer);

        let required_mention = match key {
            ScenarioKey::Franchise => Some(table.franchise_mention.clone()),
            ScenarioKey::B2bIntraEu => Some(table.intra_eu_mention.clone()),
            ScenarioKey::Export => Some(table.export_mention.clone()),
            ScenarioKey::Domestic | ScenarioKey::B2c => None,
        };

        let suggested_rate = match key {
            ScenarioKey::Domestic | ScenarioKey::B2c => table.standard_rate,
            _ => VatRate::zero(),
        };

        Ok(VatScenario {
            key,
            label: key.label().to_string(),
            required_mention,
            suggested_rate,
            rate_options: rate_options(key, table),
        })
    }

    /// Convenience for resolving against a stored client.
    pub fn resolve_for_client(
        &self,
        seller: &SellerProfile,
        client: &Client,
    ) -> DomainResult<VatScenario> {
        self.resolve(seller, &BuyerProfile::from(client))
    }
}

fn classify(seller: &SellerProfile, buyer: &BuyerProfile) -> ScenarioKey {
    if seller.is_franchise() {
        return ScenarioKey::Franchise;
    }

    let cross_border = &buyer.country != seller.country();

    if cross_border
        && buyer.country.is_eu()
        && buyer.buyer_type == BuyerType::B2b
        && buyer.has_vat_number
    {
        return ScenarioKey::B2bIntraEu;
    }

    if cross_border && !buyer.country.is_eu() {
        return ScenarioKey::Export;
    }

    match buyer.buyer_type {
        BuyerType::B2b => ScenarioKey::Domestic,
        BuyerType::B2c => ScenarioKey::B2c,
    }
}

fn percent_label(rate: VatRate) -> String {
    format!("{}%", rate.percentage().normalize())
}

fn rate_options(key: ScenarioKey, table: &CountryVatTable) -> Vec<VatRateOption> {
    if key == ScenarioKey::Franchise {
        return vec![VatRateOption {
            rate: VatRate::zero(),
            label: percent_label(VatRate::zero()),
        }];
    }

    if key.pins_zero_rate() {
        let mut options = vec![VatRateOption {
            rate: VatRate::zero(),
            label: format!("0% ({})", key.as_str()),
        }];
        options.extend(table.taxed_rates().map(|rate| VatRateOption {
            rate,
            label: percent_label(rate),
        }));
        return options;
    }

    table
        .rates
        .iter()
        .map(|&rate| VatRateOption {
            rate,
            label: percent_label(rate),
        })
        .collect()
}
