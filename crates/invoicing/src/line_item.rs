//! Line items and their derived amounts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use facturo_core::{DomainError, DomainResult, Money, MoneyMath, Quantity, VatRate};

/// Line item identifier (unique within its document).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(pub Uuid);

impl LineItemId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LineItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for LineItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Derived amounts of one line. Never accepted as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotals {
    pub total_ht: Money,
    pub total_vat: Money,
    pub total_ttc: Money,
}

/// Per-line computation: `HT = q × p`, `VAT = HT × rate / 100`, `TTC = HT + VAT`,
/// each rounded half-up to scale 4 as it is produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineItemCalculator;

impl LineItemCalculator {
    pub fn compute(quantity: Quantity, unit_price: Money, rate: VatRate) -> DomainResult<LineTotals> {
        let total_ht = MoneyMath::multiply(quantity, unit_price)?;
        let total_vat = MoneyMath::percentage_of(total_ht, rate)?;
        let total_ttc = MoneyMath::add(total_ht, total_vat)?;
        Ok(LineTotals {
            total_ht,
            total_vat,
            total_ttc,
        })
    }
}

/// Caller-supplied fields of a line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub title: String,
    pub description: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub vat_rate: VatRate,
}

impl LineItemInput {
    pub fn new(title: impl Into<String>, quantity: Quantity, unit_price: Money, vat_rate: VatRate) -> Self {
        Self {
            title: title.into(),
            description: None,
            quantity,
            unit_price,
            vat_rate,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A line of a document, with its derived totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub title: String,
    pub description: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub vat_rate: VatRate,
    /// Display order, unique within the document, starting at 1.
    pub position: u32,
    pub totals: LineTotals,
}

impl LineItem {
    /// Validate `input` and compute the derived totals.
    ///
    /// `allow_negative_price` is decided by the document type: only credit
    /// notes carry negative unit prices.
    pub fn build(
        id: LineItemId,
        input: &LineItemInput,
        position: u32,
        allow_negative_price: bool,
    ) -> DomainResult<Self> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("line item title cannot be empty"));
        }
        if input.unit_price.is_negative() && !allow_negative_price {
            return Err(DomainError::invalid_amount(format!(
                "unit price must not be negative (got {})",
                input.unit_price
            )));
        }

        let totals = LineItemCalculator::compute(input.quantity, input.unit_price, input.vat_rate)?;

        Ok(Self {
            id,
            title: title.to_string(),
            description: input
                .description
                .as_ref()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            quantity: input.quantity,
            unit_price: input.unit_price,
            vat_rate: input.vat_rate,
            position,
            totals,
        })
    }

    pub fn input(&self) -> LineItemInput {
        LineItemInput {
            title: self.title.clone(),
            description: self.description.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            vat_rate: self.vat_rate,
        }
    }

    pub fn total_ht(&self) -> Money {
        self.totals.total_ht
    }

    pub fn total_vat(&self) -> Money {
        self.totals.total_vat
    }

    pub fn total_ttc(&self) -> Money {
        self.totals.total_ttc
    }
}
