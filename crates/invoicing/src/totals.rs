//! Document-level totals and the per-rate VAT breakdown.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use facturo_core::{DomainResult, Money, MoneyMath, VatRate};

use crate::line_item::LineItem;

/// Sum of the lines sharing one VAT rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatBreakdownLine {
    pub rate: VatRate,
    pub base_ht: Money,
    pub vat: Money,
}

/// Totals of a document, always derived from its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub total_ht: Money,
    pub total_vat: Money,
    pub total_ttc: Money,
    /// One line per distinct rate, highest rate first.
    pub vat_breakdown: Vec<VatBreakdownLine>,
}

impl Default for DocumentTotals {
    fn default() -> Self {
        Self {
            total_ht: Money::zero(),
            total_vat: Money::zero(),
            total_ttc: Money::zero(),
            vat_breakdown: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentTotalsAggregator;

impl DocumentTotalsAggregator {
    /// `totalHT = Σ item HT`, `totalVAT = Σ item VAT`, `totalTTC = totalHT + totalVAT`.
    pub fn aggregate(items: &[LineItem]) -> DomainResult<DocumentTotals> {
        let total_ht = MoneyMath::sum(items.iter().map(LineItem::total_ht))?;
        let total_vat = MoneyMath::sum(items.iter().map(LineItem::total_vat))?;
        let total_ttc = MoneyMath::add(total_ht, total_vat)?;

        let mut groups: BTreeMap<VatRate, (Money, Money)> = BTreeMap::new();
        for item in items {
            let (base, vat) = groups
                .entry(item.vat_rate)
                .or_insert((Money::zero(), Money::zero()));
            *base = MoneyMath::add(*base, item.total_ht())?;
            *vat = MoneyMath::add(*vat, item.total_vat())?;
        }

        let vat_breakdown = groups
            .into_iter()
            .rev()
            .map(|(rate, (base_ht, vat))| VatBreakdownLine { rate, base_ht, vat })
            .collect();

        Ok(DocumentTotals {
            total_ht,
            total_vat,
            total_ttc,
            vat_breakdown,
        })
    }

    /// Merge several breakdowns (e.g. across an export period), highest rate first.
    pub fn merge_breakdowns<'a, I>(breakdowns: I) -> DomainResult<Vec<VatBreakdownLine>>
    where
        I: IntoIterator<Item = &'a [VatBreakdownLine]>,
    {
        let mut groups: BTreeMap<VatRate, (Money, Money)> = BTreeMap::new();
        for line in breakdowns.into_iter().flatten() {
            let (base, vat) = groups
                .entry(line.rate)
                .or_insert((Money::zero(), Money::zero()));
            *base = MoneyMath::add(*base, line.base_ht)?;
            *vat = MoneyMath::add(*vat, line.vat)?;
        }
        Ok(groups
            .into_iter()
            .rev()
            .map(|(rate, (base_ht, vat))| VatBreakdownLine { rate, base_ht, vat })
            .collect())
    }
}
