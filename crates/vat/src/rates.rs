//! Country VAT tables.
//!
//! The tables are configuration: the engine only reads them. A built-in
//! fallback set covers the countries the product ships with; deployments can
//! replace it with a JSON document of the same shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use facturo_core::{DomainError, DomainResult, Money, VatRate};
use facturo_parties::CountryCode;

const INTRA_EU_MENTION: &str =
    "Autoliquidation - exonération de TVA, article 196 de la directive 2006/112/CE";
const EXPORT_MENTION: &str =
    "Exonération de TVA - livraison hors UE, article 146 de la directive 2006/112/CE";

/// VAT configuration for one country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryVatTable {
    pub country: CountryCode,
    /// Standard rate, suggested for domestic sales.
    pub standard_rate: VatRate,
    /// Every selectable rate, standard first then descending. May include 0.
    pub rates: Vec<VatRate>,
    /// Legal text printed by franchise (VAT-exempt) sellers of this country.
    pub franchise_mention: String,
    /// Yearly turnover ceiling of the franchise regime, if any.
    pub franchise_threshold: Option<Money>,
    pub intra_eu_mention: String,
    pub export_mention: String,
}

impl CountryVatTable {
    fn builtin(
        country: &str,
        rates: &[&str],
        franchise_mention: &str,
        threshold: Option<i64>,
    ) -> DomainResult<Self> {
        let rates = rates
            .iter()
            .map(|r| VatRate::parse(r))
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self {
            country: CountryCode::new(country)?,
            standard_rate: rates.first().copied().unwrap_or_else(VatRate::zero),
            rates,
            franchise_mention: franchise_mention.to_string(),
            franchise_threshold: threshold.map(|t| Money::from_scaled(t * 10_000)),
            intra_eu_mention: INTRA_EU_MENTION.to_string(),
            export_mention: EXPORT_MENTION.to_string(),
        })
    }

    /// Whether `rate` may be used on a document of this country.
    pub fn supports(&self, rate: VatRate) -> bool {
        rate.is_zero() || self.rates.contains(&rate)
    }

    /// Non-zero rates in table order.
    pub fn taxed_rates(&self) -> impl Iterator<Item = VatRate> + '_ {
        self.rates.iter().copied().filter(|r| !r.is_zero())
    }

    fn validate(&self) -> DomainResult<()> {
        if self.rates.is_empty() {
            return Err(DomainError::validation(format!(
                "VAT table for {} has no rates",
                self.country
            )));
        }
        if !self.supports(self.standard_rate) {
            return Err(DomainError::validation(format!(
                "standard rate {} of {} is not part of its rate list",
                self.standard_rate, self.country
            )));
        }
        Ok(())
    }
}

/// Read-only lookup of country VAT configuration.
pub trait CountryVatConfig: Send + Sync {
    fn table(&self, country: &CountryCode) -> Option<&CountryVatTable>;

    fn require(&self, country: &CountryCode) -> DomainResult<&CountryVatTable> {
        self.table(country).ok_or_else(|| {
            DomainError::validation(format!("no VAT configuration for country {country}"))
        })
    }
}

/// In-memory country table, keyed by country code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticCountryTable {
    tables: BTreeMap<CountryCode, CountryVatTable>,
}

impl StaticCountryTable {
    pub fn new(tables: impl IntoIterator<Item = CountryVatTable>) -> DomainResult<Self> {
        let mut map = BTreeMap::new();
        for table in tables {
            table.validate()?;
            map.insert(table.country.clone(), table);
        }
        Ok(Self { tables: map })
    }

    /// Documented fallback set used when no configuration is supplied.
    pub fn fallback() -> DomainResult<Self> {
        let tables = [
            CountryVatTable::builtin(
                "LU",
                &["17", "14", "8", "3", "0"],
                "Franchise de TVA - article 57 de la loi TVA luxembourgeoise",
                Some(50_000),
            ),
            CountryVatTable::builtin(
                "FR",
                &["20", "10", "5.5", "2.1", "0"],
                "TVA non applicable, art. 293 B du CGI",
                Some(37_500),
            ),
            CountryVatTable::builtin(
                "BE",
                &["21", "12", "6", "0"],
                "Régime particulier de franchise des petites entreprises",
                Some(25_000),
            ),
            CountryVatTable::builtin(
                "DE",
                &["19", "7", "0"],
                "Gemäß § 19 UStG wird keine Umsatzsteuer berechnet",
                Some(25_000),
            ),
            CountryVatTable::builtin(
                "NL",
                &["21", "9", "0"],
                "Vrijgesteld van btw op grond van de kleineondernemersregeling",
                Some(20_000),
            ),
            CountryVatTable::builtin(
                "IT",
                &["22", "10", "5", "4", "0"],
                "Operazione in franchigia da IVA ai sensi dell'art. 1, c. 54-89, L. 190/2014",
                Some(85_000),
            ),
            CountryVatTable::builtin(
                "ES",
                &["21", "10", "4", "0"],
                "Operación exenta de IVA en régimen de franquicia",
                Some(85_000),
            ),
        ];
        Self::new(tables.into_iter().collect::<DomainResult<Vec<_>>>()?)
    }

    /// Parse a JSON object `{ "LU": { ...table... }, ... }`.
    pub fn from_json(json: &str) -> DomainResult<Self> {
        let parsed: BTreeMap<CountryCode, CountryVatTable> = serde_json::from_str(json)
            .map_err(|e| DomainError::validation(format!("invalid country VAT table: {e}")))?;
        for (key, table) in &parsed {
            if key != &table.country {
                return Err(DomainError::validation(format!(
                    "country table keyed {key} describes {}",
                    table.country
                )));
            }
        }
        Self::new(parsed.into_values())
    }

    pub fn countries(&self) -> impl Iterator<Item = &CountryCode> {
        self.tables.keys()
    }
}

impl CountryVatConfig for StaticCountryTable {
    fn table(&self, country: &CountryCode) -> Option<&CountryVatTable> {
        self.tables.get(country)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lu() -> CountryCode {
        CountryCode::new("LU").unwrap()
    }

    #[test]
    fn fallback_tables_are_well_formed() {
        let config = StaticCountryTable::fallback().unwrap();
        assert_eq!(config.countries().count(), 7);
        for country in config.countries() {
            let table = config.table(country).unwrap();
            table.validate().unwrap();
            assert!(!table.standard_rate.is_zero(), "{country} standard rate");
        }
    }

    #[test]
    fn luxembourg_rates_match_the_legal_set() {
        let config = StaticCountryTable::fallback().unwrap();
        let table = config.require(&lu()).unwrap();
        let rates: Vec<String> = table.rates.iter().map(|r| r.to_string()).collect();
        assert_eq!(rates, ["17.00%", "14.00%", "8.00%", "3.00%", "0.00%"]);
        assert_eq!(table.standard_rate, VatRate::percent(17).unwrap());
    }

    #[test]
    fn unknown_country_is_reported() {
        let config = StaticCountryTable::fallback().unwrap();
        let err = config.require(&CountryCode::new("JP").unwrap()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn json_table_replaces_the_fallback() {
        let json = r#"{
            "CH": {
                "country": "CH",
                "standard_rate": "8.1",
                "rates": ["8.1", "2.6", "0"],
                "franchise_mention": "Nicht MWST-pflichtig",
                "franchise_threshold": "100000",
                "intra_eu_mention": "n/a",
                "export_mention": "Export, steuerbefreit"
            }
        }"#;
        let config = StaticCountryTable::from_json(json).unwrap();
        let table = config.require(&CountryCode::new("CH").unwrap()).unwrap();
        assert_eq!(table.standard_rate, VatRate::parse("8.1").unwrap());
        assert!(table.supports(VatRate::parse("2.6").unwrap()));
        assert!(config.table(&lu()).is_none());
    }

    #[test]
    fn malformed_builtin_rows_are_reported() {
        let row = CountryVatTable::builtin("LU", &["17", "seventeen"], "x", None);
        assert!(matches!(row.unwrap_err(), DomainError::InvalidAmount(_)));

        let rows = vec![
            CountryVatTable::builtin("LU", &["17", "0"], "x", None),
            CountryVatTable::builtin("L", &["17"], "x", None),
        ];
        assert!(rows.into_iter().collect::<DomainResult<Vec<_>>>().is_err());
    }

    #[test]
    fn json_table_with_mismatched_key_is_rejected() {
        let json = r#"{
            "FR": {
                "country": "LU",
                "standard_rate": "17",
                "rates": ["17"],
                "franchise_mention": "x",
                "franchise_threshold": null,
                "intra_eu_mention": "x",
                "export_mention": "x"
            }
        }"#;
        assert!(StaticCountryTable::from_json(json).is_err());
    }
}
