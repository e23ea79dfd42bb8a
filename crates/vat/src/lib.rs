//! VAT treatment of a seller/buyer pair.
//!
//! - `rates`: per-country VAT tables and legal mentions (read-only lookup).
//! - `scenario`: decides which VAT scenario applies and which rates may be used.
//! - `mention`: the legal mention printed on a document.

pub mod mention;
pub mod rates;
pub mod scenario;

pub use mention::{VatMention, VatMentionSelection};
pub use rates::{CountryVatConfig, CountryVatTable, StaticCountryTable};
pub use scenario::{BuyerProfile, ScenarioKey, VatRateOption, VatScenario, VatScenarioResolver};
