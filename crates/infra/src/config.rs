//! Engine configuration read from the process environment.

use std::path::PathBuf;

use anyhow::Context;
use thiserror::Error;

use facturo_invoicing::NumberingScheme;
use facturo_vat::StaticCountryTable;

pub const INVOICE_PREFIX: &str = "FACTURO_INVOICE_PREFIX";
pub const CREDIT_NOTE_PREFIX: &str = "FACTURO_CREDIT_NOTE_PREFIX";
pub const NUMBER_PADDING: &str = "FACTURO_NUMBER_PADDING";
pub const FINALIZE_MAX_RETRIES: &str = "FACTURO_FINALIZE_MAX_RETRIES";
pub const PAYMENT_TERMS_DAYS: &str = "FACTURO_PAYMENT_TERMS_DAYS";
pub const COUNTRY_TABLE: &str = "FACTURO_COUNTRY_TABLE";
pub const DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key}: invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub numbering: NumberingScheme,
    /// Attempts at finalizing before a sequence conflict is surfaced.
    pub finalize_max_retries: u32,
    /// Used for the due date when a draft does not set one.
    pub payment_terms_days: u32,
    /// JSON country table replacing the built-in fallback set.
    pub country_table: Option<PathBuf>,
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            numbering: NumberingScheme::default(),
            finalize_max_retries: 5,
            payment_terms_days: 30,
            country_table: None,
            database_url: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; unset or blank keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(prefix) = get(INVOICE_PREFIX) {
            config.numbering.invoice_prefix = prefix_value(INVOICE_PREFIX, prefix)?;
        }
        if let Some(prefix) = get(CREDIT_NOTE_PREFIX) {
            config.numbering.credit_note_prefix = prefix_value(CREDIT_NOTE_PREFIX, prefix)?;
        }
        if config.numbering.invoice_prefix == config.numbering.credit_note_prefix {
            return Err(ConfigError::Invalid {
                key: CREDIT_NOTE_PREFIX,
                value: config.numbering.credit_note_prefix,
                reason: "must differ from the invoice prefix".into(),
            });
        }
        if let Some(raw) = get(NUMBER_PADDING) {
            config.numbering.padding = number(NUMBER_PADDING, &raw, 1..=9)? as usize;
        }
        if let Some(raw) = get(FINALIZE_MAX_RETRIES) {
            config.finalize_max_retries = number(FINALIZE_MAX_RETRIES, &raw, 1..=100)?;
        }
        if let Some(raw) = get(PAYMENT_TERMS_DAYS) {
            config.payment_terms_days = number(PAYMENT_TERMS_DAYS, &raw, 0..=3650)?;
        }
        config.country_table = get(COUNTRY_TABLE).map(PathBuf::from);
        config.database_url = get(DATABASE_URL);

        Ok(config)
    }

    /// The configured country table, or the built-in fallback set.
    pub fn load_country_table(&self) -> anyhow::Result<StaticCountryTable> {
        let Some(path) = &self.country_table else {
            return StaticCountryTable::fallback().context("building the built-in country table");
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading country table {}", path.display()))?;
        StaticCountryTable::from_json(&json)
            .with_context(|| format!("parsing country table {}", path.display()))
    }
}

fn prefix_value(key: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::Invalid {
            key,
            value,
            reason: "prefix must be ASCII letters or digits".into(),
        })
    }
}

fn number(
    key: &'static str,
    raw: &str,
    range: std::ops::RangeInclusive<u32>,
) -> Result<u32, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason,
    };
    let value: u32 = raw.trim().parse().map_err(|e| invalid(format!("{e}")))?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(invalid(format!(
            "expected {}..={}",
            range.start(),
            range.end()
        )))
    }
}
