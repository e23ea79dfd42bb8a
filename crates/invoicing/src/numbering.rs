//! Human-readable document numbers: `{PREFIX}-{YEAR}-{ZERO_PADDED_SEQUENCE}`.

use core::fmt;

use serde::{Deserialize, Serialize};

use facturo_core::{DomainError, DomainResult};

use crate::document::DocumentKind;

/// A parsed document number.
///
/// The prefix may itself contain `-`; parsing splits from the right.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentNumber {
    prefix: String,
    year: i32,
    sequence: u32,
    width: usize,
}

impl DocumentNumber {
    pub fn new(prefix: impl Into<String>, year: i32, sequence: u32, width: usize) -> DomainResult<Self> {
        let prefix = prefix.into();
        if prefix.trim().is_empty() {
            return Err(DomainError::validation("number prefix cannot be empty"));
        }
        if !(1000..=9999).contains(&year) {
            return Err(DomainError::validation(format!("number year out of range: {year}")));
        }
        if sequence == 0 {
            return Err(DomainError::validation("number sequence starts at 1"));
        }
        Ok(Self {
            prefix,
            year,
            sequence,
            width: width.max(1),
        })
    }

    pub fn parse(input: &str) -> DomainResult<Self> {
        let unparseable = || DomainError::validation(format!("unparseable number: {input}"));

        let mut parts = input.rsplitn(3, '-');
        let sequence = parts.next().ok_or_else(unparseable)?;
        let year = parts.next().ok_or_else(unparseable)?;
        let prefix = parts.next().ok_or_else(unparseable)?;

        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if year.len() != 4 || !all_digits(year) || !all_digits(sequence) {
            return Err(unparseable());
        }

        let year = year.parse::<i32>().map_err(|_| unparseable())?;
        let width = sequence.len();
        let sequence = sequence.parse::<u32>().map_err(|_| unparseable())?;
        Self::new(prefix, year, sequence, width).map_err(|_| unparseable())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Identity of the number regardless of zero padding.
    pub fn slot(&self) -> (&str, i32, u32) {
        (&self.prefix, self.year, self.sequence)
    }

    /// Same prefix, year and width; another sequence value.
    pub fn with_sequence(&self, sequence: u32) -> DomainResult<Self> {
        Self::new(self.prefix.clone(), self.year, sequence, self.width)
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:0width$}",
            self.prefix,
            self.year,
            self.sequence,
            width = self.width
        )
    }
}

impl TryFrom<String> for DocumentNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentNumber> for String {
    fn from(value: DocumentNumber) -> Self {
        value.to_string()
    }
}

impl core::str::FromStr for DocumentNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Prefixes and padding used when allocating numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingScheme {
    pub invoice_prefix: String,
    pub credit_note_prefix: String,
    pub padding: usize,
}

impl Default for NumberingScheme {
    fn default() -> Self {
        Self {
            invoice_prefix: "INV".to_string(),
            credit_note_prefix: "CN".to_string(),
            padding: 3,
        }
    }
}

impl NumberingScheme {
    pub fn prefix_for(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Invoice => &self.invoice_prefix,
            DocumentKind::CreditNote => &self.credit_note_prefix,
        }
    }

    pub fn format(&self, kind: DocumentKind, year: i32, sequence: u32) -> DomainResult<DocumentNumber> {
        DocumentNumber::new(self.prefix_for(kind), year, sequence, self.padding)
    }

    /// Next number after the highest one already committed for `kind`/`year`.
    pub fn next_after(
        &self,
        kind: DocumentKind,
        year: i32,
        highest_committed: Option<u32>,
    ) -> DomainResult<DocumentNumber> {
        let next = highest_committed
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| DomainError::sequence_conflict(format!("sequence exhausted for {year}")))?;
        self.format(kind, year, next)
    }
}
