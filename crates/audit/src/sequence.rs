//! Gap detection over issued document numbers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use facturo_invoicing::{Document, DocumentNumber};

/// Longest run of missing numbers still listed one entry per number.
pub const MAX_LISTED_RUN: u32 = 16;

/// Result of walking one or more number sequences.
///
/// Not an error: an incomplete sequence is reported so the exporter can show
/// it, and blocks certification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceValidation {
    pub valid: bool,
    /// `missing number: …` entries, in ascending order. A run longer than
    /// [`MAX_LISTED_RUN`] is one `missing numbers: FIRST..LAST (N numbers)`
    /// entry.
    pub gaps: Vec<String>,
    /// Count of missing numbers across every gap entry.
    #[serde(default)]
    pub missing: u64,
    /// `duplicate number: …` and `unparseable number: …` entries.
    pub issues: Vec<String>,
}

impl SequenceValidation {
    pub fn into_result(self) -> Result<(), IncompleteSequence> {
        if self.valid {
            Ok(())
        } else {
            Err(IncompleteSequence {
                problems: self.gaps.into_iter().chain(self.issues).collect(),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("incomplete sequence: {}", problems.join(", "))]
pub struct IncompleteSequence {
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceIntegrityValidator;

impl SequenceIntegrityValidator {
    /// Validate the numbers of every non-draft document in `documents`.
    pub fn validate(documents: &[Document]) -> SequenceValidation {
        let numbers: Vec<String> = documents
            .iter()
            .filter(|d| !d.is_draft())
            .filter_map(|d| d.number().map(ToString::to_string))
            .collect();
        Self::validate_numbers(numbers.iter().map(String::as_str))
    }

    /// Each `(prefix, year)` pair is its own sequence. Gaps are only looked
    /// for between the lowest and highest number seen in a sequence.
    pub fn validate_numbers<'a, I>(numbers: I) -> SequenceValidation
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut issues = Vec::new();
        let mut sequences: BTreeMap<(String, i32), Vec<DocumentNumber>> = BTreeMap::new();

        for raw in numbers {
            match DocumentNumber::parse(raw) {
                Ok(number) => sequences
                    .entry((number.prefix().to_string(), number.year()))
                    .or_default()
                    .push(number),
                Err(_) => issues.push(format!("unparseable number: {raw}")),
            }
        }

        let mut gaps = Vec::new();
        let mut missing = 0u64;
        for numbers in sequences.values_mut() {
            numbers.sort_by_key(DocumentNumber::sequence);

            for pair in numbers.windows(2) {
                let (previous, current) = (&pair[0], &pair[1]);
                if previous.sequence() == current.sequence() {
                    issues.push(format!("duplicate number: {current}"));
                    continue;
                }
                let (first, last) = (previous.sequence() + 1, current.sequence() - 1);
                if first > last {
                    continue;
                }
                missing += u64::from(last - first) + 1;
                report_run(previous, first, last, &mut gaps);
            }
        }

        SequenceValidation {
            valid: gaps.is_empty() && issues.is_empty(),
            gaps,
            missing,
            issues,
        }
    }
}

fn report_run(template: &DocumentNumber, first: u32, last: u32, gaps: &mut Vec<String>) {
    let count = last - first + 1;
    if count <= MAX_LISTED_RUN {
        gaps.extend(
            (first..=last)
                .filter_map(|s| template.with_sequence(s).ok())
                .map(|number| format!("missing number: {number}")),
        );
        return;
    }
    if let (Ok(from), Ok(to)) = (template.with_sequence(first), template.with_sequence(last)) {
        gaps.push(format!("missing numbers: {from}..{to} ({count} numbers)"));
    }
}
