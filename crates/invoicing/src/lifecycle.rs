//! Document status and the transition table.

use core::fmt;

use serde::{Deserialize, Serialize};

use facturo_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Finalized,
    Sent,
    Paid,
    Cancelled,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 5] = [
        DocumentStatus::Draft,
        DocumentStatus::Finalized,
        DocumentStatus::Sent,
        DocumentStatus::Paid,
        DocumentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Finalized => "finalized",
            DocumentStatus::Sent => "sent",
            DocumentStatus::Paid => "paid",
            DocumentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, DocumentStatus::Draft)
    }

    /// No outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        allowed_targets(*self).is_empty()
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for DocumentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown document status '{s}'")))
    }
}

/// Statuses reachable in one step from `from`.
pub fn allowed_targets(from: DocumentStatus) -> &'static [DocumentStatus] {
    use DocumentStatus::*;
    match from {
        Draft => &[Finalized],
        Finalized => &[Sent, Paid, Cancelled],
        Sent => &[Paid, Cancelled],
        Paid | Cancelled => &[],
    }
}

/// Pure transition check; no storage involved.
pub fn can_transition(from: DocumentStatus, to: DocumentStatus) -> bool {
    allowed_targets(from).contains(&to)
}

pub fn ensure_transition(
    document_id: impl ToString,
    from: DocumentStatus,
    to: DocumentStatus,
) -> DomainResult<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(DomainError::invalid_transition(document_id, from, to))
    }
}

/// Content changes are only accepted on drafts.
pub fn ensure_draft(
    document_id: impl ToString,
    status: DocumentStatus,
    attempted: impl Into<String>,
) -> DomainResult<()> {
    if status.is_draft() {
        Ok(())
    } else {
        Err(DomainError::immutable(document_id, status, attempted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DocumentStatus::*;

    #[test]
    fn transition_table_is_exact() {
        let allowed = [
            (Draft, Finalized),
            (Finalized, Sent),
            (Finalized, Paid),
            (Finalized, Cancelled),
            (Sent, Paid),
            (Sent, Cancelled),
        ];
        for from in DocumentStatus::ALL {
            for to in DocumentStatus::ALL {
                assert_eq!(
                    can_transition(from, to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn paid_and_cancelled_are_terminal() {
        assert!(Paid.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Sent.is_terminal());
    }

    #[test]
    fn rejected_transition_names_both_ends() {
        let err = ensure_transition("doc-1", Paid, Sent).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(err.to_string(), "invalid transition for document doc-1: paid -> sent");
    }

    #[test]
    fn content_changes_outside_draft_are_immutable() {
        assert!(ensure_draft("doc-1", Draft, "add item").is_ok());
        let err = ensure_draft("doc-1", Sent, "add item").unwrap_err();
        assert_eq!(
            err.to_string(),
            "document doc-1 is immutable in status 'sent': add item"
        );
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in DocumentStatus::ALL {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("void".parse::<DocumentStatus>().is_err());
    }
}
