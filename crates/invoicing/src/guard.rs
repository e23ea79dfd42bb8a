//! Persistence guard for documents.
//!
//! Every store calls these checks before writing, so a finalized document
//! cannot be altered or removed by any code path that bypasses the
//! aggregate (batch jobs, admin tooling, hand-built rows).

use facturo_core::{AggregateRoot, DomainError, DomainResult};

use crate::document::Document;
use crate::lifecycle::{can_transition, DocumentStatus};
use crate::numbering::{DocumentNumber, NumberingScheme};
use crate::totals::DocumentTotalsAggregator;

/// A brand-new record must be an empty-handed draft.
pub fn verify_insert(next: &Document) -> DomainResult<()> {
    if !next.is_created() {
        return Err(DomainError::invariant("cannot store a document that was never created"));
    }
    if !next.is_draft() {
        return Err(DomainError::invariant(format!(
            "document {} must be stored as a draft first",
            next.id_typed()
        )));
    }
    verify_draft_shape(next)?;
    verify_derived_totals(next)
}

/// Checks a replacement of `previous` by `next`.
pub fn verify_update(previous: &Document, next: &Document) -> DomainResult<()> {
    if previous.id_typed() != next.id_typed() || previous.tenant_id() != next.tenant_id() {
        return Err(DomainError::invariant("document identity cannot change"));
    }
    if next.version() < previous.version() {
        return Err(DomainError::conflict(format!(
            "stale write for document {} (version {} < {})",
            next.id_typed(),
            next.version(),
            previous.version()
        )));
    }

    let from = previous.status();
    let to = next.status();
    if from != to && !can_transition(from, to) {
        return Err(DomainError::invalid_transition(previous.id_typed(), from, to));
    }

    match (from, to) {
        (DocumentStatus::Draft, DocumentStatus::Draft) => {
            verify_draft_shape(next)?;
            verify_derived_totals(next)
        }
        (DocumentStatus::Draft, _) => {
            verify_finalized_shape(next)?;
            verify_derived_totals(next)
        }
        _ => verify_frozen(previous, next),
    }
}

/// Number this write assigns, if it is the one finalizing a draft.
pub fn assigned_number<'a>(
    previous: Option<&Document>,
    next: &'a Document,
) -> Option<&'a DocumentNumber> {
    match previous {
        Some(previous) if previous.number().is_none() => next.number(),
        _ => None,
    }
}

/// A newly assigned number carries the prefix and padding `scheme` gives its
/// kind, and directly follows `highest_committed` for its prefix and year.
///
/// A sequence that does not follow is a `SequenceConflict`: the caller lost a
/// race or allocated from stale data, and retries with a fresh number.
pub fn verify_assigned_number(
    next: &Document,
    scheme: &NumberingScheme,
    highest_committed: Option<u32>,
) -> DomainResult<()> {
    let Some(number) = next.number() else {
        return Ok(());
    };
    let kind = next.kind();
    let prefix = scheme.prefix_for(kind);
    if number.prefix() != prefix {
        return Err(DomainError::invariant(format!(
            "number {number} of {} {} does not use the prefix {prefix}",
            kind.as_str(),
            next.id_typed()
        )));
    }
    let canonical = scheme.format(kind, number.year(), number.sequence())?;
    if canonical.to_string() != number.to_string() {
        return Err(DomainError::invariant(format!(
            "number {number} is not formatted as {canonical}"
        )));
    }
    let expected = scheme.next_after(kind, number.year(), highest_committed)?;
    if number.sequence() != expected.sequence() {
        return Err(DomainError::sequence_conflict(format!(
            "number {number} does not follow the committed sequence, next is {expected}"
        )));
    }
    Ok(())
}

/// Only drafts may be deleted.
pub fn verify_delete(current: &Document) -> DomainResult<()> {
    current.ensure_deletable()
}

/// Drafts carry neither a number nor party snapshots.
fn verify_draft_shape(next: &Document) -> DomainResult<()> {
    let present = if next.number().is_some() {
        Some("a number")
    } else if next.snapshots().is_some() {
        Some("party snapshots")
    } else {
        None
    };
    match present {
        Some(field) => Err(DomainError::invariant(format!(
            "draft {} cannot carry {field}",
            next.id_typed()
        ))),
        None => Ok(()),
    }
}

fn verify_finalized_shape(next: &Document) -> DomainResult<()> {
    let missing = if next.number().is_none() {
        Some("number")
    } else if next.snapshots().is_none() {
        Some("party snapshots")
    } else if next.issue_date().is_none() {
        Some("issue date")
    } else if next.items().is_empty() {
        Some("line items")
    } else {
        None
    };
    match missing {
        Some(field) => Err(DomainError::invariant(format!(
            "finalized document {} has no {field}",
            next.id_typed()
        ))),
        None => Ok(()),
    }
}

fn verify_derived_totals(next: &Document) -> DomainResult<()> {
    let expected = DocumentTotalsAggregator::aggregate(next.items())?;
    if &expected != next.totals() {
        return Err(DomainError::invariant(format!(
            "totals of document {} do not match its items",
            next.id_typed()
        )));
    }
    Ok(())
}

/// Outside draft only status, `sent_at`, `paid_at` and a first archive
/// record may differ.
fn verify_frozen(previous: &Document, next: &Document) -> DomainResult<()> {
    let changed = if previous.kind() != next.kind() {
        Some("kind")
    } else if previous.number() != next.number() {
        Some("number")
    } else if previous.header() != next.header() {
        Some("header")
    } else if previous.rate_scope() != next.rate_scope() {
        Some("VAT rate options")
    } else if previous.credit_note_of() != next.credit_note_of() {
        Some("credit note reference")
    } else if previous.items() != next.items() {
        Some("line items")
    } else if previous.totals() != next.totals() {
        Some("totals")
    } else if previous.snapshots() != next.snapshots() {
        Some("party snapshots")
    } else if previous.finalized_at() != next.finalized_at() {
        Some("finalization time")
    } else if previous.archive().is_some() && previous.archive() != next.archive() {
        Some("archive metadata")
    } else {
        None
    };

    match changed {
        Some(field) => Err(DomainError::immutable(
            previous.id_typed(),
            previous.status(),
            format!("change {field}"),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentCommand, MarkSent, RecordArchive};
    use crate::fixtures;
    use chrono::Utc;
    use facturo_core::Aggregate;
    use serde_json::json;

    /// Rewrites a stored document the way a careless batch job would.
    fn tamper(document: &Document, edit: impl FnOnce(&mut serde_json::Value)) -> Document {
        let mut raw = serde_json::to_value(document).unwrap();
        edit(&mut raw);
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn drafts_change_freely() {
        let parties = fixtures::parties();
        let previous = fixtures::draft(&parties, vec![fixtures::input("A", "10", 17)]);
        let mut next = previous.clone();
        next.execute(&DocumentCommand::AddItem(crate::document::AddItem {
            tenant_id: parties.tenant_id,
            document_id: next.id_typed(),
            item_id: crate::line_item::LineItemId::new(),
            item: fixtures::input("B", "5", 3),
            occurred_at: Utc::now(),
        }))
        .unwrap();
        assert!(verify_update(&previous, &next).is_ok());
    }

    #[test]
    fn finalization_passes_the_guard() {
        let parties = fixtures::parties();
        let previous = fixtures::draft(&parties, vec![fixtures::input("A", "10", 17)]);
        let mut next = previous.clone();
        fixtures::finalize(&parties, &mut next, "INV-2026-001");
        assert!(verify_update(&previous, &next).is_ok());
    }

    #[test]
    fn finalized_content_edits_are_refused_at_persistence() {
        let parties = fixtures::parties();
        let previous = fixtures::finalized_invoice(&parties, "INV-2026-001");

        let item_edit = tamper(&previous, |raw| {
            raw["items"][0]["title"] = json!("Edited after the fact");
        });
        let snapshot_edit = tamper(&previous, |raw| {
            raw["snapshots"]["buyer"]["name"] = json!("Someone else");
        });
        let number_edit = tamper(&previous, |raw| {
            raw["number"] = json!("INV-2026-099");
        });

        for next in [item_edit, snapshot_edit, number_edit] {
            let err = verify_update(&previous, &next).unwrap_err();
            assert!(
                matches!(err, DomainError::ImmutableDocument { ref status, .. } if status == "finalized"),
                "{err:?}"
            );
        }
    }

    #[test]
    fn status_only_changes_are_allowed() {
        let parties = fixtures::parties();
        let previous = fixtures::finalized_invoice(&parties, "INV-2026-001");
        let mut next = previous.clone();
        next.execute(&DocumentCommand::MarkSent(MarkSent {
            tenant_id: parties.tenant_id,
            document_id: previous.id_typed(),
            occurred_at: Utc::now(),
        }))
        .unwrap();
        next.execute(&DocumentCommand::RecordArchive(RecordArchive {
            tenant_id: parties.tenant_id,
            document_id: previous.id_typed(),
            checksum: "sha256:0f1e".into(),
            occurred_at: Utc::now(),
        }))
        .unwrap();
        assert!(verify_update(&previous, &next).is_ok());

        let rewritten = tamper(&next, |raw| {
            raw["archive"]["checksum"] = json!("sha256:ffff");
        });
        assert!(matches!(
            verify_update(&next, &rewritten).unwrap_err(),
            DomainError::ImmutableDocument { .. }
        ));
    }

    #[test]
    fn status_jumps_outside_the_table_are_refused() {
        let parties = fixtures::parties();
        let previous = fixtures::finalized_invoice(&parties, "INV-2026-001");
        let back_to_draft = tamper(&previous, |raw| raw["status"] = json!("draft"));
        assert!(matches!(
            verify_update(&previous, &back_to_draft).unwrap_err(),
            DomainError::InvalidTransition { .. }
        ));

        let draft = fixtures::draft(&parties, vec![fixtures::input("A", "10", 17)]);
        let skipped = tamper(&draft, |raw| raw["status"] = json!("paid"));
        assert!(matches!(
            verify_update(&draft, &skipped).unwrap_err(),
            DomainError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn hand_set_totals_are_refused() {
        let parties = fixtures::parties();
        let draft = fixtures::draft(&parties, vec![fixtures::input("A", "10", 17)]);
        let forged = tamper(&draft, |raw| raw["totals"]["total_ttc"] = json!("1.0000"));
        assert!(matches!(
            verify_update(&draft, &forged).unwrap_err(),
            DomainError::InvariantViolation(_)
        ));
    }

    #[test]
    fn drafts_cannot_smuggle_a_number_or_snapshots() {
        let parties = fixtures::parties();
        let draft = fixtures::draft(&parties, vec![fixtures::input("A", "10", 17)]);
        let numbered = tamper(&draft, |raw| raw["number"] = json!("INV-2026-007"));
        assert!(matches!(
            verify_update(&draft, &numbered).unwrap_err(),
            DomainError::InvariantViolation(_)
        ));
        assert!(verify_insert(&numbered).is_err());

        let finalized = fixtures::finalized_invoice(&parties, "INV-2026-001");
        let snapshots = serde_json::to_value(finalized.snapshots()).unwrap();
        let with_snapshots = tamper(&draft, |raw| raw["snapshots"] = snapshots);
        assert!(matches!(
            verify_update(&draft, &with_snapshots).unwrap_err(),
            DomainError::InvariantViolation(_)
        ));
    }

    #[test]
    fn assigned_numbers_follow_the_scheme_and_the_sequence() {
        let parties = fixtures::parties();
        let scheme = NumberingScheme::default();
        let draft = fixtures::draft(&parties, vec![fixtures::input("A", "10", 17)]);
        let finalize = |number: &str| {
            let mut next = draft.clone();
            fixtures::finalize(&parties, &mut next, number);
            next
        };

        let next = finalize("INV-2026-002");
        assert_eq!(
            assigned_number(Some(&draft), &next).map(ToString::to_string),
            Some("INV-2026-002".to_string())
        );
        assert_eq!(assigned_number(Some(&next), &next), None);
        assert!(verify_assigned_number(&next, &scheme, Some(1)).is_ok());

        let out_of_sequence = [
            ("INV-2026-003", Some(1)),
            ("INV-2026-001", Some(1)),
            ("INV-2026-002", None),
        ];
        for (number, highest) in out_of_sequence {
            let err = verify_assigned_number(&finalize(number), &scheme, highest).unwrap_err();
            assert!(matches!(err, DomainError::SequenceConflict(_)), "{number}: {err:?}");
        }
        for number in ["CN-2026-002", "INV-2026-0002"] {
            let err = verify_assigned_number(&finalize(number), &scheme, Some(1)).unwrap_err();
            assert!(matches!(err, DomainError::InvariantViolation(_)), "{number}: {err:?}");
        }
    }

    #[test]
    fn only_drafts_are_inserted_or_deleted() {
        let parties = fixtures::parties();
        let draft = fixtures::draft(&parties, vec![]);
        assert!(verify_insert(&draft).is_ok());
        assert!(verify_delete(&draft).is_ok());

        let finalized = fixtures::finalized_invoice(&parties, "INV-2026-001");
        assert!(verify_insert(&finalized).is_err());
        assert!(matches!(
            verify_delete(&finalized).unwrap_err(),
            DomainError::ImmutableDocument { .. }
        ));
    }
}
