//! Audit support over finalized documents: numbering integrity, buyer
//! pseudonymization and the export bundle consumed by file exporters.

pub mod anonymize;
pub mod export;
pub mod sequence;

pub use anonymize::Anonymizer;
pub use export::{AuditExport, ExportPeriod, ExportTotals, ExportedDocument, SequenceReport};
pub use sequence::{IncompleteSequence, SequenceIntegrityValidator, SequenceValidation};
