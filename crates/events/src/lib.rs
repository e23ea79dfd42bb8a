//! Domain events and the envelope they are recorded in.
//!
//! Documents change state only through events; stores keep those events as an
//! append-only audit trail next to the document itself.

pub mod envelope;
pub mod event;

pub use envelope::EventEnvelope;
pub use event::Event;
