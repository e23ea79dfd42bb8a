//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Parties (clients) are entities: a client keeps its identity while its name,
/// address or VAT number are edited. Documents never hold the entity itself
/// once finalized, only a frozen copy of its data.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
