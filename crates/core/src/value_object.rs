//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two `Money`
/// amounts of `10.0000` are the same thing, whereas two clients named "ACME"
/// are not. `Money`, `Quantity`, `VatRate`, party snapshots and VAT scenarios
/// are all value objects.
///
/// To "modify" a value object, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
