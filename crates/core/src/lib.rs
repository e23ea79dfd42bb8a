//! `facturo-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! fixed-point money math, the shared error taxonomy, identifiers and the
//! aggregate traits every document type is built on.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId};
pub use money::{Money, MoneyMath, Quantity, VatRate};
pub use value_object::ValueObject;
