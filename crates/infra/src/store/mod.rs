//! Document persistence boundary.
//!
//! Stores hold the current state of each document and its append-only event
//! trail. Both implementations run the invoicing guard before every write.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use r#trait::{DocumentFilter, DocumentStore, StoreError};
