//! Infrastructure layer: document stores, the service unit of work and
//! environment configuration.

pub mod config;
pub mod service;
pub mod store;


pub use config::{ConfigError, EngineConfig};
pub use service::{DocumentService, ServiceError, ServiceResult};
pub use store::{DocumentFilter, DocumentStore, InMemoryDocumentStore, PostgresDocumentStore, StoreError};
