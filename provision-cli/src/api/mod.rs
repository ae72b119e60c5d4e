//! Schema store API module
//!
//! This module provides the narrow interface the provisioner needs against a
//! Notion-compatible workspace store: creating schemas, patching properties
//! onto them, typed error classification, and retry/concurrency resilience.

pub mod client;
pub mod error;
pub mod models;
pub mod operations;
pub mod resilience;

pub use client::{NotionClient, SchemaStoreClient};
pub use error::{ErrorKind, StoreError};
pub use models::{CreateSchemaRequest, SchemaResponse};
pub use operations::SchemaOperation;
