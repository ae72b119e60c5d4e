//! Schema operations
//!
//! This module provides a unified interface for the two schema calls the
//! provisioner issues, executed individually under a retry policy.

pub mod operation;

pub use operation::SchemaOperation;
