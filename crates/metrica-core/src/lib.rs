//! # metrica-core
//!
//! Core data types for the metrica formula language.
//!
//! This crate provides:
//! - [`FieldValue`] - A value stored in a record (number, text or null)
//! - [`Record`] and [`RecordInput`] - The data formulas are evaluated against
//! - [`Schema`] - Known field names of a product, with field aliases
//!
//! ## Example
//!
//! ```rust
//! use metrica_core::{Record, RecordInput, Schema};
//!
//! let records = vec![
//!     Record::new().with("amount", 100.0).with("status", "active"),
//!     Record::new().with("amount", 50.0).with("status", "closed"),
//! ];
//! let input = RecordInput::from(&records);
//! assert_eq!(input.len(), 2);
//!
//! let schema = Schema::from_fields(["amount", "status"]).unwrap();
//! assert!(schema.contains("outstanding_balance"));
//! ```

pub mod error;
pub mod record;
pub mod schema;
pub mod value;

// Re-exports for convenience
pub use error::{Error, Result};
pub use record::{Record, RecordInput};
pub use schema::{is_valid_field_name, Schema, BUILTIN_ALIASES};
pub use value::FieldValue;
