//! Domain types: the decoded, application-level view of gateway messages.
//!
//! Nothing in here performs I/O.  Device payloads are deliberately
//! schema-light: a new sensor model must not require a change to this crate.

pub mod field;
pub mod report;

pub use field::{FieldMap, FieldValue};
pub use report::ReportMessage;
