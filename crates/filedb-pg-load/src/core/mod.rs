//! Format-agnostic core types: schema metadata, row values, identifiers.

pub mod identifier;
pub mod schema;
pub mod value;

pub use identifier::{quote_ident, IdentCase};
pub use schema::{Column, Index, SourceDescriptor, Table, TypeTag};
pub use value::{Row, SqlValue};
