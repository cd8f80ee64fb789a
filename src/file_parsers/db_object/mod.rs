//! Generic typed tree ("DbObject") values embedded in bundles
//!
//! Every value starts with a type byte. The low 5 bits pick the type, bit 7 is set when the value
//! has no name. Objects and lists are prefixed with the varint length of their contents.

pub mod parser;
pub mod types;

pub use parser::{read_db_object, read_named_db_object};
pub use types::{DbObject, DbType, DbValue};
