//! Typed, hash-indexed configuration parsing (§4.5): a 173-bucket LIFO
//! hashtbl keyed against a caller-supplied schema, host-range expansion
//! for `NodeName=`-style lines, and `Include` resolution relative to the
//! including file's own directory.

mod expand;
mod numeric;
mod table;
mod value;

pub use numeric::{parse_bool, parse_double, parse_float, parse_long, parse_unsigned};
pub use table::{ParseContext, Table};
pub use value::{Operator, Schema, SchemaField, Value, ValueHandler, ValueDestroyer, ValueType};
