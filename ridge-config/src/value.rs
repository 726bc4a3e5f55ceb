use std::sync::Arc;

use ridge_base::Result;

use crate::Table;

/// The type tag a schema field carries, fixing how its value text is
/// parsed. Mirrors spec.md §4.5's type list exactly; there is no type
/// erasure at the storage layer because mismatches (e.g. a `LONG` field
/// fed `EXPLINE`-shaped text) should fail at parse time, not at read
/// time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ValueType {
    Ignore,
    String,
    PlainString,
    Long,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
    LongDouble,
    Boolean,
    Pointer,
    Array,
    /// A single nested record, parsed with its own sub-schema.
    Line,
    /// A host-range-expanded master key whose nested record is
    /// replicated once per expansion slot (§4.5 "Expanded lines").
    Expline,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Operator {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl Operator {
    pub fn from_sigil(sigil: &str) -> Option<Operator> {
        match sigil {
            "=" => Some(Operator::Assign),
            "+=" => Some(Operator::AddAssign),
            "-=" => Some(Operator::SubAssign),
            "*=" => Some(Operator::MulAssign),
            "/=" => Some(Operator::DivAssign),
            _ => None,
        }
    }

    pub fn as_sigil(&self) -> &'static str {
        match self {
            Operator::Assign => "=",
            Operator::AddAssign => "+=",
            Operator::SubAssign => "-=",
            Operator::MulAssign => "*=",
            Operator::DivAssign => "/=",
        }
    }
}

/// `LongDouble` has no native Rust equivalent with more precision than
/// `f64`; it is stored as `f64`, the same simplification the spec's
/// Non-goals permit (we don't reproduce every operator knob, and no
/// caller observes extra mantissa bits).
#[derive(Clone, Debug)]
pub enum Value {
    Ignore,
    Str(String),
    PlainStr(String),
    Long(i64),
    U16(u16),
    U32(u32),
    U64(u64),
    Float(f32),
    Double(f64),
    LongDouble(f64),
    Bool(bool),
    Pointer,
    Array(Vec<String>),
    Line(Box<Table>),
    Expline(std::collections::BTreeMap<String, Table>),
}

pub type ValueHandler = Arc<dyn Fn(&str, &Value) -> Result<()> + Send + Sync>;
pub type ValueDestroyer = Arc<dyn Fn(&Value) + Send + Sync>;

/// One entry of a table's schema: a key, its type, an optional
/// sub-schema (required for `Line`/`Expline` fields), an optional
/// handler invoked after the value is parsed (free to reject it), and an
/// optional destroyer invoked when the owning table is dropped.
#[derive(Clone)]
pub struct SchemaField {
    pub key: String,
    pub ty: ValueType,
    pub sub_schema: Option<Schema>,
    pub handler: Option<ValueHandler>,
    pub destroyer: Option<ValueDestroyer>,
}

impl std::fmt::Debug for SchemaField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaField")
            .field("key", &self.key)
            .field("ty", &self.ty)
            .field("sub_schema", &self.sub_schema)
            .field("handler", &self.handler.is_some())
            .field("destroyer", &self.destroyer.is_some())
            .finish()
    }
}

impl SchemaField {
    pub fn new(key: impl Into<String>, ty: ValueType) -> Self {
        SchemaField { key: key.into(), ty, sub_schema: None, handler: None, destroyer: None }
    }

    pub fn with_sub_schema(mut self, sub_schema: Schema) -> Self {
        self.sub_schema = Some(sub_schema);
        self
    }

    pub fn with_handler(mut self, handler: ValueHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_destroyer(mut self, destroyer: ValueDestroyer) -> Self {
        self.destroyer = Some(destroyer);
        self
    }
}

pub type Schema = Vec<SchemaField>;
