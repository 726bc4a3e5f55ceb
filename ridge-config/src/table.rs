// 173-bucket LIFO chained hashtbl config parser, grounded on
// examples/original_source/src/common/parse_config.c.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use ridge_base::{err, Result};

use crate::numeric::{parse_bool, parse_double, parse_float, parse_long, parse_unsigned};
use crate::value::{Operator, Schema, SchemaField, Value, ValueType};

/// Exact bucket count from the original table; changing it would change
/// nothing observable (chains just get longer or shorter) but keeping
/// the number faithful makes collision-order behavior reproducible
/// against the source this was distilled from.
const CONF_HASH_LEN: usize = 173;

#[derive(Clone, Debug)]
struct Entry {
    key: String,
    value: Value,
    operator: Operator,
}

/// A parsed config record: one bucketed hashtbl per nesting level (the
/// top-level file, and one per `LINE`/`EXPLINE` sub-record).
#[derive(Clone, Debug)]
pub struct Table {
    schema: Schema,
    buckets: Vec<Vec<Entry>>,
}

/// Carries the two pieces of parser state that must survive across
/// `Include` boundaries: the directory `Include` paths resolve against,
/// and the cluster name substituted for `%c`.
pub struct ParseContext<'a> {
    pub base_dir: PathBuf,
    pub cluster_name: &'a str,
}

impl<'a> ParseContext<'a> {
    pub fn new(base_dir: impl Into<PathBuf>, cluster_name: &'a str) -> Self {
        ParseContext { base_dir: base_dir.into(), cluster_name }
    }
}

fn hash_key(key: &str) -> usize {
    let mut hashval: u32 = 0;
    for c in key.chars() {
        let c = c.to_ascii_lowercase();
        hashval = (c as u32).wrapping_add(31u32.wrapping_mul(hashval));
    }
    (hashval as usize) % CONF_HASH_LEN
}

fn find_field<'a>(schema: &'a Schema, key: &str) -> Option<&'a SchemaField> {
    schema.iter().find(|f| f.key.eq_ignore_ascii_case(key))
}

impl Table {
    pub fn new(schema: Schema) -> Self {
        Table { schema, buckets: vec![Vec::new(); CONF_HASH_LEN] }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Inserts most-recently-seen first, matching the original's LIFO
    /// chaining: a key repeated later in a file (or in an `Include`d
    /// file processed later) shadows the earlier one at lookup time
    /// without the earlier entry being discarded.
    ///
    /// `EXPLINE` values are the one exception (§4.5 "duplicate master
    /// values cause merging"): a second `NodeName=`/`PartitionName=`-style
    /// line in the same table doesn't shadow the first, it merges into
    /// it slot-by-slot with override semantics, so `n[0-3]` in one line
    /// and `n[2-5]` in another leave `n0,n1` from the first line intact
    /// alongside `n2..n5` from the second (with `n2,n3` taking the
    /// second line's values).
    fn insert(&mut self, key: &str, value: Value, operator: Operator) {
        if let Value::Expline(new_map) = &value {
            let bucket = &mut self.buckets[hash_key(key)];
            if let Some(entry) = bucket.iter_mut().find(|e| e.key.eq_ignore_ascii_case(key)) {
                if let Value::Expline(existing) = &mut entry.value {
                    for (name, table) in new_map.clone() {
                        existing.insert(name, table);
                    }
                    entry.operator = operator;
                    return;
                }
            }
        }
        let bucket = &mut self.buckets[hash_key(key)];
        bucket.insert(0, Entry { key: key.to_string(), value, operator });
    }

    fn find(&self, key: &str) -> Option<&Entry> {
        self.buckets[hash_key(key)].iter().find(|e| e.key.eq_ignore_ascii_case(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    pub fn operator_of(&self, key: &str) -> Option<Operator> {
        self.find(key).map(|e| e.operator)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.find(key).map(|e| &e.value) {
            Some(Value::Str(s)) | Some(Value::PlainStr(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.find(key).map(|e| &e.value) {
            Some(Value::Long(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u16(&self, key: &str) -> Option<u16> {
        match self.find(key).map(|e| &e.value) {
            Some(Value::U16(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.find(key).map(|e| &e.value) {
            Some(Value::U32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.find(key).map(|e| &e.value) {
            Some(Value::U64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_float(&self, key: &str) -> Option<f32> {
        match self.find(key).map(|e| &e.value) {
            Some(Value::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        match self.find(key).map(|e| &e.value) {
            Some(Value::Double(v)) | Some(Value::LongDouble(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.find(key).map(|e| &e.value) {
            Some(Value::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_array(&self, key: &str) -> Option<&[String]> {
        match self.find(key).map(|e| &e.value) {
            Some(Value::Array(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_line(&self, key: &str) -> Option<&Table> {
        match self.find(key).map(|e| &e.value) {
            Some(Value::Line(t)) => Some(t.as_ref()),
            _ => None,
        }
    }

    pub fn get_expline(&self, key: &str) -> Option<&BTreeMap<String, Table>> {
        match self.find(key).map(|e| &e.value) {
            Some(Value::Expline(m)) => Some(m),
            _ => None,
        }
    }

    /// Inserts a pre-built value directly, bypassing parsing. Used by
    /// `expand.rs` to register each expansion slot's sub-table.
    pub(crate) fn insert_raw(&mut self, key: &str, value: Value, operator: Operator) {
        self.insert(key, value, operator);
    }

    /// Merges `other` into `self`, keeping `self`'s entries on key
    /// collision (later-loaded `Include` content never overrides
    /// earlier content unless `hashtbl_merge_override` is used).
    pub fn hashtbl_merge(&mut self, other: Table) {
        for bucket in other.buckets {
            for entry in bucket.into_iter().rev() {
                if !self.contains(&entry.key) {
                    self.insert(&entry.key, entry.value, entry.operator);
                }
            }
        }
    }

    /// Same as `hashtbl_merge` but `other`'s entries win on collision.
    pub fn hashtbl_merge_override(&mut self, other: Table) {
        for bucket in other.buckets {
            for entry in bucket.into_iter().rev() {
                self.insert(&entry.key, entry.value, entry.operator);
            }
        }
    }

    /// Parses the contents of one already-read file, recursively
    /// resolving `Include` directives relative to `ctx.base_dir` (the
    /// including file's own directory, not the process cwd) and
    /// substituting `%c` with `ctx.cluster_name` before tokenizing.
    pub fn parse_file(&mut self, contents: &str, ctx: &ParseContext) -> Result<()> {
        let mut pending = String::new();
        for raw in contents.lines() {
            let line = strip_comment(raw);
            let line = line.trim_end();
            if let Some(stripped) = line.strip_suffix('\\') {
                if !stripped.ends_with('\\') {
                    pending.push_str(stripped);
                    pending.push(' ');
                    continue;
                }
            }
            pending.push_str(line);
            let logical = std::mem::take(&mut pending);
            let logical = logical.trim();
            if logical.is_empty() {
                continue;
            }
            self.parse_line(logical, ctx)?;
        }
        if !pending.trim().is_empty() {
            let logical = std::mem::take(&mut pending);
            self.parse_line(logical.trim(), ctx)?;
        }
        Ok(())
    }

    pub fn parse_line(&mut self, line: &str, ctx: &ParseContext) -> Result<()> {
        let line = substitute_cluster_name(line, ctx.cluster_name);
        let mut tokens = split_whitespace_respecting_quotes(&line);
        if tokens.is_empty() {
            return Ok(());
        }
        if tokens[0].eq_ignore_ascii_case("include") {
            if tokens.len() != 2 {
                return Err(err(format!("Include requires exactly one path argument: {line:?}")));
            }
            return self.parse_include(&tokens.remove(1), ctx);
        }
        for token in tokens {
            self.parse_pair(&token, ctx)?;
        }
        Ok(())
    }

    fn parse_include(&mut self, path: &str, ctx: &ParseContext) -> Result<()> {
        let resolved = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            ctx.base_dir.join(path)
        };
        let contents = std::fs::read_to_string(&resolved)
            .map_err(|e| err(format!("Include {}: {e}", resolved.display())))?;
        let nested_ctx = ParseContext {
            base_dir: resolved.parent().map(Path::to_path_buf).unwrap_or_else(|| ctx.base_dir.clone()),
            cluster_name: ctx.cluster_name,
        };
        self.parse_file(&contents, &nested_ctx)
    }

    /// Parses one `KEY<op>VALUE` token against the schema, running its
    /// handler (if any) and storing the result keyed by the
    /// case-preserved schema key.
    pub fn parse_pair(&mut self, token: &str, ctx: &ParseContext) -> Result<()> {
        let (key, operator, raw_value) =
            split_operator(token).ok_or_else(|| err(format!("not a key=value pair: {token:?}")))?;
        let field = find_field(&self.schema, key)
            .ok_or_else(|| err(format!("unknown configuration key: {key:?}")))?
            .clone();
        let value = parse_value_text(field.ty, raw_value, &field.sub_schema, ctx)?;
        if let Some(handler) = &field.handler {
            handler(raw_value, &value)?;
        }
        self.insert(&field.key, value, operator);
        Ok(())
    }

    /// Renders the table back to `KEY=VALUE` tokens, one per line, in
    /// schema order. This has no counterpart in the original parser —
    /// it exists purely so config round-tripping (parse, emit, reparse,
    /// compare) is testable.
    pub fn emit(&self) -> String {
        let mut out = String::new();
        for field in &self.schema {
            if let Some(entry) = self.find(&field.key) {
                out.push_str(&field.key);
                out.push_str(entry.operator.as_sigil());
                out.push_str(&emit_value(&entry.value));
                out.push('\n');
            }
        }
        out
    }
}

fn emit_value(value: &Value) -> String {
    match value {
        Value::Ignore | Value::Pointer => String::new(),
        Value::Str(s) | Value::PlainStr(s) => s.clone(),
        Value::Long(v) => v.to_string(),
        Value::U16(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) | Value::LongDouble(v) => v.to_string(),
        Value::Bool(v) => if *v { "yes".to_string() } else { "no".to_string() },
        Value::Array(items) => items.join(","),
        Value::Line(t) => t.emit().replace('\n', " ").trim().to_string(),
        Value::Expline(map) => map.keys().cloned().collect::<Vec<_>>().join(","),
    }
}

pub(crate) fn parse_value_text(
    ty: ValueType,
    text: &str,
    sub_schema: &Option<Schema>,
    ctx: &ParseContext,
) -> Result<Value> {
    match ty {
        ValueType::Ignore => Ok(Value::Ignore),
        ValueType::String => Ok(Value::Str(unescape(text))),
        ValueType::PlainString => Ok(Value::PlainStr(text.to_string())),
        ValueType::Long => Ok(Value::Long(parse_long(text)?)),
        ValueType::Uint16 => Ok(Value::U16(parse_unsigned(text, 16)? as u16)),
        ValueType::Uint32 => Ok(Value::U32(parse_unsigned(text, 32)? as u32)),
        ValueType::Uint64 => Ok(Value::U64(parse_unsigned(text, 64)?)),
        ValueType::Float => Ok(Value::Float(parse_float(text)?)),
        ValueType::Double => Ok(Value::Double(parse_double(text)?)),
        ValueType::LongDouble => Ok(Value::LongDouble(parse_double(text)?)),
        ValueType::Boolean => Ok(Value::Bool(parse_bool(text)?)),
        ValueType::Pointer => Ok(Value::Pointer),
        ValueType::Array => Ok(Value::Array(text.split(',').map(|s| s.trim().to_string()).collect())),
        ValueType::Line => {
            let schema = sub_schema.clone().ok_or_else(|| err("LINE field missing sub-schema".to_string()))?;
            let mut table = Table::new(schema);
            table.parse_line(text, ctx)?;
            Ok(Value::Line(Box::new(table)))
        }
        ValueType::Expline => {
            let schema = sub_schema.clone().ok_or_else(|| err("EXPLINE field missing sub-schema".to_string()))?;
            crate::expand::parse_expline(text, &schema, ctx)
        }
    }
}

fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '#' {
                    out.push('#');
                    chars.next();
                    continue;
                }
                if next == '\\' {
                    out.push('\\');
                    chars.next();
                    continue;
                }
            }
            out.push(c);
            continue;
        }
        if c == '#' {
            break;
        }
        out.push(c);
    }
    out
}

fn unescape(text: &str) -> String {
    text.replace("\\#", "#").replace("\\\\", "\\")
}

fn substitute_cluster_name(line: &str, cluster_name: &str) -> String {
    line.replace("%c", &cluster_name.to_ascii_lowercase())
}

/// `keyvalue_re` in the original: a single compiled pattern matching
/// `key<op>=value`, with the operator sigil in its own capture group.
/// The original lazily compiles this behind a mutex and reinstalls it
/// in a `pthread_atfork` child handler, because a fork mid-`regexec()`
/// can inherit an internally locked regex. `once_cell::sync::Lazy`
/// needs neither: it's a one-time, thread-safe initialization with no
/// internal lock held across calls, and this process never forks after
/// spawning threads (reconfigure re-parses in the calling thread), so
/// the "thread-safe primitive that needs no cache" alternative from the
/// design notes applies directly rather than a ported mutex+atfork dance.
static KEYVALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_.]+)\s*([-+*/]?)=\s*(.*)$").expect("keyvalue regex is a fixed literal")
});

pub(crate) fn split_operator(token: &str) -> Option<(&str, Operator, &str)> {
    let caps = KEYVALUE_RE.captures(token)?;
    let key = caps.get(1)?.as_str();
    let sigil = caps.get(2)?.as_str();
    let value = caps.get(3)?.as_str();
    let operator = if sigil.is_empty() { Operator::Assign } else { Operator::from_sigil(&format!("{sigil}="))? };
    Some((key, operator, value))
}

pub(crate) fn split_whitespace_respecting_quotes(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
