// EXPLINE expansion: a single config line whose master key carries a
// host-range expression is replicated into one sub-table per expanded
// hostname. Grounded on spec.md §4.5's "Expanded lines" rules and on
// `original_source/src/common/parse_config.c`'s `_parse_expline_doexpand`,
// which is the same replicate-by-cardinality behavior `NodeName=` lines
// rely on, including its `item_count % tables_count == 0` evenly-divides
// case below.

use std::collections::BTreeMap;

use ridge_base::{err, expand_hostlist, Result};

use crate::table::{parse_value_text, split_operator, split_whitespace_respecting_quotes, ParseContext, Table};
use crate::value::{Operator, Schema, Value, ValueType};

/// Parses the text of one `EXPLINE` record. By convention the first
/// field in `schema` is the master field: its value is a host-range
/// expression expanded into the slot names, and every other field's
/// value is distributed across those slots according to the cardinality
/// rule below.
pub fn parse_expline(text: &str, schema: &Schema, ctx: &ParseContext) -> Result<Value> {
    let master = schema.first().ok_or_else(|| err("EXPLINE sub-schema has no master field".to_string()))?;

    let tokens = split_whitespace_respecting_quotes(text);
    let mut master_spec: Option<String> = None;
    let mut raw_fields: Vec<(String, Operator, String)> = Vec::new();
    for token in &tokens {
        let (key, operator, value) = split_operator(token)
            .ok_or_else(|| err(format!("not a key=value pair: {token:?}")))?;
        if key.eq_ignore_ascii_case(&master.key) {
            master_spec = Some(value.to_string());
        } else {
            raw_fields.push((key.to_string(), operator, value.to_string()));
        }
    }
    let master_spec = master_spec.ok_or_else(|| err(format!("EXPLINE record missing master key {:?}", master.key)))?;
    let names = expand_hostlist(&master_spec)?;
    if names.is_empty() {
        return Err(err(format!("EXPLINE master {:?} expanded to zero names", master.key)));
    }

    // Pre-split every sibling field's raw text into per-slot strings
    // honoring the cardinality rule: a single scalar value is replicated
    // to every slot; a list matching `names.len()` distributes one value
    // per slot; a shorter list that evenly divides `names.len()` assigns
    // each value to a contiguous block of `names.len() / parts.len()`
    // slots; any other length is a hard error.
    let mut per_slot_fields: Vec<Vec<(String, Operator, String)>> = vec![Vec::new(); names.len()];
    for (key, operator, raw) in &raw_fields {
        let field = schema
            .iter()
            .find(|f| f.key.eq_ignore_ascii_case(key))
            .ok_or_else(|| err(format!("unknown configuration key in EXPLINE record: {key:?}")))?;
        let parts = split_list_value(raw, field.ty);
        let per_name = match parts.len() {
            1 => vec![parts[0].clone(); names.len()],
            n if n == names.len() => parts,
            n if n > 0 && names.len() % n == 0 => {
                let block = names.len() / n;
                (0..names.len()).map(|i| parts[i / block].clone()).collect()
            }
            n => {
                return Err(err(format!(
                    "field {:?} has {n} values but EXPLINE master {:?} expanded to {} names, and {} does not evenly divide {}",
                    key, master.key, names.len(), n, names.len()
                )))
            }
        };
        for (slot, value) in per_slot_fields.iter_mut().zip(per_name) {
            slot.push((key.clone(), *operator, value));
        }
    }

    let mut map = BTreeMap::new();
    for (idx, name) in names.into_iter().enumerate() {
        let mut table = Table::new(schema.clone());
        let master_value = parse_value_text(master.ty, &name, &master.sub_schema, ctx)?;
        table.insert_raw(&master.key, master_value, Operator::Assign);
        for (key, operator, raw) in &per_slot_fields[idx] {
            let field = schema.iter().find(|f| f.key.eq_ignore_ascii_case(key)).unwrap();
            let value = parse_value_text(field.ty, raw, &field.sub_schema, ctx)?;
            table.insert_raw(&field.key, value, *operator);
        }
        map.insert(name, table);
    }
    Ok(Value::Expline(map))
}

fn split_list_value(raw: &str, ty: ValueType) -> Vec<String> {
    if matches!(ty, ValueType::Array) {
        return vec![raw.to_string()];
    }
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::SchemaField;

    fn schema() -> Schema {
        vec![
            SchemaField::new("NodeName", ValueType::String),
            SchemaField::new("Weight", ValueType::Uint32),
            SchemaField::new("Feature", ValueType::PlainString),
        ]
    }

    #[test]
    fn expands_and_distributes_matching_cardinality() {
        let ctx = ParseContext::new(".", "testcluster");
        let value = parse_expline("NodeName=n[1-3] Weight=1,2,3 Feature=gpu", &schema(), &ctx).unwrap();
        let Value::Expline(map) = value else { panic!("expected Expline") };
        assert_eq!(map.len(), 3);
        assert_eq!(map["n2"].get_u32("Weight"), Some(2));
        assert_eq!(map["n3"].get_str("Feature"), Some("gpu"));
    }

    #[test]
    fn replicates_single_scalar_to_every_slot() {
        let ctx = ParseContext::new(".", "testcluster");
        let value = parse_expline("NodeName=n[1-4] Weight=7", &schema(), &ctx).unwrap();
        let Value::Expline(map) = value else { panic!("expected Expline") };
        assert_eq!(map.len(), 4);
        assert!(map.values().all(|t| t.get_u32("Weight") == Some(7)));
    }

    #[test]
    fn rejects_mismatched_cardinality() {
        let ctx = ParseContext::new(".", "testcluster");
        let result = parse_expline("NodeName=n[1-3] Weight=1,2", &schema(), &ctx);
        assert!(result.is_err());
    }

    #[test]
    fn evenly_divides_into_contiguous_blocks() {
        // spec.md §4.5: 2 values across 4 hosts assigns each value to a
        // contiguous half (n0,n1 -> first value; n2,n3 -> second).
        let ctx = ParseContext::new(".", "testcluster");
        let value = parse_expline("NodeName=n[0-3] Weight=1,2", &schema(), &ctx).unwrap();
        let Value::Expline(map) = value else { panic!("expected Expline") };
        assert_eq!(map["n0"].get_u32("Weight"), Some(1));
        assert_eq!(map["n1"].get_u32("Weight"), Some(1));
        assert_eq!(map["n2"].get_u32("Weight"), Some(2));
        assert_eq!(map["n3"].get_u32("Weight"), Some(2));
    }

    #[test]
    fn rejects_non_divisor_cardinality() {
        let ctx = ParseContext::new(".", "testcluster");
        let result = parse_expline("NodeName=n[0-2] Weight=1,2", &schema(), &ctx);
        assert!(result.is_err());
    }
}
