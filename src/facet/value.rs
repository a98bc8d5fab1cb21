//! The tagged value enum shared by the facet tree and the canonical tree
//!
//! A single sum type covers every value kind the language knows about.
//! `Fence`, `Anchor`, and `Alias` are internal variants: the evaluator
//! turns fences into plain strings and the anchor resolver eliminates the
//! anchor/alias markers, so a fully compiled tree contains only nulls,
//! booleans, numbers, strings, sequences, and maps.
//!
//! Maps preserve first-insertion order throughout; re-inserting an existing
//! key updates the value but keeps the original position, which is exactly
//! the language's "first appearance order, last key wins" rule.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A FACET value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Raw fenced-block text. Skips substitution and interpolation.
    Fence(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// An anchor definition wrapping its value. Never survives resolution.
    Anchor { name: String, value: Box<Value> },
    /// An alias reference to an anchor. Never survives resolution.
    Alias(String),
}

impl Value {
    /// The type name used in diagnostics and `@var_types` checks.
    /// Fences count as strings; the marker variants never reach typing.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) | Value::Fence(_) => "string",
            Value::List(_) => "array",
            Value::Map(_) => "object",
            Value::Anchor { .. } | Value::Alias(_) => "object",
        }
    }

    /// Python-like truthiness: null, false, zero, and empty strings,
    /// sequences, and maps are falsy; everything else is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) | Value::Fence(s) => !s.is_empty(),
            Value::List(xs) => !xs.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Anchor { value, .. } => value.truthy(),
            Value::Alias(_) => true,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Fence(s) => Some(s),
            _ => None,
        }
    }
}

/// Equality with numeric widening: `1 == 1.0` holds, as in the expression
/// sub-language and `enum` constraint checks. All other kinds compare
/// structurally.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Look up a dotted path in a nested map environment.
///
/// The first segment indexes `root`; each further segment requires the
/// current value to be a map. Returns `None` on the first missing segment.
pub fn get_path<'a>(root: &'a IndexMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut cur = root.get(parts.next()?)?;
    for part in parts {
        match cur {
            Value::Map(m) => cur = m.get(part)?,
            _ => return None,
        }
    }
    Some(cur)
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) | Value::Fence(s) => serializer.serialize_str(s),
            Value::List(xs) => {
                let mut seq = serializer.serialize_seq(Some(xs.len()))?;
                for x in xs {
                    seq.serialize_element(x)?;
                }
                seq.end()
            }
            Value::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            // Resolution removes these; if one leaks into serialization the
            // output degrades to the wrapped value / null rather than a
            // private marker shape.
            Value::Anchor { value, .. } => value.serialize(serializer),
            Value::Alias(_) => serializer.serialize_unit(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(xs) => Value::List(xs.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(m) => {
                Value::Map(m.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Encode a value as canonical JSON bytes: lexicographically sorted object
/// keys, `,` and `:` separators with no spaces, UTF-8, non-ASCII characters
/// unescaped. This encoding is part of the seeded-lens determinism contract
/// and must not change.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => match serde_json::Number::from_f64(*f) {
            Some(n) => out.push_str(&n.to_string()),
            None => out.push_str("null"),
        },
        Value::Str(s) | Value::Fence(s) => write_json_string(out, s),
        Value::List(xs) => {
            out.push('[');
            for (i, x) in xs.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, x);
            }
            out.push(']');
        }
        Value::Map(m) => {
            let mut keys: Vec<&String> = m.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(out, k);
                out.push(':');
                write_canonical(out, &m[*k]);
            }
            out.push('}');
        }
        Value::Anchor { value, .. } => write_canonical(out, value),
        Value::Alias(_) => out.push_str("null"),
    }
}

fn write_json_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(!Value::List(vec![]).truthy());
        assert!(Value::Int(-1).truthy());
        assert!(Value::Str("x".into()).truthy());
        assert!(Value::List(vec![Value::Null]).truthy());
    }

    #[test]
    fn test_numeric_equality_widens() {
        assert!(value_eq(&Value::Int(1), &Value::Float(1.0)));
        assert!(!value_eq(&Value::Int(1), &Value::Float(1.5)));
        assert!(!value_eq(&Value::Int(1), &Value::Str("1".into())));
    }

    #[test]
    fn test_get_path_nested() {
        let env: IndexMap<String, Value> = [(
            "a".to_string(),
            map(&[("b", Value::Int(3)), ("c", Value::Str("x".into()))]),
        )]
        .into_iter()
        .collect();
        assert_eq!(get_path(&env, "a.b"), Some(&Value::Int(3)));
        assert_eq!(get_path(&env, "a.c"), Some(&Value::Str("x".into())));
        assert_eq!(get_path(&env, "a.z"), None);
        assert_eq!(get_path(&env, "z"), None);
    }

    #[test]
    fn test_serialization_preserves_insertion_order() {
        let v = map(&[("zeta", Value::Int(1)), ("alpha", Value::Int(2))]);
        assert_eq!(
            serde_json::to_string(&v).unwrap(),
            r#"{"zeta":1,"alpha":2}"#
        );
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let v = map(&[("zeta", Value::Int(1)), ("alpha", Value::Int(2))]);
        assert_eq!(canonical_json(&v), r#"{"alpha":2,"zeta":1}"#);
    }

    #[test]
    fn test_canonical_json_minimal_separators() {
        let v = Value::List(vec![
            Value::Str("a".into()),
            Value::Int(1),
            Value::Bool(true),
            Value::Null,
        ]);
        assert_eq!(canonical_json(&v), r#"["a",1,true,null]"#);
    }

    #[test]
    fn test_canonical_json_keeps_non_ascii() {
        let v = Value::Str("héllo".into());
        assert_eq!(canonical_json(&v), "\"héllo\"");
    }

    #[test]
    fn test_canonical_json_escapes_controls() {
        let v = Value::Str("a\nb\t\"c\"".into());
        assert_eq!(canonical_json(&v), r#""a\nb\t\"c\"""#);
    }

    #[test]
    fn test_int_and_float_render_distinctly() {
        assert_eq!(canonical_json(&Value::Int(3)), "3");
        assert_eq!(canonical_json(&Value::Float(3.0)), "3.0");
    }
}
