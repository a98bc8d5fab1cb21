//! Anchor and alias resolution over the evaluated tree
//!
//! Two passes. The collect pass registers every anchor definition by its
//! textual name, recursing into anchored values so nested anchors are
//! visible; redefinition is an error. The substitute pass replaces each
//! alias with a recursively substituted copy of the anchored value and
//! unwraps the anchor markers themselves, so the final tree carries neither
//! `&` nor `*`. Cycles are detected with a visiting set keyed by anchor
//! name, since anchors are identified by name in this language, not by node
//! identity.

use std::collections::{HashMap, HashSet};

use crate::facet::errors::{FacetError, Result};
use crate::facet::value::Value;

/// Resolve all anchors and aliases, producing a marker-free tree.
pub fn resolve_anchors(root: Value) -> Result<Value> {
    let mut anchors = HashMap::new();
    collect(&root, &mut anchors)?;
    let mut visiting = HashSet::new();
    substitute(&root, &anchors, &mut visiting)
}

fn collect(value: &Value, anchors: &mut HashMap<String, Value>) -> Result<()> {
    match value {
        Value::Anchor { name, value: inner } => {
            if anchors.contains_key(name) {
                return Err(FacetError::new(
                    "F202",
                    format!("Anchor redefinition: {}", name),
                ));
            }
            anchors.insert(name.clone(), (**inner).clone());
            collect(inner, anchors)
        }
        Value::Map(m) => {
            for v in m.values() {
                collect(v, anchors)?;
            }
            Ok(())
        }
        Value::List(xs) => {
            for v in xs {
                collect(v, anchors)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn substitute(
    value: &Value,
    anchors: &HashMap<String, Value>,
    visiting: &mut HashSet<String>,
) -> Result<Value> {
    match value {
        Value::Alias(name) => {
            if visiting.contains(name) {
                return Err(FacetError::new("F201", "Anchor cycle detected"));
            }
            let Some(target) = anchors.get(name) else {
                return Err(FacetError::new(
                    "F201",
                    format!("Undefined anchor alias: {}", name),
                ));
            };
            visiting.insert(name.clone());
            let result = substitute(target, anchors, visiting);
            visiting.remove(name);
            result
        }
        Value::Anchor { value: inner, .. } => substitute(inner, anchors, visiting),
        Value::Map(m) => {
            let mut out = indexmap::IndexMap::with_capacity(m.len());
            for (k, v) in m {
                out.insert(k.clone(), substitute(v, anchors, visiting)?);
            }
            Ok(Value::Map(out))
        }
        Value::List(xs) => {
            let mut out = Vec::with_capacity(xs.len());
            for v in xs {
                out.push(substitute(v, anchors, visiting)?);
            }
            Ok(Value::List(out))
        }
        other => Ok(other.clone()),
    }
}
