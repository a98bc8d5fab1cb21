//! Evaluator: facet tree plus environment to canonical tree
//!
//! Facets are walked in order. A facet with an `if` attribute is gated by
//! the expression engine (the attribute must be a quoted string). Bodies
//! classify as a list (every member a list item, surfaced under `items`) or
//! a map; attributes surface under the reserved `_attrs` key, first.
//!
//! Every value runs through, in order: scalar substitution, template
//! interpolation (recursing through inline maps and lists), and the lens
//! pipeline. Fenced values skip the first two and enter their pipeline as
//! raw strings. List items carry their own gating and pipelines; gated-out
//! items are dropped before any lens runs.

use indexmap::IndexMap;

use crate::facet::ast::{BodyValue, Entry, Facet, Kv, ListItem};
use crate::facet::errors::{FacetError, Result};
use crate::facet::expr::eval_condition;
use crate::facet::interp::{interpolate, substitute_scalar, RefMode};
use crate::facet::lenses::apply_pipeline;
use crate::facet::value::Value;

/// Evaluate the post-import facet list against the environment.
pub fn evaluate(facets: &[Facet], env: &IndexMap<String, Value>) -> Result<Value> {
    let mut out = IndexMap::new();
    for facet in facets {
        if let Some(cond) = facet.attrs.get("if") {
            let Value::Str(expr) = cond else {
                return Err(FacetError::at(
                    "F704",
                    "If expression must be quoted",
                    facet.pos,
                ));
            };
            if !eval_condition(expr, env)? {
                continue;
            }
        }
        let value = eval_facet_body(facet, env)?;
        let value = match &facet.anchor {
            Some(name) => Value::Anchor {
                name: name.clone(),
                value: Box::new(value),
            },
            None => value,
        };
        out.insert(facet.name.clone(), value);
    }
    Ok(Value::Map(out))
}

fn eval_facet_body(facet: &Facet, env: &IndexMap<String, Value>) -> Result<Value> {
    let is_list = !facet.body.is_empty()
        && facet.body.iter().all(|e| matches!(e, Entry::Item(_)));
    let mut obj = IndexMap::new();
    if !facet.attrs.is_empty() {
        obj.insert("_attrs".to_string(), Value::Map(facet.attrs.clone()));
    }
    if is_list {
        let items: Vec<&ListItem> = facet
            .body
            .iter()
            .filter_map(|e| match e {
                Entry::Item(item) => Some(item),
                Entry::Kv(_) => None,
            })
            .collect();
        obj.insert(
            "items".to_string(),
            Value::List(eval_items(&items, env, RefMode::Template)?),
        );
        return Ok(Value::Map(obj));
    }
    for entry in &facet.body {
        match entry {
            Entry::Kv(kv) => {
                let value = eval_kv(kv, env, RefMode::Template)?;
                obj.insert(kv.key.clone(), value);
            }
            Entry::Item(item) => {
                return Err(FacetError::at(
                    "F101",
                    "Mixed list and map items in the same block are not allowed",
                    item.pos,
                ));
            }
        }
    }
    Ok(Value::Map(obj))
}

/// Evaluate a key's value and apply its lens pipeline. Also used for
/// `@vars` entries, where missing references report as forward references.
pub(crate) fn eval_kv(kv: &Kv, env: &IndexMap<String, Value>, mode: RefMode) -> Result<Value> {
    let value = eval_body_value(&kv.value, env, mode)?;
    apply_pipeline(value, &kv.lenses)
}

fn eval_body_value(
    body: &BodyValue,
    env: &IndexMap<String, Value>,
    mode: RefMode,
) -> Result<Value> {
    match body {
        BodyValue::Scalar(v) => eval_value(v, env, mode),
        BodyValue::Seq(items) => {
            let refs: Vec<&ListItem> = items.iter().collect();
            Ok(Value::List(eval_items(&refs, env, mode)?))
        }
        BodyValue::Map(kvs) => {
            let mut out = IndexMap::new();
            for kv in kvs {
                let value = eval_kv(kv, env, mode)?;
                out.insert(kv.key.clone(), value);
            }
            Ok(Value::Map(out))
        }
    }
}

fn eval_items(
    items: &[&ListItem],
    env: &IndexMap<String, Value>,
    mode: RefMode,
) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Some(cond) = &item.condition {
            if !eval_condition(cond, env)? {
                continue;
            }
        }
        let value = eval_value(&item.value, env, mode)?;
        let value = apply_pipeline(value, &item.lenses)?;
        out.push(value);
    }
    Ok(out)
}

/// Substitute, interpolate, and recurse through containers. Fences become
/// plain strings without either pass; anchors keep their wrapper while the
/// wrapped value is evaluated.
pub(crate) fn eval_value(
    value: &Value,
    env: &IndexMap<String, Value>,
    mode: RefMode,
) -> Result<Value> {
    match value {
        Value::Fence(s) => Ok(Value::Str(s.clone())),
        Value::Str(_) => {
            let substituted = substitute_scalar(value, env, mode)?;
            match substituted {
                Value::Str(s) => Ok(Value::Str(interpolate(&s, env, mode)?)),
                other => Ok(other),
            }
        }
        Value::List(xs) => {
            let mut out = Vec::with_capacity(xs.len());
            for x in xs {
                out.push(eval_value(x, env, mode)?);
            }
            Ok(Value::List(out))
        }
        Value::Map(m) => {
            let mut out = IndexMap::with_capacity(m.len());
            for (k, v) in m {
                out.insert(k.clone(), eval_value(v, env, mode)?);
            }
            Ok(Value::Map(out))
        }
        Value::Anchor { name, value: inner } => Ok(Value::Anchor {
            name: name.clone(),
            value: Box::new(eval_value(inner, env, mode)?),
        }),
        other => Ok(other.clone()),
    }
}
