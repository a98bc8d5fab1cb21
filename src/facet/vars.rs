//! Compile-time environment: `@vars` resolution and `@var_types` validation
//!
//! Before general evaluation, `@vars` and `@var_types` facets are split out
//! of the document. `@vars` entries resolve strictly top-down: each
//! right-hand side is fully evaluated (substitution, interpolation, item
//! gating, lens pipelines) against the entries above it, and a reference to
//! a not-yet-defined path is a forward-reference error.
//!
//! `@var_types` maps dotted paths into `@vars` to small spec objects
//! (`type`, optional `enum` / `min` / `max` / `pattern`). Validation runs
//! after resolution and before any downstream evaluation: a rejected
//! environment stops the compilation outright. An integer is accepted
//! where a float is declared; no other widening applies.

use indexmap::IndexMap;
use regex::Regex;

use crate::facet::ast::{BodyValue, Entry, Facet};
use crate::facet::errors::{FacetError, Result};
use crate::facet::eval::eval_kv;
use crate::facet::interp::RefMode;
use crate::facet::value::{get_path, value_eq, Value};

const ALLOWED_TYPES: [&str; 6] = ["string", "int", "float", "bool", "array", "object"];

/// The compile-time split: remaining facets, resolved `@vars`, and the
/// collected `@var_types` specs.
#[derive(Debug)]
pub struct CompileTime {
    pub facets: Vec<Facet>,
    pub vars: IndexMap<String, Value>,
    pub type_specs: IndexMap<String, Value>,
}

/// Separate `@vars` / `@var_types` from the document and resolve them.
pub fn split_compile_time(facets: Vec<Facet>) -> Result<CompileTime> {
    let mut vars: IndexMap<String, Value> = IndexMap::new();
    let mut type_specs: IndexMap<String, Value> = IndexMap::new();
    let mut rest = Vec::new();
    for facet in facets {
        match facet.name.as_str() {
            "vars" => {
                for entry in &facet.body {
                    if let Entry::Kv(kv) = entry {
                        let value = eval_kv(kv, &vars, RefMode::VarsTopDown)?;
                        vars.insert(kv.key.clone(), value);
                    }
                }
            }
            "var_types" => {
                for entry in &facet.body {
                    if let Entry::Kv(kv) = entry {
                        type_specs.insert(kv.key.clone(), raw_body_value(&kv.value));
                    }
                }
            }
            _ => rest.push(facet),
        }
    }
    Ok(CompileTime {
        facets: rest,
        vars,
        type_specs,
    })
}

/// Convert a type-spec body to a plain value without any evaluation;
/// specs are literals.
fn raw_body_value(body: &BodyValue) -> Value {
    match body {
        BodyValue::Scalar(v) => v.clone(),
        BodyValue::Seq(items) => {
            Value::List(items.iter().map(|item| item.value.clone()).collect())
        }
        BodyValue::Map(kvs) => Value::Map(
            kvs.iter()
                .map(|kv| (kv.key.clone(), raw_body_value(&kv.value)))
                .collect(),
        ),
    }
}

/// Validate the resolved `@vars` against the declared type specs.
pub fn validate_var_types(
    vars: &IndexMap<String, Value>,
    specs: &IndexMap<String, Value>,
) -> Result<()> {
    for (path, spec) in specs {
        let Value::Map(spec) = spec else {
            return Err(FacetError::new(
                "F451",
                format!("Invalid type spec for '{}'", path),
            ));
        };
        let declared = match spec.get("type") {
            Some(Value::Str(t)) if ALLOWED_TYPES.contains(&t.as_str()) => t.as_str(),
            Some(Value::Str(t)) => {
                return Err(FacetError::new(
                    "F451",
                    format!("Unknown type '{}' for '{}'", t, path),
                ));
            }
            _ => {
                return Err(FacetError::new(
                    "F451",
                    format!("Unknown type for '{}'", path),
                ));
            }
        };
        let Some(actual_value) = get_path(vars, path) else {
            return Err(FacetError::new(
                "F451",
                format!("Path '{}' not found in @vars for typing", path),
            ));
        };
        let actual = actual_value.type_name();
        let matches_type = declared == actual || (declared == "float" && actual == "int");
        if !matches_type {
            return Err(FacetError::new(
                "F451",
                format!(
                    "Type mismatch for '{}': expected {}, got {}",
                    path, declared, actual
                ),
            ));
        }
        check_constraints(path, declared, actual_value, spec)?;
    }
    Ok(())
}

fn check_constraints(
    path: &str,
    declared: &str,
    value: &Value,
    spec: &IndexMap<String, Value>,
) -> Result<()> {
    if let Some(Value::List(choices)) = spec.get("enum") {
        if !choices.iter().any(|c| value_eq(c, value)) {
            return Err(FacetError::new(
                "F452",
                format!("Enum violation for '{}'", path),
            ));
        }
    }
    if matches!(declared, "int" | "float") {
        let actual = value.as_f64().unwrap_or(0.0);
        if let Some(min) = spec.get("min").and_then(|v| v.as_f64()) {
            if actual < min {
                return Err(FacetError::new(
                    "F452",
                    format!("min violation for '{}': {} < {}", path, actual, min),
                ));
            }
        }
        if let Some(max) = spec.get("max").and_then(|v| v.as_f64()) {
            if actual > max {
                return Err(FacetError::new(
                    "F452",
                    format!("max violation for '{}': {} > {}", path, actual, max),
                ));
            }
        }
    }
    if declared == "string" {
        if let Some(Value::Str(pattern)) = spec.get("pattern") {
            let anchored = format!("^(?:{})$", pattern);
            let re = Regex::new(&anchored).map_err(|_| {
                FacetError::new("F452", format!("Invalid pattern for '{}'", path))
            })?;
            let text = value.as_str().unwrap_or("");
            if !re.is_match(text) {
                return Err(FacetError::new(
                    "F452",
                    format!("pattern violation for '{}'", path),
                ));
            }
        }
    }
    Ok(())
}

/// Merge environments for the selected resolve mode: `host` sees only host
/// variables; `all` sees both with host entries overriding on conflict.
pub fn merged_env(
    all_mode: bool,
    compile_vars: &IndexMap<String, Value>,
    host_vars: &IndexMap<String, Value>,
) -> IndexMap<String, Value> {
    if !all_mode {
        return host_vars.clone();
    }
    let mut env = compile_vars.clone();
    for (k, v) in host_vars {
        env.insert(k.clone(), v.clone());
    }
    env
}
