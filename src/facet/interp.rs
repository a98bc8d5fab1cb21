//! Scalar substitution and template interpolation
//!
//! Two scalar-level mechanisms feed the evaluator:
//!
//! - *Substitution* replaces a string that is exactly `$name` or
//!   `${dotted.path}` with the referenced value, which may be of any kind.
//! - *Interpolation* replaces `{{dotted.path}}` occurrences inside a string
//!   with the referenced value; non-strings render as minified JSON.
//!   `\{{` and `\}}` escape the braces.
//!
//! The same code serves two reference modes: inside `@vars` a missing path
//! is a forward reference (`F404`); everywhere else it is an undefined
//! template variable (`F402A`).

use indexmap::IndexMap;

use crate::facet::errors::{FacetError, Result};
use crate::facet::value::{get_path, Value};

/// How a missing reference is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefMode {
    /// Normal evaluation: `F402A` undefined template variable.
    Template,
    /// Top-down `@vars` resolution: `F404` forward reference.
    VarsTopDown,
}

fn missing_ref(mode: RefMode, path: &str) -> FacetError {
    match mode {
        RefMode::Template => FacetError::new(
            "F402A",
            format!("Undefined template variable '{{{{{}}}}}'", path),
        ),
        RefMode::VarsTopDown => {
            FacetError::new("F404", format!("Variable forward reference '{}'", path))
        }
    }
}

fn resolve(env: &IndexMap<String, Value>, path: &str, mode: RefMode) -> Result<Value> {
    get_path(env, path)
        .cloned()
        .ok_or_else(|| missing_ref(mode, path))
}

/// Substitute a whole-string scalar reference. Strings that are not exactly
/// a `$name` / `${path}` marker (and non-strings) pass through unchanged.
pub fn substitute_scalar(
    value: &Value,
    env: &IndexMap<String, Value>,
    mode: RefMode,
) -> Result<Value> {
    if let Value::Str(s) = value {
        if let Some(inner) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
            return resolve(env, inner.trim(), mode);
        }
        if let Some(name) = s.strip_prefix('$') {
            if !name.is_empty() {
                return resolve(env, name, mode);
            }
        }
    }
    Ok(value.clone())
}

/// Interpolate `{{path}}` references inside a string.
pub fn interpolate(text: &str, env: &IndexMap<String, Value>, mode: RefMode) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        if let Some(stripped) = rest.strip_prefix("\\{{") {
            out.push_str("{{");
            rest = stripped;
            continue;
        }
        if let Some(stripped) = rest.strip_prefix("\\}}") {
            out.push_str("}}");
            rest = stripped;
            continue;
        }
        if let Some(stripped) = rest.strip_prefix("{{") {
            let Some(end) = stripped.find("}}") else {
                return Err(FacetError::new("F402B", "Unclosed template_ref in string"));
            };
            let key = stripped[..end].trim();
            if key.is_empty() {
                return Err(FacetError::new("F402B", "Empty template_ref"));
            }
            let value = resolve(env, key, mode)?;
            match &value {
                Value::Str(s) | Value::Fence(s) => out.push_str(s),
                other => out.push_str(&render_json(other)),
            }
            rest = &stripped[end + 2..];
            continue;
        }
        match rest.chars().next() {
            Some(ch) => {
                out.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
            None => break,
        }
    }
    Ok(out)
}

/// Render a non-string value for interpolation: minified JSON preserving
/// first-insertion map order.
fn render_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}
