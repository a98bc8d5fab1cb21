//! The compile entry point
//!
//! `compile` runs the full pipeline on one source text: lex, parse, expand
//! imports, split and resolve the compile-time environment, validate
//! declared variable types, evaluate, and resolve anchors. The result is
//! the canonical tree, or the first error, with its position, from
//! whichever stage failed.
//!
//! A compilation is a pure function of (source text, options, file-system
//! view, host variables); it owns all of its state and shares nothing.

use std::path::PathBuf;

use indexmap::IndexMap;
use log::debug;

use crate::facet::anchors::resolve_anchors;
use crate::facet::errors::Result;
use crate::facet::eval::evaluate;
use crate::facet::imports::expand_imports;
use crate::facet::lexer::lex;
use crate::facet::parser::parse;
use crate::facet::value::Value;
use crate::facet::vars::{merged_env, split_compile_time, validate_var_types};

/// Which variables are visible to evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// Only host-provided variables are in scope.
    #[default]
    Host,
    /// Compile-time and host variables merged; host wins on conflict.
    All,
}

impl std::str::FromStr for ResolveMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "host" => Ok(ResolveMode::Host),
            "all" => Ok(ResolveMode::All),
            other => Err(format!("unknown resolve mode '{}'", other)),
        }
    }
}

/// Caller-side knobs for a compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Host-provided variables, visible in every resolve mode.
    pub host_vars: IndexMap<String, Value>,
    pub resolve_mode: ResolveMode,
    /// Allowed import roots; empty means auto-detection.
    pub import_roots: Vec<PathBuf>,
    /// Treat import body-shape mismatches as errors.
    pub strict_merge: bool,
    /// Anchors relative imports and root auto-detection.
    pub current_file: Option<PathBuf>,
}

/// Compile FACET source text into the canonical tree.
pub fn compile(text: &str, opts: &CompileOptions) -> Result<Value> {
    let tokens = lex(text)?;
    let facets = parse(tokens)?;
    let facets = expand_imports(
        facets,
        &opts.import_roots,
        opts.strict_merge,
        opts.current_file.as_deref(),
    )?;
    let compile_time = split_compile_time(facets)?;
    if !compile_time.type_specs.is_empty() {
        validate_var_types(&compile_time.vars, &compile_time.type_specs)?;
    }
    let env = merged_env(
        opts.resolve_mode == ResolveMode::All,
        &compile_time.vars,
        &opts.host_vars,
    );
    debug!(
        "evaluating {} facets against {} environment entries",
        compile_time.facets.len(),
        env.len()
    );
    let tree = evaluate(&compile_time.facets, &env)?;
    resolve_anchors(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_all(src: &str) -> Result<Value> {
        let opts = CompileOptions {
            resolve_mode: ResolveMode::All,
            ..Default::default()
        };
        compile(src, &opts)
    }

    fn to_json(v: &Value) -> String {
        serde_json::to_string(v).unwrap()
    }

    #[test]
    fn test_full_pipeline_interpolation() {
        let out = compile_all(
            "@vars\n  name: \"Alex\"\n  n: 3\n@user\n  prompt: \"Hello, {{name}} x{{n}}\"\n",
        )
        .unwrap();
        assert_eq!(to_json(&out), r#"{"user":{"prompt":"Hello, Alex x3"}}"#);
    }

    #[test]
    fn test_host_mode_hides_compile_vars() {
        let err = compile(
            "@vars\n  name: \"Alex\"\n@user\n  prompt: \"{{name}}\"\n",
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "F402A");
    }

    #[test]
    fn test_host_overrides_compile_vars() {
        let mut opts = CompileOptions {
            resolve_mode: ResolveMode::All,
            ..Default::default()
        };
        opts.host_vars
            .insert("name".to_string(), Value::Str("Host".into()));
        let out = compile(
            "@vars\n  name: \"Compile\"\n@user\n  prompt: \"{{name}}\"\n",
            &opts,
        )
        .unwrap();
        assert_eq!(to_json(&out), r#"{"user":{"prompt":"Host"}}"#);
    }

    #[test]
    fn test_type_gating_stops_compilation() {
        let err = compile_all(
            "@vars\n  n: 9\n@var_types\n  n: { type: \"int\", max: 5 }\n@user\n  x: \"{{ghost}}\"\n",
        )
        .unwrap_err();
        // The constraint violation fires before the undefined-variable error
        // that evaluation would raise.
        assert_eq!(err.code(), "F452");
    }

    #[test]
    fn test_anchor_round_trip_through_pipeline() {
        let out = compile_all(
            "@examples\n  templates:\n    - &tpl { name: \"demo\", value: 42 }\n    - *tpl\n  referenced: *tpl\n",
        )
        .unwrap();
        let Value::Map(root) = &out else { panic!() };
        let Value::Map(examples) = &root["examples"] else {
            panic!()
        };
        let Value::List(templates) = &examples["templates"] else {
            panic!()
        };
        assert_eq!(templates[0], templates[1]);
        assert_eq!(templates[0], examples["referenced"]);
        assert!(!to_json(&out).contains("\"&\""));
        assert!(!to_json(&out).contains("\"*\""));
    }

    #[test]
    fn test_deterministic_choose_in_vars() {
        let src = "@vars\n  xs: [\"a\", \"b\", \"c\"]\n  pick: $xs |> choose(seed=42)\n@out\n  greeting: \"{{pick}}\"\n";
        let a = compile_all(src).unwrap();
        let b = compile_all(src).unwrap();
        assert_eq!(to_json(&a), to_json(&b));
    }

    #[test]
    fn test_resolve_mode_parsing() {
        assert_eq!("host".parse::<ResolveMode>().unwrap(), ResolveMode::Host);
        assert_eq!("all".parse::<ResolveMode>().unwrap(), ResolveMode::All);
        assert!("both".parse::<ResolveMode>().is_err());
    }
}
