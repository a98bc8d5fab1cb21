//! Property tests over the compilation pipeline
//!
//! Random inputs pin the universal invariants: indentation discipline,
//! run-to-run determinism, marker-free output, and the seeded lenses'
//! element/permutation guarantees.

use facet::facet::ast::LensCall;
use facet::facet::errors::Pos;
use facet::facet::lenses::apply_pipeline;
use facet::{compile, CompileOptions, ResolveMode, Value};
use proptest::prelude::*;

fn compile_all(src: &str) -> Result<Value, facet::FacetError> {
    let opts = CompileOptions {
        resolve_mode: ResolveMode::All,
        ..Default::default()
    };
    compile(src, &opts)
}

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}"
}

fn text_value() -> impl Strategy<Value = String> {
    // Printable text without quotes, backslashes, or template markers.
    "[ a-zA-Z0-9_.,:;!?-]{0,24}"
}

proptest! {
    #[test]
    fn odd_indentation_is_rejected(spaces in (1usize..10).prop_map(|n| n * 2 - 1)) {
        let src = format!("@user\n{}x: 1\n", " ".repeat(spaces));
        let err = compile_all(&src).unwrap_err();
        prop_assert_eq!(err.code(), "F002");
    }

    #[test]
    fn indent_jumps_are_rejected(levels in 2usize..6) {
        let src = format!("@user\n{}x: 1\n", "  ".repeat(levels));
        let err = compile_all(&src).unwrap_err();
        prop_assert_eq!(err.code(), "F002");
    }

    #[test]
    fn compilation_is_deterministic(
        key in ident(),
        name in ident(),
        text in text_value(),
        n in -1000i64..1000,
    ) {
        let src = format!(
            "@vars\n  {key}: \"{text}\"\n  count: {n}\n@sec_{name}\n  echo: \"{{{{{key}}}}} {{{{count}}}}\"\n",
        );
        let a = compile_all(&src).unwrap();
        let b = compile_all(&src).unwrap();
        prop_assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn anchored_documents_never_leak_markers(
        name in ident(),
        text in text_value(),
    ) {
        let src = format!(
            "@data\n  first: &{name} {{ v: \"{text}\" }}\n  second: *{name}\n"
        );
        let out = compile_all(&src).unwrap();
        let rendered = serde_json::to_string(&out).unwrap();
        prop_assert!(!rendered.contains("\"&\""));
        prop_assert!(!rendered.contains("\"*\""));
    }

    #[test]
    fn choose_returns_an_element(
        xs in prop::collection::vec(text_value(), 1..8),
        seed in any::<i64>(),
    ) {
        let list = Value::List(xs.iter().cloned().map(Value::Str).collect());
        let mut call = LensCall {
            name: "choose".to_string(),
            args: Vec::new(),
            kwargs: Default::default(),
            pos: Pos::new(1, 1),
        };
        call.kwargs.insert("seed".to_string(), Value::Int(seed));
        let out = apply_pipeline(list, &[call]).unwrap();
        match out {
            Value::Str(s) => prop_assert!(xs.contains(&s)),
            other => prop_assert!(false, "expected string, got {:?}", other),
        }
    }

    #[test]
    fn shuffle_is_a_stable_permutation(
        xs in prop::collection::vec(-100i64..100, 0..10),
        seed in any::<i64>(),
    ) {
        let list = Value::List(xs.iter().copied().map(Value::Int).collect());
        let mut call = LensCall {
            name: "shuffle".to_string(),
            args: Vec::new(),
            kwargs: Default::default(),
            pos: Pos::new(1, 1),
        };
        call.kwargs.insert("seed".to_string(), Value::Int(seed));
        let a = apply_pipeline(list.clone(), &[call.clone()]).unwrap();
        let b = apply_pipeline(list, &[call]).unwrap();
        prop_assert_eq!(&a, &b);
        let Value::List(shuffled) = a else {
            panic!("expected list");
        };
        let mut got: Vec<i64> = shuffled
            .iter()
            .filter_map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        got.sort_unstable();
        let mut want = xs.clone();
        want.sort_unstable();
        prop_assert_eq!(got, want);
    }

    #[test]
    fn lenses_are_pure(text in text_value()) {
        let call = LensCall {
            name: "upper".to_string(),
            args: Vec::new(),
            kwargs: Default::default(),
            pos: Pos::new(1, 1),
        };
        let a = apply_pipeline(Value::Str(text.clone()), &[call.clone()]).unwrap();
        let b = apply_pipeline(Value::Str(text), &[call]).unwrap();
        prop_assert_eq!(a, b);
    }
}
