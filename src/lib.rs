//! # facet
//!
//!     A compiler for the FACET document language: human-authored structured
//!     prompts and configuration that compile to a canonical, language-neutral
//!     tree suitable for JSON serialization.
//!
//! Overview
//!
//!     A FACET source is a sequence of named facets, each carrying attributes
//!     and a body of key/value pairs, list items, nested blocks, fenced
//!     literals, and scalars. Compilation takes the source together with
//!     host-provided variables and produces ordered maps, sequences, strings,
//!     numbers, booleans, and null. Compilation is deterministic: the same inputs give
//!     byte-identical output on every run and host.
//!
//! Pipeline Architecture
//!
//!     The compiler is a staged, non-concurrent pipeline that breaks the
//!     problem into simple chunks:
//!
//!     1. **Lexing** - layout-sensitive tokenization with indent/dedent and
//!        fenced-literal capture
//!     2. **Parsing** - a typed facet tree
//!     3. **Import expansion** - sandboxed `@import` with deterministic merges
//!     4. **Compile-time environment** - `@vars` resolution, `@var_types` checks
//!     5. **Evaluation** - conditional gating, substitution, interpolation,
//!        and lens pipelines
//!     6. **Anchor resolution** - alias substitution with cycle detection
//!
//! Getting Started
//!
//!     - For the end-to-end entry point, see [facet::canon]
//!     - For the value model and canonical encoding, see [facet::value]
//!     - For the error code families, see [facet::errors]
//!
//! ```no_run
//! use facet::{compile, CompileOptions};
//!
//! let tree = compile("@user\n  prompt: \"hi\"\n", &CompileOptions::default())?;
//! println!("{}", serde_json::to_string_pretty(&tree)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![allow(rustdoc::invalid_html_tags)]

pub mod facet;

pub use crate::facet::{compile, CompileOptions, FacetError, Pos, ResolveMode, Value};
