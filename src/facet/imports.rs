//! `@import` expansion with sandboxed path resolution
//!
//! Every `@import` facet names an external FACET file. Paths must be
//! relative and scheme-free, and after canonicalization must fall under one
//! of the allowed roots. When the caller provides no roots, auto-detection
//! walks up from the current file looking for common project markers and
//! allows that directory plus a small set of conventional subdirectories.
//!
//! Imported files are lexed, parsed, and expanded recursively (depth,
//! total count, and cycles are bounded), then merged into the host facet
//! list by facet name. The default `merge` strategy deep-merges attribute
//! maps last-wins, concatenates list bodies, and merges KV bodies keeping
//! first-appearance order with last-key-wins values; `replace` overwrites
//! the prior facet. A body-shape mismatch falls back to `replace`, unless
//! strict mode turns it into an error. Merging always builds fresh facet
//! lists; bodies are never shared between parents.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::facet::ast::{Entry, Facet};
use crate::facet::errors::{FacetError, Result};
use crate::facet::lexer::lex;
use crate::facet::limits::{MAX_FILE_BYTES, MAX_IMPORTS, MAX_IMPORT_DEPTH};
use crate::facet::parser::parse;
use crate::facet::value::Value;

static URL_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9+.-]*://").unwrap());

const PROJECT_MARKERS: [&str; 8] = [
    "facet.config.json",
    ".git",
    ".gitignore",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "setup.py",
    "requirements.txt",
];

const CONVENTIONAL_DIRS: [&str; 6] = [
    "facets",
    "templates",
    "common",
    "shared",
    "configs",
    "samples",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Merge,
    Replace,
}

/// Expand every `@import` in the facet list, depth-first.
pub fn expand_imports(
    facets: Vec<Facet>,
    roots: &[PathBuf],
    strict_merge: bool,
    current_file: Option<&Path>,
) -> Result<Vec<Facet>> {
    let roots = if roots.is_empty() {
        auto_detect_roots(current_file)
    } else {
        roots.to_vec()
    };
    debug!("import roots: {:?}", roots);
    let base_dir = base_dir_for(current_file);
    let mut ctx = ExpandCtx {
        roots,
        strict: strict_merge,
        stack: Vec::new(),
        count: 0,
    };
    expand_list(facets, &base_dir, &mut ctx)
}

struct ExpandCtx {
    roots: Vec<PathBuf>,
    strict: bool,
    stack: Vec<PathBuf>,
    count: usize,
}

fn base_dir_for(current_file: Option<&Path>) -> PathBuf {
    match current_file {
        Some(path) if path.is_file() => path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn expand_list(facets: Vec<Facet>, base_dir: &Path, ctx: &mut ExpandCtx) -> Result<Vec<Facet>> {
    let mut result = Vec::new();
    for facet in facets {
        if facet.name != "import" {
            result.push(facet);
            continue;
        }
        let Some(Value::Str(path)) = facet.attrs.get("path") else {
            return Err(FacetError::at(
                "F601",
                "@import path missing or invalid",
                facet.pos,
            ));
        };
        if Path::new(path).is_absolute() {
            return Err(FacetError::at(
                "F601",
                "Absolute paths are forbidden in @import",
                facet.pos,
            ));
        }
        if URL_SCHEME.is_match(path) {
            return Err(FacetError::at(
                "F601",
                "Network URLs are forbidden in @import",
                facet.pos,
            ));
        }
        let joined = base_dir.join(path);
        let full = fs::canonicalize(&joined).map_err(|_| {
            FacetError::at("F601", format!("Import not found: {}", path), facet.pos)
        })?;
        if !is_allowed(&full, &ctx.roots) {
            return Err(FacetError::at("F601", "Import path not allowed", facet.pos));
        }
        if ctx.stack.len() >= MAX_IMPORT_DEPTH {
            return Err(FacetError::at("F602", "Import depth exceeded", facet.pos));
        }
        ctx.count += 1;
        if ctx.count > MAX_IMPORTS {
            return Err(FacetError::at("F602", "Import count exceeded", facet.pos));
        }
        if ctx.stack.contains(&full) {
            return Err(FacetError::at("F602", "Import cycle detected", facet.pos));
        }
        let size = fs::metadata(&full).map(|m| m.len()).unwrap_or(0);
        if size > MAX_FILE_BYTES {
            return Err(FacetError::at(
                "F998",
                format!("Imported file exceeds {} bytes", MAX_FILE_BYTES),
                facet.pos,
            ));
        }
        debug!("importing {}", full.display());
        let text = fs::read_to_string(&full).map_err(|e| {
            FacetError::at(
                "F601",
                format!("Failed to read import '{}': {}", path, e),
                facet.pos,
            )
        })?;
        let sub = parse(lex(&text)?)?;
        ctx.stack.push(full.clone());
        let sub_base = full
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| base_dir.to_path_buf());
        let sub = expand_list(sub, &sub_base, ctx)?;
        ctx.stack.pop();
        let strategy = match facet.attrs.get("strategy") {
            Some(Value::Str(s)) if s == "replace" => Strategy::Replace,
            _ => Strategy::Merge,
        };
        result = merge_facets(result, sub, strategy, ctx.strict)?;
    }
    Ok(result)
}

fn is_allowed(path: &Path, roots: &[PathBuf]) -> bool {
    roots.iter().any(|root| {
        fs::canonicalize(root)
            .map(|canon| path.starts_with(&canon))
            .unwrap_or(false)
    })
}

/// Walk up from the starting directory looking for a project root, then
/// allow it and its conventional subdirectories.
fn auto_detect_roots(current_file: Option<&Path>) -> Vec<PathBuf> {
    let start = base_dir_for(current_file);
    let mut detected = Vec::new();
    let mut search = start.clone();
    for _ in 0..5 {
        let is_root = PROJECT_MARKERS
            .iter()
            .any(|marker| search.join(marker).exists());
        if is_root {
            if search.is_dir() {
                detected.push(search.clone());
            }
            for dir in CONVENTIONAL_DIRS {
                let candidate = search.join(dir);
                if candidate.is_dir() {
                    detected.push(candidate);
                }
            }
            break;
        }
        match search.parent() {
            Some(parent) if parent != search => search = parent.to_path_buf(),
            _ => break,
        }
    }
    if detected.is_empty() {
        detected.push(start);
    }
    detected
}

/// Merge an expanded import into the host list by facet name.
fn merge_facets(
    dst: Vec<Facet>,
    src: Vec<Facet>,
    strategy: Strategy,
    strict: bool,
) -> Result<Vec<Facet>> {
    let mut out = dst;
    for facet in src {
        let existing = out.iter().position(|f| f.name == facet.name);
        match existing {
            None => out.push(facet),
            Some(idx) if strategy == Strategy::Replace => out[idx] = facet,
            Some(idx) => {
                let merged = merge_one(&out[idx], facet, strict)?;
                out[idx] = merged;
            }
        }
    }
    Ok(out)
}

fn merge_one(host: &Facet, incoming: Facet, strict: bool) -> Result<Facet> {
    let host_kv = host.body.iter().all(|e| matches!(e, Entry::Kv(_)));
    let inc_kv = incoming.body.iter().all(|e| matches!(e, Entry::Kv(_)));
    let host_items = host.body.iter().all(|e| matches!(e, Entry::Item(_)));
    let inc_items = incoming.body.iter().all(|e| matches!(e, Entry::Item(_)));

    if !(host_kv && inc_kv) && !(host_items && inc_items) {
        if strict {
            return Err(FacetError::new(
                "F606",
                "Import merge type mismatch in strict mode",
            ));
        }
        return Ok(incoming);
    }

    let mut merged = host.clone();
    for (k, v) in incoming.attrs {
        merged.attrs.insert(k, v);
    }
    if host_kv && inc_kv {
        // First-appearance order, last key wins.
        let mut seen: IndexMap<String, Entry> = IndexMap::new();
        for entry in host.body.iter().cloned().chain(incoming.body) {
            if let Entry::Kv(kv) = &entry {
                seen.insert(kv.key.clone(), entry);
            }
        }
        merged.body = seen.into_values().collect();
    } else {
        merged.body = host.body.iter().cloned().chain(incoming.body).collect();
    }
    Ok(merged)
}
