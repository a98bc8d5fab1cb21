//! Resource limits enforced inline by the pipeline
//!
//! All limits are compile-time constants. Exceeding one raises the coded
//! error noted next to each constant.

/// Maximum byte size of a single fenced block body (`F999`).
pub const MAX_FENCE_BYTES: usize = 256 * 1024;

/// Maximum number of lenses in a single `|>` chain (`F803`).
pub const MAX_LENS_CHAIN: usize = 16;

/// Maximum depth of the import graph (`F602`).
pub const MAX_IMPORT_DEPTH: usize = 8;

/// Maximum number of `@import` expansions per compilation (`F602`).
pub const MAX_IMPORTS: usize = 64;

/// Maximum byte size of a source file, imported or top-level (`F998`).
pub const MAX_FILE_BYTES: u64 = 1024 * 1024;
