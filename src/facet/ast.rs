//! The facet tree produced by the parser
//!
//! A document is a sequence of facets. Facet bodies are ordered entries:
//! key/value pairs or list items. A key without an inline value owns a
//! nested block, collapsed at parse time into either a sequence of list
//! items or a map of further key/value pairs. The two shapes stay typed
//! (`BodyValue`) so that per-item conditions and per-key lens pipelines
//! survive until evaluation.

use indexmap::IndexMap;

use crate::facet::errors::Pos;
use crate::facet::value::Value;

/// A single lens invocation in a `|>` pipeline. Arguments are literals only.
#[derive(Debug, Clone, PartialEq)]
pub struct LensCall {
    pub name: String,
    pub args: Vec<Value>,
    pub kwargs: IndexMap<String, Value>,
    pub pos: Pos,
}

/// The right-hand side of a key: an inline value or a collapsed block.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyValue {
    Scalar(Value),
    /// A block whose members were all list items.
    Seq(Vec<ListItem>),
    /// A block whose members were all key/value pairs.
    Map(Vec<Kv>),
}

/// A key/value entry with an optional lens pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Kv {
    pub key: String,
    pub value: BodyValue,
    pub lenses: Vec<LensCall>,
    pub pos: Pos,
}

/// A `- value` list entry with optional `(if="…")` gating and lenses.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub value: Value,
    pub condition: Option<String>,
    pub lenses: Vec<LensCall>,
    pub pos: Pos,
}

/// A member of a facet body.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Kv(Kv),
    Item(ListItem),
}

/// A top-level named section: `@name &anchor (attrs)` followed by a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Facet {
    pub name: String,
    /// Header anchor (`@name &id …`); not part of the attribute map.
    pub anchor: Option<String>,
    pub attrs: IndexMap<String, Value>,
    pub body: Vec<Entry>,
    pub pos: Pos,
}

impl Facet {
    pub fn new(name: impl Into<String>, pos: Pos) -> Self {
        Facet {
            name: name.into(),
            anchor: None,
            attrs: IndexMap::new(),
            body: Vec::new(),
            pos,
        }
    }
}
