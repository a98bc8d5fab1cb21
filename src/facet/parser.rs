//! Recursive-descent parser: token stream to facet tree
//!
//! The grammar is line-oriented and the lexer has already made layout
//! explicit, so the parser is a plain single-pass descent with one token of
//! lookahead. Facet bodies come in two placements: an indented block
//! (`Indent entry+ Dedent`) or a same-level run of entries terminated by
//! the next facet header or end of input.
//!
//! A key with no inline value owns the indented block that follows; the
//! block is collapsed into a sequence (all list items) or a map (all
//! key/value pairs). Mixing the two shapes in one block is an error.
//!
//! Attribute values are literals only. A value that would interpolate
//! (`{{…}}`, or a `$` / `${` marker) is rejected outright; attributes
//! never change between parse and output.

use indexmap::IndexMap;

use crate::facet::ast::{BodyValue, Entry, Facet, Kv, LensCall, ListItem};
use crate::facet::errors::{FacetError, Pos, Result};
use crate::facet::token::{TokKind, Token};
use crate::facet::value::Value;

/// Parse a token stream into a list of facets.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Facet>> {
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    Parser { toks: tokens, i: 0 }.parse_document()
}

struct Parser {
    toks: Vec<Token>,
    i: usize,
}

impl Parser {
    fn cur(&self) -> &Token {
        // The stream always ends with Eof, so the last token is a fixpoint.
        &self.toks[self.i.min(self.toks.len() - 1)]
    }

    fn peek_kind(&self, n: usize) -> TokKind {
        self.toks
            .get(self.i + n)
            .map(|t| t.kind)
            .unwrap_or(TokKind::Eof)
    }

    fn bump(&mut self) -> Token {
        let tok = self.cur().clone();
        if self.i < self.toks.len() {
            self.i += 1;
        }
        tok
    }

    fn accept(&mut self, kind: TokKind) -> Option<Token> {
        if self.cur().kind == kind {
            Some(self.bump())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokKind, msg: &str) -> Result<Token> {
        if self.cur().kind != kind {
            let message = if msg.is_empty() {
                format!(
                    "Expected {}, got {}",
                    kind.name(),
                    self.cur().kind.name()
                )
            } else {
                msg.to_string()
            };
            return Err(FacetError::at("F001", message, self.cur().pos));
        }
        Ok(self.bump())
    }

    fn parse_document(&mut self) -> Result<Vec<Facet>> {
        let mut facets = Vec::new();
        while self.cur().kind != TokKind::Eof {
            if self.accept(TokKind::Newline).is_some() || self.accept(TokKind::Dedent).is_some() {
                continue;
            }
            if self.accept(TokKind::At).is_some() {
                facets.push(self.parse_facet()?);
                continue;
            }
            return Err(FacetError::at(
                "F001",
                "Expected '@' to start a facet",
                self.cur().pos,
            ));
        }
        Ok(facets)
    }

    fn parse_facet(&mut self) -> Result<Facet> {
        let name_tok = self.expect(TokKind::Ident, "Facet name expected")?;
        let mut facet = Facet::new(name_tok.value.clone(), name_tok.pos);

        // @import is a directive: attributes or a path shorthand, no body.
        if name_tok.value == "import" {
            if self.accept(TokKind::LParen).is_some() {
                facet.attrs = self.parse_attrs()?;
                self.expect(TokKind::RParen, ") expected after attributes")?;
            } else if self.cur().kind == TokKind::Str {
                let path_tok = self.bump();
                facet.attrs.insert("path".to_string(), Value::Str(path_tok.value));
            }
            self.expect(TokKind::Newline, "Newline required after @import")?;
            return Ok(facet);
        }

        if self.accept(TokKind::Amp).is_some() {
            let anchor_tok = self.expect(TokKind::Ident, "Anchor name expected after '&'")?;
            facet.anchor = Some(anchor_tok.value);
        }
        if self.accept(TokKind::LParen).is_some() {
            facet.attrs = self.parse_attrs()?;
            self.expect(TokKind::RParen, ") expected after attributes")?;
        }
        self.expect(TokKind::Newline, "Newline required after facet header")?;

        facet.body = match self.cur().kind {
            TokKind::Indent => {
                self.bump();
                self.parse_block()?
            }
            // Same-level body, possibly empty; ends at the next facet or EOF.
            TokKind::Ident
            | TokKind::Dash
            | TokKind::Newline
            | TokKind::Dedent
            | TokKind::At
            | TokKind::Eof => self.parse_block_same_level()?,
            _ => {
                return Err(FacetError::at(
                    "F001",
                    "Expected indented block or content after facet header",
                    self.cur().pos,
                ));
            }
        };
        Ok(facet)
    }

    /// Parse entries inside an `Indent … Dedent` block.
    fn parse_block(&mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        loop {
            if self.accept(TokKind::Dedent).is_some() {
                break;
            }
            if self.accept(TokKind::Newline).is_some() {
                if matches!(self.cur().kind, TokKind::At | TokKind::Eof) {
                    break;
                }
                continue;
            }
            if let Some(dash) = self.accept(TokKind::Dash) {
                entries.push(Entry::Item(self.parse_list_item(dash.pos)?));
                continue;
            }
            entries.push(Entry::Kv(self.parse_kv()?));
        }
        Ok(entries)
    }

    /// Parse entries at the facet's own indentation level. Ends at the next
    /// facet header or EOF; stray dedents from earlier blocks are skipped.
    fn parse_block_same_level(&mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        loop {
            match self.cur().kind {
                TokKind::At | TokKind::Eof => break,
                TokKind::Dedent | TokKind::Newline => {
                    self.bump();
                    continue;
                }
                TokKind::Dash => {
                    let dash = self.bump();
                    entries.push(Entry::Item(self.parse_list_item(dash.pos)?));
                }
                _ => entries.push(Entry::Kv(self.parse_kv()?)),
            }
        }
        Ok(entries)
    }

    fn parse_list_item(&mut self, pos: Pos) -> Result<ListItem> {
        let value = self.parse_value()?;
        let mut condition = None;
        if self.accept(TokKind::LParen).is_some() {
            let ident = self.expect(
                TokKind::Ident,
                "Only 'if' attribute is allowed on list items",
            )?;
            if ident.value != "if" {
                return Err(FacetError::at(
                    "F305",
                    "Unsupported list-item attribute (only 'if' allowed)",
                    ident.pos,
                ));
            }
            self.expect(TokKind::Equal, "'=' expected after 'if'")?;
            let expr_tok = match self.cur().kind {
                TokKind::Str => self.bump(),
                TokKind::Boolean | TokKind::Number | TokKind::Null => {
                    return Err(FacetError::at(
                        "F704",
                        "If expression must be quoted",
                        self.cur().pos,
                    ));
                }
                _ => {
                    return Err(FacetError::at(
                        "F001",
                        "Quoted expression required in (if=\"...\")",
                        self.cur().pos,
                    ));
                }
            };
            self.expect(TokKind::RParen, ") expected after list-item if")?;
            condition = Some(expr_tok.value);
        }
        let lenses = self.parse_lenses()?;
        if !matches!(
            self.cur().kind,
            TokKind::Eof | TokKind::Dedent | TokKind::At
        ) {
            self.expect(TokKind::Newline, "Expected newline after list item")?;
        }
        Ok(ListItem {
            value,
            condition,
            lenses,
            pos,
        })
    }

    fn parse_kv(&mut self) -> Result<Kv> {
        let key_tok = self.expect(TokKind::Ident, "Key expected")?;
        self.expect(TokKind::Colon, ": expected after key")?;

        // A key with no inline value owns the indented block that follows.
        if self.accept(TokKind::Newline).is_some() {
            if self.cur().kind != TokKind::Indent {
                return Err(FacetError::at(
                    "F001",
                    "Expected indented content after key:",
                    self.cur().pos,
                ));
            }
            self.bump();
            if self.cur().kind == TokKind::Fence {
                // An indented fence is the key's whole value.
                let fence = self.bump();
                let lenses = self.parse_lenses()?;
                self.accept(TokKind::Newline);
                self.accept(TokKind::Dedent);
                return Ok(Kv {
                    key: key_tok.value,
                    value: BodyValue::Scalar(Value::Fence(fence.value)),
                    lenses,
                    pos: key_tok.pos,
                });
            }
            let nested = self.parse_block()?;
            return Ok(Kv {
                key: key_tok.value,
                value: collapse_block(nested)?,
                lenses: Vec::new(),
                pos: key_tok.pos,
            });
        }

        let value = self.parse_value()?;
        let lenses = self.parse_lenses()?;
        if !matches!(
            self.cur().kind,
            TokKind::Eof | TokKind::Dedent | TokKind::At
        ) {
            self.expect(TokKind::Newline, "Expected newline after value")?;
        }
        Ok(Kv {
            key: key_tok.value,
            value: BodyValue::Scalar(value),
            lenses,
            pos: key_tok.pos,
        })
    }

    fn parse_attrs(&mut self) -> Result<IndexMap<String, Value>> {
        let mut attrs = IndexMap::new();
        let mut first = true;
        while self.cur().kind != TokKind::RParen {
            if !first {
                self.expect(TokKind::Comma, "Comma expected in attributes")?;
            }
            first = false;
            let key = self.expect(TokKind::Ident, "Attribute name expected")?;
            self.expect(TokKind::Equal, "'=' expected after attribute name")?;
            let value = self.parse_attr_value()?;
            if let Value::Str(s) = &value {
                if s.contains("{{") || s.starts_with('$') {
                    return Err(FacetError::at(
                        "F304",
                        "Attribute interpolation prohibited",
                        key.pos,
                    ));
                }
            }
            if attrs.contains_key(&key.value) {
                return Err(FacetError::at(
                    "F301",
                    format!("Duplicate attribute '{}'", key.value),
                    key.pos,
                ));
            }
            attrs.insert(key.value, value);
        }
        Ok(attrs)
    }

    fn parse_attr_value(&mut self) -> Result<Value> {
        let tok = self.cur().clone();
        match tok.kind {
            TokKind::Str | TokKind::Ident => {
                self.bump();
                Ok(Value::Str(tok.value))
            }
            TokKind::Number => {
                self.bump();
                parse_number(&tok.value, tok.pos)
            }
            TokKind::Boolean => {
                self.bump();
                Ok(Value::Bool(tok.value == "true"))
            }
            TokKind::Null => {
                self.bump();
                Ok(Value::Null)
            }
            _ => Err(FacetError::at(
                "F301",
                "Malformed attribute value",
                tok.pos,
            )),
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        let tok = self.cur().clone();
        match tok.kind {
            TokKind::Amp => {
                self.bump();
                let name_tok = self.expect(TokKind::Ident, "Anchor name expected after '&'")?;
                let value = self.parse_value()?;
                Ok(Value::Anchor {
                    name: name_tok.value,
                    value: Box::new(value),
                })
            }
            TokKind::Star => {
                self.bump();
                let name_tok = self.expect(TokKind::Ident, "Alias name expected after '*'")?;
                Ok(Value::Alias(name_tok.value))
            }
            TokKind::Str | TokKind::Ident => {
                self.bump();
                Ok(Value::Str(tok.value))
            }
            TokKind::Number => {
                self.bump();
                parse_number(&tok.value, tok.pos)
            }
            TokKind::Boolean => {
                self.bump();
                Ok(Value::Bool(tok.value == "true"))
            }
            TokKind::Null => {
                self.bump();
                Ok(Value::Null)
            }
            TokKind::LBrace => self.parse_inline_map(),
            TokKind::LBracket => self.parse_inline_list(),
            TokKind::Fence => {
                self.bump();
                Ok(Value::Fence(tok.value))
            }
            _ => Err(FacetError::at(
                "F101",
                format!("Unexpected token {} in value", tok.kind.name()),
                tok.pos,
            )),
        }
    }

    fn parse_inline_map(&mut self) -> Result<Value> {
        self.expect(TokKind::LBrace, "{ expected for inline map")?;
        let mut map = IndexMap::new();
        let mut first = true;
        while self.accept(TokKind::RBrace).is_none() {
            if !first {
                self.expect(TokKind::Comma, ", expected in inline map")?;
            }
            first = false;
            let key = self.expect(TokKind::Ident, "Key expected in inline map")?;
            self.expect(TokKind::Colon, ": expected after key in inline map")?;
            let value = self.parse_value()?;
            if map.contains_key(&key.value) {
                return Err(FacetError::at(
                    "F101",
                    format!("Duplicate key '{}' in inline map", key.value),
                    key.pos,
                ));
            }
            map.insert(key.value, value);
        }
        Ok(Value::Map(map))
    }

    fn parse_inline_list(&mut self) -> Result<Value> {
        self.expect(TokKind::LBracket, "[ expected for inline list")?;
        let mut items = Vec::new();
        let mut first = true;
        while self.accept(TokKind::RBracket).is_none() {
            if !first {
                self.expect(TokKind::Comma, ", expected in inline list")?;
            }
            first = false;
            items.push(self.parse_value()?);
        }
        Ok(Value::List(items))
    }

    fn parse_lenses(&mut self) -> Result<Vec<LensCall>> {
        let mut calls = Vec::new();
        while self.accept(TokKind::Pipe).is_some() {
            let name_tok = self.expect(TokKind::Ident, "Lens name expected after '|>'")?;
            let mut call = LensCall {
                name: name_tok.value,
                args: Vec::new(),
                kwargs: IndexMap::new(),
                pos: name_tok.pos,
            };
            if self.accept(TokKind::LParen).is_some() {
                let mut first = true;
                while self.accept(TokKind::RParen).is_none() {
                    if !first {
                        self.expect(TokKind::Comma, ", expected in lens args")?;
                    }
                    first = false;
                    let tok = self.cur().clone();
                    if tok.kind == TokKind::Ident && self.peek_kind(1) == TokKind::Equal {
                        self.bump();
                        self.bump();
                        let vtok = self.cur().clone();
                        let value = match vtok.kind {
                            TokKind::Str => Value::Str(vtok.value.clone()),
                            TokKind::Number => parse_number(&vtok.value, vtok.pos)?,
                            TokKind::Boolean => Value::Bool(vtok.value == "true"),
                            TokKind::Null => Value::Null,
                            _ => {
                                return Err(FacetError::at(
                                    "F101",
                                    "Invalid lens kwarg value",
                                    vtok.pos,
                                ));
                            }
                        };
                        self.bump();
                        call.kwargs.insert(tok.value, value);
                    } else {
                        let value = match tok.kind {
                            TokKind::Str | TokKind::Ident => Value::Str(tok.value.clone()),
                            TokKind::Number => parse_number(&tok.value, tok.pos)?,
                            TokKind::Boolean => Value::Bool(tok.value == "true"),
                            TokKind::Null => Value::Null,
                            _ => {
                                return Err(FacetError::at(
                                    "F101",
                                    "Invalid lens argument",
                                    tok.pos,
                                ));
                            }
                        };
                        self.bump();
                        call.args.push(value);
                    }
                }
            }
            calls.push(call);
        }
        Ok(calls)
    }
}

/// Collapse a nested block into the value shape for its key: a sequence if
/// every member is a list item, a map if every member is a key/value pair.
fn collapse_block(entries: Vec<Entry>) -> Result<BodyValue> {
    if entries.is_empty() {
        return Ok(BodyValue::Map(Vec::new()));
    }
    if entries.iter().all(|e| matches!(e, Entry::Item(_))) {
        return Ok(BodyValue::Seq(
            entries
                .into_iter()
                .filter_map(|e| match e {
                    Entry::Item(item) => Some(item),
                    Entry::Kv(_) => None,
                })
                .collect(),
        ));
    }
    if entries.iter().all(|e| matches!(e, Entry::Kv(_))) {
        return Ok(BodyValue::Map(
            entries
                .into_iter()
                .filter_map(|e| match e {
                    Entry::Kv(kv) => Some(kv),
                    Entry::Item(_) => None,
                })
                .collect(),
        ));
    }
    Err(FacetError::new(
        "F101",
        "Mixed list and map items in the same block are not allowed",
    ))
}

/// Parse a numeric lexeme into an `Int` or `Float`. Lexemes containing
/// `.`, `e`, or `E` become floats; NaN and infinities are rejected.
pub(crate) fn parse_number(s: &str, pos: Pos) -> Result<Value> {
    if s.contains(['.', 'e', 'E']) {
        let x: f64 = s
            .parse()
            .map_err(|_| FacetError::at("F101", format!("Invalid number '{}'", s), pos))?;
        if !x.is_finite() {
            return Err(FacetError::at("F101", "NaN/Infinity not allowed", pos));
        }
        Ok(Value::Float(x))
    } else {
        let n: i64 = s
            .parse()
            .map_err(|_| FacetError::at("F101", format!("Invalid number '{}'", s), pos))?;
        Ok(Value::Int(n))
    }
}
