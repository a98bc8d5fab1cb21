//! Layout-sensitive lexer for FACET source text
//!
//! The lexer normalizes line endings to LF and produces a flat token stream
//! in which layout is explicit: at each beginning of line the leading spaces
//! are measured against an indentation stack and turned into `Indent` /
//! `Dedent` tokens (two spaces per level, increments of exactly one level,
//! tabs forbidden). Blank lines emit a bare `Newline` and never touch the
//! stack, and at EOF the stack is flushed back to level zero.
//!
//! Fenced blocks (```` ``` ````) suspend layout entirely: the body is
//! captured verbatim into a single `Fence` token. Whether a fence is inline
//! or multiline is decided by lookahead: an opening marker followed by an
//! optional alphanumeric language tag and a newline starts a multiline
//! fence, closed only by a marker alone on its own line; anything else is
//! inline and closes at the next marker.
//!
//! Strings come in two shapes: ordinary double-quoted with `\"`, `\\`,
//! `\n`, `\t` escapes, and triple-quoted raw spanning lines. The scalar
//! shorthand `$name` / `${dotted.path}` is captured as a string that keeps
//! its marker for the later substitution pass. Comments run from `#` to end
//! of line outside strings and fences.

use crate::facet::errors::{FacetError, Pos, Result};
use crate::facet::limits::MAX_FENCE_BYTES;
use crate::facet::token::{TokKind, Token};

/// Tokenize FACET source text into a layout-explicit token stream.
pub fn lex(text: &str) -> Result<Vec<Token>> {
    Lexer::new(text).run()
}

struct Lexer {
    src: Vec<char>,
    i: usize,
    line: usize,
    col: usize,
    tokens: Vec<Token>,
    indent_stack: Vec<usize>,
    bol: bool,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_body(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'
}

impl Lexer {
    fn new(text: &str) -> Self {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        Lexer {
            src: normalized.chars().collect(),
            i: 0,
            line: 1,
            col: 1,
            tokens: Vec::new(),
            indent_stack: vec![0],
            bol: true,
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn peek(&self, n: usize) -> Option<char> {
        self.src.get(self.i + n).copied()
    }

    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            let Some(&ch) = self.src.get(self.i) else {
                return;
            };
            self.i += 1;
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
                self.bol = true;
            } else {
                self.col += 1;
            }
        }
    }

    fn emit(&mut self, kind: TokKind, value: &str, pos: Pos) {
        self.tokens.push(Token::new(kind, value, pos));
    }

    fn emit_here(&mut self, kind: TokKind) {
        let pos = self.pos();
        self.emit(kind, "", pos);
    }

    fn run(mut self) -> Result<Vec<Token>> {
        while self.i < self.src.len() {
            if self.bol {
                self.handle_indent()?;
                if self.bol {
                    // A blank line was consumed; re-measure the next line.
                    continue;
                }
            }
            let Some(ch) = self.peek(0) else { break };
            match ch {
                '#' => {
                    while !matches!(self.peek(0), None | Some('\n')) {
                        self.advance(1);
                    }
                }
                '\t' => {
                    return Err(FacetError::at(
                        "F002",
                        "Tabs are not allowed for indentation or spacing",
                        self.pos(),
                    ));
                }
                ' ' => self.advance(1),
                '\n' => {
                    self.emit_here(TokKind::Newline);
                    self.advance(1);
                }
                '@' => self.punct(TokKind::At),
                '(' => self.punct(TokKind::LParen),
                ')' => self.punct(TokKind::RParen),
                '{' => self.punct(TokKind::LBrace),
                '}' => self.punct(TokKind::RBrace),
                '[' => self.punct(TokKind::LBracket),
                ']' => self.punct(TokKind::RBracket),
                ',' => self.punct(TokKind::Comma),
                ':' => self.punct(TokKind::Colon),
                '&' => self.punct(TokKind::Amp),
                '*' => self.punct(TokKind::Star),
                '=' => self.punct(TokKind::Equal),
                '-' => {
                    // A dash directly followed by a digit is a negative number;
                    // otherwise it introduces a list item.
                    if self.peek(1).is_some_and(|c| c.is_ascii_digit()) && self.number()? {
                        self.bol = false;
                    } else {
                        self.punct(TokKind::Dash);
                    }
                }
                '"' => {
                    self.string()?;
                    self.bol = false;
                }
                '`' if self.peek(1) == Some('`') && self.peek(2) == Some('`') => {
                    self.fence()?;
                    self.bol = false;
                }
                '|' if self.peek(1) == Some('>') => {
                    let pos = self.pos();
                    self.emit(TokKind::Pipe, "|>", pos);
                    self.advance(2);
                    self.bol = false;
                }
                '$' => {
                    self.scalar_var()?;
                    self.bol = false;
                }
                c if c == '+' || c.is_ascii_digit() => {
                    if self.number()? {
                        self.bol = false;
                    } else {
                        return Err(FacetError::at(
                            "F001",
                            format!("Invalid character '{}'", c),
                            self.pos(),
                        ));
                    }
                }
                c if is_ident_start(c) => {
                    self.ident_or_keyword();
                    self.bol = false;
                }
                c => {
                    return Err(FacetError::at(
                        "F001",
                        format!("Invalid character '{}'", c),
                        self.pos(),
                    ));
                }
            }
        }
        // Flush open indentation levels back to zero.
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.emit_here(TokKind::Dedent);
        }
        self.emit_here(TokKind::Eof);
        Ok(self.tokens)
    }

    fn punct(&mut self, kind: TokKind) {
        self.emit_here(kind);
        self.advance(1);
        self.bol = false;
    }

    /// Measure leading spaces at beginning of line and update the stack.
    ///
    /// Blank lines emit a bare `Newline` and leave `bol` set so the caller
    /// re-measures the following line.
    fn handle_indent(&mut self) -> Result<()> {
        let start = self.pos();
        let mut count = 0usize;
        while self.peek(0) == Some(' ') {
            count += 1;
            self.advance(1);
        }
        if self.peek(0) == Some('\t') {
            return Err(FacetError::at(
                "F002",
                "Tabs are not allowed for indentation or spacing",
                self.pos(),
            ));
        }
        self.bol = false;
        if self.peek(0) == Some('\n') {
            self.emit_here(TokKind::Newline);
            self.advance(1);
            return Ok(());
        }
        if count % 2 != 0 {
            return Err(FacetError::at(
                "F002",
                "Indentation must be multiples of 2 spaces",
                start,
            ));
        }
        let level = count / 2;
        let cur = *self.indent_stack.last().unwrap_or(&0);
        if level == cur {
            Ok(())
        } else if level == cur + 1 {
            self.indent_stack.push(level);
            self.emit_here(TokKind::Indent);
            Ok(())
        } else if level < cur {
            while self.indent_stack.last().is_some_and(|&top| top > level) {
                self.indent_stack.pop();
                self.emit_here(TokKind::Dedent);
            }
            if self.indent_stack.last() != Some(&level) {
                return Err(FacetError::at("F002", "Malformed dedent", start));
            }
            Ok(())
        } else {
            Err(FacetError::at(
                "F002",
                "Indentation increased by more than one level",
                start,
            ))
        }
    }

    fn string(&mut self) -> Result<()> {
        let start = self.pos();
        if self.peek(1) == Some('"') && self.peek(2) == Some('"') {
            // Triple-quoted raw string: spans lines, no escape processing.
            self.advance(3);
            let mut buf = String::new();
            loop {
                if self.i >= self.src.len() {
                    return Err(FacetError::at(
                        "F003",
                        "Unterminated triple-quoted string",
                        start,
                    ));
                }
                if self.peek(0) == Some('"')
                    && self.peek(1) == Some('"')
                    && self.peek(2) == Some('"')
                {
                    self.advance(3);
                    break;
                }
                buf.push(self.peek(0).unwrap_or('\0'));
                self.advance(1);
            }
            self.emit(TokKind::Str, &buf, start);
            return Ok(());
        }
        self.advance(1); // opening quote
        let mut buf = String::new();
        loop {
            let Some(ch) = self.peek(0) else {
                return Err(FacetError::at("F003", "Unterminated string", start));
            };
            match ch {
                '"' => {
                    self.advance(1);
                    break;
                }
                '\\' => {
                    self.advance(1);
                    match self.peek(0) {
                        Some('"') => buf.push('"'),
                        Some('\\') => buf.push('\\'),
                        Some('n') => buf.push('\n'),
                        Some('t') => buf.push('\t'),
                        // Unrecognized escapes pass through verbatim so that
                        // sequences like \{{ reach the interpolator intact.
                        Some(other) => {
                            buf.push('\\');
                            buf.push(other);
                        }
                        None => {
                            return Err(FacetError::at("F003", "Unterminated string", start));
                        }
                    }
                    self.advance(1);
                }
                _ => {
                    buf.push(ch);
                    self.advance(1);
                }
            }
        }
        self.emit(TokKind::Str, &buf, start);
        Ok(())
    }

    /// Decide inline vs multiline by lookahead: an optional alphanumeric
    /// language tag followed by whitespace and a newline means multiline.
    fn looks_multiline(&self) -> bool {
        let mut j = self.i;
        while j < self.src.len() && self.src[j].is_ascii_alphanumeric() {
            j += 1;
        }
        while j < self.src.len() && (self.src[j] == ' ' || self.src[j] == '\t') {
            j += 1;
        }
        j < self.src.len() && self.src[j] == '\n'
    }

    fn fence(&mut self) -> Result<()> {
        let start = self.pos();
        self.advance(3); // opening ```
        let multiline = self.looks_multiline();
        if multiline {
            // The language tag is recognized but not carried into the body.
            while self.peek(0).is_some_and(|c| c.is_ascii_alphanumeric()) {
                self.advance(1);
            }
            while matches!(self.peek(0), Some(' ') | Some('\t')) {
                self.advance(1);
            }
            if self.peek(0) == Some('\n') {
                self.advance(1);
            }
        }
        let mut buf = String::new();
        let mut bytes = 0usize;
        loop {
            if self.i >= self.src.len() {
                return Err(FacetError::at("F003", "Unterminated fenced block", start));
            }
            if self.peek(0) == Some('`') && self.peek(1) == Some('`') && self.peek(2) == Some('`') {
                if !multiline {
                    self.advance(3);
                    break;
                }
                // Multiline fences close only on a marker alone on its line
                // (whitespace before the marker is allowed and dropped).
                if buf.is_empty() || buf.ends_with('\n') {
                    self.advance(3);
                    break;
                }
                let tail = buf.rfind('\n').map(|k| &buf[k + 1..]).unwrap_or(&buf);
                if tail.chars().all(|c| c == ' ' || c == '\t') {
                    while buf.ends_with(' ') || buf.ends_with('\t') {
                        buf.pop();
                    }
                    self.advance(3);
                    break;
                }
            }
            let ch = self.peek(0).unwrap_or('\0');
            bytes += ch.len_utf8();
            if bytes > MAX_FENCE_BYTES {
                return Err(FacetError::at(
                    "F999",
                    "Fenced block exceeds MAX_FENCE_BYTES",
                    start,
                ));
            }
            buf.push(ch);
            self.advance(1);
        }
        if multiline && buf.ends_with('\n') {
            buf.pop();
        }
        self.emit(TokKind::Fence, &buf, start);
        Ok(())
    }

    fn scalar_var(&mut self) -> Result<()> {
        let start = self.pos();
        self.advance(1); // consume $
        let mut buf = String::from("$");
        if self.peek(0) == Some('{') {
            buf.push('{');
            self.advance(1);
            while !matches!(self.peek(0), None | Some('}')) {
                buf.push(self.peek(0).unwrap_or('\0'));
                self.advance(1);
            }
            if self.peek(0) != Some('}') {
                return Err(FacetError::at(
                    "F402B",
                    "Unclosed scalar variable ${...}",
                    start,
                ));
            }
            buf.push('}');
            self.advance(1);
        } else {
            if !self.peek(0).is_some_and(is_ident_start) {
                return Err(FacetError::at(
                    "F402",
                    "Undefined scalar variable (bad name)",
                    start,
                ));
            }
            while self.peek(0).is_some_and(is_ident_body) {
                buf.push(self.peek(0).unwrap_or('\0'));
                self.advance(1);
            }
        }
        self.emit(TokKind::Str, &buf, start);
        Ok(())
    }

    /// Try to lex a number at the current position. Returns `Ok(false)`
    /// when the text is not a number (e.g. a bare `+`), leaving the
    /// position untouched.
    fn number(&mut self) -> Result<bool> {
        let start = self.pos();
        let mut j = self.i;
        if matches!(self.src.get(j), Some('+') | Some('-')) {
            j += 1;
        }
        let mut has_digit = false;
        while self.src.get(j).is_some_and(|c| c.is_ascii_digit()) {
            has_digit = true;
            j += 1;
        }
        if self.src.get(j) == Some(&'.') {
            j += 1;
            while self.src.get(j).is_some_and(|c| c.is_ascii_digit()) {
                has_digit = true;
                j += 1;
            }
        }
        if matches!(self.src.get(j), Some('e') | Some('E')) {
            let mut k = j + 1;
            if matches!(self.src.get(k), Some('+') | Some('-')) {
                k += 1;
            }
            let mut exp_digit = false;
            while self.src.get(k).is_some_and(|c| c.is_ascii_digit()) {
                exp_digit = true;
                k += 1;
            }
            if !exp_digit {
                return Ok(false);
            }
            j = k;
        }
        if !has_digit {
            return Ok(false);
        }
        let lexeme: String = self.src[self.i..j].iter().collect();
        self.col += j - self.i;
        self.i = j;
        self.emit(TokKind::Number, &lexeme, start);
        Ok(true)
    }

    fn ident_or_keyword(&mut self) {
        let start = self.pos();
        let mut j = self.i;
        while self.src.get(j).copied().is_some_and(is_ident_body) {
            j += 1;
        }
        let lexeme: String = self.src[self.i..j].iter().collect();
        self.col += j - self.i;
        self.i = j;
        let kind = match lexeme.as_str() {
            "true" | "false" => TokKind::Boolean,
            "null" => TokKind::Null,
            _ => TokKind::Ident,
        };
        self.emit(kind, &lexeme, start);
    }
}
