//! The quoted `if="…"` expression sub-language
//!
//! A small boolean language evaluated against the environment:
//!
//! ```text
//! or      := and ( 'or' and )*
//! and     := cmp ( 'and' cmp )*
//! cmp     := primary (( '==' | '!=' | '<' | '<=' | '>' | '>=' | 'in' ) primary)?
//! primary := 'not' primary | '(' or ')' | literal | dotted_name
//! ```
//!
//! The grammar is regular at the token level, so tokenization is a logos
//! lexer; evaluation is a direct recursive descent. Ordering comparisons
//! require numbers on both sides, `in` requires a sequence or string on the
//! right, and a bare primary is judged by Python-like truthiness. Unknown
//! dotted names are errors, as are trailing tokens and unbalanced parens.

use indexmap::IndexMap;
use logos::Logos;

use crate::facet::errors::{FacetError, Result};
use crate::facet::value::{get_path, value_eq, Value};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum ExprToken {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("in")]
    In,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[regex(r"[+-]?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().to_owned())]
    Number(String),
    #[regex(r#""(?:[^"\\]|\\.)*""#, |lex| lex.slice().to_owned())]
    DoubleQuoted(String),
    #[regex(r#"'(?:[^'\\]|\\.)*'"#, |lex| lex.slice().to_owned())]
    SingleQuoted(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*", |lex| lex.slice().to_owned())]
    Name(String),
}

/// Evaluate a gating expression to a boolean. The empty expression is true.
pub fn eval_condition(expr: &str, env: &IndexMap<String, Value>) -> Result<bool> {
    let s = expr.trim();
    if s.is_empty() {
        return Ok(true);
    }
    let mut tokens = Vec::new();
    for item in ExprToken::lexer(s) {
        match item {
            Ok(tok) => tokens.push(tok),
            Err(()) => {
                return Err(FacetError::new(
                    "F701",
                    format!("If-expression parse error in '{}'", s),
                ));
            }
        }
    }
    let mut p = ExprParser {
        tokens,
        pos: 0,
        env,
    };
    let result = p.parse_or()?;
    if p.pos != p.tokens.len() {
        return Err(FacetError::new("F701", "Trailing tokens in if-expression"));
    }
    Ok(result)
}

struct ExprParser<'a> {
    tokens: Vec<ExprToken>,
    pos: usize,
    env: &'a IndexMap<String, Value>,
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<ExprToken> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_or(&mut self) -> Result<bool> {
        let mut val = self.parse_and()?;
        while self.peek() == Some(&ExprToken::Or) {
            self.bump();
            let rhs = self.parse_and()?;
            val = val || rhs;
        }
        Ok(val)
    }

    fn parse_and(&mut self) -> Result<bool> {
        let mut val = self.parse_cmp()?;
        while self.peek() == Some(&ExprToken::And) {
            self.bump();
            let rhs = self.parse_cmp()?;
            val = val && rhs;
        }
        Ok(val)
    }

    fn parse_cmp(&mut self) -> Result<bool> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Some(ExprToken::Eq) => "==",
            Some(ExprToken::Ne) => "!=",
            Some(ExprToken::Lt) => "<",
            Some(ExprToken::Le) => "<=",
            Some(ExprToken::Gt) => ">",
            Some(ExprToken::Ge) => ">=",
            Some(ExprToken::In) => "in",
            _ => return Ok(left.truthy()),
        };
        self.bump();
        let right = self.parse_primary()?;
        compare(&left, op, &right)
    }

    fn parse_primary(&mut self) -> Result<Value> {
        match self.bump() {
            Some(ExprToken::LParen) => {
                let val = self.parse_or()?;
                match self.bump() {
                    Some(ExprToken::RParen) => Ok(Value::Bool(val)),
                    _ => Err(FacetError::new("F701", "Missing closing ')'")),
                }
            }
            Some(ExprToken::Not) => {
                let val = self.parse_primary()?;
                Ok(Value::Bool(!val.truthy()))
            }
            Some(ExprToken::True) => Ok(Value::Bool(true)),
            Some(ExprToken::False) => Ok(Value::Bool(false)),
            Some(ExprToken::Null) => Ok(Value::Null),
            Some(ExprToken::Number(s)) => parse_expr_number(&s),
            Some(ExprToken::DoubleQuoted(s)) | Some(ExprToken::SingleQuoted(s)) => {
                Ok(Value::Str(unquote(&s)))
            }
            Some(ExprToken::Name(name)) => match get_path(self.env, &name) {
                Some(v) => Ok(v.clone()),
                None => Err(FacetError::new(
                    "F702",
                    format!("If-expression unknown variable '{}'", name),
                )),
            },
            _ => Err(FacetError::new(
                "F701",
                "If-expression parse error: expected a value",
            )),
        }
    }
}

fn compare(a: &Value, op: &str, b: &Value) -> Result<bool> {
    match op {
        "==" => Ok(value_eq(a, b)),
        "!=" => Ok(!value_eq(a, b)),
        "<" | "<=" | ">" | ">=" => {
            let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
                return Err(FacetError::new(
                    "F703",
                    "Type error: numeric comparison requires numbers",
                ));
            };
            Ok(match op {
                "<" => x < y,
                "<=" => x <= y,
                ">" => x > y,
                _ => x >= y,
            })
        }
        "in" => match b {
            Value::List(xs) => Ok(xs.iter().any(|x| value_eq(a, x))),
            Value::Str(s) => match a {
                Value::Str(needle) => Ok(s.contains(needle.as_str())),
                _ => Err(FacetError::new(
                    "F703",
                    "Type error: 'in' over a string requires a string operand",
                )),
            },
            _ => Err(FacetError::new(
                "F703",
                "Type error: right operand of 'in' must be list or string",
            )),
        },
        _ => Err(FacetError::new("F701", format!("Unknown operator '{}'", op))),
    }
}

fn parse_expr_number(s: &str) -> Result<Value> {
    if s.contains(['.', 'e', 'E']) {
        let x: f64 = s
            .parse()
            .map_err(|_| FacetError::new("F701", format!("Invalid number '{}'", s)))?;
        if !x.is_finite() {
            return Err(FacetError::new(
                "F703",
                "NaN/Infinity not allowed in expressions",
            ));
        }
        Ok(Value::Float(x))
    } else {
        let n: i64 = s
            .parse()
            .map_err(|_| FacetError::new("F701", format!("Invalid number '{}'", s)))?;
        Ok(Value::Int(n))
    }
}

/// Strip the surrounding quotes and unescape `\"`, `\'`, and `\\`.
fn unquote(s: &str) -> String {
    let inner = &s[1..s.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(entries: &[(&str, Value)]) -> IndexMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn eval(expr: &str, e: &IndexMap<String, Value>) -> bool {
        eval_condition(expr, e).unwrap()
    }

    #[test]
    fn test_literals() {
        let e = env(&[]);
        assert!(eval("true", &e));
        assert!(!eval("false", &e));
        assert!(!eval("null", &e));
        assert!(eval("1", &e));
        assert!(!eval("0", &e));
        assert!(eval("\"x\"", &e));
        assert!(!eval("\"\"", &e));
    }

    #[test]
    fn test_empty_expression_is_true() {
        assert!(eval("", &env(&[])));
        assert!(eval("   ", &env(&[])));
    }

    #[test]
    fn test_comparisons() {
        let e = env(&[("n", Value::Int(3))]);
        assert!(eval("n == 3", &e));
        assert!(eval("n != 2", &e));
        assert!(eval("n < 5", &e));
        assert!(eval("n <= 3", &e));
        assert!(eval("n > 1", &e));
        assert!(eval("n >= 3.0", &e));
    }

    #[test]
    fn test_numeric_equality_widens() {
        let e = env(&[("n", Value::Float(3.0))]);
        assert!(eval("n == 3", &e));
    }

    #[test]
    fn test_string_equality_both_quote_styles() {
        let e = env(&[("mode", Value::Str("expert".into()))]);
        assert!(eval("mode == \"expert\"", &e));
        assert!(eval("mode == 'expert'", &e));
        assert!(!eval("mode == 'novice'", &e));
    }

    #[test]
    fn test_boolean_connectives_and_grouping() {
        let e = env(&[
            ("a", Value::Bool(true)),
            ("b", Value::Bool(false)),
        ]);
        assert!(eval("a or b", &e));
        assert!(!eval("a and b", &e));
        assert!(eval("not b", &e));
        assert!(eval("a and (b or true)", &e));
        assert!(!eval("not (a or b)", &e));
    }

    #[test]
    fn test_in_operator() {
        let e = env(&[
            (
                "features",
                Value::List(vec![Value::Str("debug".into()), Value::Str("x".into())]),
            ),
            ("s", Value::Str("hello world".into())),
        ]);
        assert!(eval("'debug' in features", &e));
        assert!(!eval("'other' in features", &e));
        assert!(eval("'world' in s", &e));
    }

    #[test]
    fn test_dotted_name_lookup() {
        let mut m = IndexMap::new();
        m.insert("level".to_string(), Value::Str("expert".into()));
        let e = env(&[("user", Value::Map(m))]);
        assert!(eval("user.level == 'expert'", &e));
    }

    #[test]
    fn test_unknown_variable() {
        let err = eval_condition("missing", &env(&[])).unwrap_err();
        assert_eq!(err.code(), "F702");
    }

    #[test]
    fn test_ordering_requires_numbers() {
        let e = env(&[("s", Value::Str("x".into()))]);
        let err = eval_condition("s < 3", &e).unwrap_err();
        assert_eq!(err.code(), "F703");
    }

    #[test]
    fn test_in_requires_sequence_or_string() {
        let e = env(&[("n", Value::Int(1))]);
        let err = eval_condition("1 in n", &e).unwrap_err();
        assert_eq!(err.code(), "F703");
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = eval_condition("true true", &env(&[])).unwrap_err();
        assert_eq!(err.code(), "F701");
    }

    #[test]
    fn test_unbalanced_parens_rejected() {
        let err = eval_condition("(true", &env(&[])).unwrap_err();
        assert_eq!(err.code(), "F701");
        let err = eval_condition("true)", &env(&[])).unwrap_err();
        assert_eq!(err.code(), "F701");
    }

    #[test]
    fn test_keyword_prefixed_names() {
        let e = env(&[("nothing", Value::Bool(true)), ("android", Value::Int(1))]);
        assert!(eval("nothing", &e));
        assert!(eval("android == 1", &e));
    }
}
