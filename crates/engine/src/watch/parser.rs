// REVDB - Reversible Interpreter Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Parser for watch expressions.
//!
//! Grammar (whitespace allowed between tokens):
//!
//! ```text
//! expr      := IDENT postfix*
//! postfix   := '.' IDENT
//!            | '[' INTEGER ']'
//!            | '[' STRING ']'
//! INTEGER   := '-'? DIGIT+
//! STRING    := '"' chars '"' | '\'' chars '\''
//! ```
//!
//! Anything else is rejected with an error naming the construct.

use std::{fmt::Display, iter::Peekable, str::CharIndices};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One step of a watch chain, applied left to right.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatchStep {
    /// Look a name up in the current frame.
    Name {
        /// Variable name
        name: String,
    },
    /// Attribute access.
    Attr {
        /// Attribute name
        name: String,
    },
    /// Integer subscript.
    Index {
        /// Index, negative values count from the end
        index: i64,
    },
    /// String subscript.
    Key {
        /// Mapping key
        key: String,
    },
}

impl Display for WatchStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name { name } => write!(f, "{name}"),
            Self::Attr { name } => write!(f, ".{name}"),
            Self::Index { index } => write!(f, "[{index}]"),
            Self::Key { key } => write!(f, "[{key:?}]"),
        }
    }
}

/// Why a watch expression was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchParseError {
    /// Nothing to watch
    #[error("A watch expression is required")]
    Empty,

    /// Syntax outside the supported subset
    #[error("Unsupported {construct} at column {column} in watch expression. Only names, attributes and integer or string subscripts are supported.")]
    Unsupported {
        /// The construct found, e.g. "function call"
        construct: String,
        /// 1-based column
        column: usize,
    },

    /// Malformed expression
    #[error("Invalid watch expression at column {column}: {message}")]
    Invalid {
        /// What was expected
        message: String,
        /// 1-based column
        column: usize,
    },
}

/// Parse a watch expression into its chain of steps.
pub fn parse_watch_expression(expr: &str) -> Result<Vec<WatchStep>, WatchParseError> {
    if expr.trim().is_empty() {
        return Err(WatchParseError::Empty);
    }
    Parser { chars: expr.char_indices().peekable(), len: expr.len() }.parse()
}

/// Render steps back into canonical expression text.
pub fn render_watch_chain(steps: &[WatchStep]) -> String {
    steps.iter().map(ToString::to_string).collect()
}

struct Parser<'a> {
    chars: Peekable<CharIndices<'a>>,
    len: usize,
}

impl Parser<'_> {
    fn parse(mut self) -> Result<Vec<WatchStep>, WatchParseError> {
        self.skip_whitespace();
        let name = self.identifier()?;
        let mut steps = vec![WatchStep::Name { name }];

        loop {
            self.skip_whitespace();
            let Some((pos, c)) = self.chars.next() else { break };
            match c {
                '.' => {
                    self.skip_whitespace();
                    steps.push(WatchStep::Attr { name: self.identifier()? });
                }
                '[' => {
                    self.skip_whitespace();
                    steps.push(self.subscript()?);
                    self.skip_whitespace();
                    self.expect(']')?;
                }
                _ => return Err(unsupported_at(pos, c)),
            }
        }
        Ok(steps)
    }

    fn column(&mut self) -> usize {
        self.chars.peek().map_or(self.len, |(pos, _)| *pos) + 1
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn expect(&mut self, expected: char) -> Result<(), WatchParseError> {
        let column = self.column();
        match self.chars.next() {
            Some((_, c)) if c == expected => Ok(()),
            Some((pos, ':')) if expected == ']' => {
                Err(WatchParseError::Unsupported { construct: "slice".into(), column: pos + 1 })
            }
            Some((pos, c)) => Err(unsupported_at(pos, c)),
            None => Err(WatchParseError::Invalid { message: format!("expected `{expected}`"), column }),
        }
    }

    fn identifier(&mut self) -> Result<String, WatchParseError> {
        let column = self.column();
        let mut ident = String::new();
        match self.chars.peek().copied() {
            Some((_, c)) if c.is_alphabetic() || c == '_' => {}
            Some((pos, c)) => return Err(unsupported_at(pos, c)),
            None => {
                return Err(WatchParseError::Invalid {
                    message: "expected a name".into(),
                    column,
                })
            }
        }
        while let Some((_, c)) = self.chars.next_if(|(_, c)| c.is_alphanumeric() || *c == '_') {
            ident.push(c);
        }
        Ok(ident)
    }

    fn subscript(&mut self) -> Result<WatchStep, WatchParseError> {
        let column = self.column();
        match self.chars.peek().copied() {
            Some((_, c)) if c.is_ascii_digit() || c == '-' => self.integer(),
            Some((_, quote @ ('"' | '\''))) => {
                self.chars.next();
                Ok(WatchStep::Key { key: self.string(quote, column)? })
            }
            Some((_, c)) if c.is_alphabetic() || c == '_' => {
                let name = self.identifier()?;
                Err(WatchParseError::Unsupported {
                    construct: format!("non-literal subscript `{name}`"),
                    column,
                })
            }
            Some((_, ':')) => Err(WatchParseError::Unsupported { construct: "slice".into(), column }),
            Some((pos, c)) => Err(unsupported_at(pos, c)),
            None => Err(WatchParseError::Invalid { message: "expected a subscript".into(), column }),
        }
    }

    fn integer(&mut self) -> Result<WatchStep, WatchParseError> {
        let column = self.column();
        let mut text = String::new();
        if let Some((_, c)) = self.chars.next_if(|(_, c)| *c == '-') {
            text.push(c);
        }
        while let Some((_, c)) = self.chars.next_if(|(_, c)| c.is_ascii_digit()) {
            text.push(c);
        }
        if let Some((pos, '.')) = self.chars.peek().copied() {
            return Err(WatchParseError::Unsupported {
                construct: "float subscript".into(),
                column: pos + 1,
            });
        }
        let index = text.parse::<i64>().map_err(|e| WatchParseError::Invalid {
            message: format!("invalid integer subscript `{text}`: {e}"),
            column,
        })?;
        Ok(WatchStep::Index { index })
    }

    fn string(&mut self, quote: char, column: usize) -> Result<String, WatchParseError> {
        let mut value = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                c if c == quote => return Ok(value),
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, escaped @ ('\\' | '\'' | '"'))) => value.push(escaped),
                    Some((pos, other)) => {
                        return Err(WatchParseError::Unsupported {
                            construct: format!("string escape `\\{other}`"),
                            column: pos + 1,
                        })
                    }
                    None => break,
                },
                c => value.push(c),
            }
        }
        Err(WatchParseError::Invalid { message: "unterminated string literal".into(), column })
    }
}

/// Name the construct a stray character starts.
fn unsupported_at(pos: usize, c: char) -> WatchParseError {
    let construct = match c {
        '(' => "function call".to_string(),
        ')' | ']' => format!("unbalanced `{c}`"),
        '0'..='9' => "number literal".to_string(),
        '"' | '\'' => "string literal".to_string(),
        '{' | '}' => "dict or set display".to_string(),
        ',' => "tuple".to_string(),
        ':' => "slice".to_string(),
        c if "+-*/%<>=!&|^~@".contains(c) => format!("operator `{c}`"),
        c if c.is_alphabetic() || c == '_' => "juxtaposed names".to_string(),
        c => format!("character `{c}`"),
    };
    WatchParseError::Unsupported { construct, column: pos + 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> WatchStep {
        WatchStep::Name { name: n.into() }
    }

    fn attr(n: &str) -> WatchStep {
        WatchStep::Attr { name: n.into() }
    }

    #[test]
    fn test_simple_name() {
        assert_eq!(parse_watch_expression("counter").unwrap(), vec![name("counter")]);
        assert_eq!(parse_watch_expression("  _x1 ").unwrap(), vec![name("_x1")]);
    }

    #[test]
    fn test_chained_steps() {
        let steps = parse_watch_expression("kennel[0].dogs['rex'].age").unwrap();
        assert_eq!(
            steps,
            vec![
                name("kennel"),
                WatchStep::Index { index: 0 },
                attr("dogs"),
                WatchStep::Key { key: "rex".into() },
                attr("age"),
            ]
        );
        assert_eq!(render_watch_chain(&steps), "kennel[0].dogs[\"rex\"].age");
    }

    #[test]
    fn test_whitespace_and_negative_index() {
        let steps = parse_watch_expression("a . b [ -1 ]").unwrap();
        assert_eq!(steps, vec![name("a"), attr("b"), WatchStep::Index { index: -1 }]);
    }

    #[test]
    fn test_string_escapes() {
        let steps = parse_watch_expression(r#"d["a\"b"]"#).unwrap();
        assert_eq!(steps[1], WatchStep::Key { key: "a\"b".into() });
    }

    #[test]
    fn test_steps_serialize_as_tagged_json() {
        let steps = parse_watch_expression("a.b[0]['k']").unwrap();
        assert_eq!(
            serde_json::to_string(&steps).unwrap(),
            r#"[{"type":"name","name":"a"},{"type":"attr","name":"b"},{"type":"index","index":0},{"type":"key","key":"k"}]"#
        );
    }

    fn construct(expr: &str) -> String {
        match parse_watch_expression(expr).unwrap_err() {
            WatchParseError::Unsupported { construct, .. } => construct,
            other => panic!("expected unsupported construct, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_constructs_are_named() {
        assert_eq!(construct("f(x)"), "function call");
        assert_eq!(construct("a + b"), "operator `+`");
        assert_eq!(construct("a[i]"), "non-literal subscript `i`");
        assert_eq!(construct("a[1:2]"), "slice");
        assert_eq!(construct("a[:2]"), "slice");
        assert_eq!(construct("a[1.5]"), "float subscript");
        assert_eq!(construct("42"), "number literal");
        assert_eq!(construct("a, b"), "tuple");
        assert_eq!(construct("not x"), "juxtaposed names");
    }

    #[test]
    fn test_invalid_expressions() {
        assert_eq!(parse_watch_expression("   "), Err(WatchParseError::Empty));
        assert!(matches!(parse_watch_expression("a."), Err(WatchParseError::Invalid { .. })));
        assert!(matches!(parse_watch_expression("a[0"), Err(WatchParseError::Invalid { .. })));
        assert!(matches!(parse_watch_expression("a['x"), Err(WatchParseError::Invalid { .. })));
    }

    #[test]
    fn test_error_column() {
        let err = parse_watch_expression("abc(1)").unwrap_err();
        assert_eq!(err, WatchParseError::Unsupported { construct: "function call".into(), column: 4 });
        assert!(err.to_string().contains("function call"));
    }
}
