//! Property filters of the form `name <op> literal`.
//!
//! A filter is parsed once per management call and evaluated against every
//! scanned message. Absent properties and mismatched types never match.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::core::message::{Message, PropertyValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} at offset {offset} in filter `{text}`")]
pub struct FilterError {
    pub text: String,
    pub offset: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            Operator::Eq => ord == Ordering::Equal,
            Operator::Ne => ord != Ordering::Equal,
            Operator::Lt => ord == Ordering::Less,
            Operator::Le => ord != Ordering::Greater,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Ge => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Decimal(f64),
    Text(String),
    Boolean(bool),
}

/// A parsed `property op literal` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    property: String,
    op: Operator,
    literal: Literal,
}

impl Filter {
    /// Parses optional filter text. `None`, empty and blank text mean "match all".
    pub fn parse_optional(text: Option<&str>) -> Result<Option<Filter>, FilterError> {
        match text {
            Some(t) if !t.trim().is_empty() => t.parse().map(Some),
            _ => Ok(None),
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn operator(&self) -> Operator {
        self.op
    }

    pub fn literal(&self) -> &Literal {
        &self.literal
    }

    pub fn matches(&self, message: &Message) -> bool {
        let Some(value) = message.property(&self.property) else {
            return false;
        };

        let ord = match (&self.literal, value) {
            (Literal::Boolean(lit), PropertyValue::Bool(v)) => {
                if !matches!(self.op, Operator::Eq | Operator::Ne) {
                    return false;
                }
                v.cmp(lit)
            }
            (Literal::Text(lit), PropertyValue::String(v)) => v.as_str().cmp(lit.as_str()),
            (Literal::Integer(lit), v) => match (v.as_i64(), v.as_f64()) {
                (Some(n), _) => n.cmp(lit),
                (None, Some(n)) => match n.partial_cmp(&(*lit as f64)) {
                    Some(ord) => ord,
                    None => return false,
                },
                _ => return false,
            },
            (Literal::Decimal(lit), v) => match v.as_f64().and_then(|n| n.partial_cmp(lit)) {
                Some(ord) => ord,
                None => return false,
            },
            _ => return false,
        };

        self.op.accepts(ord)
    }
}

/// Evaluates an optional filter; no filter matches everything.
pub fn matches(message: &Message, filter: Option<&Filter>) -> bool {
    filter.map_or(true, |f| f.matches(message))
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Parser::new(text).parse()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.property, self.op)?;
        match &self.literal {
            Literal::Integer(v) => write!(f, "{v}"),
            Literal::Decimal(v) => write!(f, "{v}"),
            Literal::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Literal::Boolean(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
        }
    }
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Filter, FilterError> {
        self.skip_ws();
        let property = self.identifier()?;
        self.skip_ws();
        let op = self.operator()?;
        self.skip_ws();
        let literal = self.literal()?;
        self.skip_ws();
        if self.pos < self.bytes.len() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(Filter {
            property,
            op,
            literal,
        })
    }

    fn error(&self, reason: impl Into<String>) -> FilterError {
        FilterError {
            text: self.text.to_string(),
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn identifier(&mut self) -> Result<String, FilterError> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_alphabetic() || b == b'_' || b == b'$' => self.pos += 1,
            _ => return Err(self.error("expected property name")),
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.')) {
            self.pos += 1;
        }
        let text = self.text;
        Ok(text[start..self.pos].to_string())
    }

    fn operator(&mut self) -> Result<Operator, FilterError> {
        let rest = &self.bytes[self.pos..];
        let (op, len) = match rest {
            [b'<', b'>', ..] => (Operator::Ne, 2),
            [b'<', b'=', ..] => (Operator::Le, 2),
            [b'>', b'=', ..] => (Operator::Ge, 2),
            [b'=', ..] => (Operator::Eq, 1),
            [b'<', ..] => (Operator::Lt, 1),
            [b'>', ..] => (Operator::Gt, 1),
            _ => return Err(self.error("expected comparison operator")),
        };
        self.pos += len;
        Ok(op)
    }

    fn literal(&mut self) -> Result<Literal, FilterError> {
        match self.peek() {
            Some(b'\'') => self.string_literal(),
            Some(b) if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.') => self.number_literal(),
            Some(b) if b.is_ascii_alphabetic() => {
                let start = self.pos;
                while matches!(self.peek(), Some(b) if b.is_ascii_alphabetic()) {
                    self.pos += 1;
                }
                let text = self.text;
                let word = &text[start..self.pos];
                if word.eq_ignore_ascii_case("true") {
                    Ok(Literal::Boolean(true))
                } else if word.eq_ignore_ascii_case("false") {
                    Ok(Literal::Boolean(false))
                } else {
                    self.pos = start;
                    Err(self.error(format!("unknown literal `{word}`")))
                }
            }
            _ => Err(self.error("expected literal")),
        }
    }

    fn string_literal(&mut self) -> Result<Literal, FilterError> {
        let open = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chunk_start = self.pos;
        loop {
            match self.peek() {
                None => {
                    self.pos = open;
                    return Err(self.error("unterminated string literal"));
                }
                Some(b'\'') => {
                    let text = self.text;
                    out.push_str(&text[chunk_start..self.pos]);
                    self.pos += 1;
                    if self.peek() == Some(b'\'') {
                        out.push('\'');
                        self.pos += 1;
                        chunk_start = self.pos;
                    } else {
                        return Ok(Literal::Text(out));
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn number_literal(&mut self) -> Result<Literal, FilterError> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        let mut decimal = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' => {
                    decimal = true;
                    self.pos += 1;
                    if matches!(b, b'e' | b'E') && matches!(self.peek(), Some(b'-' | b'+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = self.text;
        let raw = &text[start..self.pos];
        let parsed = if decimal {
            raw.parse::<f64>().ok().map(Literal::Decimal)
        } else {
            raw.parse::<i64>().ok().map(Literal::Integer)
        };
        parsed.ok_or_else(|| {
            self.pos = start;
            self.error(format!("invalid numeric literal `{raw}`"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_with(key: &str, value: impl Into<PropertyValue>) -> Message {
        Message::new(true).with_property(key, value)
    }

    #[test]
    fn parses_equality_without_spaces_after_operator() {
        let f: Filter = "key =9001".parse().unwrap();
        assert_eq!(f.property(), "key");
        assert_eq!(f.operator(), Operator::Eq);
        assert_eq!(f.literal(), &Literal::Integer(9001));
    }

    #[test]
    fn negative_long_literals_round_trip_through_display() {
        let f: Filter = "key = -4611686018427387904".parse().unwrap();
        let reparsed: Filter = f.to_string().parse().unwrap();
        assert_eq!(f, reparsed);
        assert!(f.matches(&msg_with("key", -4_611_686_018_427_387_904i64)));
    }

    #[test]
    fn long_equality_is_exact() {
        let f: Filter = "key = 9007199254740993".parse().unwrap();
        assert!(f.matches(&msg_with("key", 9_007_199_254_740_993i64)));
        assert!(!f.matches(&msg_with("key", 9_007_199_254_740_992i64)));
    }

    #[test]
    fn numeric_comparison_mixes_int_and_decimal() {
        let f: Filter = "price >= 2.5".parse().unwrap();
        assert!(f.matches(&msg_with("price", 3i32)));
        assert!(f.matches(&msg_with("price", 2.5f64)));
        assert!(!f.matches(&msg_with("price", 2i64)));
    }

    #[test]
    fn string_literals_compare_lexically_with_escapes() {
        let f: Filter = "name = 'o''brien'".parse().unwrap();
        assert!(f.matches(&msg_with("name", "o'brien")));
        let lt: Filter = "name < 'm'".parse().unwrap();
        assert!(lt.matches(&msg_with("name", "apple")));
        assert!(!lt.matches(&msg_with("name", "zebra")));
    }

    #[test]
    fn booleans_only_support_equality() {
        let eq: Filter = "flag = true".parse().unwrap();
        assert!(eq.matches(&msg_with("flag", true)));
        let gt: Filter = "flag > FALSE".parse().unwrap();
        assert!(!gt.matches(&msg_with("flag", true)));
    }

    #[test]
    fn missing_property_and_type_mismatch_never_match() {
        let f: Filter = "key <> 1".parse().unwrap();
        assert!(!f.matches(&Message::new(true)));
        assert!(!f.matches(&msg_with("key", "1")));
    }

    #[test]
    fn blank_filter_text_means_match_all() {
        assert!(Filter::parse_optional(None).unwrap().is_none());
        assert!(Filter::parse_optional(Some("   ")).unwrap().is_none());
        assert!(matches(&Message::new(false), None));
    }

    #[test]
    fn malformed_filters_report_offsets() {
        let err = "key == 1".parse::<Filter>().unwrap_err();
        assert_eq!(err.offset, 5);

        let err = "= 1".parse::<Filter>().unwrap_err();
        assert_eq!(err.offset, 0);

        let err = "key = 'open".parse::<Filter>().unwrap_err();
        assert!(err.reason.contains("unterminated"));

        let err = "key = 1 extra".parse::<Filter>().unwrap_err();
        assert!(err.reason.contains("trailing"));

        assert!("key = 1.2.3".parse::<Filter>().is_err());
        assert!("key = maybe".parse::<Filter>().is_err());
    }
}
