//! Dict-literal payload codec.
//!
//! The agent exchanges mappings rendered as dict literals, e.g.
//! `{'address': '4Fd...', 'kwh_current': 100.0, 'last_compensation_date': None}`.
//! Encoding renders a serde value in that syntax; decoding parses it back
//! (JSON is accepted too) and deserializes the typed message.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::ProtocolError;

/// Largest payload accepted for decoding.
pub const MAX_PAYLOAD_LEN: usize = 256 * 1024;

/// Deepest nesting of mappings and sequences accepted when parsing.
pub const MAX_NESTING: usize = 128;

/// Encode a message as a dict-literal payload.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let value = serde_json::to_value(message)
        .map_err(|e| ProtocolError::Codec(format!("serialize: {e}")))?;
    if !value.is_object() {
        return Err(ProtocolError::Codec("message must serialize to a mapping".into()));
    }
    Ok(render(&value).into_bytes())
}

/// Decode a payload into a typed message.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
    let value = decode_value(payload)?;
    serde_json::from_value(value).map_err(|e| ProtocolError::Codec(format!("message shape: {e}")))
}

/// Decode a payload into its untyped mapping.
pub fn decode_value(payload: &[u8]) -> Result<Value, ProtocolError> {
    let text = normalize_payload(payload)?;
    let value = parse(&text)?;
    if !value.is_object() {
        return Err(ProtocolError::Codec("payload is not a mapping".into()));
    }
    Ok(value)
}

/// Turn a raw payload into the literal text it carries.
///
/// Some transports deliver the message as a sequence of code points
/// (`[123, 39, 97, ...]`) rather than as text; those are converted back.
pub fn normalize_payload(payload: &[u8]) -> Result<String, ProtocolError> {
    check_len(payload.len())?;
    let text = std::str::from_utf8(payload)
        .map_err(|e| ProtocolError::Codec(format!("payload is not utf-8: {e}")))?
        .trim();
    if text.starts_with('[') {
        if let Ok(points) = serde_json::from_str::<Vec<u32>>(text) {
            return text_from_code_points(&points);
        }
    }
    Ok(text.to_string())
}

fn check_len(len: usize) -> Result<(), ProtocolError> {
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::Codec(format!(
            "payload of {len} bytes exceeds {MAX_PAYLOAD_LEN}"
        )));
    }
    Ok(())
}

/// Build a string from a sequence of Unicode code points.
pub fn text_from_code_points(points: &[u32]) -> Result<String, ProtocolError> {
    points
        .iter()
        .map(|&p| {
            char::from_u32(p).ok_or_else(|| ProtocolError::Codec(format!("invalid code point {p}")))
        })
        .collect()
}

/// Render a value in dict-literal syntax.
pub fn render(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(key, out);
                out.push_str(": ");
                write_value(item, out);
            }
            out.push('}');
        }
    }
}

fn write_number(n: &Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        // Floats keep a decimal point so they decode as floats again.
        let s = f.to_string();
        out.push_str(&s);
        if !s.contains(['.', 'e', 'E']) {
            out.push_str(".0");
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
}

/// Parse dict-literal (or JSON) text into a value.
pub fn parse(text: &str) -> Result<Value, ProtocolError> {
    check_len(text.len())?;
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != parser.chars.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn error(&self, what: &str) -> ProtocolError {
        ProtocolError::Codec(format!("{what} at offset {}", self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ProtocolError> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            _ => Err(self.error(&format!("expected '{expected}'"))),
        }
    }

    fn value(&mut self) -> Result<Value, ProtocolError> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.nested(Self::mapping),
            Some('[') => self.nested(|p| p.sequence(']')),
            Some('(') => self.nested(|p| p.sequence(')')),
            Some('\'') | Some('"') => self.string().map(Value::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.keyword(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn nested(
        &mut self,
        inner: impl FnOnce(&mut Self) -> Result<Value, ProtocolError>,
    ) -> Result<Value, ProtocolError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let value = inner(self);
        self.depth -= 1;
        value
    }

    fn mapping(&mut self) -> Result<Value, ProtocolError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                _ => return Err(self.error("mapping key must be a string or number")),
            };
            self.expect(':')?;
            let item = self.value()?;
            map.insert(key, item);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn sequence(&mut self, close: char) -> Result<Value, ProtocolError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(Value::Array(items)),
                _ => return Err(self.error(&format!("expected ',' or '{close}'"))),
            }
        }
    }

    fn string(&mut self) -> Result<String, ProtocolError> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let escaped = self.bump().ok_or_else(|| self.error("unterminated escape"))?;
                    match escaped {
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        '0' => out.push('\0'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        '/' => out.push('/'),
                        '\\' | '\'' | '"' => out.push(escaped),
                        'x' => out.push(self.hex_escape(2)?),
                        'u' => out.push(self.hex_escape(4)?),
                        'U' => out.push(self.hex_escape(8)?),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, ProtocolError> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err(self.error("truncated escape"));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid escape"))
    }

    fn number(&mut self) -> Result<Value, ProtocolError> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_')
        ) {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        let is_float = raw.contains(['.', 'e', 'E']);

        if !is_float {
            if let Ok(i) = raw.parse::<i64>() {
                return Ok(Value::Number(i.into()));
            }
            if let Ok(u) = raw.trim_start_matches('+').parse::<u64>() {
                return Ok(Value::Number(u.into()));
            }
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| ProtocolError::Codec(format!("invalid number '{raw}' at offset {start}")))
    }

    fn keyword(&mut self) -> Result<Value, ProtocolError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "None" | "null" => Ok(Value::Null),
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            _ => Err(ProtocolError::Codec(format!("unknown literal '{word}' at offset {start}"))),
        }
    }
}
