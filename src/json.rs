//! Minimal JSON reader for the safetensors header
//!
//! The header grammar only needs objects, arrays, strings, numbers and the
//! three literals, but it is untrusted input, so the reader is strict where
//! it matters: control characters inside strings, invalid `\u` escapes,
//! duplicate object keys, unterminated strings and unclosed containers are
//! all hard errors, reported with the byte offset of the failure.
//!
//! Objects preserve insertion order (the tensor directory order is the
//! header order). Numbers are exposed as `f64`; the header validator casts
//! them to integers where the field is integral. The tree owns all of its
//! strings, so the input buffer may be unmapped as soon as parsing returns.
//!
//! Bytes after the root value are the caller's concern and are not
//! inspected.

use crate::error::{Result, TensoresError};

/// A parsed JSON value
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Any JSON number, held as an IEEE double
    Number(f64),
    /// String with escapes resolved to UTF-8
    String(String),
    /// Ordered array
    Array(Vec<JsonValue>),
    /// Object as ordered key/value pairs (insertion order preserved)
    Object(Vec<(String, JsonValue)>),
}

impl JsonValue {
    /// Look up a key in an object. Returns `None` for non-objects and
    /// missing keys.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        match self {
            JsonValue::Object(pairs) => {
                pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// String payload, if this is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric payload, if this is a number
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsonValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Array items, if this is an array
    #[must_use]
    pub fn as_array(&self) -> Option<&[JsonValue]> {
        match self {
            JsonValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Object pairs in insertion order, if this is an object
    #[must_use]
    pub fn as_object(&self) -> Option<&[(String, JsonValue)]> {
        match self {
            JsonValue::Object(pairs) => Some(pairs),
            _ => None,
        }
    }
}

/// Parse a single JSON value from `input`.
///
/// # Errors
///
/// Returns [`TensoresError::JsonParse`] with the byte offset of the first
/// failure.
pub fn parse(input: &[u8]) -> Result<JsonValue> {
    let mut parser = Parser { input, pos: 0 };
    parser.parse_value()
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> TensoresError {
        TensoresError::JsonParse {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c == b' ' || c == b'\t' || c == b'\n' || c == b'\r' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn match_literal(&mut self, lit: &[u8]) -> bool {
        if self.input[self.pos..].starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    fn parse_value(&mut self) -> Result<JsonValue> {
        self.skip_whitespace();

        match self.peek() {
            None => Err(self.error("Unexpected end of input")),
            Some(b'n') if self.match_literal(b"null") => Ok(JsonValue::Null),
            Some(b't') if self.match_literal(b"true") => Ok(JsonValue::Bool(true)),
            Some(b'f') if self.match_literal(b"false") => Ok(JsonValue::Bool(false)),
            Some(b'"') => Ok(JsonValue::String(self.parse_string()?)),
            Some(b'[') => self.parse_array(),
            Some(b'{') => self.parse_object(),
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(),
            Some(_) => Err(self.error("Invalid JSON value")),
        }
    }

    fn hex_digit(&self) -> Option<u32> {
        match self.peek()? {
            c @ b'0'..=b'9' => Some(u32::from(c - b'0')),
            c @ b'a'..=b'f' => Some(10 + u32::from(c - b'a')),
            c @ b'A'..=b'F' => Some(10 + u32::from(c - b'A')),
            _ => None,
        }
    }

    fn parse_hex4(&mut self) -> Result<u32> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .hex_digit()
                .ok_or_else(|| self.error("Invalid unicode escape"))?;
            code = (code << 4) | digit;
            self.pos += 1;
        }
        Ok(code)
    }

    /// `\uXXXX`, positioned just after the `u`. Handles surrogate pairs.
    fn parse_unicode_escape(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let mut codepoint = self.parse_hex4()?;

        if (0xD800..=0xDBFF).contains(&codepoint) {
            if !self.match_literal(b"\\u") {
                return Err(self.error("Lone high surrogate in unicode escape"));
            }
            let low = self.parse_hex4()?;
            if !(0xDC00..=0xDFFF).contains(&low) {
                return Err(self.error("Invalid low surrogate in unicode escape"));
            }
            codepoint = 0x10000 + ((codepoint - 0xD800) << 10) + (low - 0xDC00);
        } else if (0xDC00..=0xDFFF).contains(&codepoint) {
            return Err(self.error("Lone low surrogate in unicode escape"));
        }

        let ch = char::from_u32(codepoint)
            .ok_or_else(|| self.error("Invalid unicode codepoint"))?;
        out.extend_from_slice(ch.encode_utf8(&mut [0u8; 4]).as_bytes());
        Ok(())
    }

    fn parse_string(&mut self) -> Result<String> {
        if self.peek() != Some(b'"') {
            return Err(self.error("Expected '\"'"));
        }
        self.pos += 1;

        let mut out = Vec::new();
        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => return Err(self.error("Unterminated string")),
            };

            match c {
                b'"' => {
                    self.pos += 1;
                    return String::from_utf8(out)
                        .map_err(|_| self.error("Invalid UTF-8 in string"));
                }
                c if c < 0x20 => {
                    return Err(self.error("Invalid control character in string"));
                }
                b'\\' => {
                    self.pos += 1;
                    let esc = match self.peek() {
                        Some(e) => e,
                        None => return Err(self.error("Unexpected end of string")),
                    };
                    self.pos += 1;
                    match esc {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => self.parse_unicode_escape(&mut out)?,
                        _ => return Err(self.error("Invalid escape character")),
                    }
                }
                _ => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_number(&mut self) -> Result<JsonValue> {
        let start = self.pos;

        if self.peek() == Some(b'-') {
            self.pos += 1;
        }

        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(c) if c.is_ascii_digit() => {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
            _ => return Err(self.error("Invalid number")),
        }

        if self.peek() == Some(b'.') {
            self.pos += 1;
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.error("Invalid number"));
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.error("Invalid number exponent"));
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        // The grammar above only admits ASCII digits, sign, dot, exponent
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid number"))?;
        let value: f64 = text.parse().map_err(|_| self.error("Invalid number"))?;
        Ok(JsonValue::Number(value))
    }

    fn parse_array(&mut self) -> Result<JsonValue> {
        self.pos += 1; // consume '['
        let mut items = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(JsonValue::Array(items));
        }

        loop {
            items.push(self.parse_value()?);
            self.skip_whitespace();

            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(JsonValue::Array(items));
                }
                Some(b',') => {
                    self.pos += 1;
                    self.skip_whitespace();
                }
                Some(_) => return Err(self.error("Expected ',' or ']' in array")),
                None => return Err(self.error("Unexpected end of array")),
            }
        }
    }

    fn parse_object(&mut self) -> Result<JsonValue> {
        self.pos += 1; // consume '{'
        let mut pairs: Vec<(String, JsonValue)> = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(JsonValue::Object(pairs));
        }

        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'"') {
                return Err(self.error("Expected string key in object"));
            }
            let key = self.parse_string()?;

            if pairs.iter().any(|(k, _)| *k == key) {
                return Err(self.error(format!("Duplicate key '{key}' in object")));
            }

            self.skip_whitespace();
            if self.peek() != Some(b':') {
                return Err(self.error("Expected ':' after key"));
            }
            self.pos += 1;

            let value = self.parse_value()?;
            pairs.push((key, value));

            self.skip_whitespace();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(JsonValue::Object(pairs));
                }
                Some(b',') => self.pos += 1,
                Some(_) => return Err(self.error("Expected ',' or '}' in object")),
                None => return Err(self.error("Unexpected end of object")),
            }
        }
    }
}
