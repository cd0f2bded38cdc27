// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Hand-rolled parser for the compact wire format.
//
// The grammar is a strict subset of JSON: no exponents, and no whitespace
// between tokens unless `ParseOptions::tolerate_whitespace` is set. Object
// keys must be unique within one object.

use std::collections::HashSet;

use crate::error::ParseError;
use crate::value::{ArgumentList, Object, Value};

/// Maximum nesting of arrays and objects, counting the top-level array.
pub const MAX_DEPTH: usize = 128;

/// Knobs for the parser. The default is the strict wire grammar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Skip space, tab, CR and LF between tokens (never inside strings or numbers).
    pub tolerate_whitespace: bool,
}

impl ParseOptions {
    pub const STRICT: ParseOptions = ParseOptions {
        tolerate_whitespace: false,
    };
    pub const LENIENT: ParseOptions = ParseOptions {
        tolerate_whitespace: true,
    };
}

/// Parse a wire-format argument blob with the strict grammar.
pub fn parse(text: &str) -> Result<ArgumentList, ParseError> {
    parse_with(text, ParseOptions::STRICT)
}

/// Parse a wire-format argument blob. The top level must be an array and
/// nothing may follow its closing bracket.
pub fn parse_with(text: &str, options: ParseOptions) -> Result<ArgumentList, ParseError> {
    let mut parser = Parser::new(text, options);
    parser.skip_whitespace();
    match parser.peek() {
        Some(b'[') => {}
        Some(_) => return Err(ParseError::NotAnArray { offset: parser.pos }),
        None => return Err(ParseError::UnexpectedEnd { offset: parser.pos }),
    }
    let items = parser.array(1)?;
    parser.finish()?;
    Ok(ArgumentList::new(items))
}

/// Parse a single value of any kind, for callers that accept an object
/// envelope rather than an argument array.
pub fn parse_value(text: &str, options: ParseOptions) -> Result<Value, ParseError> {
    let mut parser = Parser::new(text, options);
    let value = parser.value(0)?;
    parser.finish()?;
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    options: ParseOptions,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, options: ParseOptions) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            options,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        if !self.options.tolerate_whitespace {
            return;
        }
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    /// Error for whatever sits at the cursor.
    fn unexpected(&self) -> ParseError {
        match self.src[self.pos..].chars().next() {
            Some(found) => ParseError::UnexpectedChar {
                offset: self.pos,
                found,
            },
            None => ParseError::UnexpectedEnd { offset: self.pos },
        }
    }

    fn consume(&mut self, byte: u8) -> Result<(), ParseError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(ParseError::TrailingCharacters { offset: self.pos })
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'"') => self.string().map(Value::String),
            Some(b'[') => self.array(depth + 1).map(Value::Array),
            Some(b'{') => self.object(depth + 1).map(Value::Object),
            Some(b't') => self.literal("true", Value::Bool(true)),
            Some(b'f') => self.literal("false", Value::Bool(false)),
            Some(b'n') => self.literal("null", Value::Null),
            Some(b'-' | b'0'..=b'9') => self.number(),
            _ => Err(self.unexpected()),
        }
    }

    fn enter(&self, depth: usize) -> Result<(), ParseError> {
        if depth > MAX_DEPTH {
            Err(ParseError::TooDeep {
                offset: self.pos,
                limit: MAX_DEPTH,
            })
        } else {
            Ok(())
        }
    }

    fn array(&mut self, depth: usize) -> Result<Vec<Value>, ParseError> {
        self.enter(depth)?;
        self.consume(b'[')?;
        let mut items = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(items);
        }

        loop {
            items.push(self.value(depth)?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(items);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn object(&mut self, depth: usize) -> Result<Object, ParseError> {
        self.enter(depth)?;
        self.consume(b'{')?;
        let mut object = Object::new();

        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(object);
        }

        let mut seen = HashSet::new();
        loop {
            self.skip_whitespace();
            let key_offset = self.pos;
            if self.peek() != Some(b'"') {
                return Err(self.unexpected());
            }
            let name = self.string()?;
            if seen.contains(&name) {
                return Err(ParseError::DuplicateKey {
                    offset: key_offset,
                    name,
                });
            }

            self.skip_whitespace();
            self.consume(b':')?;
            let value = self.value(depth)?;
            seen.insert(name.clone());
            object.push_unchecked(name, value);

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(object);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn literal(&mut self, word: &str, value: Value) -> Result<Value, ParseError> {
        if self.bytes[self.pos..].starts_with(word.as_bytes()) {
            self.pos += word.len();
            Ok(value)
        } else {
            Err(self.unexpected())
        }
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn number(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        if self.digits() == 0 {
            return Err(ParseError::InvalidNumber { offset: start });
        }

        let mut is_double = false;
        if self.peek() == Some(b'.') {
            self.pos += 1;
            if self.digits() == 0 {
                return Err(ParseError::InvalidNumber { offset: start });
            }
            is_double = true;
        }

        let text = &self.src[start..self.pos];
        if is_double {
            let d: f64 = text
                .parse()
                .map_err(|_| ParseError::InvalidNumber { offset: start })?;
            if !d.is_finite() {
                return Err(ParseError::NumberOutOfRange { offset: start });
            }
            Ok(Value::Double(d))
        } else {
            let n: i64 = text
                .parse()
                .map_err(|_| ParseError::NumberOutOfRange { offset: start })?;
            Ok(match i32::try_from(n) {
                Ok(small) => Value::Int32(small),
                Err(_) => Value::Int64(n),
            })
        }
    }

    fn string(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        self.consume(b'"')?;
        let mut out = String::new();

        loop {
            // Runs of plain bytes are copied as one slice. Multi-byte UTF-8
            // never contains '"' or '\\', so slice bounds stay on char edges.
            let run_start = self.pos;
            while let Some(b) = self.peek() {
                if b == b'"' || b == b'\\' {
                    break;
                }
                self.pos += 1;
            }
            out.push_str(&self.src[run_start..self.pos]);

            match self.peek() {
                None => return Err(ParseError::UnterminatedString { offset: start }),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                _ => {
                    let escape_offset = self.pos;
                    self.pos += 1;
                    let Some(code) = self.peek() else {
                        return Err(ParseError::UnterminatedString { offset: start });
                    };
                    self.pos += 1;
                    match code {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{08}'),
                        b'f' => out.push('\u{0C}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => out.push(self.unicode_escape(escape_offset)?),
                        _ => return Err(ParseError::InvalidEscape { offset: escape_offset }),
                    }
                }
            }
        }
    }

    fn hex4(&mut self, escape_offset: usize) -> Result<u16, ParseError> {
        let mut unit: u16 = 0;
        for _ in 0..4 {
            let digit = self
                .peek()
                .and_then(|b| (b as char).to_digit(16))
                .ok_or(ParseError::InvalidUnicode {
                    offset: escape_offset,
                })?;
            unit = (unit << 4) | digit as u16;
            self.pos += 1;
        }
        Ok(unit)
    }

    /// Decode the `XXXX` after `\u`, pairing UTF-16 surrogates.
    fn unicode_escape(&mut self, escape_offset: usize) -> Result<char, ParseError> {
        let invalid = ParseError::InvalidUnicode {
            offset: escape_offset,
        };
        let high = self.hex4(escape_offset)?;
        match high {
            0xD800..=0xDBFF => {
                if !self.bytes[self.pos..].starts_with(b"\\u") {
                    return Err(invalid);
                }
                self.pos += 2;
                let low = self.hex4(escape_offset)?;
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(invalid);
                }
                let code = 0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00);
                char::from_u32(code).ok_or(invalid)
            }
            0xDC00..=0xDFFF => Err(invalid),
            _ => char::from_u32(u32::from(high)).ok_or(invalid),
        }
    }
}
