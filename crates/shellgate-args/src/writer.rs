// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compact wire-format writer. Output re-parses to an equal tree.

use std::fmt::{self, Write};

use crate::value::{ArgumentList, Object, Value};

/// Write `s` as a quoted literal using `quote` as the delimiter.
///
/// Escapes the delimiter, backslash, control characters and the two
/// script line terminators U+2028/U+2029. With `'"'` the output is valid
/// wire text; with `'\''` it is a script string literal.
pub fn write_quoted<W: Write>(out: &mut W, s: &str, quote: char) -> fmt::Result {
    out.write_char(quote)?;
    for c in s.chars() {
        match c {
            '\\' => out.write_str("\\\\")?,
            '\u{08}' => out.write_str("\\b")?,
            '\u{0C}' => out.write_str("\\f")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            c if c == quote => {
                out.write_char('\\')?;
                out.write_char(c)?;
            }
            c if c < '\u{20}' || c == '\u{2028}' || c == '\u{2029}' => {
                write!(out, "\\u{:04x}", c as u32)?
            }
            c => out.write_char(c)?,
        }
    }
    out.write_char(quote)
}

fn write_double(f: &mut fmt::Formatter<'_>, d: f64) -> fmt::Result {
    if !d.is_finite() {
        return f.write_str("null");
    }
    // f64's Display never uses exponent notation; force a '.' so the value
    // re-parses as a Double.
    let text = d.to_string();
    f.write_str(&text)?;
    if !text.contains('.') {
        f.write_str(".0")?;
    }
    Ok(())
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    f.write_char('[')?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_char(',')?;
        }
        fmt::Display::fmt(item, f)?;
    }
    f.write_char(']')
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Never produced by the parser; written as null so output stays parseable.
            Value::Empty | Value::Null => f.write_str("null"),
            Value::String(s) => write_quoted(f, s, '"'),
            Value::Int32(n) => write!(f, "{n}"),
            Value::Int64(n) => write!(f, "{n}"),
            Value::Double(d) => write_double(f, *d),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Array(items) => write_items(f, items),
            Value::Object(obj) => fmt::Display::fmt(obj, f),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('{')?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            write_quoted(f, name, '"')?;
            f.write_char(':')?;
            fmt::Display::fmt(value, f)?;
        }
        f.write_char('}')
    }
}

impl fmt::Display for ArgumentList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_items(f, self.as_slice())
    }
}

impl Value {
    /// Serialize to compact wire text.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl ArgumentList {
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn round_trip(text: &str) {
        let first = parse(text).expect("original parses");
        let written = first.to_wire();
        let second = parse(&written).expect("written form parses");
        assert_eq!(first, second, "round trip changed the tree: {text} -> {written}");
    }

    #[test]
    fn representative_trees_round_trip() {
        round_trip("[]");
        round_trip(r#"["a",1,-2147483649,2.5,true,null]"#);
        round_trip(r#"[{"create":true,"exclusive":false},[[]],{}]"#);
        round_trip(r#"["quote\" slash\\ ctl\u0001 tab\t   😀"]"#);
        round_trip("[1.0,-0.0,0.000001,123456789012.5]");
    }

    #[test]
    fn doubles_keep_their_kind() {
        assert_eq!(Value::Double(3.0).to_wire(), "3.0");
        assert_eq!(Value::Double(-0.25).to_wire(), "-0.25");
        assert_eq!(Value::Double(1e21).to_wire(), "1000000000000000000000.0");
        assert_eq!(Value::Double(f64::NAN).to_wire(), "null");
    }

    #[test]
    fn objects_keep_insertion_order() {
        let obj = Object::new().with("z", 1).with("a", "x");
        assert_eq!(Value::from(obj).to_wire(), r#"{"z":1,"a":"x"}"#);
    }

    #[test]
    fn single_quoted_literals_escape_for_script() {
        let mut out = String::new();
        write_quoted(&mut out, "it's a \"test\"\n", '\'').expect("write to string");
        assert_eq!(out, r#"'it\'s a "test"\n'"#);
    }

    #[test]
    fn control_characters_use_unicode_escapes() {
        assert_eq!(Value::from("\u{1}").to_wire(), r#""\u0001""#);
    }
}
