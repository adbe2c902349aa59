//! The ASCII representation of values.
//!
//! Numeric tokens are decimal with optional sign and exponent. Character tokens are a single byte
//! or a backslash escape. String tokens are either runs of non-whitespace or double-quoted
//! sequences, and backslash escapes are interpreted in both forms.

use sdds_dtype::SddsType;
use sdds_error::{SddsResult, sdds_bail, sdds_err};

use crate::Value;
use crate::printf::{FormatSpec, format_g};

/// Parse one token as a value of type `ty`.
pub fn parse_value(ty: SddsType, token: &str) -> SddsResult<Value> {
    let t = token.trim();
    match ty {
        SddsType::String => Ok(Value::String(unescape(token))),
        SddsType::Character => parse_character(token).map(Value::Character),
        SddsType::Float | SddsType::Double | SddsType::LongDouble => {
            let v = parse_f64(t).ok_or_else(
                || sdds_err!(TypeMismatch: "\"{}\" is not a valid {} value", token, ty),
            )?;
            Value::Double(v).cast(ty)
        }
        _ => {
            if let Ok(v) = t.trim_start_matches('+').parse::<i128>() {
                return integer_value(ty, v);
            }
            // Integer columns written by other tools occasionally carry a `.0` or an exponent.
            match parse_f64(t) {
                Some(v) if v.fract() == 0.0 => Value::Double(v).cast(ty),
                _ => sdds_bail!(TypeMismatch: "\"{}\" is not a valid {} value", token, ty),
            }
        }
    }
}

fn integer_value(ty: SddsType, v: i128) -> SddsResult<Value> {
    let out_of_range = || sdds_err!(ValueOutOfRange: "{} does not fit in type {}", v, ty);
    Ok(match ty {
        SddsType::Short => Value::Short(i16::try_from(v).map_err(|_| out_of_range())?),
        SddsType::UShort => Value::UShort(u16::try_from(v).map_err(|_| out_of_range())?),
        SddsType::Long => Value::Long(i32::try_from(v).map_err(|_| out_of_range())?),
        SddsType::ULong => Value::ULong(u32::try_from(v).map_err(|_| out_of_range())?),
        SddsType::Long64 => Value::Long64(i64::try_from(v).map_err(|_| out_of_range())?),
        SddsType::ULong64 => Value::ULong64(u64::try_from(v).map_err(|_| out_of_range())?),
        other => sdds_bail!(InvalidType: "{} is not an integer type", other),
    })
}

/// Parse a decimal float, accepting the C spellings of infinities and NaN.
pub fn parse_f64(token: &str) -> Option<f64> {
    let t = token.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok().or_else(|| {
        // C's %lf accepts a trailing 'd'/'D' exponent marker from Fortran output.
        let replaced = t.replace(['d', 'D'], "e");
        replaced.parse::<f64>().ok()
    })
}

fn parse_character(token: &str) -> SddsResult<u8> {
    let bytes = unescape_bytes(token.trim());
    match bytes.as_slice() {
        [] => Ok(0),
        [c] => Ok(*c),
        _ => {
            // A lone Latin-1 character that arrived as UTF-8.
            let mut chars = std::str::from_utf8(&bytes).ok().into_iter().flat_map(str::chars);
            match (chars.next().map(u32::from), chars.next()) {
                (Some(code), None) => u8::try_from(code).map_err(|_| {
                    sdds_err!(TypeMismatch: "\"{}\" is not a single character", token)
                }),
                _ => sdds_bail!(TypeMismatch: "\"{}\" is not a single character", token),
            }
        }
    }
}

/// Format a value using a printf hint, or the type's default when `hint` is `None`.
///
/// Without a hint doubles use 15 significant digits, floats 8 and long doubles 18. When that
/// loses information the value is written with enough digits to read back exactly.
pub fn format_value(value: &Value, hint: Option<&str>) -> SddsResult<String> {
    if let Some(hint) = hint.filter(|h| !h.trim().is_empty()) {
        return FormatSpec::parse(hint)?.format(value);
    }
    Ok(match value {
        Value::Short(v) => v.to_string(),
        Value::UShort(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::ULong(v) => v.to_string(),
        Value::Long64(v) => v.to_string(),
        Value::ULong64(v) => v.to_string(),
        Value::Float(v) => {
            let short = signed_g(f64::from(*v), 8);
            if short.parse::<f32>().ok() == Some(*v) || v.is_nan() {
                short
            } else {
                signed_g(f64::from(*v), 9)
            }
        }
        Value::Double(v) => {
            let short = signed_g(*v, 15);
            if short.parse::<f64>().ok() == Some(*v) || v.is_nan() {
                short
            } else {
                signed_g(*v, 17)
            }
        }
        Value::LongDouble(v) => signed_g(*v, 18),
        Value::Character(c) => escape_character(*c),
        Value::String(s) => s.clone(),
    })
}

fn signed_g(v: f64, precision: usize) -> String {
    let digits = format_g(v.abs(), precision, false, false);
    if v.is_sign_negative() && !v.is_nan() {
        format!("-{digits}")
    } else {
        digits
    }
}

/// Format a value for an ASCII data line, quoting strings that would not survive tokenizing.
///
/// Characters ignore the hint so that every byte reads back as itself.
pub fn format_token(value: &Value, hint: Option<&str>) -> SddsResult<String> {
    Ok(match value {
        Value::String(_) => quote(&format_value(value, hint)?),
        // A bare `!` at the start of a data line would read as a comment.
        Value::Character(b'!') => "\"!\"".to_string(),
        Value::Character(c) => escape_character(*c),
        _ => format_value(value, hint)?,
    })
}

fn escape_character(c: u8) -> String {
    match c {
        b'\\' => "\\\\".to_string(),
        b'"' => "\\\"".to_string(),
        c if c.is_ascii_graphic() => char::from(c).to_string(),
        c => format!("\\{c:03o}"),
    }
}

/// Quote a string if it is empty, contains whitespace or quotes, or starts with a comment marker.
/// Backslashes and quotes are escaped in every case.
pub fn quote(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    if s.is_empty() || s.starts_with('!') || s.chars().any(|c| c.is_whitespace() || c == '"') {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

/// Interpret backslash escapes, dropping the surrounding quotes of a quoted token.
///
/// Octal escapes may produce bytes that are not UTF-8 on their own; see [`decode_text`].
pub fn unescape(token: &str) -> String {
    decode_text(unescape_bytes(token))
}

/// Interpret backslash escapes as raw bytes, dropping the surrounding quotes of a quoted token.
pub fn unescape_bytes(token: &str) -> Vec<u8> {
    let inner = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .filter(|_| token.len() >= 2)
        .unwrap_or(token);
    let mut out = Vec::with_capacity(inner.len());
    let mut bytes = inner.bytes().peekable();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b't') => out.push(b'\t'),
            Some(b'r') => out.push(b'\r'),
            Some(b'b') => out.push(0x08),
            Some(b'f') => out.push(0x0c),
            Some(b'v') => out.push(0x0b),
            Some(b'a') => out.push(0x07),
            Some(d @ b'0'..=b'7') => {
                let mut code = u32::from(d - b'0');
                for _ in 0..2 {
                    match bytes.next_if(|c| (b'0'..=b'7').contains(c)) {
                        Some(next) => code = code * 8 + u32::from(next - b'0'),
                        None => break,
                    }
                }
                out.push((code & 0xff) as u8);
            }
            Some(other) => out.push(other),
            None => out.push(b'\\'),
        }
    }
    out
}

/// Text from bytes: UTF-8 when valid, otherwise one Latin-1 character per byte.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

/// Splits a line of ASCII data into tokens, keeping quoted strings whole.
pub struct Tokenizer<'a> {
    rest: &'a str,
}

impl<'a> Tokenizer<'a> {
    /// Tokenize `line`.
    pub fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    /// The untokenized remainder of the line.
    pub fn remainder(&self) -> &'a str {
        self.rest
    }

    /// The next raw token, quotes and escapes intact.
    pub fn next_raw(&mut self) -> Option<&'a str> {
        let s = self.rest.trim_start();
        if s.is_empty() {
            self.rest = s;
            return None;
        }
        let end = if s.starts_with('"') {
            let mut escaped = false;
            let mut end = s.len();
            for (i, c) in s.char_indices().skip(1) {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    end = i + 1;
                    break;
                }
            }
            end
        } else {
            s.find(char::is_whitespace).unwrap_or(s.len())
        };
        let (token, rest) = s.split_at(end);
        self.rest = rest;
        Some(token)
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_raw().map(unescape)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    #[rstest]
    #[case(SddsType::Double, "1.5e3", Value::Double(1500.0))]
    #[case(SddsType::Double, "-inf", Value::Double(f64::NEG_INFINITY))]
    #[case(SddsType::Double, "2.0D-3", Value::Double(0.002))]
    #[case(SddsType::Float, "0.25", Value::Float(0.25))]
    #[case(SddsType::Long, "+17", Value::Long(17))]
    #[case(SddsType::Short, "-3", Value::Short(-3))]
    #[case(SddsType::ULong64, "18446744073709551615", Value::ULong64(u64::MAX))]
    #[case(SddsType::Long, "4.0", Value::Long(4))]
    #[case(SddsType::Character, "x", Value::Character(b'x'))]
    #[case(SddsType::Character, "\\n", Value::Character(b'\n'))]
    #[case(SddsType::Character, "\\101", Value::Character(b'A'))]
    #[case(SddsType::Character, "\\351", Value::Character(0xe9))]
    #[case(SddsType::Character, "\"!\"", Value::Character(b'!'))]
    #[case(SddsType::Character, "\u{e9}", Value::Character(0xe9))]
    #[case(SddsType::String, "\"a b\"", Value::from("a b"))]
    #[case(SddsType::String, "\"say \\\"hi\\\"\"", Value::from("say \"hi\""))]
    #[case(SddsType::String, "plain", Value::from("plain"))]
    fn parses(#[case] ty: SddsType, #[case] token: &str, #[case] expected: Value) {
        assert_eq!(parse_value(ty, token).unwrap(), expected);
    }

    #[rstest]
    #[case(SddsType::Long, "abc", ErrorKind::TypeMismatch)]
    #[case(SddsType::Short, "40000", ErrorKind::ValueOutOfRange)]
    #[case(SddsType::UShort, "-1", ErrorKind::ValueOutOfRange)]
    #[case(SddsType::Character, "ab", ErrorKind::TypeMismatch)]
    #[case(SddsType::Character, "\u{263a}", ErrorKind::TypeMismatch)]
    #[case(SddsType::Long, "1.5", ErrorKind::TypeMismatch)]
    fn parse_failures(#[case] ty: SddsType, #[case] token: &str, #[case] kind: ErrorKind) {
        assert_eq!(parse_value(ty, token).unwrap_err().kind(), kind);
    }

    #[rstest]
    #[case(Value::Double(1.0), "1")]
    #[case(Value::Double(0.1), "0.1")]
    #[case(Value::Double(-2.5e-10), "-2.5e-10")]
    #[case(Value::Double(1.0 / 3.0), "0.33333333333333331")]
    #[case(Value::Float(0.1), "0.1")]
    #[case(Value::Long64(-9), "-9")]
    #[case(Value::Character(b' '), "\\040")]
    fn default_formats(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(format_value(&value, None).unwrap(), expected);
    }

    #[test]
    fn hint_overrides_default() {
        assert_eq!(
            format_value(&Value::Double(1.0 / 3.0), Some("%.3f")).unwrap(),
            "0.333"
        );
    }

    #[rstest]
    #[case("abc", "abc")]
    #[case("", "\"\"")]
    #[case("a b", "\"a b\"")]
    #[case("!x", "\"!x\"")]
    #[case("a\\b", "a\\\\b")]
    fn quoting(#[case] raw: &str, #[case] quoted: &str) {
        assert_eq!(quote(raw), quoted);
        assert_eq!(unescape(quoted), raw);
    }

    #[test]
    fn every_character_reads_back() {
        for c in 0..=u8::MAX {
            let token = format_token(&Value::Character(c), Some("%c")).unwrap();
            assert!(!token.starts_with('!'), "{token}");
            let raw = Tokenizer::new(&token).next_raw().unwrap();
            assert_eq!(parse_value(SddsType::Character, raw).unwrap(), Value::Character(c));
        }
    }

    #[test]
    fn octal_escapes_are_bytes() {
        assert_eq!(unescape_bytes("\\351a\\0"), vec![0xe9, b'a', 0]);
        assert_eq!(unescape("\\303\\251"), "\u{e9}");
        assert_eq!(unescape("\\351"), "\u{e9}");
    }

    #[test]
    fn tokenizer_keeps_quoted_strings() {
        let tokens: Vec<String> = Tokenizer::new("  1 \"two words\" x\\ty \"\" 3 ").collect();
        assert_eq!(tokens, vec!["1", "two words", "x\ty", "", "3"]);
    }

    #[test]
    fn tokenizer_remainder() {
        let mut t = Tokenizer::new("5 rest of line");
        assert_eq!(t.next_raw(), Some("5"));
        assert_eq!(t.remainder().trim(), "rest of line");
    }

    mod props {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn double_text_round_trip(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
                let s = format_value(&Value::Double(v), None).unwrap();
                prop_assert_eq!(parse_value(SddsType::Double, &s).unwrap(), Value::Double(v));
            }

            #[test]
            fn string_token_round_trip(s in any::<String>()) {
                let token = format_token(&Value::String(s.clone()), None).unwrap();
                prop_assert!(!token.starts_with('!'));
                let tokens: Vec<String> = Tokenizer::new(&token).collect();
                prop_assert_eq!(tokens, vec![s]);
            }

            #[test]
            fn printable_token_round_trip(s in "[!\"]?[ -~\\t]{0,16}") {
                let quoted = quote(&s);
                let tokens: Vec<String> = Tokenizer::new(&quoted).collect();
                prop_assert_eq!(tokens, vec![s]);
            }
        }
    }
}
