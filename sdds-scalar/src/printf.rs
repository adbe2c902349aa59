//! printf-style format hints.
//!
//! Definitions may carry a `format_string` such as `%10.4lf` or `%s`. [`FormatSpec`] parses one
//! conversion (with optional literal text around it) and applies it to a [`Value`].

use sdds_error::{SddsResult, sdds_bail, sdds_err};

use crate::Value;

/// Flags of a printf conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatFlags {
    /// `-`: left-justify within the field width.
    pub left: bool,
    /// `+`: always print a sign.
    pub plus: bool,
    /// ` `: print a space where a `+` would go.
    pub space: bool,
    /// `0`: pad numbers with zeros.
    pub zero: bool,
    /// `#`: alternate form.
    pub alternate: bool,
}

/// A parsed printf conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    prefix: String,
    flags: FormatFlags,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
    suffix: String,
}

impl FormatSpec {
    /// Parse a format string holding exactly one conversion.
    pub fn parse(format: &str) -> SddsResult<Self> {
        let mut chars = format.char_indices().peekable();
        let mut prefix = String::new();
        loop {
            match chars.next() {
                Some((_, '%')) if chars.peek().map(|(_, c)| *c) == Some('%') => {
                    chars.next();
                    prefix.push('%');
                }
                Some((_, '%')) => break,
                Some((_, c)) => prefix.push(c),
                None => sdds_bail!("format string \"{}\" has no conversion", format),
            }
        }

        let mut flags = FormatFlags::default();
        while let Some((_, c)) = chars.peek() {
            match c {
                '-' => flags.left = true,
                '+' => flags.plus = true,
                ' ' => flags.space = true,
                '0' => flags.zero = true,
                '#' => flags.alternate = true,
                _ => break,
            }
            chars.next();
        }

        let mut width = None;
        while let Some((_, c)) = chars.peek() {
            let Some(d) = c.to_digit(10) else { break };
            width = Some(width.unwrap_or(0) * 10 + d as usize);
            chars.next();
        }

        let mut precision = None;
        if chars.peek().map(|(_, c)| *c) == Some('.') {
            chars.next();
            let mut p = 0usize;
            while let Some((_, c)) = chars.peek() {
                let Some(d) = c.to_digit(10) else { break };
                p = p * 10 + d as usize;
                chars.next();
            }
            precision = Some(p);
        }

        // Length modifiers carry no meaning once the value is typed.
        while let Some((_, c)) = chars.peek() {
            if matches!(c, 'h' | 'l' | 'L' | 'q' | 'j' | 'z' | 't') {
                chars.next();
            } else {
                break;
            }
        }

        let (idx, conversion) = chars
            .next()
            .ok_or_else(|| sdds_err!("format string \"{}\" ends inside a conversion", format))?;
        if !matches!(
            conversion,
            'd' | 'i' | 'u' | 'o' | 'x' | 'X' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G' | 's' | 'c'
        ) {
            sdds_bail!(
                "format string \"{}\" has unsupported conversion '{}'",
                format,
                conversion
            );
        }
        let suffix = format[idx + conversion.len_utf8()..].replace("%%", "%");
        if suffix.contains('%') {
            sdds_bail!("format string \"{}\" has more than one conversion", format);
        }

        Ok(Self {
            prefix,
            flags,
            width,
            precision,
            conversion,
            suffix,
        })
    }

    /// The conversion character.
    pub fn conversion(&self) -> char {
        self.conversion
    }

    /// Format a value with this conversion.
    pub fn format(&self, value: &Value) -> SddsResult<String> {
        let body = match self.conversion {
            'd' | 'i' => {
                let v = integer_of(value)?;
                self.signed(v < 0, v.unsigned_abs().to_string())
            }
            'u' => match value {
                Value::Long64(v) => (*v as u64).to_string(),
                Value::Long(v) => (*v as u32).to_string(),
                Value::Short(v) => (*v as u16).to_string(),
                other => integer_of(other)?.to_string(),
            },
            'o' => format!("{:o}", integer_of(value)?),
            'x' => format!("{:x}", integer_of(value)?),
            'X' => format!("{:X}", integer_of(value)?),
            'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
                let v = value.as_f64().ok_or_else(
                    || sdds_err!(TypeMismatch: "cannot apply %{} to string", self.conversion),
                )?;
                let p = self.precision.unwrap_or(6);
                let digits = match self.conversion {
                    'e' => format_e(v.abs(), p, false),
                    'E' => format_e(v.abs(), p, true),
                    'f' | 'F' => format_f(v.abs(), p),
                    'g' => format_g(v.abs(), p, self.flags.alternate, false),
                    _ => format_g(v.abs(), p, self.flags.alternate, true),
                };
                self.signed(v.is_sign_negative() && !v.is_nan(), digits)
            }
            's' => {
                let s = match value {
                    Value::String(s) => s.clone(),
                    other => crate::text::format_value(other, None)?,
                };
                match self.precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s,
                }
            }
            _ => match value {
                Value::Character(c) => char::from(*c).to_string(),
                Value::String(s) => s.chars().next().map(String::from).unwrap_or_default(),
                other => char::from(other.as_u8().unwrap_or(b'?')).to_string(),
            },
        };
        Ok(format!("{}{}{}", self.prefix, self.pad(body), self.suffix))
    }

    fn signed(&self, negative: bool, digits: String) -> String {
        let sign = if negative {
            "-"
        } else if self.flags.plus {
            "+"
        } else if self.flags.space {
            " "
        } else {
            ""
        };
        if self.flags.zero && !self.flags.left {
            if let Some(width) = self.width {
                let fill = width.saturating_sub(sign.len() + digits.len());
                return format!("{sign}{}{digits}", "0".repeat(fill));
            }
        }
        format!("{sign}{digits}")
    }

    fn pad(&self, body: String) -> String {
        match self.width {
            Some(w) if body.chars().count() < w => {
                let fill = " ".repeat(w - body.chars().count());
                if self.flags.left {
                    format!("{body}{fill}")
                } else {
                    format!("{fill}{body}")
                }
            }
            _ => body,
        }
    }
}

fn integer_of(value: &Value) -> SddsResult<i128> {
    match value {
        Value::ULong64(v) => Ok(i128::from(*v)),
        Value::String(s) => sdds_bail!(TypeMismatch: "cannot format \"{}\" as an integer", s),
        other => other
            .as_i64()
            .map(i128::from)
            .ok_or_else(|| sdds_err!(ValueOutOfRange: "{:?} is not representable as an integer", other)),
    }
}

fn non_finite(v: f64, upper: bool) -> Option<String> {
    let s = if v.is_nan() {
        "nan"
    } else if v.is_infinite() {
        "inf"
    } else {
        return None;
    };
    Some(if upper { s.to_uppercase() } else { s.to_string() })
}

/// `%.{p}f` of a non-negative value.
pub fn format_f(v: f64, p: usize) -> String {
    non_finite(v, false).unwrap_or_else(|| format!("{v:.p$}"))
}

/// `%.{p}e` of a non-negative value, with the C two-digit signed exponent.
pub fn format_e(v: f64, p: usize, upper: bool) -> String {
    if let Some(s) = non_finite(v, upper) {
        return s;
    }
    let (mantissa, exp) = split_exponent(v, p);
    let e = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{e}{sign}{:02}", exp.unsigned_abs())
}

/// `%.{p}g` of a non-negative value.
pub fn format_g(v: f64, p: usize, alternate: bool, upper: bool) -> String {
    if let Some(s) = non_finite(v, upper) {
        return s;
    }
    let p = p.max(1);
    let (_, exp) = split_exponent(v, p - 1);
    if exp < -4 || exp >= p as i32 {
        let (mantissa, exp) = split_exponent(v, p - 1);
        let mantissa = if alternate {
            mantissa
        } else {
            trim_fraction(&mantissa)
        };
        let e = if upper { 'E' } else { 'e' };
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}{e}{sign}{:02}", exp.unsigned_abs())
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        let s = format!("{v:.decimals$}");
        if alternate { s } else { trim_fraction(&s) }
    }
}

fn split_exponent(v: f64, p: usize) -> (String, i32) {
    let s = format!("{v:.p$e}");
    match s.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse().unwrap_or(0)),
        None => (s, 0),
    }
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("%d", Value::Long(-42), "-42")]
    #[case("%5ld", Value::Long(42), "   42")]
    #[case("%-5d|", Value::Long(42), "42   |")]
    #[case("%05d", Value::Long(-42), "-0042")]
    #[case("%+d", Value::Short(3), "+3")]
    #[case("%x", Value::Long(255), "ff")]
    #[case("%10.4lf", Value::Double(3.14159265), "    3.1416")]
    #[case("%le", Value::Double(12345.678), "1.234568e+04")]
    #[case("%.2E", Value::Double(-0.000123), "-1.23E-04")]
    #[case("%g", Value::Double(0.0001), "0.0001")]
    #[case("%g", Value::Double(0.00001), "1e-05")]
    #[case("%g", Value::Double(123456789.0), "1.23457e+08")]
    #[case("%.15g", Value::Double(0.1), "0.1")]
    #[case("%#.3g", Value::Double(1.0), "1.00")]
    #[case("%s", Value::from("abc"), "abc")]
    #[case("[%.2s]", Value::from("abc"), "[ab]")]
    #[case("%c", Value::Character(b'z'), "z")]
    #[case("%f", Value::Double(f64::NAN), "nan")]
    #[case("%g", Value::Double(f64::NEG_INFINITY), "-inf")]
    #[case("100%% %d", Value::Long(1), "100% 1")]
    fn formats(#[case] format: &str, #[case] value: Value, #[case] expected: &str) {
        assert_eq!(FormatSpec::parse(format).unwrap().format(&value).unwrap(), expected);
    }

    #[rstest]
    #[case("no conversion")]
    #[case("%")]
    #[case("%k")]
    #[case("%d %d")]
    fn rejects(#[case] format: &str) {
        assert!(FormatSpec::parse(format).is_err());
    }
}
