//! The header syntax.
//!
//! A stream opens with a `SDDSn` version line followed by `&keyword name=value, ... &end`
//! directives, one per logical line. The `&data` directive ends the header. Lines starting with
//! `!` are comments, except that `!# little-endian` and `!# big-endian` declare the byte order of
//! binary pages.

use std::io::{BufRead, Write};

use log::{debug, trace};
use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_scalar::text::{decode_text, quote, unescape};

use crate::{
    ArrayDefinition, AssociateDefinition, ColumnDefinition, DataMode, Definition, Encoding,
    Endianness, Layout, MajorOrder, ParameterDefinition,
};

/// Write the header of `layout`, ending with the `&data` directive.
pub fn write_header<W: Write>(layout: &Layout, out: &mut W) -> SddsResult<()> {
    let mode = &layout.data_mode;
    writeln!(out, "SDDS{}", layout.version)?;
    if mode.encoding == Encoding::Binary {
        writeln!(out, "!# {}", mode.endianness_or_native())?;
    }
    if layout.description.is_some() || layout.contents.is_some() {
        write!(out, "&description ")?;
        if let Some(text) = &layout.description {
            write!(out, "text={}, ", namelist_value(text))?;
        }
        if let Some(contents) = &layout.contents {
            write!(out, "contents={}, ", namelist_value(contents))?;
        }
        writeln!(out, "&end")?;
    }
    for def in layout.parameters().iter() {
        write_directive(out, def)?;
    }
    for def in layout.arrays().iter() {
        write_directive(out, def)?;
    }
    for def in layout.columns().iter() {
        write_directive(out, def)?;
    }
    for def in layout.associates().iter() {
        write_directive(out, def)?;
    }

    write!(out, "&data mode={}, ", mode.encoding.keyword())?;
    if mode.encoding == Encoding::Ascii {
        if mode.lines_per_row > 1 {
            write!(out, "lines_per_row={}, ", mode.lines_per_row)?;
        }
        if mode.no_row_counts {
            write!(out, "no_row_counts=1, ")?;
        }
    }
    if mode.major_order == MajorOrder::Column {
        write!(out, "column_major_order=1, ")?;
    }
    if mode.encoding == Encoding::Binary {
        write!(out, "endian={}, ", mode.endianness_or_native().keyword())?;
    }
    writeln!(out, "&end")?;
    Ok(())
}

fn write_directive<W: Write, D: Definition>(out: &mut W, def: &D) -> SddsResult<()> {
    write!(out, "&{} ", D::KIND.keyword())?;
    for (field, value) in def.header_fields() {
        write!(out, "{}={}, ", field.attribute(), namelist_value(&value))?;
    }
    writeln!(out, "&end")?;
    Ok(())
}

/// Quote a namelist value when it would otherwise be split or misread.
fn namelist_value(value: &str) -> String {
    let quoted = quote(value);
    if !quoted.starts_with('"') && value.contains([',', '&', '=']) {
        format!("\"{quoted}\"")
    } else {
        quoted
    }
}

/// Read a header, leaving `input` positioned at the first byte of page data.
///
/// The returned layout is frozen.
pub fn read_header<R: BufRead>(input: &mut R) -> SddsResult<Layout> {
    let mut lines = LineReader { input, number: 0 };
    let first = lines
        .next_line()?
        .ok_or_else(|| sdds_err!(UnexpectedEof: "empty stream"))?;
    let version = first
        .trim()
        .strip_prefix("SDDS")
        .and_then(|v| v.trim().parse::<u32>().ok())
        .ok_or_else(|| sdds_err!(MalformedHeader: "not an SDDS stream: {:?}", first.trim()))?;

    let mut layout = Layout::new();
    layout.version = version;
    let mut declared_endianness = None;

    loop {
        let Some(line) = lines.next_line()? else {
            sdds_bail!(MalformedHeader: "header ended without a &data directive");
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('!') {
            if let Some(declared) = comment.strip_prefix('#') {
                if let Ok(e) = declared.trim().parse::<Endianness>() {
                    debug!("header declares {}", e);
                    declared_endianness = Some(e);
                }
            }
            continue;
        }
        if !trimmed.starts_with('&') {
            sdds_bail!(
                MalformedHeader: "line {}: expected a directive, found {:?}",
                lines.number,
                trimmed
            );
        }

        let mut directive = trimmed.to_string();
        while !is_terminated(&directive) {
            match lines.next_line()? {
                Some(more) => {
                    directive.push(' ');
                    directive.push_str(more.trim());
                }
                None => sdds_bail!(MalformedHeader: "unterminated directive {:?}", directive),
            }
        }
        let at = lines.number;
        let (keyword, fields) = parse_directive(&directive)
            .map_err(|e| sdds_err!(MalformedHeader: "line {}: {}", at, e))?;
        trace!("header directive &{} {:?}", keyword, fields);
        let pairs = || fields.iter().map(|(k, v)| (k.as_str(), v.as_str()));
        let result = match keyword.as_str() {
            "description" => {
                for (key, value) in pairs() {
                    match key {
                        "text" => layout.description = Some(value.to_string()),
                        "contents" => layout.contents = Some(value.to_string()),
                        _ => {}
                    }
                }
                Ok(())
            }
            "parameter" => ParameterDefinition::from_fields(pairs())
                .and_then(|d| layout.define_parameter(d))
                .map(drop),
            "array" => ArrayDefinition::from_fields(pairs())
                .and_then(|d| layout.define_array(d))
                .map(drop),
            "column" => ColumnDefinition::from_fields(pairs())
                .and_then(|d| layout.define_column(d))
                .map(drop),
            "associate" => AssociateDefinition::from_fields(pairs())
                .and_then(|d| layout.define_associate(d))
                .map(drop),
            "data" => {
                let mode = parse_data_mode(pairs())
                    .map_err(|e| sdds_err!(MalformedHeader: "line {}: {}", at, e))?;
                layout.data_mode = DataMode {
                    endianness: mode.endianness.or(declared_endianness),
                    ..mode
                };
                break;
            }
            "include" => sdds_bail!(MalformedHeader: "line {}: &include is not supported", at),
            other => sdds_bail!(MalformedHeader: "line {}: unknown directive &{}", at, other),
        };
        result.map_err(|e| sdds_err!(MalformedHeader: "line {}: {}", at, e))?;
    }

    for _ in 0..layout.data_mode.additional_header_lines {
        lines.next_line()?;
    }
    layout.freeze();
    Ok(layout)
}

fn parse_data_mode<'a>(fields: impl Iterator<Item = (&'a str, &'a str)>) -> SddsResult<DataMode> {
    let mut mode = DataMode::default();
    let flag = |v: &str| -> SddsResult<bool> {
        v.trim()
            .parse::<i64>()
            .map(|n| n != 0)
            .map_err(|_| sdds_err!("expected 0 or 1, found {:?}", v))
    };
    let count = |v: &str| -> SddsResult<usize> {
        v.trim()
            .parse::<usize>()
            .map_err(|_| sdds_err!("expected a count, found {:?}", v))
    };
    for (key, value) in fields {
        match key {
            "mode" => mode.encoding = value.parse()?,
            "major_order" => mode.major_order = value.parse()?,
            "column_major_order" => {
                mode.major_order = if flag(value)? {
                    MajorOrder::Column
                } else {
                    MajorOrder::Row
                }
            }
            "endian" => mode.endianness = Some(value.parse()?),
            "lines_per_row" => mode.lines_per_row = count(value)?.max(1),
            "no_row_counts" => mode.no_row_counts = flag(value)?,
            "additional_header_lines" => mode.additional_header_lines = count(value)?,
            other => debug!("ignoring &data attribute {}", other),
        }
    }
    Ok(mode)
}

struct LineReader<'a, R> {
    input: &'a mut R,
    number: usize,
}

impl<R: BufRead> LineReader<'_, R> {
    fn next_line(&mut self) -> SddsResult<Option<String>> {
        let mut buf = Vec::new();
        if self.input.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        self.number += 1;
        Ok(Some(decode_text(buf)))
    }
}

/// True if `text` contains `&end` outside of quotes.
fn is_terminated(text: &str) -> bool {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '&' if !in_quotes && i > 0 && text[i..].starts_with("&end") => return true,
            _ => {}
        }
    }
    false
}

/// Split `&keyword a=1, b="x y" &end` into its keyword and attribute pairs.
fn parse_directive(text: &str) -> SddsResult<(String, Vec<(String, String)>)> {
    let body = text
        .strip_prefix('&')
        .ok_or_else(|| sdds_err!("directive must start with '&'"))?;
    let keyword_end = body
        .find(|c: char| c.is_whitespace() || c == ',')
        .unwrap_or(body.len());
    let keyword = body[..keyword_end].to_ascii_lowercase();
    let mut rest = &body[keyword_end..];
    let mut fields = Vec::new();

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            sdds_bail!("missing &end");
        }
        if rest.starts_with("&end") {
            break;
        }
        let eq = rest
            .find('=')
            .ok_or_else(|| sdds_err!("expected name=value near {:?}", rest))?;
        let key = rest[..eq].trim().to_ascii_lowercase();
        if key.is_empty() || key.contains(char::is_whitespace) {
            sdds_bail!("invalid attribute name {:?}", &rest[..eq]);
        }
        rest = rest[eq + 1..].trim_start();
        let (raw, tail) = if rest.starts_with('"') {
            let mut escaped = false;
            let mut end = None;
            for (i, c) in rest.char_indices().skip(1) {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    end = Some(i + 1);
                    break;
                }
            }
            let end = end.ok_or_else(|| sdds_err!("unterminated quote in {}", key))?;
            rest.split_at(end)
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == ',' || c == '&')
                .unwrap_or(rest.len());
            rest.split_at(end)
        };
        fields.push((key, unescape(raw)));
        rest = tail;
    }
    Ok((keyword, fields))
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor, Read};

    use rstest::rstest;
    use sdds_dtype::SddsType;
    use sdds_error::ErrorKind;

    use super::*;

    fn sample() -> Layout {
        let mut layout = Layout::new();
        layout.description = Some("test data, with comma".to_string());
        layout
            .define_parameter(
                ParameterDefinition::new("p", SddsType::String).fixed_value("hello world"),
            )
            .unwrap();
        layout
            .define_parameter(ParameterDefinition::new("q", SddsType::Long).units("m/s"))
            .unwrap();
        layout
            .define_array(ArrayDefinition::new("grid", SddsType::Float, 2).group_name("g"))
            .unwrap();
        layout
            .define_column(
                ColumnDefinition::new("x", SddsType::Double)
                    .description("a \"quoted\" word")
                    .format_string("%10.3e"),
            )
            .unwrap();
        layout
            .define_associate(AssociateDefinition::new("assoc").filename("other.sdds"))
            .unwrap();
        layout.data_mode = DataMode {
            endianness: Some(Endianness::Big),
            major_order: MajorOrder::Column,
            ..DataMode::binary()
        };
        layout
    }

    #[test]
    fn header_round_trips() {
        let layout = sample();
        let mut buf = Vec::new();
        write_header(&layout, &mut buf).unwrap();
        buf.extend_from_slice(b"\x01\x02");

        let mut reader = BufReader::new(Cursor::new(buf));
        let read = read_header(&mut reader).unwrap();
        assert!(read.is_frozen());
        assert_eq!(read.description, layout.description);
        assert_eq!(read.data_mode, layout.data_mode);
        assert_eq!(
            read.parameters().iter().collect::<Vec<_>>(),
            layout.parameters().iter().collect::<Vec<_>>()
        );
        assert_eq!(
            read.columns().get_by_name("x").unwrap(),
            layout.columns().get_by_name("x").unwrap()
        );
        assert_eq!(
            read.arrays().get_by_name("grid").unwrap().dimensions,
            2
        );
        assert_eq!(read.associates().len(), 1);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"\x01\x02");
    }

    #[test]
    fn reads_legacy_header() {
        let text = "SDDS1\n\
            ! a comment\n\
            !# little-endian\n\
            &column name=a, type=long,\n  units=s, &end\n\
            &column name=b type=string &end\n\
            &data mode=ascii, no_row_counts=1, additional_header_lines=1, &end\n\
            skipped line\n\
            rest";
        let mut reader = Cursor::new(text.as_bytes());
        let layout = read_header(&mut reader).unwrap();
        assert_eq!(layout.version, 1);
        assert_eq!(layout.columns().names(), vec!["a", "b"]);
        assert_eq!(layout.column_type("b").unwrap(), SddsType::String);
        assert_eq!(layout.data_mode.encoding, Encoding::Ascii);
        assert!(layout.data_mode.no_row_counts);
        assert_eq!(layout.data_mode.endianness, Some(Endianness::Little));
        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "rest");
    }

    #[rstest]
    #[case("", ErrorKind::UnexpectedEof)]
    #[case("hello\n", ErrorKind::MalformedHeader)]
    #[case("SDDS5\n&column name=a, type=double, &end\n", ErrorKind::MalformedHeader)]
    #[case("SDDS5\n&column name=a, type=quad, &end\n&data mode=ascii &end\n", ErrorKind::MalformedHeader)]
    #[case("SDDS5\n&column name=a, &end\n&column name=a, &end\n&data mode=ascii &end\n", ErrorKind::MalformedHeader)]
    #[case("SDDS5\n&bogus a=1 &end\n", ErrorKind::MalformedHeader)]
    #[case("SDDS5\n&column name=\"a, &end\n", ErrorKind::MalformedHeader)]
    fn header_errors(#[case] text: &str, #[case] kind: ErrorKind) {
        let err = read_header(&mut Cursor::new(text.as_bytes())).unwrap_err();
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn directive_values() {
        let (kw, fields) =
            parse_directive(r#"&Column name=x, units="m s", description="a \"b\"", &end"#).unwrap();
        assert_eq!(kw, "column");
        assert_eq!(
            fields,
            vec![
                ("name".to_string(), "x".to_string()),
                ("units".to_string(), "m s".to_string()),
                ("description".to_string(), "a \"b\"".to_string()),
            ]
        );
    }

    #[test]
    fn ampersand_in_quotes_does_not_terminate() {
        assert!(!is_terminated(r#"&column name="a &end b""#));
        assert!(is_terminated(r#"&column name="a &end b" &end"#));
    }
}
