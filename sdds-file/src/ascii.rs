//! ASCII page encoding.
//!
//! Each page opens with a `! page number N` comment. Parameters without a fixed value follow one
//! per line, then each array as a line of extents followed by its elements, then the row count
//! and the rows. Row-major pages put one row per line (or spread it over `lines_per_row` lines);
//! column-major pages write each column as its own run of values. With `no_row_counts` the count
//! is omitted and a blank line ends the rows.

use std::io::{BufRead, Write};

use log::trace;
use sdds_dtype::SddsType;
use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_layout::{Layout, MajorOrder};
use sdds_scalar::text::{Tokenizer, decode_text, format_token, parse_value};
use sdds_scalar::{ColumnValues, Value};

use crate::page::{ArrayValue, Page};

/// Default width at which array and column-major value runs wrap.
pub const DEFAULT_LINE_LIMIT: usize = 1024;

/// Options of the ASCII writer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AsciiStyle {
    pub line_limit: usize,
}

fn column_token(
    layout: &Layout,
    page: &Page,
    column: usize,
    row: usize,
) -> SddsResult<String> {
    let hint = layout
        .columns()
        .get(column)
        .and_then(|d| d.format_string.as_deref());
    format_token(&page.value(column, row)?, hint)
}

/// Writes `tokens` separated by spaces, starting new lines past `limit` characters.
fn write_wrapped<W: Write>(out: &mut W, tokens: &[String], limit: usize) -> SddsResult<()> {
    let mut width = 0;
    for token in tokens {
        if width > 0 && width + 1 + token.len() > limit {
            writeln!(out)?;
            width = 0;
        }
        if width > 0 {
            write!(out, " ")?;
            width += 1;
        }
        write!(out, "{token}")?;
        width += token.len();
    }
    writeln!(out)?;
    Ok(())
}

/// Write the rows of interest of `page`.
pub(crate) fn write_page<W: Write>(
    out: &mut W,
    layout: &Layout,
    page: &Page,
    number: usize,
    style: AsciiStyle,
) -> SddsResult<()> {
    let mode = &layout.data_mode;
    writeln!(out, "! page number {number}")?;

    for (index, def) in layout.stored_parameters() {
        let value = page.parameter(index)?;
        writeln!(out, "{}", format_token(value, def.format_string.as_deref())?)?;
    }

    for (def, array) in layout.arrays().iter().zip(page.arrays()) {
        let extents: Vec<String> = array.dimensions.iter().map(ToString::to_string).collect();
        writeln!(out, "{}", extents.join(" "))?;
        let tokens = (0..array.values.len())
            .map(|i| {
                let v = array
                    .values
                    .get(i)
                    .ok_or_else(|| sdds_err!(ValueOutOfRange: "array element {}", i))?;
                format_token(&v, def.format_string.as_deref())
            })
            .collect::<SddsResult<Vec<_>>>()?;
        if !tokens.is_empty() {
            write_wrapped(out, &tokens, style.line_limit)?;
        }
    }

    if layout.columns().is_empty() {
        return Ok(());
    }
    let rows = page.rows_of_interest();
    if !mode.no_row_counts {
        writeln!(out, "{}", rows.len())?;
    }
    match mode.major_order {
        MajorOrder::Row => {
            let columns = layout.columns().len();
            let per_line = columns.div_ceil(mode.lines_per_row.max(1)).max(1);
            for &row in &rows {
                let tokens = (0..columns)
                    .map(|c| column_token(layout, page, c, row))
                    .collect::<SddsResult<Vec<_>>>()?;
                for chunk in tokens.chunks(per_line) {
                    writeln!(out, "{}", chunk.join(" "))?;
                }
            }
        }
        MajorOrder::Column => {
            for column in 0..layout.columns().len() {
                let tokens = rows
                    .iter()
                    .map(|&row| column_token(layout, page, column, row))
                    .collect::<SddsResult<Vec<_>>>()?;
                if !tokens.is_empty() {
                    write_wrapped(out, &tokens, style.line_limit)?;
                }
            }
        }
    }
    if mode.no_row_counts {
        writeln!(out)?;
    }
    Ok(())
}

/// Line-aware token source over ASCII page data. Comment lines are skipped.
struct Tokens<'a, R> {
    input: &'a mut R,
    pending: String,
    // `pending` is a whole line nothing has been taken from yet.
    fresh: bool,
}

impl<'a, R: BufRead> Tokens<'a, R> {
    fn new(input: &'a mut R) -> Self {
        Self {
            input,
            pending: String::new(),
            fresh: false,
        }
    }

    /// The next line, comments included. `None` at end of input.
    fn any_line(&mut self) -> SddsResult<Option<String>> {
        let mut buf = Vec::new();
        if self.input.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        let line = decode_text(buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// The next line that is not a comment.
    fn raw_line(&mut self) -> SddsResult<Option<String>> {
        loop {
            match self.any_line()? {
                Some(line) if line.starts_with('!') => continue,
                other => return Ok(other),
            }
        }
    }

    /// The next non-blank line. Any unread remainder of the current line is discarded.
    fn line(&mut self) -> SddsResult<Option<String>> {
        let carried = std::mem::take(&mut self.pending);
        if self.fresh && !carried.trim().is_empty() {
            self.fresh = false;
            return Ok(Some(carried));
        }
        self.fresh = false;
        loop {
            match self.raw_line()? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(line)),
            }
        }
    }

    /// The next raw token, reading further lines as needed.
    fn token(&mut self) -> SddsResult<Option<String>> {
        loop {
            let mut tokenizer = Tokenizer::new(&self.pending);
            if let Some(token) = tokenizer.next_raw() {
                let token = token.to_string();
                self.pending = tokenizer.remainder().to_string();
                self.fresh = false;
                return Ok(Some(token));
            }
            match self.raw_line()? {
                Some(line) => {
                    self.pending = line;
                    self.fresh = true;
                }
                None => return Ok(None),
            }
        }
    }

    fn require_token(&mut self, what: &str) -> SddsResult<String> {
        self.token()?
            .ok_or_else(|| sdds_err!(TruncatedPage: "page ended while reading {}", what))
    }

    /// Load the next line if the current one is used up. False at end of input.
    fn has_more(&mut self) -> SddsResult<bool> {
        if !self.pending.trim().is_empty() || self.fresh {
            return Ok(true);
        }
        match self.raw_line()? {
            Some(line) => {
                self.pending = line;
                self.fresh = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// True, consuming the line, when the next unread line is blank or missing.
    fn at_blank_line(&mut self) -> SddsResult<bool> {
        if !self.has_more()? {
            return Ok(true);
        }
        if self.pending.trim().is_empty() {
            self.pending.clear();
            self.fresh = false;
            return Ok(true);
        }
        Ok(false)
    }
}

fn parse_parameter(ty: SddsType, line: &str) -> SddsResult<Value> {
    let trimmed = line.trim();
    if ty == SddsType::String {
        if trimmed.starts_with('"') {
            let token = Tokenizer::new(trimmed).next_raw().unwrap_or_default();
            return parse_value(ty, token);
        }
        return parse_value(ty, trimmed);
    }
    let token = Tokenizer::new(trimmed)
        .next_raw()
        .ok_or_else(|| sdds_err!(TruncatedPage: "missing parameter value"))?;
    parse_value(ty, token)
}

fn read_values<R: BufRead>(
    tokens: &mut Tokens<'_, R>,
    ty: SddsType,
    count: usize,
    what: &str,
) -> SddsResult<ColumnValues> {
    let mut values = ColumnValues::new(ty);
    values.try_reserve(count)?;
    for _ in 0..count {
        let token = tokens.require_token(what)?;
        values.push(&parse_value(ty, &token)?)?;
    }
    Ok(values)
}

/// Decode the next page. `None` at a clean end of stream.
pub(crate) fn read_page<R: BufRead>(input: &mut R, layout: &Layout) -> SddsResult<Option<Page>> {
    let mode = &layout.data_mode;
    let mut tokens = Tokens::new(input);
    let stored = layout.stored_parameters().count();
    let has_data = stored > 0 || !layout.arrays().is_empty() || !layout.columns().is_empty();

    if !has_data {
        // Nothing but the page marker identifies a page.
        loop {
            match tokens.any_line()? {
                None => return Ok(None),
                Some(line) if is_page_marker(&line) => break,
                Some(_) => {}
            }
        }
        let parameters = parameters_with_fixed(layout, Vec::new())?;
        return Page::from_parts(parameters, Vec::new(), Vec::new(), 0).map(Some);
    }

    let mut started = false;
    let mut stored_values = Vec::with_capacity(stored);
    for (_, def) in layout.stored_parameters() {
        let Some(line) = tokens.line()? else {
            if started {
                sdds_bail!(TruncatedPage: "page ended before parameter {}", def.name);
            }
            return Ok(None);
        };
        started = true;
        stored_values.push(
            parse_parameter(def.sdds_type, &line)
                .map_err(|e| e.with_context(format!("parameter {}", def.name)))?,
        );
    }
    let parameters = parameters_with_fixed(layout, stored_values)?;

    let mut arrays = Vec::with_capacity(layout.arrays().len());
    for def in layout.arrays().iter() {
        let mut dimensions = Vec::with_capacity(def.dimensions);
        for _ in 0..def.dimensions {
            let Some(token) = tokens.token()? else {
                if started {
                    sdds_bail!(TruncatedPage: "page ended before array {}", def.name);
                }
                return Ok(None);
            };
            started = true;
            let extent = token.parse::<usize>().map_err(|_| {
                sdds_err!(TypeMismatch: "invalid extent {:?} for array {}", token, def.name)
            })?;
            dimensions.push(extent);
        }
        let count = dimensions.iter().product();
        let values = read_values(&mut tokens, def.sdds_type, count, &def.name)?;
        arrays.push(ArrayValue { dimensions, values });
    }

    if layout.columns().is_empty() {
        return Page::from_parts(parameters, arrays, Vec::new(), 0).map(Some);
    }

    let types: Vec<SddsType> = layout.columns().iter().map(|c| c.sdds_type).collect();
    let rows = if mode.no_row_counts {
        if !started && !tokens.has_more()? {
            return Ok(None);
        }
        None
    } else {
        let Some(token) = tokens.token()? else {
            if started {
                sdds_bail!(TruncatedPage: "page ended before the row count");
            }
            return Ok(None);
        };
        Some(
            token
                .parse::<usize>()
                .map_err(|_| sdds_err!(TypeMismatch: "invalid row count {:?}", token))?,
        )
    };
    trace!("reading {:?} ascii rows", rows);

    let columns = match (mode.major_order, rows) {
        (MajorOrder::Column, Some(rows)) => types
            .iter()
            .zip(layout.columns().iter())
            .map(|(ty, def)| read_values(&mut tokens, *ty, rows, &def.name))
            .collect::<SddsResult<Vec<_>>>()?,
        (MajorOrder::Column, None) => {
            sdds_bail!(MalformedHeader: "column-major pages need row counts")
        }
        (MajorOrder::Row, rows) => {
            let mut columns: Vec<ColumnValues> =
                types.iter().map(|ty| ColumnValues::new(*ty)).collect();
            if let Some(rows) = rows {
                for column in columns.iter_mut() {
                    column.try_reserve(rows)?;
                }
            }
            let mut row = 0;
            loop {
                match rows {
                    Some(n) if row >= n => break,
                    None if tokens.at_blank_line()? => break,
                    _ => {}
                }
                for (column, ty) in columns.iter_mut().zip(&types) {
                    let token = tokens.require_token("a row")?;
                    column.push(&parse_value(*ty, &token)?)?;
                }
                row += 1;
            }
            columns
        }
    };
    let rows = columns.first().map_or(0, ColumnValues::len);
    Page::from_parts(parameters, arrays, columns, rows).map(Some)
}

fn is_page_marker(line: &str) -> bool {
    line.strip_prefix('!')
        .is_some_and(|rest| rest.trim_start().starts_with("page number"))
}

fn parameters_with_fixed(layout: &Layout, stored: Vec<Value>) -> SddsResult<Vec<Value>> {
    let mut stored = stored.into_iter();
    layout
        .parameters()
        .iter()
        .map(|def| match &def.fixed_value {
            Some(literal) => parse_value(def.sdds_type, literal),
            None => stored
                .next()
                .ok_or_else(|| sdds_err!(TruncatedPage: "missing parameter {}", def.name)),
        })
        .collect()
}
