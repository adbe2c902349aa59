//! Binary page encoding.
//!
//! A page is a 64-bit row count, the values of parameters without a fixed value, each array as
//! one 32-bit extent per dimension followed by its elements, then the column data row by row or
//! column by column. Strings are a 32-bit length followed by the bytes. Only rows of interest are
//! written.

use std::io::{self, Read};

use bytes::{BufMut, BytesMut};
use log::debug;
use sdds_dtype::SddsType;
use sdds_error::{SddsError, SddsResult, sdds_bail, sdds_err};
use sdds_layout::{Endianness, Layout, MajorOrder};
use sdds_scalar::{ColumnValues, Value, longdouble, text::parse_value};

use crate::page::{ArrayValue, Page};

/// Row counts above this are taken as a sign of foreign byte order.
const PLAUSIBLE_ROWS: i64 = 1 << 40;

trait WireScalar: Sized {
    const SIZE: usize;

    fn put(self, buf: &mut BytesMut, order: Endianness);

    fn get(bytes: &[u8], order: Endianness) -> Self;
}

macro_rules! wire_scalar {
    ($($T:ty),*) => {
        $(
            impl WireScalar for $T {
                const SIZE: usize = size_of::<$T>();

                #[inline]
                fn put(self, buf: &mut BytesMut, order: Endianness) {
                    match order {
                        Endianness::Little => buf.put_slice(&self.to_le_bytes()),
                        Endianness::Big => buf.put_slice(&self.to_be_bytes()),
                    }
                }

                #[inline]
                fn get(bytes: &[u8], order: Endianness) -> Self {
                    let mut raw = [0u8; size_of::<$T>()];
                    raw.copy_from_slice(&bytes[..size_of::<$T>()]);
                    match order {
                        Endianness::Little => <$T>::from_le_bytes(raw),
                        Endianness::Big => <$T>::from_be_bytes(raw),
                    }
                }
            }
        )*
    };
}

wire_scalar!(u8, i16, u16, i32, u32, i64, u64, f32, f64);

fn put_len(buf: &mut BytesMut, len: usize, order: Endianness, what: &str) -> SddsResult<()> {
    let len = i32::try_from(len)
        .map_err(|_| sdds_err!(ValueOutOfRange: "{} of {} does not fit in 32 bits", what, len))?;
    len.put(buf, order);
    Ok(())
}

fn put_string(buf: &mut BytesMut, s: &str, order: Endianness) -> SddsResult<()> {
    put_len(buf, s.len(), order, "string length")?;
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_value(buf: &mut BytesMut, value: &Value, order: Endianness) -> SddsResult<()> {
    match value {
        Value::Short(v) => v.put(buf, order),
        Value::UShort(v) => v.put(buf, order),
        Value::Long(v) => v.put(buf, order),
        Value::ULong(v) => v.put(buf, order),
        Value::Long64(v) => v.put(buf, order),
        Value::ULong64(v) => v.put(buf, order),
        Value::Float(v) => v.put(buf, order),
        Value::Double(v) => v.put(buf, order),
        Value::LongDouble(v) => {
            buf.put_slice(&longdouble::to_wire(*v, order == Endianness::Little));
        }
        Value::Character(v) => v.put(buf, order),
        Value::String(s) => put_string(buf, s, order)?,
    }
    Ok(())
}

fn put_element(
    buf: &mut BytesMut,
    column: &ColumnValues,
    row: usize,
    order: Endianness,
) -> SddsResult<()> {
    match column {
        ColumnValues::Short(v) => v[row].put(buf, order),
        ColumnValues::UShort(v) => v[row].put(buf, order),
        ColumnValues::Long(v) => v[row].put(buf, order),
        ColumnValues::ULong(v) => v[row].put(buf, order),
        ColumnValues::Long64(v) => v[row].put(buf, order),
        ColumnValues::ULong64(v) => v[row].put(buf, order),
        ColumnValues::Float(v) => v[row].put(buf, order),
        ColumnValues::Double(v) => v[row].put(buf, order),
        ColumnValues::LongDouble(v) => {
            buf.put_slice(&longdouble::to_wire(v[row], order == Endianness::Little));
        }
        ColumnValues::Character(v) => v[row].put(buf, order),
        ColumnValues::String(v) => put_string(buf, &v[row], order)?,
    }
    Ok(())
}

/// Encode the rows of interest of `page`.
pub(crate) fn encode_page(layout: &Layout, page: &Page, order: Endianness) -> SddsResult<BytesMut> {
    let rows = page.rows_of_interest();
    let mut buf = BytesMut::with_capacity(8 + rows.len() * layout.row_stride().unwrap_or(16));
    i64::try_from(rows.len())
        .map_err(|_| sdds_err!(ValueOutOfRange: "too many rows"))?
        .put(&mut buf, order);

    for (index, _) in layout.stored_parameters() {
        put_value(&mut buf, page.parameter(index)?, order)?;
    }

    for array in page.arrays() {
        for extent in &array.dimensions {
            put_len(&mut buf, *extent, order, "array extent")?;
        }
        for i in 0..array.values.len() {
            put_element(&mut buf, &array.values, i, order)?;
        }
    }

    match layout.data_mode.major_order {
        MajorOrder::Row => {
            for &row in &rows {
                for column in page.columns() {
                    put_element(&mut buf, column, row, order)?;
                }
            }
        }
        MajorOrder::Column => {
            for column in page.columns() {
                for &row in &rows {
                    put_element(&mut buf, column, row, order)?;
                }
            }
        }
    }
    Ok(buf)
}

fn truncated(e: io::Error) -> SddsError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        sdds_err!(TruncatedPage: "page ended early")
    } else {
        SddsError::from(e)
    }
}

/// Decodes successive binary pages, remembering the byte order once settled.
#[derive(Debug, Default)]
pub(crate) struct BinaryDecoder {
    order: Option<Endianness>,
    scratch: Vec<u8>,
}

impl BinaryDecoder {
    /// A decoder for a stream declared to be in `order`, or undeclared.
    pub(crate) fn new(order: Option<Endianness>) -> Self {
        Self {
            order,
            scratch: Vec::new(),
        }
    }

    /// The byte order in use, once known.
    pub(crate) fn order(&self) -> Option<Endianness> {
        self.order
    }

    fn bytes<R: Read>(&mut self, input: &mut R, n: usize) -> SddsResult<&[u8]> {
        self.scratch.resize(n, 0);
        input.read_exact(&mut self.scratch).map_err(truncated)?;
        Ok(&self.scratch)
    }

    fn scalar<T: WireScalar, R: Read>(&mut self, input: &mut R) -> SddsResult<T> {
        let order = self.order.unwrap_or_default();
        Ok(T::get(self.bytes(input, T::SIZE)?, order))
    }

    fn length<R: Read>(&mut self, input: &mut R, what: &str) -> SddsResult<usize> {
        let n: i32 = self.scalar(input)?;
        usize::try_from(n).map_err(|_| sdds_err!(ValueOutOfRange: "negative {} {}", what, n))
    }

    fn string<R: Read>(&mut self, input: &mut R) -> SddsResult<String> {
        let n = self.length(input, "string length")?;
        let bytes = self.bytes(input, n)?.to_vec();
        String::from_utf8(bytes)
            .map_err(|e| sdds_err!(TypeMismatch: "string value is not UTF-8: {}", e))
    }

    fn long_double<R: Read>(&mut self, input: &mut R) -> SddsResult<f64> {
        let little = self.order.unwrap_or_default() == Endianness::Little;
        let mut raw = [0u8; longdouble::WIRE_SIZE];
        raw.copy_from_slice(self.bytes(input, longdouble::WIRE_SIZE)?);
        Ok(longdouble::from_wire(&raw, little))
    }

    fn value<R: Read>(&mut self, input: &mut R, ty: SddsType) -> SddsResult<Value> {
        Ok(match ty {
            SddsType::Short => Value::Short(self.scalar(input)?),
            SddsType::UShort => Value::UShort(self.scalar(input)?),
            SddsType::Long => Value::Long(self.scalar(input)?),
            SddsType::ULong => Value::ULong(self.scalar(input)?),
            SddsType::Long64 => Value::Long64(self.scalar(input)?),
            SddsType::ULong64 => Value::ULong64(self.scalar(input)?),
            SddsType::Float => Value::Float(self.scalar(input)?),
            SddsType::Double => Value::Double(self.scalar(input)?),
            SddsType::LongDouble => Value::LongDouble(self.long_double(input)?),
            SddsType::Character => Value::Character(self.scalar(input)?),
            SddsType::String => Value::String(self.string(input)?),
        })
    }

    fn element<R: Read>(
        &mut self,
        input: &mut R,
        column: &mut ColumnValues,
        index: usize,
    ) -> SddsResult<()> {
        match column {
            ColumnValues::Short(v) => v[index] = self.scalar(input)?,
            ColumnValues::UShort(v) => v[index] = self.scalar(input)?,
            ColumnValues::Long(v) => v[index] = self.scalar(input)?,
            ColumnValues::ULong(v) => v[index] = self.scalar(input)?,
            ColumnValues::Long64(v) => v[index] = self.scalar(input)?,
            ColumnValues::ULong64(v) => v[index] = self.scalar(input)?,
            ColumnValues::Float(v) => v[index] = self.scalar(input)?,
            ColumnValues::Double(v) => v[index] = self.scalar(input)?,
            ColumnValues::LongDouble(v) => v[index] = self.long_double(input)?,
            ColumnValues::Character(v) => v[index] = self.scalar(input)?,
            ColumnValues::String(v) => v[index] = self.string(input)?,
        }
        Ok(())
    }

    fn buffer(ty: SddsType, len: usize) -> SddsResult<ColumnValues> {
        let mut values = ColumnValues::new(ty);
        values.try_reserve(len)?;
        values.resize(len);
        Ok(values)
    }

    /// Read the row count, settling the byte order on the first page. `None` at a clean end of
    /// stream.
    fn row_count<R: Read>(&mut self, input: &mut R) -> SddsResult<Option<usize>> {
        let mut raw = [0u8; 8];
        let mut filled = 0;
        while filled < raw.len() {
            match input.read(&mut raw[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => sdds_bail!(TruncatedPage: "stream ended inside a row count"),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        let order = match self.order {
            Some(order) => order,
            None => {
                let native = Endianness::native();
                let plausible = |v: i64| (0..PLAUSIBLE_ROWS).contains(&v);
                let order = if plausible(i64::get(&raw, native)) {
                    native
                } else if plausible(i64::get(&raw, native.swapped())) {
                    debug!("undeclared byte order looks {}; swapping", native.swapped());
                    native.swapped()
                } else {
                    native
                };
                self.order = Some(order);
                order
            }
        };
        let rows = i64::get(&raw, order);
        usize::try_from(rows)
            .map(Some)
            .map_err(|_| sdds_err!(ValueOutOfRange: "invalid row count {}", rows))
    }

    /// Decode the next page. `None` at a clean end of stream.
    pub(crate) fn read_page<R: Read>(
        &mut self,
        input: &mut R,
        layout: &Layout,
    ) -> SddsResult<Option<Page>> {
        let Some(rows) = self.row_count(input)? else {
            return Ok(None);
        };

        let mut parameters = Vec::with_capacity(layout.parameters().len());
        for def in layout.parameters().iter() {
            parameters.push(match &def.fixed_value {
                Some(literal) => parse_value(def.sdds_type, literal)?,
                None => self.value(input, def.sdds_type)?,
            });
        }

        let mut arrays = Vec::with_capacity(layout.arrays().len());
        for def in layout.arrays().iter() {
            let mut dimensions = Vec::with_capacity(def.dimensions);
            for _ in 0..def.dimensions {
                dimensions.push(self.length(input, "array extent")?);
            }
            let count = dimensions
                .iter()
                .try_fold(1usize, |acc, d| acc.checked_mul(*d))
                .ok_or_else(|| sdds_err!(ValueOutOfRange: "array {} is too large", def.name))?;
            let mut values = Self::buffer(def.sdds_type, count)?;
            for i in 0..count {
                self.element(input, &mut values, i)?;
            }
            arrays.push(ArrayValue { dimensions, values });
        }

        let mut columns = layout
            .columns()
            .iter()
            .map(|def| Self::buffer(def.sdds_type, rows))
            .collect::<SddsResult<Vec<_>>>()?;
        match layout.data_mode.major_order {
            MajorOrder::Row => {
                for row in 0..rows {
                    for column in columns.iter_mut() {
                        self.element(input, column, row)?;
                    }
                }
            }
            MajorOrder::Column => {
                for column in columns.iter_mut() {
                    for row in 0..rows {
                        self.element(input, column, row)?;
                    }
                }
            }
        }
        Page::from_parts(parameters, arrays, columns, rows).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;
    use sdds_error::ErrorKind;
    use sdds_layout::{ArrayDefinition, ColumnDefinition, ParameterDefinition};

    use super::*;

    fn layout(order: MajorOrder) -> Layout {
        let mut layout = Layout::new();
        layout
            .define_parameter(ParameterDefinition::new("p", SddsType::String))
            .unwrap();
        layout
            .define_parameter(ParameterDefinition::new("f", SddsType::Short).fixed_value("7"))
            .unwrap();
        layout
            .define_array(ArrayDefinition::new("a", SddsType::LongDouble, 1))
            .unwrap();
        layout
            .define_column(ColumnDefinition::new("x", SddsType::Double))
            .unwrap();
        layout
            .define_column(ColumnDefinition::new("k", SddsType::ULong64))
            .unwrap();
        layout
            .define_column(ColumnDefinition::new("s", SddsType::String))
            .unwrap();
        layout.data_mode.major_order = order;
        layout.freeze();
        layout
    }

    fn page(layout: &Layout) -> Page {
        let mut page = Page::new(layout, 0).unwrap();
        page.set_parameter(0, &Value::from("hello")).unwrap();
        page.set_array(0, vec![2], &ColumnValues::from(vec![0.5, -1.25]))
            .unwrap();
        page.set_column(0, &ColumnValues::from(vec![1.0, 2.0, 3.0]))
            .unwrap();
        page.set_column(1, &ColumnValues::from(vec![1u64, u64::MAX, 3]))
            .unwrap();
        page.set_column(2, &ColumnValues::from(vec!["a", "", "c d"]))
            .unwrap();
        page
    }

    #[rstest]
    fn round_trip(
        #[values(MajorOrder::Row, MajorOrder::Column)] major: MajorOrder,
        #[values(Endianness::Big, Endianness::Little)] order: Endianness,
        #[values(true, false)] declared: bool,
    ) {
        let layout = layout(major);
        let page = page(&layout);
        let mut bytes = encode_page(&layout, &page, order).unwrap().to_vec();
        bytes.extend(encode_page(&layout, &page, order).unwrap());

        let mut decoder = BinaryDecoder::new(declared.then_some(order));
        let mut input = Cursor::new(bytes);
        for _ in 0..2 {
            let read = decoder.read_page(&mut input, &layout).unwrap().unwrap();
            assert_eq!(read, page);
        }
        assert_eq!(decoder.order(), Some(order));
        assert!(decoder.read_page(&mut input, &layout).unwrap().is_none());
    }

    #[test]
    fn only_rows_of_interest_are_written() {
        let layout = layout(MajorOrder::Row);
        let mut page = page(&layout);
        page.assert_row_flags(&[false, true, false]).unwrap();
        let bytes = encode_page(&layout, &page, Endianness::Little).unwrap();
        let read = BinaryDecoder::new(Some(Endianness::Little))
            .read_page(&mut Cursor::new(bytes.to_vec()), &layout)
            .unwrap()
            .unwrap();
        assert_eq!(read.row_count(), 1);
        assert_eq!(read.value(1, 0).unwrap(), Value::ULong64(u64::MAX));
        assert_eq!(read.parameter(1).unwrap(), &Value::Short(7));
    }

    #[test]
    fn truncated_page() {
        let layout = layout(MajorOrder::Row);
        let bytes = encode_page(&layout, &page(&layout), Endianness::Little).unwrap();
        let cut = bytes[..bytes.len() - 3].to_vec();
        let err = BinaryDecoder::new(Some(Endianness::Little))
            .read_page(&mut Cursor::new(cut), &layout)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedPage);

        let err = BinaryDecoder::new(None)
            .read_page(&mut Cursor::new(vec![1u8, 0, 0]), &layout)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedPage);
    }
}
