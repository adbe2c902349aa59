use std::cmp::Ordering;

use sdds_dtype::SddsType;
use sdds_error::{SddsResult, sdds_bail, sdds_err};

use crate::{CompareOptions, Value, numeric_high_cmp};

/// A typed vector of values, one variant per [`SddsType`].
///
/// Columns and arrays of a page are stored as `ColumnValues`. Strings are owned by the buffer and
/// cloned on copy.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// Signed 16-bit integers.
    Short(Vec<i16>),
    /// Unsigned 16-bit integers.
    UShort(Vec<u16>),
    /// Signed 32-bit integers.
    Long(Vec<i32>),
    /// Unsigned 32-bit integers.
    ULong(Vec<u32>),
    /// Signed 64-bit integers.
    Long64(Vec<i64>),
    /// Unsigned 64-bit integers.
    ULong64(Vec<u64>),
    /// 32-bit floats.
    Float(Vec<f32>),
    /// 64-bit floats.
    Double(Vec<f64>),
    /// Extended floats held at double precision.
    LongDouble(Vec<f64>),
    /// Bytes.
    Character(Vec<u8>),
    /// Owned strings.
    String(Vec<String>),
}

/// Apply `$body` to the inner vector of any variant.
#[macro_export]
macro_rules! match_each_column {
    ($self:expr, | $v:ident | $body:expr) => {
        match $self {
            $crate::ColumnValues::Short($v) => $body,
            $crate::ColumnValues::UShort($v) => $body,
            $crate::ColumnValues::Long($v) => $body,
            $crate::ColumnValues::ULong($v) => $body,
            $crate::ColumnValues::Long64($v) => $body,
            $crate::ColumnValues::ULong64($v) => $body,
            $crate::ColumnValues::Float($v) => $body,
            $crate::ColumnValues::Double($v) => $body,
            $crate::ColumnValues::LongDouble($v) => $body,
            $crate::ColumnValues::Character($v) => $body,
            $crate::ColumnValues::String($v) => $body,
        }
    };
}

/// Apply `$body` to the inner vector of any variant, rebuilding the same variant from the result.
macro_rules! map_each_column {
    ($self:expr, | $v:ident | $body:expr) => {
        match $self {
            ColumnValues::Short($v) => ColumnValues::Short($body),
            ColumnValues::UShort($v) => ColumnValues::UShort($body),
            ColumnValues::Long($v) => ColumnValues::Long($body),
            ColumnValues::ULong($v) => ColumnValues::ULong($body),
            ColumnValues::Long64($v) => ColumnValues::Long64($body),
            ColumnValues::ULong64($v) => ColumnValues::ULong64($body),
            ColumnValues::Float($v) => ColumnValues::Float($body),
            ColumnValues::Double($v) => ColumnValues::Double($body),
            ColumnValues::LongDouble($v) => ColumnValues::LongDouble($body),
            ColumnValues::Character($v) => ColumnValues::Character($body),
            ColumnValues::String($v) => ColumnValues::String($body),
        }
    };
}

impl ColumnValues {
    /// An empty buffer of type `ty`.
    pub fn new(ty: SddsType) -> Self {
        Self::with_len(ty, 0)
    }

    /// A buffer of `len` zero values (empty strings for strings).
    pub fn with_len(ty: SddsType, len: usize) -> Self {
        match ty {
            SddsType::Short => ColumnValues::Short(vec![0; len]),
            SddsType::UShort => ColumnValues::UShort(vec![0; len]),
            SddsType::Long => ColumnValues::Long(vec![0; len]),
            SddsType::ULong => ColumnValues::ULong(vec![0; len]),
            SddsType::Long64 => ColumnValues::Long64(vec![0; len]),
            SddsType::ULong64 => ColumnValues::ULong64(vec![0; len]),
            SddsType::Float => ColumnValues::Float(vec![0.0; len]),
            SddsType::Double => ColumnValues::Double(vec![0.0; len]),
            SddsType::LongDouble => ColumnValues::LongDouble(vec![0.0; len]),
            SddsType::Character => ColumnValues::Character(vec![0; len]),
            SddsType::String => ColumnValues::String(vec![String::new(); len]),
        }
    }

    /// Build a buffer of type `ty` from values, converting each.
    pub fn from_values(ty: SddsType, values: &[Value]) -> SddsResult<Self> {
        let mut out = Self::with_len(ty, values.len());
        for (i, v) in values.iter().enumerate() {
            out.set(i, v)?;
        }
        Ok(out)
    }

    /// Build a buffer of type `ty` from doubles, converting each.
    pub fn from_f64s(ty: SddsType, values: &[f64]) -> SddsResult<Self> {
        if ty == SddsType::Double {
            return Ok(ColumnValues::Double(values.to_vec()));
        }
        let mut out = Self::with_len(ty, values.len());
        for (i, v) in values.iter().enumerate() {
            out.set(i, &Value::Double(*v))?;
        }
        Ok(out)
    }

    /// The element type.
    pub fn sdds_type(&self) -> SddsType {
        match self {
            ColumnValues::Short(_) => SddsType::Short,
            ColumnValues::UShort(_) => SddsType::UShort,
            ColumnValues::Long(_) => SddsType::Long,
            ColumnValues::ULong(_) => SddsType::ULong,
            ColumnValues::Long64(_) => SddsType::Long64,
            ColumnValues::ULong64(_) => SddsType::ULong64,
            ColumnValues::Float(_) => SddsType::Float,
            ColumnValues::Double(_) => SddsType::Double,
            ColumnValues::LongDouble(_) => SddsType::LongDouble,
            ColumnValues::Character(_) => SddsType::Character,
            ColumnValues::String(_) => SddsType::String,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match_each_column!(self, |v| v.len())
    }

    /// True when the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index`.
    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            ColumnValues::Short(v) => v.get(index).map(|x| Value::Short(*x)),
            ColumnValues::UShort(v) => v.get(index).map(|x| Value::UShort(*x)),
            ColumnValues::Long(v) => v.get(index).map(|x| Value::Long(*x)),
            ColumnValues::ULong(v) => v.get(index).map(|x| Value::ULong(*x)),
            ColumnValues::Long64(v) => v.get(index).map(|x| Value::Long64(*x)),
            ColumnValues::ULong64(v) => v.get(index).map(|x| Value::ULong64(*x)),
            ColumnValues::Float(v) => v.get(index).map(|x| Value::Float(*x)),
            ColumnValues::Double(v) => v.get(index).map(|x| Value::Double(*x)),
            ColumnValues::LongDouble(v) => v.get(index).map(|x| Value::LongDouble(*x)),
            ColumnValues::Character(v) => v.get(index).map(|x| Value::Character(*x)),
            ColumnValues::String(v) => v.get(index).map(|x| Value::String(x.clone())),
        }
    }

    /// The element at `index` promoted to `f64`; `None` out of bounds or for strings.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            ColumnValues::Double(v) | ColumnValues::LongDouble(v) => v.get(index).copied(),
            ColumnValues::String(_) => None,
            other => other.get(index).and_then(|v| v.as_f64()),
        }
    }

    /// Store `value` at `index`, converting it to the element type.
    pub fn set(&mut self, index: usize, value: &Value) -> SddsResult<()> {
        let len = self.len();
        if index >= len {
            sdds_bail!(ValueOutOfRange: "index {} out of bounds for buffer of length {}", index, len);
        }
        let value = value.cast(self.sdds_type())?;
        match (self, value) {
            (ColumnValues::Short(v), Value::Short(x)) => v[index] = x,
            (ColumnValues::UShort(v), Value::UShort(x)) => v[index] = x,
            (ColumnValues::Long(v), Value::Long(x)) => v[index] = x,
            (ColumnValues::ULong(v), Value::ULong(x)) => v[index] = x,
            (ColumnValues::Long64(v), Value::Long64(x)) => v[index] = x,
            (ColumnValues::ULong64(v), Value::ULong64(x)) => v[index] = x,
            (ColumnValues::Float(v), Value::Float(x)) => v[index] = x,
            (ColumnValues::Double(v), Value::Double(x)) => v[index] = x,
            (ColumnValues::LongDouble(v), Value::LongDouble(x)) => v[index] = x,
            (ColumnValues::Character(v), Value::Character(x)) => v[index] = x,
            (ColumnValues::String(v), Value::String(x)) => v[index] = x,
            (column, value) => sdds_bail!(
                TypeMismatch: "cannot store {} in a {} buffer",
                value.sdds_type(),
                column.sdds_type()
            ),
        }
        Ok(())
    }

    /// Append a value, converting it to the element type.
    pub fn push(&mut self, value: &Value) -> SddsResult<()> {
        let n = self.len();
        self.resize(n + 1);
        self.set(n, value).inspect_err(|_| self.truncate(n))
    }

    /// Grow or shrink to `len` elements, filling with zeros.
    pub fn resize(&mut self, len: usize) {
        match self {
            ColumnValues::String(v) => v.resize(len, String::new()),
            ColumnValues::Short(v) => v.resize(len, 0),
            ColumnValues::UShort(v) => v.resize(len, 0),
            ColumnValues::Long(v) => v.resize(len, 0),
            ColumnValues::ULong(v) => v.resize(len, 0),
            ColumnValues::Long64(v) => v.resize(len, 0),
            ColumnValues::ULong64(v) => v.resize(len, 0),
            ColumnValues::Float(v) => v.resize(len, 0.0),
            ColumnValues::Double(v) | ColumnValues::LongDouble(v) => v.resize(len, 0.0),
            ColumnValues::Character(v) => v.resize(len, 0),
        }
    }

    /// Reserve room for `additional` more elements, failing with `AllocationFailure`.
    pub fn try_reserve(&mut self, additional: usize) -> SddsResult<()> {
        match_each_column!(self, |v| v.try_reserve(additional))
            .map_err(|e| sdds_err!(AllocationFailure: "{}", e))
    }

    /// Keep only the first `len` elements.
    pub fn truncate(&mut self, len: usize) {
        match_each_column!(self, |v| v.truncate(len))
    }

    /// Swap two elements.
    pub fn swap(&mut self, a: usize, b: usize) {
        match_each_column!(self, |v| v.swap(a, b))
    }

    /// A new buffer holding the elements at `indices`, in that order.
    ///
    /// Indices must be in bounds.
    pub fn take(&self, indices: &[usize]) -> Self {
        map_each_column!(self, |v| indices.iter().map(|&i| v[i].to_owned()).collect())
    }

    /// Reorder in place so that element `i` becomes the old element `order[i]`.
    pub fn permute(&mut self, order: &[usize]) {
        *self = self.take(order);
    }

    /// Keep the elements whose flag is set.
    pub fn retain_flags(&mut self, flags: &[bool]) {
        match_each_column!(self, |v| {
            let mut i = 0;
            v.retain(|_| {
                let keep = flags.get(i).copied().unwrap_or(false);
                i += 1;
                keep
            })
        })
    }

    /// Append every element of `other`, converting when the types differ.
    pub fn extend_from(&mut self, other: &ColumnValues) -> SddsResult<()> {
        let other = other.cast(self.sdds_type())?;
        let start = self.len();
        self.resize(start + other.len());
        for i in 0..other.len() {
            if let Some(v) = other.get(i) {
                self.set(start + i, &v)?;
            }
        }
        Ok(())
    }

    /// Every element promoted to `f64`, failing with `TypeMismatch` for strings.
    pub fn to_f64(&self) -> SddsResult<Vec<f64>> {
        match self {
            ColumnValues::Short(v) => Ok(v.iter().map(|x| f64::from(*x)).collect()),
            ColumnValues::UShort(v) => Ok(v.iter().map(|x| f64::from(*x)).collect()),
            ColumnValues::Long(v) => Ok(v.iter().map(|x| f64::from(*x)).collect()),
            ColumnValues::ULong(v) => Ok(v.iter().map(|x| f64::from(*x)).collect()),
            ColumnValues::Long64(v) => Ok(v.iter().map(|x| *x as f64).collect()),
            ColumnValues::ULong64(v) => Ok(v.iter().map(|x| *x as f64).collect()),
            ColumnValues::Float(v) => Ok(v.iter().map(|x| f64::from(*x)).collect()),
            ColumnValues::Double(v) | ColumnValues::LongDouble(v) => Ok(v.clone()),
            ColumnValues::Character(v) => Ok(v.iter().map(|x| f64::from(*x)).collect()),
            ColumnValues::String(_) => {
                sdds_bail!(TypeMismatch: "string data cannot be promoted to double")
            }
        }
    }

    /// The string elements, if this is a string buffer.
    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            ColumnValues::String(v) => Some(v),
            _ => None,
        }
    }

    /// Convert every element to another type.
    pub fn cast(&self, ty: SddsType) -> SddsResult<Self> {
        if ty == self.sdds_type() {
            return Ok(self.clone());
        }
        if ty == SddsType::Double {
            if let Ok(v) = self.to_f64() {
                return Ok(ColumnValues::Double(v));
            }
        }
        let mut out = Self::with_len(ty, self.len());
        for i in 0..self.len() {
            if let Some(v) = self.get(i) {
                out.set(i, &v)?;
            }
        }
        Ok(out)
    }

    /// Compare the elements at `a` and `b`.
    pub fn compare(&self, a: usize, b: usize, options: CompareOptions) -> Ordering {
        match self {
            ColumnValues::String(v) => {
                if options.numeric_high {
                    numeric_high_cmp(&v[a], &v[b])
                } else {
                    v[a].cmp(&v[b])
                }
            }
            ColumnValues::Long64(v) if options.absolute => {
                v[a].unsigned_abs().cmp(&v[b].unsigned_abs())
            }
            ColumnValues::Long64(v) => v[a].cmp(&v[b]),
            ColumnValues::ULong64(v) => v[a].cmp(&v[b]),
            other => {
                let x = other.get_f64(a).unwrap_or(f64::NAN);
                let y = other.get_f64(b).unwrap_or(f64::NAN);
                if options.absolute {
                    x.abs().total_cmp(&y.abs())
                } else {
                    x.total_cmp(&y)
                }
            }
        }
    }

    /// True when the elements at `a` and `b` compare equal.
    pub fn equal_at(&self, a: usize, b: usize) -> bool {
        self.compare(a, b, CompareOptions::default()) == Ordering::Equal
    }
}

macro_rules! column_from {
    ($T:ty, $variant:ident) => {
        impl From<Vec<$T>> for ColumnValues {
            fn from(value: Vec<$T>) -> Self {
                ColumnValues::$variant(value)
            }
        }
    };
}

column_from!(i16, Short);
column_from!(u16, UShort);
column_from!(i32, Long);
column_from!(u32, ULong);
column_from!(i64, Long64);
column_from!(u64, ULong64);
column_from!(f32, Float);
column_from!(f64, Double);
column_from!(u8, Character);
column_from!(String, String);

impl From<Vec<&str>> for ColumnValues {
    fn from(value: Vec<&str>) -> Self {
        ColumnValues::String(value.into_iter().map(String::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    #[test]
    fn set_converts_to_element_type() {
        let mut c = ColumnValues::with_len(SddsType::Long, 2);
        c.set(1, &Value::Double(4.0)).unwrap();
        assert_eq!(c, ColumnValues::Long(vec![0, 4]));
        assert_eq!(
            c.set(2, &Value::Long(1)).unwrap_err().kind(),
            ErrorKind::ValueOutOfRange
        );
        assert_eq!(
            c.set(0, &Value::from("x")).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn push_failure_leaves_length_unchanged() {
        let mut c = ColumnValues::from(vec![1i16]);
        assert!(c.push(&Value::Long(100_000)).is_err());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn take_permute_and_retain() {
        let mut c = ColumnValues::from(vec!["a", "b", "c"]);
        assert_eq!(c.take(&[2, 0]), ColumnValues::from(vec!["c", "a"]));
        c.permute(&[1, 2, 0]);
        assert_eq!(c, ColumnValues::from(vec!["b", "c", "a"]));
        c.retain_flags(&[true, false, true]);
        assert_eq!(c, ColumnValues::from(vec!["b", "a"]));
    }

    #[test]
    fn promotion_to_double() {
        let c = ColumnValues::from(vec![1u16, 2, 3]);
        assert_eq!(c.to_f64().unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(ColumnValues::from(vec!["1"]).to_f64().is_err());
    }

    #[test]
    fn cast_strings_to_numbers() {
        let c = ColumnValues::from(vec!["1.5", "-2"]);
        assert_eq!(
            c.cast(SddsType::Double).unwrap(),
            ColumnValues::Double(vec![1.5, -2.0])
        );
        assert!(c.cast(SddsType::Long).is_err());
    }

    #[rstest]
    #[case(CompareOptions::default(), Ordering::Less)]
    #[case(CompareOptions { absolute: true, numeric_high: false }, Ordering::Greater)]
    fn compare_absolute(#[case] options: CompareOptions, #[case] expected: Ordering) {
        let c = ColumnValues::from(vec![-5.0, 2.0]);
        assert_eq!(c.compare(0, 1, options), expected);
    }

    #[test]
    fn compare_numeric_high_strings() {
        let c = ColumnValues::from(vec!["a10", "a2"]);
        assert_eq!(c.compare(0, 1, CompareOptions::default()), Ordering::Less);
        let nh = CompareOptions {
            numeric_high: true,
            ..Default::default()
        };
        assert_eq!(c.compare(0, 1, nh), Ordering::Greater);
    }
}
