use std::fmt::{Display, Formatter};

use num_traits::NumCast;
use paste::paste;
use sdds_dtype::SddsType;
use sdds_error::{SddsResult, sdds_bail, sdds_err};

use crate::text;

/// A single value of one of the [`SddsType`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed 16-bit integer.
    Short(i16),
    /// Unsigned 16-bit integer.
    UShort(u16),
    /// Signed 32-bit integer.
    Long(i32),
    /// Unsigned 32-bit integer.
    ULong(u32),
    /// Signed 64-bit integer.
    Long64(i64),
    /// Unsigned 64-bit integer.
    ULong64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Extended float, held at double precision.
    LongDouble(f64),
    /// A single byte.
    Character(u8),
    /// An owned string.
    String(String),
}

macro_rules! as_primitive {
    ($T:ty) => {
        paste! {
            #[doc = "Access the value as `" $T "`, returning `None` for strings or if the value does not fit"]
            pub fn [<as_ $T>](&self) -> Option<$T> {
                match self {
                    Value::Short(v) => <$T as NumCast>::from(*v),
                    Value::UShort(v) => <$T as NumCast>::from(*v),
                    Value::Long(v) => <$T as NumCast>::from(*v),
                    Value::ULong(v) => <$T as NumCast>::from(*v),
                    Value::Long64(v) => <$T as NumCast>::from(*v),
                    Value::ULong64(v) => <$T as NumCast>::from(*v),
                    Value::Float(v) => <$T as NumCast>::from(*v),
                    Value::Double(v) | Value::LongDouble(v) => <$T as NumCast>::from(*v),
                    Value::Character(v) => <$T as NumCast>::from(*v),
                    Value::String(_) => None,
                }
            }
        }
    };
}

impl Value {
    /// The type of this value.
    pub fn sdds_type(&self) -> SddsType {
        match self {
            Value::Short(_) => SddsType::Short,
            Value::UShort(_) => SddsType::UShort,
            Value::Long(_) => SddsType::Long,
            Value::ULong(_) => SddsType::ULong,
            Value::Long64(_) => SddsType::Long64,
            Value::ULong64(_) => SddsType::ULong64,
            Value::Float(_) => SddsType::Float,
            Value::Double(_) => SddsType::Double,
            Value::LongDouble(_) => SddsType::LongDouble,
            Value::Character(_) => SddsType::Character,
            Value::String(_) => SddsType::String,
        }
    }

    /// The zero value of a type; the empty string for strings.
    pub fn zero(ty: SddsType) -> Self {
        match ty {
            SddsType::Short => Value::Short(0),
            SddsType::UShort => Value::UShort(0),
            SddsType::Long => Value::Long(0),
            SddsType::ULong => Value::ULong(0),
            SddsType::Long64 => Value::Long64(0),
            SddsType::ULong64 => Value::ULong64(0),
            SddsType::Float => Value::Float(0.0),
            SddsType::Double => Value::Double(0.0),
            SddsType::LongDouble => Value::LongDouble(0.0),
            SddsType::Character => Value::Character(0),
            SddsType::String => Value::String(String::new()),
        }
    }

    as_primitive!(i16);
    as_primitive!(u16);
    as_primitive!(i32);
    as_primitive!(u32);
    as_primitive!(i64);
    as_primitive!(u64);
    as_primitive!(f32);
    as_primitive!(u8);

    /// Promote a numeric value to `f64`; `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Short(v) => Some(<f64 as From<_>>::from(*v)),
            Value::UShort(v) => Some(<f64 as From<_>>::from(*v)),
            Value::Long(v) => Some(<f64 as From<_>>::from(*v)),
            Value::ULong(v) => Some(<f64 as From<_>>::from(*v)),
            Value::Long64(v) => Some(*v as f64),
            Value::ULong64(v) => Some(*v as f64),
            Value::Float(v) => Some(<f64 as From<_>>::from(*v)),
            Value::Double(v) | Value::LongDouble(v) => Some(*v),
            Value::Character(v) => Some(<f64 as From<_>>::from(*v)),
            Value::String(_) => None,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Build a value of type `ty` from a double, failing with `ValueOutOfRange` when the value
    /// does not fit and `TypeMismatch` for strings.
    pub fn from_f64(ty: SddsType, v: f64) -> SddsResult<Self> {
        Value::Double(v).cast(ty)
    }

    /// Convert to another type.
    ///
    /// Numeric conversions are checked; floats truncate toward zero when converted to integers.
    /// Numbers convert to strings through their default text form and strings parse as `ty`.
    pub fn cast(&self, ty: SddsType) -> SddsResult<Self> {
        if self.sdds_type() == ty {
            return Ok(self.clone());
        }
        if let Value::String(s) = self {
            return text::parse_value(ty, s);
        }
        macro_rules! checked {
            ($v:expr, $ty:expr, $variant:ident, $accessor:ident) => {
                $v.$accessor().map(Value::$variant).ok_or_else(|| {
                    sdds_err!(ValueOutOfRange: "{} does not fit in type {}", $v, $ty)
                })
            };
        }
        match ty {
            SddsType::Short => checked!(self, ty, Short, as_i16),
            SddsType::UShort => checked!(self, ty, UShort, as_u16),
            SddsType::Long => checked!(self, ty, Long, as_i32),
            SddsType::ULong => checked!(self, ty, ULong, as_u32),
            SddsType::Long64 => checked!(self, ty, Long64, as_i64),
            SddsType::ULong64 => checked!(self, ty, ULong64, as_u64),
            SddsType::Character => checked!(self, ty, Character, as_u8),
            SddsType::Float => {
                let v = self
                    .as_f64()
                    .ok_or_else(|| sdds_err!(TypeMismatch: "{} is not numeric", self))?;
                if v.is_finite() && v.abs() > <f64 as From<_>>::from(f32::MAX) {
                    sdds_bail!(ValueOutOfRange: "{} does not fit in type float", v);
                }
                Ok(Value::Float(v as f32))
            }
            SddsType::Double | SddsType::LongDouble => {
                let v = self
                    .as_f64()
                    .ok_or_else(|| sdds_err!(TypeMismatch: "{} is not numeric", self))?;
                Ok(if ty == SddsType::Double {
                    Value::Double(v)
                } else {
                    Value::LongDouble(v)
                })
            }
            SddsType::String => Ok(Value::String(text::format_value(self, None)?)),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            v => {
                let s = text::format_value(v, None).map_err(|_| std::fmt::Error)?;
                write!(f, "{s}")
            }
        }
    }
}

macro_rules! value_from {
    ($T:ty, $variant:ident) => {
        impl From<$T> for Value {
            fn from(value: $T) -> Self {
                Value::$variant(value)
            }
        }
    };
}

value_from!(i16, Short);
value_from!(u16, UShort);
value_from!(i32, Long);
value_from!(u32, ULong);
value_from!(i64, Long64);
value_from!(u64, ULong64);
value_from!(f32, Float);
value_from!(f64, Double);
value_from!(u8, Character);
value_from!(String, String);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    #[rstest]
    #[case(Value::Long(7), SddsType::Double, Value::Double(7.0))]
    #[case(Value::Double(3.9), SddsType::Long, Value::Long(3))]
    #[case(Value::Double(-3.9), SddsType::Short, Value::Short(-3))]
    #[case(Value::Short(65), SddsType::Character, Value::Character(b'A'))]
    #[case(Value::ULong64(u64::MAX), SddsType::ULong64, Value::ULong64(u64::MAX))]
    #[case(Value::from("42"), SddsType::Long64, Value::Long64(42))]
    #[case(Value::Long(-5), SddsType::String, Value::from("-5"))]
    #[case(Value::Double(0.5), SddsType::String, Value::from("0.5"))]
    fn cast(#[case] from: Value, #[case] ty: SddsType, #[case] expected: Value) {
        assert_eq!(from.cast(ty).unwrap(), expected);
    }

    #[rstest]
    #[case(Value::Long(70000), SddsType::Short)]
    #[case(Value::Long(-1), SddsType::ULong)]
    #[case(Value::Double(f64::NAN), SddsType::Long)]
    #[case(Value::Double(1e40), SddsType::Float)]
    fn cast_out_of_range(#[case] from: Value, #[case] ty: SddsType) {
        assert_eq!(from.cast(ty).unwrap_err().kind(), ErrorKind::ValueOutOfRange);
    }

    #[test]
    fn promotion() {
        assert_eq!(Value::UShort(9).as_f64(), Some(9.0));
        assert_eq!(Value::from("x").as_f64(), None);
        assert_eq!(Value::zero(SddsType::String), Value::String(String::new()));
        assert_eq!(Value::Long64(-2).as_u64(), None);
    }
}
