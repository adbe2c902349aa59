use std::fmt::{Display, Formatter};
use std::str::FromStr;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use sdds_error::{SddsError, SddsResult, sdds_err};

/// The closed set of scalar types carried by SDDS definitions.
///
/// The discriminants are the type codes used by the data format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum SddsType {
    /// Extended-precision float, held as `f64` in memory.
    LongDouble = 1,
    /// 64-bit IEEE float.
    Double = 2,
    /// 32-bit IEEE float.
    Float = 3,
    /// Signed 64-bit integer.
    Long64 = 4,
    /// Unsigned 64-bit integer.
    ULong64 = 5,
    /// Signed 32-bit integer.
    Long = 6,
    /// Unsigned 32-bit integer.
    ULong = 7,
    /// Signed 16-bit integer.
    Short = 8,
    /// Unsigned 16-bit integer.
    UShort = 9,
    /// Variable-length character string.
    String = 10,
    /// A single byte.
    Character = 11,
}

static_assertions::const_assert_eq!(SddsType::ALL.len(), 11);

impl SddsType {
    /// Every type, in type-code order.
    pub const ALL: [SddsType; 11] = [
        SddsType::LongDouble,
        SddsType::Double,
        SddsType::Float,
        SddsType::Long64,
        SddsType::ULong64,
        SddsType::Long,
        SddsType::ULong,
        SddsType::Short,
        SddsType::UShort,
        SddsType::String,
        SddsType::Character,
    ];

    /// The type code used by the data format.
    pub fn code(self) -> u8 {
        self.into()
    }

    /// Look up a type by its code, failing with `InvalidType` outside the closed set.
    pub fn from_code(code: i64) -> SddsResult<Self> {
        u8::try_from(code)
            .ok()
            .and_then(|c| SddsType::try_from(c).ok())
            .ok_or_else(|| sdds_err!(InvalidType: "type code {} is not recognized", code))
    }

    /// Width in bytes of one value on the binary wire, or `None` for strings, which are
    /// length-prefixed.
    pub fn size(self) -> Option<usize> {
        match self {
            SddsType::LongDouble => Some(16),
            SddsType::Double | SddsType::Long64 | SddsType::ULong64 => Some(8),
            SddsType::Float | SddsType::Long | SddsType::ULong => Some(4),
            SddsType::Short | SddsType::UShort => Some(2),
            SddsType::Character => Some(1),
            SddsType::String => None,
        }
    }

    /// The spelling used in headers.
    pub fn name(self) -> &'static str {
        match self {
            SddsType::LongDouble => "longdouble",
            SddsType::Double => "double",
            SddsType::Float => "float",
            SddsType::Long64 => "long64",
            SddsType::ULong64 => "ulong64",
            SddsType::Long => "long",
            SddsType::ULong => "ulong",
            SddsType::Short => "short",
            SddsType::UShort => "ushort",
            SddsType::String => "string",
            SddsType::Character => "character",
        }
    }

    /// Parse a header spelling, failing with `InvalidType` for anything outside the closed set.
    pub fn parse_name(name: &str) -> SddsResult<Self> {
        let name = name.trim();
        SddsType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| sdds_err!(InvalidType: "unknown type name \"{}\"", name))
    }

    /// Numeric types promote to `f64`. Characters are treated as small integers.
    pub fn is_numeric(self) -> bool {
        !matches!(self, SddsType::String)
    }

    /// True for the integer types, excluding `Character`.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            SddsType::Long64
                | SddsType::ULong64
                | SddsType::Long
                | SddsType::ULong
                | SddsType::Short
                | SddsType::UShort
        )
    }

    /// True for the unsigned integer types.
    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            SddsType::ULong64 | SddsType::ULong | SddsType::UShort
        )
    }

    /// True for the floating-point types.
    pub fn is_float(self) -> bool {
        matches!(
            self,
            SddsType::LongDouble | SddsType::Double | SddsType::Float
        )
    }

    /// Significant digits used when formatting without a hint.
    pub fn default_precision(self) -> Option<usize> {
        match self {
            SddsType::LongDouble => Some(18),
            SddsType::Double => Some(15),
            SddsType::Float => Some(8),
            _ => None,
        }
    }

    /// Rank in the numeric promotion order; higher ranks hold every value of lower ranks
    /// up to precision.
    pub fn promotion_rank(self) -> u8 {
        match self {
            SddsType::Character => 0,
            SddsType::UShort | SddsType::Short => 1,
            SddsType::ULong | SddsType::Long => 2,
            SddsType::ULong64 | SddsType::Long64 => 3,
            SddsType::Float => 4,
            SddsType::Double => 5,
            SddsType::LongDouble => 6,
            SddsType::String => u8::MAX,
        }
    }
}

impl Display for SddsType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SddsType {
    type Err = SddsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SddsType::parse_name(s)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    #[rstest]
    #[case("short", SddsType::Short, Some(2))]
    #[case("ushort", SddsType::UShort, Some(2))]
    #[case("long", SddsType::Long, Some(4))]
    #[case("ulong", SddsType::ULong, Some(4))]
    #[case("long64", SddsType::Long64, Some(8))]
    #[case("ulong64", SddsType::ULong64, Some(8))]
    #[case("float", SddsType::Float, Some(4))]
    #[case("double", SddsType::Double, Some(8))]
    #[case("longdouble", SddsType::LongDouble, Some(16))]
    #[case("character", SddsType::Character, Some(1))]
    #[case("string", SddsType::String, None)]
    fn names_and_sizes(#[case] name: &str, #[case] ty: SddsType, #[case] size: Option<usize>) {
        assert_eq!(SddsType::parse_name(name).unwrap(), ty);
        assert_eq!(ty.name(), name);
        assert_eq!(ty.size(), size);
    }

    #[test]
    fn codes_round_trip() {
        for ty in SddsType::ALL {
            assert_eq!(SddsType::from_code(ty.code() as i64).unwrap(), ty);
        }
        assert_eq!(SddsType::Double.code(), 2);
        assert_eq!(SddsType::Character.code(), 11);
    }

    #[rstest]
    #[case(0)]
    #[case(12)]
    #[case(-1)]
    fn unknown_code_is_invalid_type(#[case] code: i64) {
        assert_eq!(
            SddsType::from_code(code).unwrap_err().kind(),
            ErrorKind::InvalidType
        );
    }

    #[test]
    fn unknown_name_is_invalid_type() {
        assert_eq!(
            "int128".parse::<SddsType>().unwrap_err().kind(),
            ErrorKind::InvalidType
        );
    }

    #[test]
    fn classification() {
        assert!(SddsType::Character.is_numeric());
        assert!(!SddsType::String.is_numeric());
        assert!(SddsType::UShort.is_unsigned());
        assert!(SddsType::Float.is_float());
        assert!(!SddsType::Character.is_integer());
        assert!(SddsType::Long64.promotion_rank() > SddsType::Short.promotion_rank());
    }
}
