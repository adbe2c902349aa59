//! Conversion between `f64` and the x87 80-bit extended format.
//!
//! Long doubles are held at double precision in memory. On the binary wire they occupy 16 bytes:
//! the 10-byte extended value followed by six bytes of padding, as laid out by x86-64 Linux.

/// Width of a long double on the wire.
pub const WIRE_SIZE: usize = 16;

const EXP_BIAS: i32 = 16383;
const INTEGER_BIT: u64 = 1 << 63;

/// Encode as the 10 little-endian bytes of an x87 extended value.
pub fn to_x87_le(v: f64) -> [u8; 10] {
    let bits = v.to_bits();
    let sign = ((bits >> 63) as u16) << 15;
    let exp = ((bits >> 52) & 0x7ff) as i32;
    let frac = bits & ((1 << 52) - 1);

    let (exponent, mantissa): (u16, u64) = if exp == 0x7ff {
        if frac == 0 {
            (0x7fff, INTEGER_BIT)
        } else {
            (0x7fff, INTEGER_BIT | (1 << 62) | (frac << 11))
        }
    } else if exp == 0 {
        if frac == 0 {
            (0, 0)
        } else {
            let shift = frac.leading_zeros();
            let e = EXP_BIAS - 1022 - (shift as i32 - 11);
            (e as u16, frac << shift)
        }
    } else {
        ((exp - 1023 + EXP_BIAS) as u16, INTEGER_BIT | (frac << 11))
    };

    let mut out = [0u8; 10];
    out[..8].copy_from_slice(&mantissa.to_le_bytes());
    out[8..].copy_from_slice(&(sign | exponent).to_le_bytes());
    out
}

/// Decode the 10 little-endian bytes of an x87 extended value, rounding to double precision.
pub fn from_x87_le(bytes: &[u8; 10]) -> f64 {
    let mut m = [0u8; 8];
    m.copy_from_slice(&bytes[..8]);
    let mantissa = u64::from_le_bytes(m);
    let se = u16::from_le_bytes([bytes[8], bytes[9]]);
    let negative = se & 0x8000 != 0;
    let exponent = i32::from(se & 0x7fff);

    let magnitude = if exponent == 0x7fff {
        if mantissa << 1 == 0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    } else if mantissa == 0 {
        0.0
    } else {
        ldexp(mantissa as f64, exponent - EXP_BIAS - 63)
    };
    if negative { -magnitude } else { magnitude }
}

/// Encode for the wire in the requested byte order.
pub fn to_wire(v: f64, little_endian: bool) -> [u8; WIRE_SIZE] {
    let mut le = to_x87_le(v);
    if !little_endian {
        le.reverse();
    }
    let mut out = [0u8; WIRE_SIZE];
    out[..10].copy_from_slice(&le);
    out
}

/// Decode from the wire in the given byte order.
pub fn from_wire(bytes: &[u8; WIRE_SIZE], little_endian: bool) -> f64 {
    let mut ext = [0u8; 10];
    ext.copy_from_slice(&bytes[..10]);
    if !little_endian {
        ext.reverse();
    }
    from_x87_le(&ext)
}

fn ldexp(mut x: f64, mut exp: i32) -> f64 {
    let step = 2f64.powi(1000);
    let inv_step = 2f64.powi(-1000);
    while exp > 1000 {
        x *= step;
        exp -= 1000;
        if x.is_infinite() {
            return x;
        }
    }
    while exp < -1000 {
        x *= inv_step;
        exp += 1000;
        if x == 0.0 {
            return x;
        }
    }
    x * 2f64.powi(exp)
}
