//! Typed value encoding
//!
//! Converts a text token into the byte representation of a fixed-width
//! numeric type. Values are first laid out in the host's native byte order
//! and the whole sequence is reversed when the requested [`Endianness`]
//! differs from the host. [`decode`] is the inverse.
//!
//! Parse failures are not errors: [`encode`] returns `None` and the caller
//! appends nothing.

use byteorder::{ByteOrder, NativeEndian};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Byte order used when serializing multi-byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Endianness {
    /// Least significant byte first
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

impl Endianness {
    /// Options in UI order
    pub const ALL: [Endianness; 2] = [Endianness::Little, Endianness::Big];

    /// Byte order of the host
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Endianness::Little => "LittleEndian",
            Endianness::Big => "BigEndian",
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Endianness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "little" | "littleendian" | "le" => Ok(Endianness::Little),
            "big" | "bigendian" | "be" => Ok(Endianness::Big),
            other => Err(format!("unknown endianness '{other}'")),
        }
    }
}

/// Value types the encoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericType {
    /// `true`/`false`, one byte
    Bool,
    /// Signed 8-bit integer
    SByte,
    /// Unsigned 8-bit integer
    Byte,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 64-bit integer
    UInt64,
    /// IEEE 754 single precision
    Float,
    /// IEEE 754 double precision
    Double,
    /// 96-bit scaled decimal stored as four 32-bit words
    Decimal,
}

impl NumericType {
    /// Options in UI order
    pub const ALL: [NumericType; 12] = [
        NumericType::Bool,
        NumericType::SByte,
        NumericType::Byte,
        NumericType::Int16,
        NumericType::UInt16,
        NumericType::Int32,
        NumericType::UInt32,
        NumericType::Int64,
        NumericType::UInt64,
        NumericType::Float,
        NumericType::Double,
        NumericType::Decimal,
    ];

    /// Display name, e.g. "UInt16"
    pub fn name(&self) -> &'static str {
        match self {
            NumericType::Bool => "Bool",
            NumericType::SByte => "SByte",
            NumericType::Byte => "Byte",
            NumericType::Int16 => "Int16",
            NumericType::UInt16 => "UInt16",
            NumericType::Int32 => "Int32",
            NumericType::UInt32 => "UInt32",
            NumericType::Int64 => "Int64",
            NumericType::UInt64 => "UInt64",
            NumericType::Float => "Float",
            NumericType::Double => "Double",
            NumericType::Decimal => "Decimal",
        }
    }

    /// Encoded size in bytes
    pub fn size_bytes(&self) -> usize {
        match self {
            NumericType::Bool | NumericType::SByte | NumericType::Byte => 1,
            NumericType::Int16 | NumericType::UInt16 => 2,
            NumericType::Int32 | NumericType::UInt32 | NumericType::Float => 4,
            NumericType::Int64 | NumericType::UInt64 | NumericType::Double => 8,
            NumericType::Decimal => 16,
        }
    }
}

impl fmt::Display for NumericType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NumericType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => NumericType::Bool,
            "sbyte" | "i8" | "int8" | "s08" => NumericType::SByte,
            "byte" | "u8" | "uint8" | "u08" => NumericType::Byte,
            "int16" | "i16" | "short" | "s16" => NumericType::Int16,
            "uint16" | "u16" | "ushort" => NumericType::UInt16,
            "int32" | "i32" | "int" | "s32" => NumericType::Int32,
            "uint32" | "u32" | "uint" => NumericType::UInt32,
            "int64" | "i64" | "long" | "s64" => NumericType::Int64,
            "uint64" | "u64" | "ulong" => NumericType::UInt64,
            "float" | "f32" | "single" => NumericType::Float,
            "double" | "f64" => NumericType::Double,
            "decimal" => NumericType::Decimal,
            other => return Err(format!("unknown numeric type '{other}'")),
        };
        Ok(t)
    }
}

/// Largest mantissa a [`Decimal128`] can hold (2^96 - 1)
const DECIMAL_MAX_MANTISSA: u128 = (1u128 << 96) - 1;

/// Largest scale a [`Decimal128`] can hold
const DECIMAL_MAX_SCALE: u8 = 28;

/// A 128-bit scaled decimal: `(-1)^negative * mantissa / 10^scale`.
///
/// The wire form is four 32-bit words: the low, middle and high words of the
/// 96-bit mantissa followed by a flags word carrying the scale in bits 16..24
/// and the sign in bit 31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal128 {
    mantissa: u128,
    scale: u8,
    negative: bool,
}

impl Decimal128 {
    /// Build from parts. Returns `None` if the mantissa exceeds 96 bits or
    /// the scale exceeds 28.
    pub fn new(mantissa: u128, scale: u8, negative: bool) -> Option<Self> {
        if mantissa > DECIMAL_MAX_MANTISSA || scale > DECIMAL_MAX_SCALE {
            return None;
        }
        Some(Self {
            mantissa,
            scale,
            negative: negative && mantissa != 0,
        })
    }

    /// Unscaled 96-bit magnitude
    pub fn mantissa(&self) -> u128 {
        self.mantissa
    }

    /// Number of fractional decimal digits
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Sign; never set for zero
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Words in wire order: `[lo, mid, hi, flags]`
    pub fn to_words(&self) -> [u32; 4] {
        let flags = ((self.scale as u32) << 16) | if self.negative { 1 << 31 } else { 0 };
        [
            self.mantissa as u32,
            (self.mantissa >> 32) as u32,
            (self.mantissa >> 64) as u32,
            flags,
        ]
    }

    /// Inverse of [`Decimal128::to_words`]; rejects reserved flag bits
    pub fn from_words(words: [u32; 4]) -> Option<Self> {
        let [lo, mid, hi, flags] = words;
        if flags & 0x7F00_FFFF != 0 {
            return None;
        }
        let scale = ((flags >> 16) & 0xFF) as u8;
        let mantissa = (lo as u128) | ((mid as u128) << 32) | ((hi as u128) << 64);
        Self::new(mantissa, scale, flags & (1 << 31) != 0)
    }
}

impl FromStr for Decimal128 {
    type Err = ();

    /// Parses `[ws][sign]digits[.digits][ws]`. Commas are accepted as
    /// group separators in the integer part. Fractional digits beyond what
    /// fits are rounded half to even.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.starts_with(',') {
            return Err(());
        }

        let mut mantissa: u128 = 0;
        let mut scale: u8 = 0;
        let mut digits = 0usize;

        for c in int_part.chars() {
            if c == ',' {
                continue;
            }
            let d = c.to_digit(10).ok_or(())? as u128;
            mantissa = mantissa * 10 + d;
            if mantissa > DECIMAL_MAX_MANTISSA {
                return Err(());
            }
            digits += 1;
        }

        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(());
        }
        digits += frac_part.len();
        if digits == 0 {
            return Err(());
        }

        let frac = frac_part.as_bytes();
        for (i, b) in frac.iter().enumerate() {
            let d = (b - b'0') as u128;
            let next = mantissa * 10 + d;
            if scale < DECIMAL_MAX_SCALE && next <= DECIMAL_MAX_MANTISSA {
                mantissa = next;
                scale += 1;
                continue;
            }

            // Out of room: round on the first dropped digit
            let sticky = frac[i + 1..].iter().any(|&b| b != b'0');
            if d > 5 || (d == 5 && (sticky || mantissa % 2 == 1)) {
                mantissa += 1;
                if mantissa > DECIMAL_MAX_MANTISSA {
                    if scale == 0 {
                        return Err(());
                    }
                    mantissa = (mantissa + 5) / 10;
                    scale -= 1;
                }
            }
            break;
        }

        Decimal128::new(mantissa, scale, negative).ok_or(())
    }
}

impl fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.to_string();
        let scale = self.scale as usize;
        let sign = if self.negative { "-" } else { "" };
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

/// A parsed value of one of the [`NumericType`]s
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypedValue {
    /// [`NumericType::Bool`]
    Bool(bool),
    /// [`NumericType::SByte`]
    SByte(i8),
    /// [`NumericType::Byte`]
    Byte(u8),
    /// [`NumericType::Int16`]
    Int16(i16),
    /// [`NumericType::UInt16`]
    UInt16(u16),
    /// [`NumericType::Int32`]
    Int32(i32),
    /// [`NumericType::UInt32`]
    UInt32(u32),
    /// [`NumericType::Int64`]
    Int64(i64),
    /// [`NumericType::UInt64`]
    UInt64(u64),
    /// [`NumericType::Float`]
    Float(f32),
    /// [`NumericType::Double`]
    Double(f64),
    /// [`NumericType::Decimal`]
    Decimal(Decimal128),
}

impl TypedValue {
    /// Type this value was parsed as
    pub fn numeric_type(&self) -> NumericType {
        match self {
            TypedValue::Bool(_) => NumericType::Bool,
            TypedValue::SByte(_) => NumericType::SByte,
            TypedValue::Byte(_) => NumericType::Byte,
            TypedValue::Int16(_) => NumericType::Int16,
            TypedValue::UInt16(_) => NumericType::UInt16,
            TypedValue::Int32(_) => NumericType::Int32,
            TypedValue::UInt32(_) => NumericType::UInt32,
            TypedValue::Int64(_) => NumericType::Int64,
            TypedValue::UInt64(_) => NumericType::UInt64,
            TypedValue::Float(_) => NumericType::Float,
            TypedValue::Double(_) => NumericType::Double,
            TypedValue::Decimal(_) => NumericType::Decimal,
        }
    }

    /// Natural-width bytes in host order
    pub fn to_native_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.numeric_type().size_bytes()];
        match *self {
            TypedValue::Bool(v) => buf[0] = v as u8,
            TypedValue::SByte(v) => buf[0] = v as u8,
            TypedValue::Byte(v) => buf[0] = v,
            TypedValue::Int16(v) => NativeEndian::write_i16(&mut buf, v),
            TypedValue::UInt16(v) => NativeEndian::write_u16(&mut buf, v),
            TypedValue::Int32(v) => NativeEndian::write_i32(&mut buf, v),
            TypedValue::UInt32(v) => NativeEndian::write_u32(&mut buf, v),
            TypedValue::Int64(v) => NativeEndian::write_i64(&mut buf, v),
            TypedValue::UInt64(v) => NativeEndian::write_u64(&mut buf, v),
            TypedValue::Float(v) => NativeEndian::write_f32(&mut buf, v),
            TypedValue::Double(v) => NativeEndian::write_f64(&mut buf, v),
            TypedValue::Decimal(d) => NativeEndian::write_u32_into(&d.to_words(), &mut buf),
        }
        buf
    }

    /// Inverse of [`TypedValue::to_native_bytes`]
    pub fn from_native_bytes(bytes: &[u8], ty: NumericType) -> Option<Self> {
        if bytes.len() != ty.size_bytes() {
            return None;
        }
        let value = match ty {
            NumericType::Bool => TypedValue::Bool(bytes[0] != 0),
            NumericType::SByte => TypedValue::SByte(bytes[0] as i8),
            NumericType::Byte => TypedValue::Byte(bytes[0]),
            NumericType::Int16 => TypedValue::Int16(NativeEndian::read_i16(bytes)),
            NumericType::UInt16 => TypedValue::UInt16(NativeEndian::read_u16(bytes)),
            NumericType::Int32 => TypedValue::Int32(NativeEndian::read_i32(bytes)),
            NumericType::UInt32 => TypedValue::UInt32(NativeEndian::read_u32(bytes)),
            NumericType::Int64 => TypedValue::Int64(NativeEndian::read_i64(bytes)),
            NumericType::UInt64 => TypedValue::UInt64(NativeEndian::read_u64(bytes)),
            NumericType::Float => TypedValue::Float(NativeEndian::read_f32(bytes)),
            NumericType::Double => TypedValue::Double(NativeEndian::read_f64(bytes)),
            NumericType::Decimal => {
                let mut words = [0u32; 4];
                NativeEndian::read_u32_into(bytes, &mut words);
                TypedValue::Decimal(Decimal128::from_words(words)?)
            }
        };
        Some(value)
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    let t = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if t.eq_ignore_ascii_case("true") {
        Some(true)
    } else if t.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Integer grammar: `[ws][sign]digits[ws]`. Unsigned types accept a
/// negative zero.
fn parse_int<T: FromStr + Default>(text: &str, unsigned: bool) -> Option<T> {
    let t = text.trim();
    if unsigned {
        if let Some(rest) = t.strip_prefix('-') {
            return (!rest.is_empty() && rest.bytes().all(|b| b == b'0')).then(T::default);
        }
    }
    t.parse().ok()
}

/// Parse `text` according to `ty`'s grammar
pub fn parse(text: &str, ty: NumericType) -> Option<TypedValue> {
    let value = match ty {
        NumericType::Bool => TypedValue::Bool(parse_bool(text)?),
        NumericType::SByte => TypedValue::SByte(parse_int(text, false)?),
        NumericType::Byte => TypedValue::Byte(parse_int(text, true)?),
        NumericType::Int16 => TypedValue::Int16(parse_int(text, false)?),
        NumericType::UInt16 => TypedValue::UInt16(parse_int(text, true)?),
        NumericType::Int32 => TypedValue::Int32(parse_int(text, false)?),
        NumericType::UInt32 => TypedValue::UInt32(parse_int(text, true)?),
        NumericType::Int64 => TypedValue::Int64(parse_int(text, false)?),
        NumericType::UInt64 => TypedValue::UInt64(parse_int(text, true)?),
        NumericType::Float => TypedValue::Float(text.trim().parse().ok()?),
        NumericType::Double => TypedValue::Double(text.trim().parse().ok()?),
        NumericType::Decimal => TypedValue::Decimal(text.parse().ok()?),
    };
    Some(value)
}

/// Encode `text` as `ty` in the requested byte order.
///
/// Returns `None` if `text` does not parse as `ty`.
pub fn encode(text: &str, ty: NumericType, endianness: Endianness) -> Option<Vec<u8>> {
    let mut bytes = parse(text, ty)?.to_native_bytes();
    if endianness != Endianness::native() {
        bytes.reverse();
    }
    Some(bytes)
}

/// Decode bytes produced by [`encode`] with the same type and byte order
pub fn decode(bytes: &[u8], ty: NumericType, endianness: Endianness) -> Option<TypedValue> {
    if endianness == Endianness::native() {
        return TypedValue::from_native_bytes(bytes, ty);
    }
    let mut native = bytes.to_vec();
    native.reverse();
    TypedValue::from_native_bytes(&native, ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal128 {
        s.parse().unwrap()
    }

    #[test]
    fn test_uint16_both_orders() {
        assert_eq!(
            encode("1000", NumericType::UInt16, Endianness::Big),
            Some(vec![0x03, 0xE8])
        );
        assert_eq!(
            encode("1000", NumericType::UInt16, Endianness::Little),
            Some(vec![0xE8, 0x03])
        );
    }

    #[test]
    fn test_signed_values() {
        assert_eq!(encode("-1", NumericType::SByte, Endianness::Little), Some(vec![0xFF]));
        assert_eq!(
            encode("-2", NumericType::Int32, Endianness::Big),
            Some(vec![0xFF, 0xFF, 0xFF, 0xFE])
        );
        assert_eq!(encode(" +7 ", NumericType::Int16, Endianness::Big), Some(vec![0, 7]));
    }

    #[test]
    fn test_out_of_range_is_none() {
        assert_eq!(encode("256", NumericType::Byte, Endianness::Little), None);
        assert_eq!(encode("-129", NumericType::SByte, Endianness::Little), None);
        assert_eq!(encode("-1", NumericType::UInt32, Endianness::Little), None);
        assert_eq!(encode("", NumericType::Int64, Endianness::Little), None);
        assert_eq!(encode("12abc", NumericType::Int64, Endianness::Little), None);
    }

    #[test]
    fn test_unsigned_negative_zero() {
        assert_eq!(encode("-0", NumericType::Byte, Endianness::Little), Some(vec![0]));
        assert_eq!(encode("-", NumericType::Byte, Endianness::Little), None);
    }

    #[test]
    fn test_bool() {
        assert_eq!(encode("True", NumericType::Bool, Endianness::Little), Some(vec![1]));
        assert_eq!(encode(" false ", NumericType::Bool, Endianness::Big), Some(vec![0]));
        assert_eq!(encode("1", NumericType::Bool, Endianness::Little), None);
    }

    #[test]
    fn test_float_layout() {
        assert_eq!(
            encode("1.5", NumericType::Float, Endianness::Big),
            Some(vec![0x3F, 0xC0, 0x00, 0x00])
        );
        assert_eq!(
            encode("-2", NumericType::Double, Endianness::Big),
            Some(vec![0xC0, 0, 0, 0, 0, 0, 0, 0])
        );
        assert_eq!(encode("one", NumericType::Double, Endianness::Big), None);
    }

    #[test]
    fn test_decimal_parse() {
        let d = dec("-123.450");
        assert_eq!(d.mantissa(), 123450);
        assert_eq!(d.scale(), 3);
        assert!(d.is_negative());
        assert_eq!(d.to_string(), "-123.450");

        assert_eq!(dec("1,000").mantissa(), 1000);
        assert_eq!(dec(".5").to_string(), "0.5");
        assert!(!dec("-0").is_negative());

        assert!("".parse::<Decimal128>().is_err());
        assert!(".".parse::<Decimal128>().is_err());
        assert!("1e5".parse::<Decimal128>().is_err());
        assert!("79228162514264337593543950336".parse::<Decimal128>().is_err());
    }

    #[test]
    fn test_decimal_rounds_excess_fraction() {
        // 30 fractional digits: rounds to 28
        let d = dec("0.123456789012345678901234567850");
        assert_eq!(d.scale(), 28);
        assert_eq!(d.to_string(), "0.1234567890123456789012345678");

        let d = dec("0.000000000000000000000000000050");
        assert_eq!(d.to_string(), "0.0000000000000000000000000000");
        let d = dec("0.000000000000000000000000000051");
        assert_eq!(d.to_string(), "0.0000000000000000000000000001");
    }

    #[test]
    fn test_decimal_words() {
        let d = dec("-1.5");
        assert_eq!(d.to_words(), [15, 0, 0, 0x8001_0000]);
        assert_eq!(Decimal128::from_words(d.to_words()), Some(d));
        assert_eq!(Decimal128::from_words([1, 0, 0, 0x0000_0001]), None);
        assert_eq!(Decimal128::from_words([1, 0, 0, 29 << 16]), None);
    }

    #[test]
    fn test_decimal_encoding_reverses_whole_sequence() {
        let native = encode("1", NumericType::Decimal, Endianness::native()).unwrap();
        let other = match Endianness::native() {
            Endianness::Little => Endianness::Big,
            Endianness::Big => Endianness::Little,
        };
        let mut swapped = encode("1", NumericType::Decimal, other).unwrap();
        assert_eq!(native.len(), 16);
        swapped.reverse();
        assert_eq!(swapped, native);
    }

    #[test]
    fn test_round_trip_all_types() {
        let samples = [
            (NumericType::Bool, "true"),
            (NumericType::SByte, "-100"),
            (NumericType::Byte, "200"),
            (NumericType::Int16, "-30000"),
            (NumericType::UInt16, "65535"),
            (NumericType::Int32, "-2147483648"),
            (NumericType::UInt32, "4000000000"),
            (NumericType::Int64, "-9000000000000000000"),
            (NumericType::UInt64, "18446744073709551615"),
            (NumericType::Float, "3.25"),
            (NumericType::Double, "-0.1"),
            (NumericType::Decimal, "79228162514264337593543950335"),
        ];

        for (ty, text) in samples {
            let expected = parse(text, ty).unwrap();
            for endian in Endianness::ALL {
                let bytes = encode(text, ty, endian).unwrap();
                assert_eq!(bytes.len(), ty.size_bytes(), "{ty} {endian}");
                assert_eq!(decode(&bytes, ty, endian), Some(expected), "{ty} {endian}");
            }
        }
    }

    #[test]
    fn test_decode_wrong_length() {
        assert_eq!(decode(&[1, 2, 3], NumericType::UInt16, Endianness::Little), None);
    }

    #[test]
    fn test_type_names_round_trip() {
        for ty in NumericType::ALL {
            assert_eq!(ty.name().parse::<NumericType>(), Ok(ty));
        }
        for e in Endianness::ALL {
            assert_eq!(e.name().parse::<Endianness>(), Ok(e));
        }
        assert!("int128".parse::<NumericType>().is_err());
    }
}
