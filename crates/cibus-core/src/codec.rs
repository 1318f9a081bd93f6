//! Fixed-width type codec for mainframe-style picture declarations.
//!
//! Supported shapes: `9(n)`, `S9(n)`, implied decimals `9(n)V9(m)`,
//! alphanumeric `X(n)`, each with an optional usage clause selecting display
//! (zoned), binary (`COMP`) or packed-decimal (`COMP-3`) storage.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{EncodingError, SpecParseError};
use crate::value::FieldValue;

/// Largest digit count a numeric field may declare.
pub const MAX_DIGITS: u32 = 28;
const MAX_BINARY_DIGITS: u32 = 18;
/// Widest alphanumeric field a declaration may ask for.
pub const MAX_TEXT_LENGTH: u32 = 65_535;

static NUMERIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:PIC(?:TURE)?(?:\s+IS)?\s+)?(S)?(9+(?:\(\d+\))?)?(?:V(9+(?:\(\d+\))?))?(?:\s+(?:USAGE\s+(?:IS\s+)?)?(COMP-3|COMPUTATIONAL-3|PACKED-DECIMAL|COMP-4|COMPUTATIONAL-4|COMP|COMPUTATIONAL|BINARY|DISPLAY))?$",
    )
    .expect("numeric declaration pattern is valid")
});

static TEXT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:PIC(?:TURE)?(?:\s+IS)?\s+)?(X+(?:\(\d+\))?)(?:\s+(?:USAGE\s+(?:IS\s+)?)?DISPLAY)?$")
        .expect("text declaration pattern is valid")
});

/// Storage encoding of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Space-padded alphanumeric.
    Text,
    /// One byte per digit, plus a leading sign byte when signed.
    Zoned,
    /// Big-endian two's complement sized by digit count.
    Binary,
    /// Two digits per byte, final nibble holds the sign.
    Packed,
}

/// Decoded layout of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TypeDescriptor {
    pub byte_length: usize,
    /// Total digits for numeric fields, character count for text fields.
    pub digits: u32,
    pub decimal_places: u32,
    pub signed: bool,
    pub encoding: Encoding,
}

impl TypeDescriptor {
    pub fn text(length: u32) -> Self {
        Self {
            byte_length: length as usize,
            digits: length,
            decimal_places: 0,
            signed: false,
            encoding: Encoding::Text,
        }
    }

    pub fn numeric(digits: u32, decimal_places: u32, signed: bool, encoding: Encoding) -> Self {
        let byte_length = match encoding {
            Encoding::Text => digits as usize,
            Encoding::Zoned => digits as usize + usize::from(signed),
            Encoding::Binary => binary_width(digits),
            Encoding::Packed => (digits as usize + 2) / 2,
        };
        Self {
            byte_length,
            digits,
            decimal_places,
            signed,
            encoding,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.encoding != Encoding::Text
    }

    /// Digits or characters a raw value may occupy, ignoring sign and storage.
    pub fn logical_width(&self) -> usize {
        self.digits as usize
    }

    /// Smallest and largest values the field can hold, as floats.
    pub fn value_range(&self) -> (f64, f64) {
        let highest = (10_f64.powi(self.digits as i32) - 1.0) / 10_f64.powi(self.decimal_places as i32);
        let lowest = if self.signed { -highest } else { 0.0 };
        (lowest, highest)
    }
}

fn binary_width(digits: u32) -> usize {
    match digits {
        0..=4 => 2,
        5..=9 => 4,
        _ => 8,
    }
}

/// Parse a layout type declaration into its descriptor.
pub fn decode_spec(declaration: &str) -> Result<TypeDescriptor, SpecParseError> {
    let normalized = declaration
        .trim()
        .trim_end_matches('.')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();
    if normalized.is_empty() {
        return Err(SpecParseError::new(declaration, "empty declaration"));
    }

    if let Some(captures) = TEXT_PATTERN.captures(&normalized) {
        let length = group_count(declaration, &captures[1])?;
        if length > MAX_TEXT_LENGTH {
            return Err(SpecParseError::new(
                declaration,
                format!("{length} characters exceeds the supported maximum of {MAX_TEXT_LENGTH}"),
            ));
        }
        return Ok(TypeDescriptor::text(length));
    }

    let Some(captures) = NUMERIC_PATTERN.captures(&normalized) else {
        return Err(SpecParseError::new(
            declaration,
            "expected 9(n), S9(n), 9(n)V9(m) or X(n) with optional COMP/COMP-3",
        ));
    };

    let signed = captures.get(1).is_some();
    let integer = match captures.get(2) {
        Some(group) => group_count(declaration, group.as_str())?,
        None => 0,
    };
    let fraction = match captures.get(3) {
        Some(group) => group_count(declaration, group.as_str())?,
        None => 0,
    };
    let digits = integer
        .checked_add(fraction)
        .ok_or_else(|| SpecParseError::new(declaration, "digit count overflows"))?;
    if digits == 0 {
        return Err(SpecParseError::new(declaration, "no digit positions declared"));
    }
    if digits > MAX_DIGITS {
        return Err(SpecParseError::new(
            declaration,
            format!("{digits} digits exceeds the supported maximum of {MAX_DIGITS}"),
        ));
    }

    let encoding = match captures.get(4).map(|usage| usage.as_str()) {
        None | Some("DISPLAY") => Encoding::Zoned,
        Some("COMP-3" | "COMPUTATIONAL-3" | "PACKED-DECIMAL") => Encoding::Packed,
        Some(_) => Encoding::Binary,
    };
    if encoding == Encoding::Binary && digits > MAX_BINARY_DIGITS {
        return Err(SpecParseError::new(
            declaration,
            format!("binary fields hold at most {MAX_BINARY_DIGITS} digits"),
        ));
    }

    Ok(TypeDescriptor::numeric(digits, fraction, signed, encoding))
}

/// `9(5)` and `99(5)` both count 5; `999` counts 3.
fn group_count(declaration: &str, group: &str) -> Result<u32, SpecParseError> {
    let count = match group.find('(') {
        Some(open) => group[open + 1..group.len() - 1]
            .parse::<u32>()
            .map_err(|err| SpecParseError::new(declaration, err.to_string()))?,
        None => group.len() as u32,
    };
    if count == 0 {
        return Err(SpecParseError::new(declaration, "zero-length group"));
    }
    Ok(count)
}

/// Encode a raw value into exactly `descriptor.byte_length` bytes.
pub fn encode(value: &FieldValue, descriptor: &TypeDescriptor) -> Result<Vec<u8>, EncodingError> {
    match descriptor.encoding {
        Encoding::Text => encode_text(&value.to_string(), descriptor),
        Encoding::Zoned => Ok(encode_zoned(numeric_mantissa(value, descriptor)?, descriptor)),
        Encoding::Binary => encode_binary(numeric_mantissa(value, descriptor)?, descriptor),
        Encoding::Packed => Ok(encode_packed(numeric_mantissa(value, descriptor)?, descriptor)),
    }
}

fn numeric_mantissa(value: &FieldValue, descriptor: &TypeDescriptor) -> Result<i128, EncodingError> {
    let number = match value {
        FieldValue::Number(number) => *number,
        FieldValue::Text(text) => text
            .trim()
            .parse::<Decimal>()
            .map_err(|_| EncodingError::NotNumeric(text.clone()))?,
    };
    scaled_mantissa(number, descriptor)
}

fn encode_text(value: &str, descriptor: &TypeDescriptor) -> Result<Vec<u8>, EncodingError> {
    if !value.is_ascii() {
        return Err(EncodingError::NonAscii(value.to_string()));
    }
    let mut bytes = value.as_bytes().to_vec();
    bytes.resize(descriptor.byte_length, b' ');
    Ok(bytes)
}

/// Integer carrying the value at the field's implied scale.
fn scaled_mantissa(number: Decimal, descriptor: &TypeDescriptor) -> Result<i128, EncodingError> {
    let mut scaled = number.round_dp(descriptor.decimal_places);
    scaled.rescale(descriptor.decimal_places);
    let mantissa = scaled.mantissa();

    if mantissa < 0 && !descriptor.signed {
        return Err(EncodingError::NegativeUnsigned(number.to_string()));
    }
    let needed = mantissa.unsigned_abs().to_string().len();
    if mantissa.unsigned_abs() >= 10_u128.pow(descriptor.digits) {
        return Err(EncodingError::Overflow {
            value: number.to_string(),
            needed,
            capacity: descriptor.digits,
        });
    }
    Ok(mantissa)
}

fn encode_zoned(mantissa: i128, descriptor: &TypeDescriptor) -> Vec<u8> {
    let width = descriptor.digits as usize;
    let digits = format!("{:0width$}", mantissa.unsigned_abs());
    let mut bytes = Vec::with_capacity(descriptor.byte_length);
    if descriptor.signed {
        bytes.push(if mantissa < 0 { b'-' } else { b'+' });
    }
    bytes.extend_from_slice(digits.as_bytes());
    bytes
}

fn encode_binary(mantissa: i128, descriptor: &TypeDescriptor) -> Result<Vec<u8>, EncodingError> {
    let overflow = || EncodingError::Overflow {
        value: mantissa.to_string(),
        needed: mantissa.unsigned_abs().to_string().len(),
        capacity: descriptor.digits,
    };
    let bytes = match descriptor.byte_length {
        2 => i16::try_from(mantissa).map_err(|_| overflow())?.to_be_bytes().to_vec(),
        4 => i32::try_from(mantissa).map_err(|_| overflow())?.to_be_bytes().to_vec(),
        _ => i64::try_from(mantissa).map_err(|_| overflow())?.to_be_bytes().to_vec(),
    };
    Ok(bytes)
}

fn encode_packed(mantissa: i128, descriptor: &TypeDescriptor) -> Vec<u8> {
    let nibble_count = descriptor.byte_length * 2 - 1;
    let digits = format!("{:0nibble_count$}", mantissa.unsigned_abs());
    let sign = match (descriptor.signed, mantissa < 0) {
        (false, _) => 0x0F,
        (true, false) => 0x0C,
        (true, true) => 0x0D,
    };

    let mut nibbles: Vec<u8> = digits.bytes().map(|digit| digit - b'0').collect();
    nibbles.push(sign);
    nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect()
}

/// Decode field bytes back into the raw value; inverse of [`encode`].
pub fn decode(bytes: &[u8], descriptor: &TypeDescriptor) -> Result<FieldValue, EncodingError> {
    if bytes.len() != descriptor.byte_length {
        return Err(EncodingError::Length {
            expected: descriptor.byte_length,
            actual: bytes.len(),
        });
    }

    let mantissa = match descriptor.encoding {
        Encoding::Text => {
            let text = std::str::from_utf8(bytes)
                .map_err(|err| EncodingError::Malformed(err.to_string()))?;
            return Ok(FieldValue::Text(text.trim_end_matches(' ').to_string()));
        }
        Encoding::Zoned => decode_zoned(bytes, descriptor)?,
        Encoding::Binary => decode_binary(bytes),
        Encoding::Packed => decode_packed(bytes)?,
    };

    Decimal::try_from_i128_with_scale(mantissa, descriptor.decimal_places)
        .map(FieldValue::Number)
        .map_err(|err| EncodingError::Malformed(err.to_string()))
}

fn decode_zoned(bytes: &[u8], descriptor: &TypeDescriptor) -> Result<i128, EncodingError> {
    let (negative, digits) = if descriptor.signed {
        match bytes[0] {
            b'+' => (false, &bytes[1..]),
            b'-' => (true, &bytes[1..]),
            other => {
                return Err(EncodingError::Malformed(format!(
                    "invalid sign byte 0x{other:02x}"
                )));
            }
        }
    } else {
        (false, bytes)
    };

    let mut magnitude: i128 = 0;
    for byte in digits {
        if !byte.is_ascii_digit() {
            return Err(EncodingError::Malformed(format!(
                "invalid digit byte 0x{byte:02x}"
            )));
        }
        magnitude = magnitude * 10 + i128::from(byte - b'0');
    }
    Ok(if negative { -magnitude } else { magnitude })
}

fn decode_binary(bytes: &[u8]) -> i128 {
    let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for byte in bytes {
        value = (value << 8) | i64::from(*byte);
    }
    i128::from(value)
}

fn decode_packed(bytes: &[u8]) -> Result<i128, EncodingError> {
    let mut magnitude: i128 = 0;
    let last = bytes.len() - 1;
    for (index, byte) in bytes.iter().enumerate() {
        let high = byte >> 4;
        let low = byte & 0x0F;
        magnitude = magnitude * 10 + packed_digit(high)?;
        if index != last {
            magnitude = magnitude * 10 + packed_digit(low)?;
        } else {
            return match low {
                0x0D | 0x0B => Ok(-magnitude),
                0x0C | 0x0A | 0x0E | 0x0F => Ok(magnitude),
                other => Err(EncodingError::Malformed(format!(
                    "invalid sign nibble 0x{other:x}"
                ))),
            };
        }
    }
    Err(EncodingError::Malformed("empty packed field".to_string()))
}

fn packed_digit(nibble: u8) -> Result<i128, EncodingError> {
    if nibble > 9 {
        return Err(EncodingError::Malformed(format!(
            "invalid packed digit 0x{nibble:x}"
        )));
    }
    Ok(i128::from(nibble))
}
