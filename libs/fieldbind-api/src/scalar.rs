//! Scalar conversion primitives.
//!
//! Every function accepts any [`Value`] and either produces the requested
//! primitive or a [`ConvertError`]. Empty strings and `Null` convert to the
//! zero value of the target.

use std::any::{Any, type_name};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::ConvertError;
use crate::value::Value;

/// Precompiled setter for a primitive field slot.
///
/// The slot is the field itself, seen as `Any`; the setter downcasts it to
/// the concrete primitive (or `Option` of it) it was compiled for.
pub type ScalarSetter = fn(&mut dyn Any, &Value) -> Result<(), ConvertError>;

/// A primitive that can be produced from a dynamic value.
pub trait ScalarTarget: Sized {
    fn from_value(value: &Value) -> Result<Self, ConvertError>;
}

/// Setter for a `T` slot.
pub fn set_scalar<T: ScalarTarget + 'static>(slot: &mut dyn Any, value: &Value) -> Result<(), ConvertError> {
    let slot = slot
        .downcast_mut::<T>()
        .ok_or_else(|| ConvertError::type_mismatch(format!("slot is not {}", type_name::<T>())))?;
    *slot = T::from_value(value)?;
    Ok(())
}

/// Setter for an `Option<T>` slot. Always leaves `Some` on success.
pub fn set_option_scalar<T: ScalarTarget + 'static>(
    slot: &mut dyn Any,
    value: &Value,
) -> Result<(), ConvertError> {
    let slot = slot
        .downcast_mut::<Option<T>>()
        .ok_or_else(|| ConvertError::type_mismatch(format!("slot is not Option<{}>", type_name::<T>())))?;
    *slot = Some(T::from_value(value)?);
    Ok(())
}

fn mismatch(value: &Value, target: &str) -> ConvertError {
    ConvertError::type_mismatch(format!("cannot convert {} to {target}", value.kind_name()))
}

// ---------------------------------------------------------------------------
// Integers
// ---------------------------------------------------------------------------

pub fn to_i64(value: &Value) -> Result<i64, ConvertError> {
    match value {
        Value::Null => Ok(0),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Int(v) => Ok(*v),
        Value::UInt(v) => i64::try_from(*v).map_err(|_| ConvertError::range(format!("{v} overflows i64"))),
        Value::Float(v) => float_to_i64(*v),
        Value::String(s) => parse_i64(s),
        Value::Bytes(b) => parse_i64(&String::from_utf8_lossy(b)),
        Value::Time(t) => Ok(t.timestamp()),
        other => Err(mismatch(other, "integer")),
    }
}

pub fn to_u64(value: &Value) -> Result<u64, ConvertError> {
    match value {
        Value::Null => Ok(0),
        Value::Bool(b) => Ok(u64::from(*b)),
        Value::Int(v) => u64::try_from(*v).map_err(|_| ConvertError::range(format!("{v} is negative"))),
        Value::UInt(v) => Ok(*v),
        Value::Float(v) => float_to_u64(*v),
        Value::String(s) => parse_u64(s),
        Value::Bytes(b) => parse_u64(&String::from_utf8_lossy(b)),
        Value::Time(t) => u64::try_from(t.timestamp())
            .map_err(|_| ConvertError::range(format!("{t} is before the unix epoch"))),
        other => Err(mismatch(other, "unsigned integer")),
    }
}

fn parse_i64(text: &str) -> Result<i64, ConvertError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    if let Ok(v) = text.parse::<i64>() {
        return Ok(v);
    }
    if let Some(hex) = strip_hex(text) {
        return Ok(i64::from_str_radix(hex, 16)?);
    }
    let float = text
        .parse::<f64>()
        .map_err(|_| ConvertError::parse(format!("invalid integer '{text}'")))?;
    float_to_i64(float)
}

fn parse_u64(text: &str) -> Result<u64, ConvertError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    if let Ok(v) = text.parse::<u64>() {
        return Ok(v);
    }
    if let Some(hex) = strip_hex(text) {
        return Ok(u64::from_str_radix(hex, 16)?);
    }
    let float = text
        .parse::<f64>()
        .map_err(|_| ConvertError::parse(format!("invalid unsigned integer '{text}'")))?;
    float_to_u64(float)
}

fn strip_hex(text: &str) -> Option<&str> {
    text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
}

fn float_to_i64(v: f64) -> Result<i64, ConvertError> {
    if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Ok(v.trunc() as i64)
    } else {
        Err(ConvertError::range(format!("{v} does not fit in i64")))
    }
}

fn float_to_u64(v: f64) -> Result<u64, ConvertError> {
    if v.is_finite() && v > -1.0 && v < u64::MAX as f64 {
        Ok(v.trunc() as u64)
    } else {
        Err(ConvertError::range(format!("{v} does not fit in u64")))
    }
}

// ---------------------------------------------------------------------------
// Floats, bools, strings, bytes
// ---------------------------------------------------------------------------

pub fn to_f64(value: &Value) -> Result<f64, ConvertError> {
    match value {
        Value::Null => Ok(0.0),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Int(v) => Ok(*v as f64),
        Value::UInt(v) => Ok(*v as f64),
        Value::Float(v) => Ok(*v),
        Value::String(s) => parse_f64(s),
        Value::Bytes(b) => parse_f64(&String::from_utf8_lossy(b)),
        Value::Time(t) => Ok(t.timestamp() as f64),
        other => Err(mismatch(other, "float")),
    }
}

fn parse_f64(text: &str) -> Result<f64, ConvertError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0.0);
    }
    Ok(text.parse::<f64>()?)
}

/// Falsy strings are `""`, `"0"`, `"false"`, `"off"` and `"no"` (case-insensitive).
pub fn to_bool(value: &Value) -> Result<bool, ConvertError> {
    Ok(match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(v) => *v != 0,
        Value::UInt(v) => *v != 0,
        Value::Float(v) => *v != 0.0,
        Value::String(s) => truthy(s),
        Value::Bytes(b) => truthy(&String::from_utf8_lossy(b)),
        Value::Time(t) => t.timestamp() != 0,
        Value::Array(items) => !items.is_empty(),
        Value::Map(map) => !map.is_empty(),
    })
}

fn truthy(text: &str) -> bool {
    let text = text.trim();
    !["", "0", "false", "off", "no"]
        .iter()
        .any(|falsy| text.eq_ignore_ascii_case(falsy))
}

/// Maps and arrays render as JSON.
pub fn to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::String(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Time(t) => t.to_rfc3339(),
        Value::Array(_) | Value::Map(_) => value.to_json().to_string(),
    }
}

pub fn to_bytes(value: &Value) -> Result<Vec<u8>, ConvertError> {
    match value {
        Value::Bytes(b) => Ok(b.clone()),
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let byte = to_u64(item)?;
                u8::try_from(byte).map_err(|_| ConvertError::range(format!("{byte} is not a byte")))
            })
            .collect(),
        other => Ok(to_string(other).into_bytes()),
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

/// Integers are unix seconds; strings may be RFC 3339, a naive datetime
/// (read as UTC), a bare date or a number of seconds.
pub fn to_datetime(value: &Value) -> Result<DateTime<Utc>, ConvertError> {
    match value {
        Value::Null => Ok(DateTime::default()),
        Value::Time(t) => Ok(*t),
        Value::Int(secs) => from_timestamp(*secs),
        Value::UInt(secs) => {
            let secs = i64::try_from(*secs).map_err(|_| ConvertError::range(format!("{secs} overflows i64")))?;
            from_timestamp(secs)
        }
        Value::Float(secs) => from_timestamp(float_to_i64(*secs)?),
        Value::String(s) => parse_datetime(s),
        Value::Bytes(b) => parse_datetime(&String::from_utf8_lossy(b)),
        other => Err(mismatch(other, "datetime")),
    }
}

pub fn to_naive_datetime(value: &Value) -> Result<NaiveDateTime, ConvertError> {
    if let Some(text) = value.as_str() {
        if let Some(naive) = parse_naive(text.trim()) {
            return Ok(naive);
        }
    }
    to_datetime(value).map(|t| t.naive_utc())
}

fn from_timestamp(secs: i64) -> Result<DateTime<Utc>, ConvertError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| ConvertError::range(format!("timestamp {secs} out of range")))
}

fn parse_datetime(text: &str) -> Result<DateTime<Utc>, ConvertError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(DateTime::default());
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Some(naive) = parse_naive(text) {
        return Ok(naive.and_utc());
    }
    if let Ok(secs) = text.parse::<i64>() {
        return from_timestamp(secs);
    }
    Err(ConvertError::parse(format!("invalid datetime '{text}'")))
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ---------------------------------------------------------------------------
// ScalarTarget impls
// ---------------------------------------------------------------------------

macro_rules! signed_target {
    ($($ty:ty),*) => {$(
        impl ScalarTarget for $ty {
            fn from_value(value: &Value) -> Result<Self, ConvertError> {
                let v = to_i64(value)?;
                <$ty>::try_from(v)
                    .map_err(|_| ConvertError::range(format!("{v} out of range for {}", stringify!($ty))))
            }
        }
    )*};
}

macro_rules! unsigned_target {
    ($($ty:ty),*) => {$(
        impl ScalarTarget for $ty {
            fn from_value(value: &Value) -> Result<Self, ConvertError> {
                let v = to_u64(value)?;
                <$ty>::try_from(v)
                    .map_err(|_| ConvertError::range(format!("{v} out of range for {}", stringify!($ty))))
            }
        }
    )*};
}

signed_target!(i8, i16, i32, i64, isize);
unsigned_target!(u8, u16, u32, u64, usize);

impl ScalarTarget for f32 {
    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        to_f64(value).map(|v| v as f32)
    }
}

impl ScalarTarget for f64 {
    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        to_f64(value)
    }
}

impl ScalarTarget for bool {
    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        to_bool(value)
    }
}

impl ScalarTarget for String {
    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        Ok(to_string(value))
    }
}

impl ScalarTarget for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        to_bytes(value)
    }
}

impl ScalarTarget for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        to_datetime(value)
    }
}

impl ScalarTarget for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, ConvertError> {
        to_naive_datetime(value)
    }
}
