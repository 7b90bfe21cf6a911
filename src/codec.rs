//! Conversion between raw Modbus words and the values they represent.
//!
//! Nothing in here touches the network or any state; see [`crate::session`] for that.

use crate::registers::{DataType, Descriptor, RegionKind};

/// Raw value a signed register reports when the sensor behind it has no reading.
pub const NO_READING: u16 = 0x7FFF;

/// Operating status reported by the `input_status` register.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    num_derive::FromPrimitive,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[repr(u16)]
pub enum Status {
    #[strum(serialize = "OFF")]
    Off = 0,
    #[strum(serialize = "Manual Operation")]
    ManualOperation = 1,
    #[strum(serialize = "Defrost")]
    Defrost = 2,
    #[strum(serialize = "Hot water")]
    HotWater = 3,
    #[strum(serialize = "Heat")]
    Heat = 4,
    #[strum(serialize = "Cool")]
    Cool = 5,
    #[strum(serialize = "Pool")]
    Pool = 6,
    #[strum(serialize = "Anti legionella")]
    AntiLegionella = 7,
    #[strum(serialize = "Standby")]
    Standby = 98,
    #[strum(serialize = "No demand")]
    NoDemand = 99,
}

impl Status {
    pub fn from_code(code: u16) -> Option<Self> {
        num_traits::FromPrimitive::from_u16(code)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    /// The value of a scaled register, already divided by its scale.
    Number(f64),
    Status(Status),
}

impl Value {
    /// Interpret the value as a flag, the way gate registers are compared.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            Value::Integer(n) => Some(n != 0),
            Value::Number(_) | Value::Status(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Integer(n) => Some(n),
            Value::Bool(b) => Some(i64::from(b)),
            Value::Number(_) | Value::Status(_) => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Value::Bool(b) => f.write_fmt(format_args!("{}", b)),
            Value::Integer(n) => f.write_fmt(format_args!("{}", n)),
            Value::Number(n) => f.write_fmt(format_args!("{}", n)),
            Value::Status(s) => f.write_str(s.into()),
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Value::Bool(b) => serializer.serialize_bool(b),
            Value::Integer(n) => serializer.serialize_i64(n),
            Value::Number(n) => serializer.serialize_f64(n),
            Value::Status(s) => serializer.serialize_str(s.into()),
        }
    }
}

/// What ends up on the wire for a single write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawWrite {
    Coil(bool),
    Register(u16),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("`{name}` needs {expected} words, but only {got} were available")]
    NotEnoughWords { name: &'static str, expected: usize, got: usize },
    #[error("register `{0}` is not writable")]
    NotWritable(&'static str),
    #[error("value `{value}` has the wrong type for `{name}`")]
    WrongValueType { name: &'static str, value: Value },
    #[error("value `{value}` is out of range for `{name}`")]
    OutOfRange { name: &'static str, value: Value },
    #[error("could not parse `{text}` as a value for `{name}`")]
    Parse { name: &'static str, text: String },
}

/// Decode the value of `register` from `words`, which start at the register's address.
pub fn decode(register: &Descriptor, words: &[u16]) -> Result<Value, Error> {
    let expected = usize::from(register.data_type.words());
    let Some(words) = words.get(..expected) else {
        return Err(Error::NotEnoughWords { name: register.name, expected, got: words.len() });
    };
    let raw = match register.data_type {
        DataType::Wide32 => (i64::from(words[0]) << 16) | i64::from(words[1]),
        DataType::Signed16 => match words[0] {
            NO_READING => 0,
            word => i64::from(word as i16),
        },
        DataType::Status => {
            return Ok(match Status::from_code(words[0]) {
                Some(status) => Value::Status(status),
                None => Value::Integer(words[0].into()),
            });
        }
        DataType::Boolean => return Ok(Value::Bool(words[0] != 0)),
        DataType::Unsigned16 => i64::from(words[0]),
    };
    Ok(if register.scale == 1 {
        Value::Integer(raw)
    } else {
        Value::Number(raw as f64 / f64::from(register.scale))
    })
}

/// Encode `value` into what a single write to `register` has to carry.
pub fn encode(register: &Descriptor, value: Value) -> Result<RawWrite, Error> {
    if !register.mode.is_writable() {
        return Err(Error::NotWritable(register.name));
    }
    let wrong_type = || Error::WrongValueType { name: register.name, value };
    let out_of_range = || Error::OutOfRange { name: register.name, value };
    match register.kind {
        RegionKind::DiscreteInput | RegionKind::InputRegister => {
            Err(Error::NotWritable(register.name))
        }
        RegionKind::Coil => match value {
            Value::Bool(b) => Ok(RawWrite::Coil(b)),
            Value::Integer(0) => Ok(RawWrite::Coil(false)),
            Value::Integer(1) => Ok(RawWrite::Coil(true)),
            Value::Integer(_) => Err(out_of_range()),
            Value::Number(_) | Value::Status(_) => Err(wrong_type()),
        },
        RegionKind::HoldingRegister => {
            let raw = match value {
                Value::Integer(n) => {
                    n.checked_mul(i64::from(register.scale)).ok_or_else(out_of_range)?
                }
                Value::Number(n) => scale_number(n, register.scale).ok_or_else(out_of_range)?,
                Value::Bool(_) | Value::Status(_) => return Err(wrong_type()),
            };
            let word = match register.data_type {
                DataType::Signed16 => i16::try_from(raw).map(|v| v as u16),
                DataType::Unsigned16 | DataType::Boolean => u16::try_from(raw),
                DataType::Wide32 | DataType::Status => {
                    return Err(Error::NotWritable(register.name));
                }
            };
            word.map(RawWrite::Register).map_err(|_| out_of_range())
        }
    }
}

/// Multiply by the scale and truncate toward zero.
///
/// Products within a millionth of an integer are taken as that integer, so that `21.3 * 10`
/// writes 213 rather than 212.
fn scale_number(n: f64, scale: u16) -> Option<i64> {
    let scaled = n * f64::from(scale);
    if !scaled.is_finite() || scaled.abs() > i64::MAX as f64 {
        return None;
    }
    let nearest = scaled.round();
    let raw = if (scaled - nearest).abs() < 1e-6 { nearest } else { scaled.trunc() };
    Some(raw as i64)
}

/// Parse a user-supplied value in the shape `register` expects.
pub fn parse(register: &Descriptor, text: &str) -> Result<Value, Error> {
    let error = || Error::Parse { name: register.name, text: text.to_string() };
    let text = text.trim();
    match (register.kind, register.data_type) {
        (RegionKind::Coil | RegionKind::DiscreteInput, _) | (_, DataType::Boolean) => {
            match text.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => Ok(Value::Bool(true)),
                "0" | "false" | "off" => Ok(Value::Bool(false)),
                _ => Err(error()),
            }
        }
        _ if register.scale != 1 => text.parse().map(Value::Number).map_err(|_| error()),
        _ => text.parse().map(Value::Integer).map_err(|_| error()),
    }
}
