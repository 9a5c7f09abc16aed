//! Sensor values: a closed sum type over the four tags a producer may send.
//!
//! Numeric accessors coerce integers and doubles to `f64`; every other
//! mismatched access returns [`ModelError::TypeMismatch`].

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integer,
    Boolean,
    Double,
    String,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Boolean => write!(f, "boolean"),
            Self::Double => write!(f, "double"),
            Self::String => write!(f, "string"),
        }
    }
}

/// One reading. Immutable once constructed.
///
/// Serialises as the bare JSON scalar, so a recorded `42` reads back as an
/// integer and `42.5` as a double.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Double(f64),
    String(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Integer(_) => ValueKind::Integer,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Double(_) => ValueKind::Double,
            Self::String(_) => ValueKind::String,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer(_))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::Boolean(_))
    }

    pub fn is_double(&self) -> bool {
        matches!(self, Self::Double(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Integers and doubles are numeric; booleans are not.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Double(_))
    }

    pub fn as_integer(&self) -> Result<i64> {
        match self {
            Self::Integer(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Integer)),
        }
    }

    pub fn as_boolean(&self) -> Result<bool> {
        match self {
            Self::Boolean(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Boolean)),
        }
    }

    pub fn as_double(&self) -> Result<f64> {
        match self {
            Self::Double(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Double)),
        }
    }

    /// Integer or double coerced to `f64`.
    pub fn as_numeric(&self) -> Result<f64> {
        match self {
            Self::Integer(v) => Ok(*v as f64),
            Self::Double(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Double)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::String(v) => Ok(v),
            other => Err(other.mismatch(ValueKind::String)),
        }
    }

    fn mismatch(&self, expected: ValueKind) -> ModelError {
        ModelError::TypeMismatch {
            expected,
            actual: self.kind(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Double(v) => f.write_str(&format_significant(*v)),
            Self::String(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

/// Values above `i64::MAX` wrap to negative integers.
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Double(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Format a double with at most 6 significant digits, trailing zeros trimmed.
/// Switches to exponent notation outside `[1e-4, 1e6)`.
fn format_significant(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }

    let exp = v.abs().log10().floor() as i32;
    if (-4..6).contains(&exp) {
        let decimals = (5 - exp).max(0) as usize;
        trim_fraction(format!("{v:.decimals$}"))
    } else {
        let sci = format!("{v:.5e}");
        let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa.to_string()),
            exponent.abs()
        )
    }
}

fn trim_fraction(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
