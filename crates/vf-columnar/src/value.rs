use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use num_complex::Complex64;
use vf_types::{DEFAULT_TIME_FORMAT, Domain, Element, GroupKey, Time, TypeError};

use crate::Vector;

/// A single element lifted out of its payload.
///
/// `Value` is the element type of the `Any` domain and the cell type of the
/// row maps handed to row predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Na,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Complex(Complex64),
    String(String),
    Time(Time),
    Vector(Vector),
}

fn float_to_i64(value: f64) -> Option<i64> {
    if value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Some(value.trunc() as i64)
    } else {
        None
    }
}

fn time_to_f64(value: &Time) -> f64 {
    let utc = value.and_utc();
    utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) / 1e9
}

impl Value {
    #[must_use]
    pub fn domain(&self) -> Domain {
        match self {
            Self::Na => Domain::Na,
            Self::Boolean(_) => Domain::Boolean,
            Self::Integer(_) => Domain::Integer,
            Self::Float(_) => Domain::Float,
            Self::Complex(_) => Domain::Complex,
            Self::String(_) => Domain::String,
            Self::Time(_) => Domain::Time,
            Self::Vector(_) => Domain::Vector,
        }
    }

    #[must_use]
    pub fn is_na(&self) -> bool {
        matches!(self, Self::Na)
    }

    /// Numeric view used by reductions. Only the numeric tower converts.
    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Boolean(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Integer(v) => Ok(*v as f64),
            Self::Float(v) => Ok(*v),
            Self::Na => Err(TypeError::ValueIsMissing),
            other => Err(TypeError::NonNumeric {
                domain: other.domain(),
            }),
        }
    }

    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            Self::Integer(v) => Some(*v != 0),
            Self::Float(v) if v.is_nan() => None,
            Self::Float(v) => Some(*v != 0.0),
            Self::Complex(v) => Some(v.re != 0.0 || v.im != 0.0),
            Self::String(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Some(true),
                "false" | "f" | "no" | "0" => Some(false),
                _ => None,
            },
            Self::Na | Self::Time(_) | Self::Vector(_) => None,
        }
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Boolean(v) => Some(i64::from(*v)),
            Self::Integer(v) => Some(*v),
            Self::Float(v) => float_to_i64(*v),
            Self::Complex(v) => float_to_i64(v.re),
            Self::String(v) => {
                let trimmed = v.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().and_then(float_to_i64))
            }
            Self::Time(v) => Some(v.and_utc().timestamp()),
            Self::Na | Self::Vector(_) => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Boolean(_) | Self::Integer(_) | Self::Float(_) => self.to_f64().ok(),
            Self::Complex(v) => Some(v.re),
            Self::String(v) => v.trim().parse::<f64>().ok(),
            Self::Time(v) => Some(time_to_f64(v)),
            Self::Na | Self::Vector(_) => None,
        }
    }

    #[must_use]
    pub fn as_complex(&self) -> Option<Complex64> {
        match self {
            Self::Complex(v) => Some(*v),
            Self::String(v) => Complex64::from_str(v.trim()).ok(),
            Self::Boolean(_) | Self::Integer(_) | Self::Float(_) | Self::Time(_) => {
                self.as_float().map(|re| Complex64::new(re, 0.0))
            }
            Self::Na | Self::Vector(_) => None,
        }
    }

    #[must_use]
    pub fn as_string(&self, time_format: &str) -> Option<String> {
        match self {
            Self::Na => None,
            Self::String(v) => Some(v.clone()),
            Self::Time(v) => Some(v.format(time_format).to_string()),
            other => Some(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_time(&self, time_format: &str) -> Option<Time> {
        match self {
            Self::Time(v) => Some(*v),
            Self::Integer(v) => DateTime::from_timestamp(*v, 0).map(|t| t.naive_utc()),
            Self::Float(v) if v.is_finite() => {
                let secs = v.floor();
                let nanos = (((v - secs) * 1e9) as u32).min(999_999_999);
                float_to_i64(secs)
                    .and_then(|s| DateTime::from_timestamp(s, nanos))
                    .map(|t| t.naive_utc())
            }
            Self::String(v) => Time::parse_from_str(v.trim(), time_format).ok(),
            _ => None,
        }
    }
}

impl Element for Value {
    const DOMAIN: Domain = Domain::Any;

    fn na_default() -> Self {
        Self::Na
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Na, Self::Na) => Ordering::Equal,
            (Self::Na, _) => Ordering::Greater,
            (_, Self::Na) => Ordering::Less,
            (Self::Boolean(a), Self::Boolean(b)) => a.compare(b),
            (Self::Integer(a), Self::Integer(b)) => a.compare(b),
            (Self::Complex(a), Self::Complex(b)) => a.compare(b),
            (Self::String(a), Self::String(b)) => a.compare(b),
            (Self::Time(a), Self::Time(b)) => a.compare(b),
            (Self::Vector(a), Self::Vector(b)) => a.compare(b),
            // Numbers of different domains interleave by value but never
            // tie, since their group keys differ.
            (a, b) if a.domain().is_numeric() && b.domain().is_numeric() => {
                match (a.to_f64(), b.to_f64()) {
                    (Ok(x), Ok(y)) => x.compare(&y).then_with(|| a.domain().cmp(&b.domain())),
                    _ => a.domain().cmp(&b.domain()),
                }
            }
            (a, b) => a.domain().cmp(&b.domain()),
        }
    }

    fn group_key(&self) -> GroupKey<'_> {
        match self {
            Self::Na => GroupKey::Seq(Vec::new()),
            Self::Boolean(v) => v.group_key(),
            Self::Integer(v) => v.group_key(),
            Self::Float(v) => v.group_key(),
            Self::Complex(v) => v.group_key(),
            Self::String(v) => v.group_key(),
            Self::Time(v) => v.group_key(),
            Self::Vector(v) => v.group_key(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Na => f.write_str("NA"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Complex(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Time(v) => write!(f, "{}", v.format(DEFAULT_TIME_FORMAT)),
            Self::Vector(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Complex64> for Value {
    fn from(value: Complex64) -> Self {
        Self::Complex(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Time> for Value {
    fn from(value: Time) -> Self {
        Self::Time(value)
    }
}

impl From<Vector> for Value {
    fn from(value: Vector) -> Self {
        Self::Vector(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Na, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use chrono::NaiveDate;
    use num_complex::Complex64;
    use vf_types::{DEFAULT_TIME_FORMAT, Domain, Element, TypeError};

    use super::Value;

    #[test]
    fn to_f64_rejects_non_numeric_domains() {
        assert_eq!(Value::Integer(4).to_f64(), Ok(4.0));
        assert_eq!(Value::Na.to_f64(), Err(TypeError::ValueIsMissing));
        assert_eq!(
            Value::from("x").to_f64(),
            Err(TypeError::NonNumeric {
                domain: Domain::String
            })
        );
    }

    #[test]
    fn string_parsing_coercions() {
        assert_eq!(Value::from(" 42 ").as_integer(), Some(42));
        assert_eq!(Value::from("3.9").as_integer(), Some(3));
        assert_eq!(Value::from("yes").as_boolean(), Some(true));
        assert_eq!(Value::from("maybe").as_boolean(), None);
        assert_eq!(Value::from("2.5").as_float(), Some(2.5));
        assert_eq!(
            Value::from("1+2i").as_complex(),
            Some(Complex64::new(1.0, 2.0))
        );
    }

    #[test]
    fn float_to_integer_truncates_and_rejects_non_finite() {
        assert_eq!(Value::Float(-2.7).as_integer(), Some(-2));
        assert_eq!(Value::Float(f64::NAN).as_integer(), None);
        assert_eq!(Value::Float(f64::INFINITY).as_integer(), None);
    }

    #[test]
    fn time_round_trips_through_string_format() {
        let t = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .expect("valid time");
        let text = Value::Time(t).as_string(DEFAULT_TIME_FORMAT).expect("formats");
        assert_eq!(text, "2024-03-01 12:30:00");
        assert_eq!(Value::String(text).as_time(DEFAULT_TIME_FORMAT), Some(t));
    }

    #[test]
    fn integer_time_is_unix_seconds() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 1, 0))
            .expect("valid time");
        assert_eq!(Value::Integer(60).as_time(DEFAULT_TIME_FORMAT), Some(epoch));
        assert_eq!(Value::Time(epoch).as_integer(), Some(60));
    }

    #[test]
    fn mixed_numeric_values_compare_by_magnitude() {
        assert_eq!(Value::Integer(2).compare(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Na.compare(&Value::Integer(1)), Ordering::Greater);
        assert_eq!(
            Value::from("a").compare(&Value::Integer(1)),
            Domain::String.cmp(&Domain::Integer)
        );
    }

    #[test]
    fn numbers_of_different_domains_never_tie() {
        let one = Value::Integer(1);
        assert_eq!(Value::Boolean(true).compare(&one), Ordering::Less);
        assert_eq!(one.compare(&Value::Float(1.0)), Ordering::Less);
        assert_eq!(Value::Float(1.0).compare(&Value::Float(1.0)), Ordering::Equal);
        assert_ne!(one.group_key(), Value::Float(1.0).group_key());
    }

    #[test]
    fn fractional_seconds_just_below_a_whole_second_stay_in_range() {
        // The fraction of -1e-17 below -1 rounds to exactly 1.0.
        let time = Value::Float(-1e-17)
            .as_time(DEFAULT_TIME_FORMAT)
            .expect("in range");
        let expected = NaiveDate::from_ymd_opt(1969, 12, 31)
            .and_then(|d| d.and_hms_nano_opt(23, 59, 59, 999_999_999))
            .expect("valid time");
        assert_eq!(time, expected);
    }

    #[test]
    fn option_converts_none_to_na() {
        assert_eq!(Value::from(None::<i64>), Value::Na);
        assert_eq!(Value::from(Some(3_i64)), Value::Integer(3));
    }
}
