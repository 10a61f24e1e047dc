#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp element type of the `Time` domain.
pub type Time = NaiveDateTime;

/// Format used to render and parse `Time` values when a vector carries no
/// explicit format option.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The closed set of value domains a payload can hold.
///
/// Variant order ranks values of different domains inside an `Any` column:
/// `Boolean` first, `Any` last. `Na` is the untyped all-missing domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Boolean,
    Integer,
    Float,
    Complex,
    String,
    Time,
    Vector,
    Any,
    Na,
}

impl Domain {
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Boolean | Self::Integer | Self::Float)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Complex => "complex",
            Self::String => "string",
            Self::Time => "time",
            Self::Vector => "vector",
            Self::Any => "any",
            Self::Na => "na",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Domain that can hold values of both `left` and `right` without loss of
/// identity. Mixed domains that share no numeric tower collapse to `Any`.
#[must_use]
pub fn common_domain(left: Domain, right: Domain) -> Domain {
    use Domain::{Any, Boolean, Float, Integer, Na};

    match (left, right) {
        (a, b) if a == b => a,
        (Na, other) | (other, Na) => other,
        (Boolean, Integer) | (Integer, Boolean) => Integer,
        (Boolean, Float) | (Float, Boolean) => Float,
        (Integer, Float) | (Float, Integer) => Float,
        _ => Any,
    }
}

/// Hashable identity of one non-missing element, used for grouping and join
/// lookups. Floats hash by bit pattern with `-0.0` folded onto `0.0` and every
/// NaN folded onto one canonical NaN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey<'a> {
    Boolean(bool),
    Integer(i64),
    FloatBits(u64),
    ComplexBits(u64, u64),
    String(&'a str),
    Time(Time),
    Seq(Vec<Option<GroupKey<'a>>>),
}

fn float_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0.0_f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Ascending with every NaN tied and placed after all numbers, matching the
/// NaN folding of `float_bits`.
fn compare_f64(left: f64, right: f64) -> Ordering {
    match (left.is_nan(), right.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

/// Element of a typed payload.
///
/// `na_default` is the canonical value stored in the data slot of a missing
/// element; it is never read as meaningful.
pub trait Element: Clone + fmt::Debug + PartialEq + 'static {
    const DOMAIN: Domain;

    fn na_default() -> Self;

    /// Total order used by sorting. Missing elements never reach this.
    fn compare(&self, other: &Self) -> Ordering;

    fn group_key(&self) -> GroupKey<'_>;
}

impl Element for bool {
    const DOMAIN: Domain = Domain::Boolean;

    fn na_default() -> Self {
        false
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn group_key(&self) -> GroupKey<'_> {
        GroupKey::Boolean(*self)
    }
}

impl Element for i64 {
    const DOMAIN: Domain = Domain::Integer;

    fn na_default() -> Self {
        0
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn group_key(&self) -> GroupKey<'_> {
        GroupKey::Integer(*self)
    }
}

impl Element for f64 {
    const DOMAIN: Domain = Domain::Float;

    fn na_default() -> Self {
        f64::NAN
    }

    fn compare(&self, other: &Self) -> Ordering {
        compare_f64(*self, *other)
    }

    fn group_key(&self) -> GroupKey<'_> {
        GroupKey::FloatBits(float_bits(*self))
    }
}

impl Element for Complex64 {
    const DOMAIN: Domain = Domain::Complex;

    fn na_default() -> Self {
        Complex64::new(f64::NAN, f64::NAN)
    }

    // Lexicographic on (re, im); complex numbers have no natural order.
    fn compare(&self, other: &Self) -> Ordering {
        compare_f64(self.re, other.re).then_with(|| compare_f64(self.im, other.im))
    }

    fn group_key(&self) -> GroupKey<'_> {
        GroupKey::ComplexBits(float_bits(self.re), float_bits(self.im))
    }
}

impl Element for String {
    const DOMAIN: Domain = Domain::String;

    fn na_default() -> Self {
        String::new()
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn group_key(&self) -> GroupKey<'_> {
        GroupKey::String(self.as_str())
    }
}

impl Element for Time {
    const DOMAIN: Domain = Domain::Time;

    fn na_default() -> Self {
        Time::default()
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn group_key(&self) -> GroupKey<'_> {
        GroupKey::Time(*self)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("value of domain {domain} is not numeric")]
    NonNumeric { domain: Domain },
    #[error("value is missing")]
    ValueIsMissing,
}
