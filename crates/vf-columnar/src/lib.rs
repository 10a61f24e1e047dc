#![forbid(unsafe_code)]

mod mask;
mod value;

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use vf_types::{DEFAULT_TIME_FORMAT, Domain, Element, GroupKey, Time, common_domain};

pub use mask::NaMask;
pub use value::Value;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ColumnError {
    #[error("data length ({data}) does not match NA mask length ({na})")]
    LengthMismatch { data: usize, na: usize },
}

/// Typed storage for one payload: an immutable, reference-counted data
/// buffer and a same-length NA mask.
///
/// Missing slots always hold `T::na_default()`, so cloning, slicing and
/// comparing never depend on what a caller originally wrote there.
#[derive(Debug, Clone)]
pub struct Array<T> {
    data: Arc<[T]>,
    na: Arc<NaMask>,
}

impl<T: Element> Array<T> {
    pub fn new(data: Vec<T>, na: Vec<bool>) -> Result<Self, ColumnError> {
        if data.len() != na.len() {
            return Err(ColumnError::LengthMismatch {
                data: data.len(),
                na: na.len(),
            });
        }
        Ok(Self::from_parts(data, NaMask::from_flags(&na)))
    }

    fn from_parts(mut data: Vec<T>, na: NaMask) -> Self {
        debug_assert_eq!(data.len(), na.len());
        for (slot, missing) in data.iter_mut().zip(na.flags()) {
            if missing {
                *slot = T::na_default();
            }
        }
        Self {
            data: data.into(),
            na: Arc::new(na),
        }
    }

    #[must_use]
    pub fn valid(data: Vec<T>) -> Self {
        let len = data.len();
        Self {
            data: data.into(),
            na: Arc::new(NaMask::none(len)),
        }
    }

    #[must_use]
    pub fn all_na(len: usize) -> Self {
        Self {
            data: vec![T::na_default(); len].into(),
            na: Arc::new(NaMask::all(len)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[must_use]
    pub fn na(&self) -> &NaMask {
        &self.na
    }

    #[must_use]
    pub fn is_na(&self, pos: usize) -> bool {
        self.na.get(pos)
    }

    /// Element at a 0-based position; `None` when missing or out of range.
    #[must_use]
    pub fn get(&self, pos: usize) -> Option<&T> {
        if self.na.get(pos) {
            None
        } else {
            self.data.get(pos)
        }
    }

    #[must_use]
    pub fn take(&self, positions: &[Option<usize>]) -> Self {
        let mut data = Vec::with_capacity(positions.len());
        let mut na = NaMask::none(positions.len());
        for (out, slot) in positions.iter().enumerate() {
            match slot.and_then(|pos| self.get(pos)) {
                Some(value) => data.push(value.clone()),
                None => {
                    data.push(T::na_default());
                    na.set(out, true);
                }
            }
        }
        Self {
            data: data.into(),
            na: Arc::new(na),
        }
    }

    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let mut data = Vec::with_capacity(self.len() + other.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&other.data);
        let mut na = NaMask::clone(&self.na);
        na.extend_from(&other.na);
        Self {
            data: data.into(),
            na: Arc::new(na),
        }
    }

    fn compare_positions(&self, left: usize, right: usize) -> Ordering {
        match (self.get(left), self.get(right)) {
            (Some(a), Some(b)) => a.compare(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn group_rows(&self, rows: &[usize]) -> Vec<Vec<usize>> {
        let mut slots = HashMap::<GroupKey<'_>, usize>::new();
        let mut groups = Vec::<Vec<usize>>::new();
        let mut na_rows = Vec::new();

        for &row in rows {
            let Some(value) = row.checked_sub(1).and_then(|pos| self.get(pos)) else {
                na_rows.push(row);
                continue;
            };
            match slots.entry(value.group_key()) {
                Entry::Occupied(slot) => groups[*slot.get()].push(row),
                Entry::Vacant(slot) => {
                    slot.insert(groups.len());
                    groups.push(vec![row]);
                }
            }
        }

        if !na_rows.is_empty() {
            groups.push(na_rows);
        }
        groups
    }

    fn sort_rows(&self, rows: &[usize]) -> (Vec<usize>, Vec<usize>) {
        // Row 0 wraps to usize::MAX, which the mask reads as missing.
        let position = |row: usize| row.wrapping_sub(1);

        let mut order = rows.to_vec();
        order.sort_by(|&a, &b| self.compare_positions(position(a), position(b)));

        let mut ranks = Vec::with_capacity(order.len());
        let mut rank = 0;
        for (i, &row) in order.iter().enumerate() {
            let tied = i > 0
                && self.compare_positions(position(order[i - 1]), position(row)) == Ordering::Equal;
            if i > 0 && !tied {
                rank += 1;
            }
            ranks.push(rank);
        }
        (order, ranks)
    }
}

impl<T: Element> PartialEq for Array<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.na == other.na
            && (0..self.len()).all(|pos| self.get(pos) == other.get(pos))
    }
}

/// Typed column storage for exactly one value domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Boolean(Array<bool>),
    Integer(Array<i64>),
    Float(Array<f64>),
    Complex(Array<Complex64>),
    String(Array<String>),
    Time(Array<Time>),
    Vector(Array<Vector>),
    Any(Array<Value>),
    /// Untyped column of the given length where every element is missing.
    Na(usize),
}

macro_rules! dispatch {
    ($payload:expr, $array:ident => $body:expr, $len:ident => $na:expr) => {
        match $payload {
            Payload::Boolean($array) => $body,
            Payload::Integer($array) => $body,
            Payload::Float($array) => $body,
            Payload::Complex($array) => $body,
            Payload::String($array) => $body,
            Payload::Time($array) => $body,
            Payload::Vector($array) => $body,
            Payload::Any($array) => $body,
            Payload::Na($len) => $na,
        }
    };
}

macro_rules! map_payload {
    ($payload:expr, $array:ident => $body:expr, $len:ident => $na:expr) => {
        match $payload {
            Payload::Boolean($array) => Payload::Boolean($body),
            Payload::Integer($array) => Payload::Integer($body),
            Payload::Float($array) => Payload::Float($body),
            Payload::Complex($array) => Payload::Complex($body),
            Payload::String($array) => Payload::String($body),
            Payload::Time($array) => Payload::Time($body),
            Payload::Vector($array) => Payload::Vector($body),
            Payload::Any($array) => Payload::Any($body),
            Payload::Na($len) => $na,
        }
    };
}

impl Payload {
    #[must_use]
    pub fn domain(&self) -> Domain {
        match self {
            Self::Boolean(_) => Domain::Boolean,
            Self::Integer(_) => Domain::Integer,
            Self::Float(_) => Domain::Float,
            Self::Complex(_) => Domain::Complex,
            Self::String(_) => Domain::String,
            Self::Time(_) => Domain::Time,
            Self::Vector(_) => Domain::Vector,
            Self::Any(_) => Domain::Any,
            Self::Na(_) => Domain::Na,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        dispatch!(self, array => array.len(), len => *len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_na(&self, pos: usize) -> bool {
        dispatch!(self, array => array.is_na(pos), _len => true)
    }

    #[must_use]
    pub fn na_count(&self) -> usize {
        dispatch!(self, array => array.na().count_na(), len => *len)
    }

    #[must_use]
    pub fn na_flags(&self) -> Vec<bool> {
        dispatch!(self, array => array.na().to_vec(), len => vec![true; *len])
    }

    #[must_use]
    pub fn value(&self, pos: usize) -> Value {
        match self {
            Self::Boolean(a) => a.get(pos).map_or(Value::Na, |v| Value::Boolean(*v)),
            Self::Integer(a) => a.get(pos).map_or(Value::Na, |v| Value::Integer(*v)),
            Self::Float(a) => a.get(pos).map_or(Value::Na, |v| Value::Float(*v)),
            Self::Complex(a) => a.get(pos).map_or(Value::Na, |v| Value::Complex(*v)),
            Self::String(a) => a.get(pos).map_or(Value::Na, |v| Value::String(v.clone())),
            Self::Time(a) => a.get(pos).map_or(Value::Na, |v| Value::Time(*v)),
            Self::Vector(a) => a.get(pos).map_or(Value::Na, |v| Value::Vector(v.clone())),
            Self::Any(a) => a.get(pos).cloned().unwrap_or(Value::Na),
            Self::Na(_) => Value::Na,
        }
    }

    #[must_use]
    pub fn key_at(&self, pos: usize) -> Option<GroupKey<'_>> {
        dispatch!(self, array => array.get(pos).map(Element::group_key), _len => None)
    }

    #[must_use]
    pub fn take(&self, positions: &[Option<usize>]) -> Self {
        map_payload!(self, array => array.take(positions), _len => Self::Na(positions.len()))
    }

    fn group_rows(&self, rows: &[usize]) -> Vec<Vec<usize>> {
        dispatch!(
            self,
            array => array.group_rows(rows),
            _len => if rows.is_empty() { Vec::new() } else { vec![rows.to_vec()] }
        )
    }

    fn sort_rows(&self, rows: &[usize]) -> (Vec<usize>, Vec<usize>) {
        dispatch!(
            self,
            array => array.sort_rows(rows),
            _len => (rows.to_vec(), vec![0; rows.len()])
        )
    }
}

/// Element types that own a `Payload` variant.
pub trait Native: Element {
    fn wrap(array: Array<Self>) -> Payload;

    fn view(payload: &Payload) -> Option<&Array<Self>>;

    /// Typed input for Apply/Which. Only `Value` accepts payloads of other
    /// domains, by lifting each element.
    fn extract(payload: &Payload) -> Option<Cow<'_, Array<Self>>> {
        Self::view(payload).map(Cow::Borrowed)
    }
}

macro_rules! impl_native {
    ($ty:ty, $variant:ident) => {
        impl Native for $ty {
            fn wrap(array: Array<Self>) -> Payload {
                Payload::$variant(array)
            }

            fn view(payload: &Payload) -> Option<&Array<Self>> {
                match payload {
                    Payload::$variant(array) => Some(array),
                    _ => None,
                }
            }
        }
    };
}

impl_native!(bool, Boolean);
impl_native!(i64, Integer);
impl_native!(f64, Float);
impl_native!(Complex64, Complex);
impl_native!(String, String);
impl_native!(Time, Time);
impl_native!(Vector, Vector);

impl Native for Value {
    // A `Value::Na` element is missing even when its mask bit is clear.
    fn wrap(array: Array<Self>) -> Payload {
        if array.data.iter().all(|v| !v.is_na()) {
            return Payload::Any(array);
        }
        let flags: Vec<bool> = array
            .data
            .iter()
            .zip(array.na.flags())
            .map(|(value, missing)| missing || value.is_na())
            .collect();
        Payload::Any(Array::from_parts(
            array.data.to_vec(),
            NaMask::from_flags(&flags),
        ))
    }

    fn view(payload: &Payload) -> Option<&Array<Self>> {
        match payload {
            Payload::Any(array) => Some(array),
            _ => None,
        }
    }

    fn extract(payload: &Payload) -> Option<Cow<'_, Array<Self>>> {
        if let Payload::Any(array) = payload {
            return Some(Cow::Borrowed(array));
        }
        let values = (0..payload.len()).map(|pos| payload.value(pos)).collect();
        let na = NaMask::from_flags(&payload.na_flags());
        Some(Cow::Owned(Array::from_parts(values, na)))
    }
}

/// Elementwise transform over a column of `T`, producing elements of `U`.
///
/// The output domain is `U`'s domain. Row numbers passed to `Indexed` are
/// 1-based.
pub enum Applier<'a, T, U> {
    Indexed(Box<dyn FnMut(usize, &T, bool) -> (U, bool) + 'a>),
    WithNa(Box<dyn FnMut(&T, bool) -> (U, bool) + 'a>),
    /// Missing inputs produce missing outputs without invoking the function.
    Value(Box<dyn FnMut(&T) -> U + 'a>),
}

impl<'a, T, U> Applier<'a, T, U> {
    pub fn indexed(f: impl FnMut(usize, &T, bool) -> (U, bool) + 'a) -> Self {
        Self::Indexed(Box::new(f))
    }

    pub fn with_na(f: impl FnMut(&T, bool) -> (U, bool) + 'a) -> Self {
        Self::WithNa(Box::new(f))
    }

    pub fn value(f: impl FnMut(&T) -> U + 'a) -> Self {
        Self::Value(Box::new(f))
    }
}

/// Elementwise predicate over a column of `T`.
pub enum Predicate<'a, T> {
    Indexed(Box<dyn FnMut(usize, &T, bool) -> bool + 'a>),
    WithNa(Box<dyn FnMut(&T, bool) -> bool + 'a>),
    Value(Box<dyn FnMut(&T) -> bool + 'a>),
}

impl<'a, T> Predicate<'a, T> {
    pub fn indexed(f: impl FnMut(usize, &T, bool) -> bool + 'a) -> Self {
        Self::Indexed(Box::new(f))
    }

    pub fn with_na(f: impl FnMut(&T, bool) -> bool + 'a) -> Self {
        Self::WithNa(Box::new(f))
    }

    pub fn value(f: impl FnMut(&T) -> bool + 'a) -> Self {
        Self::Value(Box::new(f))
    }
}

fn push_result<U: Element>(data: &mut Vec<U>, na: &mut NaMask, pos: usize, result: (U, bool)) {
    let (value, missing) = result;
    if missing {
        data.push(U::na_default());
        na.set(pos, true);
    } else {
        data.push(value);
    }
}

fn apply_array<T: Element, U: Element>(input: &Array<T>, applier: Applier<'_, T, U>) -> Array<U> {
    let mut data = Vec::with_capacity(input.len());
    let mut na = NaMask::none(input.len());

    match applier {
        Applier::Indexed(mut f) => {
            for (pos, value) in input.data().iter().enumerate() {
                let result = f(pos + 1, value, input.is_na(pos));
                push_result(&mut data, &mut na, pos, result);
            }
        }
        Applier::WithNa(mut f) => {
            for (pos, value) in input.data().iter().enumerate() {
                let result = f(value, input.is_na(pos));
                push_result(&mut data, &mut na, pos, result);
            }
        }
        Applier::Value(mut f) => {
            for (pos, value) in input.data().iter().enumerate() {
                let result = if input.is_na(pos) {
                    (U::na_default(), true)
                } else {
                    (f(value), false)
                };
                push_result(&mut data, &mut na, pos, result);
            }
        }
    }

    Array {
        data: data.into(),
        na: Arc::new(na),
    }
}

fn which_array<T: Element>(input: &Array<T>, predicate: Predicate<'_, T>) -> Vec<bool> {
    let data = input.data().iter().enumerate();
    match predicate {
        Predicate::Indexed(mut f) => data
            .map(|(pos, value)| {
                let missing = input.is_na(pos);
                f(pos + 1, value, missing) && !missing
            })
            .collect(),
        Predicate::WithNa(mut f) => data
            .map(|(pos, value)| {
                let missing = input.is_na(pos);
                f(value, missing) && !missing
            })
            .collect(),
        Predicate::Value(mut f) => data
            .map(|(pos, value)| !input.is_na(pos) && f(value))
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VectorOptions {
    pub time_format: Option<String>,
}

/// Single-key partition of a column: row groups in first-occurrence order
/// and the key value of each group (missing for the trailing NA group).
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub groups: Vec<Vec<usize>>,
    pub values: Vector,
}

/// A named column wrapping exactly one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    name: Option<String>,
    payload: Payload,
    options: VectorOptions,
}

impl Vector {
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            name: None,
            payload,
            options: VectorOptions::default(),
        }
    }

    #[must_use]
    pub fn from_data<T: Native>(data: Vec<T>) -> Self {
        Self::new(T::wrap(Array::valid(data)))
    }

    pub fn from_data_with_na<T: Native>(data: Vec<T>, na: Vec<bool>) -> Result<Self, ColumnError> {
        Ok(Self::new(T::wrap(Array::new(data, na)?)))
    }

    #[must_use]
    pub fn from_options<T: Native>(values: Vec<Option<T>>) -> Self {
        let na: Vec<bool> = values.iter().map(Option::is_none).collect();
        let data = values
            .into_iter()
            .map(|value| value.unwrap_or_else(T::na_default))
            .collect();
        Self::new(T::wrap(Array::from_parts(data, NaMask::from_flags(&na))))
    }

    #[must_use]
    pub fn na(len: usize) -> Self {
        Self::new(Payload::Na(len))
    }

    #[must_use]
    pub fn boolean(data: Vec<bool>) -> Self {
        Self::from_data(data)
    }

    pub fn boolean_with_na(data: Vec<bool>, na: Vec<bool>) -> Result<Self, ColumnError> {
        Self::from_data_with_na(data, na)
    }

    #[must_use]
    pub fn integer(data: Vec<i64>) -> Self {
        Self::from_data(data)
    }

    pub fn integer_with_na(data: Vec<i64>, na: Vec<bool>) -> Result<Self, ColumnError> {
        Self::from_data_with_na(data, na)
    }

    #[must_use]
    pub fn float(data: Vec<f64>) -> Self {
        Self::from_data(data)
    }

    pub fn float_with_na(data: Vec<f64>, na: Vec<bool>) -> Result<Self, ColumnError> {
        Self::from_data_with_na(data, na)
    }

    #[must_use]
    pub fn complex(data: Vec<Complex64>) -> Self {
        Self::from_data(data)
    }

    pub fn complex_with_na(data: Vec<Complex64>, na: Vec<bool>) -> Result<Self, ColumnError> {
        Self::from_data_with_na(data, na)
    }

    #[must_use]
    pub fn string<S: Into<String>>(data: impl IntoIterator<Item = S>) -> Self {
        Self::from_data(data.into_iter().map(Into::into).collect::<Vec<String>>())
    }

    pub fn string_with_na<S: Into<String>>(
        data: impl IntoIterator<Item = S>,
        na: Vec<bool>,
    ) -> Result<Self, ColumnError> {
        Self::from_data_with_na(data.into_iter().map(Into::into).collect::<Vec<String>>(), na)
    }

    #[must_use]
    pub fn time(data: Vec<Time>) -> Self {
        Self::from_data(data)
    }

    pub fn time_with_na(data: Vec<Time>, na: Vec<bool>) -> Result<Self, ColumnError> {
        Self::from_data_with_na(data, na)
    }

    #[must_use]
    pub fn nested(data: Vec<Vector>) -> Self {
        Self::from_data(data)
    }

    pub fn nested_with_na(data: Vec<Vector>, na: Vec<bool>) -> Result<Self, ColumnError> {
        Self::from_data_with_na(data, na)
    }

    /// `Value::Na` elements become missing.
    #[must_use]
    pub fn any(data: Vec<Value>) -> Self {
        Self::from_data(data)
    }

    fn derived(&self, payload: Payload) -> Self {
        Self {
            name: self.name.clone(),
            payload,
            options: self.options.clone(),
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    #[must_use]
    pub fn options(&self) -> &VectorOptions {
        &self.options
    }

    #[must_use]
    pub fn with_time_format(mut self, format: impl Into<String>) -> Self {
        self.options.time_format = Some(format.into());
        self
    }

    #[must_use]
    pub fn time_format(&self) -> &str {
        self.options
            .time_format
            .as_deref()
            .unwrap_or(DEFAULT_TIME_FORMAT)
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn domain(&self) -> Domain {
        self.payload.domain()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether the element at a 0-based position is missing. Positions past
    /// the end count as missing.
    #[must_use]
    pub fn is_na(&self, pos: usize) -> bool {
        self.payload.is_na(pos)
    }

    #[must_use]
    pub fn na_count(&self) -> usize {
        self.payload.na_count()
    }

    #[must_use]
    pub fn na_flags(&self) -> Vec<bool> {
        self.payload.na_flags()
    }

    #[must_use]
    pub fn value(&self, pos: usize) -> Value {
        self.payload.value(pos)
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        (0..self.len()).map(|pos| self.value(pos)).collect()
    }

    /// Raw data slice when the vector holds domain `T`. Missing slots hold
    /// `T::na_default()`.
    #[must_use]
    pub fn data<T: Native>(&self) -> Option<&[T]> {
        T::view(&self.payload).map(Array::data)
    }

    #[must_use]
    pub fn key_at(&self, pos: usize) -> Option<GroupKey<'_>> {
        self.payload.key_at(pos)
    }

    /// All 1-based row numbers of this vector.
    #[must_use]
    pub fn rows(&self) -> Vec<usize> {
        (1..=self.len()).collect()
    }

    #[must_use]
    pub fn apply<T: Native, U: Native>(&self, applier: Applier<'_, T, U>) -> Self {
        let Some(input) = T::extract(&self.payload) else {
            debug!(
                input = %self.domain(),
                expected = %T::DOMAIN,
                output = %U::DOMAIN,
                "apply input domain mismatch; result is all NA"
            );
            return self.derived(U::wrap(Array::all_na(self.len())));
        };
        self.derived(U::wrap(apply_array(&input, applier)))
    }

    #[must_use]
    pub fn which<T: Native>(&self, predicate: Predicate<'_, T>) -> Vec<bool> {
        let Some(input) = T::extract(&self.payload) else {
            debug!(
                input = %self.domain(),
                expected = %T::DOMAIN,
                "which input domain mismatch; result is all false"
            );
            return vec![false; self.len()];
        };
        which_array(&input, predicate)
    }

    /// Select elements by 0-based position; `None` and out-of-range
    /// positions produce missing elements.
    #[must_use]
    pub fn take(&self, positions: &[Option<usize>]) -> Self {
        self.derived(self.payload.take(positions))
    }

    /// Select elements by 1-based row number. Row `0` and rows past the end
    /// produce missing elements.
    #[must_use]
    pub fn by_indices(&self, indices: &[usize]) -> Self {
        let positions: Vec<Option<usize>> = indices.iter().map(|&row| row.checked_sub(1)).collect();
        self.take(&positions)
    }

    /// Pad with missing elements, or truncate, to exactly `len` elements.
    #[must_use]
    pub fn fit(&self, len: usize) -> Self {
        if len == self.len() {
            return self.clone();
        }
        let positions: Vec<Option<usize>> = (0..len).map(Some).collect();
        self.take(&positions)
    }

    /// Concatenate `other` after `self` in their common domain.
    #[must_use]
    pub fn append(&self, other: &Self) -> Self {
        let domain = common_domain(self.domain(), other.domain());
        let left = self.coerce(domain);
        let right = other.coerce(domain);

        let payload = match (&left.payload, &right.payload) {
            (Payload::Boolean(a), Payload::Boolean(b)) => Payload::Boolean(a.concat(b)),
            (Payload::Integer(a), Payload::Integer(b)) => Payload::Integer(a.concat(b)),
            (Payload::Float(a), Payload::Float(b)) => Payload::Float(a.concat(b)),
            (Payload::Complex(a), Payload::Complex(b)) => Payload::Complex(a.concat(b)),
            (Payload::String(a), Payload::String(b)) => Payload::String(a.concat(b)),
            (Payload::Time(a), Payload::Time(b)) => Payload::Time(a.concat(b)),
            (Payload::Vector(a), Payload::Vector(b)) => Payload::Vector(a.concat(b)),
            (Payload::Any(a), Payload::Any(b)) => Payload::Any(a.concat(b)),
            (Payload::Na(a), Payload::Na(b)) => Payload::Na(a + b),
            _ => {
                let (Payload::Any(a), Payload::Any(b)) =
                    (&left.to_any().payload, &right.to_any().payload)
                else {
                    return Self::na(self.len() + other.len());
                };
                Payload::Any(a.concat(b))
            }
        };
        self.derived(payload)
    }

    #[must_use]
    pub fn coerce(&self, domain: Domain) -> Self {
        match domain {
            Domain::Boolean => self.to_boolean(),
            Domain::Integer => self.to_integer(),
            Domain::Float => self.to_float(),
            Domain::Complex => self.to_complex(),
            Domain::String => self.to_string_vector(),
            Domain::Time => self.to_time(),
            Domain::Vector => self.to_nested(),
            Domain::Any => self.to_any(),
            Domain::Na => self.derived(Payload::Na(self.len())),
        }
    }

    fn convert<U: Native>(&self, cast: impl Fn(&Value) -> Option<U>) -> Self {
        if U::view(&self.payload).is_some() {
            return self.clone();
        }
        let len = self.len();
        let mut data = Vec::with_capacity(len);
        let mut na = NaMask::none(len);
        for pos in 0..len {
            match cast(&self.value(pos)) {
                Some(value) => data.push(value),
                None => {
                    data.push(U::na_default());
                    na.set(pos, true);
                }
            }
        }
        self.derived(U::wrap(Array::from_parts(data, na)))
    }

    #[must_use]
    pub fn to_boolean(&self) -> Self {
        self.convert(Value::as_boolean)
    }

    #[must_use]
    pub fn to_integer(&self) -> Self {
        self.convert(Value::as_integer)
    }

    #[must_use]
    pub fn to_float(&self) -> Self {
        self.convert(Value::as_float)
    }

    #[must_use]
    pub fn to_complex(&self) -> Self {
        self.convert(Value::as_complex)
    }

    #[must_use]
    pub fn to_string_vector(&self) -> Self {
        let format = self.time_format().to_owned();
        self.convert(move |value: &Value| value.as_string(&format))
    }

    #[must_use]
    pub fn to_time(&self) -> Self {
        let format = self.time_format().to_owned();
        self.convert(move |value: &Value| value.as_time(&format))
    }

    #[must_use]
    pub fn to_any(&self) -> Self {
        self.convert(|value: &Value| (!value.is_na()).then(|| value.clone()))
    }

    /// Each element becomes a length-1 nested vector.
    #[must_use]
    pub fn to_nested(&self) -> Self {
        if self.domain() == Domain::Vector {
            return self.clone();
        }
        let data = (0..self.len())
            .map(|pos| Self::new(self.payload.take(&[Some(pos)])))
            .collect();
        let na = NaMask::from_flags(&self.na_flags());
        self.derived(Payload::Vector(Array::from_parts(data, na)))
    }

    /// Group the given 1-based rows by value. Groups follow first-occurrence
    /// order; missing rows form one trailing group.
    #[must_use]
    pub fn group_rows(&self, rows: &[usize]) -> Vec<Vec<usize>> {
        self.payload.group_rows(rows)
    }

    #[must_use]
    pub fn group_by_indices(&self) -> Vec<Vec<usize>> {
        self.group_rows(&self.rows())
    }

    #[must_use]
    pub fn partition(&self) -> Partition {
        let groups = self.group_by_indices();
        let firsts: Vec<usize> = groups
            .iter()
            .map(|group| group.first().copied().unwrap_or(0))
            .collect();
        let values = self.by_indices(&firsts);
        Partition { groups, values }
    }

    /// Stable ascending order of the given 1-based rows, missing last, with
    /// the tie class of each sorted position.
    #[must_use]
    pub fn sort_rows(&self, rows: &[usize]) -> (Vec<usize>, Vec<usize>) {
        self.payload.sort_rows(rows)
    }

    #[must_use]
    pub fn sorted_indices(&self) -> Vec<usize> {
        self.sort_rows(&self.rows()).0
    }

    #[must_use]
    pub fn sorted_indices_with_ranks(&self) -> (Vec<usize>, Vec<usize>) {
        self.sort_rows(&self.rows())
    }
}

impl Element for Vector {
    const DOMAIN: Domain = Domain::Vector;

    fn na_default() -> Self {
        Self::na(0)
    }

    fn compare(&self, other: &Self) -> Ordering {
        for pos in 0..self.len().min(other.len()) {
            let order = self.value(pos).compare(&other.value(pos));
            if order != Ordering::Equal {
                return order;
            }
        }
        self.len().cmp(&other.len())
    }

    fn group_key(&self) -> GroupKey<'_> {
        GroupKey::Seq((0..self.len()).map(|pos| self.key_at(pos)).collect())
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for pos in 0..self.len() {
            if pos > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", self.value(pos))?;
        }
        f.write_str("]")
    }
}

/// Partition 1-based `rows` by several key columns at once.
///
/// The first key partitions all rows; every cell with more than one member
/// is then refined by the remaining keys, restricted to that cell's rows.
#[must_use]
pub fn partition_rows(keys: &[&Vector], rows: &[usize]) -> Vec<Vec<usize>> {
    let Some((first, rest)) = keys.split_first() else {
        return if rows.is_empty() {
            Vec::new()
        } else {
            vec![rows.to_vec()]
        };
    };

    let groups = first.group_rows(rows);
    if rest.is_empty() {
        return groups;
    }

    let mut refined = Vec::with_capacity(groups.len());
    for group in groups {
        if group.len() > 1 {
            refined.extend(partition_rows(rest, &group));
        } else {
            refined.push(group);
        }
    }
    refined
}

#[cfg(test)]
mod tests {
    use num_complex::Complex64;
    use vf_types::{Domain, Time};

    use super::{Applier, ColumnError, Payload, Predicate, Value, Vector, partition_rows};

    fn ints(values: &[Option<i64>]) -> Vector {
        Vector::from_options(values.to_vec())
    }

    #[test]
    fn with_na_constructor_rejects_length_mismatch() {
        let err = Vector::integer_with_na(vec![1, 2], vec![false]).expect_err("must fail");
        assert_eq!(err, ColumnError::LengthMismatch { data: 2, na: 1 });
    }

    #[test]
    fn missing_slots_hold_canonical_default() {
        let v = Vector::integer_with_na(vec![7, 9], vec![false, true]).expect("vector");
        assert_eq!(v.data::<i64>(), Some(&[7, 0][..]));
        let f = Vector::float_with_na(vec![1.5, 2.5], vec![true, false]).expect("vector");
        assert!(f.data::<f64>().expect("float")[0].is_nan());
    }

    #[test]
    fn missing_elements_compare_equal_regardless_of_slot_content() {
        let a = Vector::float_with_na(vec![f64::NAN, 1.0], vec![true, false]).expect("a");
        let b = Vector::from_options(vec![None, Some(1.0)]);
        assert_eq!(a, b);
    }

    #[test]
    fn by_indices_zero_is_missing_for_every_domain() {
        let vectors = [
            Vector::boolean(vec![true]),
            Vector::integer(vec![1]),
            Vector::float(vec![1.0]),
            Vector::complex(vec![Complex64::new(1.0, 1.0)]),
            Vector::string(["a"]),
            Vector::time(vec![Time::default()]),
            Vector::nested(vec![Vector::integer(vec![1])]),
            Vector::any(vec![Value::Integer(1)]),
            Vector::na(1),
        ];
        for v in &vectors {
            let out = v.by_indices(&[0]);
            assert_eq!(out.len(), 1);
            assert!(out.is_na(0), "domain {:?}", v.domain());
            assert_eq!(out.domain(), v.domain());
        }
    }

    #[test]
    fn by_indices_out_of_range_is_missing() {
        let v = Vector::integer(vec![10, 20, 30]);
        let out = v.by_indices(&[3, 4, 1, 0]);
        assert_eq!(
            out.values(),
            vec![Value::Integer(30), Value::Na, Value::Integer(10), Value::Na]
        );
    }

    #[test]
    fn fit_pads_and_truncates() {
        let v = Vector::string(["a", "b"]).with_name("s");
        let padded = v.fit(4);
        assert_eq!(padded.len(), 4);
        assert_eq!(padded.na_flags(), vec![false, false, true, true]);
        assert_eq!(padded.name(), Some("s"));
        assert_eq!(v.fit(1).values(), vec![Value::from("a")]);
    }

    #[test]
    fn apply_integer_to_float_preserves_missing() {
        let v = ints(&[Some(-2), None, Some(3)]);
        let out = v.apply(Applier::with_na(|x: &i64, na: bool| ((*x as f64).abs(), na)));
        assert_eq!(out.domain(), Domain::Float);
        assert_eq!(out.len(), 3);
        assert_eq!(
            out.values(),
            vec![Value::Float(2.0), Value::Na, Value::Float(3.0)]
        );
    }

    #[test]
    fn apply_complex_to_float() {
        let v = Vector::complex(vec![Complex64::new(3.0, 4.0)]);
        let out = v.apply(Applier::value(|z: &Complex64| z.norm()));
        assert_eq!(out.data::<f64>(), Some(&[5.0][..]));
    }

    #[test]
    fn apply_with_unmatched_input_domain_is_all_missing() {
        let v = Vector::string(["a", "b"]);
        let out = v.apply(Applier::value(|x: &i64| *x + 1));
        assert_eq!(out.domain(), Domain::Integer);
        assert_eq!(out.len(), 2);
        assert_eq!(out.na_count(), 2);
    }

    #[test]
    fn value_shape_skips_missing_rows() {
        let mut calls = 0;
        let v = ints(&[Some(1), None, Some(2)]);
        let out = v.apply(Applier::value(|x: &i64| {
            calls += 1;
            x * 10
        }));
        assert_eq!(calls, 2);
        assert_eq!(out.na_flags(), vec![false, true, false]);
    }

    #[test]
    fn indexed_shape_receives_one_based_rows_and_can_signal_missing() {
        let v = Vector::integer(vec![5, 6, 7]);
        let out = v.apply(Applier::indexed(|row: usize, x: &i64, _na: bool| {
            (x + row as i64, row == 2)
        }));
        assert_eq!(
            out.values(),
            vec![Value::Integer(6), Value::Na, Value::Integer(10)]
        );
        assert_eq!(out.data::<i64>(), Some(&[6, 0, 10][..]));
    }

    #[test]
    fn apply_any_lifts_every_domain() {
        let v = Vector::string(["x", "yy"]);
        let out = v.apply(Applier::value(|value: &Value| value.to_string().len() as i64));
        assert_eq!(out.data::<i64>(), Some(&[1, 2][..]));
    }

    #[test]
    fn which_is_false_for_missing_and_mismatched() {
        let v = ints(&[Some(1), None, Some(5)]);
        assert_eq!(
            v.which(Predicate::value(|x: &i64| *x > 0)),
            vec![true, false, true]
        );
        assert_eq!(
            v.which(Predicate::with_na(|_: &i64, _na: bool| true)),
            vec![true, false, true]
        );
        assert_eq!(
            v.which(Predicate::value(|s: &String| s.is_empty())),
            vec![false, false, false]
        );
    }

    #[test]
    fn indexed_which_sees_one_based_rows_and_masks_missing() {
        let v = ints(&[Some(1), None, Some(5)]);
        let mut seen = Vec::new();
        let picked = v.which(Predicate::indexed(|row, _: &i64, na| {
            seen.push((row, na));
            row != 1
        }));
        assert_eq!(picked, vec![false, false, true]);
        assert_eq!(seen, vec![(1, false), (2, true), (3, false)]);
    }

    #[test]
    fn append_promotes_to_common_domain() {
        let a = Vector::integer(vec![1]);
        let b = Vector::float(vec![2.5]);
        let ab = a.append(&b);
        assert_eq!(ab.domain(), Domain::Float);
        assert_eq!(ab.data::<f64>(), Some(&[1.0, 2.5][..]));

        let na = Vector::na(2);
        let c = na.append(&Vector::string(["z"]));
        assert_eq!(c.domain(), Domain::String);
        assert_eq!(c.na_flags(), vec![true, true, false]);

        let mixed = Vector::string(["s"]).append(&Vector::integer(vec![3]));
        assert_eq!(mixed.domain(), Domain::Any);
        assert_eq!(mixed.values(), vec![Value::from("s"), Value::Integer(3)]);
    }

    #[test]
    fn group_by_keeps_first_occurrence_and_trailing_na() {
        let v = Vector::from_options(vec![
            Some("b".to_owned()),
            None,
            Some("a".to_owned()),
            Some("b".to_owned()),
            None,
        ]);
        let partition = v.partition();
        assert_eq!(partition.groups, vec![vec![1, 4], vec![3], vec![2, 5]]);
        assert_eq!(
            partition.values.values(),
            vec![Value::from("b"), Value::from("a"), Value::Na]
        );
    }

    #[test]
    fn group_by_on_untyped_column_is_one_group() {
        assert_eq!(Vector::na(3).group_by_indices(), vec![vec![1, 2, 3]]);
        assert!(Vector::na(0).group_by_indices().is_empty());
    }

    #[test]
    fn multi_key_partition_refines_only_tied_cells() {
        let a = Vector::integer(vec![1, 1, 2, 1]);
        let b = Vector::string(["x", "y", "x", "x"]);
        let groups = partition_rows(&[&a, &b], &a.rows());
        assert_eq!(groups, vec![vec![1, 4], vec![2], vec![3]]);
    }

    #[test]
    fn nested_vectors_group_by_content() {
        let v = Vector::nested(vec![
            Vector::integer(vec![1, 2]),
            Vector::integer(vec![3]),
            Vector::integer(vec![1, 2]),
        ]);
        assert_eq!(v.group_by_indices(), vec![vec![1, 3], vec![2]]);
    }

    #[test]
    fn sort_is_stable_with_missing_last_and_ranks_ties() {
        let v = ints(&[Some(3), None, Some(1), Some(3), Some(2)]);
        let (order, ranks) = v.sorted_indices_with_ranks();
        assert_eq!(order, vec![3, 5, 1, 4, 2]);
        assert_eq!(ranks, vec![0, 1, 2, 2, 3]);
    }

    #[test]
    fn coercions_turn_parse_failures_into_missing() {
        let v = Vector::string(["1", "x", "3.5"]);
        assert_eq!(
            v.to_integer().values(),
            vec![Value::Integer(1), Value::Na, Value::Integer(3)]
        );
        assert_eq!(
            v.to_float().values(),
            vec![Value::Float(1.0), Value::Na, Value::Float(3.5)]
        );
        let b = Vector::integer(vec![0, 2]).to_boolean();
        assert_eq!(b.data::<bool>(), Some(&[false, true][..]));
        let s = Vector::boolean(vec![true]).to_string_vector();
        assert_eq!(s.data::<String>(), Some(&["true".to_owned()][..]));
    }

    #[test]
    fn any_constructor_marks_na_values_missing() {
        let v = Vector::any(vec![Value::Integer(1), Value::Na]);
        assert!(matches!(v.payload(), Payload::Any(_)));
        assert_eq!(v.na_flags(), vec![false, true]);
    }

    #[test]
    fn display_renders_missing_as_na() {
        assert_eq!(ints(&[Some(1), None]).to_string(), "[1, NA]");
    }
}
