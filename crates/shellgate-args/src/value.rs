// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Value tree produced by the argument parser.

use std::fmt;
use std::ops::BitOr;

use crate::error::{DuplicateKey, ValidationError};

// ---------------------------------------------------------------------------
// Kind / KindSet
// ---------------------------------------------------------------------------

/// The kind of a [`Value`]. Each kind owns one bit so kinds compose into a
/// [`KindSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Empty,
    String,
    Int32,
    Int64,
    Double,
    Bool,
    Null,
    Array,
    Object,
}

impl Kind {
    pub const ALL: [Kind; 9] = [
        Kind::Empty,
        Kind::String,
        Kind::Int32,
        Kind::Int64,
        Kind::Double,
        Kind::Bool,
        Kind::Null,
        Kind::Array,
        Kind::Object,
    ];

    pub const fn bit(self) -> u16 {
        1 << self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Empty => "Empty",
            Kind::String => "String",
            Kind::Int32 => "Int32",
            Kind::Int64 => "Int64",
            Kind::Double => "Double",
            Kind::Bool => "Bool",
            Kind::Null => "Null",
            Kind::Array => "Array",
            Kind::Object => "Object",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A union of acceptable kinds for one positional argument.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KindSet(u16);

impl KindSet {
    pub const NONE: KindSet = KindSet(0);
    pub const EMPTY: KindSet = KindSet::of(Kind::Empty);
    pub const STRING: KindSet = KindSet::of(Kind::String);
    pub const INT32: KindSet = KindSet::of(Kind::Int32);
    pub const INT64: KindSet = KindSet::of(Kind::Int64);
    pub const DOUBLE: KindSet = KindSet::of(Kind::Double);
    pub const BOOL: KindSet = KindSet::of(Kind::Bool);
    pub const NULL: KindSet = KindSet::of(Kind::Null);
    pub const ARRAY: KindSet = KindSet::of(Kind::Array);
    pub const OBJECT: KindSet = KindSet::of(Kind::Object);
    /// Any numeric kind.
    pub const NUMBER: KindSet = KindSet::INT64.union(KindSet::DOUBLE);

    pub const fn of(kind: Kind) -> Self {
        KindSet(kind.bit())
    }

    pub const fn union(self, other: KindSet) -> Self {
        KindSet(self.0 | other.0)
    }

    pub const fn contains(self, kind: Kind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Whether a value of `kind` satisfies this set.
    ///
    /// Int32 is accepted wherever Int64 is expected; the reverse never holds.
    pub const fn accepts(self, kind: Kind) -> bool {
        self.contains(kind) || (matches!(kind, Kind::Int32) && self.contains(Kind::Int64))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn kinds(self) -> impl Iterator<Item = Kind> {
        Kind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl From<Kind> for KindSet {
    fn from(kind: Kind) -> Self {
        KindSet::of(kind)
    }
}

impl BitOr for KindSet {
    type Output = KindSet;

    fn bitor(self, rhs: KindSet) -> KindSet {
        self.union(rhs)
    }
}

impl BitOr<Kind> for KindSet {
    type Output = KindSet;

    fn bitor(self, rhs: Kind) -> KindSet {
        self.union(KindSet::of(rhs))
    }
}

impl BitOr for Kind {
    type Output = KindSet;

    fn bitor(self, rhs: Kind) -> KindSet {
        KindSet::of(self).union(KindSet::of(rhs))
    }
}

impl fmt::Display for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("nothing");
        }
        for (i, kind) in self.kinds().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(kind.name())?;
        }
        Ok(())
    }
}

impl fmt::Debug for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KindSet({self})")
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A node in the parsed-argument tree. Children are owned exclusively.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Placeholder left behind when a value is moved out of its slot.
    #[default]
    Empty,
    String(String),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Bool(bool),
    Null,
    Array(Vec<Value>),
    Object(Object),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Empty => Kind::Empty,
            Value::String(_) => Kind::String,
            Value::Int32(_) => Kind::Int32,
            Value::Int64(_) => Kind::Int64,
            Value::Double(_) => Kind::Double,
            Value::Bool(_) => Kind::Bool,
            Value::Null => Kind::Null,
            Value::Array(_) => Kind::Array,
            Value::Object(_) => Kind::Object,
        }
    }

    /// Move the value out, leaving [`Value::Empty`] in its place.
    pub fn take(&mut self) -> Value {
        std::mem::take(self)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(n) => Some(*n),
            _ => None,
        }
    }

    /// 64-bit view; Int32 values are widened.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        match i32::try_from(n) {
            Ok(small) => Value::Int32(small),
            Err(_) => Value::Int64(n),
        }
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// Ordered `(name, value)` pairs with unique names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
    entries: Vec<(String, Value)>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a property. Fails if `name` is already present; the object is
    /// left unchanged.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<(), DuplicateKey> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(DuplicateKey(name));
        }
        self.entries.push((name, value.into()));
        Ok(())
    }

    /// Builder form of [`Object::insert`] for payloads with fixed names.
    /// A repeated name keeps the first value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        debug_assert!(self.get(&name).is_none(), "duplicate payload key {name}");
        if self.get(&name).is_none() {
            self.entries.push((name, value.into()));
        }
        self
    }

    /// Caller guarantees `name` is unique.
    pub(crate) fn push_unchecked(&mut self, name: String, value: Value) {
        self.entries.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Look up `name`, but only if its value is one of `kinds`.
    pub fn find(&self, name: &str, kinds: KindSet) -> Option<&Value> {
        self.get(name).filter(|v| kinds.accepts(v.kind()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

// ---------------------------------------------------------------------------
// ArgumentList
// ---------------------------------------------------------------------------

/// The top-level parse result: always an array of positional arguments.
///
/// The typed accessors return [`ValidationError`] instead of panicking, so a
/// handler can read validated positions with `?`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgumentList(Vec<Value>);

impl ArgumentList {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        self.0.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    /// Move the value at `position` out, leaving [`Value::Empty`].
    pub fn take(&mut self, position: usize) -> Value {
        self.0.get_mut(position).map(Value::take).unwrap_or_default()
    }

    fn expect(&self, position: usize, kinds: KindSet) -> Result<&Value, ValidationError> {
        let value = self.get(position).ok_or(ValidationError::Missing { position })?;
        if kinds.accepts(value.kind()) {
            Ok(value)
        } else {
            Err(ValidationError::Kind {
                position,
                expected: kinds,
                actual: value.kind(),
            })
        }
    }

    pub fn string(&self, position: usize) -> Result<&str, ValidationError> {
        self.expect(position, KindSet::STRING)
            .map(|v| v.as_str().unwrap_or_default())
    }

    pub fn int32(&self, position: usize) -> Result<i32, ValidationError> {
        self.expect(position, KindSet::INT32)
            .map(|v| v.as_i32().unwrap_or_default())
    }

    pub fn int64(&self, position: usize) -> Result<i64, ValidationError> {
        self.expect(position, KindSet::INT64)
            .map(|v| v.as_i64().unwrap_or_default())
    }

    pub fn double(&self, position: usize) -> Result<f64, ValidationError> {
        self.expect(position, KindSet::DOUBLE)
            .map(|v| v.as_f64().unwrap_or_default())
    }

    pub fn boolean(&self, position: usize) -> Result<bool, ValidationError> {
        self.expect(position, KindSet::BOOL)
            .map(|v| v.as_bool().unwrap_or_default())
    }

    pub fn array(&self, position: usize) -> Result<&[Value], ValidationError> {
        self.expect(position, KindSet::ARRAY)
            .map(|v| v.as_array().unwrap_or_default())
    }

    /// An Object-or-Null position; `None` for Null.
    pub fn optional_object(&self, position: usize) -> Result<Option<&Object>, ValidationError> {
        self.expect(position, KindSet::OBJECT | KindSet::NULL)
            .map(Value::as_object)
    }
}

impl From<Vec<Value>> for ArgumentList {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl IntoIterator for ArgumentList {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ArgumentList {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
