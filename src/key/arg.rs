//! Argument values as seen by the key deriver.
//!
//! `Arg` is a small value tree: scalars, three distinct sequence kinds
//! (list, tuple, set), mappings and callables. Container kinds never hash
//! alike, so `["sin"]`, `("sin",)` and `{"sin": ...}` give different keys.
//! Sets and mappings hash the same whatever order they were built in.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::ser;
use crate::error::{Error, Result};

/// One argument value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Arg {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    /// Only used for values above `i64::MAX`; smaller unsigned values become `Int`.
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Arg>),
    Tuple(Vec<Arg>),
    /// Element order is ignored when hashing.
    Set(Vec<Arg>),
    Map(Vec<(Arg, Arg)>),
    /// A function reference, hashed by name only.
    Callable(String),
}

/// Tagged form written out before hashing.
#[derive(Serialize, Debug, PartialEq)]
enum Canonical {
    None,
    Bool(bool),
    Int(i64),
    UInt(u64),
    /// IEEE-754 bit pattern, keeps NaN and -0.0 stable.
    Float(u64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Canonical>),
    Tuple(Vec<Canonical>),
    Set(Vec<Canonical>),
    Map(Vec<(Canonical, Canonical)>),
}

impl Arg {
    /// Stand-in for a function passed as an argument.
    pub fn callable(name: impl Into<String>) -> Self {
        Arg::Callable(name.into())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Arg::Bytes(bytes.into())
    }

    pub fn tuple<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        Arg::Tuple(items.into_iter().map(Into::into).collect())
    }

    pub fn set<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        Arg::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Arg>,
        V: Into<Arg>,
    {
        Arg::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Convert any serde value. Sequences become lists, tuples and tuple
    /// structs become tuples, maps and structs become mappings (keys of any
    /// type). Enum variants are tagged with their name.
    ///
    /// serde shows a `HashSet` as a plain sequence, so wrap unordered
    /// collections in [`Unordered`](super::Unordered) to have them hashed as
    /// sets.
    pub fn serialized<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        ser::to_arg(value)
            .map_err(|e| Error::KeyDerivation(format!("argument is not serializable: {}", e)))
    }

    /// JSON view used to hand bound values back to typed code.
    ///
    /// Tuples and sets come out as arrays, callables as their name. A mapping
    /// whose keys are all strings becomes an object, any other mapping a list
    /// of `[key, value]` pairs. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Arg::None => Value::Null,
            Arg::Bool(b) => Value::Bool(*b),
            Arg::Int(i) => Value::from(*i),
            Arg::UInt(u) => Value::from(*u),
            Arg::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Arg::Str(s) | Arg::Callable(s) => Value::String(s.clone()),
            Arg::Bytes(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
            Arg::List(items) | Arg::Tuple(items) | Arg::Set(items) => {
                Value::Array(items.iter().map(Arg::to_json).collect())
            }
            Arg::Map(pairs) => {
                if pairs.iter().all(|(k, _)| matches!(k, Arg::Str(_))) {
                    let object = pairs
                        .iter()
                        .filter_map(|(k, v)| match k {
                            Arg::Str(k) => Some((k.clone(), v.to_json())),
                            _ => None,
                        })
                        .collect();
                    Value::Object(object)
                } else {
                    Value::Array(
                        pairs
                            .iter()
                            .map(|(k, v)| Value::Array(vec![k.to_json(), v.to_json()]))
                            .collect(),
                    )
                }
            }
        }
    }

    /// Deterministic byte form of this value. Set elements and mapping entries
    /// are ordered by their encoding, so insertion order never changes the
    /// result.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        encode(&self.canonical()?)
    }

    fn canonical(&self) -> Result<Canonical> {
        Ok(match self {
            Arg::None => Canonical::None,
            Arg::Bool(b) => Canonical::Bool(*b),
            Arg::Int(i) => Canonical::Int(*i),
            Arg::UInt(u) => Canonical::UInt(*u),
            Arg::Float(f) => Canonical::Float(f.to_bits()),
            Arg::Str(s) | Arg::Callable(s) => Canonical::Str(s.clone()),
            Arg::Bytes(b) => Canonical::Bytes(b.clone()),
            Arg::List(items) => Canonical::List(canonical_all(items)?),
            Arg::Tuple(items) => Canonical::Tuple(canonical_all(items)?),
            Arg::Set(items) => {
                let mut sorted = Vec::with_capacity(items.len());
                for item in items {
                    let item = item.canonical()?;
                    sorted.push((encode(&item)?, item));
                }
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                Canonical::Set(sorted.into_iter().map(|(_, item)| item).collect())
            }
            Arg::Map(pairs) => {
                let mut sorted = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let (k, v) = (k.canonical()?, v.canonical()?);
                    sorted.push((encode(&k)?, encode(&v)?, k, v));
                }
                sorted.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
                Canonical::Map(sorted.into_iter().map(|(_, _, k, v)| (k, v)).collect())
            }
        })
    }
}

fn canonical_all(items: &[Arg]) -> Result<Vec<Canonical>> {
    items.iter().map(Arg::canonical).collect()
}

fn encode(value: &Canonical) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| Error::KeyDerivation(format!("canonical encoding failed: {}", e)))
}

macro_rules! arg_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg {
            fn from(v: $t) -> Self {
                Arg::Int(v as i64)
            }
        })*
    };
}

macro_rules! arg_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg {
            fn from(v: $t) -> Self {
                match i64::try_from(v) {
                    Ok(i) => Arg::Int(i),
                    Err(_) => Arg::UInt(v as u64),
                }
            }
        })*
    };
}

arg_from_signed!(i8, i16, i32, i64, isize);
arg_from_unsigned!(u8, u16, u32, u64, usize);

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Float(v as f64)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Str(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Str(v)
    }
}

impl From<&String> for Arg {
    fn from(v: &String) -> Self {
        Arg::Str(v.clone())
    }
}

impl From<()> for Arg {
    fn from(_: ()) -> Self {
        Arg::None
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Arg::None)
    }
}

impl<T: Into<Arg>> From<Vec<T>> for Arg {
    fn from(v: Vec<T>) -> Self {
        Arg::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Arg>> From<BTreeSet<T>> for Arg {
    fn from(v: BTreeSet<T>) -> Self {
        Arg::set(v)
    }
}

impl<T: Into<Arg>, S> From<HashSet<T, S>> for Arg {
    fn from(v: HashSet<T, S>) -> Self {
        Arg::set(v)
    }
}

impl<K: Into<Arg>, V: Into<Arg>> From<BTreeMap<K, V>> for Arg {
    fn from(v: BTreeMap<K, V>) -> Self {
        Arg::map(v)
    }
}

impl<K: Into<Arg>, V: Into<Arg>, S> From<HashMap<K, V, S>> for Arg {
    fn from(v: HashMap<K, V, S>) -> Self {
        Arg::map(v)
    }
}

impl<A: Into<Arg>> From<(A,)> for Arg {
    fn from(v: (A,)) -> Self {
        Arg::Tuple(vec![v.0.into()])
    }
}

impl<A: Into<Arg>, B: Into<Arg>> From<(A, B)> for Arg {
    fn from(v: (A, B)) -> Self {
        Arg::Tuple(vec![v.0.into(), v.1.into()])
    }
}

impl<A: Into<Arg>, B: Into<Arg>, C: Into<Arg>> From<(A, B, C)> for Arg {
    fn from(v: (A, B, C)) -> Self {
        Arg::Tuple(vec![v.0.into(), v.1.into(), v.2.into()])
    }
}

impl<A: Into<Arg>, B: Into<Arg>, C: Into<Arg>, D: Into<Arg>> From<(A, B, C, D)> for Arg {
    fn from(v: (A, B, C, D)) -> Self {
        Arg::Tuple(vec![v.0.into(), v.1.into(), v.2.into(), v.3.into()])
    }
}
