//! Call binding and canonical key derivation.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

use super::arg::Arg;

/// Name and declared parameters of a cached function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    name: String,
    params: Vec<String>,
}

impl Signature {
    pub fn new<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

/// Arguments of a single call: positional values plus keyword values.
#[derive(Clone, Debug, Default)]
pub struct CallArgs {
    positional: Vec<Arg>,
    keywords: BTreeMap<String, Arg>,
    error: Option<String>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Arg>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.keywords.insert(name.into(), value.into());
        self
    }

    /// Positional argument from any serde value. A serialization failure is
    /// reported when the key is derived.
    ///
    /// serde presents a `HashSet` exactly like a `Vec`, so its random
    /// iteration order would leak into the key. Pass such values as
    /// `Unordered(&set)`, or through [`arg`](Self::arg), which hashes
    /// `HashSet` and `BTreeSet` as sets.
    pub fn try_arg<T: Serialize + ?Sized>(self, value: &T) -> Self {
        match Arg::serialized(value) {
            Ok(arg) => self.arg(arg),
            Err(e) => self.fail(e),
        }
    }

    pub fn try_kwarg<T: Serialize + ?Sized>(self, name: impl Into<String>, value: &T) -> Self {
        match Arg::serialized(value) {
            Ok(arg) => self.kwarg(name, arg),
            Err(e) => self.fail(e),
        }
    }

    pub fn positional(&self) -> &[Arg] {
        &self.positional
    }

    /// Keyword values, sorted by name.
    pub fn keywords(&self) -> &BTreeMap<String, Arg> {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    fn fail(mut self, error: Error) -> Self {
        if self.error.is_none() {
            self.error = Some(error.to_string());
        }
        self
    }
}

/// Arguments bound to declared parameter names, in declaration order.
/// Parameters that received no value are absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundArgs {
    values: Vec<(String, Arg)>,
}

impl BoundArgs {
    pub fn arg(&self, name: &str) -> Option<&Arg> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.arg(name).is_some()
    }

    /// Typed view of a parameter. An unbound parameter reads as `null`, so
    /// `Option<T>` parameters come back as `None`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let json = self
            .arg(name)
            .map(Arg::to_json)
            .unwrap_or(serde_json::Value::Null);
        serde_json::from_value(json)
            .map_err(|e| Error::Other(format!("parameter '{}': {}", name, e)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arg)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Canonical cache key: lowercase hex SHA-256 of the canonical call tuple.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    const HEX_LEN: usize = 64;

    /// Hash raw canonical bytes into a key.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        CacheKey(hex::encode(Sha256::digest(bytes)))
    }

    /// Accept a previously rendered key (e.g. a file stem or database row).
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() == Self::HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Ok(CacheKey(s.to_string()))
        } else {
            Err(Error::Other(format!("not a cache key: {}", s)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bind positional values to declared parameters and merge in keywords.
///
/// Explicit keyword values win: a positional value that lands on a
/// parameter also given by keyword is dropped.
pub fn bind(signature: &Signature, call: &CallArgs) -> Result<BoundArgs> {
    if let Some(error) = &call.error {
        return Err(Error::KeyDerivation(error.clone()));
    }

    let params = signature.params();
    if call.positional.len() > params.len() {
        return Err(Error::KeyDerivation(format!(
            "{}() takes {} positional argument(s) but {} were given",
            signature.name(),
            params.len(),
            call.positional.len()
        )));
    }
    if let Some(unknown) = call.keywords.keys().find(|k| !params.contains(k)) {
        return Err(Error::KeyDerivation(format!(
            "{}() got an unexpected keyword argument '{}'",
            signature.name(),
            unknown
        )));
    }

    let mut values = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        let positional = call.positional.get(i);
        match (call.keywords.get(param), positional) {
            (Some(keyword), Some(_)) => {
                tracing::warn!(
                    "{}(): '{}' given both positionally and by keyword, keeping keyword value",
                    signature.name(),
                    param
                );
                values.push((param.clone(), keyword.clone()));
            }
            (Some(value), None) | (None, Some(value)) => values.push((param.clone(), value.clone())),
            (None, None) => {}
        }
    }

    Ok(BoundArgs { values })
}

/// Key for already-bound arguments: `(value_for(p) for p in params) + (name,)`.
pub fn key_for(signature: &Signature, bound: &BoundArgs) -> Result<CacheKey> {
    let mut items: Vec<Arg> = signature
        .params()
        .iter()
        .map(|p| bound.arg(p).cloned().unwrap_or(Arg::None))
        .collect();
    items.push(Arg::Str(signature.name().to_string()));

    let bytes = Arg::Tuple(items).canonical_bytes()?;
    Ok(CacheKey::from_bytes(&bytes))
}

/// Turn a call into its canonical key. Also returns the bound arguments the
/// function should be invoked with.
pub fn derive_key(signature: &Signature, call: &CallArgs) -> Result<(CacheKey, BoundArgs)> {
    let bound = bind(signature, call)?;
    let key = key_for(signature, &bound)?;
    tracing::trace!("Derived key {} for {}()", key, signature.name());
    Ok((key, bound))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> Signature {
        Signature::new("area", ["width", "height"])
    }

    fn key(signature: &Signature, call: CallArgs) -> CacheKey {
        derive_key(signature, &call).unwrap().0
    }

    #[test]
    fn test_positional_and_keyword_agree() {
        let s = sig();
        let a = key(&s, CallArgs::new().arg(3).arg(4));
        let b = key(&s, CallArgs::new().kwarg("height", 4).kwarg("width", 3));
        let c = key(&s, CallArgs::new().arg(3).kwarg("height", 4));
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_function_name_is_part_of_key() {
        let call = CallArgs::new().arg(3).arg(4);
        let a = key(&Signature::new("f", ["width", "height"]), call.clone());
        let b = key(&Signature::new("g", ["width", "height"]), call);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_call_has_key() {
        let s = Signature::new("now", Vec::<String>::new());
        let k = key(&s, CallArgs::new());
        assert_eq!(k.as_str().len(), 64);
        assert_eq!(k, key(&s, CallArgs::new()));
        assert_ne!(k, key(&Signature::new("later", Vec::<String>::new()), CallArgs::new()));
    }

    #[test]
    fn test_keyword_wins_over_positional() {
        let s = sig();
        let (k, bound) = derive_key(&s, &CallArgs::new().arg(1).arg(2).kwarg("width", 9)).unwrap();
        assert_eq!(bound.get::<i64>("width").unwrap(), 9);
        assert_eq!(bound.get::<i64>("height").unwrap(), 2);
        assert_eq!(k, key(&s, CallArgs::new().arg(9).arg(2)));
    }

    #[test]
    fn test_unbound_param_is_none() {
        let s = sig();
        let (k, bound) = derive_key(&s, &CallArgs::new().arg(3)).unwrap();
        assert!(!bound.is_bound("height"));
        assert_eq!(bound.get::<Option<i64>>("height").unwrap(), None);
        assert_eq!(k, key(&s, CallArgs::new().arg(3).arg(())));
    }

    #[test]
    fn test_too_many_positional() {
        let err = derive_key(&sig(), &CallArgs::new().arg(1).arg(2).arg(3)).unwrap_err();
        assert!(matches!(err, Error::KeyDerivation(_)));
    }

    #[test]
    fn test_unknown_keyword() {
        let err = derive_key(&sig(), &CallArgs::new().kwarg("depth", 1)).unwrap_err();
        assert!(matches!(err, Error::KeyDerivation(_)));
    }

    #[test]
    fn test_unserializable_argument_surfaces() {
        struct Connection;

        impl Serialize for Connection {
            fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("connections have no stable form"))
            }
        }

        let call = CallArgs::new().try_arg(&Connection).arg(4);
        let err = derive_key(&sig(), &call).unwrap_err();
        assert!(matches!(err, Error::KeyDerivation(ref msg) if msg.contains("stable form")));
    }

    #[test]
    fn test_serde_tuple_matches_native_tuple() {
        let s = Signature::new("apply", ["x"]);
        let via_serde = key(&s, CallArgs::new().try_arg(&("sin",)));
        assert_eq!(via_serde, key(&s, CallArgs::new().arg(("sin",))));
        assert_ne!(via_serde, key(&s, CallArgs::new().arg(vec!["sin"])));
        assert_ne!(via_serde, key(&s, CallArgs::new().try_arg(&vec!["sin"])));
    }

    #[test]
    fn test_hashset_argument_is_stable() {
        use crate::key::Unordered;
        use std::collections::HashSet;

        let s = Signature::new("total", ["items"]);
        let build = || (0..16).collect::<HashSet<i64>>();

        let expected = key(&s, CallArgs::new().arg(build()));
        for _ in 0..20 {
            assert_eq!(key(&s, CallArgs::new().arg(build())), expected);
            assert_eq!(key(&s, CallArgs::new().try_arg(&Unordered(build()))), expected);
            assert_eq!(key(&s, CallArgs::new().try_kwarg("items", &Unordered(&build()))), expected);
        }

        let ordered: std::collections::BTreeSet<i64> = (0..16).collect();
        assert_eq!(key(&s, CallArgs::new().arg(ordered)), expected);
    }

    #[test]
    fn test_serde_struct_with_hashmap_field_is_stable() {
        use std::collections::HashMap;

        #[derive(Serialize)]
        struct Query {
            table: String,
            filters: HashMap<String, i64>,
        }

        let s = Signature::new("run", ["query"]);
        let build = || Query {
            table: "orders".to_string(),
            filters: (0..16).map(|i| (format!("col{}", i), i)).collect(),
        };

        let expected = key(&s, CallArgs::new().try_arg(&build()));
        for _ in 0..20 {
            assert_eq!(key(&s, CallArgs::new().try_arg(&build())), expected);
        }
        assert_eq!(key(&s, CallArgs::new().try_kwarg("query", &build())), expected);
    }

    #[test]
    fn test_serde_map_with_tuple_keys() {
        use std::collections::{BTreeMap, HashMap};

        let s = Signature::new("route", ["edges"]);
        let mut hashed = HashMap::new();
        let mut ordered = BTreeMap::new();
        for i in 0..8i64 {
            hashed.insert((i, i + 1), format!("edge{}", i));
            ordered.insert((i, i + 1), format!("edge{}", i));
        }

        let a = key(&s, CallArgs::new().try_arg(&hashed));
        let b = key(&s, CallArgs::new().try_arg(&ordered));
        assert_eq!(a, b);

        ordered.insert((9, 10), "edge9".to_string());
        assert_ne!(a, key(&s, CallArgs::new().try_arg(&ordered)));
    }

    #[test]
    fn test_nested_container_kinds_give_distinct_keys() {
        let s = Signature::new("apply", ["x"]);
        let as_map = key(&s, CallArgs::new().arg(Arg::map(vec![("sin", Arg::callable("sin"))])));
        let as_list = key(&s, CallArgs::new().arg(vec!["sin"]));
        let as_tuple = key(&s, CallArgs::new().arg(("sin",)));
        assert_ne!(as_map, as_list);
        assert_ne!(as_map, as_tuple);
        assert_ne!(as_list, as_tuple);
    }

    #[test]
    fn test_key_is_stable() {
        let s = sig();
        let a = key(&s, CallArgs::new().arg(3).arg(4));
        let b = key(&s, CallArgs::new().arg(3).arg(4));
        assert_eq!(a, b);
        assert_eq!(CacheKey::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CacheKey::parse("../etc/passwd").is_err());
        assert!(CacheKey::parse("ABC").is_err());
    }
}
