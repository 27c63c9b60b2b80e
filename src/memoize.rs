//! Memoizing wrapper around a function and a cache backend.
//!
//! ```no_run
//! use memocache::{memoize, BoundArgs, CallArgs, Error, Signature};
//!
//! let mut area = memoize(Signature::new("area", ["width", "height"]), |args: &BoundArgs| {
//!     Ok::<_, Error>(args.get::<i64>("width")? * args.get::<i64>("height")?)
//! });
//! assert_eq!(area.call(&CallArgs::new().arg(3).kwarg("height", 4)).unwrap(), 12);
//! ```

use crate::backend::{CacheBackend, MemoryCache};
use crate::error::Error;
use crate::key::{derive_key, BoundArgs, CallArgs, Signature};

/// A function whose results are stored in `B`, keyed by its arguments.
pub struct Memoized<B, F> {
    backend: B,
    signature: Signature,
    function: F,
}

impl<B, F> Memoized<B, F> {
    pub fn new(backend: B, signature: Signature, function: F) -> Self {
        Self {
            backend,
            signature,
            function,
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Return the stored result for these arguments, computing and storing it
    /// on a miss (or on every call when the backend is in overwrite mode).
    ///
    /// Errors from the function are returned as-is and nothing is stored.
    pub fn call<V, E>(&mut self, args: &CallArgs) -> Result<V, E>
    where
        B: CacheBackend<V>,
        F: FnMut(&BoundArgs) -> Result<V, E>,
        V: Clone,
        E: From<Error>,
    {
        let (key, bound) = derive_key(&self.signature, args)?;

        if !self.backend.overwrite() && self.backend.contains(&key)? {
            match self.backend.get(&key) {
                Ok(value) => {
                    tracing::trace!("Cache hit for {}() [{}]", self.signature.name(), key);
                    return Ok(value);
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!("Entry {} vanished, recomputing", key);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!("Cache miss for {}() [{}]", self.signature.name(), key);
        let value = (self.function)(&bound)?;
        self.backend.put(key, value.clone())?;
        Ok(value)
    }
}

/// Memoize `function` in a fresh in-memory cache.
pub fn memoize<V, F>(signature: Signature, function: F) -> Memoized<MemoryCache<V>, F> {
    Memoized::new(MemoryCache::new(), signature, function)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FileCache, SqliteCache};
    use crate::config::SqliteSettings;
    use crate::key::Arg;
    use std::cell::Cell;
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    use tempfile::TempDir;

    fn random() -> u64 {
        RandomState::new().build_hasher().finish()
    }

    #[test]
    fn test_repeated_calls_run_once() {
        crate::logging::init_test();
        let calls = Cell::new(0u32);
        let mut f = memoize(Signature::new("f", ["x"]), |_: &BoundArgs| {
            calls.set(calls.get() + 1);
            Ok::<_, Error>(calls.get())
        });

        let first = f.call(&CallArgs::new().arg(10)).unwrap();
        for _ in 0..100 {
            assert_eq!(f.call(&CallArgs::new().arg(10)).unwrap(), first);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_random_result_is_reused() {
        let mut f = memoize(Signature::new("f", ["x"]), |_: &BoundArgs| Ok::<_, Error>(random()));

        let results: Vec<u64> = (0..101)
            .map(|_| f.call(&CallArgs::new().arg(10)).unwrap())
            .collect();
        assert!(results.iter().all(|r| *r == results[0]));
    }

    #[test]
    fn test_positional_and_keyword_share_entry() {
        let calls = Cell::new(0u32);
        let mut add = memoize(Signature::new("add", ["a", "b"]), |args: &BoundArgs| {
            calls.set(calls.get() + 1);
            Ok::<_, Error>(args.get::<i64>("a")? + args.get::<i64>("b")?)
        });

        assert_eq!(add.call(&CallArgs::new().arg(1).arg(2)).unwrap(), 3);
        assert_eq!(add.call(&CallArgs::new().kwarg("b", 2).kwarg("a", 1)).unwrap(), 3);
        assert_eq!(add.call(&CallArgs::new().arg(1).kwarg("b", 2)).unwrap(), 3);
        assert_eq!(calls.get(), 1);

        assert_eq!(add.call(&CallArgs::new().arg(2).arg(2)).unwrap(), 4);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_functions_sharing_a_backend_stay_apart() {
        let f_calls = Cell::new(0i64);
        let g_calls = Cell::new(0i64);
        let args = CallArgs::new().arg("same").kwarg("extra", vec![1, 2]);

        let mut f = memoize(Signature::new("f", ["x", "extra"]), |_: &BoundArgs| {
            f_calls.set(f_calls.get() + 1);
            Ok::<_, Error>(f_calls.get())
        });
        let r1 = f.call(&args).unwrap();
        let r2 = f.call(&args).unwrap();

        let mut g = Memoized::new(
            f.into_backend(),
            Signature::new("g", ["x", "extra"]),
            |_: &BoundArgs| {
                g_calls.set(g_calls.get() + 1);
                Ok::<_, Error>(-g_calls.get())
            },
        );
        let r3 = g.call(&args).unwrap();
        let r4 = g.call(&args).unwrap();

        assert_eq!(r1, r2);
        assert_eq!(r3, r4);
        assert_ne!(r2, r3);
        assert_eq!(f_calls.get(), 1);
        assert_eq!(g_calls.get(), 1);
        assert_eq!(g.backend().len(), 2);
    }

    #[test]
    fn test_failed_call_is_not_cached() {
        let calls = Cell::new(0u32);
        let mut f = memoize(Signature::new("flaky", ["x"]), |_: &BoundArgs| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(anyhow::anyhow!("transient failure"))
            } else {
                Ok(7u8)
            }
        });

        let err = f.call(&CallArgs::new().arg(1)).unwrap_err();
        assert_eq!(err.to_string(), "transient failure");
        assert!(f.backend().is_empty());

        assert_eq!(f.call(&CallArgs::new().arg(1)).unwrap(), 7);
        assert_eq!(f.call(&CallArgs::new().arg(1)).unwrap(), 7);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_key_error_skips_function() {
        let calls = Cell::new(0u32);
        let mut f = memoize(Signature::new("f", ["x"]), |_: &BoundArgs| {
            calls.set(calls.get() + 1);
            Ok::<_, Error>(())
        });

        let err = f
            .call(&CallArgs::new().arg(1).kwarg("y", 2))
            .unwrap_err();
        assert!(matches!(err, Error::KeyDerivation(_)));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_callable_arguments() {
        let calls = Cell::new(0u32);
        let mut apply = memoize(Signature::new("apply", ["op", "x"]), |args: &BoundArgs| {
            calls.set(calls.get() + 1);
            let op: String = args.get("op")?;
            let x: f64 = args.get("x")?;
            Ok::<_, Error>(if op == "sin" { x.sin() } else { x.cos() })
        });

        let sin = apply.call(&CallArgs::new().arg(Arg::callable("sin")).arg(0.0)).unwrap();
        let cos = apply.call(&CallArgs::new().arg(Arg::callable("cos")).arg(0.0)).unwrap();
        apply.call(&CallArgs::new().arg(Arg::callable("sin")).arg(0.0)).unwrap();

        assert_eq!(sin, 0.0);
        assert_eq!(cos, 1.0);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_file_backend_persists_results() {
        let temp_dir = TempDir::new().unwrap();
        let calls = Cell::new(0u32);
        let square = |args: &BoundArgs| {
            calls.set(calls.get() + 1);
            let x: i64 = args.get("x")?;
            Ok::<_, Error>(x * x)
        };

        let mut first = Memoized::new(
            FileCache::new(temp_dir.path()).unwrap(),
            Signature::new("square", ["x"]),
            square,
        );
        assert_eq!(first.call(&CallArgs::new().arg(12)).unwrap(), 144);

        let mut second = Memoized::new(
            FileCache::new(temp_dir.path()).unwrap(),
            Signature::new("square", ["x"]),
            |_: &BoundArgs| -> Result<i64, Error> { panic!("should be cached") },
        );
        assert_eq!(second.call(&CallArgs::new().kwarg("x", 12)).unwrap(), 144);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_sqlite_backend_survives_reopen() {
        crate::logging::init_test();
        let temp_dir = TempDir::new().unwrap();
        let settings = SqliteSettings::new(temp_dir.path().join("memo.sqlite"), "memo")
            .buffer_size(2)
            .quiet(true);

        {
            let mut double = Memoized::new(
                SqliteCache::open(settings.clone()).unwrap(),
                Signature::new("double", ["x"]),
                |args: &BoundArgs| Ok::<_, Error>(args.get::<i64>("x")? * 2),
            );
            for x in 0..5 {
                double.call(&CallArgs::new().arg(x)).unwrap();
            }
            assert_eq!(double.backend().pending(), 1);
        }

        let mut double = Memoized::new(
            SqliteCache::open(settings).unwrap(),
            Signature::new("double", ["x"]),
            |_: &BoundArgs| -> Result<i64, Error> { panic!("should be cached") },
        );
        for x in 0..5 {
            assert_eq!(double.call(&CallArgs::new().arg(x)).unwrap(), x * 2);
        }
    }

    #[test]
    fn test_overwrite_mode_always_recomputes() {
        let temp_dir = TempDir::new().unwrap();
        let settings = SqliteSettings::new(temp_dir.path().join("memo.sqlite"), "memo")
            .buffer_size(1)
            .overwrite(true)
            .quiet(true);
        let calls = Cell::new(0u32);

        let mut f = Memoized::new(
            SqliteCache::open(settings.clone()).unwrap(),
            Signature::new("f", ["x"]),
            |_: &BoundArgs| {
                calls.set(calls.get() + 1);
                Ok::<_, Error>(calls.get())
            },
        );
        assert_eq!(f.call(&CallArgs::new().arg(1)).unwrap(), 1);
        assert_eq!(f.call(&CallArgs::new().arg(1)).unwrap(), 2);
        drop(f);

        let reopened = SqliteCache::open(settings.overwrite(false)).unwrap();
        let (key, _) = derive_key(&Signature::new("f", ["x"]), &CallArgs::new().arg(1)).unwrap();
        assert_eq!(CacheBackend::<u32>::get(&reopened, &key).unwrap(), 2);
    }

    #[test]
    fn test_boxed_backend() {
        let backend: Box<dyn CacheBackend<String>> = Box::new(MemoryCache::new());
        let calls = Cell::new(0u32);
        let mut greet = Memoized::new(backend, Signature::new("greet", ["name"]), |args: &BoundArgs| {
            calls.set(calls.get() + 1);
            Ok::<_, Error>(format!("hello {}", args.get::<String>("name")?))
        });

        assert_eq!(greet.call(&CallArgs::new().arg("ada")).unwrap(), "hello ada");
        assert_eq!(greet.call(&CallArgs::new().kwarg("name", "ada")).unwrap(), "hello ada");
        assert_eq!(calls.get(), 1);
    }
}
