//! Compiled-path cache
//!
//! Process-wide LRU of compiled paths keyed by the raw path string.
//! Compiled paths are immutable and shared via `Arc`, so a cache hit is
//! safe to hand to concurrent callers. Compilation failures are not
//! cached. A poisoned lock falls back to uncached compilation.

use super::parser;
use super::segment::CompiledPath;
use crate::core::limits::PATH_CACHE_CAPACITY;
use crate::Error;
use lazy_static::lazy_static;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

lazy_static! {
    static ref PATH_CACHE: Mutex<LruCache<String, Arc<CompiledPath>>> = Mutex::new(
        LruCache::new(NonZeroUsize::new(PATH_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    );
}

/// Compile `path`, consulting the process-wide cache.
pub fn compile_cached(path: &str) -> Result<Arc<CompiledPath>, Error> {
    if let Ok(mut cache) = PATH_CACHE.lock() {
        if let Some(compiled) = cache.get(path) {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(parser::compile(path)?);
        cache.put(path.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    } else {
        parser::compile(path).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_returns_shared_instance() {
        let a = compile_cached("cache.test.path").unwrap();
        let b = compile_cached("cache.test.path").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_errors_not_cached() {
        assert!(compile_cached("bad..path").is_err());
        assert!(compile_cached("bad..path").is_err());
    }
}
