//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! The injected XPath capability.
//!
//! The engine never embeds an XPath implementation; selectors and the
//! `xpath-node-count` function work against these traits.  Compiled
//! expressions are cached process-wide, keyed by the expression text
//! and its namespace bindings, with per-key single-flight so a given
//! expression is compiled exactly once under concurrency.

use crate::errors::{EvalResult, Indeterminate};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Opaque XML content root for one attribute category.
///
/// The concrete representation belongs to the injected engine; the
/// core only moves these around.
pub type XmlContent = Arc<dyn Any + Send + Sync>;

/// A compiled, reusable XPath expression.
pub trait CompiledXPath: Send + Sync {
    /// Evaluate against a content root and return the lexical value of
    /// each selected node.
    ///
    /// # Errors
    ///
    /// `ProcessingError` when evaluation fails.
    fn select_values(&self, content: &XmlContent) -> EvalResult<Vec<String>>;

    /// Evaluate against a content root and return each selected node
    /// as a new content root, for context-selector chaining.
    ///
    /// # Errors
    ///
    /// `ProcessingError` when evaluation fails.
    fn select_nodes(&self, content: &XmlContent) -> EvalResult<Vec<XmlContent>>;
}

/// An XPath compiler provided by the embedder.
pub trait XPathEngine: Send + Sync {
    /// Compile an expression under the given (prefix, URI) namespace
    /// bindings.
    ///
    /// # Errors
    ///
    /// `SyntaxError` when the expression does not compile.
    fn compile(
        &self,
        path: &str,
        namespaces: &[(String, String)],
    ) -> EvalResult<Arc<dyn CompiledXPath>>;
}

type CacheKey = (String, Vec<(String, String)>);
type CacheSlot = Arc<OnceLock<EvalResult<Arc<dyn CompiledXPath>>>>;

/// Process-wide cache of compiled XPath expressions.
///
/// The only shared mutable resource in the engine; failed compiles are
/// cached too, so a broken expression is not recompiled per request.
#[derive(Default)]
pub struct XPathCache {
    slots: Mutex<HashMap<CacheKey, CacheSlot>>,
}

impl XPathCache {
    #[must_use]
    pub fn new() -> XPathCache {
        XPathCache::default()
    }

    /// Fetch or compile the expression.  Concurrent callers for the
    /// same key block on a single compilation.
    ///
    /// # Errors
    ///
    /// The engine's `SyntaxError`, replayed from cache on later calls.
    ///
    /// # Panics
    ///
    /// Panics if the cache mutex was poisoned by a panicking compile.
    pub fn compile(
        &self,
        engine: &dyn XPathEngine,
        path: &str,
        namespaces: &[(String, String)],
    ) -> EvalResult<Arc<dyn CompiledXPath>> {
        let slot = {
            let mut slots = self.slots.lock().expect("xpath cache poisoned");
            slots
                .entry((path.to_string(), namespaces.to_vec()))
                .or_default()
                .clone()
        };
        slot.get_or_init(|| engine.compile(path, namespaces)).clone()
    }
}

/// Wrap an engine failure so callers see a uniform processing error.
pub(crate) fn xpath_unavailable() -> Indeterminate {
    Indeterminate::processing("no XPath engine is configured")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopCompiled;
    impl CompiledXPath for NoopCompiled {
        fn select_values(&self, _content: &XmlContent) -> EvalResult<Vec<String>> {
            Ok(vec![])
        }
        fn select_nodes(&self, _content: &XmlContent) -> EvalResult<Vec<XmlContent>> {
            Ok(vec![])
        }
    }

    struct CountingEngine {
        compiles: AtomicUsize,
    }
    impl XPathEngine for CountingEngine {
        fn compile(
            &self,
            path: &str,
            _namespaces: &[(String, String)],
        ) -> EvalResult<Arc<dyn CompiledXPath>> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            if path == "bad" {
                Err(Indeterminate::syntax("bad xpath"))
            } else {
                Ok(Arc::new(NoopCompiled))
            }
        }
    }

    #[test]
    fn test_cache_compiles_once_per_key() {
        let engine = CountingEngine {
            compiles: AtomicUsize::new(0),
        };
        let cache = XPathCache::new();
        let ns = vec![("p".to_string(), "urn:ns".to_string())];
        for _ in 0..3 {
            cache.compile(&engine, "/p:record", &ns).unwrap();
        }
        assert_eq!(engine.compiles.load(Ordering::SeqCst), 1);
        // a different namespace binding is a different key
        cache.compile(&engine, "/p:record", &[]).unwrap();
        assert_eq!(engine.compiles.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_remembers_failures() {
        let engine = CountingEngine {
            compiles: AtomicUsize::new(0),
        };
        let cache = XPathCache::new();
        assert!(cache.compile(&engine, "bad", &[]).is_err());
        assert!(cache.compile(&engine, "bad", &[]).is_err());
        assert_eq!(engine.compiles.load(Ordering::SeqCst), 1);
    }
}
