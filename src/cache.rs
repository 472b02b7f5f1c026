//! Process-wide read cache with prefix invalidation.
//!
//! Keys are plain strings grouped into namespaces (see [`keys`]). Every
//! mutation flushes whole namespaces, so correctness only depends on each
//! derived key starting with the prefix its owning entity flushes.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::error::{AppError, AppResult, CACHE_INVALIDATION_FAILED, CACHE_UNAVAILABLE};

pub type CachedValue = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cached value for {key} has an unexpected type")]
    TypeMismatch { key: String },
}

impl From<CacheError> for AppError {
    fn from(error: CacheError) -> Self {
        match &error {
            CacheError::Unavailable(_) => AppError::new(CACHE_UNAVAILABLE, error.to_string()),
            CacheError::TypeMismatch { key } => {
                AppError::new(CACHE_UNAVAILABLE, error.to_string()).with_context("key", key.clone())
            }
        }
    }
}

pub trait CacheManager: Send + Sync {
    fn get_entry(&self, key: &str) -> Result<Option<CachedValue>, CacheError>;
    fn set_entry(&self, key: &str, value: CachedValue) -> Result<(), CacheError>;
    /// Evicts every entry whose key starts with `prefix`, returning how many went.
    fn remove_by_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
    fn clear(&self) -> Result<(), CacheError>;

    /// Counter advanced by every flush. Backends that never store return 0.
    fn generation(&self) -> u64 {
        0
    }

    /// Stores `value` only while no flush has happened since `generation` was read.
    /// Returns whether the entry was written.
    fn set_entry_if_current(
        &self,
        key: &str,
        value: CachedValue,
        generation: u64,
    ) -> Result<bool, CacheError> {
        if self.generation() != generation {
            return Ok(false);
        }
        self.set_entry(key, value)?;
        Ok(true)
    }
}

/// Returns the cached value for `key`, computing and storing it on a miss.
///
/// A value computed while a flush ran is returned but not stored, so the
/// next access after the flush reads the store again.
pub fn get_or_compute<T, F>(cache: &dyn CacheManager, key: &str, compute: F) -> AppResult<T>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> AppResult<T>,
{
    if let Some(entry) = cache.get_entry(key)? {
        return entry
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| CacheError::TypeMismatch { key: key.to_string() }.into());
    }

    let generation = cache.generation();
    let value = compute()?;
    if !cache.set_entry_if_current(key, Arc::new(value.clone()), generation)? {
        tracing::debug!(
            target: "sitecatalog",
            event = "cache_fill_skipped",
            key
        );
    }
    Ok(value)
}

/// Flushes each prefix in turn. Any failure fails the caller's mutation.
pub fn flush_prefixes(cache: &dyn CacheManager, prefixes: &[&str]) -> AppResult<usize> {
    let mut removed = 0;
    for prefix in prefixes {
        removed += cache.remove_by_prefix(prefix).map_err(|err| {
            AppError::new(CACHE_INVALIDATION_FAILED, "Failed to invalidate cached entries")
                .with_context("prefix", prefix.to_string())
                .with_cause(err)
        })?;
    }
    tracing::debug!(
        target: "sitecatalog",
        event = "cache_flushed",
        prefixes = ?prefixes,
        removed
    );
    Ok(removed)
}

#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<BTreeMap<String, CachedValue>>,
    // Advanced under the entries write lock.
    generation: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }
}

impl CacheManager for MemoryCache {
    fn get_entry(&self, key: &str) -> Result<Option<CachedValue>, CacheError> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(key).cloned())
    }

    fn set_entry(&self, key: &str, value: CachedValue) -> Result<(), CacheError> {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(key.to_string(), value);
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn set_entry_if_current(
        &self,
        key: &str,
        value: CachedValue,
        generation: u64,
    ) -> Result<bool, CacheError> {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::Acquire) != generation {
            return Ok(false);
        }
        guard.insert(key.to_string(), value);
        Ok(true)
    }

    fn remove_by_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::AcqRel);
        let doomed: Vec<String> = guard
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            guard.remove(key);
        }
        Ok(doomed.len())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::AcqRel);
        guard.clear();
        Ok(())
    }
}

/// Never stores anything; every lookup recomputes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl CacheManager for NullCache {
    fn get_entry(&self, _key: &str) -> Result<Option<CachedValue>, CacheError> {
        Ok(None)
    }

    fn set_entry(&self, _key: &str, _value: CachedValue) -> Result<(), CacheError> {
        Ok(())
    }

    fn remove_by_prefix(&self, _prefix: &str) -> Result<usize, CacheError> {
        Ok(0)
    }

    fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

pub mod keys {
    use crate::context::Viewer;

    pub const CATEGORY_PREFIX: &str = "catalog.category.";
    pub const PRODUCT_CATEGORY_PREFIX: &str = "catalog.productcategory.";

    /// Namespaces flushed by any category or product-category mutation.
    pub const CATALOG_PREFIXES: [&str; 2] = [CATEGORY_PREFIX, PRODUCT_CATEGORY_PREFIX];

    pub fn category_by_id(id: i64) -> String {
        format!("{CATEGORY_PREFIX}id-{id}")
    }

    pub fn categories_by_parent(parent_id: i64, show_hidden: bool, viewer: &Viewer) -> String {
        format!(
            "{CATEGORY_PREFIX}byparent-{parent_id}-{show_hidden}-{}-{}",
            viewer.role_key(),
            viewer.site_id
        )
    }

    pub fn categories_all(name: &str, show_hidden: bool, viewer: &Viewer) -> String {
        format!(
            "{CATEGORY_PREFIX}all-{name}-{show_hidden}-{}-{}",
            viewer.role_key(),
            viewer.site_id
        )
    }

    pub fn categories_home_page(show_hidden: bool, viewer: &Viewer) -> String {
        format!(
            "{CATEGORY_PREFIX}homepage-{show_hidden}-{}-{}",
            viewer.role_key(),
            viewer.site_id
        )
    }

    pub fn child_category_ids(parent_id: i64, show_hidden: bool, viewer: &Viewer) -> String {
        format!(
            "{CATEGORY_PREFIX}childids-{parent_id}-{show_hidden}-{}-{}",
            viewer.role_key(),
            viewer.site_id
        )
    }

    pub fn product_categories_by_product(
        product_id: i64,
        show_hidden: bool,
        viewer: &Viewer,
    ) -> String {
        format!(
            "{PRODUCT_CATEGORY_PREFIX}byproduct-{product_id}-{show_hidden}-{}-{}",
            viewer.role_key(),
            viewer.site_id
        )
    }

    pub fn product_categories_by_category(
        category_id: i64,
        show_hidden: bool,
        viewer: &Viewer,
    ) -> String {
        format!(
            "{PRODUCT_CATEGORY_PREFIX}bycategory-{category_id}-{show_hidden}-{}-{}",
            viewer.role_key(),
            viewer.site_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Viewer;

    #[test]
    fn get_or_compute_only_computes_on_miss() {
        let cache = MemoryCache::new();
        let mut calls = 0;
        let first: Vec<i64> = get_or_compute(&cache, "k", || {
            calls += 1;
            Ok(vec![1, 2])
        })
        .unwrap();
        let second: Vec<i64> = get_or_compute(&cache, "k", || {
            calls += 1;
            Ok(vec![9])
        })
        .unwrap();
        assert_eq!(first, second);
        assert_eq!(calls, 1);
    }

    #[test]
    fn compute_errors_are_not_cached() {
        let cache = MemoryCache::new();
        let err = get_or_compute::<i64, _>(&cache, "k", || Err(AppError::from("boom")))
            .unwrap_err();
        assert_eq!(err.message(), "boom");
        assert!(cache.is_empty());
    }

    #[test]
    fn type_mismatch_is_reported() {
        let cache = MemoryCache::new();
        cache.set_entry("k", Arc::new(5_i64)).unwrap();
        let err = get_or_compute::<String, _>(&cache, "k", || Ok(String::new())).unwrap_err();
        assert_eq!(err.code(), CACHE_UNAVAILABLE);
        assert_eq!(err.context().get("key"), Some(&"k".to_string()));
    }

    #[test]
    fn remove_by_prefix_leaves_other_namespaces() {
        let cache = MemoryCache::new();
        for key in [
            "catalog.category.id-1",
            "catalog.category.all-x",
            "catalog.productcategory.byproduct-1",
            "catalog.categoryx",
        ] {
            cache.set_entry(key, Arc::new(1_u8)).unwrap();
        }
        let removed = cache.remove_by_prefix(keys::CATEGORY_PREFIX).unwrap();
        assert_eq!(removed, 2);
        assert!(cache.contains_key("catalog.productcategory.byproduct-1"));
        assert!(cache.contains_key("catalog.categoryx"));
    }

    #[test]
    fn every_derived_key_is_covered_by_a_flushed_prefix() {
        let viewer = Viewer::new(vec![3, 1], 2);
        let derived = [
            keys::category_by_id(4),
            keys::categories_by_parent(0, false, &viewer),
            keys::categories_all("", true, &viewer),
            keys::categories_home_page(false, &viewer),
            keys::child_category_ids(1, false, &viewer),
            keys::product_categories_by_product(9, false, &viewer),
            keys::product_categories_by_category(4, true, &viewer),
        ];
        for key in derived {
            assert!(
                keys::CATALOG_PREFIXES.iter().any(|p| key.starts_with(p)),
                "{key} escapes every flushed namespace"
            );
        }
    }

    #[test]
    fn flush_during_compute_discards_the_fill() {
        let cache = MemoryCache::new();
        let computed: Vec<i64> = get_or_compute(&cache, "catalog.category.k", || {
            cache.remove_by_prefix(keys::CATEGORY_PREFIX).unwrap();
            Ok(vec![1])
        })
        .unwrap();
        assert_eq!(computed, vec![1]);
        assert!(!cache.contains_key("catalog.category.k"));

        let again: Vec<i64> = get_or_compute(&cache, "catalog.category.k", || Ok(vec![2])).unwrap();
        assert_eq!(again, vec![2]);
        assert!(cache.contains_key("catalog.category.k"));
    }

    #[test]
    fn null_cache_never_hits() {
        let cache = NullCache;
        cache.set_entry("k", Arc::new(1_u8)).unwrap();
        assert!(cache.get_entry("k").unwrap().is_none());
    }
}
