use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{AppError, AppResult, STORE_DUPLICATE_ID, STORE_ID_EXHAUSTED};
use crate::model::{AclRecord, Category, Entity, Product, ProductCategory, SiteMapping};

/// Record store for one entity type. Storage errors propagate as returned.
pub trait Repository<T: Entity>: Send + Sync {
    fn all(&self) -> AppResult<Vec<T>>;
    fn by_id(&self, id: i64) -> AppResult<Option<T>>;
    /// Persists a new record, assigning its id when it has none.
    fn insert(&self, record: &mut T) -> AppResult<()>;
    fn update(&self, record: &T) -> AppResult<()>;
    fn delete(&self, record: &T) -> AppResult<()>;
}

/// Ordered in-memory store keyed by id.
pub struct MemoryRepository<T: Entity> {
    rows: RwLock<BTreeMap<i64, T>>,
}

impl<T: Entity> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Entity> MemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store, keeping explicit ids and numbering the rest.
    pub fn with_records(records: impl IntoIterator<Item = T>) -> AppResult<Self> {
        let repo = Self::new();
        for mut record in records {
            repo.insert(&mut record)?;
        }
        Ok(repo)
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Entity> Repository<T> for MemoryRepository<T> {
    fn all(&self) -> AppResult<Vec<T>> {
        let guard = self.rows.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.values().cloned().collect())
    }

    fn by_id(&self, id: i64) -> AppResult<Option<T>> {
        let guard = self.rows.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(&id).cloned())
    }

    fn insert(&self, record: &mut T) -> AppResult<()> {
        let mut guard = self.rows.write().unwrap_or_else(|e| e.into_inner());
        if record.id() <= 0 {
            let next = match guard.keys().next_back() {
                None => 1,
                Some(last) => last.checked_add(1).ok_or_else(|| {
                    AppError::new(STORE_ID_EXHAUSTED, "No record id left to assign")
                        .with_context("entity", T::ENTITY_NAME)
                        .with_context("last_id", last.to_string())
                })?,
            };
            record.set_id(next);
        } else if guard.contains_key(&record.id()) {
            return Err(AppError::new(STORE_DUPLICATE_ID, "Record id already exists")
                .with_context("entity", T::ENTITY_NAME)
                .with_context("id", record.id().to_string()));
        }
        guard.insert(record.id(), record.clone());
        Ok(())
    }

    fn update(&self, record: &T) -> AppResult<()> {
        let mut guard = self.rows.write().unwrap_or_else(|e| e.into_inner());
        match guard.get_mut(&record.id()) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(AppError::not_found(T::ENTITY_NAME, record.id())),
        }
    }

    fn delete(&self, record: &T) -> AppResult<()> {
        let mut guard = self.rows.write().unwrap_or_else(|e| e.into_inner());
        guard
            .remove(&record.id())
            .map(|_| ())
            .ok_or_else(|| AppError::not_found(T::ENTITY_NAME, record.id()))
    }
}

/// The record stores the catalog reads from and writes to.
#[derive(Clone)]
pub struct CatalogStores {
    pub categories: Arc<dyn Repository<Category>>,
    pub product_categories: Arc<dyn Repository<ProductCategory>>,
    pub products: Arc<dyn Repository<Product>>,
    pub acl_records: Arc<dyn Repository<AclRecord>>,
    pub site_mappings: Arc<dyn Repository<SiteMapping>>,
}

impl CatalogStores {
    pub fn in_memory() -> Self {
        Self {
            categories: Arc::new(MemoryRepository::<Category>::new()),
            product_categories: Arc::new(MemoryRepository::<ProductCategory>::new()),
            products: Arc::new(MemoryRepository::<Product>::new()),
            acl_records: Arc::new(MemoryRepository::<AclRecord>::new()),
            site_mappings: Arc::new(MemoryRepository::<SiteMapping>::new()),
        }
    }
}
