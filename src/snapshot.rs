use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{AppError, AppResult, SNAPSHOT_INVALID, SNAPSHOT_WRITE_FAILED};
use crate::model::{AclRecord, Category, Product, ProductCategory, SiteMapping};
use crate::store::{CatalogStores, MemoryRepository};

/// Every catalog record, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSnapshot {
    pub categories: Vec<Category>,
    pub product_categories: Vec<ProductCategory>,
    pub products: Vec<Product>,
    pub acl_records: Vec<AclRecord>,
    pub site_mappings: Vec<SiteMapping>,
}

impl CatalogSnapshot {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::from(err).with_context("path", path.display().to_string())
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            AppError::new(SNAPSHOT_INVALID, "Snapshot is not valid catalog JSON")
                .with_context("path", path.display().to_string())
                .with_cause(err)
        })
    }

    /// Writes the snapshot through a sibling temp file so readers never see a partial file.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let write_failed = |err: AppError| {
            AppError::new(SNAPSHOT_WRITE_FAILED, "Failed to write snapshot")
                .with_context("path", path.display().to_string())
                .with_cause(err)
        };

        let body = serde_json::to_vec_pretty(self).map_err(|err| write_failed(err.into()))?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|err| write_failed(err.into()))?;
        tmp.write_all(&body).map_err(|err| write_failed(err.into()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|err| write_failed(err.into()))?;
        tmp.persist(path)
            .map_err(|err| write_failed(err.error.into()))?;
        Ok(())
    }

    pub fn capture(stores: &CatalogStores) -> AppResult<Self> {
        Ok(Self {
            categories: stores.categories.all()?,
            product_categories: stores.product_categories.all()?,
            products: stores.products.all()?,
            acl_records: stores.acl_records.all()?,
            site_mappings: stores.site_mappings.all()?,
        })
    }

    /// Loads the records into fresh in-memory stores. Duplicate ids are rejected.
    pub fn into_stores(self) -> AppResult<CatalogStores> {
        Ok(CatalogStores {
            categories: Arc::new(MemoryRepository::with_records(self.categories)?),
            product_categories: Arc::new(MemoryRepository::with_records(
                self.product_categories,
            )?),
            products: Arc::new(MemoryRepository::with_records(self.products)?),
            acl_records: Arc::new(MemoryRepository::with_records(self.acl_records)?),
            site_mappings: Arc::new(MemoryRepository::with_records(self.site_mappings)?),
        })
    }
}
