//! Human-readable category paths for products, e.g. `Electronics > Phones > Smartphones`.

use std::collections::{HashSet, VecDeque};

use tracing::warn;

use crate::category_service::CategoryService;
use crate::error::AppResult;
use crate::localization::display_name;
use crate::model::ROOT_CATEGORY_ID;

pub const PATH_SEPARATOR: &str = " > ";

/// Returns a previously stored path for a leaf category id.
pub type PathLookup = Box<dyn Fn(i64) -> Option<String> + Send + Sync>;
/// Receives the leaf category id and the freshly built path.
pub type PathStore = Box<dyn Fn(i64, &str) + Send + Sync>;

pub struct CategoryPathResolver<'a> {
    service: &'a CategoryService,
    lookup: Option<PathLookup>,
    store: Option<PathStore>,
}

impl<'a> CategoryPathResolver<'a> {
    pub fn new(service: &'a CategoryService) -> Self {
        Self {
            service,
            lookup: None,
            store: None,
        }
    }

    pub fn with_lookup(mut self, lookup: PathLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_store(mut self, store: PathStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Path of the product's first category, root first.
    ///
    /// Empty when the product has no category. The walk stops at the root, at a
    /// deleted or unpublished category, or when an id repeats.
    pub fn resolve(&self, product_id: i64, language_id: Option<i64>) -> AppResult<String> {
        let Some(mapping) = self.service.first_product_category(product_id)? else {
            return Ok(String::new());
        };
        let leaf_id = mapping.category_id;

        if let Some(lookup) = &self.lookup {
            if let Some(hit) = lookup(leaf_id).filter(|path| !path.is_empty()) {
                return Ok(hit);
            }
        }

        let mut names = VecDeque::new();
        let mut visited = HashSet::new();
        let mut current_id = leaf_id;
        while current_id != ROOT_CATEGORY_ID {
            if !visited.insert(current_id) {
                warn!(
                    target: "sitecatalog",
                    event = "path_cycle_detected",
                    product_id,
                    leaf_id,
                    repeated_id = current_id
                );
                break;
            }
            let Some(category) = self.service.get_category_by_id(current_id)? else {
                break;
            };
            if category.deleted || !category.published {
                break;
            }
            names.push_front(display_name(self.service.localizer(), &category, language_id));
            current_id = category.parent_category_id;
        }

        let path = Vec::from(names).join(PATH_SEPARATOR);
        if !path.is_empty() {
            if let Some(store) = &self.store {
                store(leaf_id, &path);
            }
        }
        Ok(path)
    }
}
