//! Category store: cached lookups, visibility-aware listings, and mutations
//! that keep the parent hierarchy acyclic and the cache coherent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{self, get_or_compute, keys, CacheManager, MemoryCache};
use crate::cascade::{self, CascadeReport};
use crate::context::{
    current_viewer, SiteContext, StaticSiteContext, StaticWorkContext, Viewer, WorkContext,
};
use crate::error::{AppError, AppResult};
use crate::events::{CatalogRecord, ChangeNotifier, NoopNotifier};
use crate::localization::{display_name, DefaultNames, NameLocalizer};
use crate::model::{now_ms, Category, PagedList, Paging, ProductCategory, ROOT_CATEGORY_ID};
use crate::navigation::{FilterChain, NavigationFilter};
use crate::settings::CatalogSettings;
use crate::store::CatalogStores;
use crate::tree::sort_categories_for_tree;
use crate::visibility::{distinct_by_id, AclService, SiteMappingService, VisibilityFilter};

/// Result of [`CategoryService::update_category`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The category as persisted.
    pub category: Category,
    /// The parent the caller asked for.
    pub requested_parent_id: i64,
    /// True when the requested parent would have closed a cycle and was replaced by the root.
    pub parent_reset: bool,
}

fn sort_by_display_order(rows: &mut [Category]) {
    rows.sort_by_key(|category| (category.display_order, category.id));
}

fn sort_mappings(rows: &mut [ProductCategory]) {
    rows.sort_by_key(|mapping| (mapping.display_order, mapping.id));
}

pub fn find_product_category(
    mappings: &[ProductCategory],
    product_id: i64,
    category_id: i64,
) -> Option<&ProductCategory> {
    mappings
        .iter()
        .find(|mapping| mapping.product_id == product_id && mapping.category_id == category_id)
}

pub struct CategoryServiceBuilder {
    stores: CatalogStores,
    cache: Arc<dyn CacheManager>,
    work_context: Arc<dyn WorkContext>,
    site_context: Arc<dyn SiteContext>,
    notifier: Arc<dyn ChangeNotifier>,
    localizer: Arc<dyn NameLocalizer>,
    filters: FilterChain,
    settings: CatalogSettings,
}

impl CategoryServiceBuilder {
    pub fn cache(mut self, cache: Arc<dyn CacheManager>) -> Self {
        self.cache = cache;
        self
    }

    pub fn work_context(mut self, work_context: Arc<dyn WorkContext>) -> Self {
        self.work_context = work_context;
        self
    }

    pub fn site_context(mut self, site_context: Arc<dyn SiteContext>) -> Self {
        self.site_context = site_context;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn localizer(mut self, localizer: Arc<dyn NameLocalizer>) -> Self {
        self.localizer = localizer;
        self
    }

    pub fn navigation_filter(mut self, filter: Arc<dyn NavigationFilter>) -> Self {
        self.filters.register(filter);
        self
    }

    pub fn settings(mut self, settings: CatalogSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> CategoryService {
        let visibility = VisibilityFilter::new(
            self.stores.acl_records.clone(),
            self.stores.site_mappings.clone(),
            &self.settings,
        );
        let acl = AclService::new(
            self.stores.acl_records.clone(),
            self.work_context.clone(),
            &self.settings,
        );
        let site_mappings = SiteMappingService::new(
            self.stores.site_mappings.clone(),
            self.site_context.clone(),
            &self.settings,
        );
        CategoryService {
            stores: self.stores,
            cache: self.cache,
            work_context: self.work_context,
            site_context: self.site_context,
            notifier: self.notifier,
            localizer: self.localizer,
            filters: self.filters,
            settings: self.settings,
            visibility,
            acl,
            site_mappings,
        }
    }
}

pub struct CategoryService {
    stores: CatalogStores,
    cache: Arc<dyn CacheManager>,
    work_context: Arc<dyn WorkContext>,
    site_context: Arc<dyn SiteContext>,
    notifier: Arc<dyn ChangeNotifier>,
    localizer: Arc<dyn NameLocalizer>,
    filters: FilterChain,
    settings: CatalogSettings,
    visibility: VisibilityFilter,
    acl: AclService,
    site_mappings: SiteMappingService,
}

impl CategoryService {
    /// Starts a builder with an in-process cache, an anonymous actor on site 0,
    /// no notifications and default names.
    pub fn builder(stores: CatalogStores) -> CategoryServiceBuilder {
        CategoryServiceBuilder {
            stores,
            cache: Arc::new(MemoryCache::new()),
            work_context: Arc::new(StaticWorkContext::default()),
            site_context: Arc::new(StaticSiteContext::default()),
            notifier: Arc::new(NoopNotifier),
            localizer: Arc::new(DefaultNames),
            filters: FilterChain::new(),
            settings: CatalogSettings::default(),
        }
    }

    pub fn stores(&self) -> &CatalogStores {
        &self.stores
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    pub fn localizer(&self) -> &dyn NameLocalizer {
        self.localizer.as_ref()
    }

    pub fn acl(&self) -> &AclService {
        &self.acl
    }

    pub fn site_mappings(&self) -> &SiteMappingService {
        &self.site_mappings
    }

    /// The actor and site of the current request.
    pub fn viewer(&self) -> Viewer {
        current_viewer(&self.work_context, &self.site_context)
    }

    fn flush(&self) -> AppResult<()> {
        cache::flush_prefixes(self.cache.as_ref(), &keys::CATALOG_PREFIXES).map(|_| ())
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Absent for the root sentinel and for unknown ids.
    pub fn get_category_by_id(&self, id: i64) -> AppResult<Option<Category>> {
        if id <= ROOT_CATEGORY_ID {
            return Ok(None);
        }
        get_or_compute(self.cache.as_ref(), &keys::category_by_id(id), || {
            self.stores.categories.by_id(id)
        })
    }

    /// Fetches each id in turn, skipping unknown ones and keeping the requested order.
    pub fn get_categories_by_ids(&self, ids: &[i64]) -> AppResult<Vec<Category>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(category) = self.get_category_by_id(*id)? {
                found.push(category);
            }
        }
        Ok(found)
    }

    pub fn get_all_categories_by_parent_id(
        &self,
        parent_id: i64,
        show_hidden: bool,
    ) -> AppResult<Vec<Category>> {
        let viewer = self.viewer();
        self.get_children_for(parent_id, &viewer, show_hidden)
    }

    /// Direct children of `parent_id` as seen by `viewer`, ordered by display order.
    ///
    /// `show_hidden` includes unpublished children and skips ACL, site and
    /// navigation filtering. Deleted children are never returned.
    pub fn get_children_for(
        &self,
        parent_id: i64,
        viewer: &Viewer,
        show_hidden: bool,
    ) -> AppResult<Vec<Category>> {
        let key = keys::categories_by_parent(parent_id, show_hidden, viewer);
        let children = get_or_compute(self.cache.as_ref(), &key, || {
            let candidates: Vec<Category> = self
                .stores
                .categories
                .all()?
                .into_iter()
                .filter(|category| {
                    category.parent_category_id == parent_id
                        && !category.deleted
                        && (show_hidden || category.published)
                })
                .collect();
            let mut rows = if show_hidden {
                candidates
            } else {
                distinct_by_id(self.visibility.filter(candidates, viewer)?, |c| c.id)
            };
            sort_by_display_order(&mut rows);
            Ok(rows)
        })?;

        if show_hidden {
            Ok(children)
        } else {
            self.filters.apply(children)
        }
    }

    /// Categories whose name contains `name` (case-insensitive), tree-sorted and paged.
    /// An empty `name` matches every category.
    pub fn get_all_categories(
        &self,
        name: &str,
        show_hidden: bool,
        paging: Paging,
    ) -> AppResult<PagedList<Category>> {
        let viewer = self.viewer();
        let needle = name.trim().to_lowercase();
        let key = keys::categories_all(&needle, show_hidden, &viewer);
        let sorted = get_or_compute(self.cache.as_ref(), &key, || {
            let candidates: Vec<Category> = self
                .stores
                .categories
                .all()?
                .into_iter()
                .filter(|category| {
                    !category.deleted
                        && (show_hidden || category.published)
                        && (needle.is_empty() || category.name.to_lowercase().contains(&needle))
                })
                .collect();
            let rows = if show_hidden {
                candidates
            } else {
                distinct_by_id(self.visibility.filter(candidates, &viewer)?, |c| c.id)
            };
            Ok(sort_categories_for_tree(rows, self.settings.orphan_policy))
        })?;

        let sorted = if show_hidden {
            sorted
        } else {
            self.filters.apply(sorted)?
        };
        Ok(paging.apply(&sorted))
    }

    pub fn get_all_categories_displayed_on_home_page(
        &self,
        show_hidden: bool,
    ) -> AppResult<Vec<Category>> {
        let viewer = self.viewer();
        let key = keys::categories_home_page(show_hidden, &viewer);
        get_or_compute(self.cache.as_ref(), &key, || {
            let candidates: Vec<Category> = self
                .stores
                .categories
                .all()?
                .into_iter()
                .filter(|category| {
                    category.show_on_home_page
                        && !category.deleted
                        && (show_hidden || category.published)
                })
                .collect();
            let mut rows = if show_hidden {
                candidates
            } else {
                distinct_by_id(self.visibility.filter(candidates, &viewer)?, |c| c.id)
            };
            sort_by_display_order(&mut rows);
            Ok(rows)
        })
    }

    /// Ids of every descendant of `parent_id`, in tree order.
    pub fn get_child_category_ids(&self, parent_id: i64, show_hidden: bool) -> AppResult<Vec<i64>> {
        let viewer = self.viewer();
        let key = keys::child_category_ids(parent_id, show_hidden, &viewer);
        get_or_compute(self.cache.as_ref(), &key, || {
            let mut ids = Vec::new();
            let mut visited = HashSet::from([parent_id]);
            let mut stack: Vec<i64> = self
                .get_children_for(parent_id, &viewer, show_hidden)?
                .into_iter()
                .rev()
                .map(|c| c.id)
                .collect();
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }
                ids.push(id);
                let children = self.get_children_for(id, &viewer, show_hidden)?;
                stack.extend(children.into_iter().rev().map(|c| c.id));
            }
            Ok(ids)
        })
    }

    /// Ancestors of `category` followed by the category itself, root first.
    ///
    /// The walk stops at a deleted category, at an unpublished or unauthorized
    /// one unless `show_hidden`, and at any id it has already visited.
    pub fn get_category_breadcrumb(
        &self,
        category: &Category,
        show_hidden: bool,
    ) -> AppResult<Vec<Category>> {
        let mut crumbs = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(category.clone());
        while let Some(node) = current {
            if node.deleted {
                break;
            }
            if !show_hidden
                && (!node.published
                    || !self.acl.authorize(&node)?
                    || !self.site_mappings.authorize(&node)?)
            {
                break;
            }
            if !visited.insert(node.id) {
                warn!(
                    target: "sitecatalog",
                    event = "breadcrumb_cycle_detected",
                    category_id = category.id,
                    repeated_id = node.id
                );
                break;
            }
            current = self.get_category_by_id(node.parent_category_id)?;
            crumbs.push(node);
        }
        crumbs.reverse();
        Ok(crumbs)
    }

    /// Breadcrumb names joined by the configured separator.
    pub fn get_formatted_breadcrumb(
        &self,
        category: &Category,
        language_id: Option<i64>,
    ) -> AppResult<String> {
        let separator = format!(" {} ", self.settings.breadcrumb_separator);
        Ok(self
            .get_category_breadcrumb(category, false)?
            .iter()
            .map(|crumb| display_name(self.localizer.as_ref(), crumb, language_id))
            .collect::<Vec<_>>()
            .join(&separator))
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    pub fn insert_category(&self, category: Category) -> AppResult<Category> {
        if category.name.trim().is_empty() {
            return Err(AppError::invalid_argument(
                "category",
                "A category needs a name",
            ));
        }
        let mut category = category;
        let now = now_ms();
        category.created_on_utc = now;
        category.updated_on_utc = now;
        self.stores.categories.insert(&mut category)?;
        self.flush()?;
        self.notifier
            .entity_inserted(CatalogRecord::Category(category.clone()));
        info!(
            target: "sitecatalog",
            event = "category_inserted",
            category_id = category.id,
            parent_id = category.parent_category_id
        );
        Ok(category)
    }

    /// True when following parents from `category`'s requested parent reaches `category`.
    fn closes_cycle(&self, category: &Category) -> AppResult<bool> {
        let mut visited = HashSet::new();
        let mut parent_id = category.parent_category_id;
        while parent_id != ROOT_CATEGORY_ID {
            if parent_id == category.id {
                return Ok(true);
            }
            if !visited.insert(parent_id) {
                return Ok(false);
            }
            match self.get_category_by_id(parent_id)? {
                Some(parent) => parent_id = parent.parent_category_id,
                None => return Ok(false),
            }
        }
        Ok(false)
    }

    /// Persists `category`. A parent that would close a cycle is replaced by the root.
    pub fn update_category(&self, category: Category) -> AppResult<UpdateOutcome> {
        if category.id <= 0 {
            return Err(AppError::invalid_argument(
                "category",
                "Only stored categories can be updated",
            )
            .with_context("id", category.id.to_string()));
        }
        let mut category = category;
        let requested_parent_id = category.parent_category_id;
        let parent_reset = self.closes_cycle(&category)?;
        if parent_reset {
            category.parent_category_id = ROOT_CATEGORY_ID;
            warn!(
                target: "sitecatalog",
                event = "category_parent_reset",
                category_id = category.id,
                requested_parent_id
            );
        }
        category.updated_on_utc = now_ms();
        self.stores.categories.update(&category)?;
        self.flush()?;
        self.notifier
            .entity_updated(CatalogRecord::Category(category.clone()));
        info!(
            target: "sitecatalog",
            event = "category_updated",
            category_id = category.id,
            parent_id = category.parent_category_id
        );
        Ok(UpdateOutcome {
            category,
            requested_parent_id,
            parent_reset,
        })
    }

    /// Soft-deletes `category`, then deletes or re-roots its whole subtree.
    pub fn delete_category(
        &self,
        category: Category,
        delete_children: bool,
    ) -> AppResult<CascadeReport> {
        if category.id <= 0 {
            return Err(AppError::invalid_argument(
                "category",
                "Only stored categories can be deleted",
            )
            .with_context("id", category.id.to_string()));
        }
        let mut category = category;
        category.deleted = true;
        let outcome = self.update_category(category)?;
        info!(
            target: "sitecatalog",
            event = "category_deleted",
            category_id = outcome.category.id,
            delete_children
        );
        cascade::cascade_children(self, &outcome.category, delete_children)
    }

    // ---------------------------------------------------------------------
    // Product mappings
    // ---------------------------------------------------------------------

    fn product_is_listed(&self, product_id: i64, show_hidden: bool) -> AppResult<bool> {
        Ok(self
            .stores
            .products
            .by_id(product_id)?
            .is_some_and(|product| !product.deleted && (show_hidden || product.published)))
    }

    /// Mappings into `category_id`, ordered by mapping display order, then paged.
    pub fn get_product_categories_by_category_id(
        &self,
        category_id: i64,
        show_hidden: bool,
        paging: Paging,
    ) -> AppResult<PagedList<ProductCategory>> {
        if category_id <= ROOT_CATEGORY_ID {
            return Ok(paging.apply::<ProductCategory>(&[]));
        }
        let viewer = self.viewer();
        let key = keys::product_categories_by_category(category_id, show_hidden, &viewer);
        let rows = get_or_compute(self.cache.as_ref(), &key, || {
            let category = match self.get_category_by_id(category_id)? {
                Some(category) if !category.deleted && (show_hidden || category.published) => {
                    category
                }
                _ => return Ok(Vec::new()),
            };
            let mut mappings = Vec::new();
            for mapping in self.stores.product_categories.all()? {
                if mapping.category_id == category_id
                    && self.product_is_listed(mapping.product_id, show_hidden)?
                {
                    mappings.push(mapping);
                }
            }
            let mut rows = if show_hidden {
                distinct_by_id(mappings, |m| m.id)
            } else {
                let lookup = HashMap::from([(category.id, category)]);
                self.visibility.filter_mappings(mappings, &lookup, &viewer)?
            };
            sort_mappings(&mut rows);
            Ok(rows)
        })?;
        Ok(paging.apply(&rows))
    }

    /// Mappings of `product_id` whose category is live and visible, by display order.
    pub fn get_product_categories_by_product_id(
        &self,
        product_id: i64,
        show_hidden: bool,
    ) -> AppResult<Vec<ProductCategory>> {
        if product_id <= 0 {
            return Ok(Vec::new());
        }
        let viewer = self.viewer();
        let key = keys::product_categories_by_product(product_id, show_hidden, &viewer);
        get_or_compute(self.cache.as_ref(), &key, || {
            let mappings: Vec<ProductCategory> = self
                .stores
                .product_categories
                .all()?
                .into_iter()
                .filter(|mapping| mapping.product_id == product_id)
                .collect();
            let mut categories = HashMap::new();
            for mapping in &mappings {
                if let Some(category) = self.get_category_by_id(mapping.category_id)? {
                    if !category.deleted && (show_hidden || category.published) {
                        categories.insert(category.id, category);
                    }
                }
            }
            let mut rows = if show_hidden {
                let live: Vec<ProductCategory> = mappings
                    .into_iter()
                    .filter(|mapping| categories.contains_key(&mapping.category_id))
                    .collect();
                distinct_by_id(live, |m| m.id)
            } else {
                self.visibility
                    .filter_mappings(mappings, &categories, &viewer)?
            };
            sort_mappings(&mut rows);
            Ok(rows)
        })
    }

    /// The product's mapping with the lowest display order, ignoring visibility.
    pub fn first_product_category(&self, product_id: i64) -> AppResult<Option<ProductCategory>> {
        Ok(self
            .stores
            .product_categories
            .all()?
            .into_iter()
            .filter(|mapping| mapping.product_id == product_id)
            .min_by_key(|mapping| (mapping.display_order, mapping.id)))
    }

    fn require_mapping_targets(mapping: &ProductCategory) -> AppResult<()> {
        if mapping.product_id <= 0 || mapping.category_id <= 0 {
            return Err(AppError::invalid_argument(
                "product_category",
                "A mapping needs both a product and a category",
            )
            .with_context("product_id", mapping.product_id.to_string())
            .with_context("category_id", mapping.category_id.to_string()));
        }
        Ok(())
    }

    fn require_stored_mapping(mapping: &ProductCategory) -> AppResult<()> {
        if mapping.id <= 0 {
            return Err(AppError::invalid_argument(
                "product_category",
                "Only stored mappings can be changed",
            )
            .with_context("id", mapping.id.to_string()));
        }
        Ok(())
    }

    pub fn insert_product_category(&self, mapping: ProductCategory) -> AppResult<ProductCategory> {
        Self::require_mapping_targets(&mapping)?;
        let mut mapping = mapping;
        self.stores.product_categories.insert(&mut mapping)?;
        self.flush()?;
        self.notifier
            .entity_inserted(CatalogRecord::ProductCategory(mapping.clone()));
        Ok(mapping)
    }

    pub fn update_product_category(&self, mapping: ProductCategory) -> AppResult<ProductCategory> {
        Self::require_stored_mapping(&mapping)?;
        Self::require_mapping_targets(&mapping)?;
        self.stores.product_categories.update(&mapping)?;
        self.flush()?;
        self.notifier
            .entity_updated(CatalogRecord::ProductCategory(mapping.clone()));
        Ok(mapping)
    }

    pub fn delete_product_category(&self, mapping: ProductCategory) -> AppResult<()> {
        Self::require_stored_mapping(&mapping)?;
        self.stores.product_categories.delete(&mapping)?;
        self.flush()?;
        self.notifier
            .entity_deleted(CatalogRecord::ProductCategory(mapping));
        Ok(())
    }
}
