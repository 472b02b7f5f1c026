use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Parent id used by top-level categories. Never resolves to a record.
pub const ROOT_CATEGORY_ID: i64 = 0;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A record held by a [`crate::store::Repository`].
pub trait Entity: Clone + Send + Sync + 'static {
    /// Name used by ACL and site-mapping rows to refer to this entity type.
    const ENTITY_NAME: &'static str;

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
}

/// Entities that can be restricted to a set of user roles.
pub trait AclSupported: Entity {
    fn subject_to_acl(&self) -> bool;
}

/// Entities that can be restricted to a set of sites.
pub trait SiteMappingSupported: Entity {
    fn limited_to_sites(&self) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    pub id: i64,
    pub parent_category_id: i64,
    pub name: String,
    pub full_name: String,
    pub alias: String,
    pub display_order: i32,
    pub published: bool,
    pub deleted: bool,
    pub subject_to_acl: bool,
    pub limited_to_sites: bool,
    pub show_on_home_page: bool,
    pub has_discounts_applied: bool,
    pub created_on_utc: i64,
    pub updated_on_utc: i64,
}

impl Category {
    /// A published, unrestricted category. Convenient for seeding and tests.
    pub fn new(id: i64, parent_category_id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            parent_category_id,
            name: name.into(),
            published: true,
            ..Self::default()
        }
    }

    pub fn with_display_order(mut self, display_order: i32) -> Self {
        self.display_order = display_order;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_category_id == ROOT_CATEGORY_ID
    }
}

impl Entity for Category {
    const ENTITY_NAME: &'static str = "Category";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

impl AclSupported for Category {
    fn subject_to_acl(&self) -> bool {
        self.subject_to_acl
    }
}

impl SiteMappingSupported for Category {
    fn limited_to_sites(&self) -> bool {
        self.limited_to_sites
    }
}

/// Many-to-many membership of a product in a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductCategory {
    pub id: i64,
    pub product_id: i64,
    pub category_id: i64,
    pub display_order: i32,
    pub is_featured_product: bool,
}

impl ProductCategory {
    pub fn new(id: i64, product_id: i64, category_id: i64, display_order: i32) -> Self {
        Self {
            id,
            product_id,
            category_id,
            display_order,
            is_featured_product: false,
        }
    }
}

impl Entity for ProductCategory {
    const ENTITY_NAME: &'static str = "ProductCategory";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub published: bool,
    pub deleted: bool,
}

impl Product {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            published: true,
            deleted: false,
        }
    }
}

impl Entity for Product {
    const ENTITY_NAME: &'static str = "Product";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

/// Grants a user role visibility over an ACL-restricted entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclRecord {
    pub id: i64,
    pub entity_id: i64,
    pub entity_name: String,
    pub user_role_id: i64,
}

impl AclRecord {
    pub fn for_entity<E: Entity>(entity_id: i64, user_role_id: i64) -> Self {
        Self {
            id: 0,
            entity_id,
            entity_name: E::ENTITY_NAME.to_string(),
            user_role_id,
        }
    }
}

impl Entity for AclRecord {
    const ENTITY_NAME: &'static str = "AclRecord";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

/// Grants a site visibility over a site-limited entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteMapping {
    pub id: i64,
    pub entity_id: i64,
    pub entity_name: String,
    pub site_id: i64,
}

impl SiteMapping {
    pub fn for_entity<E: Entity>(entity_id: i64, site_id: i64) -> Self {
        Self {
            id: 0,
            entity_id,
            entity_name: E::ENTITY_NAME.to_string(),
            site_id,
        }
    }
}

impl Entity for SiteMapping {
    const ENTITY_NAME: &'static str = "SiteMapping";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

/// One page of an ordered result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PagedList<T> {
    pub items: Vec<T>,
    pub page_index: usize,
    pub page_size: usize,
    pub total_count: usize,
}

impl<T> PagedList<T> {
    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(self.page_size)
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_index > 0
    }

    pub fn has_next_page(&self) -> bool {
        self.page_index + 1 < self.total_pages()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page_index: usize,
    pub page_size: usize,
}

impl Paging {
    pub fn new(page_index: usize, page_size: usize) -> Self {
        Self {
            page_index,
            page_size: page_size.max(1),
        }
    }

    /// A single page holding every row.
    pub fn all() -> Self {
        Self {
            page_index: 0,
            page_size: usize::MAX,
        }
    }

    pub fn apply<T: Clone>(&self, rows: &[T]) -> PagedList<T> {
        let start = self.page_index.saturating_mul(self.page_size);
        let items = rows
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();
        PagedList {
            items,
            page_index: self.page_index,
            page_size: self.page_size,
            total_count: rows.len(),
        }
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_defaults_deserialize_from_sparse_json() {
        let category: Category =
            serde_json::from_str(r#"{"id": 3, "parent_category_id": 1, "name": "Laptops"}"#)
                .expect("parse category");
        assert_eq!(category.id, 3);
        assert!(!category.published);
        assert!(!category.deleted);
        assert!(!category.is_root());
    }

    #[test]
    fn acl_record_uses_entity_name() {
        let record = AclRecord::for_entity::<Category>(7, 2);
        assert_eq!(record.entity_name, "Category");
        assert_eq!(record.entity_id, 7);
    }

    #[test]
    fn paging_slices_and_counts() {
        let rows: Vec<i32> = (1..=7).collect();
        let page = Paging::new(1, 3).apply(&rows);
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total_count, 7);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_previous_page());
        assert!(page.has_next_page());

        let last = Paging::new(2, 3).apply(&rows);
        assert_eq!(last.items, vec![7]);
        assert!(!last.has_next_page());
    }

    #[test]
    fn paging_all_returns_everything() {
        let rows = vec!["a", "b"];
        let page = Paging::all().apply(&rows);
        assert_eq!(page.items, rows);
        assert_eq!(page.total_pages(), 1);
    }

    #[test]
    fn now_ms_is_reasonable() {
        let now = now_ms();
        assert!(now > 1_500_000_000_000);
        assert!(now < 4_100_000_000_000);
    }
}
