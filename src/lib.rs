pub mod cache;
pub mod cascade;
pub mod category_service;
pub mod context;
pub mod error;
pub mod events;
pub mod localization;
pub mod logging;
pub mod model;
pub mod navigation;
pub mod path;
pub mod settings;
pub mod snapshot;
pub mod store;
pub mod tree;
pub mod util;
pub mod visibility;

pub use cache::{CacheManager, MemoryCache, NullCache};
pub use cascade::CascadeReport;
pub use category_service::{
    find_product_category, CategoryService, CategoryServiceBuilder, UpdateOutcome,
};
pub use context::{SiteContext, StaticSiteContext, StaticWorkContext, Viewer, WorkContext};
pub use error::{AppError, AppResult};
pub use events::{
    CatalogRecord, ChangeKind, ChangeNotifier, EntityChange, NoopNotifier, RecordingNotifier,
};
pub use localization::{DefaultNames, NameLocalizer, NameTable};
pub use model::{
    AclRecord, Category, PagedList, Paging, Product, ProductCategory, SiteMapping, ROOT_CATEGORY_ID,
};
pub use navigation::{FilterChain, NavigationFilter};
pub use path::{CategoryPathResolver, PATH_SEPARATOR};
pub use settings::{CatalogSettings, OrphanPolicy};
pub use snapshot::CatalogSnapshot;
pub use store::{CatalogStores, MemoryRepository, Repository};
pub use tree::{diagnose, sort_categories_for_tree, TreeDiagnostics};
pub use util::dispatch_with_fence;
