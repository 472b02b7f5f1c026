//! ACL and site-mapping visibility for category-like records.
//!
//! The bulk path mirrors a relational join: every candidate yields one row per
//! matching grant, and the joined rows are collapsed back to one row per id.
//! Single-entity checks go through [`AclService`] and [`SiteMappingService`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::context::{SiteContext, Viewer, WorkContext};
use crate::error::AppResult;
use crate::model::{
    AclRecord, AclSupported, Category, Entity, ProductCategory, SiteMapping, SiteMappingSupported,
};
use crate::settings::CatalogSettings;
use crate::store::Repository;

/// Keeps the first row per id after a stable sort by id.
///
/// Among duplicates the earliest input row wins, so repeated calls over the
/// same input always keep the same representative.
pub fn distinct_by_id<T, F>(rows: Vec<T>, id_of: F) -> Vec<T>
where
    F: Fn(&T) -> i64,
{
    let mut rows = rows;
    rows.sort_by_key(|row| id_of(row));
    let mut seen = HashSet::new();
    rows.retain(|row| seen.insert(id_of(row)));
    rows
}

/// Grant rows for one entity type, indexed by entity id.
struct Grants {
    roles: HashMap<i64, Vec<i64>>,
    sites: HashMap<i64, Vec<i64>>,
    ignore_acl: bool,
    ignore_sites: bool,
}

impl Grants {
    /// Number of joined rows the candidate produces; zero means it is hidden.
    fn join_width<E>(&self, entity: &E, viewer: &Viewer) -> usize
    where
        E: AclSupported + SiteMappingSupported,
    {
        let acl_rows = if self.ignore_acl || !entity.subject_to_acl() {
            1
        } else {
            self.roles.get(&entity.id()).map_or(0, |roles| {
                roles.iter().filter(|role| viewer.has_role(**role)).count()
            })
        };
        let site_rows = if self.ignore_sites || !entity.limited_to_sites() {
            1
        } else {
            self.sites.get(&entity.id()).map_or(0, |sites| {
                sites.iter().filter(|site| **site == viewer.site_id).count()
            })
        };
        acl_rows * site_rows
    }
}

#[derive(Clone)]
pub struct VisibilityFilter {
    acl_records: Arc<dyn Repository<AclRecord>>,
    site_mappings: Arc<dyn Repository<SiteMapping>>,
    ignore_acl: bool,
    ignore_sites: bool,
}

impl VisibilityFilter {
    pub fn new(
        acl_records: Arc<dyn Repository<AclRecord>>,
        site_mappings: Arc<dyn Repository<SiteMapping>>,
        settings: &CatalogSettings,
    ) -> Self {
        Self {
            acl_records,
            site_mappings,
            ignore_acl: settings.ignore_acl,
            ignore_sites: settings.ignore_site_limitations,
        }
    }

    fn grants<E: Entity>(&self) -> AppResult<Grants> {
        let mut roles: HashMap<i64, Vec<i64>> = HashMap::new();
        if !self.ignore_acl {
            for record in self.acl_records.all()? {
                if record.entity_name == E::ENTITY_NAME {
                    roles
                        .entry(record.entity_id)
                        .or_default()
                        .push(record.user_role_id);
                }
            }
        }
        let mut sites: HashMap<i64, Vec<i64>> = HashMap::new();
        if !self.ignore_sites {
            for mapping in self.site_mappings.all()? {
                if mapping.entity_name == E::ENTITY_NAME {
                    sites
                        .entry(mapping.entity_id)
                        .or_default()
                        .push(mapping.site_id);
                }
            }
        }
        Ok(Grants {
            roles,
            sites,
            ignore_acl: self.ignore_acl,
            ignore_sites: self.ignore_sites,
        })
    }

    /// Narrows `candidates` to what `viewer` may see, one row per id, ordered by id.
    pub fn filter<E>(&self, candidates: Vec<E>, viewer: &Viewer) -> AppResult<Vec<E>>
    where
        E: AclSupported + SiteMappingSupported,
    {
        let grants = self.grants::<E>()?;
        let joined: Vec<(i64, usize)> = candidates
            .iter()
            .enumerate()
            .flat_map(|(index, entity)| {
                std::iter::repeat((entity.id(), index)).take(grants.join_width(entity, viewer))
            })
            .collect();
        Ok(materialize(&candidates, distinct_by_id(joined, |row| row.0)))
    }

    /// Keeps mappings whose category is present in `categories` and visible to `viewer`.
    pub fn filter_mappings(
        &self,
        mappings: Vec<ProductCategory>,
        categories: &HashMap<i64, Category>,
        viewer: &Viewer,
    ) -> AppResult<Vec<ProductCategory>> {
        let grants = self.grants::<Category>()?;
        let joined: Vec<(i64, usize)> = mappings
            .iter()
            .enumerate()
            .flat_map(|(index, mapping)| {
                let width = categories
                    .get(&mapping.category_id)
                    .map_or(0, |category| grants.join_width(category, viewer));
                std::iter::repeat((mapping.id, index)).take(width)
            })
            .collect();
        Ok(materialize(&mappings, distinct_by_id(joined, |row| row.0)))
    }
}

fn materialize<T: Clone>(rows: &[T], picks: Vec<(i64, usize)>) -> Vec<T> {
    picks
        .into_iter()
        .map(|(_, index)| rows[index].clone())
        .collect()
}

/// Single-entity ACL authorization against the current actor.
#[derive(Clone)]
pub struct AclService {
    records: Arc<dyn Repository<AclRecord>>,
    work_context: Arc<dyn WorkContext>,
    ignore_acl: bool,
}

impl AclService {
    pub fn new(
        records: Arc<dyn Repository<AclRecord>>,
        work_context: Arc<dyn WorkContext>,
        settings: &CatalogSettings,
    ) -> Self {
        Self {
            records,
            work_context,
            ignore_acl: settings.ignore_acl,
        }
    }

    pub fn allowed_role_ids<E: Entity>(&self, entity_id: i64) -> AppResult<Vec<i64>> {
        let mut roles: Vec<i64> = self
            .records
            .all()?
            .into_iter()
            .filter(|record| record.entity_name == E::ENTITY_NAME && record.entity_id == entity_id)
            .map(|record| record.user_role_id)
            .collect();
        roles.sort_unstable();
        roles.dedup();
        Ok(roles)
    }

    pub fn authorize<E: AclSupported>(&self, entity: &E) -> AppResult<bool> {
        self.authorize_roles(entity, &self.work_context.current_role_ids())
    }

    pub fn authorize_roles<E: AclSupported>(&self, entity: &E, role_ids: &[i64]) -> AppResult<bool> {
        if self.ignore_acl || !entity.subject_to_acl() {
            return Ok(true);
        }
        let allowed = self.allowed_role_ids::<E>(entity.id())?;
        Ok(role_ids.iter().any(|role| allowed.contains(role)))
    }
}

/// Single-entity site-mapping authorization against the current site.
#[derive(Clone)]
pub struct SiteMappingService {
    mappings: Arc<dyn Repository<SiteMapping>>,
    site_context: Arc<dyn SiteContext>,
    ignore_site_limitations: bool,
}

impl SiteMappingService {
    pub fn new(
        mappings: Arc<dyn Repository<SiteMapping>>,
        site_context: Arc<dyn SiteContext>,
        settings: &CatalogSettings,
    ) -> Self {
        Self {
            mappings,
            site_context,
            ignore_site_limitations: settings.ignore_site_limitations,
        }
    }

    pub fn site_ids_with_access<E: Entity>(&self, entity_id: i64) -> AppResult<Vec<i64>> {
        let mut sites: Vec<i64> = self
            .mappings
            .all()?
            .into_iter()
            .filter(|mapping| {
                mapping.entity_name == E::ENTITY_NAME && mapping.entity_id == entity_id
            })
            .map(|mapping| mapping.site_id)
            .collect();
        sites.sort_unstable();
        sites.dedup();
        Ok(sites)
    }

    pub fn authorize<E: SiteMappingSupported>(&self, entity: &E) -> AppResult<bool> {
        self.authorize_site(entity, self.site_context.current_site_id())
    }

    pub fn authorize_site<E: SiteMappingSupported>(&self, entity: &E, site_id: i64) -> AppResult<bool> {
        if self.ignore_site_limitations || !entity.limited_to_sites() {
            return Ok(true);
        }
        Ok(self.site_ids_with_access::<E>(entity.id())?.contains(&site_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{StaticSiteContext, StaticWorkContext};
    use crate::store::MemoryRepository;

    fn restricted(id: i64) -> Category {
        let mut category = Category::new(id, 0, format!("c{id}"));
        category.subject_to_acl = true;
        category
    }

    fn filter_with(
        acl: Vec<AclRecord>,
        sites: Vec<SiteMapping>,
        settings: &CatalogSettings,
    ) -> VisibilityFilter {
        VisibilityFilter::new(
            Arc::new(MemoryRepository::with_records(acl).unwrap()),
            Arc::new(MemoryRepository::with_records(sites).unwrap()),
            settings,
        )
    }

    #[test]
    fn distinct_by_id_keeps_first_occurrence() {
        let rows = vec![(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')];
        assert_eq!(distinct_by_id(rows, |r| r.0), vec![(1, 'b'), (2, 'a')]);
    }

    #[test]
    fn acl_restricted_category_needs_a_matching_role() {
        let settings = CatalogSettings::default();
        let viewer = Viewer::new([5], 1);

        let hidden = filter_with(vec![], vec![], &settings)
            .filter(vec![restricted(1)], &viewer)
            .unwrap();
        assert!(hidden.is_empty());

        let granted = filter_with(
            vec![AclRecord::for_entity::<Category>(1, 5)],
            vec![],
            &settings,
        )
        .filter(vec![restricted(1)], &viewer)
        .unwrap();
        assert_eq!(granted.len(), 1);
    }

    #[test]
    fn multiple_grants_collapse_to_one_row() {
        let settings = CatalogSettings::default();
        let viewer = Viewer::new([5, 6], 1);
        let mut category = restricted(1);
        category.limited_to_sites = true;
        let filter = filter_with(
            vec![
                AclRecord::for_entity::<Category>(1, 5),
                AclRecord::for_entity::<Category>(1, 6),
            ],
            vec![
                SiteMapping::for_entity::<Category>(1, 1),
                SiteMapping::for_entity::<Category>(1, 1),
            ],
            &settings,
        );
        let visible = filter.filter(vec![category], &viewer).unwrap();
        assert_eq!(visible.len(), 1);
    }

    #[test]
    fn grants_for_other_entity_types_are_ignored() {
        let settings = CatalogSettings::default();
        let viewer = Viewer::new([5], 1);
        let filter = filter_with(
            vec![AclRecord {
                id: 0,
                entity_id: 1,
                entity_name: "Product".into(),
                user_role_id: 5,
            }],
            vec![],
            &settings,
        );
        assert!(filter.filter(vec![restricted(1)], &viewer).unwrap().is_empty());
    }

    #[test]
    fn site_limited_category_needs_mapping_for_current_site() {
        let settings = CatalogSettings::default();
        let mut category = Category::new(1, 0, "c");
        category.limited_to_sites = true;
        let filter = filter_with(vec![], vec![SiteMapping::for_entity::<Category>(1, 2)], &settings);

        assert!(filter
            .filter(vec![category.clone()], &Viewer::new([], 1))
            .unwrap()
            .is_empty());
        assert_eq!(
            filter
                .filter(vec![category], &Viewer::new([], 2))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn ignore_flags_bypass_restrictions() {
        let settings = CatalogSettings {
            ignore_acl: true,
            ignore_site_limitations: true,
            ..CatalogSettings::default()
        };
        let mut category = restricted(1);
        category.limited_to_sites = true;
        let visible = filter_with(vec![], vec![], &settings)
            .filter(vec![category], &Viewer::new([], 9))
            .unwrap();
        assert_eq!(visible.len(), 1);
    }

    #[test]
    fn mappings_follow_their_category_visibility() {
        let settings = CatalogSettings::default();
        let viewer = Viewer::new([1], 1);
        let categories: HashMap<i64, Category> = [
            (1, Category::new(1, 0, "open")),
            (2, restricted(2)),
        ]
        .into_iter()
        .collect();
        let mappings = vec![
            ProductCategory::new(10, 100, 1, 0),
            ProductCategory::new(11, 100, 2, 0),
            ProductCategory::new(12, 100, 3, 0),
        ];
        let visible = filter_with(vec![], vec![], &settings)
            .filter_mappings(mappings, &categories, &viewer)
            .unwrap();
        let ids: Vec<i64> = visible.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![10]);
    }

    #[test]
    fn single_entity_authorizers_use_current_context() {
        let settings = CatalogSettings::default();
        let work = Arc::new(StaticWorkContext::new([3]));
        let site = Arc::new(StaticSiteContext::new(1));
        let acl = AclService::new(
            Arc::new(
                MemoryRepository::with_records([AclRecord::for_entity::<Category>(1, 3)]).unwrap(),
            ),
            work.clone(),
            &settings,
        );
        let sites = SiteMappingService::new(
            Arc::new(
                MemoryRepository::with_records([SiteMapping::for_entity::<Category>(1, 2)])
                    .unwrap(),
            ),
            site.clone(),
            &settings,
        );

        let mut category = restricted(1);
        category.limited_to_sites = true;
        assert!(acl.authorize(&category).unwrap());
        assert!(!sites.authorize(&category).unwrap());

        work.set_role_ids([4]);
        site.set_site_id(2);
        assert!(!acl.authorize(&category).unwrap());
        assert!(sites.authorize(&category).unwrap());
        assert_eq!(acl.allowed_role_ids::<Category>(1).unwrap(), vec![3]);
    }
}
