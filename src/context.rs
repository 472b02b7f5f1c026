use std::sync::{Arc, RwLock};

/// The actor and site a read is evaluated for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Viewer {
    role_ids: Vec<i64>,
    pub site_id: i64,
}

impl Viewer {
    pub fn new(role_ids: impl IntoIterator<Item = i64>, site_id: i64) -> Self {
        let mut role_ids: Vec<i64> = role_ids.into_iter().collect();
        role_ids.sort_unstable();
        role_ids.dedup();
        Self { role_ids, site_id }
    }

    pub fn role_ids(&self) -> &[i64] {
        &self.role_ids
    }

    pub fn has_role(&self, role_id: i64) -> bool {
        self.role_ids.binary_search(&role_id).is_ok()
    }

    /// Identity of the role set: equal sets produce equal keys regardless of order.
    pub fn role_key(&self) -> String {
        self.role_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Exposes the active role identifiers of the current actor.
pub trait WorkContext: Send + Sync {
    fn current_role_ids(&self) -> Vec<i64>;
}

/// Exposes the site the current request runs under.
pub trait SiteContext: Send + Sync {
    fn current_site_id(&self) -> i64;
}

#[derive(Debug, Default)]
pub struct StaticWorkContext {
    role_ids: RwLock<Vec<i64>>,
}

impl StaticWorkContext {
    pub fn new(role_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            role_ids: RwLock::new(role_ids.into_iter().collect()),
        }
    }

    pub fn set_role_ids(&self, role_ids: impl IntoIterator<Item = i64>) {
        let mut guard = self.role_ids.write().unwrap_or_else(|e| e.into_inner());
        *guard = role_ids.into_iter().collect();
    }
}

impl WorkContext for StaticWorkContext {
    fn current_role_ids(&self) -> Vec<i64> {
        self.role_ids
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[derive(Debug, Default)]
pub struct StaticSiteContext {
    site_id: RwLock<i64>,
}

impl StaticSiteContext {
    pub fn new(site_id: i64) -> Self {
        Self {
            site_id: RwLock::new(site_id),
        }
    }

    pub fn set_site_id(&self, site_id: i64) {
        *self.site_id.write().unwrap_or_else(|e| e.into_inner()) = site_id;
    }
}

impl SiteContext for StaticSiteContext {
    fn current_site_id(&self) -> i64 {
        *self.site_id.read().unwrap_or_else(|e| e.into_inner())
    }
}

pub(crate) fn current_viewer(work: &Arc<dyn WorkContext>, site: &Arc<dyn SiteContext>) -> Viewer {
    Viewer::new(work.current_role_ids(), site.current_site_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_key_ignores_order_and_duplicates() {
        let a = Viewer::new(vec![3, 1, 3], 1);
        let b = Viewer::new(vec![1, 3], 1);
        assert_eq!(a.role_key(), "1,3");
        assert_eq!(a, b);
        assert!(a.has_role(3));
        assert!(!a.has_role(2));
    }

    #[test]
    fn static_contexts_can_be_switched() {
        let work = StaticWorkContext::new([1]);
        work.set_role_ids([2, 5]);
        assert_eq!(work.current_role_ids(), vec![2, 5]);

        let site = StaticSiteContext::new(1);
        site.set_site_id(4);
        assert_eq!(site.current_site_id(), 4);
    }
}
