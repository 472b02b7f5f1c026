use std::sync::Arc;

use crate::error::AppResult;
use crate::model::Category;
use crate::util::dispatch_with_fence;

/// A pluggable narrowing step applied to visible category sets.
pub trait NavigationFilter: Send + Sync {
    fn name(&self) -> &str {
        "anonymous"
    }

    fn apply(&self, candidates: Vec<Category>) -> Vec<Category>;
}

impl<F> NavigationFilter for F
where
    F: Fn(Vec<Category>) -> Vec<Category> + Send + Sync,
{
    fn apply(&self, candidates: Vec<Category>) -> Vec<Category> {
        self(candidates)
    }
}

/// Filters composed in registration order.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn NavigationFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, filter: Arc<dyn NavigationFilter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs every filter in turn. A panicking plugin fails the call.
    pub fn apply(&self, candidates: Vec<Category>) -> AppResult<Vec<Category>> {
        let mut current = candidates;
        for filter in &self.filters {
            let input = current;
            current = dispatch_with_fence(|| filter.apply(input)).map_err(|err| {
                tracing::error!(
                    target: "sitecatalog",
                    event = "navigation_filter_panicked",
                    filter = filter.name(),
                    error = %err
                );
                err.with_context("filter", filter.name().to_string())
            })?;
        }
        Ok(current)
    }
}
