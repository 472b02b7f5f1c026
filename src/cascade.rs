//! Subtree handling once a category is deleted.

use std::collections::HashSet;

use tracing::{info, warn};
use uuid::Uuid;

use crate::category_service::CategoryService;
use crate::error::AppResult;
use crate::model::{Category, ROOT_CATEGORY_ID};

/// What one cascade run touched, in visit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub run_id: Uuid,
    pub deleted: Vec<i64>,
    pub reparented: Vec<i64>,
    /// Ids reached a second time through a corrupted parent chain.
    pub skipped: Vec<i64>,
}

impl CascadeReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            deleted: Vec::new(),
            reparented: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn touched(&self) -> usize {
        self.deleted.len() + self.reparented.len()
    }
}

/// Walks every descendant of `parent`, soft-deleting it when `delete_children`
/// is set and moving it to the root otherwise.
///
/// Children are read with hidden records included, so unpublished and
/// restricted categories are handled too. Each id is processed at most once.
pub fn cascade_children(
    service: &CategoryService,
    parent: &Category,
    delete_children: bool,
) -> AppResult<CascadeReport> {
    let mut report = CascadeReport::new();
    info!(
        target: "sitecatalog",
        event = "cascade_started",
        run_id = %report.run_id,
        category_id = parent.id,
        delete_children
    );

    let mut visited = HashSet::from([parent.id]);
    let mut stack: Vec<Category> = service
        .get_all_categories_by_parent_id(parent.id, true)?
        .into_iter()
        .rev()
        .collect();

    while let Some(mut child) = stack.pop() {
        if !visited.insert(child.id) {
            warn!(
                target: "sitecatalog",
                event = "cascade_cycle_skipped",
                run_id = %report.run_id,
                category_id = child.id
            );
            report.skipped.push(child.id);
            continue;
        }

        let grandchildren = service.get_all_categories_by_parent_id(child.id, true)?;
        let id = child.id;
        if delete_children {
            child.deleted = true;
            service.update_category(child)?;
            report.deleted.push(id);
        } else {
            child.parent_category_id = ROOT_CATEGORY_ID;
            service.update_category(child)?;
            report.reparented.push(id);
        }
        stack.extend(grandchildren.into_iter().rev());
    }

    info!(
        target: "sitecatalog",
        event = "cascade_finished",
        run_id = %report.run_id,
        category_id = parent.id,
        deleted = report.deleted.len(),
        reparented = report.reparented.len(),
        skipped = report.skipped.len()
    );
    Ok(report)
}
