use std::sync::Mutex;

use crate::model::{Category, ProductCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// A catalog record whose persisted state just changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRecord {
    Category(Category),
    ProductCategory(ProductCategory),
}

impl CatalogRecord {
    pub fn entity_name(&self) -> &'static str {
        match self {
            CatalogRecord::Category(_) => "Category",
            CatalogRecord::ProductCategory(_) => "ProductCategory",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            CatalogRecord::Category(category) => category.id,
            CatalogRecord::ProductCategory(mapping) => mapping.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityChange {
    pub kind: ChangeKind,
    pub record: CatalogRecord,
}

/// Fire-and-forget change publication.
pub trait ChangeNotifier: Send + Sync {
    fn publish(&self, change: EntityChange);

    fn entity_inserted(&self, record: CatalogRecord) {
        self.publish(EntityChange {
            kind: ChangeKind::Inserted,
            record,
        });
    }

    fn entity_updated(&self, record: CatalogRecord) {
        self.publish(EntityChange {
            kind: ChangeKind::Updated,
            record,
        });
    }

    fn entity_deleted(&self, record: CatalogRecord) {
        self.publish(EntityChange {
            kind: ChangeKind::Deleted,
            record,
        });
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn publish(&self, _change: EntityChange) {}
}

/// Keeps every published change in order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    changes: Mutex<Vec<EntityChange>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<EntityChange> {
        self.changes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn take(&self) -> Vec<EntityChange> {
        std::mem::take(&mut *self.changes.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn publish(&self, change: EntityChange) {
        self.changes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.entity_inserted(CatalogRecord::Category(Category::new(1, 0, "A")));
        notifier.entity_deleted(CatalogRecord::ProductCategory(ProductCategory::new(
            4, 1, 1, 0,
        )));

        let changes = notifier.take();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind, ChangeKind::Inserted);
        assert_eq!(changes[0].record.entity_name(), "Category");
        assert_eq!(changes[1].kind, ChangeKind::Deleted);
        assert_eq!(changes[1].record.id(), 4);
        assert!(notifier.changes().is_empty());
    }
}
