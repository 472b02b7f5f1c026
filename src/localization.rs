use std::collections::HashMap;

use crate::model::Category;

/// Looks up a category name in a specific language.
pub trait NameLocalizer: Send + Sync {
    fn localized_name(&self, category: &Category, language_id: i64) -> Option<String>;
}

/// Falls back to each category's default name.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNames;

impl NameLocalizer for DefaultNames {
    fn localized_name(&self, _category: &Category, _language_id: i64) -> Option<String> {
        None
    }
}

/// Fixed table of translated names keyed by (category id, language id).
#[derive(Debug, Default, Clone)]
pub struct NameTable {
    names: HashMap<(i64, i64), String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, category_id: i64, language_id: i64, name: impl Into<String>) -> Self {
        self.names.insert((category_id, language_id), name.into());
        self
    }
}

impl NameLocalizer for NameTable {
    fn localized_name(&self, category: &Category, language_id: i64) -> Option<String> {
        self.names.get(&(category.id, language_id)).cloned()
    }
}

/// Localized name when one exists and is not blank, otherwise the default name.
pub fn display_name(
    localizer: &dyn NameLocalizer,
    category: &Category,
    language_id: Option<i64>,
) -> String {
    language_id
        .and_then(|language| localizer.localized_name(category, language))
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| category.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_name() {
        let category = Category::new(1, 0, "Phones");
        let table = NameTable::new().with_name(1, 2, "Telefone").with_name(1, 3, " ");
        assert_eq!(display_name(&table, &category, Some(2)), "Telefone");
        assert_eq!(display_name(&table, &category, Some(3)), "Phones");
        assert_eq!(display_name(&table, &category, None), "Phones");
        assert_eq!(display_name(&DefaultNames, &category, Some(2)), "Phones");
    }
}
