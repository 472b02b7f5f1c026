//! Orders a flat category list into tree order.
//!
//! Output is a depth-first pre-order walk: each category follows its parent,
//! each subtree is contiguous, and siblings run by (display order, id). The
//! input is never trusted to be acyclic; every descent tracks visited ids.

use std::collections::{HashMap, HashSet};

use crate::model::{Category, ROOT_CATEGORY_ID};
use crate::settings::OrphanPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiagnostics {
    /// Categories whose parent is not part of the set.
    pub orphans: Vec<i64>,
    /// Categories on a parent cycle or hanging beneath one.
    pub cyclic: Vec<i64>,
}

impl TreeDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty() && self.cyclic.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Root,
    Orphan,
    Cycle,
}

struct Forest {
    nodes: Vec<Category>,
    index: HashMap<i64, usize>,
    children: HashMap<i64, Vec<usize>>,
}

impl Forest {
    fn new(categories: Vec<Category>) -> Self {
        let mut seen = HashSet::new();
        let nodes: Vec<Category> = categories
            .into_iter()
            .filter(|category| seen.insert(category.id))
            .collect();
        let index = nodes
            .iter()
            .enumerate()
            .map(|(position, category)| (category.id, position))
            .collect();
        let mut children: HashMap<i64, Vec<usize>> = HashMap::new();
        for (position, category) in nodes.iter().enumerate() {
            children
                .entry(category.parent_category_id)
                .or_default()
                .push(position);
        }
        let mut forest = Self {
            nodes,
            index,
            children,
        };
        let keys: Vec<i64> = forest.children.keys().copied().collect();
        for key in keys {
            let mut siblings = forest.children.remove(&key).unwrap_or_default();
            forest.sort_by_display_order(&mut siblings);
            forest.children.insert(key, siblings);
        }
        forest
    }

    fn sort_by_display_order(&self, positions: &mut [usize]) {
        positions.sort_by_key(|&p| (self.nodes[p].display_order, self.nodes[p].id));
    }

    fn is_orphan(&self, position: usize) -> bool {
        let parent = self.nodes[position].parent_category_id;
        parent != ROOT_CATEGORY_ID && !self.index.contains_key(&parent)
    }

    /// Follows parent links until a root, an absent parent, or a revisit.
    fn anchor(&self, position: usize) -> Anchor {
        let mut visited = HashSet::new();
        let mut current = position;
        loop {
            if !visited.insert(current) {
                return Anchor::Cycle;
            }
            let parent = self.nodes[current].parent_category_id;
            if parent == ROOT_CATEGORY_ID {
                return Anchor::Root;
            }
            match self.index.get(&parent) {
                Some(&next) => current = next,
                None => return Anchor::Orphan,
            }
        }
    }

    /// Pre-order walk from `start`, skipping anything already emitted.
    fn descend(&self, start: usize, visited: &mut HashSet<usize>, out: &mut Vec<usize>) {
        let mut stack = vec![start];
        while let Some(position) = stack.pop() {
            if !visited.insert(position) {
                continue;
            }
            out.push(position);
            if let Some(kids) = self.children.get(&self.nodes[position].id) {
                stack.extend(kids.iter().rev().copied());
            }
        }
    }

    fn into_categories(self, order: Vec<usize>) -> Vec<Category> {
        let mut slots: Vec<Option<Category>> = self.nodes.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|position| slots[position].take())
            .collect()
    }
}

/// Sorts `categories` into tree order. Duplicate ids keep their first occurrence.
pub fn sort_categories_for_tree(categories: Vec<Category>, policy: OrphanPolicy) -> Vec<Category> {
    let forest = Forest::new(categories);
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(forest.nodes.len());

    let roots = forest
        .children
        .get(&ROOT_CATEGORY_ID)
        .cloned()
        .unwrap_or_default();
    for root in roots {
        forest.descend(root, &mut visited, &mut order);
    }

    let mut orphans: Vec<usize> = (0..forest.nodes.len())
        .filter(|&p| forest.is_orphan(p))
        .collect();
    forest.sort_by_display_order(&mut orphans);
    if policy == OrphanPolicy::TreatAsRoot {
        for orphan in orphans {
            forest.descend(orphan, &mut visited, &mut order);
        }
    }

    let mut stranded: Vec<usize> = (0..forest.nodes.len())
        .filter(|p| !visited.contains(p) && forest.anchor(*p) == Anchor::Cycle)
        .collect();
    if !stranded.is_empty() {
        forest.sort_by_display_order(&mut stranded);
        let ids: Vec<i64> = stranded.iter().map(|&p| forest.nodes[p].id).collect();
        tracing::warn!(
            target: "sitecatalog",
            event = "tree_cycle_detected",
            category_ids = ?ids
        );
        for position in stranded {
            forest.descend(position, &mut visited, &mut order);
        }
    }

    forest.into_categories(order)
}

/// Reports orphaned and cyclic categories without reordering anything.
pub fn diagnose(categories: &[Category]) -> TreeDiagnostics {
    let forest = Forest::new(categories.to_vec());
    let mut report = TreeDiagnostics::default();
    for position in 0..forest.nodes.len() {
        let id = forest.nodes[position].id;
        if forest.is_orphan(position) {
            report.orphans.push(id);
        }
        if forest.anchor(position) == Anchor::Cycle {
            report.cyclic.push(id);
        }
    }
    report.orphans.sort_unstable();
    report.cyclic.sort_unstable();
    report
}

/// Pairs tree-ordered categories with their depth below the nearest emitted ancestor.
pub fn with_depth(sorted: &[Category]) -> Vec<(usize, &Category)> {
    let mut depths: HashMap<i64, usize> = HashMap::new();
    sorted
        .iter()
        .map(|category| {
            let depth = depths
                .get(&category.parent_category_id)
                .map_or(0, |parent| parent + 1);
            depths.insert(category.id, depth);
            (depth, category)
        })
        .collect()
}
