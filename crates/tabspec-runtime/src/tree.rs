//! Tab tree
//!
//! Every tab of a window becomes a [`TabNode`] holding its grid rows and
//! active record. Children are owned by their parent; the link back up is a
//! [`Weak`] reference, so the tree drops as a whole.
//!
//! Each node carries a load generation. Starting a load or clearing the node
//! bumps it, and a response is applied only while its generation is current.

use crate::transport::Row;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tabspec_expr::{ExpressionEvaluator, FieldValues};
use tabspec_graph::FieldDependencyGraph;
use tabspec_model::{Diagnostics, TabSpec, WindowSpec};

/// Problem left by the last failed load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadNotice {
    /// Human readable reason
    pub message: String,
    /// Repeating the load may succeed
    pub retryable: bool,
}

#[derive(Debug, Default)]
struct GridState {
    rows: Vec<Row>,
    active: Option<String>,
    notice: Option<LoadNotice>,
    loaded_for: Option<Option<String>>,
}

/// One tab instance in the window
#[derive(Debug)]
pub struct TabNode {
    spec: Arc<TabSpec>,
    graph: Arc<FieldDependencyGraph>,
    parent: Weak<TabNode>,
    children: Vec<Arc<TabNode>>,
    grid: RwLock<GridState>,
    generation: AtomicU64,
}

impl TabNode {
    fn build(
        spec: &TabSpec,
        parent: Weak<TabNode>,
        evaluator: &ExpressionEvaluator,
        diagnostics: &Diagnostics,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let children = spec
                .children
                .iter()
                .map(|child| Self::build(child, this.clone(), evaluator, diagnostics))
                .collect();
            let mut own = spec.clone();
            own.children.clear();
            Self {
                graph: Arc::new(FieldDependencyGraph::build(&own, evaluator, diagnostics)),
                spec: Arc::new(own),
                parent,
                children,
                grid: RwLock::new(GridState::default()),
                generation: AtomicU64::new(0),
            }
        })
    }

    /// Tab metadata, without its children
    #[inline]
    #[must_use]
    pub fn spec(&self) -> &Arc<TabSpec> {
        &self.spec
    }

    /// Tab id
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> &str {
        &self.spec.tab_id
    }

    /// Dependency graph of the tab's fields
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &Arc<FieldDependencyGraph> {
        &self.graph
    }

    /// Parent tab, `None` on the root
    #[must_use]
    pub fn parent(&self) -> Option<Arc<TabNode>> {
        self.parent.upgrade()
    }

    /// Child tabs
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[Arc<TabNode>] {
        &self.children
    }

    /// Every tab below this one, depth-first
    #[must_use]
    pub fn descendants(&self) -> Vec<Arc<TabNode>> {
        let mut out = Vec::new();
        let mut stack: Vec<&Arc<TabNode>> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(Arc::clone(node));
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Grid rows
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        self.grid.read().rows.clone()
    }

    /// Number of grid rows
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.grid.read().rows.len()
    }

    /// Active record id
    #[must_use]
    pub fn active_record_id(&self) -> Option<String> {
        self.grid.read().active.clone()
    }

    /// Active record
    #[must_use]
    pub fn active_row(&self) -> Option<Row> {
        let grid = self.grid.read();
        let active = grid.active.as_deref()?;
        grid.rows
            .iter()
            .find(|row| self.row_id(row).as_deref() == Some(active))
            .cloned()
    }

    /// Active record as an evaluation layer
    #[must_use]
    pub fn active_values(&self) -> FieldValues {
        let mut values = FieldValues::new().with_field_aliases(&self.spec.fields);
        for (key, value) in self.active_row().unwrap_or_default() {
            values.insert(key, value);
        }
        values
    }

    /// Notice left by the last failed load
    #[must_use]
    pub fn notice(&self) -> Option<LoadNotice> {
        self.grid.read().notice.clone()
    }

    /// Parent record id the rows were loaded for (`Some(None)` on a loaded root)
    #[must_use]
    pub fn loaded_for(&self) -> Option<Option<String>> {
        self.grid.read().loaded_for.clone()
    }

    /// Key value of a row
    #[must_use]
    pub fn row_id(&self, row: &Row) -> Option<String> {
        row.get(self.spec.key_property())
            .and_then(crate::query::param_value)
    }

    /// Make a loaded row the active record
    #[must_use]
    pub fn set_active(&self, record_id: &str) -> Option<Row> {
        let mut grid = self.grid.write();
        let row = grid
            .rows
            .iter()
            .find(|row| self.row_id(row).as_deref() == Some(record_id))
            .cloned()?;
        grid.active = Some(record_id.to_string());
        Some(row)
    }

    /// Replace or append a row and make it active
    pub fn upsert_active(&self, row: Row) -> Option<String> {
        let id = self.row_id(&row)?;
        let mut grid = self.grid.write();
        match grid
            .rows
            .iter()
            .position(|r| self.row_id(r).as_deref() == Some(id.as_str()))
        {
            Some(idx) => grid.rows[idx] = row,
            None => grid.rows.push(row),
        }
        grid.active = Some(id.clone());
        Some(id)
    }

    /// Drop rows and active record, discarding in-flight loads
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.grid.write() = GridState::default();
    }

    pub(crate) fn begin_load(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Apply rows of a load; `false` when a newer load or a clear happened
    pub(crate) fn finish_load(
        &self,
        generation: u64,
        parent_id: Option<&str>,
        rows: Vec<Row>,
    ) -> bool {
        let mut grid = self.grid.write();
        if !self.is_current(generation) {
            return false;
        }
        let keep_active = grid
            .active
            .as_deref()
            .filter(|active| rows.iter().any(|r| self.row_id(r).as_deref() == Some(*active)))
            .map(str::to_string);
        grid.rows = rows;
        grid.active = keep_active;
        grid.notice = None;
        grid.loaded_for = Some(parent_id.map(str::to_string));
        true
    }

    /// Record a failed load, keeping the previous rows
    pub(crate) fn fail_load(&self, generation: u64, notice: LoadNotice) -> bool {
        let mut grid = self.grid.write();
        if !self.is_current(generation) {
            return false;
        }
        grid.notice = Some(notice);
        true
    }
}

/// All tabs of a window, indexed by id
#[derive(Debug)]
pub struct TabTree {
    root: Arc<TabNode>,
    index: HashMap<String, Arc<TabNode>>,
}

impl TabTree {
    /// Build nodes and dependency graphs for every tab
    #[must_use]
    pub fn build(
        spec: &WindowSpec,
        evaluator: &ExpressionEvaluator,
        diagnostics: &Diagnostics,
    ) -> Self {
        let root = TabNode::build(&spec.root, Weak::new(), evaluator, diagnostics);
        let index = std::iter::once(Arc::clone(&root))
            .chain(root.descendants())
            .map(|node| (node.tab_id().to_string(), node))
            .collect();
        Self { root, index }
    }

    /// Root tab
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Arc<TabNode> {
        &self.root
    }

    /// Tab by id
    #[must_use]
    pub fn node(&self, tab_id: &str) -> Option<&Arc<TabNode>> {
        self.index.get(tab_id)
    }

    /// Every tab, depth-first, root first
    #[must_use]
    pub fn nodes(&self) -> Vec<Arc<TabNode>> {
        std::iter::once(Arc::clone(&self.root))
            .chain(self.root.descendants())
            .collect()
    }

    /// Number of tabs
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if empty (never, a window has a root)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
