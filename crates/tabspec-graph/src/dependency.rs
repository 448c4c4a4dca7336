//! Field dependency graph
//!
//! Nodes are the fields of one tab; an edge `a -> b` means a change of `a`
//! may change `b`. Edges come from three places:
//! - `outFields`: the selector field feeds its out targets
//! - logic: fields referenced by a display / read-only expression feed the
//!   field the expression belongs to
//! - `inFields`: fields feeding a datasource query feed the field owning it
//!
//! Cycles are broken at build time. Within a strongly connected component
//! the edge with the lowest declared sort goes first (the sort of the field
//! declaring the edge, ties by source then target name); each removal is
//! recorded and reported. After a break the graph is acyclic but cascades
//! through the removed edge are not revisited.

use petgraph::algo::{is_cyclic_directed, tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tabspec_expr::ExpressionEvaluator;
use tabspec_model::{DiagnosticKind, Diagnostics, FieldRole, FieldSpec, TabSpec};

/// Why one field depends on another
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    /// Value copied by a selector commit
    OutField,
    /// Display or read-only expression input
    Logic,
    /// Datasource query parameter
    InField,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OutField => "outField",
            Self::Logic => "logic",
            Self::InField => "inField",
        })
    }
}

/// Edge payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Origin of the dependency
    pub kind: EdgeKind,
    /// Field whose metadata declares the edge
    pub declared_by: String,
    /// Declared sort of that field
    pub sort: Option<i64>,
}

impl DependencyEdge {
    fn break_key(&self) -> i64 {
        self.sort.unwrap_or(i64::MAX)
    }
}

/// Edge removed to break a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenEdge {
    /// Source field
    pub source: String,
    /// Target field
    pub target: String,
    /// Removed edge
    pub edge: DependencyEdge,
    /// Fields of the cycle, sorted by name
    pub cycle: Vec<String>,
}

/// Static dependency graph of one tab
#[derive(Debug, Clone)]
pub struct FieldDependencyGraph {
    tab_id: String,
    names: Vec<String>,
    index: HashMap<String, usize>,
    graph: DiGraphMap<usize, DependencyEdge>,
    order: Vec<usize>,
    broken: Vec<BrokenEdge>,
}

impl FieldDependencyGraph {
    /// Build the graph of a tab, breaking any cycles
    pub fn build(
        tab: &TabSpec,
        evaluator: &ExpressionEvaluator,
        diagnostics: &Diagnostics,
    ) -> Self {
        let mut this = Self {
            tab_id: tab.tab_id.clone(),
            names: Vec::new(),
            index: HashMap::new(),
            graph: DiGraphMap::new(),
            order: Vec::new(),
            broken: Vec::new(),
        };

        for field in tab.fields.iter().filter(|f| !f.role.is_logic()) {
            this.node(&field.name);
        }

        for field in &tab.fields {
            this.add_field_edges(tab, field, evaluator);
        }

        this.break_cycles(diagnostics);
        tracing::debug!(
            tab = %this.tab_id,
            nodes = this.graph.node_count(),
            edges = this.graph.edge_count(),
            broken = this.broken.len(),
            "built field dependency graph"
        );
        this
    }

    fn node(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        self.graph.add_node(idx);
        idx
    }

    fn connect(&mut self, source: &str, target: &str, edge: DependencyEdge) {
        let (a, b) = (self.node(source), self.node(target));
        if !self.graph.contains_edge(a, b) {
            self.graph.add_edge(a, b, edge);
        }
    }

    fn add_field_edges(
        &mut self,
        tab: &TabSpec,
        field: &FieldSpec,
        evaluator: &ExpressionEvaluator,
    ) {
        let references: Vec<String> = [
            field.display_logic.as_deref(),
            field.read_only_logic.as_deref(),
        ]
        .into_iter()
        .flatten()
        .flat_map(|e| evaluator.references(e))
        .collect();

        match &field.role {
            FieldRole::Logic { target, .. } => {
                let Some(target) = tab
                    .field_by_alias(target)
                    .filter(|f| !f.role.is_logic())
                else {
                    return;
                };
                for reference in &references {
                    if let Some(source) = resolve_reference(tab, reference) {
                        self.connect(
                            source,
                            &target.name,
                            DependencyEdge {
                                kind: EdgeKind::Logic,
                                declared_by: field.name.clone(),
                                sort: target.sort,
                            },
                        );
                    }
                }
            }
            FieldRole::Editable | FieldRole::ProjectionOnly => {
                let declared = |kind| DependencyEdge {
                    kind,
                    declared_by: field.name.clone(),
                    sort: field.sort,
                };

                for out in &field.out_fields {
                    if let Some(target) = out_target(tab, field, out) {
                        self.connect(&field.name, target, declared(EdgeKind::OutField));
                    }
                }

                for reference in &references {
                    if let Some(source) = resolve_reference(tab, reference) {
                        self.connect(source, &field.name, declared(EdgeKind::Logic));
                    }
                }

                for input in &field.in_fields {
                    if let Some(source) = resolve_reference(tab, &input.column_name) {
                        self.connect(source, &field.name, declared(EdgeKind::InField));
                    }
                }
            }
        }
    }

    fn break_cycles(&mut self, diagnostics: &Diagnostics) {
        loop {
            match toposort(&self.graph, None) {
                Ok(_) => {
                    self.order = self.stable_order();
                    return;
                }
                Err(cycle) => {
                    let start = cycle.node_id();
                    let Some(component) = tarjan_scc(&self.graph)
                        .into_iter()
                        .find(|scc| scc.contains(&start))
                    else {
                        return;
                    };
                    let members: HashSet<usize> = component.iter().copied().collect();

                    let victim = self
                        .graph
                        .all_edges()
                        .filter(|(a, b, _)| members.contains(a) && members.contains(b))
                        .min_by(|(a1, b1, e1), (a2, b2, e2)| {
                            e1.break_key()
                                .cmp(&e2.break_key())
                                .then_with(|| self.names[*a1].cmp(&self.names[*a2]))
                                .then_with(|| self.names[*b1].cmp(&self.names[*b2]))
                        })
                        .map(|(a, b, e)| (a, b, e.clone()));
                    let Some((a, b, edge)) = victim else {
                        return;
                    };

                    self.graph.remove_edge(a, b);
                    let mut cycle: Vec<String> =
                        component.iter().map(|&n| self.names[n].clone()).collect();
                    cycle.sort();
                    diagnostics.report(
                        DiagnosticKind::DependencyCycle,
                        format!("{}.{}", self.tab_id, self.names[a]),
                        format!(
                            "cycle through [{}] broken at {} -> {} ({})",
                            cycle.join(", "),
                            self.names[a],
                            self.names[b],
                            edge.kind
                        ),
                    );
                    self.broken.push(BrokenEdge {
                        source: self.names[a].clone(),
                        target: self.names[b].clone(),
                        edge,
                        cycle,
                    });
                }
            }
        }
    }

    /// Kahn's algorithm, ready nodes taken by name
    fn stable_order(&self) -> Vec<usize> {
        let mut indegree: HashMap<usize, usize> = self
            .graph
            .nodes()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();
        let mut ready: BTreeSet<(&str, usize)> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| (self.names[n].as_str(), n))
            .collect();
        let mut order = Vec::with_capacity(self.names.len());
        while let Some((_, node)) = ready.pop_first() {
            order.push(node);
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(d) = indegree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert((self.names[next].as_str(), next));
                    }
                }
            }
        }
        order
    }

    /// Tab this graph belongs to
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    /// Fields transitively affected by a change of `field`, in topological order
    ///
    /// The changed field itself is not included. Unknown names affect nothing.
    #[must_use]
    pub fn affected_by(&self, field: &str) -> Vec<&str> {
        let Some(&start) = self.index.get(field) else {
            return Vec::new();
        };
        let mut reachable = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(node) = dfs.next(&self.graph) {
            if node != start {
                reachable.insert(node);
            }
        }
        self.order
            .iter()
            .filter(|n| reachable.contains(n))
            .map(|&n| self.names[n].as_str())
            .collect()
    }

    /// All fields in topological order
    #[must_use]
    pub fn topological_order(&self) -> Vec<&str> {
        self.order.iter().map(|&n| self.names[n].as_str()).collect()
    }

    /// Fields directly fed by `field`, with the edge kind
    #[must_use]
    pub fn direct_dependents(&self, field: &str) -> Vec<(&str, EdgeKind)> {
        self.neighbors(field, Direction::Outgoing)
    }

    /// Fields directly feeding `field`, with the edge kind
    #[must_use]
    pub fn dependencies(&self, field: &str) -> Vec<(&str, EdgeKind)> {
        self.neighbors(field, Direction::Incoming)
    }

    fn neighbors(&self, field: &str, direction: Direction) -> Vec<(&str, EdgeKind)> {
        let Some(&node) = self.index.get(field) else {
            return Vec::new();
        };
        let mut out: Vec<(&str, EdgeKind)> = self
            .graph
            .neighbors_directed(node, direction)
            .filter_map(|other| {
                let edge = match direction {
                    Direction::Outgoing => self.graph.edge_weight(node, other),
                    Direction::Incoming => self.graph.edge_weight(other, node),
                }?;
                Some((self.names[other].as_str(), edge.kind))
            })
            .collect();
        out.sort_unstable();
        out
    }

    /// Edges removed while breaking cycles
    #[inline]
    #[must_use]
    pub fn broken_edges(&self) -> &[BrokenEdge] {
        &self.broken
    }

    /// Remaining edges as `(source, target, edge)`
    #[must_use]
    pub fn edges(&self) -> Vec<(&str, &str, &DependencyEdge)> {
        self.graph
            .all_edges()
            .map(|(a, b, e)| (self.names[a].as_str(), self.names[b].as_str(), e))
            .collect()
    }

    /// Check if the field is a node
    #[inline]
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    /// Number of fields
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of remaining edges
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check acyclicity (always true after build)
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }
}

/// Field receiving an out value: explicit `targetField`, else the field whose alias is `<prefix><suffix>`
pub fn out_target<'t>(
    tab: &'t TabSpec,
    source: &FieldSpec,
    out: &tabspec_model::OutField,
) -> Option<&'t str> {
    if let Some(target) = &out.target_field {
        return tab
            .field_by_alias(target)
            .filter(|f| !f.role.is_logic())
            .map(|f| f.name.as_str());
    }
    let hidden = format!("{}{}", source.out_prefix(), out.suffix);
    tab.fields
        .iter()
        .filter(|f| !f.role.is_logic())
        .find(|f| f.aliases().any(|a| a.eq_ignore_ascii_case(&hidden)))
        .map(|f| f.name.as_str())
}

/// Field a reference names: by alias, or the selector field owning a hidden out key
pub fn resolve_reference<'t>(tab: &'t TabSpec, reference: &str) -> Option<&'t str> {
    if let Some(field) = tab
        .field_by_alias(reference)
        .filter(|f| !f.role.is_logic())
    {
        return Some(field.name.as_str());
    }
    tab.fields
        .iter()
        .filter(|f| !f.role.is_logic())
        .find(|f| {
            f.out_fields.iter().any(|o| {
                format!("{}{}", f.out_prefix(), o.suffix).eq_ignore_ascii_case(reference)
            })
        })
        .map(|f| f.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use tabspec_model::{InField, OutField};

    fn tab(fields: Vec<FieldSpec>) -> TabSpec {
        TabSpec {
            tab_id: "t".into(),
            entity: "E".into(),
            title: None,
            parent_property: None,
            fields,
            data_source: None,
            grid_properties: IndexMap::new(),
            standard_properties: IndexMap::new(),
            session_attribute_names: Vec::new(),
            has_child_tabs: false,
            sections: Vec::new(),
            toolbar_buttons: Vec::new(),
            children: Vec::new(),
        }
    }

    fn field(name: &str, sort: Option<i64>) -> FieldSpec {
        let mut f = FieldSpec::new(name, "_id_10");
        f.sort = sort;
        f
    }

    fn fed_by(mut f: FieldSpec, source: &str) -> FieldSpec {
        f.in_fields.push(InField {
            column_name: source.into(),
            parameter_name: source.into(),
        });
        f
    }

    #[test]
    fn affected_by_follows_topological_order() {
        let a = field("a", Some(1));
        let b = fed_by(field("b", Some(2)), "a");
        let mut c = field("c", Some(3));
        c.display_logic = Some("@b@='Y' & @a@!''".into());
        let t = tab(vec![c, b, a]);

        let diags = Diagnostics::new();
        let graph = FieldDependencyGraph::build(&t, &ExpressionEvaluator::new(), &diags);
        assert_eq!(graph.affected_by("a"), vec!["b", "c"]);
        assert_eq!(graph.affected_by("c"), Vec::<&str>::new());
        assert_eq!(
            graph.direct_dependents("a"),
            vec![("b", EdgeKind::InField), ("c", EdgeKind::Logic)]
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn cycle_broken_at_lowest_sort() {
        let a = fed_by(field("a", Some(5)), "b");
        let b = fed_by(field("b", Some(1)), "a");
        let t = tab(vec![a, b]);

        let diags = Diagnostics::new();
        let graph = FieldDependencyGraph::build(&t, &ExpressionEvaluator::new(), &diags);
        assert!(graph.is_acyclic());
        let broken = graph.broken_edges();
        assert_eq!(broken.len(), 1);
        assert_eq!((broken[0].source.as_str(), broken[0].target.as_str()), ("a", "b"));
        assert_eq!(diags.count(DiagnosticKind::DependencyCycle), 1);
        assert_eq!(graph.affected_by("b"), vec!["a"]);
    }

    #[test]
    fn out_fields_resolve_by_target_or_hidden_key() {
        let mut product = field("product", Some(1));
        product.inp_column_name = Some("inpmProductId".into());
        product.out_fields = vec![
            OutField {
                field_name: "product$uOM".into(),
                suffix: "_UOM".into(),
                format_type: None,
                target_field: Some("uom".into()),
            },
            OutField {
                field_name: "priceLimit".into(),
                suffix: "_PLIM".into(),
                format_type: None,
                target_field: None,
            },
        ];
        let uom = field("uom", None);
        let mut limit = field("limit", None);
        limit.inp_column_name = Some("inpmProductId_PLIM".into());
        let t = tab(vec![product, uom, limit]);

        let diags = Diagnostics::new();
        let graph = FieldDependencyGraph::build(&t, &ExpressionEvaluator::new(), &diags);
        assert_eq!(graph.affected_by("product"), vec!["limit", "uom"]);
    }

    #[test]
    fn logic_field_edges_land_on_target() {
        let mut terms = field("paymentTerms", None);
        terms.column_name = Some("C_PaymentTerm_ID".into());
        let trx = field("isSOTrx", None);
        let mut logic = field("C_PaymentTerm_ID_display_logic", None);
        logic.role = FieldRole::Logic {
            target: "C_PaymentTerm_ID".into(),
            kind: tabspec_model::LogicKind::Display,
        };
        logic.display_logic = Some("@isSOTrx@='Y'".into());
        let t = tab(vec![terms, trx, logic]);

        let diags = Diagnostics::new();
        let graph = FieldDependencyGraph::build(&t, &ExpressionEvaluator::new(), &diags);
        assert_eq!(graph.affected_by("isSOTrx"), vec!["paymentTerms"]);
        assert!(!graph.contains("C_PaymentTerm_ID_display_logic"));
    }
}
