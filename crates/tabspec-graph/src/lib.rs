//! Tabspec Graph - field dependency analysis
//!
//! Builds, per tab, the static graph of which fields feed which:
//! selector out fields, logic expression inputs and datasource in fields.
//! The graph answers "what must be recomputed after this field changes"
//! in a stable topological order.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabspec_graph::FieldDependencyGraph;
//!
//! let graph = FieldDependencyGraph::build(tab, &evaluator, &diagnostics);
//! for field in graph.affected_by("product") {
//!     println!("recompute {field}");
//! }
//! ```

#![warn(unreachable_pub)]

pub mod dependency;

pub use dependency::{
    out_target, resolve_reference, BrokenEdge, DependencyEdge, EdgeKind, FieldDependencyGraph,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
