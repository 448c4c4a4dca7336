//! Window engine facade
//!
//! Loads a window document once and hands out the pieces a UI shell needs:
//! the tab tree with its coordinator, per-tab forms bound to the active
//! records, and a process dispatcher.

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::coordinator::MasterDetailCoordinator;
use crate::error::{CoordinatorError, RuntimeResult};
use crate::form::TabForm;
use crate::process::{ProcessDispatcher, ProcessExecutor};
use crate::transport::DataSourceTransport;
use crate::tree::{TabNode, TabTree};
use serde_json::Value;
use std::sync::Arc;
use tabspec_graph::FieldDependencyGraph;
use tabspec_model::{Diagnostics, SpecNormalizer, WindowSpec};

/// One loaded window
#[derive(Debug)]
pub struct WindowEngine {
    spec: Arc<WindowSpec>,
    ctx: Arc<EngineContext>,
    coordinator: MasterDetailCoordinator,
}

impl WindowEngine {
    /// Parse and load a window document
    ///
    /// # Errors
    /// The document is not valid JSON or misses required structure
    pub fn load(
        raw: &str,
        config: EngineConfig,
        transport: Arc<dyn DataSourceTransport>,
    ) -> RuntimeResult<Self> {
        Self::load_with(raw, EngineContext::new(config, transport))
    }

    /// Load a window document into a prepared context
    ///
    /// # Errors
    /// The document is not valid JSON or misses required structure
    pub fn load_with(raw: &str, ctx: EngineContext) -> RuntimeResult<Self> {
        let spec = SpecNormalizer::new(ctx.registry(), ctx.diagnostics()).normalize_str(raw)?;
        Ok(Self::from_spec(spec, ctx))
    }

    /// Load an already parsed window document
    ///
    /// # Errors
    /// The document misses required structure
    pub fn load_value(raw: &Value, ctx: EngineContext) -> RuntimeResult<Self> {
        let spec = SpecNormalizer::new(ctx.registry(), ctx.diagnostics()).normalize(raw)?;
        Ok(Self::from_spec(spec, ctx))
    }

    /// Engine over a normalized specification
    #[must_use]
    pub fn from_spec(spec: WindowSpec, ctx: EngineContext) -> Self {
        let ctx = Arc::new(ctx);
        let tree = Arc::new(TabTree::build(&spec, ctx.evaluator(), ctx.diagnostics()));
        tracing::info!(
            window = ?spec.window_id,
            tabs = tree.len(),
            diagnostics = ctx.diagnostics().len(),
            "window loaded"
        );
        Self {
            coordinator: MasterDetailCoordinator::new(Arc::clone(&ctx), tree),
            spec: Arc::new(spec),
            ctx,
        }
    }

    /// Normalized specification
    #[inline]
    #[must_use]
    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Shared services
    #[inline]
    #[must_use]
    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Diagnostics collected so far
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        self.ctx.diagnostics()
    }

    /// Tab tree
    #[inline]
    #[must_use]
    pub fn tree(&self) -> &Arc<TabTree> {
        self.coordinator.tree()
    }

    /// Master-detail coordinator
    #[inline]
    #[must_use]
    pub fn coordinator(&self) -> &MasterDetailCoordinator {
        &self.coordinator
    }

    fn node(&self, tab_id: &str) -> Result<&Arc<TabNode>, CoordinatorError> {
        self.tree()
            .node(tab_id)
            .ok_or_else(|| CoordinatorError::UnknownTab(tab_id.to_string()))
    }

    /// Dependency graph of a tab
    ///
    /// # Errors
    /// Unknown tab
    pub fn graph(&self, tab_id: &str) -> RuntimeResult<Arc<FieldDependencyGraph>> {
        Ok(Arc::clone(self.node(tab_id)?.graph()))
    }

    /// Form for a tab, bound to its active record, parent record and session
    ///
    /// # Errors
    /// Unknown tab
    pub fn form(&self, tab_id: &str) -> RuntimeResult<TabForm> {
        let node = self.node(tab_id)?;
        let mut form = TabForm::new(
            Arc::clone(&self.ctx),
            Arc::clone(node.spec()),
            Arc::clone(node.graph()),
        );
        if let Some(parent) = node.parent() {
            form.set_parent(parent.active_values());
        }
        form.set_session(self.coordinator.session());
        form.load_record(
            node.active_record_id(),
            node.active_row().unwrap_or_default(),
        );
        Ok(form)
    }

    /// Process dispatcher for this window
    #[must_use]
    pub fn dispatcher(&self, executor: Arc<dyn ProcessExecutor>) -> ProcessDispatcher {
        ProcessDispatcher::new(
            Arc::clone(&self.ctx),
            executor,
            self.spec.window_id.clone(),
            self.spec.processes.clone(),
        )
    }
}
