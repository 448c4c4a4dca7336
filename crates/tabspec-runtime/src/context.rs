//! Shared engine services
//!
//! Everything a tab instance needs besides its own store: configuration,
//! the expression cache, the diagnostics sink, callbacks and the datasource
//! client. One context is shared by all tabs of a window.

use crate::callbacks::CallbackRegistry;
use crate::config::EngineConfig;
use crate::query::DataSourceQueryBuilder;
use crate::transport::{DataSourceClient, DataSourceTransport};
use std::sync::Arc;
use tabspec_expr::ExpressionEvaluator;
use tabspec_model::{Diagnostics, ReferenceTypeRegistry};

/// Services shared across the tabs of a window
#[derive(Debug)]
pub struct EngineContext {
    config: EngineConfig,
    registry: &'static ReferenceTypeRegistry,
    evaluator: ExpressionEvaluator,
    diagnostics: Arc<Diagnostics>,
    callbacks: CallbackRegistry,
    client: DataSourceClient,
}

impl EngineContext {
    /// Context over the global reference registry
    #[must_use]
    pub fn new(config: EngineConfig, transport: Arc<dyn DataSourceTransport>) -> Self {
        let client = DataSourceClient::new(transport, &config);
        Self {
            config,
            registry: ReferenceTypeRegistry::global(),
            evaluator: ExpressionEvaluator::new(),
            diagnostics: Arc::new(Diagnostics::new()),
            callbacks: CallbackRegistry::new(),
            client,
        }
    }

    /// Share an existing diagnostics sink
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Use a prepared callback registry
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: CallbackRegistry) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reference type registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &'static ReferenceTypeRegistry {
        self.registry
    }

    /// Expression evaluator with its parse cache
    #[inline]
    #[must_use]
    pub fn evaluator(&self) -> &ExpressionEvaluator {
        &self.evaluator
    }

    /// Diagnostics sink
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Shared handle to the diagnostics sink
    #[inline]
    #[must_use]
    pub fn diagnostics_handle(&self) -> Arc<Diagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Field callbacks
    #[inline]
    #[must_use]
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Datasource client
    #[inline]
    #[must_use]
    pub fn client(&self) -> &DataSourceClient {
        &self.client
    }

    /// Query builder configured from this context
    #[inline]
    #[must_use]
    pub fn query_builder(&self) -> DataSourceQueryBuilder<'static> {
        DataSourceQueryBuilder::with_registry(self.registry, &self.config)
    }
}
