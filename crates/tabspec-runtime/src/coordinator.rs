//! Master-detail coordination
//!
//! Child grids follow the active record of their parent:
//! - selecting or saving a parent record clears the whole subtree below it
//! - children load only for the parent's active record, siblings concurrently
//! - of several reloads of one tab, only the most recent one is applied
//! - a failed load keeps the previous rows and leaves a retryable notice

use crate::context::EngineContext;
use crate::error::CoordinatorError;
use crate::session::SessionAttributes;
use crate::transport::Row;
use crate::tree::{LoadNotice, TabNode, TabTree};
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use tabspec_expr::FieldValues;
use tabspec_model::DiagnosticKind;

/// What a grid load did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Rows replaced
    Loaded {
        /// Rows now in the grid
        rows: usize,
    },
    /// A newer load or a clear superseded this one
    Superseded,
}

/// Result of one child load, tagged with the child's tab id
pub type ChildLoad = (String, Result<LoadOutcome, CoordinatorError>);

/// Keeps child grids in step with their parents' active records
#[derive(Debug)]
pub struct MasterDetailCoordinator {
    ctx: Arc<EngineContext>,
    tree: Arc<TabTree>,
    session: RwLock<SessionAttributes>,
}

impl MasterDetailCoordinator {
    /// Coordinator over a built tree
    #[must_use]
    pub fn new(ctx: Arc<EngineContext>, tree: Arc<TabTree>) -> Self {
        Self {
            ctx,
            tree,
            session: RwLock::new(SessionAttributes::new()),
        }
    }

    /// Tab tree
    #[inline]
    #[must_use]
    pub fn tree(&self) -> &Arc<TabTree> {
        &self.tree
    }

    /// Snapshot of the session attributes
    #[must_use]
    pub fn session(&self) -> FieldValues {
        self.session.read().values().clone()
    }

    /// Set a session attribute by hand
    pub fn set_session_attribute(&self, name: impl Into<String>, value: serde_json::Value) {
        self.session.write().set(name, value);
    }

    fn node(&self, tab_id: &str) -> Result<&Arc<TabNode>, CoordinatorError> {
        self.tree
            .node(tab_id)
            .ok_or_else(|| CoordinatorError::UnknownTab(tab_id.to_string()))
    }

    /// Load the root grid
    ///
    /// # Errors
    /// Query or fetch failure
    pub async fn load_root(&self) -> Result<LoadOutcome, CoordinatorError> {
        let root = Arc::clone(self.tree.root());
        self.load_tab(&root, None).await
    }

    /// Reload a tab for its current parent record
    ///
    /// # Errors
    /// Unknown tab, a child whose parent has no active record, or a fetch failure
    pub async fn reload(&self, tab_id: &str) -> Result<LoadOutcome, CoordinatorError> {
        let node = Arc::clone(self.node(tab_id)?);
        let parent_id = match node.parent() {
            None => None,
            Some(parent) => Some(parent.active_record_id().ok_or_else(|| {
                CoordinatorError::NoActiveParent {
                    tab: node.tab_id().to_string(),
                    parent: parent.tab_id().to_string(),
                }
            })?),
        };
        self.load_tab(&node, parent_id.as_deref()).await
    }

    /// Fetch one grid page and apply it if still current
    ///
    /// # Errors
    /// Query or fetch failure; on fetch failure the rows stay and a notice is left
    pub async fn load_tab(
        &self,
        node: &TabNode,
        parent_id: Option<&str>,
    ) -> Result<LoadOutcome, CoordinatorError> {
        let generation = node.begin_load();
        let request = {
            let session = self.session.read();
            self.ctx
                .query_builder()
                .build_grid(node.spec(), parent_id, session.values(), 0)?
        };

        tracing::debug!(tab = node.tab_id(), parent = ?parent_id, generation, "loading grid");
        match self.ctx.client().fetch_fresh(&request).await {
            Ok(response) => {
                if node.finish_load(generation, parent_id, response.rows.clone()) {
                    tracing::info!(tab = node.tab_id(), rows = response.len(), "grid loaded");
                    Ok(LoadOutcome::Loaded {
                        rows: response.len(),
                    })
                } else {
                    tracing::debug!(tab = node.tab_id(), generation, "grid load superseded");
                    Ok(LoadOutcome::Superseded)
                }
            }
            Err(err) => {
                let notice = LoadNotice {
                    message: err.to_string(),
                    retryable: err.is_retryable(),
                };
                if !node.fail_load(generation, notice) {
                    return Ok(LoadOutcome::Superseded);
                }
                self.ctx.diagnostics().report(
                    DiagnosticKind::DataSourceFetch,
                    node.tab_id(),
                    err.to_string(),
                );
                Err(err.into())
            }
        }
    }

    /// Load every child of a tab for its active record, concurrently
    ///
    /// # Errors
    /// Unknown tab, or `parent_id` is not the tab's active record
    pub async fn load_children(
        &self,
        tab_id: &str,
        parent_id: &str,
    ) -> Result<Vec<ChildLoad>, CoordinatorError> {
        let node = Arc::clone(self.node(tab_id)?);
        if node.active_record_id().as_deref() != Some(parent_id) {
            return Err(CoordinatorError::ParentNotSelected {
                tab: tab_id.to_string(),
                record: parent_id.to_string(),
            });
        }

        let loads = node.children().iter().map(|child| async move {
            let outcome = self.load_tab(child, Some(parent_id)).await;
            (child.tab_id().to_string(), outcome)
        });
        Ok(join_all(loads).await)
    }

    /// Make a loaded record active and refresh the subtree
    ///
    /// # Errors
    /// Unknown tab or record
    pub async fn select_record(
        &self,
        tab_id: &str,
        record_id: &str,
    ) -> Result<Vec<ChildLoad>, CoordinatorError> {
        let node = Arc::clone(self.node(tab_id)?);
        let Some(row) = node.set_active(record_id) else {
            return Err(CoordinatorError::UnknownRecord {
                tab: tab_id.to_string(),
                record: record_id.to_string(),
            });
        };
        tracing::debug!(tab = tab_id, record = record_id, "record selected");
        self.refresh_subtree(&node, record_id, &row).await
    }

    /// Store a saved record as active and refresh the subtree
    ///
    /// # Errors
    /// Unknown tab, or a row without key value
    pub async fn record_saved(
        &self,
        tab_id: &str,
        row: Row,
    ) -> Result<Vec<ChildLoad>, CoordinatorError> {
        let node = Arc::clone(self.node(tab_id)?);
        let Some(record_id) = node.upsert_active(row.clone()) else {
            return Err(CoordinatorError::UnknownRecord {
                tab: tab_id.to_string(),
                record: String::new(),
            });
        };
        self.ctx.client().invalidate_all();
        tracing::debug!(tab = tab_id, record = %record_id, "record saved");
        self.refresh_subtree(&node, &record_id, &row).await
    }

    async fn refresh_subtree(
        &self,
        node: &TabNode,
        record_id: &str,
        row: &Row,
    ) -> Result<Vec<ChildLoad>, CoordinatorError> {
        for descendant in node.descendants() {
            descendant.clear();
        }

        let mut record = FieldValues::new().with_field_aliases(&node.spec().fields);
        for (key, value) in row {
            record.insert(key.clone(), value.clone());
        }
        self.session.write().capture(node.spec(), &record);

        if !node.spec().has_child_tabs || node.children().is_empty() {
            return Ok(Vec::new());
        }
        self.load_children(node.tab_id(), record_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::DataSourceFetchError;
    use crate::query::QueryRequest;
    use crate::transport::DataSourceTransport;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tabspec_model::{DataSourceSpec, Diagnostics, FieldSpec, TabSpec, WindowSpec};

    struct Echo;

    #[async_trait]
    impl DataSourceTransport for Echo {
        async fn fetch(&self, request: &QueryRequest) -> Result<Value, DataSourceFetchError> {
            let tab = request.param("tabId").unwrap_or_default();
            Ok(json!({ "response": { "status": 0, "data": [
                { "id": format!("{tab}-1"), "organization": "ORG" },
                { "id": format!("{tab}-2"), "organization": "ORG" },
            ] } }))
        }
    }

    fn tab(id: &str, parent: Option<&str>, children: Vec<TabSpec>) -> TabSpec {
        TabSpec {
            tab_id: id.into(),
            entity: id.into(),
            title: None,
            parent_property: parent.map(str::to_string),
            fields: vec![FieldSpec::new("organization", "_id_19")],
            data_source: Some(DataSourceSpec::new(format!("/ws/datasource/{id}"))),
            grid_properties: Default::default(),
            standard_properties: Default::default(),
            session_attribute_names: vec!["#AD_Org_ID".into()],
            has_child_tabs: !children.is_empty(),
            sections: Vec::new(),
            toolbar_buttons: Vec::new(),
            children,
        }
    }

    fn coordinator() -> MasterDetailCoordinator {
        let mut root = tab("H", None, vec![tab("L", Some("order"), vec![]), tab("T", Some("order"), vec![])]);
        root.session_attribute_names = vec!["organization".into()];
        let spec = WindowSpec {
            window_id: None,
            processes: Vec::new(),
            root,
        };
        let ctx = Arc::new(EngineContext::new(EngineConfig::default(), Arc::new(Echo)));
        let tree = Arc::new(TabTree::build(&spec, ctx.evaluator(), &Diagnostics::new()));
        MasterDetailCoordinator::new(ctx, tree)
    }

    #[tokio::test]
    async fn selecting_a_parent_loads_every_child() {
        let coordinator = coordinator();
        assert_eq!(coordinator.load_root().await.unwrap(), LoadOutcome::Loaded { rows: 2 });

        let loads = coordinator.select_record("H", "H-2").await.unwrap();
        let tabs: Vec<&str> = loads.iter().map(|(tab, _)| tab.as_str()).collect();
        assert_eq!(tabs, vec!["L", "T"]);
        assert!(loads.iter().all(|(_, r)| r == &Ok(LoadOutcome::Loaded { rows: 2 })));

        let lines = coordinator.tree().node("L").unwrap();
        assert_eq!(lines.loaded_for(), Some(Some("H-2".to_string())));
        assert_eq!(coordinator.session().get("organization"), Some(&json!("ORG")));
    }

    #[tokio::test]
    async fn children_need_the_active_parent() {
        let coordinator = coordinator();
        coordinator.load_root().await.unwrap();
        assert!(matches!(
            coordinator.load_children("H", "H-1").await,
            Err(CoordinatorError::ParentNotSelected { .. })
        ));
        assert!(matches!(
            coordinator.select_record("H", "nope").await,
            Err(CoordinatorError::UnknownRecord { .. })
        ));
        assert_eq!(
            coordinator.reload("L").await,
            Err(CoordinatorError::NoActiveParent {
                tab: "L".into(),
                parent: "H".into(),
            })
        );
    }

    #[tokio::test]
    async fn reselecting_clears_the_subtree() {
        let coordinator = coordinator();
        coordinator.load_root().await.unwrap();
        coordinator.select_record("H", "H-1").await.unwrap();
        let lines = Arc::clone(coordinator.tree().node("L").unwrap());
        assert!(lines.set_active("L-1").is_some());

        coordinator.select_record("H", "H-2").await.unwrap();
        assert!(lines.active_record_id().is_none());
        assert_eq!(lines.loaded_for(), Some(Some("H-2".to_string())));
    }
}
