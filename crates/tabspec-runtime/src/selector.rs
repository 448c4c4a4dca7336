//! Foreign-key selector controller
//!
//! # States
//!
//! ```text
//! Closed --open--> Loading --page--> Open --select--> Committing --> Closed
//!                     ^                |
//!                     +--search/more---+        cancel: Loading|Open -> Closed
//! ```
//!
//! Every request carries a generation number. A response whose generation is
//! no longer current (a newer search, a cancel or a commit happened while it
//! was in flight) is discarded, so the last request always wins.
//!
//! `select` writes the value, its `$_identifier` label, every out field and
//! the dirty marks of all dependent fields as one [`WriteBatch`]: either the
//! whole selection lands in the store or nothing does.

use crate::context::EngineContext;
use crate::error::{SelectorCommitError, SelectorError};
use crate::query::{param_value, SelectorQuery};
use crate::store::{FieldValueStore, WriteBatch};
use crate::transport::Row;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tabspec_expr::EvalScope;
use tabspec_graph::{out_target, FieldDependencyGraph};
use tabspec_model::{identifier_of, DiagnosticKind, FieldSpec, SelectorDefinition, TabSpec};

/// Selector lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorState {
    /// No live instance
    Closed,
    /// Page request in flight
    Loading,
    /// Rows available for selection
    Open,
    /// Selection being written
    Committing,
}

impl fmt::Display for SelectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Loading => "loading",
            Self::Open => "open",
            Self::Committing => "committing",
        })
    }
}

/// What happened to a page response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Rows applied
    Applied {
        /// Rows now listed
        rows: usize,
        /// More pages available
        has_more: bool,
    },
    /// A newer request superseded this one
    Discarded,
}

/// Result of a committed selection
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCommit {
    /// Committed value
    pub value: Value,
    /// Store keys written, in order
    pub written: Vec<String>,
    /// Dependent fields marked dirty
    pub marked_dirty: Vec<String>,
}

#[derive(Debug)]
struct LiveSelector {
    definition: SelectorDefinition,
    search: String,
    rows: Vec<Row>,
    seen: HashSet<String>,
    has_more: bool,
    next_start: usize,
}

impl LiveSelector {
    fn new(definition: SelectorDefinition) -> Self {
        Self {
            definition,
            search: String::new(),
            rows: Vec::new(),
            seen: HashSet::new(),
            has_more: false,
            next_start: 0,
        }
    }

    fn reset_rows(&mut self) {
        self.rows.clear();
        self.seen.clear();
        self.next_start = 0;
        self.has_more = false;
    }

    fn append(&mut self, rows: &[Row]) {
        for row in rows {
            if self.seen.insert(row_key(row)) {
                self.rows.push(row.clone());
            }
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: SelectorState,
    live: Option<LiveSelector>,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageMode {
    Replace,
    Append,
}

/// Popup/drop-down selector of one foreign-key field
#[derive(Debug)]
pub struct SelectorController {
    ctx: Arc<EngineContext>,
    tab: Arc<TabSpec>,
    field: String,
    inner: Mutex<Inner>,
}

impl SelectorController {
    /// Controller for a field with a selector or datasource
    ///
    /// # Errors
    /// [`SelectorError::NoSelector`] when the field has neither
    pub fn new(
        ctx: Arc<EngineContext>,
        tab: Arc<TabSpec>,
        field: &str,
    ) -> Result<Self, SelectorError> {
        let spec = tab
            .field(field)
            .filter(|f| f.selector.is_some() || f.data_source.is_some())
            .ok_or_else(|| SelectorError::NoSelector(field.to_string()))?;
        let field = spec.name.clone();
        Ok(Self {
            ctx,
            tab,
            field,
            inner: Mutex::new(Inner {
                state: SelectorState::Closed,
                live: None,
                generation: 0,
            }),
        })
    }

    fn spec(&self) -> Result<&FieldSpec, SelectorError> {
        self.tab
            .field(&self.field)
            .ok_or_else(|| SelectorError::NoSelector(self.field.clone()))
    }

    /// Field this selector writes
    #[inline]
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SelectorState {
        self.inner.lock().state
    }

    /// Listed rows (empty when closed)
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        self.inner
            .lock()
            .live
            .as_ref()
            .map(|live| live.rows.clone())
            .unwrap_or_default()
    }

    /// Check if another page may exist
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.inner.lock().live.as_ref().is_some_and(|live| live.has_more)
    }

    /// Current search text
    #[must_use]
    pub fn search_text(&self) -> Option<String> {
        self.inner.lock().live.as_ref().map(|live| live.search.clone())
    }

    /// Definition of the live instance
    #[must_use]
    pub fn definition(&self) -> Option<SelectorDefinition> {
        self.inner.lock().live.as_ref().map(|live| live.definition.clone())
    }

    /// Open the selector and load the first page
    ///
    /// # Errors
    /// Not closed, or the first page failed (the selector stays open, empty)
    pub async fn open(&self, scope: &EvalScope<'_>) -> Result<PageOutcome, SelectorError> {
        let spec = self.spec()?;
        let query = SelectorQuery::default();
        let request = self
            .ctx
            .query_builder()
            .build_selector(spec, scope, &query)?;

        let generation = {
            let mut inner = self.inner.lock();
            if inner.state != SelectorState::Closed {
                return Err(SelectorError::InvalidState {
                    state: inner.state,
                    operation: "open",
                });
            }
            inner.live = Some(LiveSelector::new(spec.selector.clone().unwrap_or_default()));
            inner.state = SelectorState::Loading;
            inner.generation += 1;
            inner.generation
        };
        tracing::debug!(field = %self.field, "selector opened");
        self.fetch_page(&request, &query, generation, PageMode::Replace)
            .await
    }

    /// Replace the rows with the first page of a new search
    ///
    /// # Errors
    /// Not open or loading, or the page failed (previous rows kept)
    pub async fn search(
        &self,
        text: &str,
        scope: &EvalScope<'_>,
    ) -> Result<PageOutcome, SelectorError> {
        let spec = self.spec()?;
        let query = SelectorQuery::search(text);
        let request = self
            .ctx
            .query_builder()
            .build_selector(spec, scope, &query)?;

        let generation = {
            let mut inner = self.inner.lock();
            let state = inner.state;
            match (state, inner.live.as_mut()) {
                (SelectorState::Open | SelectorState::Loading, Some(live)) => {
                    live.search = text.to_string();
                }
                _ => {
                    return Err(SelectorError::InvalidState {
                        state,
                        operation: "search",
                    })
                }
            }
            inner.state = SelectorState::Loading;
            inner.generation += 1;
            inner.generation
        };
        self.fetch_page(&request, &query, generation, PageMode::Replace)
            .await
    }

    /// Append the next page of the current search
    ///
    /// # Errors
    /// Not open, or the page failed (previous rows kept)
    pub async fn load_more(&self, scope: &EvalScope<'_>) -> Result<PageOutcome, SelectorError> {
        let spec = self.spec()?;
        let query = {
            let inner = self.inner.lock();
            match (inner.state, inner.live.as_ref()) {
                (SelectorState::Open, Some(live)) if !live.has_more => {
                    return Ok(PageOutcome::Applied {
                        rows: live.rows.len(),
                        has_more: false,
                    });
                }
                (SelectorState::Open, Some(live)) => {
                    SelectorQuery::search(live.search.clone()).from_row(live.next_start)
                }
                (state, _) => {
                    return Err(SelectorError::InvalidState {
                        state,
                        operation: "load more",
                    })
                }
            }
        };
        let request = self
            .ctx
            .query_builder()
            .build_selector(spec, scope, &query)?;

        let generation = {
            let mut inner = self.inner.lock();
            if inner.state != SelectorState::Open {
                return Err(SelectorError::InvalidState {
                    state: inner.state,
                    operation: "load more",
                });
            }
            inner.state = SelectorState::Loading;
            inner.generation += 1;
            inner.generation
        };
        self.fetch_page(&request, &query, generation, PageMode::Append)
            .await
    }

    async fn fetch_page(
        &self,
        request: &crate::query::QueryRequest,
        query: &SelectorQuery,
        generation: u64,
        mode: PageMode,
    ) -> Result<PageOutcome, SelectorError> {
        let result = self.ctx.client().fetch(request).await;
        let page_size = self.ctx.config().selector_page_size.max(1);

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            tracing::debug!(
                field = %self.field,
                search = %query.search,
                "discarding superseded selector page"
            );
            return Ok(PageOutcome::Discarded);
        }
        inner.state = SelectorState::Open;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                self.ctx.diagnostics().report(
                    DiagnosticKind::DataSourceFetch,
                    format!("{}.{}", self.tab.tab_id, self.field),
                    err.to_string(),
                );
                return Err(err.into());
            }
        };

        let Some(live) = inner.live.as_mut() else {
            return Ok(PageOutcome::Discarded);
        };
        if mode == PageMode::Replace {
            live.reset_rows();
        }
        live.append(&response.rows);
        live.has_more = response.len() >= page_size;
        live.next_start = query.start_row + response.len();
        tracing::debug!(
            field = %self.field,
            rows = live.rows.len(),
            has_more = live.has_more,
            "selector page applied"
        );
        Ok(PageOutcome::Applied {
            rows: live.rows.len(),
            has_more: live.has_more,
        })
    }

    /// Commit the row whose value field equals `row_id`
    ///
    /// On failure the store is unchanged and the selector stays open.
    ///
    /// # Errors
    /// Not open, unknown row, missing value, or a rejected value
    pub fn select(
        &self,
        row_id: &str,
        store: &mut FieldValueStore,
        graph: &FieldDependencyGraph,
    ) -> Result<SelectionCommit, SelectorError> {
        let spec = self.spec()?;
        let mut inner = self.inner.lock();
        let row = match (inner.state, inner.live.as_ref()) {
            (SelectorState::Open, Some(live)) => {
                let value_field = &live.definition.value_field;
                live.rows
                    .iter()
                    .find(|row| {
                        row.get(value_field).and_then(param_value).as_deref() == Some(row_id)
                    })
                    .cloned()
                    .map(|row| (row, live.definition.clone()))
            }
            (state, _) => {
                return Err(SelectorError::InvalidState {
                    state,
                    operation: "select",
                })
            }
        };
        let Some((row, definition)) = row else {
            return Err(SelectorCommitError::UnknownRow(row_id.to_string()).into());
        };
        inner.state = SelectorState::Committing;

        let outcome = self
            .selection_batch(spec, &row, &definition, graph)
            .and_then(|(value, batch, marked_dirty)| {
                let written = store.apply_batch(batch)?;
                Ok(SelectionCommit {
                    value,
                    written,
                    marked_dirty,
                })
            });

        match outcome {
            Ok(commit) => {
                inner.state = SelectorState::Closed;
                inner.live = None;
                inner.generation += 1;
                tracing::debug!(
                    field = %self.field,
                    written = commit.written.len(),
                    "selection committed"
                );
                Ok(commit)
            }
            Err(err) => {
                inner.state = SelectorState::Open;
                self.ctx.diagnostics().report(
                    DiagnosticKind::SelectorCommit,
                    format!("{}.{}", self.tab.tab_id, self.field),
                    err.to_string(),
                );
                Err(err.into())
            }
        }
    }

    fn selection_batch(
        &self,
        spec: &FieldSpec,
        row: &Row,
        definition: &SelectorDefinition,
        graph: &FieldDependencyGraph,
    ) -> Result<(Value, WriteBatch, Vec<String>), SelectorCommitError> {
        let registry = self.ctx.registry();
        let value = row
            .get(&definition.value_field)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| SelectorCommitError::MissingValue(definition.value_field.clone()))?;
        let label = row
            .get(&definition.display_field)
            .or_else(|| row.get("_identifier"))
            .cloned()
            .unwrap_or(Value::Null);

        let mut batch = WriteBatch::new();
        batch
            .set_checked(&spec.name, value.clone(), registry.resolve(&spec.reference_type))
            .set(spec.identifier_key(), label);

        for out in &spec.out_fields {
            let out_value = row.get(&out.field_name).cloned().unwrap_or(Value::Null);
            match out_target(&self.tab, spec, out).and_then(|name| self.tab.field(name)) {
                Some(target) => {
                    let reference = registry.resolve(&target.reference_type);
                    batch.set_checked(&target.name, out_value, reference);
                    if reference.kind().is_foreign_key() {
                        if let Some(label) = row.get(&identifier_of(&out.field_name)) {
                            batch.set(target.identifier_key(), label.clone());
                        }
                    }
                }
                None => {
                    batch.set(format!("{}{}", spec.out_prefix(), out.suffix), out_value);
                }
            }
        }

        let marked_dirty: Vec<String> = graph
            .affected_by(&spec.name)
            .into_iter()
            .map(str::to_string)
            .collect();
        for name in &marked_dirty {
            batch.mark_dirty(name.clone());
        }
        Ok((value, batch, marked_dirty))
    }

    /// Close without committing; in-flight pages are discarded
    ///
    /// # Errors
    /// While committing
    pub fn cancel(&self) -> Result<(), SelectorError> {
        let mut inner = self.inner.lock();
        match inner.state {
            SelectorState::Committing => Err(SelectorError::InvalidState {
                state: SelectorState::Committing,
                operation: "cancel",
            }),
            SelectorState::Closed => Ok(()),
            SelectorState::Loading | SelectorState::Open => {
                inner.state = SelectorState::Closed;
                inner.live = None;
                inner.generation += 1;
                tracing::debug!(field = %self.field, "selector cancelled");
                Ok(())
            }
        }
    }
}

fn row_key(row: &Row) -> String {
    row.get("id")
        .and_then(param_value)
        .unwrap_or_else(|| Value::Object(row.clone()).to_string())
}
