//! Tabspec Runtime - interactive window engine
//!
//! Drives a loaded window specification:
//! - [`DataSourceQueryBuilder`] turns datasource metadata and record values
//!   into requests, [`DataSourceClient`] fetches them with a timeout and cache
//! - [`SelectorController`] runs foreign-key selectors with atomic commits
//! - [`TabForm`] edits one record and cascades every write
//! - [`MasterDetailCoordinator`] keeps child grids on their parent's record
//! - [`ProcessDispatcher`] launches toolbar processes
//! - [`WindowEngine`] ties it together
//!
//! # Example
//!
//! ```rust,ignore
//! use tabspec_runtime::prelude::*;
//!
//! let engine = WindowEngine::load(raw, EngineConfig::default(), transport)?;
//! engine.coordinator().load_root().await?;
//! let mut form = engine.form("186")?;
//! form.set_value("warehouse", json!("W1"))?;
//! ```

#![warn(unreachable_pub)]

pub mod callbacks;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod form;
pub mod process;
pub mod query;
pub mod selector;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod tree;

pub use callbacks::{CallbackContext, CallbackRegistry, FieldCallback, OnChangeFn, ValidateFn};
pub use config::{CacheConfig, EngineConfig, LoggingConfig};
pub use context::EngineContext;
pub use coordinator::{ChildLoad, LoadOutcome, MasterDetailCoordinator};
pub use engine::WindowEngine;
pub use error::{
    ConfigError, CoordinatorError, DataSourceFetchError, DispatchError, FormError, QueryError,
    RuntimeError, RuntimeResult, SelectorCommitError, SelectorError, StoreError,
};
pub use form::{CascadeReport, FieldState, RenderedField, TabForm, ValidationIssue};
pub use process::{ButtonState, ProcessDispatchRequest, ProcessDispatcher, ProcessExecutor};
pub use query::{DataSourceQueryBuilder, QueryRequest, RequestFingerprint, SelectorQuery};
pub use selector::{PageOutcome, SelectionCommit, SelectorController, SelectorState};
pub use session::SessionAttributes;
pub use store::{FieldValueStore, WriteBatch};
pub use telemetry::init_tracing;
pub use transport::{DataSourceClient, DataSourceTransport, FetchResponse, Row};
pub use tree::{LoadNotice, TabNode, TabTree};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a window
    pub use crate::{
        DataSourceTransport, EngineConfig, FormError, LoadOutcome, ProcessExecutor,
        QueryRequest, RuntimeError, RuntimeResult, SelectorState, TabForm, WindowEngine,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
