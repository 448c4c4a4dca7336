//! Error types for the runtime
//!
//! Runtime failures never corrupt state:
//! - [`DataSourceFetchError`]: retryable notice, stores keep their values
//! - [`SelectorCommitError`]: commit aborted, store unchanged
//! - [`StoreError`]: a staged write batch was rejected as a whole

use crate::selector::SelectorState;
use tabspec_model::SpecValidationError;

/// Remote fetch failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataSourceFetchError {
    /// No response within the configured timeout
    #[error("fetch of {url} timed out after {timeout_ms}ms")]
    Timeout {
        /// Datasource URL
        url: String,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Transport reported a failure
    #[error("transport error for {url}: {message}")]
    Transport {
        /// Datasource URL
        url: String,
        /// Transport message
        message: String,
    },

    /// Response was not `{ "response": { "data": [...] } }`
    #[error("malformed response from {url}: {message}")]
    MalformedResponse {
        /// Datasource URL
        url: String,
        /// What was wrong
        message: String,
    },
}

impl DataSourceFetchError {
    /// Check if repeating the same request may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }

    /// URL of the failed request
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url, .. }
            | Self::Transport { url, .. }
            | Self::MalformedResponse { url, .. } => url,
        }
    }
}

/// Rejected write batch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A value failed its reference-type validation
    #[error("value for '{key}' rejected: {reason}")]
    Rejected {
        /// Store key
        key: String,
        /// Validator message
        reason: String,
    },
}

/// Selector commit aborted; the store kept its previous values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorCommitError {
    /// Row id not among the loaded rows
    #[error("row '{0}' is not loaded")]
    UnknownRow(String),

    /// Row lacks the selector's value field
    #[error("row has no value in '{0}'")]
    MissingValue(String),

    /// Store rejected the batch
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Selector operation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    /// Field has no selector
    #[error("field '{0}' has no selector")]
    NoSelector(String),

    /// Operation not allowed in the current state
    #[error("cannot {operation} while selector is {state}")]
    InvalidState {
        /// Current state
        state: SelectorState,
        /// Attempted operation
        operation: &'static str,
    },

    /// Page fetch failed
    #[error(transparent)]
    Fetch(#[from] DataSourceFetchError),

    /// Commit failed
    #[error(transparent)]
    Commit(#[from] SelectorCommitError),

    /// Request could not be built
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl SelectorError {
    /// Check if repeating the operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(err) if err.is_retryable())
    }
}

/// Query construction failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Field or tab has no datasource
    #[error("'{0}' has no datasource")]
    NoDataSource(String),

    /// Child tab query without a parent property
    #[error("tab '{0}' has no parent property")]
    NoParentProperty(String),
}

/// Form editing failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    /// Field not on this tab
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// Field is read-only, projection-only or disabled
    #[error("field '{0}' is read-only")]
    ReadOnly(String),

    /// Selector failure
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// Datasource request could not be built
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Master-detail coordination failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// Tab id not in the tree
    #[error("unknown tab '{0}'")]
    UnknownTab(String),

    /// Record id not among the tab's rows
    #[error("record '{record}' is not loaded in tab '{tab}'")]
    UnknownRecord {
        /// Tab id
        tab: String,
        /// Record id
        record: String,
    },

    /// Children requested for a record that is not the active one
    #[error("tab '{tab}' has no active record '{record}'")]
    ParentNotSelected {
        /// Parent tab id
        tab: String,
        /// Requested parent record id
        record: String,
    },

    /// Tab reloaded while its parent tab has no active record
    #[error("tab '{tab}' cannot load: parent tab '{parent}' has no active record")]
    NoActiveParent {
        /// Tab being loaded
        tab: String,
        /// Parent tab id
        parent: String,
    },

    /// Query could not be built
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Fetch failed; previous rows kept
    #[error(transparent)]
    Fetch(#[from] DataSourceFetchError),
}

impl CoordinatorError {
    /// Check if repeating the operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(err) if err.is_retryable())
    }
}

/// Process dispatch failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Button id not on the tab
    #[error("unknown toolbar button '{0}'")]
    UnknownButton(String),

    /// Button hidden by its display logic
    #[error("toolbar button '{0}' is not displayed")]
    Hidden(String),

    /// Button disabled by its read-only logic
    #[error("toolbar button '{0}' is read-only")]
    ReadOnly(String),

    /// Neither the button nor a process definition names an action handler
    #[error("toolbar button '{0}' has no action handler")]
    NoActionHandler(String),

    /// Dispatch needs an active record
    #[error("no active record")]
    NoActiveRecord,

    /// Executor failed
    #[error("process execution failed: {0}")]
    Execution(String),
}

/// Configuration loading failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// TOML did not match the schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level runtime error
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Specification failed to load
    #[error(transparent)]
    Spec(#[from] SpecValidationError),

    /// Configuration failed to load
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Form editing failed
    #[error(transparent)]
    Form(#[from] FormError),

    /// Master-detail coordination failed
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// Process dispatch failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Tracing subscriber could not be installed
    #[error("telemetry: {0}")]
    Telemetry(String),
}

impl RuntimeError {
    /// Check if repeating the operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Coordinator(err) => err.is_retryable(),
            Self::Form(FormError::Selector(err)) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Result alias for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
