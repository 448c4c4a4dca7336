//! Normalized window specification
//!
//! These records are produced by [`crate::normalize::SpecNormalizer`] and are
//! immutable once loaded. A [`WindowSpec`] exclusively owns its tab tree.

use indexmap::IndexMap;
use serde_json::Value;
use smallvec::SmallVec;

/// Root of a loaded window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    /// Window identifier, when present in the raw document
    pub window_id: Option<String>,
    /// Processes reachable from toolbar buttons
    pub processes: Vec<ProcessDefinition>,
    /// Root tab of the tab tree
    pub root: TabSpec,
}

impl WindowSpec {
    /// All tabs, depth-first, root first
    #[must_use]
    pub fn tabs(&self) -> Vec<&TabSpec> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(tab) = stack.pop() {
            out.push(tab);
            stack.extend(tab.children.iter().rev());
        }
        out
    }

    /// Find a tab anywhere in the tree
    #[must_use]
    pub fn find_tab(&self, tab_id: &str) -> Option<&TabSpec> {
        self.tabs().into_iter().find(|t| t.tab_id == tab_id)
    }

    /// Find a process definition
    #[must_use]
    pub fn process(&self, process_id: &str) -> Option<&ProcessDefinition> {
        self.processes.iter().find(|p| p.process_id == process_id)
    }
}

/// A process that a toolbar button can launch
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessDefinition {
    /// Process identifier
    pub process_id: String,
    /// Server-side handler class name
    pub action_handler: String,
    /// UI pattern (`A`, `OBUIAPP_PickAndExecute`, ...)
    pub ui_pattern: Option<String>,
    /// Parameter fields
    pub fields: Vec<FieldSpec>,
}

/// One tab (a grid plus its form)
#[derive(Debug, Clone, PartialEq)]
pub struct TabSpec {
    /// Tab identifier
    pub tab_id: String,
    /// Entity shown by the tab
    pub entity: String,
    /// Tab title
    pub title: Option<String>,
    /// Property linking a record of this tab to its parent record; `None` only on the root
    pub parent_property: Option<String>,
    /// Fields in layout order
    pub fields: Vec<FieldSpec>,
    /// Grid datasource
    pub data_source: Option<DataSourceSpec>,
    /// Opaque grid configuration passed to the renderer
    pub grid_properties: IndexMap<String, Value>,
    /// Key column and `inp*` identifiers
    pub standard_properties: IndexMap<String, Value>,
    /// Session attributes shared with the subtree
    pub session_attribute_names: Vec<String>,
    /// Advisory: whether parent navigation must reload children
    pub has_child_tabs: bool,
    /// Section groupings
    pub sections: Vec<SectionGroup>,
    /// Toolbar buttons that dispatch processes
    pub toolbar_buttons: Vec<ToolbarButton>,
    /// Child tabs
    pub children: Vec<TabSpec>,
}

impl TabSpec {
    /// Check if this is the root tab
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_property.is_none()
    }

    /// Field by name; an editable field wins over a projection-only twin
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.role.is_editable())
            .or_else(|| self.fields.iter().find(|f| f.name == name))
    }

    /// Field matched by name, column name or `inp` column name, ignoring case
    #[must_use]
    pub fn field_by_alias(&self, alias: &str) -> Option<&FieldSpec> {
        self.field(alias).or_else(|| {
            self.fields
                .iter()
                .filter(|f| !f.role.is_logic())
                .find(|f| f.aliases().any(|a| a.eq_ignore_ascii_case(alias)))
        })
    }

    /// Key property of the tab's entity (`id` by default)
    #[must_use]
    pub fn key_property(&self) -> &str {
        self.standard_properties
            .get("keyProperty")
            .and_then(Value::as_str)
            .unwrap_or("id")
    }

    /// Toolbar button by id
    #[must_use]
    pub fn toolbar_button(&self, id: &str) -> Option<&ToolbarButton> {
        self.toolbar_buttons.iter().find(|b| b.id == id)
    }
}

/// Editing role of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRole {
    /// Regular input
    Editable,
    /// Extra projected column (`additional: true`); never editable
    ProjectionOnly,
    /// Auxiliary `<target>_display_logic` / `<target>_readonly_logic` field
    Logic {
        /// Field the logic applies to
        target: String,
        /// Which state it controls
        kind: LogicKind,
    },
}

impl FieldRole {
    /// Check if regular input
    #[inline]
    #[must_use]
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Editable)
    }

    /// Check if logic field
    #[inline]
    #[must_use]
    pub fn is_logic(&self) -> bool {
        matches!(self, Self::Logic { .. })
    }
}

/// Which state a logic field controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicKind {
    /// Visibility
    Display,
    /// Editability
    ReadOnly,
}

/// One column / input
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Property name
    pub name: String,
    /// Label
    pub title: Option<String>,
    /// Database column name
    pub column_name: Option<String>,
    /// Classic form input name (`inpmProductId`)
    pub inp_column_name: Option<String>,
    /// Reference code (`_id_*`)
    pub reference_type: String,
    /// Mandatory
    pub required: bool,
    /// Statically disabled
    pub disabled: bool,
    /// Editable after the record is saved
    pub updatable: bool,
    /// Shown in the form
    pub displayed: bool,
    /// Visibility expression
    pub display_logic: Option<String>,
    /// Read-only expression
    pub read_only_logic: Option<String>,
    /// Grid column visibility expression (`gridProps.showIf`)
    pub grid_display_logic: Option<String>,
    /// Late-bound change handler name
    pub on_change_function: Option<String>,
    /// Late-bound validation function name
    pub validation_fn: Option<String>,
    /// Values feeding this field's datasource query
    pub in_fields: SmallVec<[InField; 2]>,
    /// Values this field populates after a selection
    pub out_fields: Vec<OutField>,
    /// Foreign-key column
    pub fk_field: bool,
    /// Entity referenced by a foreign key
    pub target_entity: Option<String>,
    /// Declared sort position (`gridProps.sort`)
    pub sort: Option<i64>,
    /// Section the field belongs to
    pub section: Option<String>,
    /// Position in the form layout
    pub layout_order: usize,
    /// Editing role
    pub role: FieldRole,
    /// Option/selector datasource
    pub data_source: Option<DataSourceSpec>,
    /// Popup selector template
    pub selector: Option<SelectorDefinition>,
    /// Value is published as a session attribute
    pub session_property: bool,
}

impl FieldSpec {
    /// Create an editable text field with defaults
    #[must_use]
    pub fn new(name: impl Into<String>, reference_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            column_name: None,
            inp_column_name: None,
            reference_type: reference_type.into(),
            required: false,
            disabled: false,
            updatable: true,
            displayed: true,
            display_logic: None,
            read_only_logic: None,
            grid_display_logic: None,
            on_change_function: None,
            validation_fn: None,
            in_fields: SmallVec::new(),
            out_fields: Vec::new(),
            fk_field: false,
            target_entity: None,
            sort: None,
            section: None,
            layout_order: 0,
            role: FieldRole::Editable,
            data_source: None,
            selector: None,
            session_property: false,
        }
    }

    /// Name, column name and `inp` name
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(self.column_name.as_deref())
            .chain(self.inp_column_name.as_deref())
    }

    /// Prefix for out-field hidden values (`inpmProductId` + `_UOM`)
    #[inline]
    #[must_use]
    pub fn out_prefix(&self) -> &str {
        self.inp_column_name.as_deref().unwrap_or(&self.name)
    }

    /// Check if the field accepts user input
    #[inline]
    #[must_use]
    pub fn is_editable(&self) -> bool {
        self.role.is_editable() && !self.disabled
    }

    /// Key of the `$_identifier` companion value
    #[inline]
    #[must_use]
    pub fn identifier_key(&self) -> String {
        identifier_of(&self.name)
    }
}

/// Companion display-label key for a projected foreign key
#[inline]
#[must_use]
pub fn identifier_of(column: &str) -> String {
    format!("{column}$_identifier")
}

/// Mapping from a form value to a datasource request parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InField {
    /// Source column (`inp` name, column name or field name)
    pub column_name: String,
    /// Request parameter name
    pub parameter_name: String,
}

/// Value copied from a selected row into the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutField {
    /// Column of the selected row (`product$uOM`)
    pub field_name: String,
    /// Suffix appended to the source field's `inp` name (`_UOM`)
    pub suffix: String,
    /// Formatting hint
    pub format_type: Option<String>,
    /// Form field receiving the value; otherwise a hidden value is written
    pub target_field: Option<String>,
}

/// One projected column of a datasource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceField {
    /// Column name
    pub name: String,
    /// Reference code, when declared
    pub reference_type: Option<String>,
    /// Extra column
    pub additional: bool,
}

/// Remote query template
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceSpec {
    /// Endpoint
    pub data_url: String,
    /// Projection
    pub fields: Vec<DataSourceField>,
    /// Static request parameters
    pub params: IndexMap<String, String>,
    /// Additional projected columns
    pub extra_properties: Vec<String>,
}

impl DataSourceSpec {
    /// Datasource with only an endpoint
    #[must_use]
    pub fn new(data_url: impl Into<String>) -> Self {
        Self {
            data_url: data_url.into(),
            fields: Vec::new(),
            params: IndexMap::new(),
            extra_properties: Vec::new(),
        }
    }
}

/// How selector search text matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextMatchStyle {
    /// Contains
    #[default]
    Substring,
    /// Prefix
    StartsWith,
    /// Whole value
    Exact,
}

impl TextMatchStyle {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Substring => "substring",
            Self::StartsWith => "startsWith",
            Self::Exact => "exact",
        }
    }

    /// Parse wire name; unknown values are substring
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "startsWith" => Self::StartsWith,
            "exact" => Self::Exact,
            _ => Self::Substring,
        }
    }

    /// Criteria operator matching this style
    #[must_use]
    pub const fn operator(self) -> &'static str {
        match self {
            Self::Substring => "iContains",
            Self::StartsWith => "iStartsWith",
            Self::Exact => "iEquals",
        }
    }
}

/// Popup selector template bound to a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorDefinition {
    /// Selector definition id
    pub selector_definition_id: Option<String>,
    /// Row column committed as the field value
    pub value_field: String,
    /// Row column shown as label
    pub display_field: String,
    /// Columns shown in the drop-down
    pub pick_list_fields: Vec<String>,
    /// Columns shown in the popup grid
    pub selector_grid_fields: Vec<String>,
    /// Extra searchable columns
    pub extra_search_fields: Vec<String>,
    /// Match style
    pub text_match_style: TextMatchStyle,
}

impl Default for SelectorDefinition {
    fn default() -> Self {
        Self {
            selector_definition_id: None,
            value_field: "id".to_string(),
            display_field: "_identifier".to_string(),
            pick_list_fields: Vec::new(),
            selector_grid_fields: Vec::new(),
            extra_search_fields: Vec::new(),
            text_match_style: TextMatchStyle::Substring,
        }
    }
}

/// `OBSectionItem` grouping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionGroup {
    /// Section name
    pub name: String,
    /// Section title
    pub title: Option<String>,
    /// Member field names, in order
    pub item_ids: Vec<String>,
    /// Initially expanded
    pub expanded: bool,
}

/// Toolbar button launching a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolbarButton {
    /// Button id
    pub id: String,
    /// Label
    pub title: Option<String>,
    /// Backing property
    pub property: Option<String>,
    /// Process launched
    pub process_id: Option<String>,
    /// Handler class
    pub action_handler: Option<String>,
    /// UI pattern
    pub ui_pattern: Option<String>,
    /// Visibility expression
    pub display_logic: Option<String>,
    /// Read-only expression
    pub read_only_logic: Option<String>,
}
