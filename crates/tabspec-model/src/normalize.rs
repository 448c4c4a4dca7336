//! Spec normalizer
//!
//! Turns the raw window document (`processes[]` + `window.viewProperties`)
//! into typed [`WindowSpec`] records.
//!
//! # Rules
//!
//! - Missing `tabId`, `entity` or field `name` fails the whole load.
//! - `OBSectionItem` entries become [`SectionGroup`]s; their `itemIds` decide
//!   the layout order of member fields. Fields are stored in layout order.
//! - A field flagged `additional: true` is kept next to its editable twin and
//!   tagged [`FieldRole::ProjectionOnly`].
//! - `<field>_display_logic` / `<field>_readonly_logic` entries become logic
//!   fields attached to their target.
//! - `gridProps` supplies `sort`, `fkField`, `showIf` and selector
//!   `editorProps`; a field-level `viewProperties` object overrides keys.

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{SpecResult, SpecValidationError};
use crate::reference::{ReferenceTypeRegistry, TEXT_REFERENCE};
use crate::spec::{
    DataSourceField, DataSourceSpec, FieldRole, FieldSpec, InField, LogicKind, OutField,
    ProcessDefinition, SectionGroup, SelectorDefinition, TabSpec, TextMatchStyle, ToolbarButton,
    WindowSpec,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::HashSet;

/// Field type marking a section grouping entry
pub const SECTION_ITEM: &str = "OBSectionItem";
/// Suffix of display logic fields
pub const DISPLAY_LOGIC_SUFFIX: &str = "_display_logic";
/// Suffix of read-only logic fields
pub const READONLY_LOGIC_SUFFIX: &str = "_readonly_logic";

const SELECTOR_KEYS: [&str; 7] = [
    "selectorDefinitionId",
    "valueField",
    "displayField",
    "pickListFields",
    "selectorGridFields",
    "extraSearchFields",
    "textMatchStyle",
];

/// Entity and field names of an enclosing tab, used for `parentProperty` checks
#[derive(Debug, Clone)]
struct Ancestor {
    entity: String,
    fields: HashSet<String>,
}

enum Entry {
    Field(usize),
    Section(usize),
}

/// Normalizes raw window documents
#[derive(Debug, Clone, Copy)]
pub struct SpecNormalizer<'a> {
    registry: &'a ReferenceTypeRegistry,
    diagnostics: &'a Diagnostics,
}

impl<'a> SpecNormalizer<'a> {
    /// Create normalizer resolving codes against `registry`
    #[inline]
    #[must_use]
    pub fn new(registry: &'a ReferenceTypeRegistry, diagnostics: &'a Diagnostics) -> Self {
        Self {
            registry,
            diagnostics,
        }
    }

    /// Create normalizer using the process-wide registry
    #[inline]
    #[must_use]
    pub fn with_global_registry(diagnostics: &'a Diagnostics) -> Self {
        Self::new(ReferenceTypeRegistry::global(), diagnostics)
    }

    /// Parse and normalize a JSON document
    ///
    /// # Errors
    /// `SpecValidationError` at window level for malformed JSON, otherwise as [`Self::normalize`]
    pub fn normalize_str(&self, text: &str) -> SpecResult<WindowSpec> {
        let raw: Value = serde_json::from_str(text)
            .map_err(|e| SpecValidationError::window(format!("malformed JSON: {e}")))?;
        self.normalize(&raw)
    }

    /// Normalize a raw window document
    ///
    /// # Errors
    /// First missing required key or violated invariant; no partial window is returned
    pub fn normalize(&self, raw: &Value) -> SpecResult<WindowSpec> {
        let root = raw
            .as_object()
            .ok_or_else(|| SpecValidationError::window("document must be a JSON object"))?;
        let window = root
            .get("window")
            .and_then(Value::as_object)
            .ok_or_else(|| SpecValidationError::window("missing required key 'window'"))?;
        let view = window
            .get("viewProperties")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                SpecValidationError::window("missing required key 'window.viewProperties'")
            })?;

        let window_id = opt_string(window, "windowId");

        let processes = match root.get("processes") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| self.normalize_process(idx, item))
                .collect::<SpecResult<Vec<_>>>()?,
            Some(_) => return Err(SpecValidationError::window("'processes' must be an array")),
        };

        let root_tab = self.normalize_tab(view, &[], "#root")?;
        tracing::debug!(
            tab = %root_tab.tab_id,
            processes = processes.len(),
            "normalized window specification"
        );

        Ok(WindowSpec {
            window_id,
            processes,
            root: root_tab,
        })
    }

    fn normalize_process(&self, idx: usize, raw: &Value) -> SpecResult<ProcessDefinition> {
        let position = format!("#{idx}");
        let obj = raw
            .as_object()
            .ok_or_else(|| SpecValidationError::process(&position, "process must be an object"))?;
        let process_id = opt_string(obj, "processId").ok_or_else(|| {
            SpecValidationError::process(&position, "missing required key 'processId'")
        })?;
        let action_handler = opt_string(obj, "actionHandler").ok_or_else(|| {
            SpecValidationError::process(&process_id, "missing required key 'actionHandler'")
        })?;
        let view = obj.get("viewProperties").and_then(Value::as_object);
        let ui_pattern =
            opt_string(obj, "uiPattern").or_else(|| view.and_then(|v| opt_string(v, "uiPattern")));
        let (fields, _sections) =
            self.normalize_field_list(view.and_then(|v| v.get("fields")), &process_id)?;

        Ok(ProcessDefinition {
            process_id,
            action_handler,
            ui_pattern,
            fields,
        })
    }

    fn normalize_tab(
        &self,
        raw: &Map<String, Value>,
        ancestors: &[Ancestor],
        position: &str,
    ) -> SpecResult<TabSpec> {
        let tab_id = opt_string(raw, "tabId")
            .ok_or_else(|| SpecValidationError::tab(position, "missing required key 'tabId'"))?;
        let entity = opt_string(raw, "entity")
            .ok_or_else(|| SpecValidationError::tab(&tab_id, "missing required key 'entity'"))?;

        let parent_property = opt_string(raw, "parentProperty");
        match (&parent_property, ancestors.is_empty()) {
            (Some(_), true) => {
                return Err(SpecValidationError::tab(
                    &tab_id,
                    "root tab must not declare 'parentProperty'",
                ))
            }
            (None, false) => {
                return Err(SpecValidationError::tab(
                    &tab_id,
                    "child tab requires 'parentProperty'",
                ))
            }
            _ => {}
        }

        let (fields, sections) = self.normalize_field_list(raw.get("fields"), &tab_id)?;

        if let Some(property) = &parent_property {
            check_parent_property(&tab_id, property, &fields, ancestors)?;
        }

        let data_source = match raw.get("dataSource") {
            Some(v) if !v.is_null() => Some(
                self.normalize_data_source(v, |reason| SpecValidationError::tab(&tab_id, reason))?,
            ),
            _ => None,
        };

        let toolbar_buttons = match raw.get("actionToolbarButtons") {
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| normalize_button(&tab_id, idx, item))
                .collect::<SpecResult<Vec<_>>>()?,
            _ => Vec::new(),
        };

        let mut lineage = ancestors.to_vec();
        lineage.push(Ancestor {
            entity: entity.clone(),
            fields: fields.iter().map(|f| f.name.clone()).collect(),
        });

        let children = match raw.get("createViewStructure") {
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    let position = format!("{tab_id}/#{idx}");
                    let obj = item.as_object().ok_or_else(|| {
                        SpecValidationError::tab(&position, "child tab must be an object")
                    })?;
                    self.normalize_tab(obj, &lineage, &position)
                })
                .collect::<SpecResult<Vec<_>>>()?,
            _ => Vec::new(),
        };

        let has_child_tabs = opt_bool(raw, "hasChildTabs").unwrap_or(!children.is_empty());

        Ok(TabSpec {
            title: opt_string(raw, "title").or_else(|| opt_string(raw, "tabTitle")),
            parent_property,
            data_source,
            grid_properties: object_map(raw.get("gridProperties")),
            standard_properties: object_map(raw.get("standardProperties")),
            session_attribute_names: name_list(raw.get("sessionAttributesNames")),
            has_child_tabs,
            sections,
            toolbar_buttons,
            children,
            fields,
            entity,
            tab_id,
        })
    }

    fn normalize_field_list(
        &self,
        raw: Option<&Value>,
        owner: &str,
    ) -> SpecResult<(Vec<FieldSpec>, Vec<SectionGroup>)> {
        let items = match raw {
            None | Some(Value::Null) => return Ok((Vec::new(), Vec::new())),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(SpecValidationError::field(owner, "*", "'fields' must be an array"))
            }
        };

        let mut fields: Vec<FieldSpec> = Vec::with_capacity(items.len());
        let mut sections: Vec<SectionGroup> = Vec::new();
        let mut entries = Vec::with_capacity(items.len());

        for (idx, item) in items.iter().enumerate() {
            let obj = item.as_object().ok_or_else(|| {
                SpecValidationError::field(owner, format!("#{idx}"), "field entry must be an object")
            })?;
            let merged = merge_view_properties(obj);

            if merged.get("type").and_then(Value::as_str) == Some(SECTION_ITEM) {
                sections.push(normalize_section(&merged, owner, idx)?);
                entries.push(Entry::Section(sections.len() - 1));
                continue;
            }

            let field = self.normalize_field(&merged, owner, idx)?;
            if fields
                .iter()
                .any(|f| f.name == field.name && f.role == field.role)
            {
                self.diagnostics.report(
                    DiagnosticKind::DuplicateField,
                    format!("{owner}.{}", field.name),
                    "field declared twice with the same role; keeping the first",
                );
                continue;
            }
            fields.push(field);
            entries.push(Entry::Field(fields.len() - 1));
        }

        self.check_logic_targets(&fields, owner);
        self.assign_sections(&mut fields, &sections, owner);
        assign_layout_order(&mut fields, &sections, &entries);
        fields.sort_by_key(|f| f.layout_order);

        Ok((fields, sections))
    }

    fn normalize_field(
        &self,
        obj: &Map<String, Value>,
        owner: &str,
        idx: usize,
    ) -> SpecResult<FieldSpec> {
        let name = opt_string(obj, "name").ok_or_else(|| {
            SpecValidationError::field(owner, format!("#{idx}"), "missing required key 'name'")
        })?;
        let grid = obj.get("gridProps").and_then(Value::as_object);

        let reference_type = opt_string(obj, "type").unwrap_or_else(|| TEXT_REFERENCE.to_string());
        let _ = self
            .registry
            .resolve_reported(&reference_type, self.diagnostics);

        let additional = opt_bool(obj, "additional").unwrap_or(false);
        let role = if let Some(target) = name.strip_suffix(DISPLAY_LOGIC_SUFFIX) {
            FieldRole::Logic {
                target: target.to_string(),
                kind: LogicKind::Display,
            }
        } else if let Some(target) = name.strip_suffix(READONLY_LOGIC_SUFFIX) {
            FieldRole::Logic {
                target: target.to_string(),
                kind: LogicKind::ReadOnly,
            }
        } else if additional {
            FieldRole::ProjectionOnly
        } else {
            FieldRole::Editable
        };

        let (display_logic, read_only_logic) = match &role {
            FieldRole::Logic {
                kind: LogicKind::Display,
                ..
            } => (
                first_string(obj, &["expression", "displayLogic", "readOnlyIf"]),
                None,
            ),
            FieldRole::Logic {
                kind: LogicKind::ReadOnly,
                ..
            } => (
                None,
                first_string(obj, &["expression", "readOnlyIf", "displayLogic"]),
            ),
            _ => (
                first_string(obj, &["displayLogic", "showIf"]),
                first_string(obj, &["readOnlyIf", "readOnlyLogic"]),
            ),
        };

        let projection_only = matches!(role, FieldRole::ProjectionOnly);
        let fk_field = grid
            .and_then(|g| opt_bool(g, "fkField"))
            .or_else(|| opt_bool(obj, "fkField"))
            .unwrap_or(false);
        let sort = grid
            .and_then(|g| g.get("sort"))
            .or_else(|| obj.get("sort"))
            .and_then(as_i64);

        let data_source = match ["dataSource", "optionDataSource", "datasource"]
            .iter()
            .find_map(|key| obj.get(*key).filter(|v| !v.is_null()))
        {
            Some(raw) => Some(self.normalize_data_source(raw, |reason| {
                SpecValidationError::field(owner, name.as_str(), reason)
            })?),
            None => None,
        };
        let selector = normalize_selector(obj, grid);

        let has_selector_id = selector
            .as_ref()
            .is_some_and(|s| s.selector_definition_id.is_some());
        if fk_field && data_source.is_none() && !has_selector_id {
            return Err(SpecValidationError::field(
                owner,
                name.as_str(),
                "fkField requires a dataSource or selectorDefinitionId",
            ));
        }

        let in_fields = self.normalize_in_fields(obj.get("inFields"), owner, &name);
        let out_fields = self.normalize_out_fields(obj.get("outFields"), owner, &name);

        Ok(FieldSpec {
            title: opt_string(obj, "title"),
            column_name: opt_string(obj, "columnName"),
            inp_column_name: opt_string(obj, "inpColumnName"),
            reference_type,
            required: opt_bool(obj, "required").unwrap_or(false),
            disabled: opt_bool(obj, "disabled").unwrap_or(false) || projection_only,
            updatable: opt_bool(obj, "updatable").unwrap_or(true) && !projection_only,
            displayed: opt_bool(obj, "displayed").unwrap_or(true),
            display_logic,
            read_only_logic,
            grid_display_logic: grid.and_then(|g| opt_string(g, "showIf")),
            on_change_function: opt_string(obj, "onChangeFunction"),
            validation_fn: opt_string(obj, "validationFn"),
            in_fields,
            out_fields,
            fk_field,
            target_entity: opt_string(obj, "targetEntity"),
            sort,
            section: None,
            layout_order: 0,
            role,
            data_source,
            selector,
            session_property: opt_bool(obj, "sessionProperty").unwrap_or(false),
            name,
        })
    }

    fn normalize_data_source(
        &self,
        raw: &Value,
        fail: impl Fn(String) -> SpecValidationError,
    ) -> SpecResult<DataSourceSpec> {
        let obj = raw
            .as_object()
            .ok_or_else(|| fail("dataSource must be an object".to_string()))?;
        let data_url = opt_string(obj, "dataURL")
            .ok_or_else(|| fail("dataSource is missing 'dataURL'".to_string()))?;

        let fields: Vec<DataSourceField> = match obj.get("fields") {
            Some(Value::Array(items)) => items.iter().filter_map(data_source_field).collect(),
            _ => Vec::new(),
        };
        for code in fields.iter().filter_map(|f| f.reference_type.as_deref()) {
            let _ = self.registry.resolve_reported(code, self.diagnostics);
        }

        let mut params = IndexMap::new();
        let mut extra_properties: Vec<String> = Vec::new();
        let static_params = obj
            .get("requestProperties")
            .and_then(|r| r.get("params"))
            .and_then(Value::as_object);
        if let Some(static_params) = static_params {
            for (key, value) in static_params {
                if key == "_extraProperties" {
                    extra_properties.extend(split_list(value));
                } else if let Some(text) = scalar_string(value) {
                    params.insert(key.clone(), text);
                }
            }
        }
        if let Some(value) = obj.get("_extraProperties") {
            extra_properties.extend(split_list(value));
        }
        let mut seen = HashSet::new();
        extra_properties.retain(|p| seen.insert(p.clone()));

        tracing::trace!(url = %data_url, params = params.len(), "normalized datasource");

        Ok(DataSourceSpec {
            data_url,
            fields,
            params,
            extra_properties,
        })
    }

    fn normalize_in_fields(
        &self,
        raw: Option<&Value>,
        owner: &str,
        field: &str,
    ) -> SmallVec<[InField; 2]> {
        let Some(Value::Array(items)) = raw else {
            return SmallVec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                let obj = item.as_object()?;
                match opt_string(obj, "columnName") {
                    Some(column_name) => Some(InField {
                        parameter_name: opt_string(obj, "parameterName")
                            .unwrap_or_else(|| column_name.clone()),
                        column_name,
                    }),
                    None => {
                        self.diagnostics.report(
                            DiagnosticKind::UnresolvedField,
                            format!("{owner}.{field}"),
                            "inFields entry without columnName ignored",
                        );
                        None
                    }
                }
            })
            .collect()
    }

    fn normalize_out_fields(&self, raw: Option<&Value>, owner: &str, field: &str) -> Vec<OutField> {
        let entries: Vec<(Option<&str>, &Value)> = match raw {
            Some(Value::Array(items)) => items.iter().map(|v| (None, v)).collect(),
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
            _ => return Vec::new(),
        };
        entries
            .into_iter()
            .filter_map(|(key, item)| {
                let obj = item.as_object()?;
                let Some(field_name) = opt_string(obj, "fieldName") else {
                    self.diagnostics.report(
                        DiagnosticKind::UnresolvedField,
                        format!("{owner}.{field}"),
                        "outFields entry without fieldName ignored",
                    );
                    return None;
                };
                Some(OutField {
                    field_name,
                    suffix: opt_string(obj, "suffix")
                        .or_else(|| key.map(str::to_string))
                        .unwrap_or_default(),
                    format_type: opt_string(obj, "formatType"),
                    target_field: opt_string(obj, "targetField"),
                })
            })
            .collect()
    }

    fn check_logic_targets(&self, fields: &[FieldSpec], owner: &str) {
        for field in fields {
            if let FieldRole::Logic { target, .. } = &field.role {
                let resolved = fields.iter().any(|f| {
                    !f.role.is_logic() && f.aliases().any(|a| a.eq_ignore_ascii_case(target))
                });
                if !resolved {
                    self.diagnostics.report(
                        DiagnosticKind::UnresolvedField,
                        format!("{owner}.{}", field.name),
                        format!("logic field targets unknown field '{target}'"),
                    );
                }
            }
        }
    }

    fn assign_sections(&self, fields: &mut [FieldSpec], sections: &[SectionGroup], owner: &str) {
        for section in sections {
            for item in &section.item_ids {
                let mut found = false;
                for field in fields.iter_mut().filter(|f| &f.name == item) {
                    found = true;
                    if field.section.is_none() {
                        field.section = Some(section.name.clone());
                    }
                }
                if !found {
                    self.diagnostics.report(
                        DiagnosticKind::UnresolvedField,
                        format!("{owner}.{}", section.name),
                        format!("section lists unknown field '{item}'"),
                    );
                }
            }
        }
    }
}

fn check_parent_property(
    tab_id: &str,
    property: &str,
    fields: &[FieldSpec],
    ancestors: &[Ancestor],
) -> SpecResult<()> {
    let in_ancestor = ancestors.iter().any(|a| a.fields.contains(property));
    let own_link = fields
        .iter()
        .find(|f| f.name == property)
        .is_some_and(|f| match &f.target_entity {
            None => true,
            Some(target) => ancestors.iter().any(|a| &a.entity == target),
        });
    if in_ancestor || own_link {
        Ok(())
    } else {
        Err(SpecValidationError::tab(
            tab_id,
            format!("parentProperty '{property}' does not link to an ancestor tab"),
        ))
    }
}

fn assign_layout_order(fields: &mut [FieldSpec], sections: &[SectionGroup], entries: &[Entry]) {
    let members: HashSet<&str> = sections
        .iter()
        .flat_map(|s| s.item_ids.iter().map(String::as_str))
        .collect();
    let mut order: Vec<Option<usize>> = vec![None; fields.len()];
    let mut next = 0;

    for entry in entries {
        match entry {
            Entry::Field(i) => {
                if !members.contains(fields[*i].name.as_str()) && order[*i].is_none() {
                    order[*i] = Some(next);
                    next += 1;
                }
            }
            Entry::Section(s) => {
                for item in &sections[*s].item_ids {
                    for (i, field) in fields.iter().enumerate() {
                        if &field.name == item && order[i].is_none() {
                            order[i] = Some(next);
                            next += 1;
                        }
                    }
                }
            }
        }
    }

    for (field, slot) in fields.iter_mut().zip(order) {
        field.layout_order = slot.unwrap_or_else(|| {
            let position = next;
            next += 1;
            position
        });
    }
}

fn normalize_section(
    obj: &Map<String, Value>,
    owner: &str,
    idx: usize,
) -> SpecResult<SectionGroup> {
    let name = opt_string(obj, "name").ok_or_else(|| {
        SpecValidationError::field(owner, format!("#{idx}"), "missing required key 'name'")
    })?;
    Ok(SectionGroup {
        title: opt_string(obj, "title"),
        item_ids: name_list(obj.get("itemIds")),
        expanded: opt_bool(obj, "sectionExpanded").unwrap_or(true),
        name,
    })
}

fn normalize_selector(
    obj: &Map<String, Value>,
    grid: Option<&Map<String, Value>>,
) -> Option<SelectorDefinition> {
    let editor = grid
        .and_then(|g| g.get("editorProps"))
        .and_then(Value::as_object);
    if editor.is_none() && !SELECTOR_KEYS.iter().any(|k| obj.contains_key(*k)) {
        return None;
    }

    let mut selector = SelectorDefinition {
        selector_definition_id: opt_string(obj, "selectorDefinitionId"),
        pick_list_fields: name_list(obj.get("pickListFields")),
        selector_grid_fields: name_list(obj.get("selectorGridFields")),
        extra_search_fields: obj.get("extraSearchFields").map(split_list).unwrap_or_default(),
        text_match_style: opt_string(obj, "textMatchStyle")
            .map(|s| TextMatchStyle::parse(&s))
            .unwrap_or_default(),
        ..SelectorDefinition::default()
    };
    if let Some(value_field) =
        opt_string(obj, "valueField").or_else(|| editor.and_then(|e| opt_string(e, "valueField")))
    {
        selector.value_field = value_field;
    }
    if let Some(display_field) = opt_string(obj, "displayField")
        .or_else(|| editor.and_then(|e| opt_string(e, "displayField")))
    {
        selector.display_field = display_field;
    }
    Some(selector)
}

fn normalize_button(tab_id: &str, idx: usize, raw: &Value) -> SpecResult<ToolbarButton> {
    let obj = raw.as_object().ok_or_else(|| {
        SpecValidationError::tab(tab_id, format!("toolbar button #{idx} must be an object"))
    })?;
    let id = opt_string(obj, "id")
        .or_else(|| opt_string(obj, "property"))
        .or_else(|| opt_string(obj, "processId"))
        .ok_or_else(|| {
            SpecValidationError::tab(tab_id, format!("toolbar button #{idx} has no id"))
        })?;
    Ok(ToolbarButton {
        id,
        title: opt_string(obj, "title"),
        property: opt_string(obj, "property"),
        process_id: opt_string(obj, "processId"),
        action_handler: opt_string(obj, "actionHandler"),
        ui_pattern: opt_string(obj, "uiPattern"),
        display_logic: first_string(obj, &["displayIf", "displayLogic"]),
        read_only_logic: first_string(obj, &["readOnlyIf", "readOnlyLogic"]),
    })
}

fn merge_view_properties(obj: &Map<String, Value>) -> Cow<'_, Map<String, Value>> {
    match obj.get("viewProperties").and_then(Value::as_object) {
        Some(overrides) => {
            let mut merged = obj.clone();
            merged.remove("viewProperties");
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
            Cow::Owned(merged)
        }
        None => Cow::Borrowed(obj),
    }
}

fn data_source_field(raw: &Value) -> Option<DataSourceField> {
    match raw {
        Value::String(name) if !name.is_empty() => Some(DataSourceField {
            name: name.clone(),
            reference_type: None,
            additional: false,
        }),
        Value::Object(obj) => Some(DataSourceField {
            name: opt_string(obj, "name")?,
            reference_type: opt_string(obj, "type"),
            additional: opt_bool(obj, "additional").unwrap_or(false),
        }),
        _ => None,
    }
}

pub(crate) fn opt_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| opt_string(obj, key))
}

fn opt_bool(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "Y" | "true" => Some(true),
            "N" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn split_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn name_list(raw: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(obj) => opt_string(obj, "name"),
            _ => None,
        })
        .collect()
}

fn object_map(raw: Option<&Value>) -> IndexMap<String, Value> {
    raw.and_then(Value::as_object)
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}
