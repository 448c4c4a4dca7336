//! Serializer back to the raw document shape
//!
//! [`to_raw`] emits exactly the keys the normalizer reads, so
//! `normalize(to_raw(spec)) == spec` for any normalized spec.

use crate::normalize::SECTION_ITEM;
use crate::spec::{
    DataSourceSpec, FieldRole, FieldSpec, LogicKind, ProcessDefinition, SectionGroup,
    SelectorDefinition, TabSpec, ToolbarButton, WindowSpec,
};
use serde_json::{json, Map, Value};

/// Serialize a normalized window into the raw document shape
#[must_use]
pub fn to_raw(spec: &WindowSpec) -> Value {
    let mut window = Map::new();
    if let Some(id) = &spec.window_id {
        window.insert("windowId".into(), json!(id));
    }
    window.insert("viewProperties".into(), tab_to_raw(&spec.root));

    json!({
        "processes": spec.processes.iter().map(process_to_raw).collect::<Vec<_>>(),
        "window": window,
    })
}

fn process_to_raw(process: &ProcessDefinition) -> Value {
    let mut obj = Map::new();
    obj.insert("processId".into(), json!(process.process_id));
    obj.insert("actionHandler".into(), json!(process.action_handler));
    put_opt(&mut obj, "uiPattern", process.ui_pattern.as_ref());
    obj.insert(
        "viewProperties".into(),
        json!({ "fields": fields_to_raw(&process.fields, &[]) }),
    );
    Value::Object(obj)
}

fn tab_to_raw(tab: &TabSpec) -> Value {
    let mut obj = Map::new();
    obj.insert("tabId".into(), json!(tab.tab_id));
    obj.insert("entity".into(), json!(tab.entity));
    put_opt(&mut obj, "title", tab.title.as_ref());
    put_opt(&mut obj, "parentProperty", tab.parent_property.as_ref());
    obj.insert("hasChildTabs".into(), json!(tab.has_child_tabs));
    if !tab.session_attribute_names.is_empty() {
        obj.insert(
            "sessionAttributesNames".into(),
            json!(tab.session_attribute_names),
        );
    }
    if let Some(ds) = &tab.data_source {
        obj.insert("dataSource".into(), data_source_to_raw(ds));
    }
    if !tab.grid_properties.is_empty() {
        obj.insert(
            "gridProperties".into(),
            Value::Object(tab.grid_properties.clone().into_iter().collect()),
        );
    }
    if !tab.standard_properties.is_empty() {
        obj.insert(
            "standardProperties".into(),
            Value::Object(tab.standard_properties.clone().into_iter().collect()),
        );
    }
    obj.insert(
        "fields".into(),
        Value::Array(fields_to_raw(&tab.fields, &tab.sections)),
    );
    if !tab.toolbar_buttons.is_empty() {
        obj.insert(
            "actionToolbarButtons".into(),
            tab.toolbar_buttons.iter().map(button_to_raw).collect(),
        );
    }
    if !tab.children.is_empty() {
        obj.insert(
            "createViewStructure".into(),
            tab.children.iter().map(tab_to_raw).collect(),
        );
    }
    Value::Object(obj)
}

/// Fields in stored order; each section entry lands right before its first member
fn fields_to_raw(fields: &[FieldSpec], sections: &[SectionGroup]) -> Vec<Value> {
    let mut out = Vec::with_capacity(fields.len() + sections.len());
    let mut emitted = vec![false; sections.len()];

    for field in fields {
        if let Some(section_name) = &field.section {
            if let Some(idx) = sections.iter().position(|s| &s.name == section_name) {
                if !emitted[idx] {
                    // memberless sections keep their relative position
                    for (earlier, section) in sections.iter().enumerate().take(idx + 1) {
                        let has_members = fields
                            .iter()
                            .any(|f| f.section.as_ref() == Some(&section.name));
                        if !emitted[earlier] && (earlier == idx || !has_members) {
                            emitted[earlier] = true;
                            out.push(section_to_raw(section));
                        }
                    }
                }
            }
        }
        out.push(field_to_raw(field));
    }
    for (section, done) in sections.iter().zip(emitted) {
        if !done {
            out.push(section_to_raw(section));
        }
    }
    out
}

fn section_to_raw(section: &SectionGroup) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), json!(section.name));
    obj.insert("type".into(), json!(SECTION_ITEM));
    put_opt(&mut obj, "title", section.title.as_ref());
    obj.insert("itemIds".into(), json!(section.item_ids));
    obj.insert("sectionExpanded".into(), json!(section.expanded));
    Value::Object(obj)
}

fn field_to_raw(field: &FieldSpec) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), json!(field.name));
    obj.insert("type".into(), json!(field.reference_type));
    put_opt(&mut obj, "title", field.title.as_ref());
    put_opt(&mut obj, "columnName", field.column_name.as_ref());
    put_opt(&mut obj, "inpColumnName", field.inp_column_name.as_ref());
    obj.insert("required".into(), json!(field.required));
    obj.insert("disabled".into(), json!(field.disabled));
    obj.insert("updatable".into(), json!(field.updatable));
    obj.insert("displayed".into(), json!(field.displayed));
    if field.role == FieldRole::ProjectionOnly {
        obj.insert("additional".into(), json!(true));
    }

    match &field.role {
        FieldRole::Logic {
            kind: LogicKind::Display,
            ..
        } => put_opt(&mut obj, "displayLogic", field.display_logic.as_ref()),
        FieldRole::Logic {
            kind: LogicKind::ReadOnly,
            ..
        } => put_opt(&mut obj, "readOnlyIf", field.read_only_logic.as_ref()),
        _ => {
            put_opt(&mut obj, "displayLogic", field.display_logic.as_ref());
            put_opt(&mut obj, "readOnlyIf", field.read_only_logic.as_ref());
        }
    }

    put_opt(&mut obj, "onChangeFunction", field.on_change_function.as_ref());
    put_opt(&mut obj, "validationFn", field.validation_fn.as_ref());
    put_opt(&mut obj, "targetEntity", field.target_entity.as_ref());
    if field.session_property {
        obj.insert("sessionProperty".into(), json!(true));
    }

    let mut grid = Map::new();
    if let Some(sort) = field.sort {
        grid.insert("sort".into(), json!(sort));
    }
    if field.fk_field {
        grid.insert("fkField".into(), json!(true));
    }
    put_opt(&mut grid, "showIf", field.grid_display_logic.as_ref());
    if !grid.is_empty() {
        obj.insert("gridProps".into(), Value::Object(grid));
    }

    if !field.in_fields.is_empty() {
        obj.insert(
            "inFields".into(),
            field
                .in_fields
                .iter()
                .map(|f| json!({ "columnName": f.column_name, "parameterName": f.parameter_name }))
                .collect(),
        );
    }
    if !field.out_fields.is_empty() {
        obj.insert(
            "outFields".into(),
            field
                .out_fields
                .iter()
                .map(|f| {
                    let mut out = Map::new();
                    out.insert("fieldName".into(), json!(f.field_name));
                    out.insert("suffix".into(), json!(f.suffix));
                    put_opt(&mut out, "formatType", f.format_type.as_ref());
                    put_opt(&mut out, "targetField", f.target_field.as_ref());
                    Value::Object(out)
                })
                .collect(),
        );
    }
    if let Some(ds) = &field.data_source {
        obj.insert("dataSource".into(), data_source_to_raw(ds));
    }
    if let Some(selector) = &field.selector {
        selector_to_raw(&mut obj, selector);
    }
    Value::Object(obj)
}

fn selector_to_raw(obj: &mut Map<String, Value>, selector: &SelectorDefinition) {
    put_opt(
        obj,
        "selectorDefinitionId",
        selector.selector_definition_id.as_ref(),
    );
    obj.insert("valueField".into(), json!(selector.value_field));
    obj.insert("displayField".into(), json!(selector.display_field));
    obj.insert("pickListFields".into(), json!(selector.pick_list_fields));
    obj.insert(
        "selectorGridFields".into(),
        json!(selector.selector_grid_fields),
    );
    obj.insert(
        "extraSearchFields".into(),
        json!(selector.extra_search_fields),
    );
    obj.insert(
        "textMatchStyle".into(),
        json!(selector.text_match_style.as_str()),
    );
}

fn data_source_to_raw(ds: &DataSourceSpec) -> Value {
    let fields: Vec<Value> = ds
        .fields
        .iter()
        .map(|f| {
            let mut obj = Map::new();
            obj.insert("name".into(), json!(f.name));
            put_opt(&mut obj, "type", f.reference_type.as_ref());
            if f.additional {
                obj.insert("additional".into(), json!(true));
            }
            Value::Object(obj)
        })
        .collect();
    let params: Map<String, Value> = ds
        .params
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect();
    json!({
        "dataURL": ds.data_url,
        "fields": fields,
        "requestProperties": { "params": params },
        "_extraProperties": ds.extra_properties,
    })
}

fn button_to_raw(button: &ToolbarButton) -> Value {
    let mut obj = Map::new();
    obj.insert("id".into(), json!(button.id));
    put_opt(&mut obj, "title", button.title.as_ref());
    put_opt(&mut obj, "property", button.property.as_ref());
    put_opt(&mut obj, "processId", button.process_id.as_ref());
    put_opt(&mut obj, "actionHandler", button.action_handler.as_ref());
    put_opt(&mut obj, "uiPattern", button.ui_pattern.as_ref());
    put_opt(&mut obj, "displayIf", button.display_logic.as_ref());
    put_opt(&mut obj, "readOnlyIf", button.read_only_logic.as_ref());
    Value::Object(obj)
}

fn put_opt(obj: &mut Map<String, Value>, key: &str, value: Option<&String>) {
    if let Some(value) = value {
        obj.insert(key.to_string(), json!(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::normalize::SpecNormalizer;

    #[test]
    fn section_precedes_first_member() {
        let raw = json!({ "window": { "viewProperties": {
            "tabId": "1", "entity": "E",
            "fields": [
                { "name": "a" },
                { "name": "s", "type": "OBSectionItem", "itemIds": ["b"] },
                { "name": "b" }
            ]
        }}});
        let diags = Diagnostics::new();
        let spec = SpecNormalizer::with_global_registry(&diags)
            .normalize(&raw)
            .unwrap();
        let back = to_raw(&spec);
        let names: Vec<_> = back["window"]["viewProperties"]["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "s", "b"]);
    }
}
