use pretty_assertions::assert_eq;
use tabspec_model::{
    to_raw, DiagnosticKind, Diagnostics, EditorKind, FieldRole, LogicKind, ReferenceTypeRegistry,
    SpecNormalizer, TextMatchStyle,
};

const SALES_ORDER: &str = include_str!("../../tabspec-test-utils/fixtures/sales_order.json");

fn load() -> (tabspec_model::WindowSpec, Diagnostics) {
    let diags = Diagnostics::new();
    let spec = SpecNormalizer::with_global_registry(&diags)
        .normalize_str(SALES_ORDER)
        .unwrap();
    (spec, diags)
}

#[test]
fn test_sales_order_loads_without_diagnostics() {
    let (spec, diags) = load();
    assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags.entries());
    assert_eq!(spec.window_id.as_deref(), Some("143"));
    let ids: Vec<_> = spec.tabs().iter().map(|t| t.tab_id.as_str()).collect();
    assert_eq!(ids, vec!["186", "187", "189", "188"]);
}

#[test]
fn test_tab_hierarchy_and_parent_properties() {
    let (spec, _) = load();
    assert!(spec.root.is_root());
    assert!(spec.root.has_child_tabs);
    let lines = spec.find_tab("187").unwrap();
    assert_eq!(lines.parent_property.as_deref(), Some("salesOrder"));
    assert_eq!(lines.entity, "OrderLine");
    let tax = spec.find_tab("189").unwrap();
    assert!(!tax.has_child_tabs);
    let plan = spec.find_tab("188").unwrap();
    assert!(!plan.has_child_tabs);
}

#[test]
fn test_product_field_metadata() {
    let (spec, _) = load();
    let lines = spec.find_tab("187").unwrap();
    let product = lines.field("product").unwrap();

    assert!(product.fk_field);
    assert_eq!(product.sort, Some(3));
    assert_eq!(product.out_prefix(), "inpmProductId");
    let suffixes: Vec<_> = product.out_fields.iter().map(|o| o.suffix.as_str()).collect();
    assert_eq!(suffixes, vec!["_UOM", "_CURR", "_PSTD", "_PLIST", "_PLIM", "_ATR"]);

    let selector = product.selector.as_ref().unwrap();
    assert_eq!(
        selector.selector_definition_id.as_deref(),
        Some("2E64F551C7C4470C80C29DBA24B34A5F")
    );
    assert_eq!(selector.extra_search_fields, vec!["searchKey", "name"]);
    assert_eq!(selector.text_match_style, TextMatchStyle::Substring);

    let ds = product.data_source.as_ref().unwrap();
    assert_eq!(ds.data_url, "/ws/datasource/ProductByPriceAndWarehouse");
    assert_eq!(ds.params.get("columnName").map(String::as_str), Some("M_Product_ID"));
    assert_eq!(ds.extra_properties.len(), 4);

    let registry = ReferenceTypeRegistry::global();
    assert_eq!(registry.resolve(&product.reference_type).kind(), EditorKind::Search);
}

#[test]
fn test_storage_bin_in_fields() {
    let (spec, _) = load();
    let bin = spec.find_tab("187").unwrap().field("storageBin").unwrap();
    let mapping: Vec<_> = bin
        .in_fields
        .iter()
        .map(|f| (f.column_name.as_str(), f.parameter_name.as_str()))
        .collect();
    assert_eq!(
        mapping,
        vec![("inpmWarehouseId", "inpmWarehouseId"), ("inpadOrgId", "inpAD_Org_ID")]
    );
}

#[test]
fn test_header_twin_and_logic_fields() {
    let (spec, _) = load();
    let header = &spec.root;
    let twins: Vec<_> = header
        .fields
        .iter()
        .filter(|f| f.name == "businessPartner")
        .map(|f| f.role.clone())
        .collect();
    assert_eq!(twins, vec![FieldRole::Editable, FieldRole::ProjectionOnly]);

    let logic = header.field("C_PaymentTerm_ID_display_logic").unwrap();
    assert_eq!(
        logic.role,
        FieldRole::Logic {
            target: "C_PaymentTerm_ID".to_string(),
            kind: LogicKind::Display
        }
    );
}

#[test]
fn test_section_layout_order() {
    let (spec, _) = load();
    let header = &spec.root;
    let tail: Vec<_> = header
        .fields
        .iter()
        .rev()
        .take(3)
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(tail, vec!["documentAction", "grandTotalAmount", "description"]);
    let section = &header.sections[0];
    assert_eq!(section.name, "moreInformation");
    assert!(!section.expanded);
    assert!(header
        .fields
        .iter()
        .enumerate()
        .all(|(i, f)| f.layout_order == i));
}

#[test]
fn test_process_definitions() {
    let (spec, _) = load();
    let process = spec.process("104").unwrap();
    assert_eq!(process.ui_pattern.as_deref(), Some("A"));
    let void_date = process.fields.iter().find(|f| f.name == "voidDate").unwrap();
    assert_eq!(void_date.display_logic.as_deref(), Some("@docAction@='RC'"));
    let button = spec.root.toolbar_button("documentAction").unwrap();
    assert_eq!(button.process_id.as_deref(), Some("104"));
}

#[test]
fn test_fixture_round_trip() {
    let (spec, _) = load();
    let diags = Diagnostics::new();
    let again = SpecNormalizer::with_global_registry(&diags)
        .normalize(&to_raw(&spec))
        .unwrap();
    assert_eq!(spec, again);
    assert_eq!(diags.count(DiagnosticKind::DuplicateField), 0);
}

#[test]
fn test_malformed_json_is_window_error() {
    let diags = Diagnostics::new();
    let err = SpecNormalizer::with_global_registry(&diags)
        .normalize_str("{ not json")
        .unwrap_err();
    assert_eq!(err.location, tabspec_model::SpecLocation::Window);
}

#[test]
fn test_unknown_datasource_column_type_is_reported() {
    let raw = serde_json::json!({
        "window": { "viewProperties": {
            "tabId": "186",
            "entity": "Order",
            "dataSource": {
                "dataURL": "/ws/datasource/Order",
                "fields": [
                    "id",
                    { "name": "x", "type": "_id_BOGUS" },
                    { "name": "y", "type": "_id_19" }
                ]
            },
            "fields": [{ "name": "x", "type": "_id_19" }]
        }}
    });
    let diags = Diagnostics::new();
    let spec = SpecNormalizer::with_global_registry(&diags)
        .normalize(&raw)
        .unwrap();

    assert_eq!(diags.count(DiagnosticKind::UnresolvedReferenceType), 1);
    let entries = diags.entries();
    assert_eq!(entries[0].subject, "_id_BOGUS");
    let columns = &spec.root.data_source.as_ref().unwrap().fields;
    assert_eq!(columns[1].reference_type.as_deref(), Some("_id_BOGUS"));
}
