use proptest::prelude::*;
use serde_json::{json, Value};
use tabspec_model::{to_raw, Diagnostics, SpecNormalizer};

const CODES: [&str; 10] = [
    "_id_10", "_id_11", "_id_12", "_id_15", "_id_19", "_id_20", "_id_30", "_id_800008",
    "_id_800060", "_id_UNKNOWN",
];

fn field() -> impl Strategy<Value = Value> {
    (
        "[a-z][a-zA-Z0-9]{0,8}",
        prop::sample::select(CODES.to_vec()),
        any::<bool>(),
        any::<bool>(),
        proptest::option::of(0i64..50),
        proptest::option::of("[A-Z][A-Za-z_]{0,10}"),
    )
        .prop_map(|(name, code, required, additional, sort, column)| {
            let mut raw = json!({ "name": name, "type": code, "required": required });
            if additional {
                raw["additional"] = json!(true);
            }
            if let Some(sort) = sort {
                raw["gridProps"] = json!({ "sort": sort });
            }
            if let Some(column) = column {
                raw["columnName"] = json!(column);
            }
            raw
        })
}

fn tab(depth: u32) -> BoxedStrategy<Value> {
    let children = if depth == 0 {
        Just(Vec::new()).boxed()
    } else {
        prop::collection::vec(tab(depth - 1), 0..3).boxed()
    };
    (
        "[0-9]{1,4}",
        "[A-Z][a-zA-Z]{0,8}",
        prop::collection::vec(field(), 0..8),
        children,
    )
        .prop_map(|(tab_id, entity, fields, children)| {
            let children: Vec<Value> = children
                .into_iter()
                .map(|mut child| {
                    child["parentProperty"] = json!("parentLink");
                    if let Some(fields) = child["fields"].as_array_mut() {
                        fields.push(json!({
                            "name": "parentLink", "type": "_id_19", "targetEntity": entity
                        }));
                    }
                    child
                })
                .collect();
            json!({
                "tabId": tab_id,
                "entity": entity,
                "fields": fields,
                "createViewStructure": children,
            })
        })
        .boxed()
}

proptest! {
    #[test]
    fn prop_normalize_serialize_round_trip(root in tab(2)) {
        let raw = json!({ "window": { "viewProperties": root } });
        let diags = Diagnostics::new();
        let normalizer = SpecNormalizer::with_global_registry(&diags);

        let first = normalizer.normalize(&raw).unwrap();
        let second = normalizer.normalize(&to_raw(&first)).unwrap();

        prop_assert_eq!(&first, &second);

        let names = |spec: &tabspec_model::WindowSpec| -> Vec<(String, Vec<(String, String)>)> {
            spec.tabs()
                .iter()
                .map(|t| {
                    (
                        t.tab_id.clone(),
                        t.fields
                            .iter()
                            .map(|f| (f.name.clone(), f.reference_type.clone()))
                            .collect(),
                    )
                })
                .collect()
        };
        prop_assert_eq!(names(&first), names(&second));
    }
}
