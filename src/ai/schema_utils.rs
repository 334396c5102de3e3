use schemars::{schema_for, JsonSchema};
use serde_json::{json, Map, Value};

const MAX_DEPTH: usize = 20;
const MAX_REF_HOPS: usize = 10;

/// Formats Gemini accepts; anything else (`uint8`, `uint`, ...) is dropped.
const GEMINI_FORMATS: [&str; 5] = ["float", "double", "int32", "int64", "date-time"];

/// Builds a Gemini `responseSchema` for `T`.
pub fn response_schema<T: JsonSchema>() -> serde_json::Result<Value> {
    clean_schema(serde_json::to_value(schema_for!(T))?)
}

/// Rewrites a draft-07 schema into the subset Gemini's strict mode accepts:
/// references are inlined, metadata keys removed and `["T", "null"]`
/// unions turned into `nullable`.
pub fn clean_schema(mut root: Value) -> serde_json::Result<Value> {
    let definitions = root
        .get("definitions")
        .or_else(|| root.get("$defs"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    clean_node(&mut root, &definitions, 0);

    if let Value::Object(map) = &mut root {
        for key in ["$schema", "title", "definitions", "$defs", "$id"] {
            map.remove(key);
        }
    }

    Ok(root)
}

fn clean_node(node: &mut Value, definitions: &Map<String, Value>, depth: usize) {
    if depth > MAX_DEPTH {
        *node = json!({ "type": "object", "nullable": true });
        return;
    }

    inline_refs(node, definitions);

    // schemars emits `true` for "any value"
    if let Value::Bool(allow_all) = *node {
        *node = if allow_all {
            json!({ "type": "string", "nullable": true })
        } else {
            json!({ "not": {} })
        };
    }

    match node {
        Value::Object(map) => {
            for key in [
                "$ref",
                "additionalProperties",
                "$schema",
                "$id",
                "title",
                "default",
                "examples",
            ] {
                map.remove(key);
            }

            collapse_type_union(map);

            if map
                .get("format")
                .and_then(Value::as_str)
                .is_some_and(|f| !GEMINI_FORMATS.contains(&f))
            {
                map.remove("format");
            }

            if let Some(Value::Object(props)) = map.get_mut("properties") {
                for child in props.values_mut() {
                    clean_node(child, definitions, depth + 1);
                }
            }

            if let Some(items) = map.get_mut("items") {
                clean_node(items, definitions, depth + 1);
            }

            for key in ["allOf", "anyOf", "oneOf"] {
                if let Some(Value::Array(branches)) = map.get_mut(key) {
                    for branch in branches.iter_mut() {
                        clean_node(branch, definitions, depth + 1);
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                clean_node(item, definitions, depth + 1);
            }
        }
        _ => {}
    }
}

fn inline_refs(node: &mut Value, definitions: &Map<String, Value>) {
    for _ in 0..MAX_REF_HOPS {
        let target = match node {
            Value::Object(map) => map.get("$ref").and_then(Value::as_str).map(str::to_owned),
            _ => None,
        };
        let Some(target) = target else {
            return;
        };

        let name = target.rsplit('/').next().unwrap_or_default();
        match definitions.get(name) {
            Some(definition) => *node = definition.clone(),
            None => {
                *node = json!({ "type": "object", "description": "Unresolvable reference" });
                return;
            }
        }
    }
}

fn collapse_type_union(map: &mut Map<String, Value>) {
    let Some(Value::Array(types)) = map.get("type") else {
        return;
    };
    let null = json!("null");

    let concrete = types.iter().find(|t| **t != null).cloned();
    let nullable = types.contains(&null);

    match concrete {
        Some(concrete) => {
            map.insert("type".into(), concrete);
            if nullable {
                map.insert("nullable".into(), json!(true));
            }
        }
        None => {
            map.insert("type".into(), json!("string"));
            map.insert("nullable".into(), json!(true));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::{Evaluation, PromptAnalysis, StressTestBatch};

    fn contains_key(value: &Value, key: &str) -> bool {
        match value {
            Value::Object(map) => map.contains_key(key) || map.values().any(|v| contains_key(v, key)),
            Value::Array(items) => items.iter().any(|v| contains_key(v, key)),
            _ => false,
        }
    }

    #[test]
    fn analysis_schema_is_inlined() {
        let schema = response_schema::<PromptAnalysis>().unwrap();

        assert!(!contains_key(&schema, "$ref"));
        assert!(!contains_key(&schema, "definitions"));
        assert!(!contains_key(&schema, "$schema"));
        assert_eq!(
            schema["properties"]["sections"]["items"]["properties"]["score"]["type"],
            "integer"
        );
        assert!(schema["properties"]["overallScore"].get("format").is_none());
    }

    #[test]
    fn stress_test_schema_keeps_wire_names() {
        let schema = response_schema::<StressTestBatch>().unwrap();
        let item = &schema["properties"]["stress_tests"]["items"]["properties"];
        assert!(item.get("pergunta_capciosa").is_some());
        assert!(item.get("resposta_ideal").is_some());
    }

    #[test]
    fn evaluation_schema_is_flat_object() {
        let schema = response_schema::<Evaluation>().unwrap();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["score"]["type"], "integer");
    }

    #[test]
    fn nullable_unions_collapse() {
        let cleaned = clean_schema(json!({
            "type": "object",
            "properties": { "note": { "type": ["string", "null"] } }
        }))
        .unwrap();
        assert_eq!(cleaned["properties"]["note"]["type"], "string");
        assert_eq!(cleaned["properties"]["note"]["nullable"], true);
    }

    #[test]
    fn unresolvable_refs_degrade_to_object() {
        let cleaned = clean_schema(json!({ "$ref": "#/definitions/Missing" })).unwrap();
        assert_eq!(cleaned["type"], "object");
    }
}
