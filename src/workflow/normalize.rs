//! Repairs a model-generated workflow into a graph the automation tool will
//! import.
//!
//! The input is untrusted: any field may be missing, mistyped or point at a
//! node that does not exist. [`normalize_workflow`] never fails. Fragments it
//! cannot repair are dropped, and every change is reported as a [`Repair`]
//! so callers can log what the model got wrong. The output always satisfies:
//!
//! - every connection source and target names a node in `nodes`;
//! - `active` is a boolean, `settings` an object, `tags` an array;
//! - no node carries generation-only branch fields;
//! - running the normalizer again changes nothing.

use super::graph::{default_channel, ConnectionEntry, NodeConnections, WorkflowGraph, WorkflowNode};
use indexmap::IndexMap;
use serde_json::{json, Map, Number, Value};
use std::collections::HashSet;
use std::fmt;

/// Fields the model uses to describe branches while generating. They are not
/// part of the import format.
pub const GENERATION_ONLY_FIELDS: [&str; 5] =
    ["ui", "true_branch", "false_branch", "default_case", "cases"];

/// Parameter holding a field-name -> list-of-values map.
const PROPERTY_VALUES_KEY: &str = "propertyValues";

const WEBHOOK_DEFAULTS: [(&str, &str); 3] = [
    ("responseMode", "responseNode"),
    ("httpMethod", "POST"),
    ("path", "webhook"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Repair {
    NodeDropped { index: usize },
    TypeVersionCoerced { node: String, from: Option<Value> },
    GenerationFieldStripped { node: String, field: &'static str },
    ParametersReset { node: String },
    ParameterDropped { node: String, key: String },
    PropertyValuesWrapped { node: String, key: String },
    SetNodeRewritten { node: String },
    WebhookDefaulted { node: String, field: &'static str },
    ConnectionSourceDropped { source: String },
    ConnectionEntryDropped { source: String, lane: usize },
    GraphFieldDefaulted { field: &'static str },
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeDropped { index } => write!(f, "dropped non-object node at index {index}"),
            Self::TypeVersionCoerced { node, from } => match from {
                Some(from) => write!(f, "'{node}': typeVersion {from} coerced"),
                None => write!(f, "'{node}': missing typeVersion set to 1"),
            },
            Self::GenerationFieldStripped { node, field } => write!(f, "'{node}': stripped '{field}'"),
            Self::ParametersReset { node } => write!(f, "'{node}': parameters reset to {{}}"),
            Self::ParameterDropped { node, key } => write!(f, "'{node}': dropped null parameter '{key}'"),
            Self::PropertyValuesWrapped { node, key } => {
                write!(f, "'{node}': property value '{key}' wrapped in a list")
            }
            Self::SetNodeRewritten { node } => write!(f, "'{node}': assignments rewritten as values"),
            Self::WebhookDefaulted { node, field } => write!(f, "'{node}': webhook '{field}' defaulted"),
            Self::ConnectionSourceDropped { source } => write!(f, "dropped connections from '{source}'"),
            Self::ConnectionEntryDropped { source, lane } => {
                write!(f, "dropped invalid entry in '{source}' lane {lane}")
            }
            Self::GraphFieldDefaulted { field } => write!(f, "graph '{field}' defaulted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub graph: WorkflowGraph,
    pub repairs: Vec<Repair>,
}

pub fn normalize_workflow(raw: &Value) -> Normalized {
    let mut repairs = Vec::new();

    let mut fields = match raw {
        Value::Object(map) => map.clone(),
        _ => {
            repairs.push(Repair::GraphFieldDefaulted { field: "graph" });
            Map::new()
        }
    };

    let mut nodes = Vec::new();
    match fields.remove("nodes") {
        Some(Value::Array(items)) => {
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(node) => nodes.push(normalize_node(node, &mut repairs)),
                    _ => repairs.push(Repair::NodeDropped { index }),
                }
            }
        }
        _ => repairs.push(Repair::GraphFieldDefaulted { field: "nodes" }),
    }

    let valid_names: HashSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    let connections = normalize_connections(fields.remove("connections"), &valid_names, &mut repairs);

    let active = match fields.remove("active") {
        Some(Value::Bool(active)) => active,
        _ => {
            repairs.push(Repair::GraphFieldDefaulted { field: "active" });
            false
        }
    };

    let settings = match fields.remove("settings") {
        Some(Value::Object(settings)) => settings,
        _ => {
            repairs.push(Repair::GraphFieldDefaulted { field: "settings" });
            let mut settings = Map::new();
            settings.insert("executionOrder".into(), json!("v1"));
            settings
        }
    };

    let tags = match fields.remove("tags") {
        Some(Value::Array(tags)) => tags,
        _ => {
            repairs.push(Repair::GraphFieldDefaulted { field: "tags" });
            Vec::new()
        }
    };

    let graph = WorkflowGraph {
        name: take_text(&mut fields, "name"),
        nodes,
        connections,
        active,
        settings,
        version_id: take_if(&mut fields, "versionId", |v| v.as_str().map(String::from)),
        meta: take_if(&mut fields, "meta", |v| v.as_object().cloned()),
        id: take_if(&mut fields, "id", |v| v.as_str().map(String::from)),
        tags,
        extra: fields,
    };

    Normalized { graph, repairs }
}

fn normalize_node(mut fields: Map<String, Value>, repairs: &mut Vec<Repair>) -> WorkflowNode {
    let name = take_text(&mut fields, "name");

    for field in GENERATION_ONLY_FIELDS {
        if fields.remove(field).is_some() {
            repairs.push(Repair::GenerationFieldStripped {
                node: name.clone(),
                field,
            });
        }
    }

    let node_type = take_text(&mut fields, "type");
    let type_version = coerce_type_version(fields.remove("typeVersion"), &name, repairs);

    let mut parameters = match fields.remove("parameters") {
        Some(Value::Object(parameters)) => parameters,
        _ => {
            repairs.push(Repair::ParametersReset { node: name.clone() });
            Map::new()
        }
    };

    wrap_property_values(&mut parameters, &name, repairs);
    drop_null_parameters(&mut parameters, &name, repairs);

    if node_type.ends_with(".set") {
        if let Some(rewritten) = rewrite_set_parameters(&parameters) {
            repairs.push(Repair::SetNodeRewritten { node: name.clone() });
            parameters = rewritten;
        }
    }

    if node_type.ends_with(".webhook") {
        apply_webhook_defaults(&mut parameters, &name, repairs);
    }

    WorkflowNode {
        id: take_if(&mut fields, "id", |v| v.as_str().map(String::from)),
        position: fields.remove("position").filter(|p| !p.is_null()),
        webhook_id: take_if(&mut fields, "webhookId", |v| v.as_str().map(String::from)),
        retry_on_fail: take_if(&mut fields, "retryOnFail", Value::as_bool),
        name,
        node_type,
        type_version,
        parameters,
        extra: fields,
    }
}

/// Numbers pass through; numeric strings are parsed; anything else is `1`.
fn coerce_type_version(raw: Option<Value>, node: &str, repairs: &mut Vec<Repair>) -> Number {
    if let Some(Value::Number(n)) = &raw {
        return n.clone();
    }

    let parsed = match &raw {
        Some(Value::String(s)) => parse_number(s.trim()),
        _ => None,
    };

    repairs.push(Repair::TypeVersionCoerced {
        node: node.to_string(),
        from: raw,
    });
    parsed.unwrap_or_else(|| Number::from(1))
}

fn parse_number(text: &str) -> Option<Number> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Number::from(int));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

fn wrap_property_values(parameters: &mut Map<String, Value>, node: &str, repairs: &mut Vec<Repair>) {
    let Some(Value::Object(properties)) = parameters.get_mut(PROPERTY_VALUES_KEY) else {
        return;
    };

    for (key, value) in properties.iter_mut() {
        let wrapped = match value {
            Value::Array(_) => continue,
            Value::Null => Vec::new(),
            _ => vec![value.take()],
        };
        *value = Value::Array(wrapped);
        repairs.push(Repair::PropertyValuesWrapped {
            node: node.to_string(),
            key: key.clone(),
        });
    }
}

/// Removes null parameters, and null fields of object parameters one level
/// down. Arrays are left alone.
fn drop_null_parameters(parameters: &mut Map<String, Value>, node: &str, repairs: &mut Vec<Repair>) {
    parameters.retain(|key, value| {
        if value.is_null() {
            repairs.push(Repair::ParameterDropped {
                node: node.to_string(),
                key: key.clone(),
            });
            return false;
        }
        if let Value::Object(inner) = value {
            inner.retain(|sub_key, sub_value| {
                if sub_value.is_null() {
                    repairs.push(Repair::ParameterDropped {
                        node: node.to_string(),
                        key: format!("{key}.{sub_key}"),
                    });
                    return false;
                }
                true
            });
        }
        true
    });
}

/// Converts the `assignments` shape of a set node into the older `values`
/// shape. Returns `None` when the node is already in `values` form or has no
/// assignments list to convert.
fn rewrite_set_parameters(parameters: &Map<String, Value>) -> Option<Map<String, Value>> {
    if parameters.get("values").is_some_and(is_truthy) {
        return None;
    }

    let assignments = match parameters.get("assignments")? {
        Value::Object(wrapper) => wrapper.get("assignments")?.as_array()?,
        Value::Array(list) => list,
        _ => return None,
    };

    let string_values: Vec<Value> = assignments
        .iter()
        .filter_map(|assignment| {
            let assignment = assignment.as_object()?;
            let name = assignment.get("name").filter(|n| is_truthy(n))?;
            let value = match assignment.get("value") {
                None | Some(Value::Null) => json!(""),
                Some(value) => value.clone(),
            };
            Some(json!({ "name": name, "value": value }))
        })
        .collect();

    let include_other_fields = parameters.get("includeOtherFields") == Some(&Value::Bool(true));

    let mut rewritten = Map::new();
    rewritten.insert("keepOnlySet".into(), Value::Bool(!include_other_fields));
    rewritten.insert("values".into(), json!({ "string": string_values }));
    rewritten.insert("options".into(), json!({}));
    Some(rewritten)
}

fn apply_webhook_defaults(parameters: &mut Map<String, Value>, node: &str, repairs: &mut Vec<Repair>) {
    if !matches!(parameters.get("options"), Some(Value::Object(_))) {
        parameters.insert("options".into(), json!({}));
        repairs.push(Repair::WebhookDefaulted {
            node: node.to_string(),
            field: "options",
        });
    }

    for (field, default) in WEBHOOK_DEFAULTS {
        if !parameters.get(field).is_some_and(is_truthy) {
            parameters.insert(field.into(), json!(default));
            repairs.push(Repair::WebhookDefaulted {
                node: node.to_string(),
                field,
            });
        }
    }
}

fn normalize_connections(
    raw: Option<Value>,
    valid_names: &HashSet<&str>,
    repairs: &mut Vec<Repair>,
) -> IndexMap<String, NodeConnections> {
    let mut connections = IndexMap::new();

    let sources = match raw {
        Some(Value::Object(sources)) => sources,
        None => return connections,
        Some(_) => {
            repairs.push(Repair::GraphFieldDefaulted { field: "connections" });
            return connections;
        }
    };

    for (source, outputs) in sources {
        if !valid_names.contains(source.as_str()) {
            repairs.push(Repair::ConnectionSourceDropped { source });
            continue;
        }

        let lanes = match outputs {
            Value::Object(mut outputs) => match outputs.remove("main") {
                Some(Value::Array(lanes)) => lanes,
                _ => {
                    repairs.push(Repair::ConnectionSourceDropped { source });
                    continue;
                }
            },
            _ => {
                repairs.push(Repair::ConnectionSourceDropped { source });
                continue;
            }
        };

        let mut main = Vec::with_capacity(lanes.len());
        for (lane_index, lane) in lanes.into_iter().enumerate() {
            let mut kept = Vec::new();
            match lane {
                Value::Array(entries) => {
                    for entry in entries {
                        match connection_entry(entry, valid_names) {
                            Some(entry) => kept.push(entry),
                            None => repairs.push(Repair::ConnectionEntryDropped {
                                source: source.clone(),
                                lane: lane_index,
                            }),
                        }
                    }
                }
                _ => repairs.push(Repair::ConnectionEntryDropped {
                    source: source.clone(),
                    lane: lane_index,
                }),
            }
            main.push(kept);
        }

        connections.insert(source, NodeConnections { main });
    }

    connections
}

/// Keeps an entry only if it is an object naming an existing target node.
fn connection_entry(raw: Value, valid_names: &HashSet<&str>) -> Option<ConnectionEntry> {
    let Value::Object(mut fields) = raw else {
        return None;
    };
    let node = match fields.remove("node") {
        Some(Value::String(node)) if valid_names.contains(node.as_str()) => node,
        _ => return None,
    };
    let kind = match fields.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => default_channel(),
    };
    let index = fields
        .remove("index")
        .and_then(|i| i.as_u64())
        .and_then(|i| u32::try_from(i).ok())
        .unwrap_or(0);

    Some(ConnectionEntry {
        node,
        kind,
        index,
        extra: fields,
    })
}

/// Strings pass through, other scalars are rendered, anything else is empty.
fn take_text(fields: &mut Map<String, Value>, key: &str) -> String {
    match fields.remove(key) {
        Some(Value::String(text)) => text,
        Some(scalar @ (Value::Number(_) | Value::Bool(_))) => scalar.to_string(),
        _ => String::new(),
    }
}

/// Moves `key` out of `fields` only if `convert` accepts it; otherwise the
/// value stays behind as an untyped extra.
fn take_if<T>(fields: &mut Map<String, Value>, key: &str, convert: impl Fn(&Value) -> Option<T>) -> Option<T> {
    let converted = fields.get(key).and_then(convert)?;
    fields.remove(key);
    Some(converted)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
