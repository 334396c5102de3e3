use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A workflow document in the shape the automation tool imports.
///
/// Only the fields the normalizer repairs are typed; anything else the model
/// emitted (`pinData`, custom keys, ...) rides along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowGraph {
    pub name: String,
    pub nodes: Vec<WorkflowNode>,
    /// Source node name -> outgoing lanes.
    pub connections: IndexMap<String, NodeConnections>,
    pub active: bool,
    pub settings: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tags: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub type_version: Number,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    pub parameters: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_on_fail: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for WorkflowNode {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            node_type: String::new(),
            type_version: Number::from(1),
            position: None,
            parameters: Map::new(),
            webhook_id: None,
            retry_on_fail: None,
            extra: Map::new(),
        }
    }
}

/// Outgoing lanes of one node. Lane `i` feeds from output slot `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConnections {
    pub main: Vec<Vec<ConnectionEntry>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub node: String,
    #[serde(rename = "type", default = "default_channel")]
    pub kind: String,
    #[serde(default)]
    pub index: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub(crate) fn default_channel() -> String {
    "main".into()
}
