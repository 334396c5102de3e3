//! Read-only walk over the branch tree the model emits while generating a
//! workflow, before normalization flattens it.

use serde_json::{Map, Value};

/// Deeper trees are treated as malformed and not searched further.
pub const MAX_BRANCH_DEPTH: usize = 64;

const PROMPT_LABEL: &str = "prompt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Plain,
    Conditional,
    Switch,
}

/// Borrowed view of one generated node.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> NodeView<'a> {
    pub fn new(value: &'a Value) -> Option<Self> {
        value.as_object().map(|fields| Self { fields })
    }

    pub fn name(&self) -> &'a str {
        self.fields.get("name").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn kind(&self) -> NodeKind {
        if self.fields.contains_key("cases") || self.fields.contains_key("default_case") {
            NodeKind::Switch
        } else if self.fields.contains_key("true_branch") || self.fields.contains_key("false_branch") {
            NodeKind::Conditional
        } else {
            NodeKind::Plain
        }
    }

    /// Nested nodes in search order. Conditionals yield the true branch then
    /// the false branch; switches yield the default case then each case's
    /// branch. Fields that do not belong to the node's kind are not walked.
    pub fn children(&self) -> Vec<&'a Value> {
        match self.kind() {
            NodeKind::Plain => Vec::new(),
            NodeKind::Conditional => self.branches(&["true_branch", "false_branch"]),
            NodeKind::Switch => {
                let mut children = self.branches(&["default_case"]);
                if let Some(Value::Array(cases)) = self.fields.get("cases") {
                    for case in cases {
                        if let Some(Value::Array(branch)) = case.get("branch") {
                            children.extend(branch);
                        }
                    }
                }
                children
            }
        }
    }

    fn branches(&self, fields: &[&str]) -> Vec<&'a Value> {
        fields
            .iter()
            .filter_map(|field| self.fields.get(*field)?.as_array())
            .flatten()
            .collect()
    }

    /// Value of the first UI component whose label matches `label`
    /// case-insensitively. Blank values count as absent.
    pub fn ui_value(&self, label: &str) -> Option<&'a str> {
        self.fields
            .get("ui")?
            .as_array()?
            .iter()
            .filter(|component| {
                component
                    .get("label")
                    .and_then(Value::as_str)
                    .is_some_and(|l| l.eq_ignore_ascii_case(label))
            })
            .find_map(|component| component.get("value").and_then(Value::as_str))
            .filter(|value| !value.trim().is_empty())
    }
}

/// Depth-first, pre-order search of a generated workflow for the instruction
/// text attached to a node as a "Prompt" UI component.
pub fn find_embedded_prompt(graph: &Value) -> Option<String> {
    let nodes = graph.get("nodes")?.as_array()?;
    search(nodes.iter(), 0).map(str::to_owned)
}

fn search<'a>(nodes: impl IntoIterator<Item = &'a Value>, depth: usize) -> Option<&'a str> {
    if depth > MAX_BRANCH_DEPTH {
        log::warn!("Branch tree deeper than {MAX_BRANCH_DEPTH} levels; search truncated");
        return None;
    }

    for node in nodes {
        let Some(view) = NodeView::new(node) else {
            continue;
        };
        log::trace!("Visiting node '{}' at depth {depth}", view.name());
        if let Some(prompt) = view.ui_value(PROMPT_LABEL) {
            return Some(prompt);
        }
        if let Some(prompt) = search(view.children(), depth + 1) {
            return Some(prompt);
        }
    }

    None
}
