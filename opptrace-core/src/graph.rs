//! Script graph construction
//!
//! Builds a tree of config nodes for one run and marks which of them the
//! trace shows as executed. Node paths use the same addressing as trace
//! keys, so every node path resolves against the run's config.
//!
//! ```text
//! trigger/0            ●
//! condition/0          ●
//! action/0  choose     ●
//! ├─ action/0/choose/0 ●
//! │  ├─ .../conditions/0  ●
//! │  └─ .../sequence/0    ●
//! └─ action/0/default     ○
//! ```

use std::collections::HashSet;

use serde_json::Value;

use crate::error::Result;
use crate::path::{TracePath, CONDITION, TRIGGER};
use crate::resolve::{resolve_path, try_resolve};
use crate::types::{AutomationTraceExtended, NodeKind};

/// One config node in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub path: String,
    pub kind: NodeKind,
    /// The trace has at least one step for this path
    pub executed: bool,
    /// Number of steps recorded for this exact path
    pub step_count: usize,
    /// First error recorded for this path
    pub error: Option<String>,
    pub children: Vec<GraphNode>,
}

impl GraphNode {
    fn visit<'a>(&'a self, out: &mut Vec<&'a GraphNode>) {
        out.push(self);
        for child in &self.children {
            child.visit(out);
        }
    }
}

/// Graph of one run's config
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptGraph {
    pub triggers: Vec<GraphNode>,
    pub conditions: Vec<GraphNode>,
    pub actions: Vec<GraphNode>,
    /// Trace keys that resolve but are not graph nodes (e.g. a bare `trigger`)
    pub container_paths: Vec<String>,
}

impl ScriptGraph {
    /// Build the graph for a run.
    ///
    /// Fails if any trace key does not resolve against the run's config.
    pub fn build(trace: &AutomationTraceExtended) -> Result<Self> {
        trace.resolve_all()?;

        let builder = Builder { trace };
        let triggers = builder.walk_list(&TracePath::key(TRIGGER))?;
        let conditions = builder.walk_list(&TracePath::key(CONDITION))?;
        let actions = builder.walk_list(&TracePath::key(trace.summary.domain.action_key()))?;

        let mut graph = Self {
            triggers,
            conditions,
            actions,
            container_paths: Vec::new(),
        };

        let node_paths: HashSet<&str> = graph.nodes().iter().map(|n| n.path.as_str()).collect();
        let container_paths: Vec<String> = trace
            .trace
            .keys()
            .filter(|key| !node_paths.contains(key.as_str()))
            .cloned()
            .collect();
        if !container_paths.is_empty() {
            tracing::debug!(
                run_id = %trace.run_id(),
                paths = ?container_paths,
                "Trace keys without a graph node"
            );
        }
        graph.container_paths = container_paths;

        Ok(graph)
    }

    /// Every node, depth first, triggers then conditions then actions.
    pub fn nodes(&self) -> Vec<&GraphNode> {
        let mut out = Vec::new();
        for node in self
            .triggers
            .iter()
            .chain(&self.conditions)
            .chain(&self.actions)
        {
            node.visit(&mut out);
        }
        out
    }

    pub fn node(&self, path: &str) -> Option<&GraphNode> {
        self.nodes().into_iter().find(|node| node.path == path)
    }

    /// Paths of executed nodes, depth first.
    pub fn executed_paths(&self) -> Vec<&str> {
        self.nodes()
            .into_iter()
            .filter(|node| node.executed)
            .map(|node| node.path.as_str())
            .collect()
    }

    /// Indented text rendering, one node per line.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for node in self
            .triggers
            .iter()
            .chain(&self.conditions)
            .chain(&self.actions)
        {
            render_node(node, 0, &mut out);
        }
        out
    }
}

fn render_node(node: &GraphNode, depth: usize, out: &mut String) {
    let marker = if node.error.is_some() {
        '✖'
    } else if node.executed {
        '●'
    } else {
        '○'
    };
    out.push_str(&"  ".repeat(depth));
    out.push(marker);
    out.push(' ');
    out.push_str(&node.path);
    out.push_str(&format!(" [{}]", node.kind.as_str()));
    if node.step_count > 1 {
        out.push_str(&format!(" x{}", node.step_count));
    }
    out.push('\n');
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}

struct Builder<'a> {
    trace: &'a AutomationTraceExtended,
}

impl Builder<'_> {
    /// Nodes for the list (or single object) at `path`.
    fn walk_list(&self, path: &TracePath) -> Result<Vec<GraphNode>> {
        match try_resolve(&self.trace.config, path) {
            Some(Value::Array(items)) => (0..items.len())
                .map(|i| self.node(path.child_index(i)))
                .collect(),
            // A single object stands in for a one-element list
            Some(Value::Object(_)) => Ok(vec![self.node(path.child_index(0))?]),
            _ => Ok(Vec::new()),
        }
    }

    fn node(&self, path: TracePath) -> Result<GraphNode> {
        let fragment = resolve_path(&self.trace.config, &path)?;
        let kind = NodeKind::classify(&path, fragment);
        let children = self.children(&path, kind, fragment)?;
        Ok(self.finish(path, kind, children))
    }

    fn finish(&self, path: TracePath, kind: NodeKind, children: Vec<GraphNode>) -> GraphNode {
        let key = path.to_string();
        let steps = self.trace.steps_for(&key);
        GraphNode {
            error: steps.iter().find_map(|step| step.error.clone()),
            step_count: steps.len(),
            executed: !steps.is_empty(),
            kind,
            path: key,
            children,
        }
    }

    fn children(&self, path: &TracePath, kind: NodeKind, fragment: &Value) -> Result<Vec<GraphNode>> {
        let nested: &[&[&str]] = match kind {
            NodeKind::Choose => return self.choose_children(path, fragment),
            NodeKind::ChooseOption => &[&["conditions"], &["sequence"]],
            NodeKind::Condition => &[&["conditions"]],
            NodeKind::If => &[&["if"], &["then"], &["else"]],
            NodeKind::Repeat => &[
                &["repeat", "while"],
                &["repeat", "until"],
                &["repeat", "sequence"],
            ],
            NodeKind::Parallel => &[&["parallel"]],
            NodeKind::Sequence => &[&["sequence"]],
            _ => &[],
        };

        let mut children = Vec::new();
        for keys in nested {
            let list_path = keys.iter().fold(path.clone(), |p, key| p.child_key(key));
            children.extend(self.walk_list(&list_path)?);
        }
        Ok(children)
    }

    fn choose_children(&self, path: &TracePath, fragment: &Value) -> Result<Vec<GraphNode>> {
        let mut children = self.walk_list(&path.child_key("choose"))?;

        if fragment.get("default").is_some() {
            let default_path = path.child_key("default");
            let default_children = self.walk_list(&default_path)?;
            let mut default = self.finish(default_path, NodeKind::Sequence, default_children);
            // no steps are recorded for the group itself
            default.executed |= default.children.iter().any(|child| child.executed);
            children.push(default);
        }

        Ok(children)
    }
}
