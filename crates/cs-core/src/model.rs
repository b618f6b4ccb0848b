//! Incoming data model: the logical nodes and edges a caller wants on the
//! canvas, plus the geometry vocabulary shared with layout oracles.
//!
//! Two document shapes are accepted: a flat graph (`nodes` + `edges`) and a
//! nested hierarchy (`children` trees). Both are validated up front so that
//! a malformed document never reaches the canvas.

use crate::error::{SyncError, SyncResult};
use crate::id::NodeId;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Free-form key/value data attached to nodes and widgets.
pub type Metadata = BTreeMap<String, Value>;

// ─── Geometry ────────────────────────────────────────────────────────────

/// Which point of a box its `x`/`y` refer to.
///
/// The canvas itself stores widget centers. Layout oracles declare their own
/// convention and the orchestrators convert at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    #[default]
    TopLeft,
    Center,
}

/// Position and size of a box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Geometry {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Finite coordinates and a strictly positive size.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// The box as an absolute rectangle, interpreting `x`/`y` per `anchor`.
    pub fn rect(&self, anchor: Anchor) -> Rect {
        match anchor {
            Anchor::TopLeft => Rect::new(self.x, self.y, self.x + self.width, self.y + self.height),
            Anchor::Center => {
                let (hw, hh) = (self.width / 2.0, self.height / 2.0);
                Rect::new(self.x - hw, self.y - hh, self.x + hw, self.y + hh)
            }
        }
    }

    /// Re-express the same box under another anchor convention.
    pub fn convert(&self, from: Anchor, to: Anchor) -> Geometry {
        let rect = self.rect(from);
        let origin = match to {
            Anchor::TopLeft => Point::new(rect.x0, rect.y0),
            Anchor::Center => rect.center(),
        };
        Geometry::new(origin.x, origin.y, self.width, self.height)
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

// ─── Nodes & edges ───────────────────────────────────────────────────────

/// A logical entity to be represented by one widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: NodeId,
    pub label: String,
    /// Template name used when a widget has to be created for this node.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl NodeDefinition {
    pub fn new(id: &str, label: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: NodeId::intern(id),
            label: label.into(),
            kind: kind.into(),
            metadata: Metadata::new(),
        }
    }

    /// Fail fast on a node that could never be materialized.
    pub fn validate(&self) -> SyncResult<()> {
        if self.id.as_str().is_empty() || self.label.is_empty() || self.kind.is_empty() {
            return Err(SyncError::invalid_argument("node", self));
        }
        Ok(())
    }
}

/// A directed connection between two logical nodes. Edges have no identity
/// of their own and are never matched against existing connectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl EdgeDefinition {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: NodeId::intern(from),
            to: NodeId::intern(to),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A flat graph document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

impl GraphData {
    /// Parse and validate a graph document. No partial parse is accepted.
    pub fn from_json(text: &str) -> SyncResult<Self> {
        let graph: GraphData =
            serde_json::from_str(text).map_err(|e| SyncError::InvalidGraph(e.to_string()))?;
        graph.validate()?;
        Ok(graph)
    }

    pub fn validate(&self) -> SyncResult<()> {
        for (i, node) in self.nodes.iter().enumerate() {
            if node.id.as_str().is_empty() || node.label.is_empty() || node.kind.is_empty() {
                return Err(SyncError::InvalidGraph(format!("node {i} is incomplete: {node:?}")));
            }
        }
        Ok(())
    }
}

// ─── Hierarchy ───────────────────────────────────────────────────────────

/// One node of a nested hierarchy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    #[serde(default)]
    pub id: Option<NodeId>,
    pub label: String,
    #[serde(rename = "type", default = "default_hierarchy_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    #[serde(default)]
    pub children: Vec<HierarchyNode>,
}

fn default_hierarchy_type() -> String {
    "Rectangle".to_string()
}

impl HierarchyNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
            kind: default_hierarchy_type(),
            metadata: Metadata::new(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<HierarchyNode>) -> Self {
        self.children = children;
        self
    }
}

/// Parse a hierarchy document: either a single root object or an array of roots.
pub fn parse_hierarchy(text: &str) -> SyncResult<Vec<HierarchyNode>> {
    let value: Value = serde_json::from_str(text).map_err(|e| SyncError::InvalidFile(e.to_string()))?;
    let roots = match value {
        Value::Array(_) => serde_json::from_value::<Vec<HierarchyNode>>(value),
        Value::Object(_) => serde_json::from_value::<HierarchyNode>(value).map(|root| vec![root]),
        other => return Err(SyncError::InvalidFile(format!("expected object or array, got {other}"))),
    }
    .map_err(|e| SyncError::InvalidFile(e.to_string()))?;
    Ok(roots)
}

/// Flatten hierarchy trees into nodes plus parent → child edges.
///
/// Nodes without an explicit id get a path id (`"0"`, `"0.2"`, `"0.2.1"`).
pub fn flatten_hierarchy(roots: &[HierarchyNode]) -> SyncResult<GraphData> {
    let mut graph = GraphData::default();
    for (i, root) in roots.iter().enumerate() {
        flatten_into(root, i.to_string(), None, &mut graph)?;
    }
    Ok(graph)
}

fn flatten_into(
    node: &HierarchyNode,
    path: String,
    parent: Option<NodeId>,
    graph: &mut GraphData,
) -> SyncResult<()> {
    if node.label.is_empty() || node.kind.is_empty() {
        return Err(SyncError::InvalidFile(format!("node at {path} is incomplete: {node:?}")));
    }
    let id = node.id.unwrap_or_else(|| NodeId::intern(&path));
    graph.nodes.push(NodeDefinition {
        id,
        label: node.label.clone(),
        kind: node.kind.clone(),
        metadata: node.metadata.clone(),
    });
    if let Some(parent) = parent {
        graph.edges.push(EdgeDefinition {
            from: parent,
            to: id,
            label: None,
        });
    }
    for (i, child) in node.children.iter().enumerate() {
        flatten_into(child, format!("{path}.{i}"), Some(id), graph)?;
    }
    Ok(())
}
