//! Layout oracles.
//!
//! The orchestrators treat layout as an opaque service: they hand over the
//! nodes that need positions (some of them pinned) and the declared edges,
//! and get back absolute boxes per node plus anchor points per edge. Each
//! oracle declares its coordinate `Anchor`.
//!
//! Two simple oracles ship with the crate: `LayeredLayout` for flat graphs
//! (left-to-right ranks, top-left anchored) and `TreeLayout` for
//! hierarchies (top-down tidy tree, center anchored).

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::id::NodeId;
use crate::model::{Anchor, EdgeDefinition, Geometry};
use async_trait::async_trait;
use kurbo::Point;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A node handed to the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: NodeId,
    pub width: f64,
    pub height: f64,
    /// Current position (in the oracle's anchor) for pinned nodes.
    pub fixed: Option<Point>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutGraph {
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<EdgeDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutOptions {
    pub node_gap: f64,
    pub rank_gap: f64,
    pub origin: Point,
}

impl LayoutOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            node_gap: config.node_gap,
            rank_gap: config.rank_gap,
            origin: Point::ZERO,
        }
    }
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Absolute anchor points for one edge, in the oracle's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeHint {
    pub start_point: Point,
    pub end_point: Point,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutResult {
    pub nodes: HashMap<NodeId, Geometry>,
    /// One entry per input edge; `None` when an endpoint was not laid out.
    pub edges: Vec<Option<EdgeHint>>,
}

#[async_trait]
pub trait LayoutOracle: Send + Sync {
    /// Coordinate convention of the boxes this oracle returns.
    fn anchor(&self) -> Anchor {
        Anchor::TopLeft
    }

    async fn layout_graph(&self, graph: &LayoutGraph, options: &LayoutOptions) -> SyncResult<LayoutResult>;
}

fn edge_hints(
    edges: &[EdgeDefinition],
    nodes: &HashMap<NodeId, Geometry>,
    anchor: Anchor,
    attach: impl Fn(kurbo::Rect, kurbo::Rect) -> EdgeHint,
) -> Vec<Option<EdgeHint>> {
    edges
        .iter()
        .map(|e| {
            let from = nodes.get(&e.from)?.rect(anchor);
            let to = nodes.get(&e.to)?.rect(anchor);
            Some(attach(from, to))
        })
        .collect()
}

// ─── Layered (flat graphs) ───────────────────────────────────────────────

/// Left-to-right layering by longest path from the sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayeredLayout;

impl LayeredLayout {
    /// Rank of every node. Cycles fall back to declaration order, so each
    /// edge only ever pushes its target further right.
    fn ranks(graph: &LayoutGraph) -> Vec<usize> {
        let mut g: DiGraph<(), ()> = DiGraph::new();
        let mut index: HashMap<NodeId, NodeIndex> = HashMap::new();
        for node in &graph.nodes {
            index.insert(node.id, g.add_node(()));
        }
        for edge in &graph.edges {
            if let (Some(&a), Some(&b)) = (index.get(&edge.from), index.get(&edge.to))
                && a != b
            {
                g.add_edge(a, b, ());
            }
        }

        let order: Vec<NodeIndex> = match toposort(&g, None) {
            Ok(order) => order,
            Err(cycle) => {
                log::debug!("layered layout: cycle at {:?}, using declaration order", cycle.node_id());
                g.node_indices().collect()
            }
        };
        let position: HashMap<NodeIndex, usize> =
            order.iter().enumerate().map(|(i, &n)| (n, i)).collect();

        let mut rank = vec![0usize; graph.nodes.len()];
        for &n in &order {
            for succ in g.neighbors(n) {
                if position[&succ] > position[&n] {
                    rank[succ.index()] = rank[succ.index()].max(rank[n.index()] + 1);
                }
            }
        }
        rank
    }
}

#[async_trait]
impl LayoutOracle for LayeredLayout {
    async fn layout_graph(&self, graph: &LayoutGraph, options: &LayoutOptions) -> SyncResult<LayoutResult> {
        let ranks = Self::ranks(graph);
        let col_width = graph.nodes.iter().map(|n| n.width).fold(0.0, f64::max);
        let row_height = graph.nodes.iter().map(|n| n.height).fold(0.0, f64::max);

        // Free nodes are arranged to the right of anything pinned.
        let pinned_right = graph
            .nodes
            .iter()
            .filter_map(|n| n.fixed.map(|p| p.x + n.width))
            .fold(f64::NEG_INFINITY, f64::max);
        let origin_x = if pinned_right.is_finite() {
            options.origin.x.max(pinned_right + options.rank_gap)
        } else {
            options.origin.x
        };

        let mut slots: HashMap<usize, usize> = HashMap::new();
        let mut nodes = HashMap::with_capacity(graph.nodes.len());
        for (node, &rank) in graph.nodes.iter().zip(&ranks) {
            let geometry = match node.fixed {
                Some(p) => Geometry::new(p.x, p.y, node.width, node.height),
                None => {
                    let slot = slots.entry(rank).or_default();
                    let x = origin_x + rank as f64 * (col_width + options.rank_gap);
                    let y = options.origin.y + *slot as f64 * (row_height + options.node_gap);
                    *slot += 1;
                    Geometry::new(x, y, node.width, node.height)
                }
            };
            nodes.insert(node.id, geometry);
        }

        let edges = edge_hints(&graph.edges, &nodes, Anchor::TopLeft, |from, to| EdgeHint {
            start_point: Point::new(from.x1, from.center().y),
            end_point: Point::new(to.x0, to.center().y),
        });
        Ok(LayoutResult { nodes, edges })
    }
}

// ─── Tree (hierarchies) ──────────────────────────────────────────────────

/// Top-down tidy tree: leaves take consecutive columns, parents are centered
/// over their children. Reports centers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeLayout;

struct TreeWalk<'a> {
    children: HashMap<NodeId, Vec<NodeId>>,
    sizes: HashMap<NodeId, &'a LayoutNode>,
    col_width: f64,
    row_height: f64,
    options: &'a LayoutOptions,
    next_column: f64,
    visited: HashSet<NodeId>,
    out: HashMap<NodeId, Geometry>,
}

impl TreeWalk<'_> {
    /// Place `id` and its subtree; returns the node's center x.
    fn place(&mut self, id: NodeId, depth: usize) -> f64 {
        self.visited.insert(id);
        let kids: Vec<NodeId> = self
            .children
            .get(&id)
            .map(|c| c.iter().copied().filter(|k| !self.visited.contains(k)).collect())
            .unwrap_or_default();

        let cx = if kids.is_empty() {
            let x = self.options.origin.x + self.next_column * (self.col_width + self.options.node_gap);
            self.next_column += 1.0;
            x
        } else {
            let mut xs = Vec::with_capacity(kids.len());
            for kid in kids {
                if !self.visited.contains(&kid) {
                    xs.push(self.place(kid, depth + 1));
                }
            }
            match (xs.first(), xs.last()) {
                (Some(first), Some(last)) => (first + last) / 2.0,
                _ => self.options.origin.x,
            }
        };

        let node = self.sizes[&id];
        let cy = self.options.origin.y + depth as f64 * (self.row_height + self.options.rank_gap);
        let geometry = match node.fixed {
            Some(p) => Geometry::new(p.x, p.y, node.width, node.height),
            None => Geometry::new(cx, cy, node.width, node.height),
        };
        self.out.insert(id, geometry);
        cx
    }
}

#[async_trait]
impl LayoutOracle for TreeLayout {
    fn anchor(&self) -> Anchor {
        Anchor::Center
    }

    async fn layout_graph(&self, graph: &LayoutGraph, options: &LayoutOptions) -> SyncResult<LayoutResult> {
        let sizes: HashMap<NodeId, &LayoutNode> = graph.nodes.iter().map(|n| (n.id, n)).collect();
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut has_parent: HashSet<NodeId> = HashSet::new();
        for edge in &graph.edges {
            if sizes.contains_key(&edge.from) && sizes.contains_key(&edge.to) && edge.from != edge.to {
                children.entry(edge.from).or_default().push(edge.to);
                has_parent.insert(edge.to);
            }
        }

        let mut walk = TreeWalk {
            children,
            col_width: graph.nodes.iter().map(|n| n.width).fold(0.0, f64::max),
            row_height: graph.nodes.iter().map(|n| n.height).fold(0.0, f64::max),
            sizes,
            options,
            next_column: 0.0,
            visited: HashSet::new(),
            out: HashMap::new(),
        };

        let roots: Vec<NodeId> = graph
            .nodes
            .iter()
            .map(|n| n.id)
            .filter(|id| !has_parent.contains(id))
            .collect();
        for root in roots {
            walk.place(root, 0);
        }
        // Nodes only reachable through a cycle.
        for node in &graph.nodes {
            if !walk.visited.contains(&node.id) {
                walk.place(node.id, 0);
            }
        }

        let nodes = walk.out;
        let edges = edge_hints(&graph.edges, &nodes, Anchor::Center, |from, to| EdgeHint {
            start_point: Point::new(from.center().x, from.y1),
            end_point: Point::new(to.center().x, to.y0),
        });
        Ok(LayoutResult { nodes, edges })
    }
}
