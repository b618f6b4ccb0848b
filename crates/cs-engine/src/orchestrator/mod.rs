//! Import orchestration.
//!
//! One call to `process_graph` / `process_hierarchy` is one operation:
//! validate, resolve existing widgets, lay out, materialize, optionally wrap
//! in a frame, then commit. Anything that fails after the first canvas
//! mutation rolls back what this operation created before the error is
//! returned.

mod graph;
mod hierarchy;

pub use graph::GraphProcessor;
pub use hierarchy::HierarchyProcessor;

use crate::board::{Board, NodeOutcome};
use crate::ledger::UndoLedger;
use cs_core::bounds::padded;
use cs_core::{
    Anchor, EdgeDefinition, EdgeHint, Geometry, GraphData, LayoutGraph, LayoutNode, LayoutOptions, LayoutOracle,
    LayoutResult, NodeDefinition, NodeId, Point, Rect, SyncError, SyncResult, Widget, WidgetId,
    bounding_box_from_center, bounding_box_from_top_left, relative_position,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::slice;
use std::str::FromStr;
use std::sync::Arc;

/// Positions closer than this are the same position.
const POSITION_EPSILON: f64 = 1e-6;

// ─── Options & report ────────────────────────────────────────────────────

/// What to do with a node that already has a widget on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingMode {
    /// Leave the widget exactly where it is.
    #[default]
    Ignore,
    /// Lay the widget out again as if it were new.
    Move,
    /// Hand the widget to the layout pinned at its current position; move it
    /// only if the layout places it elsewhere.
    Layout,
}

impl ExistingMode {
    pub const ALL: [ExistingMode; 3] = [ExistingMode::Ignore, ExistingMode::Move, ExistingMode::Layout];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExistingMode::Ignore => "ignore",
            ExistingMode::Move => "move",
            ExistingMode::Layout => "layout",
        }
    }
}

impl fmt::Display for ExistingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExistingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown existing mode '{s}' (expected ignore, move or layout)"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessOptions {
    pub existing_mode: ExistingMode,
    pub create_frame: bool,
    pub frame_title: Option<String>,
}

/// Summary of one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessReport {
    pub created: usize,
    pub reused: usize,
    pub moved: usize,
    pub edges_created: usize,
    pub edges_skipped: usize,
    pub frame: Option<WidgetId>,
}

// ─── Shared pipeline ─────────────────────────────────────────────────────

/// A node together with the widget that already represents it, if any.
type Plan<'a> = Vec<(&'a NodeDefinition, Option<Widget>)>;

pub(crate) struct Orchestrator {
    board: Board,
    ledger: UndoLedger,
    oracle: Arc<dyn LayoutOracle>,
}

impl Orchestrator {
    pub(crate) fn new(board: Board, oracle: Arc<dyn LayoutOracle>) -> Self {
        Self {
            board,
            ledger: UndoLedger::new(),
            oracle,
        }
    }

    pub(crate) fn board(&self) -> &Board {
        &self.board
    }

    pub(crate) fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub(crate) fn ledger(&self) -> &UndoLedger {
        &self.ledger
    }

    pub(crate) async fn undo_last(&mut self) -> SyncResult<usize> {
        self.ledger.undo_last(&mut self.board).await
    }

    pub(crate) async fn run(
        &mut self,
        graph: &GraphData,
        options: &ProcessOptions,
        default_title: &str,
    ) -> SyncResult<ProcessReport> {
        graph.validate()?;
        self.board.reset();
        self.ledger.clear();

        let anchor = self.oracle.anchor();
        let mode = options.existing_mode;

        let mut seen = HashSet::new();
        let mut plan: Plan<'_> = Vec::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            if !seen.insert(node.id) {
                log::debug!("duplicate node {:?} ignored", node.id);
                continue;
            }
            let existing = self.board.resolve_existing(node).await?;
            plan.push((node, existing));
        }

        let input = self.layout_input(&plan, &graph.edges, mode, anchor);
        let layout_options = LayoutOptions::from_config(self.board.config());
        let layout = self.oracle.layout_graph(&input, &layout_options).await?;
        log::debug!("layout placed {} of {} node(s)", layout.nodes.len(), plan.len());

        let mut report = ProcessReport::default();
        let mut originals = Vec::new();
        let (mut batch, mut extent) = match self
            .materialize(plan, &graph.edges, &layout, anchor, mode, &mut report, &mut originals)
            .await
        {
            Ok(staged) => staged,
            Err(err) => return Err(self.roll_back(err).await),
        };

        if options.create_frame
            && let Some(bounds) = extent
        {
            let title = options.frame_title.as_deref().unwrap_or(default_title);
            match self.wrap_in_frame(title, bounds, &mut batch, &mut originals).await {
                Ok(frame) => {
                    report.frame = Some(frame.id);
                    extent = Some(frame.geometry.rect(Anchor::Center));
                    batch.push(frame);
                }
                Err(err) => return Err(self.roll_back(err).await),
            }
        }

        if let Err(err) = self.ledger.sync_or_undo(&mut self.board, &mut batch).await {
            return Err(self.restore(&batch, &originals, err).await);
        }

        if self.board.config().zoom_to_result
            && let Some(bounds) = extent
            && let Err(err) = self.board.zoom_to(bounds).await
        {
            log::warn!("zoom after import failed: {err}");
        }

        log::info!(
            "import committed: {} created, {} reused, {} moved, {} edge(s), {} skipped",
            report.created,
            report.reused,
            report.moved,
            report.edges_created,
            report.edges_skipped
        );
        Ok(report)
    }

    /// Nodes the oracle has to place, with their sizes and pins.
    fn layout_input(&self, plan: &Plan<'_>, edges: &[EdgeDefinition], mode: ExistingMode, anchor: Anchor) -> LayoutGraph {
        let nodes = plan
            .iter()
            .filter_map(|(node, existing)| match (existing, mode) {
                (Some(_), ExistingMode::Ignore) => None,
                (Some(w), ExistingMode::Move) => Some(LayoutNode {
                    id: node.id,
                    width: w.geometry.width,
                    height: w.geometry.height,
                    fixed: None,
                }),
                (Some(w), ExistingMode::Layout) => Some(LayoutNode {
                    id: node.id,
                    width: w.geometry.width,
                    height: w.geometry.height,
                    fixed: Some(w.geometry.convert(Anchor::Center, anchor).position()),
                }),
                (None, _) => {
                    let (width, height) = self.board.template_size(&node.kind);
                    Some(LayoutNode {
                        id: node.id,
                        width,
                        height,
                        fixed: None,
                    })
                }
            })
            .collect();
        LayoutGraph {
            nodes,
            edges: edges.to_vec(),
        }
    }

    /// Create, reuse, or reposition each node's widget and create the
    /// connectors. Returns the node widgets to commit and the absolute
    /// extent of everything the operation touched.
    ///
    /// Existing widgets handed to the batch are snapshotted into
    /// `originals` first and placed after the new ones, so a failed commit
    /// reaches them last.
    #[allow(clippy::too_many_arguments)]
    async fn materialize(
        &mut self,
        plan: Plan<'_>,
        edges: &[EdgeDefinition],
        layout: &LayoutResult,
        anchor: Anchor,
        mode: ExistingMode,
        report: &mut ProcessReport,
        originals: &mut Vec<Widget>,
    ) -> SyncResult<(Vec<Widget>, Option<Rect>)> {
        let mut node_map: HashMap<NodeId, Widget> = HashMap::with_capacity(plan.len());
        let mut batch = Vec::with_capacity(plan.len());
        let mut touched = Vec::new();
        let mut kept = Vec::new();

        for (node, existing) in plan {
            match existing {
                Some(widget) if mode == ExistingMode::Ignore => {
                    log::debug!("keeping {} for {:?} as-is", widget.id, node.id);
                    report.reused += 1;
                    kept.push(widget.geometry);
                    node_map.insert(node.id, widget);
                }
                Some(mut widget) => {
                    report.reused += 1;
                    originals.push(widget.clone());
                    let placed = placement(layout, node.id, anchor)?;
                    if !same_position(widget.geometry.position(), placed.position()) {
                        log::debug!("{mode}: moving {} for {:?}", widget.id, node.id);
                        self.board.move_item(&mut widget, placed.x, placed.y)?;
                        report.moved += 1;
                    }
                    node_map.insert(node.id, widget.clone());
                    touched.push(widget);
                }
                None => {
                    let placed = placement(layout, node.id, anchor)?;
                    match self.board.create_node(node, &placed).await? {
                        NodeOutcome::Created(widget) => {
                            self.ledger.register_created([widget.clone()]);
                            report.created += 1;
                            node_map.insert(node.id, widget.clone());
                            batch.push(widget);
                        }
                        NodeOutcome::Reused(widget) => {
                            report.reused += 1;
                            node_map.insert(node.id, widget);
                        }
                    }
                }
            }
        }

        batch.extend(touched);

        // One edge at a time so a failure leaves every earlier connector
        // registered for rollback.
        let hints = edge_fractions(edges, layout, anchor);
        for (edge, hint) in edges.iter().zip(&hints) {
            let outcome = self
                .board
                .create_edges(slice::from_ref(edge), &node_map, Some(slice::from_ref(hint)))
                .await?;
            report.edges_created += outcome.connectors.len();
            report.edges_skipped += outcome.skipped;
            self.ledger.register_created(outcome.connectors);
        }

        let laid_out = match anchor {
            Anchor::Center => bounding_box_from_center(layout.nodes.values()),
            Anchor::TopLeft => bounding_box_from_top_left(layout.nodes.values()),
        };
        let extent = match (laid_out, bounding_box_from_center(&kept)) {
            (Some(a), Some(b)) => Some(a.union(b)),
            (a, b) => a.or(b),
        };
        Ok((batch, extent))
    }

    /// Put every widget of `batch` into a frame titled `title`. An existing
    /// frame with that title is reused and grown to cover `bounds` plus
    /// padding; otherwise one is created around it.
    async fn wrap_in_frame(
        &mut self,
        title: &str,
        bounds: Rect,
        batch: &mut [Widget],
        originals: &mut Vec<Widget>,
    ) -> SyncResult<Widget> {
        let target = padded(bounds, self.board.config().frame_padding);
        let frame = match self.board.find_node("frame", title).await? {
            Some(mut frame) => {
                log::debug!("reusing frame {} ({title:?})", frame.id);
                originals.push(frame.clone());
                let current = frame.geometry.rect(Anchor::Center);
                let grown = current.union(target);
                if grown != current {
                    let center = grown.center();
                    frame.set_geometry(Geometry::new(center.x, center.y, grown.width(), grown.height()));
                }
                frame
            }
            None => {
                let frame = self.board.create_frame(title, target).await?;
                self.ledger.register_created([frame.clone()]);
                frame
            }
        };

        self.board.set_frame(Some(frame));
        for widget in batch.iter_mut() {
            if let Err(err) = self.board.add_to_frame(widget) {
                self.board.set_frame(None);
                return Err(err);
            }
        }
        self.board
            .take_frame()
            .ok_or_else(|| SyncError::invalid_argument("frame", "frame scope lost"))
    }

    /// Put committed existing widgets back the way they were before this
    /// operation. Widgets still holding their patch were never synced and
    /// are skipped. A failing restore replaces `err`.
    async fn restore(&mut self, batch: &[Widget], originals: &[Widget], err: SyncError) -> SyncError {
        let mut reverts = Vec::new();
        for current in batch.iter().filter(|w| !w.has_pending()) {
            let Some(original) = originals.iter().find(|o| o.id == current.id) else {
                continue;
            };
            let mut revert = current.clone();
            if revert.geometry != original.geometry {
                revert.set_geometry(original.geometry);
            }
            if revert.children() != original.children() {
                revert.set_children(original.children().iter().copied().collect());
            }
            if revert.has_pending() {
                reverts.push(revert);
            }
        }
        if reverts.is_empty() {
            return err;
        }
        log::warn!("restoring {} existing widget(s) after failed commit", reverts.len());
        match self.board.sync_all(&mut reverts).await {
            Ok(_) => err,
            Err(restore_err) => restore_err,
        }
    }

    /// Undo this operation after `err`. A failing undo replaces `err`.
    async fn roll_back(&mut self, err: SyncError) -> SyncError {
        log::warn!("import failed ({err}), rolling back {} widget(s)", self.ledger.len());
        match self.ledger.undo_last(&mut self.board).await {
            Ok(_) => err,
            Err(undo_err) => undo_err,
        }
    }
}

/// Center-anchored box the oracle chose for `id`.
fn placement(layout: &LayoutResult, id: NodeId, anchor: Anchor) -> SyncResult<Geometry> {
    layout
        .nodes
        .get(&id)
        .map(|g| g.convert(anchor, Anchor::Center))
        .ok_or_else(|| SyncError::Layout(format!("no position for node {id}")))
}

/// Re-express the oracle's absolute edge anchors as fractions of the
/// endpoint boxes. Edges the oracle did not route get no hint.
fn edge_fractions(edges: &[EdgeDefinition], layout: &LayoutResult, anchor: Anchor) -> Vec<Option<EdgeHint>> {
    if layout.edges.len() != edges.len() {
        log::warn!(
            "layout returned {} edge hint(s) for {} edge(s), dropping hints",
            layout.edges.len(),
            edges.len()
        );
        return vec![None; edges.len()];
    }
    edges
        .iter()
        .zip(&layout.edges)
        .map(|(edge, hint)| {
            let hint = (*hint)?;
            let from = layout.nodes.get(&edge.from)?.convert(anchor, Anchor::TopLeft);
            let to = layout.nodes.get(&edge.to)?.convert(anchor, Anchor::TopLeft);
            Some(EdgeHint {
                start_point: relative_position(&from, hint.start_point),
                end_point: relative_position(&to, hint.end_point),
            })
        })
        .collect()
}

fn same_position(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < POSITION_EPSILON && (a.y - b.y).abs() < POSITION_EPSILON
}
