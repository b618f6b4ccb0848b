//! Nested hierarchy imports.
//!
//! Trees are flattened to a graph with parent -> child edges first, so the
//! rest of the pipeline is shared with flat graphs.

use super::{Orchestrator, ProcessOptions, ProcessReport};
use crate::board::Board;
use crate::ledger::UndoLedger;
use cs_core::{HierarchyNode, LayoutOracle, SyncResult, TreeLayout, flatten_hierarchy, parse_hierarchy};
use std::sync::Arc;

const DEFAULT_FRAME_TITLE: &str = "Hierarchy";

/// Imports `{ label, type, children }` trees. Lays out with `TreeLayout`
/// unless another oracle is supplied.
pub struct HierarchyProcessor {
    inner: Orchestrator,
}

impl HierarchyProcessor {
    pub fn new(board: Board) -> Self {
        Self::with_oracle(board, Arc::new(TreeLayout))
    }

    pub fn with_oracle(board: Board, oracle: Arc<dyn LayoutOracle>) -> Self {
        Self {
            inner: Orchestrator::new(board, oracle),
        }
    }

    pub async fn process_hierarchy(
        &mut self,
        roots: &[HierarchyNode],
        options: &ProcessOptions,
    ) -> SyncResult<ProcessReport> {
        let graph = flatten_hierarchy(roots)?;
        log::info!(
            "processing hierarchy: {} root(s), {} node(s), existing={}",
            roots.len(),
            graph.nodes.len(),
            options.existing_mode
        );
        self.inner.run(&graph, options, DEFAULT_FRAME_TITLE).await
    }

    /// Parse and process a JSON hierarchy (one root object or an array of
    /// roots).
    pub async fn process_hierarchy_json(&mut self, text: &str, options: &ProcessOptions) -> SyncResult<ProcessReport> {
        let roots = parse_hierarchy(text)?;
        self.process_hierarchy(&roots, options).await
    }

    pub async fn undo_last(&mut self) -> SyncResult<usize> {
        self.inner.undo_last().await
    }

    pub fn board(&self) -> &Board {
        self.inner.board()
    }

    pub fn board_mut(&mut self) -> &mut Board {
        self.inner.board_mut()
    }

    pub fn ledger(&self) -> &UndoLedger {
        self.inner.ledger()
    }
}
