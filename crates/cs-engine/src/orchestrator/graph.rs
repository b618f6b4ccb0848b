//! Flat graph imports.

use super::{Orchestrator, ProcessOptions, ProcessReport};
use crate::board::Board;
use crate::ledger::UndoLedger;
use cs_core::{GraphData, LayeredLayout, LayoutOracle, SyncResult};
use std::sync::Arc;

const DEFAULT_FRAME_TITLE: &str = "Graph";

/// Imports `{ nodes, edges }` documents. Lays out with `LayeredLayout`
/// unless another oracle is supplied.
pub struct GraphProcessor {
    inner: Orchestrator,
}

impl GraphProcessor {
    pub fn new(board: Board) -> Self {
        Self::with_oracle(board, Arc::new(LayeredLayout))
    }

    pub fn with_oracle(board: Board, oracle: Arc<dyn LayoutOracle>) -> Self {
        Self {
            inner: Orchestrator::new(board, oracle),
        }
    }

    pub async fn process_graph(&mut self, graph: &GraphData, options: &ProcessOptions) -> SyncResult<ProcessReport> {
        log::info!(
            "processing graph: {} node(s), {} edge(s), existing={}",
            graph.nodes.len(),
            graph.edges.len(),
            options.existing_mode
        );
        self.inner.run(graph, options, DEFAULT_FRAME_TITLE).await
    }

    /// Parse and process a JSON graph document. Nothing touches the canvas
    /// when the document does not parse.
    pub async fn process_graph_json(&mut self, text: &str, options: &ProcessOptions) -> SyncResult<ProcessReport> {
        let graph = GraphData::from_json(text)?;
        self.process_graph(&graph, options).await
    }

    /// Remove everything the last operation created.
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
