//! Reconciliation engine: keeps a canvas in step with imported graphs,
//! hierarchies, and spreadsheet rows.
//!
//! `Board` is the only writer to the canvas. Orchestrators drive one import
//! at a time through it and record what they create in an `UndoLedger`, so
//! a failed commit or an explicit undo removes exactly that operation's
//! widgets.

pub mod board;
pub mod bridge;
pub mod canvas;
pub mod ledger;
pub mod memory;
pub mod orchestrator;
pub mod query_cache;
pub mod worker;

pub use board::{Board, EdgeOutcome, NodeOutcome};
pub use bridge::{ExternalSyncBridge, WidgetData, update_row_from_widget};
pub use canvas::{Canvas, ConnectorArgs, FrameArgs, ShapeArgs, TextArgs};
pub use ledger::UndoLedger;
pub use memory::{CallCounts, MemoryCanvas};
pub use orchestrator::{ExistingMode, GraphProcessor, HierarchyProcessor, ProcessOptions, ProcessReport};
pub use query_cache::QueryCache;
pub use worker::LayoutWorker;
