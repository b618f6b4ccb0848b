//! Undo ledger for import operations.
//!
//! Records every widget created by the current operation so the whole
//! operation can be removed again, either on user request (`undo_last`) or
//! as the compensating step of a failed commit (`sync_or_undo`).
//!
//! Only widgets this operation created may be registered. Reused or
//! ignored widgets existed before and must survive an undo.

use crate::board::Board;
use cs_core::{SyncResult, Widget};
use std::slice;

#[derive(Debug, Default)]
pub struct UndoLedger {
    created: Vec<Widget>,
}

impl UndoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append created widgets. Accepts `[widget]` for a single item.
    pub fn register_created(&mut self, items: impl IntoIterator<Item = Widget>) {
        self.created.extend(items);
    }

    /// Everything registered since the last clear, in creation order.
    pub fn last_created(&self) -> &[Widget] {
        &self.created
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Start a new operation.
    pub fn clear(&mut self) {
        self.created.clear();
    }

    /// Remove every registered widget, newest first, and clear the ledger.
    /// An empty ledger is a no-op.
    ///
    /// A removal failure is returned as-is; widgets removed before it are
    /// dropped from the ledger, the rest stay registered.
    pub async fn undo_last(&mut self, board: &mut Board) -> SyncResult<usize> {
        let total = self.created.len();
        while let Some(widget) = self.created.last() {
            board.remove_items(slice::from_ref(widget)).await?;
            self.created.pop();
        }
        if total > 0 {
            log::info!("undo removed {total} widget(s)");
        }
        Ok(total)
    }

    /// Commit `items`; if the commit fails, undo this operation and return
    /// the commit error. A failing undo wins over the commit error.
    pub async fn sync_or_undo(&mut self, board: &mut Board, items: &mut [Widget]) -> SyncResult<()> {
        match board.sync_all(items).await {
            Ok(synced) => {
                log::debug!("committed {synced} widget(s)");
                Ok(())
            }
            Err(err) => {
                log::warn!("commit failed ({err}), rolling back {} widget(s)", self.created.len());
                self.undo_last(board).await?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCanvas;
    use cs_core::{Geometry, SyncConfig, SyncError, TemplateRegistry, WidgetId, WidgetKind};
    use std::sync::Arc;

    fn shape(id: &str) -> Widget {
        Widget::new(
            WidgetId::intern(id),
            WidgetKind::Shape {
                shape: "rectangle".into(),
                content: id.into(),
            },
            Geometry::new(0.0, 0.0, 10.0, 10.0),
        )
    }

    fn board(canvas: Arc<MemoryCanvas>) -> Board {
        Board::new(canvas, Arc::new(TemplateRegistry::builtin()), SyncConfig::default())
    }

    #[tokio::test]
    async fn undo_on_empty_ledger_is_silent() {
        let canvas = Arc::new(MemoryCanvas::new());
        let mut board = board(canvas.clone());
        let mut ledger = UndoLedger::new();
        assert_eq!(ledger.undo_last(&mut board).await, Ok(0));
        assert_eq!(canvas.calls().remove, 0);
    }

    #[tokio::test]
    async fn undo_removes_newest_first() {
        let canvas = Arc::new(MemoryCanvas::with_widgets(vec![
            shape("lg_keep"),
            shape("lg_a"),
            shape("lg_b"),
        ]));
        let mut board = board(canvas.clone());
        let mut ledger = UndoLedger::new();
        ledger.register_created([shape("lg_a")]);
        ledger.register_created(vec![shape("lg_b")]);
        assert_eq!(ledger.len(), 2);

        assert_eq!(ledger.undo_last(&mut board).await, Ok(2));
        assert!(ledger.is_empty());
        let left: Vec<_> = canvas.widgets().into_iter().map(|w| w.id).collect();
        assert_eq!(left, vec![WidgetId::intern("lg_keep")]);
    }

    #[tokio::test]
    async fn failed_undo_propagates_and_keeps_entries() {
        let canvas = Arc::new(MemoryCanvas::with_widgets(vec![shape("lg_f")]));
        canvas.fail_removes(true);
        let mut board = board(canvas.clone());
        let mut ledger = UndoLedger::new();
        ledger.register_created([shape("lg_f")]);

        let err = ledger.undo_last(&mut board).await.unwrap_err();
        assert!(matches!(err, SyncError::Canvas { op: "remove", .. }));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn detached_board_cannot_remove() {
        let mut board = Board::detached(Arc::new(TemplateRegistry::builtin()), SyncConfig::default());
        let mut ledger = UndoLedger::new();
        ledger.register_created([shape("lg_d")]);
        assert_eq!(ledger.undo_last(&mut board).await, Err(SyncError::NotInitialized));
    }
}
