//! Memoized canvas reads for one reconciliation pass.
//!
//! Entries live until `reset`, `clear_selection`, or `set_selection`. There
//! is no time-based expiry, so `reset` must run at the start of every
//! top-level import.

use crate::canvas::Canvas;
use cs_core::{SyncResult, Widget, WidgetKindTag};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct QueryCache {
    selection: Option<Vec<Widget>>,
    by_kind: HashMap<WidgetKindTag, Vec<Widget>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current selection, fetched on first use.
    pub async fn get_selection(&mut self, canvas: &dyn Canvas) -> SyncResult<&[Widget]> {
        if self.selection.is_none() {
            log::debug!("query cache: fetching selection");
            let fetched = canvas.get_selection().await?;
            self.selection = Some(fetched);
        }
        Ok(self.selection.as_deref().unwrap_or_default())
    }

    /// Store a selection known to be fresh (e.g. from a change notification).
    pub fn set_selection(&mut self, items: Vec<Widget>) {
        self.selection = Some(items);
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Widgets of the requested kinds, in the order the kinds are listed.
    /// Each kind is fetched at most once until the cache is reset.
    pub async fn get_widgets_by_kind(
        &mut self,
        kinds: &[WidgetKindTag],
        canvas: &dyn Canvas,
    ) -> SyncResult<Vec<&Widget>> {
        for kind in kinds {
            if !self.by_kind.contains_key(kind) {
                log::debug!("query cache: fetching {kind} widgets");
                let fetched = canvas.get_by_kind(*kind).await?;
                self.by_kind.insert(*kind, fetched);
            }
        }
        Ok(kinds
            .iter()
            .filter_map(|kind| self.by_kind.get(kind))
            .flatten()
            .collect())
    }

    /// Make a widget created during this pass visible to later lookups.
    /// Kinds that were never fetched stay unfetched.
    pub fn remember(&mut self, widget: &Widget) {
        if let Some(list) = self.by_kind.get_mut(&widget.tag()) {
            match list.iter_mut().find(|w| w.id == widget.id) {
                Some(existing) => *existing = widget.clone(),
                None => list.push(widget.clone()),
            }
        }
    }

    /// Drop a removed widget from every cached list.
    pub fn forget(&mut self, widget: &Widget) {
        if let Some(list) = self.by_kind.get_mut(&widget.tag()) {
            list.retain(|w| w.id != widget.id);
        }
        if let Some(selection) = &mut self.selection {
            selection.retain(|w| w.id != widget.id);
        }
    }

    pub fn reset(&mut self) {
        self.selection = None;
        self.by_kind.clear();
    }
}
