//! In-process canvas.
//!
//! Backs the CLI and the test-suite. Widgets keep insertion order so query
//! results are deterministic. Faults can be injected per operation, and
//! every call is counted so tests can assert which paths were taken.

use crate::canvas::{Canvas, ConnectorArgs, FrameArgs, ShapeArgs, TextArgs};
use async_trait::async_trait;
use cs_core::{
    ChildIds, Geometry, Rect, SyncError, SyncResult, Widget, WidgetId, WidgetKind, WidgetKindTag, WidgetPatch,
};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of calls made per canvas operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get_selection: usize,
    pub get_by_kind: usize,
    pub get_by_id: usize,
    pub create: usize,
    pub group: usize,
    pub remove: usize,
    pub sync: usize,
    pub zoom: usize,
}

/// Injected failures. `*_after: Some(n)` lets `n` calls succeed, then
/// fails every later one. `sync_nth: Some(n)` fails only the `n`-th sync.
#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    sync_after: Option<usize>,
    sync_nth: Option<usize>,
    create_after: Option<usize>,
    remove: bool,
    get_by_id: bool,
}

#[derive(Debug, Default)]
struct BoardState {
    widgets: Vec<Widget>,
    selection: Vec<WidgetId>,
    viewport: Rect,
    faults: Faults,
    calls: CallCounts,
}

impl BoardState {
    fn position(&self, id: WidgetId) -> Option<usize> {
        self.widgets.iter().position(|w| w.id == id)
    }

    fn insert(&mut self, widget: Widget) -> SyncResult<Widget> {
        self.calls.create += 1;
        if let Some(n) = self.faults.create_after
            && self.calls.create > n
        {
            return Err(SyncError::canvas("create", "injected failure"));
        }
        self.widgets.push(widget.clone());
        Ok(widget)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCanvas {
    state: Mutex<BoardState>,
}

impl MemoryCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// A canvas that already holds `widgets` (pre-existing user content).
    pub fn with_widgets(widgets: Vec<Widget>) -> Self {
        let canvas = Self::new();
        canvas.state().widgets = widgets;
        canvas
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a widget directly, bypassing counters and faults.
    pub fn seed(&self, widget: Widget) {
        self.state().widgets.push(widget);
    }

    pub fn select(&self, ids: &[WidgetId]) {
        self.state().selection = ids.to_vec();
    }

    pub fn widgets(&self) -> Vec<Widget> {
        self.state().widgets.clone()
    }

    pub fn widget(&self, id: WidgetId) -> Option<Widget> {
        let state = self.state();
        state.position(id).map(|i| state.widgets[i].clone())
    }

    pub fn len(&self) -> usize {
        self.state().widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_kind(&self, kind: WidgetKindTag) -> usize {
        self.state().widgets.iter().filter(|w| w.tag() == kind).count()
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn reset_calls(&self) {
        self.state().calls = CallCounts::default();
    }

    pub fn current_viewport(&self) -> Rect {
        self.state().viewport
    }

    pub fn fail_sync_after(&self, n: usize) {
        self.state().faults.sync_after = Some(n);
    }

    /// Fail the `n`-th sync call (1-based) and no other.
    pub fn fail_nth_sync(&self, n: usize) {
        self.state().faults.sync_nth = Some(n);
    }

    pub fn fail_create_after(&self, n: usize) {
        self.state().faults.create_after = Some(n);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.state().faults.remove = fail;
    }

    pub fn fail_fetch_by_id(&self, fail: bool) {
        self.state().faults.get_by_id = fail;
    }

    pub fn clear_faults(&self) {
        self.state().faults = Faults::default();
    }
}

#[async_trait]
impl Canvas for MemoryCanvas {
    async fn get_selection(&self) -> SyncResult<Vec<Widget>> {
        let mut state = self.state();
        state.calls.get_selection += 1;
        let selected = state
            .selection
            .iter()
            .filter_map(|id| state.position(*id).map(|i| state.widgets[i].clone()))
            .collect();
        Ok(selected)
    }

    async fn get_by_kind(&self, kind: WidgetKindTag) -> SyncResult<Vec<Widget>> {
        let mut state = self.state();
        state.calls.get_by_kind += 1;
        Ok(state.widgets.iter().filter(|w| w.tag() == kind).cloned().collect())
    }

    async fn get_by_id(&self, id: WidgetId) -> SyncResult<Option<Widget>> {
        let mut state = self.state();
        state.calls.get_by_id += 1;
        if state.faults.get_by_id {
            return Err(SyncError::canvas("get", "injected failure"));
        }
        Ok(state.position(id).map(|i| state.widgets[i].clone()))
    }

    async fn create_shape(&self, args: ShapeArgs) -> SyncResult<Widget> {
        let mut widget = Widget::new(
            WidgetId::with_prefix("shape"),
            WidgetKind::Shape {
                shape: args.shape,
                content: args.content,
            },
            args.geometry,
        );
        widget.style = args.style;
        self.state().insert(widget)
    }

    async fn create_text(&self, args: TextArgs) -> SyncResult<Widget> {
        let mut widget = Widget::new(
            WidgetId::with_prefix("text"),
            WidgetKind::Text { content: args.content },
            args.geometry,
        );
        widget.style = args.style;
        self.state().insert(widget)
    }

    async fn create_connector(&self, args: ConnectorArgs) -> SyncResult<Widget> {
        let mut state = self.state();
        for end in [args.start, args.end] {
            if state.position(end).is_none() {
                return Err(SyncError::canvas("create connector", format!("no widget {end}")));
            }
        }
        let mut widget = Widget::new(
            WidgetId::with_prefix("connector"),
            WidgetKind::Connector {
                start: args.start,
                end: args.end,
                caption: args.caption,
                start_point: args.start_point,
                end_point: args.end_point,
            },
            Geometry::default(),
        );
        widget.style = args.style;
        if let Some(shape) = args.shape {
            widget.style.set("shape", shape);
        }
        state.insert(widget)
    }

    async fn create_frame(&self, args: FrameArgs) -> SyncResult<Widget> {
        let mut widget = Widget::new(
            WidgetId::with_prefix("frame"),
            WidgetKind::Frame {
                title: args.title,
                children: ChildIds::new(),
            },
            args.geometry,
        );
        widget.style = args.style;
        self.state().insert(widget)
    }

    async fn group(&self, items: &[WidgetId]) -> SyncResult<Widget> {
        let mut state = self.state();
        state.calls.group += 1;
        let mut members = Vec::with_capacity(items.len());
        for id in items {
            let i = state
                .position(*id)
                .ok_or_else(|| SyncError::canvas("group", format!("no widget {id}")))?;
            members.push(state.widgets[i].geometry);
        }
        let geometry = cs_core::bounding_box_from_center(&members)
            .map(|r| {
                let c = r.center();
                Geometry::new(c.x, c.y, r.width(), r.height())
            })
            .unwrap_or_default();
        let group = Widget::new(
            WidgetId::with_prefix("group"),
            WidgetKind::Group {
                children: items.iter().copied().collect(),
            },
            geometry,
        );
        state.widgets.push(group.clone());
        Ok(group)
    }

    async fn remove(&self, id: WidgetId) -> SyncResult<()> {
        let mut state = self.state();
        state.calls.remove += 1;
        if state.faults.remove {
            return Err(SyncError::canvas("remove", "injected failure"));
        }
        let i = state
            .position(id)
            .ok_or_else(|| SyncError::canvas("remove", format!("no widget {id}")))?;
        state.widgets.remove(i);
        state.selection.retain(|s| *s != id);
        Ok(())
    }

    async fn sync(&self, id: WidgetId, patch: &WidgetPatch) -> SyncResult<()> {
        let mut state = self.state();
        state.calls.sync += 1;
        let sync_call = state.calls.sync;
        if state.faults.sync_after.is_some_and(|n| sync_call > n) || state.faults.sync_nth == Some(sync_call) {
            return Err(SyncError::canvas("sync", "injected failure"));
        }
        let i = state
            .position(id)
            .ok_or_else(|| SyncError::canvas("sync", format!("no widget {id}")))?;
        patch.apply_to(&mut state.widgets[i]);
        Ok(())
    }

    async fn viewport(&self) -> SyncResult<Rect> {
        Ok(self.state().viewport)
    }

    async fn zoom_to(&self, bounds: Rect) -> SyncResult<()> {
        let mut state = self.state();
        state.calls.zoom += 1;
        state.viewport = bounds;
        Ok(())
    }
}
