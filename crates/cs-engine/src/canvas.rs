//! The canvas boundary.
//!
//! Everything that talks to a real board goes through `Canvas`. Every call
//! is asynchronous and may fail; the engine never assumes a call succeeded
//! until it returns `Ok`.

use async_trait::async_trait;
use cs_core::{Geometry, Point, Rect, Style, SyncResult, Widget, WidgetId, WidgetKindTag, WidgetPatch};

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeArgs {
    pub shape: String,
    pub content: String,
    pub geometry: Geometry,
    pub style: Style,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextArgs {
    pub content: String,
    pub geometry: Geometry,
    pub style: Style,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorArgs {
    pub start: WidgetId,
    pub end: WidgetId,
    pub shape: Option<String>,
    pub caption: Option<String>,
    /// Attachment points as fractions of the endpoint widgets' boxes.
    pub start_point: Option<Point>,
    pub end_point: Option<Point>,
    pub style: Style,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameArgs {
    pub title: String,
    pub geometry: Geometry,
    pub style: Style,
}

#[async_trait]
pub trait Canvas: Send + Sync {
    async fn get_selection(&self) -> SyncResult<Vec<Widget>>;
    async fn get_by_kind(&self, kind: WidgetKindTag) -> SyncResult<Vec<Widget>>;
    async fn get_by_id(&self, id: WidgetId) -> SyncResult<Option<Widget>>;

    async fn create_shape(&self, args: ShapeArgs) -> SyncResult<Widget>;
    async fn create_text(&self, args: TextArgs) -> SyncResult<Widget>;
    async fn create_connector(&self, args: ConnectorArgs) -> SyncResult<Widget>;
    async fn create_frame(&self, args: FrameArgs) -> SyncResult<Widget>;
    async fn group(&self, items: &[WidgetId]) -> SyncResult<Widget>;

    async fn remove(&self, id: WidgetId) -> SyncResult<()>;
    /// Persist a widget's pending mutation.
    async fn sync(&self, id: WidgetId, patch: &WidgetPatch) -> SyncResult<()>;

    async fn viewport(&self) -> SyncResult<Rect>;
    async fn zoom_to(&self, bounds: Rect) -> SyncResult<()>;
}
