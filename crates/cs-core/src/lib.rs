pub mod bounds;
pub mod config;
pub mod diff;
pub mod error;
pub mod id;
pub mod layout;
pub mod mapping;
pub mod model;
pub mod template;
pub mod widget;

pub use bounds::{bounding_box_from_center, bounding_box_from_top_left, relative_position};
pub use config::SyncConfig;
pub use diff::{DiffResult, Identified, diff};
pub use error::{SyncError, SyncResult};
pub use id::{NodeId, WidgetId};
pub use layout::{
    EdgeHint, LayeredLayout, LayoutGraph, LayoutNode, LayoutOptions, LayoutOracle, LayoutResult, TreeLayout,
};
pub use mapping::{ColumnMapping, Row, rows_to_graph};
pub use model::*;
pub use template::{ConnectorTemplate, TemplateDefinition, TemplateManager, TemplateRegistry};
pub use widget::{ChildIds, Style, Widget, WidgetKind, WidgetKindTag, WidgetPatch};

// Re-export kurbo geometry so downstream crates share one version
pub use kurbo::{Point, Rect};
