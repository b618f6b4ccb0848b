//! Tunables for an import session.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// Configuration shared by the canvas facade and the orchestrators.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Metadata key under which a widget remembers the row/node id it was
    /// created for. Default: **"rowId"**.
    pub row_id_key: String,

    /// Template used for nodes whose row has no template column.
    pub default_node_type: String,

    /// Connector template applied to every created connector.
    pub connector_template: String,

    /// Size given to nodes the layout oracle did not size.
    pub node_width: f64,
    pub node_height: f64,

    /// Gap between nodes in the same rank, and between ranks.
    pub node_gap: f64,
    pub rank_gap: f64,

    /// Space between the frame border and the widgets it wraps.
    pub frame_padding: f64,

    /// Zoom the viewport to the imported widgets after a successful commit.
    pub zoom_to_result: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            row_id_key: "rowId".to_string(),
            default_node_type: "Rectangle".to_string(),
            connector_template: "default".to_string(),
            node_width: 160.0,
            node_height: 80.0,
            node_gap: 40.0,
            rank_gap: 120.0,
            frame_padding: 40.0,
            zoom_to_result: true,
        }
    }
}

impl SyncConfig {
    pub fn from_json(text: &str) -> SyncResult<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidFile(format!("config: {e}")))
    }
}
