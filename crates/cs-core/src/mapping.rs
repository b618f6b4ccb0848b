//! Spreadsheet rows → logical nodes.

use crate::error::{SyncError, SyncResult};
use crate::id::NodeId;
use crate::model::{GraphData, Metadata, NodeDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A spreadsheet row keyed by column header.
pub type Row = Map<String, Value>;

/// Which columns of a sheet feed which node fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnMapping {
    pub id_column: Option<String>,
    pub label_column: Option<String>,
    pub template_column: Option<String>,
    pub text_column: Option<String>,
    pub metadata_columns: Vec<String>,
}

/// Render a cell as text. Empty strings and nulls count as missing.
pub fn cell_text(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// The id a row is tracked under: the id column, or its 1-based index.
pub fn row_id(row: &Row, index: usize, mapping: &ColumnMapping) -> String {
    mapping
        .id_column
        .as_deref()
        .and_then(|col| cell_text(row, col))
        .unwrap_or_else(|| (index + 1).to_string())
}

/// Build graph nodes from rows. The result has no edges.
pub fn rows_to_graph(rows: &[Row], mapping: &ColumnMapping, default_type: &str) -> SyncResult<GraphData> {
    let label_column = mapping
        .label_column
        .as_deref()
        .ok_or_else(|| SyncError::invalid_argument("mapping.label_column", mapping))?;

    let mut nodes = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let label = cell_text(row, label_column).ok_or_else(|| SyncError::MissingColumn {
            row: i + 1,
            column: label_column.to_string(),
        })?;
        let kind = mapping
            .template_column
            .as_deref()
            .and_then(|col| cell_text(row, col))
            .unwrap_or_else(|| default_type.to_string());

        let mut metadata = Metadata::new();
        for col in &mapping.metadata_columns {
            if let Some(v) = row.get(col) {
                metadata.insert(col.clone(), v.clone());
            }
        }
        if let Some(text) = mapping.text_column.as_deref().and_then(|col| cell_text(row, col)) {
            metadata.insert("text".to_string(), Value::String(text));
        }

        nodes.push(NodeDefinition {
            id: NodeId::intern(&row_id(row, i, mapping)),
            label,
            kind,
            metadata,
        });
    }
    Ok(GraphData {
        nodes,
        edges: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn maps_columns_onto_nodes() {
        let rows = vec![
            row(json!({"ID": "r1", "Name": "Alpha", "Kind": "Circle", "Owner": "ops"})),
            row(json!({"Name": "Beta", "Notes": "hello"})),
        ];
        let mapping = ColumnMapping {
            id_column: Some("ID".into()),
            label_column: Some("Name".into()),
            template_column: Some("Kind".into()),
            text_column: Some("Notes".into()),
            metadata_columns: vec!["Owner".into()],
        };
        let graph = rows_to_graph(&rows, &mapping, "Rectangle").unwrap();
        assert_eq!(graph.nodes[0].id.as_str(), "r1");
        assert_eq!(graph.nodes[0].kind, "Circle");
        assert_eq!(graph.nodes[0].metadata["Owner"], json!("ops"));
        // no id cell: falls back to the 1-based row index
        assert_eq!(graph.nodes[1].id.as_str(), "2");
        assert_eq!(graph.nodes[1].kind, "Rectangle");
        assert_eq!(graph.nodes[1].metadata["text"], json!("hello"));
    }

    #[test]
    fn missing_label_names_row_and_column() {
        let rows = vec![row(json!({"Name": ""}))];
        let mapping = ColumnMapping {
            label_column: Some("Name".into()),
            ..Default::default()
        };
        let err = rows_to_graph(&rows, &mapping, "Rectangle").unwrap_err();
        assert_eq!(err.to_string(), "Row 1 has no value in column 'Name'");
    }

    #[test]
    fn numeric_cells_render_as_text() {
        let r = row(json!({"n": 42}));
        assert_eq!(cell_text(&r, "n").as_deref(), Some("42"));
    }
}
