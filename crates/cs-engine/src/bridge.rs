//! Two-way link between spreadsheet rows and canvas widgets.
//!
//! The bridge remembers which widget each row was last matched to, so a
//! later lookup can fetch it directly instead of scanning the board. When
//! the mapping is stale or missing it falls back to label search.

use crate::board::Board;
use cs_core::mapping::{cell_text, row_id};
use cs_core::{ColumnMapping, Row, SyncError, SyncResult, Widget, WidgetId, WidgetKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The parts of a widget that flow back into a row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetData {
    pub id: Option<WidgetId>,
    /// Visible text; `None` when the widget has none or it is empty.
    pub text: Option<String>,
}

impl From<&Widget> for WidgetData {
    fn from(widget: &Widget) -> Self {
        Self {
            id: Some(widget.id),
            text: widget.content().filter(|t| !t.is_empty()).map(str::to_string),
        }
    }
}

/// Copy of `row` with the label column replaced by the widget text.
/// Nothing changes when the mapping has no label column or the widget no
/// text.
pub fn update_row_from_widget(row: &Row, mapping: &ColumnMapping, data: &WidgetData) -> Row {
    let mut updated = row.clone();
    if let (Some(column), Some(text)) = (mapping.label_column.as_deref(), data.text.as_deref()) {
        updated.insert(column.to_string(), Value::String(text.to_string()));
    }
    updated
}

#[derive(Debug, Default)]
pub struct ExternalSyncBridge {
    rows: HashMap<String, WidgetId>,
}

impl ExternalSyncBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_mapping(&mut self, row_id: impl Into<String>, widget: WidgetId) {
        self.rows.insert(row_id.into(), widget);
    }

    pub fn get_widget_id(&self, row_id: &str) -> Option<WidgetId> {
        self.rows.get(row_id).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Widget for a row: the mapped id fetched directly, then a shape with
    /// that label, then a group containing that label. The first hit wins.
    pub async fn find_widget(&self, board: &mut Board, row_id: &str, label: &str) -> SyncResult<Option<Widget>> {
        if let Some(id) = self.get_widget_id(row_id) {
            match board.fetch(id).await {
                Ok(Some(widget)) => return Ok(Some(widget)),
                Ok(None) => log::debug!("row {row_id}: mapped widget {id} is gone"),
                Err(e) => log::debug!("row {row_id}: fetching {id} failed ({e}), searching by label"),
            }
        }
        if label.is_empty() {
            return Ok(None);
        }
        if let Some(shape) = board.find_node("shape", label).await? {
            return Ok(Some(shape));
        }
        match board.find_group_by_label(label).await? {
            Some(group) => self.extract_item(board, group).await.map(Some),
            None => Ok(None),
        }
    }

    /// The widget that carries a row's data: a group's first child, or the
    /// widget itself.
    pub async fn extract_item(&self, board: &Board, widget: Widget) -> SyncResult<Widget> {
        let first = match &widget.kind {
            WidgetKind::Group { children } => children.first().copied(),
            WidgetKind::Shape { .. }
            | WidgetKind::Text { .. }
            | WidgetKind::Frame { .. }
            | WidgetKind::Connector { .. } => None,
        };
        match first {
            Some(id) => Ok(board.fetch(id).await?.unwrap_or(widget)),
            None => Ok(widget),
        }
    }

    /// Pull widget text back into the rows. Rows without a widget are
    /// returned unchanged; matched rows refresh the mapping.
    pub async fn push_changes_to_rows(
        &mut self,
        board: &mut Board,
        rows: &[Row],
        mapping: &ColumnMapping,
    ) -> SyncResult<Vec<Row>> {
        let mut out = Vec::with_capacity(rows.len());
        let mut matched = 0;
        for (i, row) in rows.iter().enumerate() {
            let id = row_id(row, i, mapping);
            let label = mapping
                .label_column
                .as_deref()
                .and_then(|col| cell_text(row, col))
                .unwrap_or_default();

            let Some(found) = self.find_widget(board, &id, &label).await? else {
                out.push(row.clone());
                continue;
            };
            let item = self.extract_item(board, found).await?;
            out.push(update_row_from_widget(row, mapping, &WidgetData::from(&item)));
            self.register_mapping(id, item.id);
            matched += 1;
        }
        log::info!("pushed widget changes into {matched} of {} row(s)", rows.len());
        Ok(out)
    }

    /// Re-apply the non-master elements of `template_name` to the children
    /// of `group`, element `i` onto child `i`, and sync them. Returns the
    /// updated children.
    pub async fn apply_template(
        &self,
        board: &Board,
        group: &Widget,
        label: &str,
        template_name: &str,
    ) -> SyncResult<Vec<Widget>> {
        let template = board
            .templates()
            .get_template(template_name)
            .ok_or_else(|| SyncError::TemplateNotFound(template_name.to_string()))?;
        let master = template.master_index();
        let children = group.children();

        let mut updated = Vec::new();
        for (i, element) in template.elements.iter().enumerate() {
            if i == master {
                continue;
            }
            let Some(child_id) = children.get(i) else {
                log::debug!("group {} has no child for element {i} of {template_name}", group.id);
                continue;
            };
            let Some(mut child) = board.fetch(*child_id).await? else {
                continue;
            };
            if let Some(text) = element.render_text(label) {
                child.set_content(text);
            }
            let style = board.templates().resolve_style(&element.style);
            if !style.is_empty() {
                let mut merged = child.style.clone();
                merged.merge(&style);
                child.set_style(merged);
            }
            updated.push(child);
        }
        board.sync_all(&mut updated).await?;
        Ok(updated)
    }
}
