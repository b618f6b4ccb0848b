//! Canvas-side model: widgets and the pending mutations queued on them.
//!
//! Mutations are never written to the canvas directly. Setters record a
//! `WidgetPatch` on the widget; the canvas facade takes the patch and
//! applies it in one `sync` call per widget. Batching and rollback both
//! hinge on that single commit point.

use crate::id::WidgetId;
use crate::model::{Geometry, Metadata};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Child ids owned by a group or frame. Children carry no back-pointer.
pub type ChildIds = SmallVec<[WidgetId; 4]>;

// ─── Style ───────────────────────────────────────────────────────────────

/// Concrete canvas style properties (`fillColor`, `fontSize`, …).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Style(pub BTreeMap<String, String>);

impl Style {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Overwrite properties present in `src`, keep the rest.
    pub fn merge(&mut self, src: &Style) {
        for (k, v) in &src.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Style {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Style(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ─── Kinds ───────────────────────────────────────────────────────────────

/// Kind discriminant, used for canvas queries and cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKindTag {
    Shape,
    Text,
    Group,
    Frame,
    Connector,
}

impl WidgetKindTag {
    pub const ALL: [WidgetKindTag; 5] = [
        WidgetKindTag::Shape,
        WidgetKindTag::Text,
        WidgetKindTag::Group,
        WidgetKindTag::Frame,
        WidgetKindTag::Connector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKindTag::Shape => "shape",
            WidgetKindTag::Text => "text",
            WidgetKindTag::Group => "group",
            WidgetKindTag::Frame => "frame",
            WidgetKindTag::Connector => "connector",
        }
    }
}

impl fmt::Display for WidgetKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WidgetKindTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WidgetKindTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// What a widget is, with the kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WidgetKind {
    Shape {
        shape: String,
        content: String,
    },
    Text {
        content: String,
    },
    Group {
        children: ChildIds,
    },
    Frame {
        title: String,
        children: ChildIds,
    },
    Connector {
        start: WidgetId,
        end: WidgetId,
        caption: Option<String>,
        /// Anchor hints from the layout oracle.
        start_point: Option<Point>,
        end_point: Option<Point>,
    },
}

impl WidgetKind {
    pub fn tag(&self) -> WidgetKindTag {
        match self {
            WidgetKind::Shape { .. } => WidgetKindTag::Shape,
            WidgetKind::Text { .. } => WidgetKindTag::Text,
            WidgetKind::Group { .. } => WidgetKindTag::Group,
            WidgetKind::Frame { .. } => WidgetKindTag::Frame,
            WidgetKind::Connector { .. } => WidgetKindTag::Connector,
        }
    }
}

// ─── Pending mutation ────────────────────────────────────────────────────

/// Changes recorded in memory and not yet persisted to the canvas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetPatch {
    pub geometry: Option<Geometry>,
    /// Visible text: shape/text content, frame title, or connector caption.
    pub content: Option<String>,
    pub style: Option<Style>,
    /// Metadata keys to set. Existing keys not listed here are kept.
    pub metadata: Metadata,
    pub children: Option<ChildIds>,
}

impl WidgetPatch {
    pub fn is_empty(&self) -> bool {
        self.geometry.is_none()
            && self.content.is_none()
            && self.style.is_none()
            && self.metadata.is_empty()
            && self.children.is_none()
    }

    /// Apply the patch to a widget's persisted state.
    pub fn apply_to(&self, widget: &mut Widget) {
        if let Some(geometry) = self.geometry {
            widget.geometry = geometry;
        }
        if let Some(content) = &self.content {
            widget.write_content(content.clone());
        }
        if let Some(style) = &self.style {
            widget.style = style.clone();
        }
        for (k, v) in &self.metadata {
            widget.metadata.insert(k.clone(), v.clone());
        }
        if let Some(children) = &self.children {
            widget.write_children(children.clone());
        }
    }
}

// ─── Widget ──────────────────────────────────────────────────────────────

/// A single element on the canvas.
///
/// `geometry.x`/`y` is the widget center, matching the canvas convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: WidgetId,
    #[serde(flatten)]
    pub kind: WidgetKind,
    pub geometry: Geometry,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(skip)]
    pub pending: WidgetPatch,
}

impl Widget {
    pub fn new(id: WidgetId, kind: WidgetKind, geometry: Geometry) -> Self {
        Self {
            id,
            kind,
            geometry,
            style: Style::default(),
            metadata: Metadata::new(),
            pending: WidgetPatch::default(),
        }
    }

    pub fn tag(&self) -> WidgetKindTag {
        self.kind.tag()
    }

    /// The visible text of the widget, if its kind has any.
    pub fn content(&self) -> Option<&str> {
        match &self.kind {
            WidgetKind::Shape { content, .. } | WidgetKind::Text { content } => Some(content),
            WidgetKind::Frame { title, .. } => Some(title),
            WidgetKind::Connector { caption, .. } => caption.as_deref(),
            WidgetKind::Group { .. } => None,
        }
    }

    /// Child ids of a group or frame; empty for other kinds.
    pub fn children(&self) -> &[WidgetId] {
        match &self.kind {
            WidgetKind::Group { children } | WidgetKind::Frame { children, .. } => children,
            WidgetKind::Shape { .. } | WidgetKind::Text { .. } | WidgetKind::Connector { .. } => &[],
        }
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    // Setters below change the in-memory view and queue the same change
    // for the next sync.

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.metadata.insert(key.clone(), value.clone());
        self.pending.metadata.insert(key, value);
    }

    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
        self.pending.geometry = Some(geometry);
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        let content = content.into();
        self.write_content(content.clone());
        self.pending.content = Some(content);
    }

    pub fn set_style(&mut self, style: Style) {
        self.style = style.clone();
        self.pending.style = Some(style);
    }

    pub fn set_children(&mut self, children: ChildIds) {
        self.write_children(children.clone());
        self.pending.children = Some(children);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Detach the queued mutation, leaving an empty one behind.
    pub fn take_pending(&mut self) -> WidgetPatch {
        std::mem::take(&mut self.pending)
    }

    fn write_content(&mut self, text: String) {
        match &mut self.kind {
            WidgetKind::Shape { content, .. } | WidgetKind::Text { content } => *content = text,
            WidgetKind::Frame { title, .. } => *title = text,
            WidgetKind::Connector { caption, .. } => *caption = Some(text),
            WidgetKind::Group { .. } => {}
        }
    }

    fn write_children(&mut self, ids: ChildIds) {
        match &mut self.kind {
            WidgetKind::Group { children } | WidgetKind::Frame { children, .. } => *children = ids,
            WidgetKind::Shape { .. } | WidgetKind::Text { .. } | WidgetKind::Connector { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn shape(content: &str) -> Widget {
        Widget::new(
            WidgetId::intern("w_shape"),
            WidgetKind::Shape {
                shape: "rectangle".into(),
                content: content.into(),
            },
            Geometry::new(0.0, 0.0, 10.0, 10.0),
        )
    }

    #[test]
    fn setters_queue_pending_patch() {
        let mut w = shape("A");
        assert!(!w.has_pending());
        w.set_content("B");
        w.set_metadata("rowId", Value::from("r1"));
        assert_eq!(w.content(), Some("B"));
        assert!(w.has_pending());

        let patch = w.take_pending();
        assert_eq!(patch.content.as_deref(), Some("B"));
        assert!(!w.has_pending());
    }

    #[test]
    fn patch_apply_respects_kind() {
        let mut group = Widget::new(
            WidgetId::intern("w_group"),
            WidgetKind::Group {
                children: ChildIds::new(),
            },
            Geometry::default(),
        );
        let patch = WidgetPatch {
            content: Some("ignored".into()),
            children: Some(smallvec![WidgetId::intern("c1")]),
            ..Default::default()
        };
        patch.apply_to(&mut group);
        assert_eq!(group.content(), None);
        assert_eq!(group.children(), &[WidgetId::intern("c1")]);
    }

    #[test]
    fn kind_tag_parses() {
        assert_eq!("frame".parse::<WidgetKindTag>(), Ok(WidgetKindTag::Frame));
        assert_eq!("blob".parse::<WidgetKindTag>(), Err("blob".to_string()));
    }

    #[test]
    fn style_merge_overrides() {
        let mut base: Style = [("fillColor", "#fff"), ("fontSize", "14")].into_iter().collect();
        let over: Style = [("fillColor", "#000")].into_iter().collect();
        base.merge(&over);
        assert_eq!(base.get("fillColor"), Some("#000"));
        assert_eq!(base.get("fontSize"), Some("14"));
    }
}
