//! Canvas mutation facade and identity resolver.
//!
//! `Board` is the only component that creates, updates, or removes canvas
//! widgets. Lookups go through the `QueryCache`; creations apply the visual
//! template for the node type and queue (never sync) the geometry and
//! metadata stamps. `sync_all` is the single commit point for a batch.

use crate::canvas::{Canvas, ConnectorArgs, FrameArgs, ShapeArgs, TextArgs};
use crate::query_cache::QueryCache;
use cs_core::bounds::offset_in;
use cs_core::{
    Anchor, EdgeDefinition, EdgeHint, Geometry, NodeDefinition, NodeId, Rect, SyncConfig, SyncError, SyncResult,
    TemplateManager, Widget, WidgetKind, WidgetKindTag,
};
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of `create_node`.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// A new widget was created by this call.
    Created(Widget),
    /// An existing widget already represents the node; nothing was created.
    Reused(Widget),
}

impl NodeOutcome {
    pub fn widget(&self) -> &Widget {
        match self {
            NodeOutcome::Created(w) | NodeOutcome::Reused(w) => w,
        }
    }

    pub fn into_widget(self) -> Widget {
        match self {
            NodeOutcome::Created(w) | NodeOutcome::Reused(w) => w,
        }
    }
}

/// Result of `create_edges`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeOutcome {
    pub connectors: Vec<Widget>,
    /// Edges dropped because an endpoint did not resolve to a widget.
    pub skipped: usize,
}

pub struct Board {
    canvas: Option<Arc<dyn Canvas>>,
    templates: Arc<dyn TemplateManager>,
    config: SyncConfig,
    cache: QueryCache,
    frame: Option<Widget>,
}

impl Board {
    pub fn new(canvas: Arc<dyn Canvas>, templates: Arc<dyn TemplateManager>, config: SyncConfig) -> Self {
        Self {
            canvas: Some(canvas),
            templates,
            config,
            cache: QueryCache::new(),
            frame: None,
        }
    }

    /// A facade with no canvas attached yet. Every canvas call fails with
    /// `SyncError::NotInitialized` until `attach` is called.
    pub fn detached(templates: Arc<dyn TemplateManager>, config: SyncConfig) -> Self {
        Self {
            canvas: None,
            templates,
            config,
            cache: QueryCache::new(),
            frame: None,
        }
    }

    pub fn attach(&mut self, canvas: Arc<dyn Canvas>) {
        self.canvas = Some(canvas);
        self.cache.reset();
    }

    pub fn canvas(&self) -> SyncResult<&dyn Canvas> {
        self.canvas.as_deref().ok_or(SyncError::NotInitialized)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn templates(&self) -> &dyn TemplateManager {
        self.templates.as_ref()
    }

    pub fn cache_mut(&mut self) -> &mut QueryCache {
        &mut self.cache
    }

    /// Clear cached reads and the frame scope.
    pub fn reset(&mut self) {
        self.cache.reset();
        self.frame = None;
    }

    // ─── Lookups ─────────────────────────────────────────────────────────

    fn parse_query(kind: &str, label: &str) -> SyncResult<WidgetKindTag> {
        let tag = kind
            .parse::<WidgetKindTag>()
            .map_err(|v| SyncError::invalid_argument("kind", v))?;
        if label.is_empty() {
            return Err(SyncError::invalid_argument("label", label));
        }
        Ok(tag)
    }

    /// First cached widget of `kind` whose visible text is exactly `label`.
    pub async fn find_node(&mut self, kind: &str, label: &str) -> SyncResult<Option<Widget>> {
        let tag = Self::parse_query(kind, label)?;
        let canvas = self.canvas.clone().ok_or(SyncError::NotInitialized)?;
        let widgets = self.cache.get_widgets_by_kind(&[tag], canvas.as_ref()).await?;
        Ok(widgets.into_iter().find(|w| w.content() == Some(label)).cloned())
    }

    /// Like `find_node`, restricted to the current selection.
    pub async fn find_node_in_selection(&mut self, kind: &str, label: &str) -> SyncResult<Option<Widget>> {
        let tag = Self::parse_query(kind, label)?;
        let canvas = self.canvas.clone().ok_or(SyncError::NotInitialized)?;
        let selection = self.cache.get_selection(canvas.as_ref()).await?;
        Ok(selection
            .iter()
            .find(|w| w.tag() == tag && w.content() == Some(label))
            .cloned())
    }

    /// A shape, text, or group stamped with `row_id` in its metadata.
    pub async fn find_by_row_id(&mut self, row_id: &str) -> SyncResult<Option<Widget>> {
        let canvas = self.canvas.clone().ok_or(SyncError::NotInitialized)?;
        let key = self.config.row_id_key.as_str();
        let widgets = self
            .cache
            .get_widgets_by_kind(
                &[WidgetKindTag::Shape, WidgetKindTag::Text, WidgetKindTag::Group],
                canvas.as_ref(),
            )
            .await?;
        Ok(widgets
            .into_iter()
            .find(|w| w.get_metadata(key).and_then(Value::as_str) == Some(row_id))
            .cloned())
    }

    /// A group whose child carries `label`. Looks only at cached shapes and texts.
    pub async fn find_group_by_label(&mut self, label: &str) -> SyncResult<Option<Widget>> {
        let canvas = self.canvas.clone().ok_or(SyncError::NotInitialized)?;
        let widgets = self
            .cache
            .get_widgets_by_kind(
                &[WidgetKindTag::Group, WidgetKindTag::Shape, WidgetKindTag::Text],
                canvas.as_ref(),
            )
            .await?;
        let labelled: Vec<_> = widgets
            .iter()
            .filter(|w| w.content() == Some(label))
            .map(|w| w.id)
            .collect();
        Ok(widgets
            .into_iter()
            .filter(|w| w.tag() == WidgetKindTag::Group)
            .find(|g| g.children().iter().any(|c| labelled.contains(c)))
            .cloned())
    }

    /// Fetch one widget straight from the canvas, bypassing the cache.
    pub async fn fetch(&self, id: cs_core::WidgetId) -> SyncResult<Option<Widget>> {
        self.canvas()?.get_by_id(id).await
    }

    /// Kind of widget the template for `node_type` produces.
    pub fn template_tag(&self, node_type: &str) -> WidgetKindTag {
        match self.templates.get_template(node_type) {
            Some(t) if t.elements.len() > 1 => WidgetKindTag::Group,
            Some(t) if t.elements.first().is_some_and(|e| e.is_text()) => WidgetKindTag::Text,
            _ => WidgetKindTag::Shape,
        }
    }

    /// Size a new widget for `node_type` will have before layout.
    pub fn template_size(&self, node_type: &str) -> (f64, f64) {
        let element = self
            .templates
            .get_template(node_type)
            .and_then(|t| t.elements.get(t.master_index()));
        (
            element.and_then(|e| e.width).unwrap_or(self.config.node_width),
            element.and_then(|e| e.height).unwrap_or(self.config.node_height),
        )
    }

    /// Widget that already represents `node`: by row-id metadata first,
    /// then by (template kind, label). A label match stamped with another
    /// node's row id belongs to that node and is not reused.
    pub async fn resolve_existing(&mut self, node: &NodeDefinition) -> SyncResult<Option<Widget>> {
        if let Some(found) = self.find_by_row_id(node.id.as_str()).await? {
            log::debug!("resolved {:?} by row id -> {}", node.id, found.id);
            return Ok(Some(found));
        }
        let tag = self.template_tag(&node.kind);
        let owned_by_node = |w: &Widget, key: &str| match w.get_metadata(key).and_then(Value::as_str) {
            Some(owner) => owner == node.id.as_str(),
            None => true,
        };
        let found = match tag {
            WidgetKindTag::Group => {
                let group = self.find_group_by_label(&node.label).await?;
                group.filter(|g| owned_by_node(g, self.config.row_id_key.as_str()))
            }
            WidgetKindTag::Shape | WidgetKindTag::Text | WidgetKindTag::Frame | WidgetKindTag::Connector => {
                let canvas = self.canvas.clone().ok_or(SyncError::NotInitialized)?;
                let key = self.config.row_id_key.as_str();
                let widgets = self.cache.get_widgets_by_kind(&[tag], canvas.as_ref()).await?;
                widgets
                    .into_iter()
                    .filter(|w| w.content() == Some(node.label.as_str()))
                    .find(|w| owned_by_node(*w, key))
                    .cloned()
            }
        };
        if let Some(w) = &found {
            log::debug!("resolved {:?} by label {:?} -> {}", node.id, node.label, w.id);
        }
        Ok(found)
    }

    // ─── Creation ────────────────────────────────────────────────────────

    /// Find or create the widget for `node`. `position` is center-anchored.
    ///
    /// New widgets get the node's label, its metadata, and the row-id
    /// stamp, and are resized to `position`. None of it is synced.
    pub async fn create_node(&mut self, node: &NodeDefinition, position: &Geometry) -> SyncResult<NodeOutcome> {
        node.validate()?;
        if !position.is_valid() {
            return Err(SyncError::invalid_argument("position", position));
        }

        if let Some(existing) = self.resolve_existing(node).await? {
            return Ok(NodeOutcome::Reused(existing));
        }

        let mut widget = self.create_from_template(&node.kind, &node.label, position).await?;
        widget.set_metadata(self.config.row_id_key.clone(), Value::String(node.id.as_str().to_string()));
        for (k, v) in &node.metadata {
            widget.set_metadata(k.clone(), v.clone());
        }
        self.resize_item(&mut widget, position.width, position.height)?;
        if self.frame.is_some() {
            self.add_to_frame(&mut widget)?;
        }
        self.cache.remember(&widget);
        log::debug!("created {} for {:?}", widget.id, node.id);
        Ok(NodeOutcome::Created(widget))
    }

    /// Create the widget(s) of template `name` centered at `at`.
    ///
    /// Multi-element templates are grouped; the master element carries
    /// `label`, the others their own (label-substituted) text.
    pub async fn create_from_template(&self, name: &str, label: &str, at: &Geometry) -> SyncResult<Widget> {
        let canvas = self.canvas()?;
        let template = self
            .templates
            .get_template(name)
            .ok_or_else(|| SyncError::TemplateNotFound(name.to_string()))?;
        let master = template.master_index();

        let mut parts = Vec::with_capacity(template.elements.len());
        for (i, element) in template.elements.iter().enumerate() {
            let content = if i == master {
                label.to_string()
            } else {
                element.render_text(label).unwrap_or_default()
            };
            let geometry = Geometry::new(
                at.x + element.dx,
                at.y + element.dy,
                element.width.unwrap_or(at.width),
                element.height.unwrap_or(at.height),
            );
            let style = self.templates.resolve_style(&element.style);
            let created = if element.is_text() {
                canvas.create_text(TextArgs { content, geometry, style }).await
            } else {
                canvas
                    .create_shape(ShapeArgs {
                        shape: element.shape.clone(),
                        content,
                        geometry,
                        style,
                    })
                    .await
            };
            match created {
                Ok(widget) => parts.push(widget),
                Err(err) => return Err(self.discard_parts(&parts, err).await),
            }
        }

        match parts.len() {
            0 => Err(SyncError::TemplateNotFound(format!("{name} (no elements)"))),
            1 => Ok(parts.remove(0)),
            _ => match self.group_items(&parts).await {
                Ok(group) => Ok(group),
                Err(err) => Err(self.discard_parts(&parts, err).await),
            },
        }
    }

    /// Remove the loose parts of a template that failed half-way. Returns
    /// `err`, or the removal error if a part could not be removed.
    async fn discard_parts(&self, parts: &[Widget], err: SyncError) -> SyncError {
        if parts.is_empty() {
            return err;
        }
        log::warn!("template creation failed ({err}), removing {} part(s)", parts.len());
        let canvas = match self.canvas() {
            Ok(canvas) => canvas,
            Err(e) => return e,
        };
        for part in parts.iter().rev() {
            if let Err(e) = canvas.remove(part.id).await {
                return e;
            }
        }
        err
    }

    /// One connector per edge whose endpoints are both in `node_map`.
    ///
    /// `hints`, when given, has one entry per edge with attachment points
    /// expressed as fractions of the endpoint boxes.
    pub async fn create_edges(
        &self,
        edges: &[EdgeDefinition],
        node_map: &HashMap<NodeId, Widget>,
        hints: Option<&[Option<EdgeHint>]>,
    ) -> SyncResult<EdgeOutcome> {
        if let Some(hints) = hints
            && hints.len() != edges.len()
        {
            return Err(SyncError::invalid_argument(
                "hints",
                format!("{} hints for {} edges", hints.len(), edges.len()),
            ));
        }
        let mut outcome = EdgeOutcome::default();
        if edges.is_empty() {
            return Ok(outcome);
        }

        let canvas = self.canvas()?;
        let template_name = self.config.connector_template.as_str();
        let template = self
            .templates
            .get_connector_template(template_name)
            .ok_or_else(|| SyncError::ConnectorTemplateNotFound(template_name.to_string()))?;
        let style = self.templates.resolve_style(&template.style);

        for (i, edge) in edges.iter().enumerate() {
            let (Some(start), Some(end)) = (node_map.get(&edge.from), node_map.get(&edge.to)) else {
                log::warn!("skipping edge {:?} -> {:?}: unresolved endpoint", edge.from, edge.to);
                outcome.skipped += 1;
                continue;
            };
            let hint = hints.and_then(|h| h[i]);
            let connector = canvas
                .create_connector(ConnectorArgs {
                    start: start.id,
                    end: end.id,
                    shape: template.shape.clone(),
                    caption: edge.label.clone(),
                    start_point: hint.map(|h| h.start_point),
                    end_point: hint.map(|h| h.end_point),
                    style: style.clone(),
                })
                .await?;
            outcome.connectors.push(connector);
        }
        Ok(outcome)
    }

    // ─── In-memory mutations ─────────────────────────────────────────────

    /// Queue a size change. Groups and connectors have no own size and are
    /// left untouched.
    pub fn resize_item(&self, widget: &mut Widget, width: f64, height: f64) -> SyncResult<()> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(SyncError::invalid_argument("size", (width, height)));
        }
        match widget.kind {
            WidgetKind::Shape { .. } | WidgetKind::Text { .. } | WidgetKind::Frame { .. } => {
                let g = widget.geometry;
                if g.width != width || g.height != height {
                    widget.set_geometry(Geometry::new(g.x, g.y, width, height));
                }
            }
            WidgetKind::Group { .. } | WidgetKind::Connector { .. } => {
                log::trace!("resize ignored for {} {}", widget.tag(), widget.id);
            }
        }
        Ok(())
    }

    /// Queue a move of the widget center.
    pub fn move_item(&self, widget: &mut Widget, x: f64, y: f64) -> SyncResult<()> {
        if !(x.is_finite() && y.is_finite()) {
            return Err(SyncError::invalid_argument("position", (x, y)));
        }
        let g = widget.geometry;
        if g.x != x || g.y != y {
            widget.set_geometry(Geometry::new(x, y, g.width, g.height));
        }
        Ok(())
    }

    // ─── Canvas mutations ────────────────────────────────────────────────

    pub async fn group_items(&self, widgets: &[Widget]) -> SyncResult<Widget> {
        if widgets.is_empty() {
            return Err(SyncError::invalid_argument("widgets", "empty group"));
        }
        let ids: SmallVec<[_; 8]> = widgets.iter().map(|w| w.id).collect();
        self.canvas()?.group(&ids).await
    }

    /// Remove each widget from the canvas, stopping at the first failure.
    ///
    /// A group owns its children and takes them along; a frame does not.
    pub async fn remove_items(&mut self, widgets: &[Widget]) -> SyncResult<()> {
        let canvas = self.canvas.clone().ok_or(SyncError::NotInitialized)?;
        for widget in widgets {
            match &widget.kind {
                WidgetKind::Group { children } => {
                    for child in children {
                        canvas.remove(*child).await?;
                    }
                }
                WidgetKind::Shape { .. }
                | WidgetKind::Text { .. }
                | WidgetKind::Frame { .. }
                | WidgetKind::Connector { .. } => {}
            }
            canvas.remove(widget.id).await?;
            self.cache.forget(widget);
        }
        Ok(())
    }

    /// Persist every pending mutation. Returns how many widgets were synced.
    ///
    /// On failure the failing widget keeps its pending patch.
    pub async fn sync_all(&self, widgets: &mut [Widget]) -> SyncResult<usize> {
        let canvas = self.canvas()?;
        let mut synced = 0;
        for widget in widgets.iter_mut() {
            if !widget.has_pending() {
                continue;
            }
            let patch = widget.take_pending();
            if let Err(e) = canvas.sync(widget.id, &patch).await {
                widget.pending = patch;
                return Err(e);
            }
            synced += 1;
        }
        Ok(synced)
    }

    pub async fn zoom_to(&self, bounds: Rect) -> SyncResult<()> {
        self.canvas()?.zoom_to(bounds).await
    }

    // ─── Frames ──────────────────────────────────────────────────────────

    /// Create a frame covering `bounds` (absolute, top-left based).
    pub async fn create_frame(&self, title: &str, bounds: Rect) -> SyncResult<Widget> {
        let center = bounds.center();
        self.canvas()?
            .create_frame(FrameArgs {
                title: title.to_string(),
                geometry: Geometry::new(center.x, center.y, bounds.width(), bounds.height()),
                style: Default::default(),
            })
            .await
    }

    /// Scope subsequent creations to `frame`. `None` ends the scope.
    pub fn set_frame(&mut self, frame: Option<Widget>) {
        self.frame = frame;
    }

    pub fn frame(&self) -> Option<&Widget> {
        self.frame.as_ref()
    }

    pub fn frame_mut(&mut self) -> Option<&mut Widget> {
        self.frame.as_mut()
    }

    pub fn take_frame(&mut self) -> Option<Widget> {
        self.frame.take()
    }

    /// Put `widget` inside the scoped frame: the frame records the child id
    /// and the child's center becomes relative to the frame's top-left.
    pub fn add_to_frame(&mut self, widget: &mut Widget) -> SyncResult<()> {
        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| SyncError::invalid_argument("frame", "no frame scope set"))?;
        if frame.children().contains(&widget.id) {
            return Ok(());
        }
        let origin = frame.geometry.rect(Anchor::Center);
        let offset = offset_in(origin, widget.geometry.position());
        let g = widget.geometry;
        widget.set_geometry(Geometry::new(offset.x, offset.y, g.width, g.height));

        let mut children: cs_core::ChildIds = frame.children().iter().copied().collect();
        children.push(widget.id);
        frame.set_children(children);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCanvas;
    use cs_core::{EdgeDefinition, Point, TemplateRegistry, WidgetId};

    fn shape(id: &str, content: &str) -> Widget {
        Widget::new(
            WidgetId::intern(id),
            WidgetKind::Shape {
                shape: "rectangle".into(),
                content: content.into(),
            },
            Geometry::new(0.0, 0.0, 100.0, 50.0),
        )
    }

    fn board(canvas: Arc<MemoryCanvas>) -> Board {
        Board::new(canvas, Arc::new(TemplateRegistry::builtin()), SyncConfig::default())
    }

    #[tokio::test]
    async fn find_node_rejects_bad_arguments_before_reading() {
        let canvas = Arc::new(MemoryCanvas::new());
        let mut board = board(canvas.clone());

        let err = board.find_node("blob", "A").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument { name: "kind", .. }));
        assert!(err.to_string().contains("blob"));

        let err = board.find_node("shape", "").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument { name: "label", .. }));
        assert_eq!(canvas.calls().get_by_kind, 0);
    }

    #[tokio::test]
    async fn selection_lookup_ignores_unselected_widgets() {
        let canvas = Arc::new(MemoryCanvas::with_widgets(vec![
            shape("bd_sel", "Alpha"),
            shape("bd_other", "Beta"),
        ]));
        canvas.select(&[WidgetId::intern("bd_sel")]);
        let mut board = board(canvas.clone());

        let hit = board.find_node_in_selection("shape", "Alpha").await.unwrap();
        assert_eq!(hit.map(|w| w.id), Some(WidgetId::intern("bd_sel")));
        assert_eq!(board.find_node_in_selection("shape", "Beta").await, Ok(None));
        assert_eq!(board.find_node_in_selection("text", "Alpha").await, Ok(None));
        assert_eq!(canvas.calls().get_selection, 1);
    }

    #[tokio::test]
    async fn row_id_wins_over_label() {
        let mut stamped = shape("bd_stamped", "Renamed");
        stamped.metadata.insert("rowId".into(), Value::from("n1"));
        let canvas = Arc::new(MemoryCanvas::with_widgets(vec![shape("bd_label", "Node"), stamped]));
        let mut board = board(canvas);

        let node = NodeDefinition::new("n1", "Node", "Rectangle");
        let found = board.resolve_existing(&node).await.unwrap();
        assert_eq!(found.map(|w| w.id), Some(WidgetId::intern("bd_stamped")));
    }

    #[tokio::test]
    async fn created_node_is_stamped_but_not_synced() {
        let canvas = Arc::new(MemoryCanvas::new());
        let mut board = board(canvas.clone());
        let node = NodeDefinition::new("n2", "Fresh", "Circle");

        let outcome = board
            .create_node(&node, &Geometry::new(10.0, 20.0, 80.0, 40.0))
            .await
            .unwrap();
        let NodeOutcome::Created(widget) = outcome else {
            panic!("expected a new widget");
        };
        assert_eq!(widget.get_metadata("rowId"), Some(&Value::from("n2")));
        assert!(widget.has_pending());
        assert_eq!(canvas.calls().sync, 0);
        // the canvas still has the template's default metadata
        assert_eq!(canvas.widget(widget.id).unwrap().get_metadata("rowId"), None);
    }

    #[tokio::test]
    async fn invalid_position_is_echoed() {
        let canvas = Arc::new(MemoryCanvas::new());
        let mut board = board(canvas.clone());
        let node = NodeDefinition::new("n3", "Bad", "Rectangle");

        let err = board
            .create_node(&node, &Geometry::new(0.0, 0.0, -1.0, 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument { name: "position", .. }));
        assert!(err.to_string().contains("-1.0"));
        assert_eq!(canvas.calls().create, 0);
    }

    #[tokio::test]
    async fn hint_count_must_match_edges() {
        let canvas = Arc::new(MemoryCanvas::new());
        let board = board(canvas);
        let edges = [EdgeDefinition::new("a", "b")];
        let hints = [None, None];

        let err = board
            .create_edges(&edges, &HashMap::new(), Some(&hints))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument { name: "hints", .. }));
    }

    #[test]
    fn resize_and_move_only_queue_changes() {
        let canvas = Arc::new(MemoryCanvas::new());
        let board = board(canvas);
        let mut w = shape("bd_mv", "M");

        board.resize_item(&mut w, 100.0, 50.0).unwrap();
        assert!(!w.has_pending());
        board.move_item(&mut w, 5.0, 6.0).unwrap();
        assert_eq!(w.geometry.position(), Point::new(5.0, 6.0));
        assert!(w.has_pending());
        assert!(board.resize_item(&mut w, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn add_to_frame_needs_a_frame_scope() {
        let canvas = Arc::new(MemoryCanvas::new());
        let mut board = board(canvas);
        let mut w = shape("bd_fr", "F");
        assert!(board.add_to_frame(&mut w).is_err());
    }
}
