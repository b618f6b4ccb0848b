//! Integration tests: flat graph imports (cs-engine).
//!
//! Drives `GraphProcessor` against a `MemoryCanvas` and checks what ends up
//! on the board: commit and rollback, re-import without duplicates, the
//! three existing-node modes, and frame wrapping.

use cs_core::{
    ColumnMapping, Geometry, GraphData, Point, Rect, Row, SyncConfig, SyncError, TemplateRegistry, Widget, WidgetId,
    WidgetKind, WidgetKindTag, rows_to_graph,
};
use cs_engine::{Board, CallCounts, ExistingMode, GraphProcessor, MemoryCanvas, ProcessOptions, ProcessReport};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

const PIPELINE: &str = include_str!("fixtures/pipeline.json");

fn processor(canvas: &Arc<MemoryCanvas>) -> GraphProcessor {
    let board = Board::new(canvas.clone(), Arc::new(TemplateRegistry::builtin()), SyncConfig::default());
    GraphProcessor::new(board)
}

fn pipeline() -> GraphData {
    GraphData::from_json(PIPELINE).unwrap()
}

fn options(mode: ExistingMode) -> ProcessOptions {
    ProcessOptions {
        existing_mode: mode,
        ..Default::default()
    }
}

fn by_row_id(canvas: &MemoryCanvas, row_id: &str) -> Option<Widget> {
    canvas
        .widgets()
        .into_iter()
        .find(|w| w.get_metadata("rowId") == Some(&json!(row_id)))
}

/// A user-made "Intake" shape sitting at (5, 6).
fn hand_drawn_intake() -> Widget {
    Widget::new(
        WidgetId::intern("user_intake"),
        WidgetKind::Shape {
            shape: "rectangle".into(),
            content: "Intake".into(),
        },
        Geometry::new(5.0, 6.0, 160.0, 80.0),
    )
}

// ─── Commit ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_import_creates_and_commits_everything() {
    let canvas = Arc::new(MemoryCanvas::new());
    let mut proc = processor(&canvas);

    let report = proc.process_graph(&pipeline(), &ProcessOptions::default()).await.unwrap();
    assert_eq!(
        report,
        ProcessReport {
            created: 3,
            reused: 0,
            moved: 0,
            edges_created: 2,
            edges_skipped: 0,
            frame: None,
        }
    );
    assert_eq!(canvas.count_kind(WidgetKindTag::Shape), 3);
    assert_eq!(canvas.count_kind(WidgetKindTag::Connector), 2);
    assert_eq!(proc.ledger().len(), 5);

    // stamps were committed, not only queued
    let review = by_row_id(&canvas, "review").expect("review committed");
    assert_eq!(review.content(), Some("Review"));
    assert_eq!(review.get_metadata("owner"), Some(&json!("ops")));
    assert_eq!(canvas.calls().sync, 3);

    // layered layout: one rank per step, top-left at the origin
    let intake = by_row_id(&canvas, "intake").unwrap();
    assert_eq!(intake.geometry, Geometry::new(80.0, 40.0, 160.0, 80.0));
    let ship = by_row_id(&canvas, "ship").unwrap();
    assert_eq!(ship.geometry.position(), Point::new(640.0, 40.0));
    assert_eq!(canvas.current_viewport(), Rect::new(0.0, 0.0, 720.0, 80.0));
}

#[tokio::test]
async fn connectors_carry_caption_and_fractional_hints() {
    let canvas = Arc::new(MemoryCanvas::new());
    let mut proc = processor(&canvas);
    proc.process_graph(&pipeline(), &ProcessOptions::default()).await.unwrap();

    let intake = by_row_id(&canvas, "intake").unwrap();
    let connector = canvas
        .widgets()
        .into_iter()
        .find(|w| matches!(&w.kind, WidgetKind::Connector { start, .. } if *start == intake.id))
        .expect("intake -> review connector");
    match connector.kind {
        WidgetKind::Connector {
            caption,
            start_point,
            end_point,
            ..
        } => {
            assert_eq!(caption.as_deref(), Some("next"));
            assert_eq!(start_point, Some(Point::new(1.0, 0.5)));
            assert_eq!(end_point, Some(Point::new(0.0, 0.5)));
        }
        other => panic!("expected connector, got {other:?}"),
    }
    assert_eq!(connector.style.get("shape"), Some("elbowed"));
}

#[tokio::test]
async fn dangling_edges_are_skipped_and_counted() {
    let canvas = Arc::new(MemoryCanvas::new());
    let mut proc = processor(&canvas);
    let graph = GraphData::from_json(
        r#"{ "nodes": [{ "id": "solo", "label": "Solo", "type": "Rectangle" }],
             "edges": [{ "from": "solo", "to": "ghost" }] }"#,
    )
    .unwrap();

    let report = proc.process_graph(&graph, &ProcessOptions::default()).await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.edges_created, 0);
    assert_eq!(report.edges_skipped, 1);
}

// ─── Rollback ───────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_commit_removes_exactly_what_was_created() {
    let canvas = Arc::new(MemoryCanvas::with_widgets(vec![hand_drawn_intake()]));
    canvas.fail_sync_after(1);
    let mut proc = processor(&canvas);

    let err = proc
        .process_graph(&pipeline(), &options(ExistingMode::Ignore))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Canvas { op: "sync", .. }), "{err}");

    // two new shapes and two connectors were created, then removed
    assert_eq!(canvas.calls().remove, 4);
    assert!(proc.ledger().is_empty());
    let left: Vec<_> = canvas.widgets().into_iter().map(|w| w.id).collect();
    assert_eq!(left, vec![WidgetId::intern("user_intake")]);
}

#[tokio::test]
async fn failed_creation_rolls_back_earlier_creations() {
    let canvas = Arc::new(MemoryCanvas::new());
    canvas.fail_create_after(2);
    let mut proc = processor(&canvas);

    let err = proc
        .process_graph(&pipeline(), &ProcessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Canvas { op: "create", .. }), "{err}");
    assert_eq!(canvas.calls().remove, 2);
    assert!(canvas.is_empty());
}

#[tokio::test]
async fn failed_rollback_reports_the_removal_error() {
    let canvas = Arc::new(MemoryCanvas::new());
    canvas.fail_sync_after(0);
    canvas.fail_removes(true);
    let mut proc = processor(&canvas);

    let err = proc
        .process_graph(&pipeline(), &ProcessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Canvas { op: "remove", .. }), "{err}");
    assert_eq!(proc.ledger().len(), 5);
}

#[tokio::test]
async fn failed_commit_leaves_moved_widget_where_it_was() {
    let canvas = Arc::new(MemoryCanvas::with_widgets(vec![hand_drawn_intake()]));
    canvas.fail_sync_after(1);
    let mut proc = processor(&canvas);

    let err = proc.process_graph(&pipeline(), &options(ExistingMode::Move)).await.unwrap_err();
    assert!(matches!(err, SyncError::Canvas { op: "sync", .. }), "{err}");

    let intake = canvas.widget(WidgetId::intern("user_intake")).unwrap();
    assert_eq!(intake.geometry.position(), Point::new(5.0, 6.0));
    assert_eq!(canvas.widgets(), vec![hand_drawn_intake()]);
}

#[tokio::test]
async fn committed_moves_are_reverted_when_a_later_sync_fails() {
    let review = Widget::new(
        WidgetId::intern("user_review"),
        WidgetKind::Shape {
            shape: "rectangle".into(),
            content: "Review".into(),
        },
        Geometry::new(500.0, 300.0, 160.0, 80.0),
    );
    let canvas = Arc::new(MemoryCanvas::with_widgets(vec![hand_drawn_intake(), review.clone()]));
    // ship is committed first, then intake, then review fails
    canvas.fail_nth_sync(3);
    let mut proc = processor(&canvas);

    let err = proc.process_graph(&pipeline(), &options(ExistingMode::Move)).await.unwrap_err();
    assert!(matches!(err, SyncError::Canvas { op: "sync", .. }), "{err}");
    assert_eq!(canvas.calls().sync, 4);
    assert_eq!(canvas.widgets(), vec![hand_drawn_intake(), review]);
}

#[tokio::test]
async fn malformed_document_never_touches_the_canvas() {
    let canvas = Arc::new(MemoryCanvas::new());
    let mut proc = processor(&canvas);

    let err = proc
        .process_graph_json(r#"{ "nodes": [ { "id": "a" "#, &ProcessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidGraph(_)));

    let err = proc
        .process_graph_json(
            r#"{ "nodes": [ { "id": "a", "label": "", "type": "Rectangle" } ] }"#,
            &ProcessOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Invalid graph data: node 0 is incomplete"));
    assert_eq!(canvas.calls(), CallCounts::default());
}

// ─── Re-import & existing-node modes ────────────────────────────────────

#[tokio::test]
async fn reimport_reuses_every_node() {
    let canvas = Arc::new(MemoryCanvas::new());
    let mut proc = processor(&canvas);
    proc.process_graph(&pipeline(), &ProcessOptions::default()).await.unwrap();

    let report = proc.process_graph(&pipeline(), &ProcessOptions::default()).await.unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.reused, 3);
    assert_eq!(canvas.count_kind(WidgetKindTag::Shape), 3);
    // edges have no identity: each run draws its own connectors
    assert_eq!(canvas.count_kind(WidgetKindTag::Connector), 4);
    assert_eq!(proc.ledger().len(), 2);
}

#[tokio::test]
async fn ignore_mode_leaves_existing_widget_alone() {
    let canvas = Arc::new(MemoryCanvas::with_widgets(vec![hand_drawn_intake()]));
    let mut proc = processor(&canvas);

    let report = proc
        .process_graph(&pipeline(), &options(ExistingMode::Ignore))
        .await
        .unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.reused, 1);

    let intake = canvas.widget(WidgetId::intern("user_intake")).unwrap();
    assert_eq!(intake.geometry.position(), Point::new(5.0, 6.0));
    assert_eq!(intake.get_metadata("rowId"), None);
    assert_eq!(canvas.count_kind(WidgetKindTag::Shape), 3);
    assert!(proc.ledger().last_created().iter().all(|w| w.id != intake.id));

    // undo keeps the user's widget
    proc.undo_last().await.unwrap();
    assert_eq!(canvas.widgets(), vec![intake]);
}

#[tokio::test]
async fn move_mode_lays_out_existing_widget_again() {
    let canvas = Arc::new(MemoryCanvas::with_widgets(vec![hand_drawn_intake()]));
    let mut proc = processor(&canvas);

    let report = proc.process_graph(&pipeline(), &options(ExistingMode::Move)).await.unwrap();
    assert_eq!(report.moved, 1);
    assert_eq!(report.created, 2);

    let intake = canvas.widget(WidgetId::intern("user_intake")).unwrap();
    assert_eq!(intake.geometry.position(), Point::new(80.0, 40.0));
    assert_eq!(intake.content(), Some("Intake"));
}

#[tokio::test]
async fn layout_mode_keeps_pinned_widget_and_places_new_ones_around_it() {
    let canvas = Arc::new(MemoryCanvas::with_widgets(vec![hand_drawn_intake()]));
    let mut proc = processor(&canvas);

    let report = proc
        .process_graph(&pipeline(), &options(ExistingMode::Layout))
        .await
        .unwrap();
    assert_eq!(report.moved, 0);
    assert_eq!(report.reused, 1);

    let intake = canvas.widget(WidgetId::intern("user_intake")).unwrap();
    assert_eq!(intake.geometry.position(), Point::new(5.0, 6.0));
    let pinned_right = intake.geometry.rect(cs_core::Anchor::Center).x1;
    for row_id in ["review", "ship"] {
        let placed = by_row_id(&canvas, row_id).unwrap();
        assert!(placed.geometry.rect(cs_core::Anchor::Center).x0 > pinned_right, "{row_id} overlaps");
    }
}

// ─── Frames ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn frame_wraps_result_with_relative_children() {
    let canvas = Arc::new(MemoryCanvas::new());
    let mut proc = processor(&canvas);
    let opts = ProcessOptions {
        create_frame: true,
        frame_title: Some("Sprint".into()),
        ..Default::default()
    };

    let report = proc.process_graph(&pipeline(), &opts).await.unwrap();
    let frame = canvas.widget(report.frame.expect("frame id")).unwrap();
    assert_eq!(frame.content(), Some("Sprint"));
    // node extent (0,0)-(720,80) plus 40 padding
    assert_eq!(frame.geometry, Geometry::new(360.0, 40.0, 800.0, 160.0));
    assert_eq!(frame.children().len(), 3);

    let intake = by_row_id(&canvas, "intake").unwrap();
    assert!(frame.children().contains(&intake.id));
    assert_eq!(intake.geometry.position(), Point::new(120.0, 80.0));
    assert_eq!(canvas.current_viewport(), Rect::new(-40.0, -40.0, 760.0, 120.0));

    // the frame belongs to the operation
    assert_eq!(proc.undo_last().await, Ok(6));
    assert!(canvas.is_empty());
}

#[tokio::test]
async fn frame_with_same_title_is_reused() {
    let existing = Widget::new(
        WidgetId::intern("user_frame"),
        WidgetKind::Frame {
            title: "Sprint".into(),
            children: Default::default(),
        },
        Geometry::new(0.0, 0.0, 100.0, 100.0),
    );
    let canvas = Arc::new(MemoryCanvas::with_widgets(vec![existing]));
    let mut proc = processor(&canvas);
    let opts = ProcessOptions {
        create_frame: true,
        frame_title: Some("Sprint".into()),
        ..Default::default()
    };

    let report = proc.process_graph(&pipeline(), &opts).await.unwrap();
    assert_eq!(report.frame, Some(WidgetId::intern("user_frame")));
    assert_eq!(canvas.count_kind(WidgetKindTag::Frame), 1);
    let frame = canvas.widget(WidgetId::intern("user_frame")).unwrap();
    assert_eq!(frame.children().len(), 3);
    // old box (-50,-50)-(50,50) grown to cover the padded extent (-40,-40)-(760,120)
    assert_eq!(frame.geometry, Geometry::new(355.0, 35.0, 810.0, 170.0));

    proc.undo_last().await.unwrap();
    assert!(canvas.widget(WidgetId::intern("user_frame")).is_some());
}

// ─── Rows ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn rows_import_through_column_mapping() {
    let rows: Vec<Row> = serde_json::from_str(include_str!("fixtures/rows.json")).unwrap();
    let mapping = ColumnMapping {
        id_column: Some("id".into()),
        label_column: Some("name".into()),
        metadata_columns: vec!["owner".into()],
        ..Default::default()
    };
    let graph = rows_to_graph(&rows, &mapping, "Rectangle").unwrap();

    let canvas = Arc::new(MemoryCanvas::new());
    let mut proc = processor(&canvas);
    let report = proc.process_graph(&graph, &ProcessOptions::default()).await.unwrap();
    assert_eq!(report.created, 3);

    let alpha = by_row_id(&canvas, "r-1").unwrap();
    assert_eq!(alpha.content(), Some("Alpha"));
    assert_eq!(alpha.get_metadata("owner"), Some(&json!("kim")));
    assert_eq!(by_row_id(&canvas, "r-3").unwrap().get_metadata("owner"), None);
}
