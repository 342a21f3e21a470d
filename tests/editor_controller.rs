use std::sync::{Arc, Mutex};

use folio::application::render::{
    DiagramPipeline, Document, EditorController, MemoryArtifactCache, MermaidCliConverter,
    MountedDocument, RenderNode, View, ViewMode,
};

fn mounted() -> MountedDocument {
    MountedDocument::with_pipeline(DiagramPipeline::new(
        Arc::new(MermaidCliConverter::new(
            "/nonexistent/folio/mmdc",
            std::time::Duration::from_secs(1),
        )),
        Arc::new(MemoryArtifactCache::default()),
    ))
}

#[test]
fn typing_reports_buffer_then_external_write_wins() {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    let mut controller = EditorController::new(Document::new("# Title").with_editable(true))
        .with_change_callback(move |buffer| {
            sink.lock().expect("changes lock").push(buffer.to_string());
        });

    controller.insert(7, "!").expect("insert at end");
    assert_eq!(
        *changes.lock().expect("changes lock"),
        vec!["# Title!".to_string()]
    );

    controller.set_source("# Replaced");
    assert_eq!(controller.buffer(), Some("# Replaced"));
    assert_eq!(changes.lock().expect("changes lock").len(), 1);
}

#[test]
fn preview_mode_renders_current_source() {
    let document = mounted();
    let mut controller = EditorController::new(Document::new("draft").with_editable(true));
    assert!(matches!(controller.view(&document), View::Raw("draft")));

    controller.set_editable(false);
    assert_eq!(controller.mode(), ViewMode::Previewing);
    controller.set_source("Hello *world*");

    match controller.view(&document) {
        View::Rendered(tree) => match &tree.nodes[..] {
            [RenderNode::Prose { html, .. }] => assert!(html.contains("<em>world</em>")),
            other => panic!("unexpected nodes: {other:?}"),
        },
        View::Raw(_) => panic!("expected rendered view"),
    }
}

#[test]
fn comment_visibility_follows_controller_flag() {
    let document = mounted();
    let mut controller = EditorController::new(Document::new("a <!-- aside --> b"));

    let hidden = match controller.view(&document) {
        View::Rendered(tree) => tree,
        View::Raw(_) => panic!("expected rendered view"),
    };
    controller.set_show_structural_comments(true);
    let shown = match controller.view(&document) {
        View::Rendered(tree) => tree,
        View::Raw(_) => panic!("expected rendered view"),
    };

    let prose = |tree: &folio::application::render::RenderTree| match &tree.nodes[0] {
        RenderNode::Prose { html, .. } => html.clone(),
        other => panic!("unexpected node: {other:?}"),
    };
    assert!(!prose(&hidden).contains("aside"));
    assert!(prose(&shown).contains("<span class=\"md-comment\">aside</span>"));
}
