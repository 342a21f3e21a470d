//! Markdown render core.
//!
//! The pipeline is pure: a [`Document`] goes in, a [`RenderTree`] of typed
//! presentation nodes comes out, and every stage degrades to a renderable
//! fallback instead of failing. Diagram conversion is the only asynchronous
//! step; it is driven by [`MountedDocument`], which owns the artifact cache
//! and the per-instance generation counters.

mod artifacts;
mod document;
mod editor;
mod runtime;
mod service;
mod types;
mod widgets;

pub use artifacts::{
    ArtifactCache, LruArtifactCache, MemoryArtifactCache, artifact_cache, content_hash,
};
pub use document::MountedDocument;
pub use editor::{ChangeCallback, EditError, EditorController, View, ViewMode};
pub use runtime::{DiagramGenerations, InFlightConversions};
pub use service::{
    CHART_FALLBACK_TITLE, COMMENT_CLASS, ComrakRenderService, CommentSpan, DIAGRAM_ID_PREFIX,
    DiagramConverter, DiagramError, DiagramOutcome, DiagramPipeline, FenceKind,
    MermaidCliConverter, RenderConfigError, RenderPipelineConfig, SVG_DATA_URI_PREFIX,
    comment_spans, configure_render_service, diagram_id, render_service, svg_data_uri,
    transform_comments,
};
pub use types::{
    Block, BlockKind, Clipboard, CopyAction, DiagramArtifact, DiagramNode, DiagramState,
    DiagramTicket, Document, LANGUAGE_CLASS_PREFIX, NODE_SLOT_ATTRIBUTE, RenderError,
    RenderNode, RenderService, RenderTree, language_from_class, slot_markup,
};
pub use widgets::{
    ControlFamily, ControlKind, PickerGranularity, Widget, WidgetChange, WidgetDescriptor,
    WidgetOption, family_for, map as map_widget,
};

pub(crate) use service::{
    METRIC_DIAGRAM_CACHE_HIT, METRIC_DIAGRAM_CACHE_MISS, METRIC_DIAGRAM_CONVERT_MS,
    METRIC_DIAGRAM_FAILURE, METRIC_DIAGRAM_STALE,
};
