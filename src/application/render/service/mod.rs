mod chart;
mod comments;
mod config;
mod diagram;
mod dispatch;
mod highlight;
mod markup;
mod parse;

use std::{path::PathBuf, sync::Arc, time::Duration};

use once_cell::sync::{Lazy, OnceCell};
use thiserror::Error;
use tracing::warn;

use crate::application::render::{
    artifacts::artifact_cache,
    types::{Block, BlockKind, Document, RenderError, RenderNode, RenderService, RenderTree},
    widgets,
};
use crate::config::{
    DEFAULT_DIAGRAM_CACHE_CAPACITY, DEFAULT_DIAGRAM_CLI_PATH, DEFAULT_DIAGRAM_TIMEOUT_SECONDS,
};

use self::{
    config::default_options,
    dispatch::{DispatchContext, dispatch},
    highlight::Highlighter,
};

pub use chart::CHART_FALLBACK_TITLE;
pub use comments::{COMMENT_CLASS, CommentSpan, comment_spans, transform as transform_comments};
pub use diagram::{
    DIAGRAM_ID_PREFIX, DiagramConverter, DiagramError, DiagramOutcome, DiagramPipeline,
    MermaidCliConverter, SVG_DATA_URI_PREFIX, diagram_id, svg_data_uri,
};
pub use dispatch::FenceKind;

pub(crate) use diagram::{
    METRIC_DIAGRAM_CACHE_HIT, METRIC_DIAGRAM_CACHE_MISS, METRIC_DIAGRAM_CONVERT_MS,
    METRIC_DIAGRAM_FAILURE, METRIC_DIAGRAM_STALE,
};

/// Comrak-based render pipeline: comment transform, block split, per-block
/// dispatch and widget extraction. Never fails; every stage degrades to a
/// fallback node.
pub struct ComrakRenderService {
    options: comrak::Options<'static>,
    highlighter: Highlighter,
}

impl ComrakRenderService {
    fn new() -> Self {
        Self {
            options: default_options(),
            highlighter: Highlighter::from_build_pack(),
        }
    }

    /// Normalized block list for `document`, before dispatch.
    pub fn blocks(&self, document: &Document) -> Result<Vec<Block>, RenderError> {
        let source =
            comments::transform(&document.source, document.show_structural_comments);
        parse::parse_blocks(&source, &self.options)
    }

    fn prose_node(&self, block: &Block, ctx: &mut DispatchContext<'_>) -> RenderNode {
        let mut children: Vec<RenderNode> = block
            .embedded
            .iter()
            .map(|embedded| dispatch(embedded, ctx))
            .collect();

        match markup::rewrite_prose(&block.raw_content, children.len()) {
            Ok(outcome) => {
                children.extend(outcome.widgets.iter().map(widgets::map));
                RenderNode::Prose {
                    html: outcome.html,
                    children,
                }
            }
            Err(err) => {
                warn!(
                    target = "application::render::markup",
                    op = "render::prose",
                    result = "fallback",
                    error = %err,
                    "Prose markup rewrite failed; emitting escaped text"
                );
                RenderNode::Prose {
                    html: ammonia::clean_text(&block.raw_content),
                    children: Vec::new(),
                }
            }
        }
    }
}

static RENDER_SERVICE: Lazy<Arc<ComrakRenderService>> =
    Lazy::new(|| Arc::new(ComrakRenderService::new()));

/// Access the shared render service instance, initialised on first use.
pub fn render_service() -> Arc<ComrakRenderService> {
    Arc::clone(&RENDER_SERVICE)
}

impl Default for ComrakRenderService {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderService for ComrakRenderService {
    fn render(&self, document: &Document) -> RenderTree {
        let blocks = match self.blocks(document) {
            Ok(blocks) => blocks,
            Err(err) => {
                warn!(
                    target = "application::render::parse",
                    op = "render::parse",
                    result = "fallback",
                    error = %err,
                    "Markdown parsing failed; emitting source as text"
                );
                return RenderTree::new(vec![RenderNode::InlineCode {
                    text: document.source.clone(),
                }]);
            }
        };

        let mut ctx = DispatchContext::new(&self.highlighter);
        let nodes = blocks
            .iter()
            .map(|block| match block.kind {
                BlockKind::FencedCode => dispatch(block, &mut ctx),
                BlockKind::Prose => self.prose_node(block, &mut ctx),
            })
            .collect();

        RenderTree::new(nodes)
    }
}

#[derive(Debug, Clone)]
pub struct RenderPipelineConfig {
    pub diagram_cli_path: PathBuf,
    pub diagram_timeout: Duration,
    /// `0` keeps every artifact for the life of the mounted document.
    pub diagram_cache_capacity: usize,
}

impl Default for RenderPipelineConfig {
    fn default() -> Self {
        Self {
            diagram_cli_path: PathBuf::from(DEFAULT_DIAGRAM_CLI_PATH),
            diagram_timeout: Duration::from_secs(DEFAULT_DIAGRAM_TIMEOUT_SECONDS),
            diagram_cache_capacity: DEFAULT_DIAGRAM_CACHE_CAPACITY,
        }
    }
}

impl From<&crate::config::RenderSettings> for RenderPipelineConfig {
    fn from(settings: &crate::config::RenderSettings) -> Self {
        Self {
            diagram_cli_path: settings.diagram_cli_path.clone(),
            diagram_timeout: Duration::from_secs(u64::from(
                settings.diagram_timeout_seconds.get(),
            )),
            diagram_cache_capacity: settings.diagram_cache_capacity,
        }
    }
}

impl RenderPipelineConfig {
    /// Diagram pipeline backed by the Mermaid CLI and a fresh artifact cache.
    pub fn diagram_pipeline(&self) -> DiagramPipeline {
        DiagramPipeline::new(
            Arc::new(MermaidCliConverter::new(
                self.diagram_cli_path.clone(),
                self.diagram_timeout,
            )),
            artifact_cache(self.diagram_cache_capacity),
        )
    }
}

#[derive(Debug, Error)]
pub enum RenderConfigError {
    #[error("render service already configured")]
    AlreadyConfigured,
}

static RENDER_PIPELINE_CONFIG: OnceCell<RenderPipelineConfig> = OnceCell::new();

pub fn configure_render_service(config: RenderPipelineConfig) -> Result<(), RenderConfigError> {
    RENDER_PIPELINE_CONFIG
        .set(config)
        .map_err(|_| RenderConfigError::AlreadyConfigured)
}

pub(crate) fn active_render_config() -> RenderPipelineConfig {
    RENDER_PIPELINE_CONFIG.get().cloned().unwrap_or_default()
}
