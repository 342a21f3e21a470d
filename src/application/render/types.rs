use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::widgets::Widget;

/// Raw document captured from the caller together with its display flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Authoritative markdown source. Never rewritten by the pipeline.
    pub source: String,
    /// Render `<!-- -->` comments as visible, styled spans.
    #[serde(default)]
    pub show_structural_comments: bool,
    /// Show the raw editable buffer instead of the rendered tree.
    #[serde(default)]
    pub editable: bool,
}

impl Document {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            show_structural_comments: false,
            editable: false,
        }
    }

    pub fn with_structural_comments(mut self, show: bool) -> Self {
        self.show_structural_comments = show;
        self
    }

    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Prose,
    FencedCode,
}

/// One top-level segment of the parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Literal code for fenced blocks, rendered HTML for prose.
    pub raw_content: String,
    pub declared_language: Option<String>,
    /// Info-string remainder after the language token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,
    /// Code blocks nested inside prose containers (lists, quotes), in slot order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedded: Vec<Block>,
}

/// Prefix carried by the class-like attribute of a fenced block.
pub const LANGUAGE_CLASS_PREFIX: &str = "language-";

impl Block {
    pub fn prose(html: impl Into<String>, embedded: Vec<Block>) -> Self {
        Self {
            kind: BlockKind::Prose,
            raw_content: html.into(),
            declared_language: None,
            meta: None,
            embedded,
        }
    }

    /// Build a fenced block from a comrak info string and literal.
    pub fn fenced(info: &str, literal: impl Into<String>) -> Self {
        let mut segments = info.split_whitespace();
        let class = segments
            .next()
            .map(|token| format!("{LANGUAGE_CLASS_PREFIX}{token}"));
        let meta = segments.collect::<Vec<_>>().join(" ");

        Self {
            kind: BlockKind::FencedCode,
            raw_content: literal.into(),
            declared_language: class
                .as_deref()
                .and_then(language_from_class)
                .map(str::to_string),
            meta: (!meta.is_empty()).then_some(meta),
            embedded: Vec::new(),
        }
    }
}

/// Strip the `language-` prefix from a class attribute. Classes without the
/// prefix carry no language.
pub fn language_from_class(class: &str) -> Option<&str> {
    class
        .split_whitespace()
        .find_map(|token| token.strip_prefix(LANGUAGE_CLASS_PREFIX))
        .filter(|language| !language.is_empty())
}

/// Tagged output unit consumed by a presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderNode {
    /// Prose HTML. Each child is mounted into the `data-node-slot` element with
    /// the matching index.
    Prose {
        html: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<RenderNode>,
    },
    HighlightedCode {
        language: String,
        source: String,
        html: String,
        copy: CopyAction,
    },
    ChartSpec {
        option: serde_json::Value,
    },
    VectorGraphic {
        markup: String,
    },
    DiagramImage(DiagramNode),
    InteractiveWidget(Widget),
    InlineCode {
        text: String,
    },
}

/// Attribute marking where a prose child is mounted.
pub const NODE_SLOT_ATTRIBUTE: &str = "data-node-slot";

/// Empty placeholder element for prose child `index`: a `div` for block
/// content, a `span` for inline controls.
pub fn slot_markup(index: usize, block: bool) -> String {
    let tag = if block { "div" } else { "span" };
    format!("<{tag} {NODE_SLOT_ATTRIBUTE}=\"{index}\"></{tag}>")
}

/// Rendered diagram instance. `instance` is the ordinal of the diagram block
/// within the document and keys its generation counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub instance: usize,
    pub source: String,
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<DiagramTicket>,
    pub state: DiagramState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiagramState {
    /// Blank source; no render was attempted.
    Empty,
    /// Waiting on the external converter.
    Pending,
    Ready { artifact: DiagramArtifact },
    /// Conversion failed; the presentation layer shows the source instead.
    Unavailable,
}

/// Issued for every diagram render request. Only the latest ticket of an
/// instance may apply its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiagramTicket {
    pub instance: usize,
    pub generation: u64,
}

/// Displayable result of one diagram conversion, keyed by `content_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramArtifact {
    pub content_hash: String,
    /// `data:image/svg+xml;base64,...`
    pub rendered_image: String,
    pub source_text: String,
}

/// Copy-to-clipboard action attached to highlighted code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyAction {
    pub text: String,
}

impl CopyAction {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Fire-and-forget write of the bound text.
    pub fn trigger(&self, clipboard: &dyn Clipboard) {
        clipboard.write(&self.text);
    }
}

/// Clipboard side effect supplied by the host.
pub trait Clipboard: Send + Sync {
    fn write(&self, text: &str);
}

/// Result of one synchronous render pass.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderTree {
    pub nodes: Vec<RenderNode>,
}

impl RenderTree {
    pub fn new(nodes: Vec<RenderNode>) -> Self {
        Self { nodes }
    }

    /// All diagram nodes in document order, including ones nested in prose.
    pub fn diagrams(&self) -> Vec<&DiagramNode> {
        fn collect<'a>(nodes: &'a [RenderNode], out: &mut Vec<&'a DiagramNode>) {
            for node in nodes {
                match node {
                    RenderNode::DiagramImage(diagram) => out.push(diagram),
                    RenderNode::Prose { children, .. } => collect(children, out),
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        collect(&self.nodes, &mut out);
        out
    }

    /// Build a new tree with every diagram node passed through `f`.
    pub fn map_diagrams(&self, mut f: impl FnMut(&DiagramNode) -> DiagramNode) -> RenderTree {
        fn map(
            nodes: &[RenderNode],
            f: &mut dyn FnMut(&DiagramNode) -> DiagramNode,
        ) -> Vec<RenderNode> {
            nodes
                .iter()
                .map(|node| match node {
                    RenderNode::DiagramImage(diagram) => RenderNode::DiagramImage(f(diagram)),
                    RenderNode::Prose { html, children } => RenderNode::Prose {
                        html: html.clone(),
                        children: map(children, f),
                    },
                    other => other.clone(),
                })
                .collect()
        }

        RenderTree::new(map(&self.nodes, &mut f))
    }

    pub fn has_pending_diagrams(&self) -> bool {
        self.diagrams()
            .iter()
            .any(|diagram| matches!(diagram.state, DiagramState::Pending))
    }
}

/// Internal failures raised inside the render stages. Producers convert these
/// into fallback nodes; they never escape a render pass.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("markdown parsing failed: {message}")]
    Markdown { message: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
    #[error("markup rewrite failed: {message}")]
    Markup { message: String },
}

/// Pure rendering pipeline: identical documents yield identical trees.
pub trait RenderService: Send + Sync {
    fn render(&self, document: &Document) -> RenderTree;
}
