use crate::application::render::{
    artifacts::content_hash,
    types::{Block, CopyAction, DiagramNode, DiagramState, RenderNode},
};

use super::{chart, highlight::Highlighter};

/// Renderer selected for a fenced block by its declared language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceKind {
    Chart,
    VectorGraphic,
    Diagram,
    Code(String),
    /// No declared language.
    Unrecognized,
}

impl FenceKind {
    pub fn classify(declared_language: Option<&str>) -> Self {
        let Some(language) = declared_language.map(str::trim).filter(|l| !l.is_empty()) else {
            return Self::Unrecognized;
        };

        match language.to_ascii_lowercase().as_str() {
            "chart-spec" | "echarts" => Self::Chart,
            "vector-graphic" | "svg" => Self::VectorGraphic,
            "diagram-source" | "mermaid" => Self::Diagram,
            _ => Self::Code(language.to_string()),
        }
    }
}

pub(crate) struct DispatchContext<'a> {
    highlighter: &'a Highlighter,
    next_diagram: usize,
}

impl<'a> DispatchContext<'a> {
    pub(crate) fn new(highlighter: &'a Highlighter) -> Self {
        Self {
            highlighter,
            next_diagram: 0,
        }
    }
}

/// Produce exactly one node for a fenced block. Never fails.
pub(crate) fn dispatch(block: &Block, ctx: &mut DispatchContext<'_>) -> RenderNode {
    let raw = block.raw_content.as_str();

    match FenceKind::classify(block.declared_language.as_deref()) {
        FenceKind::Chart => chart::produce(raw),
        // Trusted markup: injected verbatim without sanitisation.
        FenceKind::VectorGraphic => RenderNode::VectorGraphic {
            markup: raw.chars().filter(|ch| !matches!(ch, '\n' | '\r')).collect(),
        },
        FenceKind::Diagram => {
            let instance = ctx.next_diagram;
            ctx.next_diagram += 1;
            diagram_node(instance, raw)
        }
        FenceKind::Code(language) => RenderNode::HighlightedCode {
            html: ctx
                .highlighter
                .highlight(&language, block.meta.as_deref(), raw),
            copy: CopyAction::new(raw),
            source: raw.to_string(),
            language,
        },
        FenceKind::Unrecognized => RenderNode::InlineCode {
            text: raw.to_string(),
        },
    }
}

fn diagram_node(instance: usize, source: &str) -> RenderNode {
    let blank = source.trim().is_empty();
    RenderNode::DiagramImage(DiagramNode {
        instance,
        source: source.to_string(),
        content_hash: (!blank).then(|| content_hash(source)),
        ticket: None,
        state: if blank {
            DiagramState::Empty
        } else {
            DiagramState::Pending
        },
    })
}

#[cfg(test)]
mod tests {
    use syntect::parsing::SyntaxSet;

    use super::*;

    fn run(block: Block) -> RenderNode {
        let highlighter = Highlighter::new(SyntaxSet::load_defaults_newlines());
        let mut ctx = DispatchContext::new(&highlighter);
        dispatch(&block, &mut ctx)
    }

    #[test]
    fn classify_is_a_closed_set() {
        assert_eq!(FenceKind::classify(Some("chart-spec")), FenceKind::Chart);
        assert_eq!(FenceKind::classify(Some("ECharts")), FenceKind::Chart);
        assert_eq!(
            FenceKind::classify(Some("vector-graphic")),
            FenceKind::VectorGraphic
        );
        assert_eq!(FenceKind::classify(Some("mermaid")), FenceKind::Diagram);
        assert_eq!(
            FenceKind::classify(Some("diagram-source")),
            FenceKind::Diagram
        );
        assert_eq!(
            FenceKind::classify(Some("python")),
            FenceKind::Code("python".into())
        );
        assert_eq!(FenceKind::classify(None), FenceKind::Unrecognized);
        assert_eq!(FenceKind::classify(Some("  ")), FenceKind::Unrecognized);
    }

    #[test]
    fn vector_graphic_strips_newlines_only() {
        let node = run(Block::fenced("vector-graphic", "<svg>\n<rect/>\n</svg>"));
        assert_eq!(
            node,
            RenderNode::VectorGraphic {
                markup: "<svg><rect/></svg>".into()
            }
        );
    }

    #[test]
    fn missing_language_is_inline_code() {
        let node = run(Block::fenced("", "let x = 1;\n"));
        assert_eq!(
            node,
            RenderNode::InlineCode {
                text: "let x = 1;\n".into()
            }
        );
    }

    #[test]
    fn other_language_is_highlighted_with_exact_copy_text() {
        let source = "print('hi')\n\n";
        match run(Block::fenced("python", source)) {
            RenderNode::HighlightedCode {
                language,
                source: kept,
                copy,
                html,
            } => {
                assert_eq!(language, "python");
                assert_eq!(kept, source);
                assert_eq!(copy.text, source);
                assert!(html.contains("data-language=\"python\""));
            }
            other => panic!("expected highlighted code, got {other:?}"),
        }
    }

    #[test]
    fn malformed_chart_degrades_to_fallback_chart() {
        match run(Block::fenced("chart-spec", "{ nope")) {
            RenderNode::ChartSpec { option } => {
                assert_eq!(option["title"]["text"], chart::CHART_FALLBACK_TITLE);
            }
            other => panic!("expected chart, got {other:?}"),
        }
    }

    #[test]
    fn diagrams_are_numbered_and_hashed() {
        let highlighter = Highlighter::new(SyntaxSet::load_defaults_newlines());
        let mut ctx = DispatchContext::new(&highlighter);
        let first = dispatch(&Block::fenced("mermaid", "graph TD;A-->B"), &mut ctx);
        let blank = dispatch(&Block::fenced("mermaid", "  \n"), &mut ctx);

        match (first, blank) {
            (RenderNode::DiagramImage(first), RenderNode::DiagramImage(blank)) => {
                assert_eq!(first.instance, 0);
                assert_eq!(first.state, DiagramState::Pending);
                assert_eq!(
                    first.content_hash.as_deref(),
                    Some(content_hash("graph TD;A-->B").as_str())
                );
                assert_eq!(blank.instance, 1);
                assert_eq!(blank.state, DiagramState::Empty);
                assert!(blank.content_hash.is_none());
            }
            other => panic!("expected diagrams, got {other:?}"),
        }
    }
}
