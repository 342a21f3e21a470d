//! HTML writer for render trees.
//!
//! Every node is written as a self-describing element carrying a `data-role`
//! attribute so a host script can attach charts, copy buttons and widget
//! listeners without re-parsing the tree.

use std::{cell::RefCell, fmt::Write as _};

use ammonia::clean_text;
use lol_html::{RewriteStrSettings, element, html_content::ContentType, rewrite_str};

use crate::{
    application::render::{
        ControlFamily, ControlKind, DiagramNode, DiagramState, NODE_SLOT_ATTRIBUTE, RenderNode,
        RenderTree, Widget,
    },
    util::html::escape_attribute,
};

const SYNTAX_THEME_CSS: &str = include_str!(env!("SYNTAX_THEME_CSS_FILE"));

const BASE_CSS: &str = r#".md-comment { color: #6a737d; font-style: italic; }
figure[data-role="code-block"] { position: relative; margin: 1em 0; }
button[data-role="code-copy-button"] { position: absolute; top: 0.5em; right: 0.5em; }
figure[data-role="diagram"] img { max-width: 100%; }
div[data-role="chart"] { min-height: 320px; }"#;

/// Write the whole tree as an HTML fragment.
pub fn write_tree(tree: &RenderTree) -> String {
    let mut out = String::new();
    for node in &tree.nodes {
        write_node(node, &mut out);
        out.push('\n');
    }
    out
}

/// Write the tree as a standalone page including the syntax stylesheet.
pub fn write_document(tree: &RenderTree, title: &str) -> String {
    let mut out = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{}</title>", clean_text(title));
    out.push_str("<style>\n");
    out.push_str(BASE_CSS);
    out.push('\n');
    out.push_str(SYNTAX_THEME_CSS);
    out.push_str("</style>\n</head>\n<body>\n<article class=\"folio\">\n");
    out.push_str(&write_tree(tree));
    out.push_str("</article>\n</body>\n</html>\n");
    out
}

pub fn write_node(node: &RenderNode, out: &mut String) {
    match node {
        RenderNode::Prose { html, children } => write_prose(html, children, out),
        RenderNode::HighlightedCode {
            language,
            html,
            copy,
            ..
        } => {
            let _ = write!(
                out,
                "<figure class=\"code-block\" data-role=\"code-block\" data-language=\"{}\">{html}<button type=\"button\" data-role=\"code-copy-button\" data-copy-text=\"{}\">Copy</button></figure>",
                escape_attribute(language),
                escape_attribute(&copy.text),
            );
        }
        RenderNode::ChartSpec { option } => {
            let _ = write!(
                out,
                "<div data-role=\"chart\" data-option=\"{}\"></div>",
                escape_attribute(&option.to_string())
            );
        }
        RenderNode::VectorGraphic { markup } => {
            let _ = write!(out, "<div data-role=\"vector-graphic\">{markup}</div>");
        }
        RenderNode::DiagramImage(diagram) => write_diagram(diagram, out),
        RenderNode::InteractiveWidget(widget) => write_widget(widget, out),
        RenderNode::InlineCode { text } => {
            let _ = write!(
                out,
                "<pre data-role=\"inline-code\"><code>{}</code></pre>",
                clean_text(text)
            );
        }
    }
}

/// Mount each child into the slot element carrying its index. Children whose
/// slot is missing are appended after the prose.
fn write_prose(html: &str, children: &[RenderNode], out: &mut String) {
    let rendered: Vec<String> = children
        .iter()
        .map(|child| {
            let mut markup = String::new();
            write_node(child, &mut markup);
            markup
        })
        .collect();
    let placed = RefCell::new(vec![false; rendered.len()]);
    let selector = format!("[{NODE_SLOT_ATTRIBUTE}]");

    let filled = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(selector.as_str(), |el| {
                let index = el
                    .get_attribute(NODE_SLOT_ATTRIBUTE)
                    .and_then(|value| value.parse::<usize>().ok());
                let Some(index) = index.filter(|index| *index < rendered.len()) else {
                    return Ok(());
                };
                let mut placed = placed.borrow_mut();
                if !placed[index] {
                    el.replace(&rendered[index], ContentType::Html);
                    placed[index] = true;
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    );

    let Ok(filled) = filled else {
        out.push_str(html);
        rendered.iter().for_each(|markup| out.push_str(markup));
        return;
    };
    out.push_str(&filled);
    for (markup, done) in rendered.iter().zip(placed.into_inner()) {
        if !done {
            out.push_str(markup);
        }
    }
}

fn write_diagram(diagram: &DiagramNode, out: &mut String) {
    match &diagram.state {
        DiagramState::Ready { artifact } => {
            let _ = write!(
                out,
                "<figure data-role=\"diagram\" data-state=\"ready\" data-content-hash=\"{}\"><img src=\"{}\" alt=\"diagram\"></figure>",
                escape_attribute(&artifact.content_hash),
                escape_attribute(&artifact.rendered_image),
            );
        }
        DiagramState::Empty => {
            out.push_str("<figure data-role=\"diagram\" data-state=\"empty\"></figure>");
        }
        DiagramState::Pending | DiagramState::Unavailable => {
            let state = if diagram.state == DiagramState::Pending {
                "pending"
            } else {
                "unavailable"
            };
            let _ = write!(
                out,
                "<figure data-role=\"diagram\" data-state=\"{state}\"><pre><code>{}</code></pre></figure>",
                clean_text(&diagram.source)
            );
        }
    }
}

fn write_widget(widget: &Widget, out: &mut String) {
    let family = family_token(widget.family);
    match widget.family {
        ControlFamily::ChoiceList => {
            let _ = write!(out, "<select data-role=\"widget\" data-family=\"{family}\"");
            write_attributes(widget, &["type"], out);
            out.push('>');
            for option in &widget.options {
                let selected = if widget.bound_value.as_deref() == Some(option.value.as_str()) {
                    " selected"
                } else {
                    ""
                };
                let _ = write!(
                    out,
                    "<option value=\"{}\"{selected}>{}</option>",
                    escape_attribute(&option.value),
                    clean_text(&option.label)
                );
            }
            out.push_str("</select>");
        }
        ControlFamily::Action => {
            let _ = write!(
                out,
                "<button type=\"submit\" data-role=\"widget\" data-family=\"{family}\""
            );
            write_attributes(widget, &["type"], out);
            let _ = write!(
                out,
                ">{}</button>",
                clean_text(widget.label.as_deref().unwrap_or("Submit"))
            );
        }
        _ => {
            let _ = write!(
                out,
                "<input type=\"{}\" data-role=\"widget\" data-family=\"{family}\"",
                input_type(widget.kind)
            );
            if widget.checked.is_some() {
                write_attributes(widget, &["type", "checked"], out);
            } else {
                write_attributes(widget, &["type", "value"], out);
                if let Some(value) = widget.bound_value.as_deref() {
                    let _ = write!(out, " value=\"{}\"", escape_attribute(value));
                }
            }
            if widget.checked == Some(true) {
                out.push_str(" checked");
            }
            out.push('>');
        }
    }
}

fn write_attributes(widget: &Widget, skip: &[&str], out: &mut String) {
    for (name, value) in &widget.attributes {
        if skip.contains(&name.as_str()) || name.starts_with("data-role") || !is_safe_name(name) {
            continue;
        }
        let _ = write!(out, " {name}=\"{}\"", escape_attribute(value));
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with("on")
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ':'))
}

fn input_type(kind: ControlKind) -> &'static str {
    match kind {
        ControlKind::DateTime => "datetime-local",
        ControlKind::Select => "text",
        other => other.as_str(),
    }
}

fn family_token(family: ControlFamily) -> &'static str {
    match family {
        ControlFamily::Picker { .. } => "picker",
        ControlFamily::NumberStepper => "number_stepper",
        ControlFamily::Slider => "slider",
        ControlFamily::ColorPicker => "color_picker",
        ControlFamily::MaskedInput => "masked_input",
        ControlFamily::Toggle => "toggle",
        ControlFamily::ExclusiveChoice => "exclusive_choice",
        ControlFamily::ChoiceList => "choice_list",
        ControlFamily::Action => "action",
        ControlFamily::FreeText => "free_text",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::render::{
        CopyAction, DiagramArtifact, WidgetDescriptor, WidgetOption, map_widget,
    };

    fn widget(descriptor: WidgetDescriptor) -> RenderNode {
        map_widget(&descriptor)
    }

    #[test]
    fn prose_slots_are_filled_in_order() {
        let tree = RenderTree::new(vec![RenderNode::Prose {
            html: "<ul><li><div data-node-slot=\"0\"></div></li></ul><p>Due <span data-node-slot=\"1\"></span></p>".into(),
            children: vec![
                RenderNode::InlineCode { text: "x < y".into() },
                widget(WidgetDescriptor::new(ControlKind::Date).with_attribute("name", "due")),
            ],
        }]);

        let html = write_tree(&tree);
        assert!(html.contains("<li><pre data-role=\"inline-code\"><code>x&#32;&lt;&#32;y</code></pre></li>"));
        assert!(html.contains("<input type=\"date\" data-role=\"widget\" data-family=\"picker\" name=\"due\">"));
        assert!(!html.contains("data-node-slot"));
    }

    #[test]
    fn code_block_carries_copy_text() {
        let mut out = String::new();
        write_node(
            &RenderNode::HighlightedCode {
                language: "rust".into(),
                source: "let a = \"b\";\n".into(),
                html: "<pre><code>let a</code></pre>".into(),
                copy: CopyAction::new("let a = \"b\";\n"),
            },
            &mut out,
        );
        assert!(out.starts_with("<figure class=\"code-block\" data-role=\"code-block\""));
        assert!(out.contains("data-copy-text=\"let a = &quot;b&quot;;\n\""));
    }

    #[test]
    fn chart_option_is_attribute_escaped() {
        let mut out = String::new();
        write_node(
            &RenderNode::ChartSpec {
                option: json!({"title": {"text": "A & B"}}),
            },
            &mut out,
        );
        assert_eq!(
            out,
            "<div data-role=\"chart\" data-option=\"{&quot;title&quot;:{&quot;text&quot;:&quot;A &amp; B&quot;}}\"></div>"
        );
    }

    #[test]
    fn diagrams_show_image_or_source() {
        let ready = DiagramNode {
            instance: 0,
            source: "graph TD;A-->B".into(),
            content_hash: Some("abc".into()),
            ticket: None,
            state: DiagramState::Ready {
                artifact: DiagramArtifact {
                    content_hash: "abc".into(),
                    rendered_image: "data:image/svg+xml;base64,PHN2Zz4=".into(),
                    source_text: "graph TD;A-->B".into(),
                },
            },
        };
        let mut out = String::new();
        write_diagram(&ready, &mut out);
        assert!(out.contains("<img src=\"data:image/svg+xml;base64,PHN2Zz4=\""));

        let failed = DiagramNode {
            state: DiagramState::Unavailable,
            ..ready
        };
        let mut out = String::new();
        write_diagram(&failed, &mut out);
        assert!(out.contains("data-state=\"unavailable\""));
        assert!(out.contains("graph&#32;TD;A--&gt;B"));
    }

    #[test]
    fn choice_list_marks_bound_option() {
        let descriptor = WidgetDescriptor {
            options: vec![
                WidgetOption {
                    value: "a".into(),
                    label: "Alpha".into(),
                    selected: false,
                },
                WidgetOption {
                    value: "b".into(),
                    label: "Beta".into(),
                    selected: true,
                },
            ],
            ..WidgetDescriptor::new(ControlKind::Select).with_attribute("name", "tone")
        };
        let mut out = String::new();
        write_node(&widget(descriptor), &mut out);
        assert!(out.starts_with("<select data-role=\"widget\" data-family=\"choice_list\" name=\"tone\">"));
        assert!(out.contains("<option value=\"b\" selected>Beta</option>"));
    }

    #[test]
    fn event_handler_attributes_are_dropped() {
        let descriptor = WidgetDescriptor::new(ControlKind::Checkbox)
            .with_attribute("onclick", "alert(1)")
            .with_attribute("checked", "");
        let mut out = String::new();
        write_node(&widget(descriptor), &mut out);
        assert!(!out.contains("onclick"));
        assert!(out.ends_with(" checked>"));
    }

    #[test]
    fn standalone_document_embeds_stylesheet() {
        let page = write_document(&RenderTree::default(), "Notes <draft>");
        assert!(page.contains("<title>Notes&#32;&lt;draft&gt;</title>"));
        assert!(page.contains(".syntax-"));
    }

    #[test]
    fn slot_text_inside_attributes_is_not_filled() {
        let tree = RenderTree::new(vec![RenderNode::Prose {
            html: "<p title='<span data-node-slot=\"0\"></span>'>a <span data-node-slot=\"0\"></span></p>".into(),
            children: vec![RenderNode::InlineCode { text: "x".into() }],
        }]);

        let html = write_tree(&tree);
        assert!(html.starts_with("<p title='<span data-node-slot=\"0\"></span>'>a <pre"));
        assert_eq!(html.matches("data-role=\"inline-code\"").count(), 1);
    }

    #[test]
    fn children_without_slots_are_appended() {
        let tree = RenderTree::new(vec![RenderNode::Prose {
            html: "<p>text</p>".into(),
            children: vec![RenderNode::InlineCode { text: "x".into() }],
        }]);

        assert_eq!(
            write_tree(&tree),
            "<p>text</p><pre data-role=\"inline-code\"><code>x</code></pre>\n"
        );
    }
}
