use std::borrow::Cow;

use comrak::{
    Arena, format_html,
    nodes::{AstNode, NodeHtmlBlock, NodeValue},
    options::Options,
    parse_document,
};

use crate::application::render::{
    artifacts::content_hash,
    types::{Block, RenderError, slot_markup},
};

use super::{comments, markup};

const MARKER_END: &str = "\"></div>";
/// HTML block type comrak assigns to `<!--` blocks.
const COMMENT_BLOCK_TYPE: u8 = 2;

struct ExtractedCode {
    block: Block,
    top_level: bool,
}

/// Marker prefixes keyed to the parsed source. Raw HTML in the document cannot
/// contain its own hash, so author markup never matches a marker.
struct Markers {
    top_level: String,
    nested: String,
}

impl Markers {
    fn for_source(source: &str) -> Self {
        let hash = content_hash(source);
        let key = &hash[..16];
        Self {
            top_level: format!("<div data-folio-block=\"{key}-"),
            nested: format!("<div data-folio-nested=\"{key}-"),
        }
    }
}

/// Parse markdown into the normalized block list.
///
/// Fenced and indented code blocks are lifted out of the comrak tree and
/// replaced by marker elements before HTML formatting. Top-level markers split
/// the output into prose and code blocks; markers nested in lists or quotes
/// stay inside the surrounding prose as numbered slots.
///
/// A `<!--` that never closes is parsed as literal text instead of opening an
/// HTML block that runs to the end of the document.
pub(crate) fn parse_blocks(
    markdown: &str,
    options: &Options<'static>,
) -> Result<Vec<Block>, RenderError> {
    let arena = Arena::new();
    let mut source = Cow::Borrowed(markdown);
    let root = loop {
        let root = parse_document(&arena, &source, options);
        match dangling_comment(root, &source) {
            Some(opener) => source = Cow::Owned(comments::escape_opener(&source, opener)),
            None => break root,
        }
    };

    let markers = Markers::for_source(&source);
    let mut extracted = Vec::new();
    extract_code_blocks(root, 0, &markers, &mut extracted);

    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::Markdown {
        message: err.to_string(),
    })?;
    let html = markup::strip_slot_attributes(&html)?;

    let mut extracted: Vec<Option<ExtractedCode>> = extracted.into_iter().map(Some).collect();
    Ok(split_blocks(&html, &markers, &mut extracted))
}

/// Source offset of the opener behind an HTML comment block that runs to the
/// end of the document.
fn dangling_comment<'a>(root: &'a AstNode<'a>, source: &str) -> Option<usize> {
    root.descendants().find_map(|node| {
        let data = node.data.borrow();
        match &data.value {
            NodeValue::HtmlBlock(block)
                if block.block_type == COMMENT_BLOCK_TYPE && !block.literal.contains("-->") =>
            {
                comments::unpaired_opener(source, line_offset(source, data.sourcepos.start.line))
            }
            _ => None,
        }
    })
}

/// Byte offset where 1-based `line` starts.
fn line_offset(source: &str, line: usize) -> usize {
    if line <= 1 {
        return 0;
    }
    source
        .match_indices('\n')
        .nth(line - 2)
        .map_or(source.len(), |(index, _)| index + 1)
}

fn extract_code_blocks<'a>(
    node: &'a AstNode<'a>,
    depth: usize,
    markers: &Markers,
    extracted: &mut Vec<ExtractedCode>,
) {
    let code = {
        let data = node.data.borrow();
        if let NodeValue::CodeBlock(block) = &data.value {
            Some((block.info.trim().to_string(), block.literal.clone()))
        } else {
            None
        }
    };

    if let Some((info, literal)) = code {
        let index = extracted.len();
        let top_level = depth == 1;
        extracted.push(ExtractedCode {
            block: Block::fenced(&info, literal),
            top_level,
        });

        let marker = if top_level {
            &markers.top_level
        } else {
            &markers.nested
        };
        let mut data = node.data.borrow_mut();
        data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: format!("{marker}{index}{MARKER_END}\n"),
        });
        return;
    }

    let mut child = node.first_child();
    while let Some(next) = child {
        extract_code_blocks(next, depth + 1, markers, extracted);
        child = next.next_sibling();
    }
}

fn split_blocks(
    html: &str,
    markers: &Markers,
    extracted: &mut [Option<ExtractedCode>],
) -> Vec<Block> {
    let marker = markers.top_level.as_str();
    let mut blocks = Vec::new();
    let mut prose = String::new();
    let mut rest = html;

    while let Some(position) = rest.find(marker) {
        let after = &rest[position + marker.len()..];
        let claimed = parse_marker(after).and_then(|(index, consumed)| {
            let slot = extracted.get_mut(index)?;
            if !slot.as_ref().is_some_and(|code| code.top_level) {
                return None;
            }
            slot.take().map(|code| (code.block, consumed))
        });

        match claimed {
            Some((block, consumed)) => {
                prose.push_str(&rest[..position]);
                flush_prose(&mut prose, markers, extracted, &mut blocks);
                blocks.push(block);
                let tail = &after[consumed..];
                rest = tail.strip_prefix('\n').unwrap_or(tail);
            }
            None => {
                prose.push_str(&rest[..position + marker.len()]);
                rest = after;
            }
        }
    }

    prose.push_str(rest);
    flush_prose(&mut prose, markers, extracted, &mut blocks);
    blocks
}

fn flush_prose(
    prose: &mut String,
    markers: &Markers,
    extracted: &mut [Option<ExtractedCode>],
    blocks: &mut Vec<Block>,
) {
    let html = std::mem::take(prose);
    if html.trim().is_empty() {
        return;
    }

    let marker = markers.nested.as_str();
    let mut embedded = Vec::new();
    let mut output = String::with_capacity(html.len());
    let mut rest = html.as_str();

    while let Some(position) = rest.find(marker) {
        let after = &rest[position + marker.len()..];
        let claimed = parse_marker(after).and_then(|(index, consumed)| {
            let slot = extracted.get_mut(index)?;
            if slot.as_ref().is_some_and(|code| code.top_level) {
                return None;
            }
            slot.take().map(|code| (code.block, consumed))
        });

        match claimed {
            Some((block, consumed)) => {
                output.push_str(&rest[..position]);
                output.push_str(&slot_markup(embedded.len(), true));
                embedded.push(block);
                rest = &after[consumed..];
            }
            None => {
                output.push_str(&rest[..position + marker.len()]);
                rest = after;
            }
        }
    }
    output.push_str(rest);

    blocks.push(Block::prose(output, embedded));
}

/// Parse `<index>"></div>` following a marker prefix.
fn parse_marker(after: &str) -> Option<(usize, usize)> {
    let digits = after.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || !after[digits..].starts_with(MARKER_END) {
        return None;
    }
    let index = after[..digits].parse().ok()?;
    Some((index, digits + MARKER_END.len()))
}
