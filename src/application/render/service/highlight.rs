use syntect::{
    dumps::from_uncompressed_data,
    html::{ClassStyle, ClassedHTMLGenerator},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};
use tracing::warn;

use crate::{application::render::types::RenderError, util::html::escape_attribute};

/// Syntect highlighter emitting `syntax-` prefixed CSS classes.
pub(crate) struct Highlighter {
    syntax_set: SyntaxSet,
    class_style: ClassStyle,
}

impl Highlighter {
    /// Load the syntax pack generated by the build script, falling back to
    /// syntect's bundled defaults if the pack does not decode.
    pub(crate) fn from_build_pack() -> Self {
        let syntax_bytes = include_bytes!(env!("SYNTAX_PACK_FILE"));
        let syntax_set = from_uncompressed_data(syntax_bytes).unwrap_or_else(|err| {
            warn!(
                target = "application::render::highlight",
                error = %err,
                "Syntax pack failed to decode; using bundled defaults"
            );
            SyntaxSet::load_defaults_newlines()
        });
        Self::new(syntax_set)
    }

    pub(crate) fn new(syntax_set: SyntaxSet) -> Self {
        Self {
            syntax_set,
            class_style: ClassStyle::SpacedPrefixed { prefix: "syntax-" },
        }
    }

    /// Highlight `code`; any highlighting failure degrades to an escaped block.
    pub(crate) fn highlight(&self, language: &str, meta: Option<&str>, code: &str) -> String {
        match self.try_highlight(language, meta, code) {
            Ok(html) => html,
            Err(err) => {
                warn!(
                    target = "application::render::highlight",
                    language,
                    error = %err,
                    "Highlighting failed; emitting plain code block"
                );
                plain_code_block(language, code)
            }
        }
    }

    fn try_highlight(
        &self,
        language: &str,
        meta: Option<&str>,
        code: &str,
    ) -> Result<String, RenderError> {
        let syntax = self
            .find_syntax(language)
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        let mut code_with_newline = code.to_string();
        if !code_with_newline.ends_with('\n') {
            code_with_newline.push('\n');
        }

        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntax_set, self.class_style);
        for line in LinesWithEndings::from(code_with_newline.as_str()) {
            generator
                .parse_html_for_line_which_includes_newline(line)
                .map_err(|err| RenderError::Highlighting {
                    language: language.to_string(),
                    message: err.to_string(),
                })?;
        }

        let lang_lower = language.to_ascii_lowercase();
        let lang_attr = escape_attribute(&lang_lower);
        let meta_attr = meta
            .filter(|m| !m.is_empty())
            .map(|m| format!(" data-meta=\"{}\"", escape_attribute(m)))
            .unwrap_or_default();

        Ok(format!(
            "<pre class=\"syntax-highlight syntax-lang-{lang_attr}\" data-language=\"{lang_attr}\"><code class=\"language-{lang_attr} syntax-code\"{meta_attr}>{}</code></pre>",
            generator.finalize()
        ))
    }

    fn find_syntax(&self, token: &str) -> Option<&SyntaxReference> {
        let lowercase = token.to_ascii_lowercase();
        self.syntax_set
            .find_syntax_by_token(&lowercase)
            .or_else(|| self.syntax_set.find_syntax_by_name(token))
            .or_else(|| self.syntax_set.find_syntax_by_extension(&lowercase))
    }
}

/// Escaped `<pre>` block used when highlighting is unavailable.
pub(crate) fn plain_code_block(language: &str, literal: &str) -> String {
    let language_attr = if language.is_empty() {
        String::new()
    } else {
        format!(" data-language=\"{}\"", escape_attribute(language))
    };
    let newline = if literal.ends_with('\n') { "" } else { "\n" };
    format!(
        "<pre class=\"syntax-highlight\"{language_attr}><code>{}{newline}</code></pre>",
        ammonia::clean_text(literal)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlighter() -> Highlighter {
        Highlighter::new(SyntaxSet::load_defaults_newlines())
    }

    #[test]
    fn known_language_gets_syntax_classes() {
        let html = highlighter().highlight("rust", Some("title=main.rs"), "fn main() {}");
        assert!(html.starts_with("<pre class=\"syntax-highlight syntax-lang-rust\""));
        assert!(html.contains("class=\"language-rust syntax-code\""));
        assert!(html.contains("data-meta=\"title=main.rs\""));
        assert!(html.contains("syntax-"));
    }

    #[test]
    fn unknown_language_uses_plain_text_syntax() {
        let html = highlighter().highlight("klingon", None, "nuqneH <tlhIngan>");
        assert!(html.contains("data-language=\"klingon\""));
        assert!(html.contains("&lt;tlhIngan&gt;"));
        assert!(!html.contains("<tlhIngan>"));
    }

    #[test]
    fn plain_block_escapes_markup() {
        let html = plain_code_block("text", "<b>x</b>");
        assert!(html.contains("data-language=\"text\""));
        assert!(!html.contains("<b>"));
        assert!(html.ends_with("\n</code></pre>"));
    }
}
