use comrak::options::Options;

/// Raw HTML elements removed from prose together with their content.
pub(crate) const DENIED_ELEMENTS: [&str; 6] = ["script", "iframe", "head", "meta", "link", "style"];

/// Document wrappers that are dropped while their content is kept; removing
/// them outright would swallow the rest of the block.
pub(crate) const UNWRAPPED_ELEMENTS: [&str; 2] = ["html", "body"];

pub(crate) fn default_options() -> Options<'static> {
    let mut options = Options::default();
    configure_extensions(&mut options);
    options
}

pub(crate) fn denied_selector() -> String {
    DENIED_ELEMENTS.join(", ")
}

pub(crate) fn unwrapped_selector() -> String {
    UNWRAPPED_ELEMENTS.join(", ")
}

fn configure_extensions(options: &mut Options<'static>) {
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.superscript = true;
    ext.footnotes = true;
    ext.description_lists = true;
    ext.multiline_block_quotes = true;
    ext.alerts = true;
    ext.underline = true;
    ext.subscript = true;
    ext.spoiler = true;
    ext.cjk_friendly_emphasis = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.full_info_string = true;
    render.tasklist_classes = true;
    // Comment spans, widgets and diagrams all travel as raw HTML; the deny-list
    // pass in `markup` removes what must not survive.
    render.r#unsafe = true;
    render.figure_with_caption = true;
    render.sourcepos = false;
    render.escaped_char_spans = true;
}
