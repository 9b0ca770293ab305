use pulldown_cmark::{CowStr, Event, Options, Parser, Tag};
use regex::{Captures, Regex};
use std::sync::OnceLock;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn is_unsafe_url(url: &str) -> bool {
    let lowered: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    lowered.starts_with("javascript:") || lowered.starts_with("vbscript:")
}

/// Markdown to HTML for the preview pane. Raw HTML in the source is shown
/// as text and script URLs are neutralized.
pub fn render_markdown(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(source, options).map(|event| match event {
        Event::Html(html) | Event::InlineHtml(html) => Event::Text(html),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) if is_unsafe_url(&dest_url) => Event::Start(Tag::Link {
            link_type,
            dest_url: CowStr::Borrowed("#"),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) if is_unsafe_url(&dest_url) => Event::Start(Tag::Image {
            link_type,
            dest_url: CowStr::Borrowed(""),
            title,
            id,
        }),
        other => other,
    });

    let mut html = String::with_capacity(source.len() + source.len() / 2);
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

/// Markup for the highlight layer drawn under the transparent editor
/// textarea. Line structure is preserved exactly so the two stay aligned.
pub fn highlight_markdown(text: &str) -> String {
    static RE_HEADING: OnceLock<Regex> = OnceLock::new();
    static RE_FENCE: OnceLock<Regex> = OnceLock::new();
    static RE_QUOTE: OnceLock<Regex> = OnceLock::new();
    static RE_LIST: OnceLock<Regex> = OnceLock::new();
    static RE_BOLD: OnceLock<Regex> = OnceLock::new();
    static RE_ITALIC: OnceLock<Regex> = OnceLock::new();
    static RE_CODE: OnceLock<Regex> = OnceLock::new();
    static RE_LINK: OnceLock<Regex> = OnceLock::new();

    let re_heading = RE_HEADING
        .get_or_init(|| Regex::new(r"(?m)^(#{1,6})([^\S\n]+.*)$").expect("valid heading regex"));
    let re_fence =
        RE_FENCE.get_or_init(|| Regex::new(r"(?ms)^(```.*?^```)").expect("valid fence regex"));
    let re_quote = RE_QUOTE.get_or_init(|| Regex::new(r"(?m)^(&gt;.*)$").expect("valid quote regex"));
    let re_list = RE_LIST
        .get_or_init(|| Regex::new(r"(?m)^(\s*)([-*+]|\d+\.)(\s)").expect("valid list regex"));
    let re_bold = RE_BOLD.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid bold regex"));
    let re_italic =
        RE_ITALIC.get_or_init(|| Regex::new(r"(^|[^*])\*([^*\n]+)\*").expect("valid italic regex"));
    let re_code = RE_CODE.get_or_init(|| Regex::new(r"`([^`\n]+)`").expect("valid code regex"));
    let re_link = RE_LINK
        .get_or_init(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\n]+)\)").expect("valid link regex"));

    let mut html = escape_html(text);

    html = re_fence
        .replace_all(&html, "<span class=\"hl-fence\">$1</span>")
        .into_owned();
    html = re_heading
        .replace_all(&html, |caps: &Captures| {
            let level = caps[1].len();
            format!("<span class=\"hl-h{level}\">{}{}</span>", &caps[1], &caps[2])
        })
        .into_owned();
    html = re_quote
        .replace_all(&html, "<span class=\"hl-quote\">$1</span>")
        .into_owned();
    html = re_list
        .replace_all(&html, "$1<span class=\"hl-list\">$2</span>$3")
        .into_owned();
    html = re_bold
        .replace_all(&html, "<span class=\"hl-bold\">**$1**</span>")
        .into_owned();
    html = re_italic
        .replace_all(&html, "$1<span class=\"hl-italic\">*$2*</span>")
        .into_owned();
    html = re_code
        .replace_all(&html, "<span class=\"hl-code\">`$1`</span>")
        .into_owned();
    html = re_link
        .replace_all(&html, "<span class=\"hl-link\">[$1]($2)</span>")
        .into_owned();

    // Keeps a trailing newline from collapsing so heights match the textarea.
    html.push_str("\n ");
    html
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextStats {
    pub words: usize,
    pub characters: usize,
    pub lines: usize,
}

pub fn text_stats(text: &str) -> TextStats {
    TextStats {
        words: text.split_whitespace().count(),
        characters: text.chars().count(),
        lines: if text.is_empty() { 0 } else { text.lines().count() },
    }
}
