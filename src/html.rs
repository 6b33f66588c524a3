//! HTML renderer – Markdown → styled, self-contained HTML.
//!
//! Two documents are produced from the same conversion:
//! - [`render`] – the print document loaded by the native pipeline; content
//!   lives in `<div id="content">`.
//! - [`render_preview`] – the client preview captured by the raster pipeline;
//!   content lives in `<div id="preview">` and code fences are highlighted.
//!
//! Callers sanitize the Markdown first (see [`crate::sanitize`]).

use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

/// Selector of the print document's content container.
pub const CONTENT_SELECTOR: &str = "#content";

/// Selector of the preview container.
pub const PREVIEW_SELECTOR: &str = "#preview";

const PREVIEW_PLACEHOLDER: &str = "*No content to display*";

/// Body of an empty print document; keeps the container non-empty.
const EMPTY_CONTENT: &str = "<p></p>";

const HIGHLIGHT_THEME: &str = "InspiredGitHub";

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

/// Fixed print typography, approximating the editor preview.
pub const STYLESHEET: &str = r#"
body {
  font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif;
  font-size: 11pt;
  line-height: 1.5;
  color: #3c3c43;
  padding: 2pt 1pt;
  max-width: 800px;
  margin: 0 auto;
}
h1 { font-size: 20pt; font-weight: 600; margin-bottom: 16pt; }
h2 { font-size: 16pt; font-weight: 600; margin-top: 16pt; margin-bottom: 12pt; }
h3 { font-size: 14pt; font-weight: 600; margin-top: 14pt; margin-bottom: 10pt; }
p { margin-bottom: 10pt; }
ul, ol { margin-bottom: 10pt; padding-left: 20pt; }
li { margin-bottom: 4pt; }
pre {
  background-color: #f5f5f5;
  padding: 8pt;
  margin-bottom: 10pt;
  border-radius: 4pt;
  font-family: 'Courier New', monospace;
  font-size: 10pt;
  overflow-x: auto;
}
code {
  font-family: 'Courier New', monospace;
  font-size: 10pt;
  background-color: #f5f5f5;
  border-radius: 2pt;
}
blockquote {
  border-left: 4pt solid #e0e0e0;
  margin-left: 0;
  padding-left: 10pt;
  font-style: italic;
}
a { color: #0066cc; }
img { max-width: 100%; height: auto; }
table {
  width: 100%;
  border-collapse: collapse;
  margin-bottom: 10pt;
}
th, td {
  border: 1pt solid #e0e0e0;
  padding: 6pt;
  text-align: left;
}
th { background-color: #f5f5f5; font-weight: 600; }
del { text-decoration: line-through; }
"#;

const PREVIEW_STYLESHEET: &str = r#"
.preview-content { padding: 24px; background: #fafafa; }
.preview-content pre { background-color: transparent; }
"#;

/// Rendering switches for [`markdown_to_html`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Highlight fenced code blocks that carry a language tag.
    pub highlight_code: bool,
}

fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);
    options
}

/// Convert Markdown to an HTML fragment.
pub fn markdown_to_html(markdown: &str, options: RenderOptions) -> String {
    let parser = Parser::new_ext(markdown, markdown_options());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);

    if !options.highlight_code {
        html::push_html(&mut out, parser);
        return out;
    }

    let theme = &THEMES.themes[HIGHLIGHT_THEME];
    let mut events: Vec<Event> = Vec::new();
    let mut fence: Option<(String, String)> = None;

    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))) if !lang.trim().is_empty() => {
                fence = Some((lang.trim().to_string(), String::new()));
            }
            Event::Text(text) if fence.is_some() => {
                if let Some((_, code)) = fence.as_mut() {
                    code.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) if fence.is_some() => {
                if let Some((lang, code)) = fence.take() {
                    events.push(Event::Html(CowStr::from(highlight_block(&lang, &code, theme))));
                }
            }
            other => events.push(other),
        }
    }

    html::push_html(&mut out, events.into_iter());
    out
}

fn highlight_block(lang: &str, code: &str, theme: &Theme) -> String {
    let Some(syntax) = SYNTAXES.find_syntax_by_token(lang) else {
        return plain_code_block(lang, code);
    };
    match highlighted_html_for_string(code, &SYNTAXES, syntax, theme) {
        Ok(highlighted) => highlighted,
        Err(e) => {
            log::warn!("Highlighting '{lang}' block failed, emitting plain code: {e}");
            plain_code_block(lang, code)
        }
    }
}

fn plain_code_block(lang: &str, code: &str) -> String {
    format!(
        "<pre><code class=\"language-{}\">{}</code></pre>\n",
        escape_html(lang),
        escape_html(code)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn wrap_document(head_css: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<style>{head_css}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

/// Render the print document consumed by the native pipeline.
pub fn render(markdown: &str) -> String {
    let mut content = markdown_to_html(markdown, RenderOptions::default());
    if content.trim().is_empty() {
        content = EMPTY_CONTENT.to_string();
    }
    wrap_document(STYLESHEET, &format!("<div id=\"content\">{content}</div>"))
}

/// Render the preview document consumed by the raster pipeline.
pub fn render_preview(markdown: &str) -> String {
    let source = if markdown.trim().is_empty() { PREVIEW_PLACEHOLDER } else { markdown };
    let content = markdown_to_html(source, RenderOptions { highlight_code: true });
    let css = format!("{STYLESHEET}{PREVIEW_STYLESHEET}");
    wrap_document(
        &css,
        &format!("<div id=\"preview\" class=\"preview-content\">{content}</div>"),
    )
}
