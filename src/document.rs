//! Document model – the raw Markdown text plus a title derived from it.
//!
//! The title is never stored. It is recomputed from the first line on every
//! read, so it cannot drift out of sync with the text.

/// Title used when the first line yields nothing.
pub const DEFAULT_TITLE: &str = "document";

/// File name used when the title yields nothing.
pub const DEFAULT_FILE_NAME: &str = "document.pdf";

const PDF_SUFFIX: &str = ".pdf";

/// Sample content a fresh editor session starts with.
const WELCOME_MARKDOWN: &str = r#"# Welcome to md-forge

## Features
- Live preview with instant rendering
- Syntax highlighting for code blocks
- Export to PDF with one click

## Example Content

### Text Formatting
You can write in **bold**, *italic*, or ~~strikethrough~~.

### Lists
1. First item
2. Second item
3. Third item

### Code Blocks
```rust
fn greet(name: &str) {
    println!("Hello, {name}!");
}
```

### Blockquotes
> "The best way to predict the future is to invent it." - Alan Kay

### Links
Visit [our website](https://example.com) for more information.
"#;

/// A Markdown document. Only full replacement of the text is modelled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkdownDocument {
    text: String,
}

impl MarkdownDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The sample document shown when the editor opens.
    pub fn welcome() -> Self {
        Self::new(WELCOME_MARKDOWN)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Display title: first line with every `#` removed, trimmed.
    pub fn title(&self) -> String {
        derive_title(&self.text)
    }

    /// Suggested download name, `<title>.pdf`.
    pub fn file_name(&self) -> String {
        format!("{}{PDF_SUFFIX}", self.title())
    }
}

/// A finalized, immutable PDF produced by either pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedPdf {
    /// Suggested download name, always ending in `.pdf`.
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Known when the pipeline paginated itself; the native path leaves
    /// pagination to the engine.
    pub page_count: Option<usize>,
}

impl ExportedPdf {
    pub const CONTENT_TYPE: &'static str = "application/pdf";
}

/// Derive a title from the first line of `markdown`.
pub fn derive_title(markdown: &str) -> String {
    let first_line = markdown.split('\n').next().unwrap_or_default();
    let cleaned: String = first_line.chars().filter(|c| *c != '#').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Resolve the download file name from an optional title-input override.
///
/// A blank override falls back to the derived name. A non-blank one gets the
/// `.pdf` suffix unless it already carries it.
pub fn resolve_file_name(doc: &MarkdownDocument, title_override: Option<&str>) -> String {
    match title_override.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) if t.ends_with(PDF_SUFFIX) => t.to_string(),
        Some(t) => format!("{t}{PDF_SUFFIX}"),
        None => doc.file_name(),
    }
}
