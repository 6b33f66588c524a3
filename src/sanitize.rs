//! Script-tag neutralisation applied to Markdown before it is interpreted as
//! HTML by either pipeline.

const SCRIPT_OPEN: &str = "<script";
const SCRIPT_OPEN_ESCAPED: &str = "&lt;script";
const SCRIPT_CLOSE: &str = "</script>";
const SCRIPT_CLOSE_ESCAPED: &str = "&lt;/script&gt;";

/// Escape every case-sensitive `<script` and `</script>` token.
///
/// Everything else is left byte-identical. The escaped forms contain no `<`,
/// so a second pass is a no-op.
pub fn sanitize(markdown: &str) -> String {
    if !markdown.contains(SCRIPT_OPEN) && !markdown.contains(SCRIPT_CLOSE) {
        return markdown.to_string();
    }
    markdown
        .replace(SCRIPT_OPEN, SCRIPT_OPEN_ESCAPED)
        .replace(SCRIPT_CLOSE, SCRIPT_CLOSE_ESCAPED)
}
