// src/sanitize.rs
use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static SCRIPT_URI: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)javascript\s*:").unwrap());
static EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bon[a-z]+\s*=").unwrap());

/// Strips markup and script-bearing content from a free-text field (names,
/// employee IDs, EPF/ESI numbers) and trims surrounding whitespace.
pub fn sanitize_text(input: &str) -> String {
    let text = SCRIPT_BLOCK.replace_all(input, "");
    let text = HTML_TAG.replace_all(&text, "");
    let text = SCRIPT_URI.replace_all(&text, "");
    let text = EVENT_HANDLER.replace_all(&text, "");
    text.chars()
        .filter(|c| !matches!(c, '<' | '>') && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn sanitize_optional(input: Option<&str>) -> Option<String> {
    input.map(sanitize_text).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_only_trimmed() {
        assert_eq!(sanitize_text("  Ravi Kumar "), "Ravi Kumar");
        assert_eq!(sanitize_text("EMP-001"), "EMP-001");
    }

    #[test]
    fn script_blocks_are_removed_with_their_body() {
        assert_eq!(
            sanitize_text("Ravi<script>alert('x')</script> Kumar"),
            "Ravi Kumar"
        );
        assert_eq!(sanitize_text("<SCRIPT src=x>\nboom\n</Script >E1"), "E1");
    }

    #[test]
    fn tags_handlers_and_uris_are_stripped() {
        assert_eq!(sanitize_text("<b>Meera</b>"), "Meera");
        assert_eq!(sanitize_text("x onclick=steal()"), "x steal()");
        assert_eq!(sanitize_text("javascript:void(0)"), "void(0)");
        assert_eq!(sanitize_text("a < b"), "a  b");
        assert_eq!(sanitize_text("a <b onload=x()> c"), "a  c");
    }

    #[test]
    fn optional_fields_collapse_to_none_when_blank() {
        assert_eq!(sanitize_optional(Some("  ")), None);
        assert_eq!(sanitize_optional(Some("<i></i>")), None);
        assert_eq!(sanitize_optional(Some(" MH/123 ")), Some("MH/123".to_string()));
        assert_eq!(sanitize_optional(None), None);
    }
}
