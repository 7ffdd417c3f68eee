use std::borrow::Cow;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

/// Token replaced by the feed document in page templates.
pub const SHORTCODE: &str = "[gfeed-xml]";

/// Matches `[gfeed-xml]`, `[gfeed-xml /]` and `[gfeed-xml/]`.
static SHORTCODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[gfeed-xml\s*/?\]").expect("shortcode pattern is valid"));

pub fn contains_shortcode(template: &str) -> bool {
    SHORTCODE_PATTERN.is_match(template)
}

/// Replaces every feed shortcode in `template` with the rendered document.
///
/// `render` runs at most once, and only when the template contains a
/// shortcode. Templates without one are returned unchanged.
pub fn expand_shortcodes<F>(template: &str, render: F) -> Result<Cow<'_, str>>
where
    F: FnOnce() -> Result<String>,
{
    if !contains_shortcode(template) {
        return Ok(Cow::Borrowed(template));
    }

    let xml = render()?;
    let count = SHORTCODE_PATTERN.find_iter(template).count();
    tracing::debug!(count, "Expanding feed shortcodes");
    Ok(Cow::Owned(
        SHORTCODE_PATTERN
            .replace_all(template, regex::NoExpand(&xml))
            .into_owned(),
    ))
}
