//! HTML-to-text helpers shared by the search parser and the HTTP scraper.

use regex::Regex;
use std::sync::LazyLock;

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));

/// Tags whose content is never readable text.
const SKIPPED_BLOCKS: [&str; 5] = ["script", "style", "noscript", "svg", "template"];

/// Tags that start a new line in the extracted text.
const LINE_BREAKS: [&str; 15] = [
    "p", "br", "div", "section", "article", "header", "footer", "li", "tr", "h1", "h2", "h3", "h4",
    "h5", "h6",
];

/// Extract readable text from an HTML document.
///
/// Drops tags and the bodies of script-like elements, breaks lines at block
/// elements, decodes common entities, and removes blank lines.
pub fn extract_text_from_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len() / 2);
    let mut in_tag = false;
    let mut reading_name = false;
    let mut tag_name = String::new();
    let mut skipping: Option<&'static str> = None;

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                reading_name = true;
                tag_name.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                reading_name = false;
                let name = tag_name.to_ascii_lowercase();
                let (closing, bare) = match name.strip_prefix('/') {
                    Some(rest) => (true, rest),
                    None => (false, name.as_str()),
                };

                if let Some(open) = skipping {
                    if closing && bare == open {
                        skipping = None;
                    }
                    continue;
                }
                if !closing && let Some(block) = SKIPPED_BLOCKS.iter().find(|b| **b == bare) {
                    skipping = Some(*block);
                    continue;
                }
                if LINE_BREAKS.contains(&bare) {
                    text.push('\n');
                }
            }
            _ if in_tag => {
                if reading_name && (ch.is_ascii_alphanumeric() || (ch == '/' && tag_name.is_empty())) {
                    tag_name.push(ch);
                } else {
                    reading_name = false;
                }
            }
            _ if skipping.is_some() => {}
            _ => text.push(ch),
        }
    }

    let text = decode_entities(&text);
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of an HTML fragment collapsed onto one line.
pub fn inline_text(fragment: &str) -> String {
    extract_text_from_html(fragment)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Contents of the `<title>` element, if any.
pub fn page_title(html: &str) -> Option<String> {
    TITLE
        .captures(html)
        .map(|c| inline_text(&c[1]))
        .filter(|t| !t.is_empty())
}

/// Decode the handful of entities that show up in search results and articles.
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Keep at most `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
