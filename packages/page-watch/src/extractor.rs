//! Locate a fragment of a page and turn it into comparable content.
//!
//! Given raw markup, a CSS selector and the page's URL this produces:
//! - normalized text (runs of whitespace collapsed, block boundaries as newlines)
//! - cleaned markup (no scripts, forms, event handlers; links made absolute)
//! - the primary link (the element itself if it is a link, else its first link)
//! - the page title, for diagnosing empty results

use scraper::{node::Node, ElementRef, Html, Selector};
use url::Url;

use crate::error::{MonitorError, Result};
use crate::types::Extraction;

/// Subtrees that never contribute visible text.
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements removed from cleaned markup along with their content.
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "frame", "frameset", "object", "embed",
    "applet", "form", "button", "input", "select", "textarea", "link", "meta", "base",
];

/// Elements whose boundaries become line breaks in normalized text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "caption", "dd", "details", "div", "dl",
    "dt", "fieldset", "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "tbody",
    "td", "tfoot", "th", "thead", "tr", "ul",
];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// A parsed CSS selector together with its source text.
#[derive(Debug, Clone)]
pub struct Locator {
    source: String,
    selector: Selector,
}

impl Locator {
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(MonitorError::InvalidLocator {
                locator: source.to_string(),
                reason: "selector is empty".to_string(),
            });
        }

        let selector = Selector::parse(trimmed).map_err(|e| MonitorError::InvalidLocator {
            locator: source.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: trimmed.to_string(),
            selector,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Parse `markup` and extract the first element matching `locator`.
pub fn extract(markup: &str, locator: &Locator, base_url: &Url) -> Extraction {
    let document = Html::parse_document(markup);
    extract_from(&document, locator, base_url)
}

/// Extract from an already parsed document.
pub fn extract_from(document: &Html, locator: &Locator, base_url: &Url) -> Extraction {
    let page_title = page_title(document);

    let Some(element) = document.select(&locator.selector).next() else {
        tracing::debug!(locator = %locator.as_str(), "Selector matched nothing");
        return Extraction::unmatched(page_title);
    };

    Extraction {
        text: element_text(element),
        markup: Some(clean_markup(element, base_url)),
        primary_link: primary_link(element, base_url),
        page_title,
    }
}

fn page_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Visible text of an element with block boundaries kept as newlines.
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);
    normalize_whitespace(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                // Source line breaks are not structure; only block elements are
                out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
            }
            Node::Element(el) => {
                let name = el.name();
                if INVISIBLE_TAGS.contains(&name) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Collapse whitespace runs to one space per line, drop blank lines, trim.
pub fn normalize_whitespace(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inner markup of an element, safe to display.
pub fn clean_markup(element: ElementRef<'_>, base_url: &Url) -> String {
    let mut out = String::new();
    write_clean_children(element, base_url, &mut out);
    out.trim().to_string()
}

fn write_clean_children(element: ElementRef<'_>, base_url: &Url, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => escape_into(text, false, out),
            Node::Element(el) => {
                let name = el.name();
                if STRIPPED_TAGS.contains(&name) {
                    continue;
                }
                let Some(child_element) = ElementRef::wrap(child) else {
                    continue;
                };

                out.push('<');
                out.push_str(name);
                for (attr, value) in el.attrs() {
                    if is_stripped_attribute(attr) {
                        continue;
                    }
                    let value = if is_reference_attribute(attr) {
                        if is_script_url(value) {
                            continue;
                        }
                        resolve_reference(base_url, value)
                    } else {
                        value.to_string()
                    };
                    out.push(' ');
                    out.push_str(attr);
                    out.push_str("=\"");
                    escape_into(&value, true, out);
                    out.push('"');
                }
                if name == "a" && el.attr("href").is_some_and(|href| !is_script_url(href)) {
                    out.push_str(" target=\"_blank\" rel=\"noopener noreferrer\"");
                }
                out.push('>');

                if VOID_TAGS.contains(&name) {
                    continue;
                }
                write_clean_children(child_element, base_url, out);
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            _ => {}
        }
    }
}

/// Event handlers and scoping attributes.
fn is_stripped_attribute(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("on") || name == "class" || name == "id" || name == "target" || name == "rel"
}

fn is_reference_attribute(name: &str) -> bool {
    matches!(name, "href" | "src" | "poster")
}

fn is_script_url(value: &str) -> bool {
    value
        .trim_start()
        .get(..11)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
}

fn escape_into(raw: &str, attribute: bool, out: &mut String) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

/// The located element's link, or its first descendant link, made absolute.
fn primary_link(element: ElementRef<'_>, base_url: &Url) -> Option<String> {
    let own = element.value();
    if own.name() == "a" {
        if let Some(href) = own.attr("href").filter(|href| !href.trim().is_empty()) {
            return Some(resolve_reference(base_url, href));
        }
    }

    let selector = Selector::parse("a[href]").ok()?;
    element
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| !href.trim().is_empty())
        .map(|href| resolve_reference(base_url, href))
}

/// Resolve `raw` against `base`. Unresolvable references are kept as given.
pub fn resolve_reference(base: &Url, raw: &str) -> String {
    match base.join(raw.trim()) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/news/index.html").unwrap()
    }

    fn run(markup: &str, locator: &str) -> Extraction {
        extract(markup, &Locator::parse(locator).unwrap(), &base())
    }

    #[test]
    fn test_extracts_headline_text() {
        let result = run(
            r#"<html><body><div class="headline">Launch Day</div></body></html>"#,
            ".headline",
        );
        assert_eq!(result.text, "Launch Day");
        assert_eq!(result.markup.as_deref(), Some("Launch Day"));
        assert!(result.primary_link.is_none());
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let result = run(
            "<html><head><title> Home </title></head><body><p>hi</p></body></html>",
            ".missing",
        );
        assert!(result.is_empty());
        assert!(result.markup.is_none());
        assert_eq!(result.page_title.as_deref(), Some("Home"));
    }

    #[test]
    fn test_whitespace_collapsed_and_blocks_become_lines() {
        let result = run(
            r#"<ul id="list">
                 <li>  First
                       item </li>
                 <li>Second <b>bold</b>   item</li>
               </ul>"#,
            "#list",
        );
        assert_eq!(result.text, "First item\nSecond bold item");
    }

    #[test]
    fn test_scripts_and_styles_not_in_text() {
        let result = run(
            r#"<div id="x">Visible<script>var hidden = 1;</script><style>.a{}</style></div>"#,
            "#x",
        );
        assert_eq!(result.text, "Visible");
    }

    #[test]
    fn test_clean_markup_strips_and_resolves() {
        let result = run(
            r#"<div id="box">
                 <a href="/post/1" class="link" onclick="track()">Post</a>
                 <img src="img/a.png" id="pic">
                 <script>alert(1)</script>
                 <form><input name="q"></form>
                 <a href="javascript:void(0)">Nope</a>
               </div>"#,
            "#box",
        );
        let markup = result.markup.unwrap();

        assert!(markup.contains(
            r#"<a href="https://example.com/post/1" target="_blank" rel="noopener noreferrer">Post</a>"#
        ));
        assert!(markup.contains(r#"<img src="https://example.com/news/img/a.png">"#));
        assert!(!markup.contains("script"));
        assert!(!markup.contains("onclick"));
        assert!(!markup.contains("class="));
        assert!(!markup.contains("<form"));
        assert!(!markup.contains("javascript:"));
    }

    #[test]
    fn test_markup_text_is_escaped() {
        let result = run(r#"<p id="p">a &lt; b &amp; c</p>"#, "#p");
        assert_eq!(result.text, "a < b & c");
        assert_eq!(result.markup.as_deref(), Some("a &lt; b &amp; c"));
    }

    #[test]
    fn test_primary_link_is_element_itself() {
        let result = run(r#"<a class="item" href="../archive?id=3">Archive</a>"#, "a.item");
        assert_eq!(
            result.primary_link.as_deref(),
            Some("https://example.com/archive?id=3")
        );
    }

    #[test]
    fn test_primary_link_is_first_descendant() {
        let result = run(
            r#"<div class="card"><span>New</span><a href="/first">1</a><a href="/second">2</a></div>"#,
            ".card",
        );
        assert_eq!(result.primary_link.as_deref(), Some("https://example.com/first"));
    }

    #[test]
    fn test_unresolvable_reference_kept_as_is() {
        let base = Url::parse("https://example.com/").unwrap();
        assert_eq!(resolve_reference(&base, "http://[::1"), "http://[::1");
        assert_eq!(resolve_reference(&base, "/ok"), "https://example.com/ok");
    }

    #[test]
    fn test_invalid_locator() {
        assert!(matches!(
            Locator::parse("div[[["),
            Err(MonitorError::InvalidLocator { .. })
        ));
        assert!(matches!(
            Locator::parse("   "),
            Err(MonitorError::InvalidLocator { .. })
        ));
    }
}
