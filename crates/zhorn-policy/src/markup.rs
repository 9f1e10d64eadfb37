//! Markup cleaning for the `innerHTML` sink.
//!
//! Fragments are parsed with an HTML5 parser and serialized back from the
//! parsed tree, so the host receives exactly what was checked. A refused
//! element is dropped together with its content; a refused attribute is
//! dropped from an element that is otherwise kept. Comments never survive.

use scraper::{ElementRef, Html, Node};
use tracing::trace;

use crate::sanitizer::SanitizerProfile;

/// Nesting depth at which elements are dropped.
pub const MAX_DEPTH: usize = 256;

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Attributes that make the host fetch what they reference.
const RESOURCE_ATTRIBUTES: &[&str] = &["src", "href", "poster", "background", "action", "srcset"];

/// A resource referenced from a markup fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupResource {
    /// Lowercase tag of the referencing element.
    pub tag: String,
    /// Lowercase attribute holding the reference.
    pub attribute: String,
    /// Referenced URL, trimmed.
    pub url: String,
}

/// Every resource a fragment references, in document order.
///
/// Each `srcset` candidate is reported separately.
#[must_use]
pub fn markup_resources(markup: &str) -> Vec<MarkupResource> {
    let fragment = Html::parse_fragment(markup);
    let mut resources = Vec::new();

    for node in fragment.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let tag = element.value().name().to_ascii_lowercase();
        for (name, value) in element.value().attrs() {
            let attribute = name.to_ascii_lowercase();
            if !RESOURCE_ATTRIBUTES.contains(&attribute.as_str()) {
                continue;
            }
            let urls: Vec<&str> = if attribute == "srcset" {
                value
                    .split(',')
                    .filter_map(|candidate| candidate.split_whitespace().next())
                    .collect()
            } else {
                vec![value.trim()]
            };
            resources.extend(urls.into_iter().filter(|url| !url.is_empty()).map(|url| {
                MarkupResource {
                    tag: tag.clone(),
                    attribute: attribute.clone(),
                    url: url.to_string(),
                }
            }));
        }
    }
    resources
}

pub(crate) fn clean(profile: &SanitizerProfile, markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    let mut out = String::with_capacity(markup.len());
    write_children(profile, fragment.root_element(), 0, &mut out);
    trace!(
        input_len = markup.len(),
        output_len = out.len(),
        "Markup cleaned"
    );
    out
}

fn write_children(
    profile: &SanitizerProfile,
    parent: ElementRef<'_>,
    depth: usize,
    out: &mut String,
) {
    let raw_text = parent.value().name().eq_ignore_ascii_case("style");
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => {
                if !raw_text {
                    escape_text(text, out);
                } else if text.contains("</") {
                    // Raw text that could close its element early.
                    trace!("Style text dropped");
                } else {
                    out.push_str(text);
                }
            },
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    write_element(profile, element, depth, out);
                }
            },
            _ => {},
        }
    }
}

fn write_element(
    profile: &SanitizerProfile,
    element: ElementRef<'_>,
    depth: usize,
    out: &mut String,
) {
    let name = element.value().name();
    let tag = name.to_ascii_lowercase();
    if depth >= MAX_DEPTH {
        trace!(tag = %tag, "Markup nested too deeply, subtree dropped");
        return;
    }
    if let Err(e) = profile.check_tag(&tag) {
        trace!(tag = %tag, reason = %e, "Element dropped");
        return;
    }

    out.push('<');
    out.push_str(name);
    for (attribute, value) in element.value().attrs() {
        let attribute = attribute.to_ascii_lowercase();
        match profile.certify_attribute(&tag, &attribute, value) {
            Ok(certified) => {
                out.push(' ');
                out.push_str(&attribute);
                out.push_str("=\"");
                escape_attribute(&certified, out);
                out.push('"');
            },
            Err(e) => {
                trace!(tag = %tag, attribute = %attribute, reason = %e, "Attribute dropped");
            },
        }
    }
    out.push('>');

    if VOID_TAGS.contains(&tag.as_str()) {
        return;
    }
    write_children(profile, element, depth.saturating_add(1), out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::{ContentSanitizer, ProfileSanitizer};

    fn clean(markup: &str) -> String {
        ProfileSanitizer::new().sanitize_markup(markup).unwrap()
    }

    #[test]
    fn test_unknown_elements_drop_with_their_content() {
        assert_eq!(clean("<p>hi<script>alert(1)</script></p>"), "<p>hi</p>");
        assert_eq!(
            clean(r#"<p>see <a href="https://x.example.com/">link</a> now</p>"#),
            "<p>see  now</p>"
        );
        assert_eq!(clean("<iframe src=\"https://x.example.com/\"></iframe>ok"), "ok");
    }

    #[test]
    fn test_refused_attributes_are_stripped() {
        assert_eq!(
            clean(r#"<img src="https://cdn.example.com/a.png" onerror="alert(1)">"#),
            r#"<img src="https://cdn.example.com/a.png">"#
        );
        assert_eq!(clean(r#"<img src="javascript:alert(1)">"#), "<img>");
        assert_eq!(clean(r#"<div inert="">x</div>"#), "<div>x</div>");
        assert_eq!(clean(r#"<div ping="https://t.example.com/">x</div>"#), "<div>x</div>");
    }

    #[test]
    fn test_named_properties_and_extras_survive() {
        assert_eq!(
            clean(r#"<form id="login"></form>"#),
            r#"<form id="user-content-login"></form>"#
        );
        let kept = clean(r#"<trix-editor data-x="1" aria-label="editor"></trix-editor>"#);
        assert!(kept.starts_with("<trix-editor"));
        assert!(kept.contains(r#"data-x="1""#));
        assert!(kept.contains(r#"aria-label="editor""#));
    }

    #[test]
    fn test_text_is_reescaped_and_comments_removed() {
        assert_eq!(
            clean("<p>a &lt; b &amp; c</p><!-- note -->"),
            "<p>a &lt; b &amp; c</p>"
        );
        assert_eq!(
            clean(r#"<p title="&quot;x&quot;">y</p>"#),
            r#"<p title="&quot;x&quot;">y</p>"#
        );
        assert_eq!(
            clean("<style>p { color: red }</style>"),
            "<style>p { color: red }</style>"
        );
    }

    #[test]
    fn test_deep_nesting_is_cut() {
        let markup = "<div>".repeat(MAX_DEPTH.saturating_add(40));
        assert_eq!(clean(&markup).matches("<div>").count(), MAX_DEPTH);
    }

    #[test]
    fn test_markup_resources_in_document_order() {
        let resources = markup_resources(concat!(
            r#"<img src=" https://cdn.example.com/a.png ">"#,
            r#"<video poster="/p.jpg"></video>"#,
            r#"<img srcset="https://a.example.com/1x.png 1x, https://a.example.com/2x.png 2x">"#,
            r#"<p class="x">text</p>"#,
        ));
        let urls: Vec<_> = resources.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/a.png",
                "/p.jpg",
                "https://a.example.com/1x.png",
                "https://a.example.com/2x.png",
            ]
        );
        assert_eq!(resources[1].tag, "video");
        assert_eq!(resources[1].attribute, "poster");
        assert!(markup_resources("plain text").is_empty());
    }
}
