//! Content sanitizer adapter.
//!
//! Certifies that a `(tag, attribute, value)` triple is structurally
//! acceptable on the include path, after policy has approved the destination,
//! and cleans markup fragments bound for `innerHTML`.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::trace;

use crate::markup;

/// Why a value was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    /// The tag is explicitly forbidden.
    #[error("tag <{0}> is forbidden")]
    ForbiddenTag(String),

    /// The tag is not part of any allowed profile.
    #[error("tag <{0}> is not allowed")]
    UnknownTag(String),

    /// The attribute is explicitly forbidden (including `on*` handlers).
    #[error("attribute '{attribute}' is forbidden on <{tag}>")]
    ForbiddenAttribute {
        /// Element tag.
        tag: String,
        /// Attribute name.
        attribute: String,
    },

    /// The attribute is not part of any allowed profile.
    #[error("attribute '{attribute}' is not allowed on <{tag}>")]
    UnknownAttribute {
        /// Element tag.
        tag: String,
        /// Attribute name.
        attribute: String,
    },

    /// The value is a URI with a disallowed scheme.
    #[error("value for '{attribute}' is not a safe URI")]
    UnsafeUri {
        /// Attribute name.
        attribute: String,
    },

    /// The sanitizer does not certify markup.
    #[error("markup sanitization is not supported")]
    MarkupUnsupported,
}

/// Pluggable sanitization routine.
pub trait ContentSanitizer: Send + Sync {
    /// Certify `value` for `attribute` on an element of kind `tag`.
    ///
    /// Returns the value to hand to the native sink, which may differ from
    /// the input (trimmed, namespaced).
    ///
    /// # Errors
    ///
    /// Returns [`SanitizeError`] when the triple is refused.
    fn sanitize(&self, value: &str, tag: &str, attribute: &str) -> Result<String, SanitizeError>;

    /// Clean a markup fragment bound for `innerHTML`.
    ///
    /// Returns the markup to hand to the native sink. The default refuses
    /// every fragment.
    ///
    /// # Errors
    ///
    /// Returns [`SanitizeError`] when the fragment is refused outright.
    fn sanitize_markup(&self, _markup: &str) -> Result<String, SanitizeError> {
        Err(SanitizeError::MarkupUnsupported)
    }
}

const HTML_TAGS: &[&str] = &[
    "abbr", "acronym", "address", "area", "article", "aside", "audio", "b", "bdi", "bdo", "big",
    "blink", "blockquote", "body", "br", "button", "canvas", "caption", "center", "cite", "code",
    "col", "colgroup", "content", "data", "datalist", "dd", "decorator", "del", "details", "dfn",
    "dialog", "dir", "div", "dl", "dt", "element", "em", "fieldset", "figcaption", "figure",
    "font", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header", "hgroup", "hr",
    "html", "i", "img", "input", "ins", "kbd", "label", "legend", "li", "main", "map", "mark",
    "marquee", "menu", "menuitem", "meter", "nav", "nobr", "ol", "optgroup", "option", "output",
    "p", "picture", "pre", "progress", "q", "rp", "rt", "ruby", "s", "samp", "section", "select",
    "shadow", "small", "source", "spacer", "span", "strike", "strong", "style", "sub", "summary",
    "sup", "table", "tbody", "td", "template", "textarea", "tfoot", "th", "thead", "time", "tr",
    "track", "tt", "u", "ul", "var", "video", "wbr",
];

const SVG_TAGS: &[&str] = &[
    "svg", "altglyph", "altglyphdef", "altglyphitem", "animatecolor", "animatemotion",
    "animatetransform", "circle", "clippath", "defs", "desc", "ellipse", "filter", "font", "g",
    "glyph", "glyphref", "hkern", "image", "line", "lineargradient", "marker", "mask", "metadata",
    "mpath", "path", "pattern", "polygon", "polyline", "radialgradient", "rect", "stop", "style",
    "switch", "symbol", "text", "textpath", "title", "tref", "tspan", "view", "vkern",
];

const SVG_FILTER_TAGS: &[&str] = &[
    "feblend", "fecolormatrix", "fecomponenttransfer", "fecomposite", "feconvolvematrix",
    "fediffuselighting", "fedisplacementmap", "fedistantlight", "fedropshadow", "feflood",
    "fefunca", "fefuncb", "fefuncg", "fefuncr", "fegaussianblur", "feimage", "femerge",
    "femergenode", "femorphology", "feoffset", "fepointlight", "fespecularlighting",
    "fespotlight", "fetile", "feturbulence",
];

const MATHML_TAGS: &[&str] = &[
    "math", "menclose", "merror", "mfenced", "mfrac", "mglyph", "mi", "mlabeledtr",
    "mmultiscripts", "mn", "mo", "mover", "mpadded", "mphantom", "mroot", "mrow", "ms", "mspace",
    "msqrt", "mstyle", "msub", "msup", "msubsup", "mtable", "mtd", "mtext", "mtr", "munder",
    "munderover", "mprescripts",
];

const HTML_ATTRS: &[&str] = &[
    "accept", "action", "align", "alt", "autocapitalize", "autocomplete", "autopictureinpicture",
    "autoplay", "background", "bgcolor", "border", "capture", "cellpadding", "cellspacing",
    "checked", "cite", "class", "clear", "color", "cols", "colspan", "controls", "controlslist",
    "coords", "crossorigin", "datetime", "decoding", "default", "dir", "disabled",
    "disablepictureinpicture", "disableremoteplayback", "download", "draggable", "enctype",
    "enterkeyhint", "face", "for", "headers", "height", "hidden", "high", "href", "hreflang",
    "id", "inputmode", "integrity", "ismap", "kind", "label", "lang", "list", "loading", "loop",
    "low", "max", "maxlength", "media", "method", "min", "minlength", "multiple", "muted", "name",
    "noshade", "novalidate", "nowrap", "open", "optimum", "pattern", "placeholder", "playsinline",
    "popover", "popovertarget", "popovertargetaction", "poster", "preload", "pubdate",
    "radiogroup", "readonly", "rel", "required", "rev", "reversed", "role", "rows", "rowspan",
    "spellcheck", "scope", "selected", "shape", "size", "sizes", "span", "srclang", "start",
    "src", "srcset", "step", "style", "summary", "tabindex", "title", "translate", "type",
    "usemap", "valign", "value", "width", "wrap", "xmlns", "slot",
];

const SVG_ATTRS: &[&str] = &[
    "accent-height", "accumulate", "additive", "alignment-baseline", "ascent", "attributename",
    "attributetype", "azimuth", "basefrequency", "baseline-shift", "begin", "bias", "by",
    "class", "clip", "clippathunits", "clip-path", "clip-rule", "color", "color-interpolation",
    "color-interpolation-filters", "color-profile", "color-rendering", "cx", "cy", "d", "dx",
    "dy", "diffuseconstant", "direction", "display", "divisor", "dur", "edgemode", "elevation",
    "end", "fill", "fill-opacity", "fill-rule", "filter", "filterunits", "flood-color",
    "flood-opacity", "font-family", "font-size", "font-size-adjust", "font-stretch",
    "font-style", "font-variant", "font-weight", "fx", "fy", "g1", "g2", "glyph-name",
    "glyphref", "gradientunits", "gradienttransform", "height", "href", "id", "image-rendering",
    "in", "in2", "k", "k1", "k2", "k3", "k4", "kerning", "keypoints", "keysplines", "keytimes",
    "lang", "lengthadjust", "letter-spacing", "kernelmatrix", "kernelunitlength",
    "lighting-color", "local", "marker-end", "marker-mid", "marker-start", "markerheight",
    "markerunits", "markerwidth", "maskcontentunits", "maskunits", "max", "mask", "media",
    "method", "mode", "min", "name", "numoctaves", "offset", "operator", "opacity", "order",
    "orient", "orientation", "origin", "overflow", "paint-order", "path", "pathlength",
    "patterncontentunits", "patterntransform", "patternunits", "points", "preservealpha",
    "preserveaspectratio", "primitiveunits", "r", "rx", "ry", "radius", "refx", "refy",
    "repeatcount", "repeatdur", "restart", "result", "rotate", "scale", "seed",
    "shape-rendering", "specularconstant", "specularexponent", "spreadmethod", "startoffset",
    "stddeviation", "stitchtiles", "stop-color", "stop-opacity", "stroke-dasharray",
    "stroke-dashoffset", "stroke-linecap", "stroke-linejoin", "stroke-miterlimit",
    "stroke-opacity", "stroke", "stroke-width", "style", "surfacescale", "systemlanguage",
    "tabindex", "targetx", "targety", "transform", "transform-origin", "text-anchor",
    "text-decoration", "text-rendering", "textlength", "type", "u1", "u2", "unicode", "values",
    "viewbox", "visibility", "version", "vert-adv-y", "vert-origin-x", "vert-origin-y", "width",
    "word-spacing", "wrap", "writing-mode", "xchannelselector", "ychannelselector", "x", "x1",
    "x2", "xmlns", "y", "y1", "y2", "z", "zoomandpan",
];

const MATHML_ATTRS: &[&str] = &[
    "accent", "accentunder", "align", "bevelled", "close", "columnsalign", "columnlines",
    "columnspan", "denomalign", "depth", "dir", "display", "displaystyle", "encoding", "fence",
    "frame", "height", "href", "id", "largeop", "length", "linethickness", "lspace", "lquote",
    "mathbackground", "mathcolor", "mathsize", "mathvariant", "maxsize", "minsize", "movablelimits",
    "notation", "numalign", "open", "rowalign", "rowlines", "rowspacing", "rowspan", "rspace",
    "rquote", "scriptlevel", "scriptminsize", "scriptsizemultiplier", "selection", "separator",
    "separators", "stretchy", "subscriptshift", "supscriptshift", "symmetric", "voffset",
    "width", "xmlns",
];

const XML_ATTRS: &[&str] = &["xlink:href", "xml:id", "xlink:title", "xml:space", "xmlns:xlink"];

/// Attributes whose values are never interpreted as URIs.
const URI_SAFE_ATTRS: &[&str] = &[
    "alt", "class", "for", "id", "label", "name", "pattern", "placeholder", "role", "summary",
    "title", "value", "style", "xmlns",
];

const DATA_URI_TAGS: &[&str] = &["audio", "image", "img", "source", "track", "video", "a", "area"];

const EXTRA_TAGS: &[&str] = &["trix-editor"];
const EXTRA_ATTRS: &[&str] = &["nonce", "sha257", "target", "aria-x-fillable"];
const FORBIDDEN_TAGS: &[&str] = &["a"];
const FORBIDDEN_ATTRS: &[&str] = &["ping", "inert"];

/// Prefix applied to `id`/`name` values to keep them out of the page's
/// named-property namespace.
pub const NAMED_PROPERTY_PREFIX: &str = "user-content-";

static ATTR_WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"[\x{0000}-\x{0020}\x{00A0}\x{1680}\x{180E}\x{2000}-\x{2029}\x{205F}\x{3000}]")
        .ok()
});

static ALLOWED_URI: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:(?:f|ht)tps?|mailto|tel|callto|sms|cid|xmpp|matrix):|[^a-z]|[a-z+.\-]+(?:[^a-z+.\-:]|$))",
    )
    .ok()
});

static DATA_URI: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)^data:").ok());

static DATA_ATTR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^data-[\-\w.\x{00B7}-\x{FFFF}]+$").ok());

static ARIA_ATTR: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^aria-[\-\w]+$").ok());

fn is_match(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    // A pattern that failed to compile matches nothing.
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

fn set(lists: &[&[&str]]) -> HashSet<String> {
    lists
        .iter()
        .flat_map(|list| list.iter())
        .map(|s| (*s).to_string())
        .collect()
}

/// Fixed allow/deny tables applied by [`ProfileSanitizer`].
#[derive(Debug, Clone)]
pub struct SanitizerProfile {
    allowed_tags: HashSet<String>,
    allowed_attributes: HashSet<String>,
    forbidden_tags: HashSet<String>,
    forbidden_attributes: HashSet<String>,
    uri_safe_attributes: HashSet<String>,
    data_uri_tags: HashSet<String>,
    allow_aria: bool,
    allow_data_attributes: bool,
    sanitize_named_props: bool,
}

impl SanitizerProfile {
    /// html + svg + svg filters + MathML, with the rich-text editor additions.
    fn fixed() -> Self {
        Self {
            allowed_tags: set(&[HTML_TAGS, SVG_TAGS, SVG_FILTER_TAGS, MATHML_TAGS, EXTRA_TAGS]),
            allowed_attributes: set(&[HTML_ATTRS, SVG_ATTRS, MATHML_ATTRS, XML_ATTRS, EXTRA_ATTRS]),
            forbidden_tags: set(&[FORBIDDEN_TAGS]),
            forbidden_attributes: set(&[FORBIDDEN_ATTRS]),
            uri_safe_attributes: set(&[URI_SAFE_ATTRS]),
            data_uri_tags: set(&[DATA_URI_TAGS]),
            allow_aria: true,
            allow_data_attributes: true,
            sanitize_named_props: true,
        }
    }

    /// Whether a tag is part of the allowed profiles.
    #[must_use]
    pub fn allows_tag(&self, tag: &str) -> bool {
        let tag = tag.to_ascii_lowercase();
        self.allowed_tags.contains(&tag) && !self.forbidden_tags.contains(&tag)
    }

    pub(crate) fn check_tag(&self, tag: &str) -> Result<(), SanitizeError> {
        if self.forbidden_tags.contains(tag) {
            return Err(SanitizeError::ForbiddenTag(tag.to_string()));
        }
        if !self.allowed_tags.contains(tag) {
            return Err(SanitizeError::UnknownTag(tag.to_string()));
        }
        Ok(())
    }

    /// Check a lowercase `(tag, attribute)` pair and its value, returning the
    /// value to keep.
    pub(crate) fn certify_attribute(
        &self,
        tag: &str,
        attribute: &str,
        value: &str,
    ) -> Result<String, SanitizeError> {
        self.check_attribute(tag, attribute)?;
        let value = value.trim();
        self.check_uri(tag, attribute, value)?;

        let namespaced = self.sanitize_named_props
            && matches!(attribute, "id" | "name")
            && !value.is_empty()
            && !value.starts_with(NAMED_PROPERTY_PREFIX);
        Ok(if namespaced {
            format!("{NAMED_PROPERTY_PREFIX}{value}")
        } else {
            value.to_string()
        })
    }

    fn check_attribute(&self, tag: &str, attribute: &str) -> Result<(), SanitizeError> {
        if self.forbidden_attributes.contains(attribute) || attribute.starts_with("on") {
            return Err(SanitizeError::ForbiddenAttribute {
                tag: tag.to_string(),
                attribute: attribute.to_string(),
            });
        }

        let allowed = self.allowed_attributes.contains(attribute)
            || (self.allow_data_attributes && is_match(&DATA_ATTR, attribute))
            || (self.allow_aria && is_match(&ARIA_ATTR, attribute));
        if allowed {
            Ok(())
        } else {
            Err(SanitizeError::UnknownAttribute {
                tag: tag.to_string(),
                attribute: attribute.to_string(),
            })
        }
    }

    fn check_uri(&self, tag: &str, attribute: &str, value: &str) -> Result<(), SanitizeError> {
        if value.is_empty()
            || self.uri_safe_attributes.contains(attribute)
            || attribute.starts_with("data-")
            || attribute.starts_with("aria-")
        {
            return Ok(());
        }

        let compact = ATTR_WHITESPACE
            .as_ref()
            .map_or_else(|| value.to_string(), |re| re.replace_all(value, "").into_owned());

        if is_match(&ALLOWED_URI, &compact) {
            return Ok(());
        }

        let uri_bearing = matches!(attribute, "src" | "href" | "xlink:href");
        if uri_bearing
            && tag != "script"
            && self.data_uri_tags.contains(tag)
            && is_match(&DATA_URI, &compact)
        {
            return Ok(());
        }

        Err(SanitizeError::UnsafeUri {
            attribute: attribute.to_string(),
        })
    }
}

/// The built-in sanitizer with a fixed, non-configurable profile.
#[derive(Debug, Clone)]
pub struct ProfileSanitizer {
    profile: SanitizerProfile,
}

impl ProfileSanitizer {
    /// Create the sanitizer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            profile: SanitizerProfile::fixed(),
        }
    }

    /// The profile in force.
    #[must_use]
    pub fn profile(&self) -> &SanitizerProfile {
        &self.profile
    }
}

impl Default for ProfileSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentSanitizer for ProfileSanitizer {
    fn sanitize(&self, value: &str, tag: &str, attribute: &str) -> Result<String, SanitizeError> {
        let tag = tag.to_ascii_lowercase();
        let attribute = attribute.to_ascii_lowercase();

        self.profile.check_tag(&tag)?;
        let certified = self.profile.certify_attribute(&tag, &attribute, value)?;

        trace!(tag = %tag, attribute = %attribute, "Attribute value certified");
        Ok(certified)
    }

    fn sanitize_markup(&self, markup: &str) -> Result<String, SanitizeError> {
        Ok(markup::clean(&self.profile, markup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(value: &str, tag: &str, attr: &str) -> Result<String, SanitizeError> {
        ProfileSanitizer::new().sanitize(value, tag, attr)
    }

    #[test]
    fn test_accepts_ordinary_script_source() {
        assert_eq!(
            sanitize("  https://cdn.example.com/lib.js ", "img", "src").unwrap(),
            "https://cdn.example.com/lib.js"
        );
        assert_eq!(sanitize("/img/logo.png", "img", "src").unwrap(), "/img/logo.png");
    }

    #[test]
    fn test_anchor_tag_is_forbidden() {
        assert_eq!(
            sanitize("https://a.example.com/", "A", "href"),
            Err(SanitizeError::ForbiddenTag("a".into()))
        );
    }

    #[test]
    fn test_unknown_tag_is_refused() {
        assert!(matches!(
            sanitize("https://a.example.com/x.js", "script", "src"),
            Err(SanitizeError::UnknownTag(_))
        ));
        assert!(sanitize("x", "trix-editor", "class").is_ok());
    }

    #[test]
    fn test_forbidden_and_handler_attributes() {
        assert!(matches!(
            sanitize("https://t.example.com/", "img", "ping"),
            Err(SanitizeError::ForbiddenAttribute { .. })
        ));
        assert!(matches!(
            sanitize("", "div", "inert"),
            Err(SanitizeError::ForbiddenAttribute { .. })
        ));
        assert!(matches!(
            sanitize("alert(1)", "img", "onerror"),
            Err(SanitizeError::ForbiddenAttribute { .. })
        ));
    }

    #[test]
    fn test_extra_data_and_aria_attributes_allowed() {
        assert!(sanitize("abc123", "style", "nonce").is_ok());
        assert!(sanitize("_blank", "form", "target").is_ok());
        assert!(sanitize("1", "div", "data-track-id").is_ok());
        assert!(sanitize("main", "div", "aria-label").is_ok());
        assert!(matches!(
            sanitize("x", "div", "made-up"),
            Err(SanitizeError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_script_uri_is_refused() {
        assert!(matches!(
            sanitize("javascript:alert(1)", "img", "src"),
            Err(SanitizeError::UnsafeUri { .. })
        ));
        assert!(matches!(
            sanitize("java\tscript:alert(1)", "img", "src"),
            Err(SanitizeError::UnsafeUri { .. })
        ));
    }

    #[test]
    fn test_data_uri_only_on_data_uri_tags() {
        assert!(sanitize("data:image/png;base64,AAAA", "img", "src").is_ok());
        assert!(matches!(
            sanitize("data:text/html,hi", "div", "background"),
            Err(SanitizeError::UnsafeUri { .. })
        ));
    }

    #[test]
    fn test_named_properties_are_namespaced() {
        assert_eq!(sanitize("login", "form", "id").unwrap(), "user-content-login");
        assert_eq!(
            sanitize("user-content-login", "form", "name").unwrap(),
            "user-content-login"
        );
    }

    #[test]
    fn test_markup_is_refused_unless_implemented() {
        struct AttributesOnly;
        impl ContentSanitizer for AttributesOnly {
            fn sanitize(&self, value: &str, _: &str, _: &str) -> Result<String, SanitizeError> {
                Ok(value.to_string())
            }
        }
        assert_eq!(
            AttributesOnly.sanitize_markup("<b>x</b>"),
            Err(SanitizeError::MarkupUnsupported)
        );
        assert_eq!(
            ProfileSanitizer::new().sanitize_markup("<b>x</b>").unwrap(),
            "<b>x</b>"
        );
    }

    #[test]
    fn test_profile_tag_lookup() {
        let s = ProfileSanitizer::new();
        assert!(s.profile().allows_tag("IMG"));
        assert!(s.profile().allows_tag("feGaussianBlur"));
        assert!(!s.profile().allows_tag("a"));
    }
}
