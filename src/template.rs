//! Variable substitution and HTML preparation for rich-text content.
//!
//! Section content, column content and canvas text boxes are HTML strings
//! that may contain `{{VariableName}}` placeholders and may have been
//! entity-encoded once (or more) on their way through storage. Every render
//! surface funnels content through [`prepare_rich_content`], which
//! classifies, decodes, sanitizes and substitutes in one fixed order.
//!
//! Nothing in this module fails: malformed input passes through unchanged.

use std::borrow::Cow;
use std::collections::HashMap;

use ammonia::{Builder, UrlRelative};
use quick_xml::escape::{escape, resolve_html5_entity, unescape_with};
use serde::{Deserialize, Serialize};

/// A named value available to `{{Name}}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

impl Variable {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Replace every `{{Name}}` whose name matches a variable exactly
/// (case-sensitive). Unknown placeholders and unterminated `{{` are kept
/// verbatim. When two variables share a name the first one wins.
pub fn substitute_variables(text: &str, variables: &[Variable]) -> String {
    substitute_with(text, variables, |v| Cow::Borrowed(v))
}

fn substitute_with<'v>(
    text: &str,
    variables: &'v [Variable],
    render_value: impl Fn(&'v str) -> Cow<'v, str>,
) -> String {
    if variables.is_empty() || !text.contains("{{") {
        return text.to_string();
    }
    let mut lookup: HashMap<&str, &str> = HashMap::new();
    for v in variables {
        lookup.entry(v.name.as_str()).or_insert(v.value.as_str());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            break;
        };
        // `{{a {{Name}}`: the innermost opener owns the closer.
        let (prefix_end, name) = match after_open[..close].rfind("{{") {
            Some(inner) => (open + 2 + inner, &after_open[inner + 2..close]),
            None => (open, &after_open[..close]),
        };
        out.push_str(&rest[..prefix_end]);
        match lookup.get(name) {
            Some(value) => out.push_str(&render_value(*value)),
            None => {
                out.push_str("{{");
                out.push_str(name);
                out.push_str("}}");
            }
        }
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    out
}

/// Longest entity body we try to resolve (`&CounterClockwiseContourIntegral;`).
const MAX_ENTITY_LEN: usize = 40;

fn decode_once(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let candidate = tail[1..]
            .char_indices()
            .take(MAX_ENTITY_LEN)
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '#'))
            .filter(|(_, c)| *c == ';')
            .map(|(i, _)| &tail[..i + 2]);
        match candidate {
            Some(entity) if entity.len() > 2 => {
                match unescape_with(entity, resolve_html5_entity) {
                    Ok(decoded) => out.push_str(&decoded),
                    Err(_) => out.push_str(entity),
                }
                rest = &tail[entity.len()..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Reverse HTML entity encoding, however many times it was applied.
///
/// Decoding runs to a fixpoint, so the result is stable:
/// `decode(decode(x)) == decode(x)`. Unknown or malformed entities stay as
/// written.
pub fn decode_html_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut current = decode_once(text);
    loop {
        if !current.contains('&') {
            return current;
        }
        let next = decode_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Content is markup when it contains a literal `<` or an encoded one.
pub fn is_html(text: &str) -> bool {
    if text.contains('<') {
        return true;
    }
    let lower = text.to_ascii_lowercase();
    lower.contains("&lt;") || lower.contains("&#60;") || lower.contains("&#x3c;")
}

/// Escape plain text for inclusion in markup.
pub fn escape_text(text: &str) -> String {
    escape(text).into_owned()
}

/// Elements removed together with everything inside them. Raw-text and
/// RCDATA elements are listed so their bodies never come back as markup, and
/// foreign content (`svg`, `math`) goes whole.
const DROPPED_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "frame", "frameset", "noscript",
    "noembed", "noframes", "xmp", "textarea", "title", "plaintext", "template", "svg",
    "math",
];

/// Inline style properties an editor may emit. Everything else is dropped
/// from `style` attributes.
const STYLE_PROPERTIES: &[&str] = &[
    "color",
    "background-color",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "line-height",
    "text-align",
    "text-decoration",
];

pub(crate) fn is_unsafe_url(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    compact.starts_with("javascript:")
        || compact.starts_with("vbscript:")
        || compact.starts_with("data:text/html")
}

/// Strip active content from markup before it is injected as HTML.
///
/// The input is parsed as an HTML fragment and re-serialized against an
/// allow-list of elements, attributes, style properties and URL schemes.
/// Script-like and raw-text elements go with their bodies, comments and
/// `on*` handlers are removed, relative URLs pass through.
pub fn sanitize_html(html: &str) -> String {
    Builder::default()
        .add_generic_attributes(["style", "class"])
        .filter_style_properties(STYLE_PROPERTIES.iter().copied().collect())
        .clean_content_tags(DROPPED_ELEMENTS.iter().copied().collect())
        .url_relative(UrlRelative::PassThrough)
        .link_rel(None)
        .clean(html)
        .to_string()
}

/// Content after classification, ready to be placed inside an element.
#[derive(Debug, Clone, PartialEq)]
pub enum RichContent {
    /// Sanitized markup, safe to inject as-is.
    Html(String),
    /// Plain text, still unescaped.
    Text(String),
}

impl RichContent {
    pub fn to_markup(&self) -> String {
        match self {
            RichContent::Html(html) => html.clone(),
            RichContent::Text(text) => escape_text(text).replace('\n', "<br>"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RichContent::Html(s) | RichContent::Text(s) => s.trim().is_empty(),
        }
    }
}

/// The single content pipeline shared by every surface.
///
/// Markup is entity-decoded and sanitized first, then placeholders are
/// replaced with escaped values so a variable can never inject markup.
/// Plain text gets its placeholders replaced and stays text.
pub fn prepare_rich_content(raw: &str, variables: &[Variable]) -> RichContent {
    if is_html(raw) {
        let decoded = decode_html_entities(raw);
        let clean = sanitize_html(&decoded);
        RichContent::Html(substitute_with(&clean, variables, |v| escape(v)))
    } else {
        RichContent::Text(substitute_variables(raw, variables))
    }
}
