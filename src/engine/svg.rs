// src/engine/svg.rs
//
// SVG minification: re-serialize the parsed tree without comments, processing
// instructions, editor metadata or formatting whitespace.
// Also a lenient tag-balancing pass so broken markup can still be rasterized.

use roxmltree::{Document, Node, ParsingOptions};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespaces written by drawing tools; never needed for rendering.
const EDITOR_NAMESPACES: &[&str] = &[
    "http://www.inkscape.org/namespaces/inkscape",
    "http://sodipodi.sourceforge.net/DTD/sodipodi-0.dtd",
    "http://ns.adobe.com/AdobeIllustrator/10.0/",
    "http://www.bohemiancoding.com/sketch/ns",
];

/// Elements whose whitespace-only text is content, not formatting.
const TEXT_ELEMENTS: &[&str] = &["text", "tspan", "textPath"];

/// Minify an SVG document. Fails only when the markup does not parse.
pub fn minify_svg(input: &str) -> Result<String, roxmltree::Error> {
    let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(input, options)?;

    let mut out = String::with_capacity(input.len());
    if let Some(declaration) = declaration_to_keep(input) {
        out.push_str(declaration);
    }
    write_element(&mut out, doc.root_element(), None, false);
    Ok(out)
}

/// The source `<?xml ...?>` declaration, unless it only restates the XML
/// defaults (version 1.0, UTF-8).
fn declaration_to_keep(input: &str) -> Option<&str> {
    let start = input.trim_start();
    let rest = start.strip_prefix("<?xml")?;
    if !rest.starts_with(|c: char| c.is_ascii_whitespace()) {
        return None;
    }
    let end = rest.find("?>")?;
    let only_defaults = pseudo_attributes(&rest[..end]).all(|(name, value)| match name {
        "version" => value == "1.0",
        "encoding" => value.eq_ignore_ascii_case("utf-8"),
        _ => false,
    });
    (!only_defaults).then(|| &start[.."<?xml".len() + end + "?>".len()])
}

/// `name="value"` pairs of a declaration body.
fn pseudo_attributes(body: &str) -> impl Iterator<Item = (&str, &str)> + '_ {
    let mut rest = body;
    std::iter::from_fn(move || {
        let (name, after) = rest.split_once('=')?;
        let after = after.trim_start();
        let quote = after.chars().next().filter(|c| matches!(c, '"' | '\''))?;
        let tail = &after[1..];
        let close = tail.find(quote)?;
        rest = &tail[close + 1..];
        Some((name.trim(), &tail[..close]))
    })
}

fn is_editor_namespace(uri: Option<&str>) -> bool {
    uri.is_some_and(|uri| EDITOR_NAMESPACES.contains(&uri))
}

fn write_element(out: &mut String, node: Node<'_, '_>, parent: Option<Node<'_, '_>>, preserve: bool) {
    let tag = node.tag_name();
    let name = qualified_element_name(node, tag.namespace(), tag.name());

    let preserve = match node.attribute((XML_NAMESPACE, "space")) {
        Some("preserve") => true,
        Some(_) => false,
        None => preserve || TEXT_ELEMENTS.contains(&tag.name()),
    };

    out.push('<');
    out.push_str(&name);

    for ns in node.namespaces() {
        if ns.uri() == XML_NAMESPACE || is_editor_namespace(Some(ns.uri())) {
            continue;
        }
        let inherited = parent.is_some_and(|p| {
            p.namespaces()
                .any(|pns| pns.name() == ns.name() && pns.uri() == ns.uri())
        });
        if inherited {
            continue;
        }
        match ns.name() {
            Some(prefix) => {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
            None => out.push_str(" xmlns=\""),
        }
        escape_attribute(out, ns.uri());
        out.push('"');
    }

    for attr in node.attributes() {
        if is_editor_namespace(attr.namespace()) {
            continue;
        }
        out.push(' ');
        match attr.namespace() {
            Some(XML_NAMESPACE) => out.push_str("xml:"),
            Some(uri) => {
                if let Some(prefix) = attribute_prefix(node, uri) {
                    out.push_str(prefix);
                    out.push(':');
                }
            }
            None => {}
        }
        out.push_str(attr.name());
        out.push_str("=\"");
        escape_attribute(out, attr.value());
        out.push('"');
    }

    let mut body = String::new();
    for child in node.children() {
        if child.is_element() {
            if is_editor_namespace(child.tag_name().namespace()) {
                continue;
            }
            write_element(&mut body, child, Some(node), preserve);
        } else if child.is_text() {
            let text = child.text().unwrap_or_default();
            if preserve || !text.trim().is_empty() {
                escape_text(&mut body, text);
            }
        }
        // comments and processing instructions are dropped
    }

    if body.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        out.push_str(&body);
        out.push_str("</");
        out.push_str(&name);
        out.push('>');
    }
}

fn qualified_element_name(node: Node<'_, '_>, uri: Option<&str>, local: &str) -> String {
    let Some(uri) = uri else {
        return local.to_string();
    };
    let has_default = node
        .namespaces()
        .any(|ns| ns.name().is_none() && ns.uri() == uri);
    if has_default {
        return local.to_string();
    }
    match attribute_prefix(node, uri) {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn attribute_prefix<'a>(node: Node<'a, '_>, uri: &str) -> Option<&'a str> {
    node.namespaces()
        .find(|ns| ns.name().is_some() && ns.uri() == uri)
        .and_then(|ns| ns.name())
}

fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
}

/// Balance the element tags of broken markup.
///
/// A closing tag that matches an open ancestor closes everything opened since;
/// a closing tag with no open match is dropped; elements still open at the end
/// are closed; a tag cut off by the end of input is dropped. Comments, CDATA,
/// declarations and processing instructions are copied as they are.
pub fn repair_svg(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let mut open: Vec<&str> = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        let starts_markup = rest[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || matches!(c, '/' | '!' | '?' | '_' | ':'));
        if !starts_markup {
            out.push_str("&lt;");
            rest = &rest[1..];
            continue;
        }

        let Some(end) = markup_end(rest) else {
            rest = "";
            break;
        };
        let (tag, after) = rest.split_at(end);
        rest = after;

        if tag.starts_with("<!") || tag.starts_with("<?") {
            out.push_str(tag);
        } else if let Some(closing) = tag.strip_prefix("</") {
            let name = closing.trim_end_matches('>').trim();
            if let Some(depth) = open.iter().rposition(|open_name| *open_name == name) {
                for unclosed in open.split_off(depth).iter().skip(1).rev() {
                    push_closing_tag(&mut out, unclosed);
                }
                out.push_str(tag);
            }
        } else {
            let name_end = tag[1..]
                .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
                .map_or(tag.len(), |i| i + 1);
            if !tag.ends_with("/>") {
                open.push(&tag[1..name_end]);
            }
            out.push_str(tag);
        }
    }

    out.push_str(rest);
    for unclosed in open.iter().rev() {
        push_closing_tag(&mut out, unclosed);
    }
    out
}

fn push_closing_tag(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Byte offset just past the markup starting at `s[0] == '<'`.
fn markup_end(s: &str) -> Option<usize> {
    let terminated = |open: &str, close: &str| {
        s.starts_with(open)
            .then(|| s[open.len()..].find(close).map(|i| open.len() + i + close.len()))
    };
    if let Some(end) = terminated("<!--", "-->")
        .or_else(|| terminated("<![CDATA[", "]]>"))
        .or_else(|| terminated("<?", "?>"))
    {
        return end;
    }

    let mut quote = None;
    s.char_indices().find_map(|(i, c)| {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(i + 1),
            _ => {}
        }
        None
    })
}
