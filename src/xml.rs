// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Minimal XML tree used for XML request and response bodies.
//!
//! Only elements, attributes, text and CDATA are kept. Prolog, comments and
//! doctype declarations are skipped.

use std::fmt::{self, Write as _};

use derive_more::with_trait::{Display, Error};

/// Error of parsing an XML document.
#[derive(Clone, Debug, Display, Eq, Error, PartialEq)]
#[display("malformed XML at offset {offset}: {message}")]
pub struct ParseError {
    /// Byte offset the parser stopped at.
    pub offset: usize,

    /// Description of what went wrong.
    pub message: String,
}

/// XML element node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Element {
    /// Tag name, including any namespace prefix.
    pub name: String,

    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,

    /// Child nodes in document order.
    pub children: Vec<Node>,
}

/// Child of an [`Element`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Node {
    /// Nested element.
    Element(Element),

    /// Text content (entities already decoded).
    Text(String),
}

/// Result of [`Element::select()`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Selection<'e> {
    /// Path resolved to an element.
    Element(&'e Element),

    /// Path resolved to text or to an attribute value.
    Text(String),
}

impl Element {
    /// Parses the given `source` into its root [`Element`].
    ///
    /// # Errors
    ///
    /// If the `source` isn't a well-formed XML document.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let mut reader = Reader { src: source, pos: 0 };
        reader.skip_misc()?;
        let root = reader.element()?;
        reader.skip_misc()?;
        if reader.pos < source.len() {
            return Err(reader.error("trailing content after root element"));
        }
        Ok(root)
    }

    /// Returns the value of the attribute with the given `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over the child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Concatenated text content of this element and all its descendants.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Indicates whether this element has any child elements.
    #[must_use]
    pub fn has_elements(&self) -> bool {
        self.elements().next().is_some()
    }

    /// Resolves an absolute XPath-like `path` against this root element.
    ///
    /// Supported forms are `/a/b`, `/a/b[2]` (1-based), `/a/b/@attr`,
    /// `/a/b/text()`, `*` as a name wildcard and a leading `//` selecting
    /// the first matching descendant.
    #[must_use]
    pub fn select(&self, path: &str) -> Option<Selection<'_>> {
        let (descendant, rest) = match path.strip_prefix("//") {
            Some(rest) => (true, rest),
            None => (false, path.strip_prefix('/')?),
        };
        let segments = rest.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>();
        let (first, tail) = segments.split_first()?;
        let (name, index) = split_index(first)?;

        let start = if descendant {
            self.descendants().filter(|e| name_matches(&e.name, name)).nth(index - 1)?
        } else {
            if !name_matches(&self.name, name) || index != 1 {
                return None;
            }
            self
        };
        start.walk(tail)
    }

    fn walk<'e>(&'e self, segments: &[&str]) -> Option<Selection<'e>> {
        let Some((segment, rest)) = segments.split_first() else {
            return Some(Selection::Element(self));
        };
        if *segment == "text()" {
            return Some(Selection::Text(self.text()));
        }
        if let Some(attr) = segment.strip_prefix('@') {
            return self.attribute(attr).map(|v| Selection::Text(v.to_owned()));
        }
        let (name, index) = split_index(segment)?;
        self.elements()
            .filter(|e| name_matches(&e.name, name))
            .nth(index - 1)?
            .walk(rest)
    }

    fn descendants(&self) -> impl Iterator<Item = &Self> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.elements().collect::<Vec<_>>().into_iter().rev());
            Some(next)
        })
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (k, v) in &self.attributes {
            write!(f, " {k}=\"{}\"", escape(v))?;
        }
        if self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_char('>')?;
        for node in &self.children {
            match node {
                Node::Element(e) => write!(f, "{e}")?,
                Node::Text(t) => f.write_str(&escape(t))?,
            }
        }
        write!(f, "</{}>", self.name)
    }
}

fn name_matches(actual: &str, wanted: &str) -> bool {
    wanted == "*"
        || actual == wanted
        || actual.rsplit_once(':').is_some_and(|(_, local)| local == wanted)
}

fn split_index(segment: &str) -> Option<(&str, usize)> {
    match segment.split_once('[') {
        None => Some((segment, 1)),
        Some((name, idx)) => {
            let idx = idx.strip_suffix(']')?.trim().parse::<usize>().ok()?;
            (idx > 0).then_some((name, idx))
        }
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

struct Reader<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Reader<'s> {
    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError { offset: self.pos, message: message.into() }
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn skip_past(&mut self, terminator: &str) -> Result<&'s str, ParseError> {
        let rest = self.rest();
        let idx = rest
            .find(terminator)
            .ok_or_else(|| self.error(format!("missing `{terminator}`")))?;
        self.pos += idx + terminator.len();
        Ok(&rest[..idx])
    }

    fn expect(&mut self, token: &str) -> Result<(), ParseError> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(self.error(format!("expected `{token}`")))
        }
    }

    fn skip_misc(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_ws();
            let rest = self.rest();
            if rest.starts_with("<?") {
                _ = self.skip_past("?>")?;
            } else if rest.starts_with("<!--") {
                _ = self.skip_past("-->")?;
            } else if rest.starts_with("<!") && !rest.starts_with("<![CDATA[") {
                _ = self.skip_past(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn name(&mut self) -> Result<String, ParseError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || "/>=<".contains(c))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a name"));
        }
        self.pos += len;
        Ok(rest[..len].to_owned())
    }

    fn element(&mut self) -> Result<Element, ParseError> {
        self.expect("<")?;
        let name = self.name()?;
        let mut attributes = Vec::new();
        loop {
            self.skip_ws();
            if self.rest().starts_with("/>") {
                self.pos += 2;
                return Ok(Element { name, attributes, children: Vec::new() });
            }
            if self.rest().starts_with('>') {
                self.pos += 1;
                break;
            }
            let key = self.name()?;
            self.skip_ws();
            self.expect("=")?;
            self.skip_ws();
            let quote = match self.rest().chars().next() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(self.error("expected a quoted attribute value")),
            };
            self.pos += 1;
            let raw = self.skip_past(if quote == '"' { "\"" } else { "'" })?;
            attributes.push((key, unescape(raw)));
        }

        let mut children = Vec::new();
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.error(format!("unclosed element `{name}`")));
            } else if rest.starts_with("</") {
                self.pos += 2;
                let closing = self.name()?;
                if closing != name {
                    return Err(self.error(format!(
                        "expected `</{name}>`, found `</{closing}>`",
                    )));
                }
                self.skip_ws();
                self.expect(">")?;
                return Ok(Element { name, attributes, children });
            } else if rest.starts_with("<!--") {
                _ = self.skip_past("-->")?;
            } else if rest.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let data = self.skip_past("]]>")?;
                children.push(Node::Text(data.to_owned()));
            } else if rest.starts_with('<') {
                children.push(Node::Element(self.element()?));
            } else {
                let len = rest.find('<').unwrap_or(rest.len());
                self.pos += len;
                let text = &rest[..len];
                if !text.trim().is_empty() {
                    children.push(Node::Text(unescape(text)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
        <!-- orders -->
        <order id="7">
            <item sku="a1">apple</item>
            <item sku="b2">pear &amp; plum</item>
            <note><![CDATA[<fragile>]]></note>
        </order>"#;

    #[test]
    fn parses_and_selects() {
        let root = Element::parse(DOC).unwrap();
        assert_eq!(root.name, "order");
        assert_eq!(root.attribute("id"), Some("7"));
        assert_eq!(root.elements().count(), 3);

        assert_eq!(
            root.select("/order/@id"),
            Some(Selection::Text("7".into())),
        );
        assert_eq!(
            root.select("/order/item[2]/text()"),
            Some(Selection::Text("pear & plum".into())),
        );
        assert_eq!(
            root.select("/order/item[2]/@sku"),
            Some(Selection::Text("b2".into())),
        );
        assert_eq!(
            root.select("//note/text()"),
            Some(Selection::Text("<fragile>".into())),
        );
        assert!(matches!(
            root.select("/order/item"),
            Some(Selection::Element(e)) if e.text() == "apple",
        ));
        assert_eq!(root.select("/order/missing"), None);
        assert_eq!(root.select("/other"), None);
        assert_eq!(root.select("order"), None);
    }

    #[test]
    fn renders_back() {
        let root = Element::parse(r#"<a x="1"><b>t &lt; u</b><c/></a>"#).unwrap();
        assert_eq!(root.to_string(), r#"<a x="1"><b>t &lt; u</b><c/></a>"#);
    }

    #[test]
    fn rejects_mismatched_tags() {
        let err = Element::parse("<a><b></a>").unwrap_err();
        assert!(err.message.contains("expected `</b>`"), "{err}");
        assert!(Element::parse("<a>").is_err());
        assert!(Element::parse("<a/><b/>").is_err());
    }
}
