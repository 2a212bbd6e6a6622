//! Minimal XML document tree for the master index.
//!
//! The repomd patcher needs exact control over whitespace and namespace
//! declarations, so instead of a generic XML library this module keeps an
//! explicit tree: ordered attribute lists, ordered child lists, and
//! ElementTree-style `text`/`tail` slots so the formatting of untouched
//! parts of a document survives a parse/serialize round trip. Only the
//! constructs that appear in repository metadata are supported; CDATA and
//! processing instructions are rejected, comments are dropped.

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while parsing an XML document.
#[derive(Error, Diagnostic, Debug)]
pub enum XmlError {
    #[error("XML syntax error at byte {offset}: {message}")]
    #[diagnostic(code(imarepo::xml::syntax))]
    Syntax { offset: usize, message: String },

    #[error("Unsupported XML construct at byte {offset}: {construct}")]
    #[diagnostic(
        code(imarepo::xml::unsupported),
        help("Only plain elements, attributes, text and comments are supported")
    )]
    Unsupported {
        offset: usize,
        construct: &'static str,
    },
}

pub type XmlResult<T> = std::result::Result<T, XmlError>;

/// One element node.
///
/// `text` is the character data directly after the start tag (before the
/// first child); `tail` is the character data after this element's end tag,
/// owned by this element rather than the parent. Both are `None` when empty,
/// matching ElementTree semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub tail: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: Vec::new(),
            text: None,
            tail: None,
            children: Vec::new(),
        }
    }

    /// Returns the value of the named attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    /// Appends an attribute, keeping declaration order.
    pub fn set_attr(&mut self, name: &str, value: &str) -> &mut Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        if self.children.is_empty() && self.text.is_none() {
            out.push_str(" />");
        } else {
            out.push('>');
            if let Some(text) = &self.text {
                out.push_str(&escape_text(text));
            }
            for child in &self.children {
                child.write(out);
            }
            out.push_str("</");
            out.push_str(&self.tag);
            out.push('>');
        }
        if let Some(tail) = &self.tail {
            out.push_str(&escape_text(tail));
        }
    }
}

/// A parsed document: an optional XML declaration plus the root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub declaration: bool,
    pub root: Element,
}

impl Document {
    /// Parses a document from a string.
    pub fn parse(input: &str) -> XmlResult<Document> {
        Parser { input, pos: 0 }.parse_document()
    }

    /// Serializes the document back to a string.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.declaration {
            out.push_str("<?xml version='1.0' encoding='UTF-8'?>\n");
        }
        self.root.write(&mut out);
        out
    }
}

/// Namespace declarations in scope on one element.
pub struct Namespaces {
    default: Option<String>,
    prefixes: Vec<(String, String)>,
}

impl Namespaces {
    /// Collects the `xmlns` and `xmlns:prefix` declarations of an element.
    pub fn from_element(element: &Element) -> Self {
        let mut namespaces = Namespaces {
            default: None,
            prefixes: Vec::new(),
        };
        for (name, value) in &element.attrs {
            if name == "xmlns" {
                namespaces.default = Some(value.clone());
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                namespaces.prefixes.push((prefix.to_string(), value.clone()));
            }
        }
        namespaces
    }

    /// Resolves a possibly-prefixed tag to `(namespace, local name)`.
    pub fn expand<'a>(&'a self, tag: &'a str) -> (Option<&'a str>, &'a str) {
        match tag.split_once(':') {
            Some((prefix, local)) => {
                let uri = self
                    .prefixes
                    .iter()
                    .find(|(candidate, _)| candidate == prefix)
                    .map(|(_, uri)| uri.as_str());
                (uri, local)
            }
            None => (self.default.as_deref(), tag),
        }
    }
}

/// Applies canonical two-space indentation to a subtree.
///
/// `level` is the nesting depth of `element` in the final document. Tails of
/// all descendants are rewritten; nothing outside the subtree is touched, so
/// this is only run over newly inserted elements.
pub fn indent(element: &mut Element, level: usize) {
    if !element.children.is_empty() {
        element.text = Some(format!("\n{}", "  ".repeat(level + 1)));
        element.tail = Some(format!("\n{}", "  ".repeat(level.saturating_sub(1))));
        for child in &mut element.children {
            indent(child, level + 1);
        }
        if let Some(last) = element.children.last_mut() {
            last.tail = Some(format!("\n{}", "  ".repeat(level)));
        }
    } else {
        element.tail = Some(format!("\n{}", "  ".repeat(level)));
    }
}

/// Escapes character data (`&`, `<`, `>`).
pub fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escapes an attribute value (`&`, `<`, `>`, `"`).
pub fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn err(&self, message: impl Into<String>) -> XmlError {
        XmlError::Syntax {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn expect(&mut self, token: &str) -> XmlResult<()> {
        if self.starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(self.err(format!("expected `{token}`")))
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start_matches([' ', '\t', '\r', '\n']);
        self.pos = self.input.len() - trimmed.len();
    }

    fn take_until(&mut self, delim: char, what: &'static str) -> XmlResult<&'a str> {
        match self.rest().find(delim) {
            Some(index) => {
                let value = &self.rest()[..index];
                self.pos += index;
                Ok(value)
            }
            None => Err(self.err(format!("unterminated {what}"))),
        }
    }

    fn parse_name(&mut self) -> XmlResult<String> {
        let end = self
            .rest()
            .find(|c: char| c.is_ascii_whitespace() || matches!(c, '=' | '>' | '/' | '?' | '<'))
            .unwrap_or(self.rest().len());
        if end == 0 {
            return Err(self.err("expected a name"));
        }
        let name = self.rest()[..end].to_string();
        self.pos += end;
        Ok(name)
    }

    fn skip_comment(&mut self) -> XmlResult<()> {
        self.expect("<!--")?;
        match self.rest().find("-->") {
            Some(index) => {
                self.pos += index + 3;
                Ok(())
            }
            None => Err(self.err("unterminated comment")),
        }
    }

    fn parse_document(&mut self) -> XmlResult<Document> {
        if self.starts_with("\u{feff}") {
            self.pos += '\u{feff}'.len_utf8();
        }
        self.skip_whitespace();

        let mut declaration = false;
        if self.starts_with("<?xml") {
            match self.rest().find("?>") {
                Some(index) => self.pos += index + 2,
                None => return Err(self.err("unterminated XML declaration")),
            }
            declaration = true;
        }

        loop {
            self.skip_whitespace();
            if self.starts_with("<!--") {
                self.skip_comment()?;
            } else {
                break;
            }
        }
        if self.starts_with("<!") {
            return Err(XmlError::Unsupported {
                offset: self.pos,
                construct: "document type declaration",
            });
        }
        if self.starts_with("<?") {
            return Err(XmlError::Unsupported {
                offset: self.pos,
                construct: "processing instruction",
            });
        }

        let mut root = self.parse_element()?;

        // Trailing whitespace after the root belongs to its tail so the
        // document round-trips byte for byte.
        let tail_start = self.pos;
        self.skip_whitespace();
        let tail = &self.input[tail_start..self.pos];
        loop {
            if self.starts_with("<!--") {
                self.skip_comment()?;
                self.skip_whitespace();
            } else {
                break;
            }
        }
        if self.pos != self.input.len() {
            return Err(self.err("content after the root element"));
        }
        if !tail.is_empty() {
            root.tail = Some(tail.to_string());
        }

        Ok(Document { declaration, root })
    }

    fn parse_element(&mut self) -> XmlResult<Element> {
        self.expect("<")?;
        let mut element = Element::new(&self.parse_name()?);

        loop {
            self.skip_whitespace();
            if self.starts_with("/>") {
                self.pos += 2;
                return Ok(element);
            }
            if self.starts_with(">") {
                self.pos += 1;
                break;
            }
            let name = self.parse_name()?;
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let quote = match self.rest().chars().next() {
                Some(c @ ('"' | '\'')) => c,
                _ => return Err(self.err("expected a quoted attribute value")),
            };
            self.pos += 1;
            let raw_start = self.pos;
            let raw = self.take_until(quote, "attribute value")?;
            let value = unescape(raw, raw_start)?;
            self.pos += 1;
            element.attrs.push((name, value));
        }

        let mut pending = String::new();
        loop {
            if self.pos >= self.input.len() {
                return Err(self.err(format!("unclosed element `{}`", element.tag)));
            }
            if self.starts_with("</") {
                self.pos += 2;
                let name = self.parse_name()?;
                if name != element.tag {
                    return Err(self.err(format!(
                        "mismatched end tag `{name}` for element `{}`",
                        element.tag
                    )));
                }
                self.skip_whitespace();
                self.expect(">")?;
                attach_text(&mut element, pending);
                return Ok(element);
            }
            if self.starts_with("<!--") {
                self.skip_comment()?;
            } else if self.starts_with("<![") {
                return Err(XmlError::Unsupported {
                    offset: self.pos,
                    construct: "CDATA section",
                });
            } else if self.starts_with("<?") {
                return Err(XmlError::Unsupported {
                    offset: self.pos,
                    construct: "processing instruction",
                });
            } else if self.starts_with("<") {
                attach_text(&mut element, std::mem::take(&mut pending));
                let child = self.parse_element()?;
                element.children.push(child);
            } else {
                let raw_start = self.pos;
                let end = self.rest().find('<').unwrap_or(self.rest().len());
                let raw = &self.rest()[..end];
                self.pos += end;
                pending.push_str(&unescape(raw, raw_start)?);
            }
        }
    }
}

fn attach_text(element: &mut Element, pending: String) {
    if pending.is_empty() {
        return;
    }
    match element.children.last_mut() {
        Some(last) => last.tail = Some(pending),
        None => element.text = Some(pending),
    }
}

fn unescape(raw: &str, offset: usize) -> XmlResult<String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(index) = rest.find('&') {
        out.push_str(&rest[..index]);
        rest = &rest[index..];
        let end = rest.find(';').ok_or(XmlError::Syntax {
            offset: offset + raw.len() - rest.len(),
            message: "unterminated entity reference".to_string(),
        })?;
        let entity = &rest[1..end];
        let replacement = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse))
                    .and_then(|parsed| parsed.ok())
                    .and_then(char::from_u32);
                code.ok_or(XmlError::Syntax {
                    offset: offset + raw.len() - rest.len(),
                    message: format!("unknown entity `&{entity};`"),
                })?
            }
        };
        out.push(replacement);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_document() {
        let doc = Document::parse(r#"<a x="1"><b>hi</b></a>"#).unwrap();
        assert!(!doc.declaration);
        assert_eq!(doc.root.tag, "a");
        assert_eq!(doc.root.attr("x"), Some("1"));
        assert_eq!(doc.root.children.len(), 1);
        assert_eq!(doc.root.children[0].text.as_deref(), Some("hi"));
    }

    #[test]
    fn test_text_and_tail_placement() {
        let doc = Document::parse("<a>\n  <b>x</b>\n  <c />\n</a>\n").unwrap();
        assert_eq!(doc.root.text.as_deref(), Some("\n  "));
        assert_eq!(doc.root.children[0].tail.as_deref(), Some("\n  "));
        assert_eq!(doc.root.children[1].tail.as_deref(), Some("\n"));
        assert_eq!(doc.root.tail.as_deref(), Some("\n"));
    }

    #[test]
    fn test_round_trip_preserves_formatting() {
        let input = "<?xml version='1.0' encoding='UTF-8'?>\n<repomd xmlns=\"http://linux.duke.edu/metadata/repo\">\n  <data type=\"primary\">\n    <location href=\"repodata/primary.xml.gz\" />\n  </data>\n</repomd>\n";
        let doc = Document::parse(input).unwrap();
        assert_eq!(doc.render(), input);
    }

    #[test]
    fn test_entities() {
        let doc = Document::parse(r#"<a x="a&amp;b&#x2f;c">1 &lt; 2</a>"#).unwrap();
        assert_eq!(doc.root.attr("x"), Some("a&b/c"));
        assert_eq!(doc.root.text.as_deref(), Some("1 < 2"));
        assert_eq!(doc.render(), r#"<a x="a&amp;b/c">1 &lt; 2</a>"#);
    }

    #[test]
    fn test_comments_are_dropped() {
        let doc = Document::parse("<!-- head --><a><!-- inner --><b /></a>").unwrap();
        assert_eq!(doc.root.children.len(), 1);
        assert_eq!(doc.render(), "<a><b /></a>");
    }

    #[test]
    fn test_cdata_rejected() {
        let err = Document::parse("<a><![CDATA[x]]></a>").unwrap_err();
        assert!(matches!(
            err,
            XmlError::Unsupported {
                construct: "CDATA section",
                ..
            }
        ));
    }

    #[test]
    fn test_mismatched_end_tag() {
        assert!(Document::parse("<a><b></a></b>").is_err());
    }

    #[test]
    fn test_unclosed_element() {
        assert!(Document::parse("<a><b>").is_err());
    }

    #[test]
    fn test_namespaces_expand() {
        let doc = Document::parse(
            r#"<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm"><data /><rpm:entry /></repomd>"#,
        )
        .unwrap();
        let namespaces = Namespaces::from_element(&doc.root);
        assert_eq!(
            namespaces.expand("data"),
            (Some("http://linux.duke.edu/metadata/repo"), "data")
        );
        assert_eq!(
            namespaces.expand("rpm:entry"),
            (Some("http://linux.duke.edu/metadata/rpm"), "entry")
        );
        assert_eq!(namespaces.expand("other:entry"), (None, "entry"));
    }

    #[test]
    fn test_indent_subtree() {
        let mut data = Element::new("data");
        data.set_attr("type", "imadata");
        let mut checksum = Element::new("checksum");
        checksum.text = Some("abc".to_string());
        data.children.push(checksum);
        data.children.push(Element::new("size"));

        indent(&mut data, 1);
        let mut out = String::new();
        data.write(&mut out);
        assert_eq!(
            out,
            "<data type=\"imadata\">\n    <checksum>abc</checksum>\n    <size />\n  </data>\n"
        );
    }
}
