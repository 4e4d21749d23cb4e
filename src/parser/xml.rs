//! Namespace-stripping element tree over quick-xml.
//!
//! The published lists use flat, shallow documents; materializing them as
//! a tree keeps the per-source mappings declarative. Tag and attribute
//! names are reduced to their local part so namespaced and plain
//! documents read identically.

use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of a direct child; `None` when missing or empty.
    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }

    /// Trimmed attribute value; `None` when missing or empty.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Depth-first collection of every descendant with the given name.
    pub fn descendants(&self, name: &str) -> Vec<&XmlNode> {
        let mut out = Vec::new();
        self.collect_descendants(name, &mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlNode>) {
        for child in &self.children {
            if child.name == name {
                out.push(child);
            }
            child.collect_descendants(name, out);
        }
    }
}

/// Parse a whole document into its root element.
pub fn parse_document(content: &[u8]) -> Result<XmlNode, quick_xml::Error> {
    let mut reader = Reader::from_reader(content);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let node = open_node(&e)?;
                stack.push(node);
            }
            Event::Empty(e) => {
                let node = open_node(&e)?;
                attach(node, &mut stack, &mut root);
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(node, &mut stack, &mut root);
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    append_text(top, &t.unescape()?);
                }
            }
            Event::CData(t) => {
                if let Some(top) = stack.last_mut() {
                    append_text(top, &String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Event::Eof => break,
            // declarations, comments, processing instructions
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| {
        quick_xml::Error::UnexpectedEof("document has no root element".into())
    })
}

fn open_node(e: &quick_xml::events::BytesStart<'_>) -> Result<XmlNode, quick_xml::Error> {
    let mut node = XmlNode {
        name: String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned(),
        ..XmlNode::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.trim().to_string();
        node.attrs.push((key, value));
    }
    Ok(node)
}

fn attach(node: XmlNode, stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        // first completed top-level element wins as the root
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

fn append_text(node: &mut XmlNode, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !node.text.is_empty() {
        node.text.push(' ');
    }
    node.text.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_document() {
        let doc = br#"<?xml version="1.0"?>
            <list>
                <entry id="1"><name>Alpha</name></entry>
                <entry id="2"><name>Beta</name></entry>
            </list>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.name, "list");
        assert_eq!(root.children_named("entry").count(), 2);
        let first = root.child("entry").unwrap();
        assert_eq!(first.attr("id"), Some("1"));
        assert_eq!(first.text_of("name"), Some("Alpha"));
    }

    #[test]
    fn test_namespaces_are_stripped() {
        let doc = br#"<ns:sdnList xmlns:ns="http://tempuri.org/sdnList.xsd">
                <ns:sdnEntry><ns:uid>42</ns:uid></ns:sdnEntry>
            </ns:sdnList>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.name, "sdnList");
        let entry = root.child("sdnEntry").unwrap();
        assert_eq!(entry.text_of("uid"), Some("42"));
    }

    #[test]
    fn test_self_closing_and_entities() {
        let doc = br#"<root><empty attr="x &amp; y"/><note>a &lt; b</note></root>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.child("empty").unwrap().attr("attr"), Some("x & y"));
        assert_eq!(root.text_of("note"), Some("a < b"));
    }

    #[test]
    fn test_descendants_search() {
        let doc = br#"<a><b><c>1</c></b><c>2</c></a>"#;
        let root = parse_document(doc).unwrap();
        let found = root.descendants("c");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_rejects_empty_input() {
        assert!(parse_document(b"").is_err());
        assert!(parse_document(b"   ").is_err());
    }

    #[test]
    fn test_missing_attribute_is_none() {
        let doc = br#"<root><e id=""/></root>"#;
        let root = parse_document(doc).unwrap();
        let e = root.child("e").unwrap();
        assert_eq!(e.attr("id"), None);
        assert_eq!(e.attr("missing"), None);
    }
}
