//! Minimal XML tree and writer on top of quick-xml.

use crate::error::{ProtocolError, XmlError};
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Writer};

/// An element node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Local name, without prefix.
    pub name: String,
    /// Qualified name as written in the document.
    pub qname: String,
    /// Resolved namespace URI.
    pub namespace: Option<String>,
    /// Attributes as `(qualified name, unescaped value)`, including `xmlns`
    /// declarations.
    pub attributes: Vec<(String, String)>,
    /// Namespace declarations in scope at this element, own and inherited,
    /// as `(xmlns attribute name, uri)`.
    pub namespaces: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns an attribute or a bad message error naming the element.
    pub fn required_attr(&self, name: &str) -> Result<&str, ProtocolError> {
        self.attr(name).ok_or_else(|| {
            ProtocolError::bad_message(format!(
                "Element '{}': missing required attribute '{}'",
                self.name, name
            ))
        })
    }

    /// Child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn required_child(&self, name: &str) -> Result<&Element, ProtocolError> {
        self.child(name).ok_or_else(|| {
            ProtocolError::bad_message(format!(
                "Element '{}': missing required child '{}'",
                self.name, name
            ))
        })
    }

    /// Concatenated, trimmed text content.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out.trim().to_string()
    }

    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(Element::text)
    }

    pub fn children_text(&self, name: &str) -> Vec<String> {
        self.children_named(name).map(Element::text).collect()
    }

    pub fn has_element_children(&self) -> bool {
        self.elements().next().is_some()
    }

    /// Serializes the children back to markup. Each top-level child element
    /// redeclares the namespaces in scope here, so it parses on its own.
    pub fn inner_xml(&self) -> Result<String, XmlError> {
        let mut writer = XmlWriter::new();
        for node in &self.children {
            match node {
                Node::Element(child) => {
                    let mut child = child.clone();
                    for (name, uri) in &self.namespaces {
                        if child.attr(name).is_none() {
                            child.attributes.push((name.clone(), uri.clone()));
                        }
                    }
                    writer.write_node(&Node::Element(child))?;
                }
                Node::Text(_) => writer.write_node(node)?,
            }
        }
        String::from_utf8(writer.into_inner()).map_err(|_| XmlError::InvalidUtf8)
    }
}

/// Parses a complete document into its root element.
pub fn parse_document(body: &[u8]) -> Result<Element, XmlError> {
    let text = std::str::from_utf8(body).map_err(|_| XmlError::InvalidUtf8)?;
    let mut reader = NsReader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(start) => {
                let element = open_element(resolved, &start, stack.last())?;
                if root.is_some() && stack.is_empty() {
                    return Err(XmlError::Structure(
                        "document has more than one root element".to_string(),
                    ));
                }
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(resolved, &start, stack.last())?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(element)),
                    None if root.is_none() => root = Some(element),
                    None => {
                        return Err(XmlError::Structure(
                            "document has more than one root element".to_string(),
                        ))
                    }
                }
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    XmlError::Structure("closing tag without opening tag".to_string())
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(element)),
                    None => root = Some(element),
                }
            }
            Event::Text(t) => {
                let value = t.unescape()?;
                push_text(&mut stack, &value)?;
            }
            Event::CData(c) => {
                let value = String::from_utf8(c.into_inner().into_owned())
                    .map_err(|_| XmlError::InvalidUtf8)?;
                push_text(&mut stack, &value)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Structure(format!(
            "unexpected end of document inside '{}'",
            stack.last().map(|e| e.qname.as_str()).unwrap_or_default()
        )));
    }
    root.ok_or_else(|| XmlError::Structure("document has no root element".to_string()))
}

fn open_element(
    resolved: ResolveResult<'_>,
    start: &BytesStart<'_>,
    parent: Option<&Element>,
) -> Result<Element, XmlError> {
    let qname =
        String::from_utf8(start.name().as_ref().to_vec()).map_err(|_| XmlError::InvalidUtf8)?;
    let name =
        String::from_utf8(start.local_name().as_ref().to_vec()).map_err(|_| XmlError::InvalidUtf8)?;
    let namespace = match resolved {
        ResolveResult::Bound(Namespace(ns)) => {
            Some(String::from_utf8(ns.to_vec()).map_err(|_| XmlError::InvalidUtf8)?)
        }
        ResolveResult::Unbound => None,
        ResolveResult::Unknown(prefix) => {
            return Err(XmlError::Structure(format!(
                "unbound namespace prefix '{}'",
                String::from_utf8_lossy(&prefix)
            )))
        }
    };

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key =
            String::from_utf8(attr.key.as_ref().to_vec()).map_err(|_| XmlError::InvalidUtf8)?;
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }

    let mut namespaces = parent.map(|p| p.namespaces.clone()).unwrap_or_default();
    for (key, value) in &attributes {
        if key == "xmlns" || key.starts_with("xmlns:") {
            namespaces.retain(|(name, _)| name != key);
            namespaces.push((key.clone(), value.clone()));
        }
    }

    Ok(Element {
        name,
        qname,
        namespace,
        attributes,
        namespaces,
        children: Vec::new(),
    })
}

fn push_text(stack: &mut [Element], value: &str) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Text(value.to_string()));
            Ok(())
        }
        None if value.trim().is_empty() => Ok(()),
        None => Err(XmlError::Structure(
            "text content outside the root element".to_string(),
        )),
    }
}

/// Streaming writer producing an in-memory document.
pub struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            inner: Writer::new(Vec::new()),
        }
    }

    pub fn declaration(&mut self) -> Result<(), XmlError> {
        self.inner
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        Ok(())
    }

    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), XmlError> {
        let mut start = BytesStart::new(name);
        for attr in attributes {
            start.push_attribute(*attr);
        }
        self.inner.write_event(Event::Start(start))?;
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<(), XmlError> {
        self.inner.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), XmlError> {
        let mut start = BytesStart::new(name);
        for attr in attributes {
            start.push_attribute(*attr);
        }
        self.inner.write_event(Event::Empty(start))?;
        Ok(())
    }

    pub fn text(&mut self, text: &str) -> Result<(), XmlError> {
        self.inner.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    /// Writes `<name attrs>text</name>`.
    pub fn text_element(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> Result<(), XmlError> {
        self.start(name, attributes)?;
        self.text(text)?;
        self.end(name)
    }

    /// Writes a payload element. Well-formed XML is embedded as markup,
    /// anything else is written as text.
    pub fn content_element(&mut self, name: &str, content: &str) -> Result<(), XmlError> {
        match parse_document(content.as_bytes()) {
            Ok(root) => {
                self.start(name, &[])?;
                self.write_node(&Node::Element(root))?;
                self.end(name)
            }
            Err(_) => self.text_element(name, &[], content),
        }
    }

    /// Writes a text element only when `text` is present.
    pub fn optional_text_element(
        &mut self,
        name: &str,
        text: Option<&str>,
    ) -> Result<(), XmlError> {
        match text {
            Some(text) => self.text_element(name, &[], text),
            None => Ok(()),
        }
    }

    pub fn write_node(&mut self, node: &Node) -> Result<(), XmlError> {
        match node {
            Node::Text(t) => self.text(t),
            Node::Element(e) => {
                let attrs: Vec<(&str, &str)> = e
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                if e.children.is_empty() {
                    return self.empty(&e.qname, &attrs);
                }
                self.start(&e.qname, &attrs)?;
                for child in &e.children {
                    self.write_node(child)?;
                }
                self.end(&e.qname)
            }
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses an `xs:boolean` value.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

pub fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Parses an `xs:dateTime` value carrying a timezone.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Reads an optional timestamp child, failing on unparsable values.
pub fn datetime_child(
    element: &Element,
    name: &str,
) -> Result<Option<DateTime<Utc>>, ProtocolError> {
    match element.child_text(name) {
        None => Ok(None),
        Some(text) => parse_datetime(&text).map(Some).ok_or_else(|| {
            ProtocolError::bad_message(format!(
                "Element '{}': '{}' is not a valid timestamp",
                name, text
            ))
        }),
    }
}

/// Reads an optional boolean attribute, failing on unparsable values.
pub fn bool_attr(element: &Element, name: &str, default: bool) -> Result<bool, ProtocolError> {
    match element.attr(name) {
        None => Ok(default),
        Some(value) => parse_bool(value).ok_or_else(|| {
            ProtocolError::bad_message(format!(
                "Element '{}': attribute '{}' is not a boolean",
                element.name, name
            ))
        }),
    }
}
