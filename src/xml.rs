//! Namespace-resolved XML tree.
//!
//! Uses quick-xml, which is safe against XXE by default (entities are not
//! expanded). Parsing fully resolves prefixes to namespace URIs; prefixes
//! are reassigned from a preference table on serialization, so a document
//! round-trips with exactly one declaration per namespace and no duplicate
//! prefixes.

use crate::error::SoapError;
use crate::settings::Settings;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::writer::Writer;
use quick_xml::NsReader;

/// Depth cap applied unless `xml_huge_tree` is set.
const MAX_DEPTH: usize = 256;
/// Per-text-node length cap applied unless `xml_huge_tree` is set.
const MAX_TEXT_LEN: usize = 10 * 1024 * 1024;

/// A qualified name: optional namespace URI plus local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local: local.into(),
        }
    }

    pub fn unqualified(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

/// A namespace-resolved attribute. `xmlns` declarations are not stored as
/// attributes; they are reconstructed on serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// A child node of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with resolved names.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Build a namespaced element containing a single text child.
    pub fn with_text(name: QName, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.children.push(Node::Text(text.into()));
        element
    }

    pub fn append_child(&mut self, child: Element) -> &mut Element {
        self.children.push(Node::Element(child));
        match self.children.last_mut() {
            Some(Node::Element(element)) => element,
            _ => unreachable!(),
        }
    }

    pub fn set_attribute(&mut self, name: QName, value: impl Into<String>) {
        let value = value.into();
        if let Some(attr) = self.attributes.iter_mut().find(|a| a.name == name) {
            attr.value = value;
        } else {
            self.attributes.push(Attribute { name, value });
        }
    }

    pub fn attribute(&self, name: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| &a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    pub fn find_child(&self, name: &QName) -> Option<&Element> {
        self.child_elements().find(|element| &element.name == name)
    }

    pub fn find_child_mut(&mut self, name: &QName) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(element) if &element.name == name => Some(element),
            _ => None,
        })
    }

    /// Position of the first child element with the given name.
    pub fn child_position(&self, name: &QName) -> Option<usize> {
        self.children.iter().position(|node| match node {
            Node::Element(element) => &element.name == name,
            Node::Text(_) => false,
        })
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Serialize the subtree rooted at this element.
    ///
    /// All namespaces used anywhere in the subtree are declared once on this
    /// element, using prefixes from `prefix_hints` (pairs of prefix and
    /// namespace URI) and falling back to `ns0`, `ns1`, … for the rest.
    pub fn to_xml(&self, prefix_hints: &[(&str, &str)]) -> String {
        let mut namespaces = Vec::new();
        collect_namespaces(self, &mut namespaces);

        let mut bindings: Vec<(String, String)> = Vec::new();
        let mut generated = 0usize;
        for ns in &namespaces {
            let prefix = prefix_hints
                .iter()
                .find(|(_, hint_ns)| hint_ns == ns)
                .map(|(prefix, _)| (*prefix).to_string())
                .unwrap_or_else(|| {
                    let prefix = format!("ns{}", generated);
                    generated += 1;
                    prefix
                });
            bindings.push((prefix, ns.clone()));
        }

        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, self, &bindings, true);
        String::from_utf8(writer.into_inner()).expect("writer produced valid UTF-8")
    }
}

fn collect_namespaces(element: &Element, namespaces: &mut Vec<String>) {
    if let Some(ns) = &element.name.namespace {
        if !namespaces.contains(ns) {
            namespaces.push(ns.clone());
        }
    }
    for attr in &element.attributes {
        if let Some(ns) = &attr.name.namespace {
            if !namespaces.contains(ns) {
                namespaces.push(ns.clone());
            }
        }
    }
    for child in element.child_elements() {
        collect_namespaces(child, namespaces);
    }
}

fn prefixed_name(name: &QName, bindings: &[(String, String)]) -> String {
    match &name.namespace {
        Some(ns) => {
            let prefix = bindings
                .iter()
                .find(|(_, bound)| bound == ns)
                .map(|(prefix, _)| prefix.as_str())
                .unwrap_or("ns");
            format!("{}:{}", prefix, name.local)
        }
        None => name.local.clone(),
    }
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    bindings: &[(String, String)],
    declare: bool,
) {
    let tag = prefixed_name(&element.name, bindings);
    let mut start = BytesStart::new(tag.as_str());
    if declare {
        for (prefix, ns) in bindings {
            start.push_attribute((format!("xmlns:{}", prefix).as_str(), ns.as_str()));
        }
    }
    for attr in &element.attributes {
        let attr_name = prefixed_name(&attr.name, bindings);
        start.push_attribute((attr_name.as_str(), attr.value.as_str()));
    }

    if element.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .expect("writing to an in-memory buffer cannot fail");
        return;
    }

    writer
        .write_event(Event::Start(start))
        .expect("writing to an in-memory buffer cannot fail");
    for child in &element.children {
        match child {
            Node::Element(child) => write_element(writer, child, bindings, false),
            Node::Text(text) => {
                writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .expect("writing to an in-memory buffer cannot fail");
            }
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(tag.as_str())))
        .expect("writing to an in-memory buffer cannot fail");
}

/// Parser hardening switches, captured from [`Settings`] at the call site so
/// scoped overrides take effect per call.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub strict: bool,
    pub forbid_dtd: bool,
    pub forbid_entities: bool,
    pub forbid_external: bool,
    pub huge_tree: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: true,
            forbid_dtd: false,
            forbid_entities: true,
            forbid_external: true,
            huge_tree: false,
        }
    }
}

impl ParseOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            strict: settings.strict(),
            forbid_dtd: settings.forbid_dtd(),
            forbid_entities: settings.forbid_entities(),
            forbid_external: settings.forbid_external(),
            huge_tree: settings.xml_huge_tree(),
        }
    }
}

/// Pre-scan for constructs the hardening switches forbid.
fn check_forbidden_constructs(xml: &str, options: &ParseOptions) -> Result<(), SoapError> {
    if options.forbid_dtd && (xml.contains("<!DOCTYPE") || xml.contains("<!doctype")) {
        return Err(SoapError::ExternalReferenceForbidden(
            "DOCTYPE declarations are not allowed".to_string(),
        ));
    }
    if options.forbid_entities && (xml.contains("<!ENTITY") || xml.contains("<!entity")) {
        return Err(SoapError::ExternalReferenceForbidden(
            "entity declarations are not allowed".to_string(),
        ));
    }
    if options.forbid_external {
        // Only markup declarations can carry external identifiers; SYSTEM or
        // PUBLIC in element content or comments is ordinary text.
        let mut rest = xml;
        while let Some(pos) = rest.find("<!") {
            let declaration = &rest[pos..];
            if !declaration.starts_with("<!--") && !declaration.starts_with("<![CDATA[") {
                let end = declaration.find('>').unwrap_or(declaration.len());
                let declaration = &declaration[..end];
                if declaration.contains("SYSTEM") || declaration.contains("PUBLIC") {
                    return Err(SoapError::ExternalReferenceForbidden(
                        "external entity references are not allowed".to_string(),
                    ));
                }
            }
            rest = &rest[pos + 2..];
        }
    }
    Ok(())
}

/// Parse a document into an element tree under the given hardening options.
pub fn parse(xml: &str, options: &ParseOptions) -> Result<Element, SoapError> {
    check_forbidden_constructs(xml, options)?;

    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);
    if !options.strict {
        reader.config_mut().check_end_names = false;
        reader.config_mut().allow_unmatched_ends = true;
    }

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_resolved_event() {
            Ok((resolution, Event::Start(start))) => {
                if !options.huge_tree && stack.len() >= MAX_DEPTH {
                    return Err(SoapError::XmlParse(format!(
                        "document exceeds maximum depth of {}",
                        MAX_DEPTH
                    )));
                }
                let namespace = resolved_namespace(resolution);
                let element = build_element(&reader, namespace, &start)?;
                stack.push(element);
            }
            Ok((resolution, Event::Empty(start))) => {
                let namespace = resolved_namespace(resolution);
                let element = build_element(&reader, namespace, &start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok((_, Event::End(_))) => {
                let element = stack.pop().ok_or_else(|| {
                    SoapError::XmlParse("closing tag without matching opening tag".to_string())
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok((_, Event::Text(text))) => {
                let text = text
                    .unescape()
                    .map_err(|e| SoapError::XmlParse(format!("text unescape error: {}", e)))?;
                if !options.huge_tree && text.len() > MAX_TEXT_LEN {
                    return Err(SoapError::XmlParse(format!(
                        "text content exceeds maximum length of {} bytes",
                        MAX_TEXT_LEN
                    )));
                }
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text.into_owned()));
                }
            }
            Ok((_, Event::CData(data))) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text));
                }
            }
            Ok((_, Event::DocType(_))) => {
                // Reaching here means forbid_dtd is off; the DTD itself is
                // ignored since entities are never expanded.
            }
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(SoapError::XmlParse(format!("XML parse error: {}", e)));
            }
        }
    }

    root.ok_or_else(|| SoapError::XmlParse("document contains no root element".to_string()))
}

fn attach(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), SoapError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(SoapError::XmlParse(
                    "document contains more than one root element".to_string(),
                ));
            }
            *root = Some(element);
            Ok(())
        }
    }
}

/// Convert a resolution result into an owned namespace URI.
fn resolved_namespace(resolution: ResolveResult) -> Option<String> {
    match resolution {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    }
}

fn build_element(
    reader: &NsReader<&[u8]>,
    namespace: Option<String>,
    start: &BytesStart,
) -> Result<Element, SoapError> {
    let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut element = Element::new(QName { namespace, local });

    for attr in start.attributes() {
        let attr = attr.map_err(|e| SoapError::XmlParse(format!("attribute error: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let (attr_resolution, attr_local) = reader.resolve_attribute(attr.key);
        let attr_namespace = resolved_namespace(attr_resolution);
        let value = attr
            .unescape_value()
            .map_err(|e| SoapError::XmlParse(format!("attribute unescape error: {}", e)))?;
        element.attributes.push(Attribute {
            name: QName {
                namespace: attr_namespace,
                local: String::from_utf8_lossy(attr_local.as_ref()).into_owned(),
            },
            value: value.into_owned(),
        });
    }

    Ok(element)
}
