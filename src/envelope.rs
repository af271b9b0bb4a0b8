//! SOAP 1.1 envelope over the resolved element tree.

use crate::error::SoapError;
use crate::xml::{parse, Element, ParseOptions, QName};

/// SOAP 1.1 envelope namespace.
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// W3C WS-Addressing namespace.
pub const WSA_NS: &str = "http://www.w3.org/2005/08/addressing";
/// WS-Security extension namespace.
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
/// WS-Security utility namespace.
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
/// XML digital signature namespace.
pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Fixed prefixes for the well-known namespaces; the envelope prefix itself
/// comes from the `soap_env_prefix` setting.
const PREFIX_HINTS: [(&str, &str); 4] = [
    ("wsa", WSA_NS),
    ("wsse", WSSE_NS),
    ("wsu", WSU_NS),
    ("ds", DS_NS),
];

/// A SOAP envelope: a root element with an optional Header and a mandatory
/// Body. The Header is created on demand and always precedes the Body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    root: Element,
}

impl Envelope {
    /// An envelope with an empty Body and no Header.
    pub fn new() -> Self {
        let mut root = Element::new(QName::new(SOAP_ENV_NS, "Envelope"));
        root.append_child(Element::new(QName::new(SOAP_ENV_NS, "Body")));
        Self { root }
    }

    /// Wrap an already-parsed tree, verifying the envelope structure.
    pub fn from_element(root: Element) -> Result<Self, SoapError> {
        if root.name != QName::new(SOAP_ENV_NS, "Envelope") {
            return Err(SoapError::MalformedEnvelope(format!(
                "root element is {}, expected a SOAP 1.1 Envelope",
                root.name
            )));
        }
        if root.find_child(&QName::new(SOAP_ENV_NS, "Body")).is_none() {
            return Err(SoapError::MalformedEnvelope(
                "envelope has no Body element".to_string(),
            ));
        }
        Ok(Self { root })
    }

    /// Parse an envelope from text under the given hardening options.
    pub fn parse(xml: &str, options: &ParseOptions) -> Result<Self, SoapError> {
        Self::from_element(parse(xml, options)?)
    }

    pub fn header(&self) -> Option<&Element> {
        self.root.find_child(&QName::new(SOAP_ENV_NS, "Header"))
    }

    pub fn header_mut(&mut self) -> Option<&mut Element> {
        self.root
            .find_child_mut(&QName::new(SOAP_ENV_NS, "Header"))
    }

    /// Return the existing Header, or insert one before the Body.
    ///
    /// Idempotent: repeated calls always hand back the single Header element,
    /// never a duplicate.
    pub fn get_or_create_header(&mut self) -> &mut Element {
        let header_name = QName::new(SOAP_ENV_NS, "Header");
        if self.root.find_child(&header_name).is_none() {
            let body_position = self
                .root
                .child_position(&QName::new(SOAP_ENV_NS, "Body"))
                .unwrap_or(self.root.children.len());
            self.root.children.insert(
                body_position,
                crate::xml::Node::Element(Element::new(header_name.clone())),
            );
        }
        self.root
            .find_child_mut(&header_name)
            .expect("header exists after insertion")
    }

    pub fn body(&self) -> Result<&Element, SoapError> {
        self.root
            .find_child(&QName::new(SOAP_ENV_NS, "Body"))
            .ok_or_else(|| SoapError::MalformedEnvelope("envelope has no Body".to_string()))
    }

    pub fn body_mut(&mut self) -> Result<&mut Element, SoapError> {
        self.root
            .find_child_mut(&QName::new(SOAP_ENV_NS, "Body"))
            .ok_or_else(|| SoapError::MalformedEnvelope("envelope has no Body".to_string()))
    }

    /// The underlying root element, for plugins that need full access.
    pub fn as_element(&self) -> &Element {
        &self.root
    }

    pub fn as_element_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Serialize with the given envelope prefix (the `soap_env_prefix`
    /// setting) plus the fixed WS-* prefixes.
    pub fn to_xml(&self, soap_env_prefix: &str) -> String {
        let mut hints: Vec<(&str, &str)> = vec![(soap_env_prefix, SOAP_ENV_NS)];
        hints.extend(PREFIX_HINTS);
        self.root.to_xml(&hints)
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_envelope_has_body_no_header() {
        let envelope = Envelope::new();
        assert!(envelope.header().is_none());
        assert!(envelope.body().is_ok());
    }

    #[test]
    fn test_get_or_create_header_inserts_before_body() {
        let mut envelope = Envelope::new();
        envelope.get_or_create_header();
        let children: Vec<&str> = envelope
            .as_element()
            .child_elements()
            .map(|e| e.name.local.as_str())
            .collect();
        assert_eq!(children, vec!["Header", "Body"]);
    }

    #[test]
    fn test_get_or_create_header_is_idempotent() {
        let mut envelope = Envelope::new();
        envelope.get_or_create_header();
        envelope.get_or_create_header();
        let headers = envelope
            .as_element()
            .child_elements()
            .filter(|e| e.name.local == "Header")
            .count();
        assert_eq!(headers, 1);
    }

    #[test]
    fn test_parse_rejects_non_envelope_root() {
        let result = Envelope::parse("<a/>", &ParseOptions::default());
        assert!(matches!(result, Err(SoapError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_parse_rejects_missing_body() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header/>
</soap:Envelope>"#;
        let result = Envelope::parse(xml, &ParseOptions::default());
        assert!(matches!(result, Err(SoapError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_serialize_uses_configured_prefix() {
        let envelope = Envelope::new();
        let xml = envelope.to_xml("soap-env");
        assert!(xml.contains("<soap-env:Envelope"));
        assert!(xml.contains("soap-env:Body"));

        let xml = envelope.to_xml("s");
        assert!(xml.contains("<s:Envelope"));
    }

    #[test]
    fn test_round_trip() {
        let mut envelope = Envelope::new();
        let header = envelope.get_or_create_header();
        header.append_child(Element::with_text(
            QName::new("http://example.org/meta", "RequestId"),
            "REQ-1",
        ));
        let xml = envelope.to_xml("soap-env");
        let reparsed = Envelope::parse(&xml, &ParseOptions::default()).unwrap();
        assert_eq!(reparsed, envelope);
    }
}
