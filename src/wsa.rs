//! WS-Addressing plugins.

use crate::envelope::{Envelope, WSA_NS};
use crate::error::SoapError;
use crate::plugin::{BindingOptions, HookSet, Operation, Plugin};
use crate::transport::HttpHeaders;
use crate::xml::{Element, QName};
use uuid::Uuid;

/// Injects `wsa:Action`, `wsa:MessageID`, and `wsa:To` headers into
/// outgoing messages. Egress-only.
#[derive(Debug, Clone, Default)]
pub struct WsAddressing {
    /// Explicit destination for `wsa:To`; falls back to the binding's
    /// declared address.
    pub address_url: Option<String>,
    /// Emit `uuid:<id>` MessageIDs instead of `urn:uuid:<id>`.
    pub strip_urn_prefix: bool,
}

impl WsAddressing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address_url = Some(address.into());
        self
    }

    pub fn strip_urn_prefix(mut self) -> Self {
        self.strip_urn_prefix = true;
        self
    }
}

impl Plugin for WsAddressing {
    fn hooks(&self) -> HookSet {
        HookSet::EGRESS
    }

    fn name(&self) -> &str {
        "ws-addressing"
    }

    fn egress(
        &self,
        mut envelope: Envelope,
        http_headers: HttpHeaders,
        operation: &Operation,
        binding_options: &BindingOptions,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        // Prefer the declared addressing action, fall back to the legacy
        // SOAPAction value.
        let action = operation
            .wsa_action
            .as_deref()
            .or(operation.soap_action.as_deref())
            .ok_or_else(|| {
                SoapError::Plugin(format!(
                    "operation {} declares neither a ws-addressing action nor a SOAPAction",
                    operation.name
                ))
            })?;

        let message_id = if self.strip_urn_prefix {
            format!("uuid:{}", Uuid::new_v4())
        } else {
            format!("urn:uuid:{}", Uuid::new_v4())
        };
        let to = self
            .address_url
            .as_deref()
            .unwrap_or(binding_options.address.as_str());

        let header = envelope.get_or_create_header();
        header.append_child(Element::with_text(QName::new(WSA_NS, "Action"), action));
        header.append_child(Element::with_text(QName::new(WSA_NS, "MessageID"), message_id));
        header.append_child(Element::with_text(QName::new(WSA_NS, "To"), to));

        // Serialization assigns one declaration per namespace from the
        // preferred-prefix table, so the appended headers never introduce
        // redundant prefixes.
        Ok((envelope, http_headers))
    }
}

/// Strips every W3C-Addressing-namespaced child from the Header, leaving all
/// other header children in their original order. Used to undo a previous
/// addressing plugin's work when chaining. Egress-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveWsAddressing;

impl Plugin for RemoveWsAddressing {
    fn hooks(&self) -> HookSet {
        HookSet::EGRESS
    }

    fn name(&self) -> &str {
        "remove-ws-addressing"
    }

    fn egress(
        &self,
        mut envelope: Envelope,
        http_headers: HttpHeaders,
        _operation: &Operation,
        _binding_options: &BindingOptions,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        let header = envelope.header_mut().ok_or_else(|| {
            SoapError::MalformedEnvelope(
                "cannot remove ws-addressing headers: envelope has no Header".to_string(),
            )
        })?;
        header.children.retain(|node| match node {
            crate::xml::Node::Element(element) => {
                element.name.namespace.as_deref() != Some(WSA_NS)
            }
            crate::xml::Node::Text(_) => true,
        });
        Ok((envelope, http_headers))
    }
}
