//! WS-Security signature plugins.
//!
//! The cryptographic computation is an external collaborator behind
//! [`TokenSigner`]; these plugins are responsible for structural placement
//! only: tagging the signed Body, locating or creating the Security header,
//! and inserting results in the order (Timestamp, BinarySecurityToken,
//! Signature) that downstream verifiers expect.

use crate::envelope::{Envelope, DS_NS, SOAP_ENV_NS, WSSE_NS, WSU_NS};
use crate::error::SoapError;
use crate::plugin::{BindingOptions, HookSet, Operation, Plugin};
use crate::transport::HttpHeaders;
use crate::wsse::utils::{format_timestamp, get_security_header};
use crate::xml::{Element, QName};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
const X509_TOKEN_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
const BASE64_ENCODING_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// `wsu:Id` assigned to the Body so signature references can point at it.
const BODY_ID: &str = "Body";

/// Signing primitive supplied by the caller: takes canonicalized bytes,
/// returns the signature value.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, canonical: &[u8]) -> Result<Vec<u8>, SoapError>;

    /// DER bytes for a `wsse:BinarySecurityToken`, when the signer carries
    /// certificate material.
    fn binary_token(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Memory-backed signer keyed with raw bytes (HMAC-SHA256). Useful where key
/// material lives in process memory rather than in a key store, and for
/// deterministic tests.
#[derive(Clone)]
pub struct MemorySignature {
    key: Vec<u8>,
}

impl MemorySignature {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }
}

impl TokenSigner for MemorySignature {
    fn sign(&self, canonical: &[u8]) -> Result<Vec<u8>, SoapError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| SoapError::Plugin(format!("invalid signing key: {}", e)))?;
        mac.update(canonical);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Serialize the Body subtree as the canonicalization boundary.
fn canonical_body(envelope: &Envelope) -> Result<Vec<u8>, SoapError> {
    let body = envelope.body()?;
    Ok(body
        .to_xml(&[
            ("soap-env", SOAP_ENV_NS),
            ("wsu", WSU_NS),
        ])
        .into_bytes())
}

fn build_signature_element(signature_value: &[u8]) -> Element {
    let mut signature = Element::new(QName::new(DS_NS, "Signature"));

    let mut signed_info = Element::new(QName::new(DS_NS, "SignedInfo"));
    let mut c14n = Element::new(QName::new(DS_NS, "CanonicalizationMethod"));
    c14n.set_attribute(QName::unqualified("Algorithm"), EXC_C14N);
    signed_info.append_child(c14n);
    let mut reference = Element::new(QName::new(DS_NS, "Reference"));
    reference.set_attribute(QName::unqualified("URI"), format!("#{}", BODY_ID));
    signed_info.append_child(reference);
    signature.append_child(signed_info);

    signature.append_child(Element::with_text(
        QName::new(DS_NS, "SignatureValue"),
        STANDARD.encode(signature_value),
    ));

    signature
}

fn build_timestamp(ttl: Duration) -> Element {
    let created = Utc::now();
    let mut timestamp = Element::new(QName::new(WSU_NS, "Timestamp"));
    timestamp.append_child(Element::with_text(
        QName::new(WSU_NS, "Created"),
        format_timestamp(created),
    ));
    timestamp.append_child(Element::with_text(
        QName::new(WSU_NS, "Expires"),
        format_timestamp(created + ttl),
    ));
    timestamp
}

/// Shared egress path for the signature variants.
fn apply_signature(
    mut envelope: Envelope,
    signer: &dyn TokenSigner,
    include_token: bool,
    timestamp_ttl: Option<Duration>,
) -> Result<Envelope, SoapError> {
    envelope
        .body_mut()?
        .set_attribute(QName::new(WSU_NS, "Id"), BODY_ID);

    let canonical = canonical_body(&envelope)?;
    let signature_value = signer.sign(&canonical)?;

    let token = if include_token {
        let der = signer.binary_token().ok_or_else(|| {
            SoapError::Plugin("signer provides no binary security token".to_string())
        })?;
        let mut token = Element::with_text(
            QName::new(WSSE_NS, "BinarySecurityToken"),
            STANDARD.encode(der),
        );
        token.set_attribute(QName::unqualified("ValueType"), X509_TOKEN_TYPE);
        token.set_attribute(QName::unqualified("EncodingType"), BASE64_ENCODING_TYPE);
        Some(token)
    } else {
        None
    };

    let security = get_security_header(&mut envelope);
    if let Some(ttl) = timestamp_ttl {
        security.append_child(build_timestamp(ttl));
    }
    if let Some(token) = token {
        security.append_child(token);
    }
    security.append_child(build_signature_element(&signature_value));

    Ok(envelope)
}

/// Signs the Body and places the signature in the Security header.
pub struct Signature {
    signer: Arc<dyn TokenSigner>,
}

impl Signature {
    pub fn new(signer: Arc<dyn TokenSigner>) -> Self {
        Self { signer }
    }

    /// Convenience constructor using an in-memory HMAC key.
    pub fn with_memory_key(key: impl Into<Vec<u8>>) -> Self {
        Self::new(Arc::new(MemorySignature::new(key)))
    }
}

impl Plugin for Signature {
    fn hooks(&self) -> HookSet {
        HookSet::EGRESS
    }

    fn name(&self) -> &str {
        "wsse-signature"
    }

    fn egress(
        &self,
        envelope: Envelope,
        http_headers: HttpHeaders,
        _operation: &Operation,
        _binding_options: &BindingOptions,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        Ok((
            apply_signature(envelope, self.signer.as_ref(), false, None)?,
            http_headers,
        ))
    }
}

/// Like [`Signature`], but also inserts the signer's binary security token.
pub struct BinarySignature {
    signer: Arc<dyn TokenSigner>,
}

impl BinarySignature {
    pub fn new(signer: Arc<dyn TokenSigner>) -> Self {
        Self { signer }
    }
}

impl Plugin for BinarySignature {
    fn hooks(&self) -> HookSet {
        HookSet::EGRESS
    }

    fn name(&self) -> &str {
        "wsse-binary-signature"
    }

    fn egress(
        &self,
        envelope: Envelope,
        http_headers: HttpHeaders,
        _operation: &Operation,
        _binding_options: &BindingOptions,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        Ok((
            apply_signature(envelope, self.signer.as_ref(), true, None)?,
            http_headers,
        ))
    }
}

/// Like [`BinarySignature`], prefixed with a `wsu:Timestamp` valid for the
/// given TTL.
pub struct BinarySignatureTimestamp {
    signer: Arc<dyn TokenSigner>,
    ttl: Duration,
}

impl BinarySignatureTimestamp {
    pub fn new(signer: Arc<dyn TokenSigner>, ttl: Duration) -> Self {
        Self { signer, ttl }
    }
}

impl Plugin for BinarySignatureTimestamp {
    fn hooks(&self) -> HookSet {
        HookSet::EGRESS
    }

    fn name(&self) -> &str {
        "wsse-binary-signature-timestamp"
    }

    fn egress(
        &self,
        envelope: Envelope,
        http_headers: HttpHeaders,
        _operation: &Operation,
        _binding_options: &BindingOptions,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        Ok((
            apply_signature(envelope, self.signer.as_ref(), true, Some(self.ttl))?,
            http_headers,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CertSigner;

    impl TokenSigner for CertSigner {
        fn sign(&self, canonical: &[u8]) -> Result<Vec<u8>, SoapError> {
            Ok(canonical.iter().rev().copied().collect())
        }

        fn binary_token(&self) -> Option<Vec<u8>> {
            Some(b"der-bytes".to_vec())
        }
    }

    fn apply(plugin: &dyn Plugin) -> Envelope {
        let (envelope, _) = plugin
            .egress(
                Envelope::new(),
                HttpHeaders::new(),
                &Operation::new("Op"),
                &BindingOptions::new("https://svc/endpoint"),
            )
            .unwrap();
        envelope
    }

    fn security_children(envelope: &Envelope) -> Vec<String> {
        envelope
            .header()
            .unwrap()
            .find_child(&QName::new(WSSE_NS, "Security"))
            .unwrap()
            .child_elements()
            .map(|e| e.name.local.clone())
            .collect()
    }

    #[test]
    fn test_signature_places_signature_and_tags_body() {
        let envelope = apply(&Signature::with_memory_key(b"k".to_vec()));
        assert_eq!(security_children(&envelope), vec!["Signature"]);
        assert_eq!(
            envelope
                .body()
                .unwrap()
                .attribute(&QName::new(WSU_NS, "Id")),
            Some(BODY_ID)
        );
        let signature = envelope
            .header()
            .unwrap()
            .find_child(&QName::new(WSSE_NS, "Security"))
            .unwrap()
            .find_child(&QName::new(DS_NS, "Signature"))
            .unwrap();
        let reference = signature
            .find_child(&QName::new(DS_NS, "SignedInfo"))
            .unwrap()
            .find_child(&QName::new(DS_NS, "Reference"))
            .unwrap();
        assert_eq!(
            reference.attribute(&QName::unqualified("URI")),
            Some("#Body")
        );
    }

    #[test]
    fn test_memory_signature_is_deterministic() {
        let signer = MemorySignature::new(b"key".to_vec());
        let a = signer.sign(b"payload").unwrap();
        let b = signer.sign(b"payload").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, signer.sign(b"other").unwrap());
    }

    #[test]
    fn test_signature_value_matches_signer_over_body() {
        let signer = Arc::new(MemorySignature::new(b"key".to_vec()));
        let plugin = Signature::new(signer.clone());
        let envelope = apply(&plugin);

        let expected = signer.sign(&canonical_body(&envelope).unwrap()).unwrap();
        let value = envelope
            .header()
            .unwrap()
            .find_child(&QName::new(WSSE_NS, "Security"))
            .unwrap()
            .find_child(&QName::new(DS_NS, "Signature"))
            .unwrap()
            .find_child(&QName::new(DS_NS, "SignatureValue"))
            .unwrap()
            .text();
        assert_eq!(value, STANDARD.encode(expected));
    }

    #[test]
    fn test_binary_signature_inserts_token_before_signature() {
        let envelope = apply(&BinarySignature::new(Arc::new(CertSigner)));
        assert_eq!(
            security_children(&envelope),
            vec!["BinarySecurityToken", "Signature"]
        );
    }

    #[test]
    fn test_binary_signature_without_token_material_fails() {
        let plugin = BinarySignature::new(Arc::new(MemorySignature::new(b"k".to_vec())));
        let result = plugin.egress(
            Envelope::new(),
            HttpHeaders::new(),
            &Operation::new("Op"),
            &BindingOptions::new("https://svc/endpoint"),
        );
        assert!(matches!(result, Err(SoapError::Plugin(_))));
    }

    #[test]
    fn test_timestamp_token_signature_order() {
        let plugin = BinarySignatureTimestamp::new(Arc::new(CertSigner), Duration::minutes(5));
        let envelope = apply(&plugin);
        assert_eq!(
            security_children(&envelope),
            vec!["Timestamp", "BinarySecurityToken", "Signature"]
        );
        let timestamp = envelope
            .header()
            .unwrap()
            .find_child(&QName::new(WSSE_NS, "Security"))
            .unwrap()
            .find_child(&QName::new(WSU_NS, "Timestamp"))
            .unwrap();
        assert!(timestamp.find_child(&QName::new(WSU_NS, "Created")).is_some());
        assert!(timestamp.find_child(&QName::new(WSU_NS, "Expires")).is_some());
    }
}
