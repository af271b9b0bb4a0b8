//! WS-Security UsernameToken plugin.

use crate::envelope::{Envelope, WSSE_NS, WSU_NS};
use crate::error::SoapError;
use crate::plugin::{BindingOptions, HookSet, Operation, Plugin};
use crate::transport::HttpHeaders;
use crate::wsse::utils::{format_timestamp, get_security_header};
use crate::xml::{Element, QName};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use rand::RngCore;
use sha1::{Digest, Sha1};

const PASSWORD_TEXT_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
const PASSWORD_DIGEST_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
const BASE64_ENCODING_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// UsernameToken password transmission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasswordType {
    /// Plain text password (not recommended).
    PasswordText,
    /// Digested password: Base64(SHA-1(nonce + created + password)) with a
    /// fresh nonce and `wsu:Created` timestamp per message.
    #[default]
    PasswordDigest,
}

/// Adds a `wsse:UsernameToken` credential block to the Security header,
/// creating the Security header if absent. Egress-only.
#[derive(Debug, Clone)]
pub struct UsernameToken {
    pub username: String,
    pub password: String,
    pub password_type: PasswordType,
}

impl UsernameToken {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            password_type: PasswordType::default(),
        }
    }

    pub fn with_password_type(mut self, password_type: PasswordType) -> Self {
        self.password_type = password_type;
        self
    }

    fn build_token(&self) -> Element {
        let mut token = Element::new(QName::new(WSSE_NS, "UsernameToken"));
        token.append_child(Element::with_text(
            QName::new(WSSE_NS, "Username"),
            self.username.clone(),
        ));

        match self.password_type {
            PasswordType::PasswordText => {
                let mut password =
                    Element::with_text(QName::new(WSSE_NS, "Password"), self.password.clone());
                password.set_attribute(QName::unqualified("Type"), PASSWORD_TEXT_TYPE);
                token.append_child(password);
            }
            PasswordType::PasswordDigest => {
                let mut nonce = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut nonce);
                let created = format_timestamp(Utc::now());

                let mut hasher = Sha1::new();
                hasher.update(nonce);
                hasher.update(created.as_bytes());
                hasher.update(self.password.as_bytes());
                let digest = STANDARD.encode(hasher.finalize());

                let mut password = Element::with_text(QName::new(WSSE_NS, "Password"), digest);
                password.set_attribute(QName::unqualified("Type"), PASSWORD_DIGEST_TYPE);
                token.append_child(password);

                let mut nonce_element =
                    Element::with_text(QName::new(WSSE_NS, "Nonce"), STANDARD.encode(nonce));
                nonce_element
                    .set_attribute(QName::unqualified("EncodingType"), BASE64_ENCODING_TYPE);
                token.append_child(nonce_element);

                token.append_child(Element::with_text(QName::new(WSU_NS, "Created"), created));
            }
        }

        token
    }
}

impl Plugin for UsernameToken {
    fn hooks(&self) -> HookSet {
        HookSet::EGRESS
    }

    fn name(&self) -> &str {
        "wsse-username-token"
    }

    fn egress(
        &self,
        mut envelope: Envelope,
        http_headers: HttpHeaders,
        _operation: &Operation,
        _binding_options: &BindingOptions,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        let token = self.build_token();
        get_security_header(&mut envelope).append_child(token);
        Ok((envelope, http_headers))
    }
}
