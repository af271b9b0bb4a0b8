//! Transport boundary: HTTP headers, the transport collaborator trait, and
//! HTTPS scheme enforcement.

use crate::error::SoapError;
use std::collections::HashMap;
use url::Url;

/// Case-insensitive HTTP header map with unique names.
///
/// Lookup and replacement ignore case; the capitalization of the first
/// insertion is preserved for the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpHeaders {
    // lowercase name -> (wire name, value)
    entries: HashMap<String, (String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let key = name.to_ascii_lowercase();
        match self.entries.get_mut(&key) {
            Some((_, existing)) => *existing = value,
            None => {
                self.entries.insert(key, (name, value));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Merge another mapping into this one, replacing existing values.
    pub fn merge(&mut self, other: &HashMap<String, String>) {
        for (name, value) in other {
            self.insert(name.clone(), value.clone());
        }
    }

    /// Wire-name/value pairs, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Response handed back by the transport collaborator.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: String,
}

/// The HTTP transport. Implemented externally; this crate only posts
/// serialized envelopes through it.
pub trait Transport: Send + Sync {
    fn post(
        &self,
        address: &str,
        headers: &HttpHeaders,
        body: &str,
    ) -> Result<TransportResponse, SoapError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn post(
        &self,
        address: &str,
        headers: &HttpHeaders,
        body: &str,
    ) -> Result<TransportResponse, SoapError> {
        (**self).post(address, headers, body)
    }
}

/// Fail with a scheme violation when HTTPS enforcement applies and the
/// destination is not HTTPS. Called before any plugin runs or network I/O
/// happens.
pub fn enforce_scheme(
    address: &str,
    force_https: bool,
    wsdl_was_https: bool,
) -> Result<(), SoapError> {
    if !(force_https && wsdl_was_https) {
        return Ok(());
    }
    let url = Url::parse(address).map_err(|e| {
        SoapError::Transport(format!("invalid destination address {}: {}", address, e))
    })?;
    if url.scheme() != "https" {
        return Err(SoapError::SchemeViolation {
            url: address.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive_lookup() {
        let mut headers = HttpHeaders::new();
        headers.insert("Content-Type", "text/xml");
        assert_eq!(headers.get("content-type"), Some("text/xml"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/xml"));
    }

    #[test]
    fn test_headers_replace_keeps_first_capitalization() {
        let mut headers = HttpHeaders::new();
        headers.insert("SOAPAction", "\"a\"");
        headers.insert("soapaction", "\"b\"");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("SOAPAction"), Some("\"b\""));
        let (name, _) = headers.iter().next().unwrap();
        assert_eq!(name, "SOAPAction");
    }

    #[test]
    fn test_headers_merge() {
        let mut headers = HttpHeaders::new();
        headers.insert("Content-Type", "text/xml");
        let mut extra = HashMap::new();
        extra.insert("X-Correlation-Id".to_string(), "abc".to_string());
        extra.insert("content-type".to_string(), "application/soap+xml".to_string());
        headers.merge(&extra);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Content-Type"), Some("application/soap+xml"));
        assert_eq!(headers.get("x-correlation-id"), Some("abc"));
    }

    #[test]
    fn test_enforce_scheme_rejects_http_when_active() {
        let err = enforce_scheme("http://svc/endpoint", true, true).unwrap_err();
        assert!(matches!(err, SoapError::SchemeViolation { .. }));
    }

    #[test]
    fn test_enforce_scheme_allows_https() {
        assert!(enforce_scheme("https://svc/endpoint", true, true).is_ok());
    }

    #[test]
    fn test_enforce_scheme_inactive_without_https_wsdl() {
        // The WSDL came over plain HTTP, so enforcement does not apply.
        assert!(enforce_scheme("http://svc/endpoint", true, false).is_ok());
    }

    #[test]
    fn test_enforce_scheme_disabled_by_option() {
        assert!(enforce_scheme("http://svc/endpoint", false, true).is_ok());
    }
}
