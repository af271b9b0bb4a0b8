//! Shared WS-Security helpers.

use crate::envelope::{Envelope, WSSE_NS};
use crate::xml::{Element, QName};
use chrono::{DateTime, Utc};

/// Locate the `wsse:Security` element under the Header, creating and
/// appending it (last among the header children) if absent.
///
/// Idempotent: repeated calls return the same element, never a duplicate.
pub fn get_security_header(envelope: &mut Envelope) -> &mut Element {
    let security_name = QName::new(WSSE_NS, "Security");
    let header = envelope.get_or_create_header();
    if header.find_child(&security_name).is_none() {
        header.append_child(Element::new(security_name.clone()));
    }
    header
        .find_child_mut(&security_name)
        .expect("security header exists after insertion")
}

/// WS-Security zulu timestamp format.
pub fn format_timestamp(moment: DateTime<Utc>) -> String {
    moment.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
