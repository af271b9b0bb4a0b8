//! Error types for the SOAP client runtime.

use thiserror::Error;

/// Errors surfaced by envelope handling, the plugin pipeline, and the
/// transport boundary.
///
/// Errors are never wrapped on their way out of the pipeline: callers see
/// the kind raised by whichever stage failed.
#[derive(Error, Debug)]
pub enum SoapError {
    /// The XML could not be parsed at all.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// The document parsed but lacks structure a component requires
    /// (missing Envelope, Body, or Header).
    #[error("malformed SOAP envelope: {0}")]
    MalformedEnvelope(String),

    /// A DTD, entity declaration, or external reference was encountered
    /// while the corresponding hardening switch forbids it.
    #[error("forbidden external reference: {0}")]
    ExternalReferenceForbidden(String),

    /// HTTPS enforcement is active but the destination is not HTTPS.
    #[error("scheme violation: {url} is not an https:// address")]
    SchemeViolation { url: String },

    /// A plugin hook failed. Aborts the remaining pipeline.
    #[error("plugin error: {0}")]
    Plugin(String),

    /// The transport collaborator failed.
    #[error("transport error: {0}")]
    Transport(String),
}
