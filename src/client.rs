//! The client session: settings, plugin pipeline, and transport glued
//! together for one service.

use crate::envelope::Envelope;
use crate::error::SoapError;
use crate::plugin::{BindingOptions, Operation, Pipeline};
use crate::settings::Settings;
use crate::transport::{enforce_scheme, HttpHeaders, Transport};
use crate::xml::ParseOptions;
use tracing::{debug, warn};

/// Outcome of a call: the transport status and headers, plus either the
/// parsed response envelope or, under `raw_response`, only the raw body.
#[derive(Debug)]
pub struct CallResult {
    pub status: u16,
    pub http_headers: HttpHeaders,
    pub envelope: Option<Envelope>,
    pub raw: String,
}

/// A client session. Owns its settings and plugin list exclusively; the
/// plugin list is immutable once the session begins.
pub struct Client {
    settings: Settings,
    pipeline: Pipeline,
    transport: Box<dyn Transport>,
    wsdl_was_https: bool,
}

impl Client {
    pub fn new(settings: Settings, pipeline: Pipeline, transport: Box<dyn Transport>) -> Self {
        Self {
            settings,
            pipeline,
            transport,
            wsdl_was_https: false,
        }
    }

    /// Record where the service definition was loaded from; HTTPS
    /// enforcement only applies when this was an `https://` location.
    pub fn with_wsdl_origin(mut self, url: &str) -> Self {
        self.wsdl_was_https = url::Url::parse(url)
            .map(|u| u.scheme() == "https")
            .unwrap_or(false);
        self
    }

    /// The session settings, for reading options or installing scoped
    /// overrides around calls.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Invoke an operation: scheme enforcement, egress plugins, transport,
    /// then response parsing and ingress plugins.
    pub fn call(
        &self,
        operation: &Operation,
        binding_options: &BindingOptions,
        envelope: Envelope,
    ) -> Result<CallResult, SoapError> {
        // Fails before any plugin runs or network I/O happens.
        enforce_scheme(
            &binding_options.address,
            self.settings.force_https(),
            self.wsdl_was_https,
        )?;

        let mut http_headers = HttpHeaders::new();
        http_headers.insert("Content-Type", "text/xml; charset=utf-8");
        if let Some(action) = &operation.soap_action {
            http_headers.insert("SOAPAction", format!("\"{}\"", action));
        }
        http_headers.merge(&self.settings.extra_http_headers());

        let (envelope, http_headers) =
            self.pipeline
                .egress(envelope, http_headers, operation, binding_options)?;

        let body = envelope.to_xml(&self.settings.soap_env_prefix());
        debug!(
            operation = %operation.name,
            address = %binding_options.address,
            body_len = body.len(),
            "sending SOAP request"
        );
        let response = self
            .transport
            .post(&binding_options.address, &http_headers, &body)?;
        debug!(
            operation = %operation.name,
            status = response.status,
            "received SOAP response"
        );

        if self.settings.raw_response() {
            return Ok(CallResult {
                status: response.status,
                http_headers: response.headers,
                envelope: None,
                raw: response.body,
            });
        }

        let parsed = Envelope::parse(&response.body, &ParseOptions::from_settings(&self.settings))
            .map_err(|e| {
                warn!(operation = %operation.name, error = %e, "response envelope rejected");
                e
            })?;
        let (parsed, response_headers) =
            self.pipeline
                .ingress(parsed, response.headers, operation)?;

        Ok(CallResult {
            status: response.status,
            http_headers: response_headers,
            envelope: Some(parsed),
            raw: response.body,
        })
    }
}
