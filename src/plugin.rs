//! The plugin extension point and the pipeline that drives it.
//!
//! Plugins declare which hooks they implement via [`Plugin::hooks`]; the
//! pipeline consults the declaration and skips plugins for hooks they do not
//! carry. Hooks run strictly sequentially in registration order, each
//! receiving the previous plugin's output, so identical input and an
//! identical plugin list always produce identical output.

use crate::envelope::Envelope;
use crate::error::SoapError;
use crate::transport::HttpHeaders;
use std::collections::HashMap;
use tracing::debug;

/// Immutable metadata about the operation being invoked. Read-only to
/// plugins; supplied by the external WSDL/binding layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Operation name.
    pub name: String,
    /// Legacy SOAPAction value, if the binding declares one.
    pub soap_action: Option<String>,
    /// WS-Addressing action URI declared on the abstract operation.
    pub wsa_action: Option<String>,
}

impl Operation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            soap_action: None,
            wsa_action: None,
        }
    }

    pub fn with_soap_action(mut self, action: impl Into<String>) -> Self {
        self.soap_action = Some(action.into());
        self
    }

    pub fn with_wsa_action(mut self, action: impl Into<String>) -> Self {
        self.wsa_action = Some(action.into());
        self
    }
}

/// Options supplied by the transport/binding layer. Read-only to plugins.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingOptions {
    /// Destination address for the call.
    pub address: String,
    /// Any further binding options, keyed by name.
    pub options: HashMap<String, String>,
}

impl BindingOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            options: HashMap::new(),
        }
    }
}

/// Which hooks a plugin implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookSet {
    pub egress: bool,
    pub ingress: bool,
}

impl HookSet {
    pub const EGRESS: HookSet = HookSet {
        egress: true,
        ingress: false,
    };
    pub const INGRESS: HookSet = HookSet {
        egress: false,
        ingress: true,
    };
    pub const BOTH: HookSet = HookSet {
        egress: true,
        ingress: true,
    };

    pub fn union(self, other: HookSet) -> HookSet {
        HookSet {
            egress: self.egress || other.egress,
            ingress: self.ingress || other.ingress,
        }
    }
}

/// A message transformation applied by the pipeline.
///
/// Implementations must not keep message-specific mutable state between
/// invocations: the same plugin list is shared by concurrent pipeline runs,
/// and everything a hook needs is threaded explicitly through the
/// envelope/headers pair.
pub trait Plugin: Send + Sync {
    /// Which hooks this plugin implements. The pipeline only invokes
    /// declared hooks.
    fn hooks(&self) -> HookSet;

    /// Short name used in log events.
    fn name(&self) -> &str {
        "plugin"
    }

    /// Invoked before transmission. May mutate or replace the envelope and
    /// headers; returns the pair for the next plugin.
    fn egress(
        &self,
        envelope: Envelope,
        http_headers: HttpHeaders,
        _operation: &Operation,
        _binding_options: &BindingOptions,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        Ok((envelope, http_headers))
    }

    /// Invoked after a response is received; symmetric contract.
    fn ingress(
        &self,
        envelope: Envelope,
        http_headers: HttpHeaders,
        _operation: &Operation,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        Ok((envelope, http_headers))
    }
}

/// Ordered plugin list, immutable once the client session begins.
pub struct Pipeline {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Pipeline {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn empty() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run all declared egress hooks in registration order.
    ///
    /// The first failing hook aborts the run; its error propagates unchanged
    /// and later plugins are not invoked. Mutations already applied by
    /// earlier plugins are not rolled back.
    pub fn egress(
        &self,
        mut envelope: Envelope,
        mut http_headers: HttpHeaders,
        operation: &Operation,
        binding_options: &BindingOptions,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        for plugin in &self.plugins {
            if !plugin.hooks().egress {
                continue;
            }
            debug!(plugin = plugin.name(), operation = %operation.name, "running egress hook");
            (envelope, http_headers) =
                plugin.egress(envelope, http_headers, operation, binding_options)?;
        }
        Ok((envelope, http_headers))
    }

    /// Run all declared ingress hooks.
    ///
    /// Ingress uses the same registration order as egress; this is part of
    /// the observable contract when multiple plugins are chained.
    pub fn ingress(
        &self,
        mut envelope: Envelope,
        mut http_headers: HttpHeaders,
        operation: &Operation,
    ) -> Result<(Envelope, HttpHeaders), SoapError> {
        for plugin in &self.plugins {
            if !plugin.hooks().ingress {
                continue;
            }
            debug!(plugin = plugin.name(), operation = %operation.name, "running ingress hook");
            (envelope, http_headers) = plugin.ingress(envelope, http_headers, operation)?;
        }
        Ok((envelope, http_headers))
    }
}
