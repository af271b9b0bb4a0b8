//! SOAP client runtime.
//!
//! Builds outgoing SOAP envelopes, applies pluggable message transformations
//! through an ordered pipeline, and supports per-call configuration
//! overrides scoped to the calling thread.
//!
//! # Features
//!
//! - Envelope construction and hardened parsing (DTD/entity/external
//!   reference switches, depth and text caps)
//! - Plugin pipeline with egress/ingress hooks and capability declaration
//! - WS-Addressing header injection and removal
//! - WS-Security username tokens, signature placement, and composition
//! - Thread-scoped settings overrides (e.g. per-call `force_https`)
//!
//! # Example
//!
//! ```ignore
//! use soap_client::{Client, Pipeline, Settings};
//! use soap_client::wsa::WsAddressing;
//!
//! let pipeline = Pipeline::new(vec![Box::new(WsAddressing::new())]);
//! let client = Client::new(Settings::default(), pipeline, transport)
//!     .with_wsdl_origin("https://svc/service?wsdl");
//! let result = client.call(&operation, &binding, envelope)?;
//! ```

pub mod client;
pub mod envelope;
pub mod error;
pub mod plugin;
pub mod settings;
pub mod transport;
pub mod wsa;
pub mod wsse;
pub mod xml;

pub use client::{CallResult, Client};
pub use envelope::Envelope;
pub use error::SoapError;
pub use plugin::{BindingOptions, HookSet, Operation, Pipeline, Plugin};
pub use settings::{Overrides, Settings, SettingsData};
pub use transport::{HttpHeaders, Transport, TransportResponse};
